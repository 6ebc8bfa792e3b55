//! Wiring: builds every collaborator from a [`Config`]

use std::sync::Arc;

use crate::config::Config;
use crate::crawler::{HttpImageFetcher, WikiCategoryLister, WikiClient};
use crate::error::{Error, Result};
use crate::gate::{Clock, PostGate, SystemClock};
use crate::orchestrator::PostOrchestrator;
use crate::parser::TimelineLocator;
use crate::publisher::bluesky::BlueskyPublisher;
use crate::storage::open_store;

/// Build the production orchestrator
///
/// One [`WikiClient`] is shared by the lister, locator and fetcher so they
/// draw from the same rate limiter.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built, the denylist does
/// not compile, a URL is malformed, or the marker store is unreachable.
pub async fn build_orchestrator(config: &Config) -> Result<PostOrchestrator> {
    let client = WikiClient::new(&config.wiki)?;

    let lister = WikiCategoryLister::new(client.clone(), &config.wiki)
        .map_err(|e| Error::with_source("Invalid denylist", e))?;
    let locator = TimelineLocator::new(client.clone(), &config.wiki.site_origin)?;
    let fetcher = HttpImageFetcher::new(client);
    let publisher = BlueskyPublisher::new(&config.bluesky)?;

    if !publisher.is_configured() {
        tracing::warn!("Bluesky credentials missing; runs will fail at publish time");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = open_store(&config.store, clock.clone()).await?;
    let gate = PostGate::new(store, clock, &config.gate);

    tracing::debug!(
        category = %config.wiki.category,
        policy = %config.gate.policy,
        backend = ?config.store.backend,
        "Orchestrator collaborators ready"
    );

    PostOrchestrator::builder()
        .lister(Arc::new(lister))
        .locator(Arc::new(locator))
        .fetcher(Arc::new(fetcher))
        .publisher(Arc::new(publisher))
        .gate(gate)
        .max_attempts(config.selection.max_attempts)
        .seed(config.selection.seed)
        .build()
}
