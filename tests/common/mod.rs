//! Common test utilities
//!
//! In-process collaborators that log every call to a shared event list so
//! tests can assert both what happened and in which order.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wikitimelines::config::GateConfig;
use wikitimelines::crawler::{CategoryLister, ImageFetcher, ImagePayload};
use wikitimelines::gate::{Clock, ManualClock, PostGate};
use wikitimelines::orchestrator::PostOrchestrator;
use wikitimelines::parser::{ImageLocator, TimelineImage};
use wikitimelines::publisher::{
    PostId, PublishError, PublishResult, PublishSession, PublishStage, Publisher,
};
use wikitimelines::storage::{KvStore, MemoryStore, StoreResult};
use wikitimelines::utils::error::{FetchError, StoreError};

/// Ordered record of collaborator calls
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

/// Lister returning a fixed title list
pub struct StaticLister {
    pub titles: Vec<String>,
    pub log: EventLog,
}

#[async_trait]
impl CategoryLister for StaticLister {
    async fn list_candidates(&self) -> Result<Vec<String>, FetchError> {
        self.log.push("list");
        Ok(self.titles.clone())
    }
}

/// Locator that finds an image only for the configured titles
pub struct SetLocator {
    pub with_image: HashSet<String>,
    pub log: EventLog,
}

#[async_trait]
impl ImageLocator for SetLocator {
    async fn locate_image(&self, title: &str) -> Result<Option<TimelineImage>, FetchError> {
        self.log.push(format!("locate:{title}"));
        Ok(self.with_image.contains(title).then(|| TimelineImage {
            title: title.to_string(),
            image_url: format!("https://upload.wikimedia.org/{}.png", title.replace(' ', "_")),
        }))
    }
}

/// Fetcher returning a tiny PNG-typed payload
pub struct StaticFetcher {
    pub log: EventLog,
}

#[async_trait]
impl ImageFetcher for StaticFetcher {
    async fn fetch_image(&self, url: &str) -> Result<ImagePayload, FetchError> {
        self.log.push(format!("fetch:{url}"));
        Ok(png_payload())
    }
}

pub fn png_payload() -> ImagePayload {
    ImagePayload {
        bytes: Bytes::from_static(&[0x89, b'P', b'N', b'G']),
        content_type: "image/png".to_string(),
    }
}

/// Publisher whose sessions log `publish:<text>`
pub struct RecordingPublisher {
    pub log: EventLog,
    pub fail_at: Option<PublishStage>,
}

#[async_trait]
impl Publisher for RecordingPublisher {
    fn name(&self) -> &str {
        "recording"
    }

    async fn open_session(&self) -> PublishResult<Box<dyn PublishSession>> {
        self.log.push("session");
        if self.fail_at == Some(PublishStage::Session) {
            return Err(PublishError::Authentication {
                stage: PublishStage::Session,
                message: "bad password".to_string(),
            });
        }
        Ok(Box::new(RecordingSession {
            log: self.log.clone(),
            fail_at: self.fail_at,
        }))
    }
}

struct RecordingSession {
    log: EventLog,
    fail_at: Option<PublishStage>,
}

#[async_trait]
impl PublishSession for RecordingSession {
    async fn publish(&self, text: &str, _image: &ImagePayload, _alt: &str) -> PublishResult<PostId> {
        self.log.push(format!("publish:{text}"));
        if self.fail_at == Some(PublishStage::Post) {
            return Err(PublishError::Rejected {
                stage: PublishStage::Post,
                message: "record rejected".to_string(),
            });
        }
        Ok(PostId::new("at://did:plc:test/app.bsky.feed.post/1"))
    }
}

/// Store wrapper that logs writes and can be told to fail
pub struct LoggingStore {
    pub inner: MemoryStore,
    pub log: EventLog,
    pub fail_get: bool,
    pub fail_put: bool,
}

#[async_trait]
impl KvStore for LoggingStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        if self.fail_get {
            return Err(StoreError::Connection("store offline".to_string()));
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.log.push(format!("record:{key}"));
        if self.fail_put {
            return Err(StoreError::Connection("store offline".to_string()));
        }
        self.inner.put(key, value, ttl).await
    }

    fn backend(&self) -> &'static str {
        "logging"
    }
}

/// Knobs for [`Harness::build`]
#[derive(Default)]
pub struct HarnessOptions {
    pub titles: Vec<&'static str>,
    pub with_image: Vec<&'static str>,
    pub max_attempts: Option<u32>,
    pub seed: Option<u64>,
    pub publish_fail_at: Option<PublishStage>,
    pub store_fail_get: bool,
    pub store_fail_put: bool,
}

/// Orchestrator wired to in-process collaborators
pub struct Harness {
    pub orchestrator: PostOrchestrator,
    pub gate: PostGate,
    pub clock: ManualClock,
    pub log: EventLog,
}

impl Harness {
    pub fn build(options: HarnessOptions) -> Self {
        let log = EventLog::default();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());

        let store = LoggingStore {
            inner: MemoryStore::new(shared_clock.clone()),
            log: log.clone(),
            fail_get: options.store_fail_get,
            fail_put: options.store_fail_put,
        };
        let gate = PostGate::new(Arc::new(store), shared_clock, &GateConfig::default());

        let mut builder = PostOrchestrator::builder()
            .lister(Arc::new(StaticLister {
                titles: options.titles.iter().map(|t| t.to_string()).collect(),
                log: log.clone(),
            }))
            .locator(Arc::new(SetLocator {
                with_image: options.with_image.iter().map(|t| t.to_string()).collect(),
                log: log.clone(),
            }))
            .fetcher(Arc::new(StaticFetcher { log: log.clone() }))
            .publisher(Arc::new(RecordingPublisher {
                log: log.clone(),
                fail_at: options.publish_fail_at,
            }))
            .gate(gate.clone())
            .seed(Some(options.seed.unwrap_or(7)));

        if let Some(attempts) = options.max_attempts {
            builder = builder.max_attempts(attempts);
        }

        Self {
            orchestrator: builder.build().unwrap(),
            gate,
            clock,
            log,
        }
    }
}
