//! Timeline image location
//!
//! Given an article title, fetch the rendered article and pull out the first
//! timeline image, normalising its `src` into an absolute `https` URL.

use async_trait::async_trait;
use scraper::Html;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::crawler::WikiClient;
use crate::parser::selectors::TIMELINE_IMAGE;
use crate::utils::error::FetchError;

/// An article's timeline image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineImage {
    /// Article title
    pub title: String,
    /// Absolute image URL
    pub image_url: String,
}

/// Finds the timeline image of an article
#[async_trait]
pub trait ImageLocator: Send + Sync {
    /// `Ok(None)` when the article has no timeline image
    async fn locate_image(&self, title: &str) -> Result<Option<TimelineImage>, FetchError>;
}

/// Build the article URL for `title` under `origin`
///
/// Spaces become underscores and the title is percent-encoded as a single
/// path segment.
///
/// # Errors
///
/// Returns `FetchError::InvalidUrl` if `origin` cannot carry a path
pub fn article_url(origin: &Url, title: &str) -> Result<Url, FetchError> {
    let page = title.trim().replace(' ', "_");
    let mut url = origin.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|()| FetchError::InvalidUrl(origin.to_string()))?
        .clear()
        .push("wiki")
        .push(&page);
    Ok(url)
}

/// First timeline image `src` in `html`, if any
pub fn extract_image_src(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    TIMELINE_IMAGE.iter().find_map(|selector| {
        document
            .select(selector)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(str::trim)
            .filter(|src| !src.is_empty())
            .map(str::to_string)
    })
}

/// Turn an image `src` into an absolute `https` URL
///
/// - `//host/path` gets an `https:` scheme
/// - `/path` is resolved against the site origin
/// - `http://` is upgraded to `https://`
/// - anything else relative is resolved against the page URL
///
/// # Errors
///
/// Returns `FetchError::InvalidUrl` if the result is not a valid URL
pub fn normalize_image_url(src: &str, origin: &Url, page_url: &Url) -> Result<String, FetchError> {
    let src = src.trim();

    let absolute = if src.starts_with("//") {
        format!("https:{src}")
    } else if src.starts_with('/') {
        origin
            .join(src)
            .map_err(|e| FetchError::InvalidUrl(format!("{src}: {e}")))?
            .to_string()
    } else if let Some(rest) = strip_prefix_ignore_case(src, "http://") {
        format!("https://{rest}")
    } else if strip_prefix_ignore_case(src, "https://").is_some() {
        src.to_string()
    } else {
        page_url
            .join(src)
            .map_err(|e| FetchError::InvalidUrl(format!("{src}: {e}")))?
            .to_string()
    };

    Url::parse(&absolute)
        .map(|_| absolute.clone())
        .map_err(|e| FetchError::InvalidUrl(format!("{absolute}: {e}")))
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    s.get(..prefix.len())
        .filter(|head| head.eq_ignore_ascii_case(prefix))
        .map(|_| &s[prefix.len()..])
}

/// Locates timeline images by scraping article pages
#[derive(Clone)]
pub struct TimelineLocator {
    client: WikiClient,
    origin: Url,
}

impl TimelineLocator {
    /// Create a locator for articles under `site_origin`
    ///
    /// # Errors
    ///
    /// Returns `FetchError::InvalidUrl` if `site_origin` does not parse
    pub fn new(client: WikiClient, site_origin: &str) -> Result<Self, FetchError> {
        let origin = Url::parse(site_origin)
            .map_err(|e| FetchError::InvalidUrl(format!("{site_origin}: {e}")))?;
        Ok(Self { client, origin })
    }

    /// Article URL for `title`
    pub fn article_url(&self, title: &str) -> Result<Url, FetchError> {
        article_url(&self.origin, title)
    }
}

#[async_trait]
impl ImageLocator for TimelineLocator {
    async fn locate_image(&self, title: &str) -> Result<Option<TimelineImage>, FetchError> {
        let page_url = self.article_url(title)?;
        let html = self.client.fetch_text(page_url.as_str()).await?;

        let Some(src) = extract_image_src(&html) else {
            tracing::debug!(title, "No timeline image on page");
            return Ok(None);
        };

        let image_url = match normalize_image_url(&src, &self.origin, &page_url) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(title, src = %src, error = %e, "Unusable timeline image source");
                return Ok(None);
            }
        };
        tracing::debug!(title, image_url = %image_url, "Found timeline image");

        Ok(Some(TimelineImage {
            title: title.to_string(),
            image_url,
        }))
    }
}
