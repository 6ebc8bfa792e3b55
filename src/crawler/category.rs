//! Category member listing with pagination and keyword filtering
//!
//! Candidates come from the MediaWiki `list=categorymembers` API. Titles
//! matching the denylist (storm seasons, conferences and similar pages whose
//! timelines are rarely interesting on their own) are dropped.

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::collections::HashMap;

use crate::config::WikiConfig;
use crate::crawler::WikiClient;
use crate::utils::error::FetchError;

/// Source of candidate article titles
#[async_trait]
pub trait CategoryLister: Send + Sync {
    /// Fetch the filtered candidate list, in source order
    async fn list_candidates(&self) -> Result<Vec<String>, FetchError>;
}

// ============================================================================
// Denylist
// ============================================================================

/// Case-insensitive literal keyword filter
#[derive(Debug, Clone)]
pub struct Denylist {
    pattern: Option<Regex>,
}

impl Denylist {
    /// Build from keywords; blank keywords are ignored
    ///
    /// # Errors
    ///
    /// Returns the regex error if the combined pattern exceeds the size limit
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Result<Self, regex::Error> {
        let alternatives: Vec<String> = keywords
            .iter()
            .map(|k| k.as_ref().trim())
            .filter(|k| !k.is_empty())
            .map(regex::escape)
            .collect();

        if alternatives.is_empty() {
            return Ok(Self { pattern: None });
        }

        let pattern = RegexBuilder::new(&alternatives.join("|"))
            .case_insensitive(true)
            .build()?;

        Ok(Self {
            pattern: Some(pattern),
        })
    }

    /// Whether `title` contains any keyword
    pub fn is_denied(&self, title: &str) -> bool {
        self.pattern.as_ref().is_some_and(|p| p.is_match(title))
    }

    /// Keep allowed titles, preserving order
    pub fn filter(&self, titles: Vec<String>) -> Vec<String> {
        titles.into_iter().filter(|t| !self.is_denied(t)).collect()
    }
}

// ============================================================================
// MediaWiki response shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct CategoryMembersResponse {
    query: CategoryMembersQuery,
    #[serde(rename = "continue", default)]
    continuation: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct CategoryMembersQuery {
    categorymembers: Vec<CategoryMember>,
}

#[derive(Debug, Deserialize)]
struct CategoryMember {
    title: String,
}

// ============================================================================
// Lister
// ============================================================================

/// Lists category members through the MediaWiki action API
pub struct WikiCategoryLister {
    client: WikiClient,
    api_url: String,
    category: String,
    namespace: i32,
    page_size: u32,
    max_pages: u32,
    denylist: Denylist,
}

impl WikiCategoryLister {
    /// Create a lister from the wiki settings
    ///
    /// # Errors
    ///
    /// Returns the regex error if the denylist cannot be compiled
    pub fn new(client: WikiClient, config: &WikiConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            category: config.category.clone(),
            namespace: config.namespace,
            page_size: config.page_size,
            max_pages: config.max_pages.max(1),
            denylist: Denylist::new(config.denylist.as_slice())?,
        })
    }

    /// Category being listed
    pub fn category(&self) -> &str {
        &self.category
    }

    fn base_query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("action", "query".to_string()),
            ("list", "categorymembers".to_string()),
            ("cmtitle", self.category.clone()),
            ("cmlimit", self.page_size.to_string()),
            ("cmnamespace", self.namespace.to_string()),
            ("format", "json".to_string()),
        ]
    }

    /// Fetch raw member titles, following continuation up to `max_pages`
    pub async fn fetch_titles(&self) -> Result<Vec<String>, FetchError> {
        let mut titles = Vec::new();
        let mut continuation: Option<HashMap<String, serde_json::Value>> = None;
        let mut page = 1;

        loop {
            let mut query = self.base_query();
            if let Some(cont) = &continuation {
                // MediaWiki expects every continuation field echoed back
                for (key, value) in cont {
                    let value = match value {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    if let Some(name) = continuation_param(key) {
                        query.push((name, value));
                    }
                }
            }

            tracing::debug!(category = %self.category, page, "Fetching category members");

            let response: CategoryMembersResponse =
                self.client.fetch_json(&self.api_url, &query).await?;

            let count = response.query.categorymembers.len();
            titles.extend(
                response
                    .query
                    .categorymembers
                    .into_iter()
                    .map(|m| m.title),
            );

            tracing::debug!(page, count, total = titles.len(), "Category page fetched");

            match response.continuation {
                Some(cont) if !cont.is_empty() => {
                    if page >= self.max_pages {
                        tracing::debug!(page, max_pages = self.max_pages, "Reached maximum pages limit");
                        break;
                    }
                    continuation = Some(cont);
                    page += 1;
                }
                _ => break,
            }
        }

        Ok(titles)
    }
}

/// Map a continuation field to a static query key
///
/// Only the fields `list=categorymembers` emits are forwarded.
fn continuation_param(key: &str) -> Option<&'static str> {
    match key {
        "cmcontinue" => Some("cmcontinue"),
        "continue" => Some("continue"),
        _ => None,
    }
}

#[async_trait]
impl CategoryLister for WikiCategoryLister {
    async fn list_candidates(&self) -> Result<Vec<String>, FetchError> {
        let titles = self.fetch_titles().await?;
        let total = titles.len();
        let candidates = self.denylist.filter(titles);

        tracing::info!(
            category = %self.category,
            total,
            candidates = candidates.len(),
            "Listed timeline candidates"
        );

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_DENYLIST;

    #[test]
    fn test_default_denylist() {
        let denylist = Denylist::new(DEFAULT_DENYLIST).unwrap();

        assert!(denylist.is_denied("2020 Atlantic hurricane season"));
        assert!(denylist.is_denied("Cyclone Tracy"));
        assert!(denylist.is_denied("Typhoon Haiyan"));
        assert!(denylist.is_denied("Big Ten CONFERENCE"));
        assert!(!denylist.is_denied("Example Article"));
        assert!(!denylist.is_denied("History of Rome"));
    }

    #[test]
    fn test_denylist_is_literal() {
        let denylist = Denylist::new(&["c++", "a.b"]).unwrap();

        assert!(denylist.is_denied("Learning C++ in a day"));
        assert!(denylist.is_denied("a.b testing"));
        assert!(!denylist.is_denied("axb testing"));
    }

    #[test]
    fn test_empty_denylist_allows_everything() {
        let denylist = Denylist::new(&["", "  "]).unwrap();
        assert!(!denylist.is_denied("Anything at all"));
    }

    #[test]
    fn test_filter_keeps_order_and_duplicates() {
        let denylist = Denylist::new(&["season"]).unwrap();
        let titles = vec![
            "B".to_string(),
            "1999 season".to_string(),
            "A".to_string(),
            "B".to_string(),
        ];
        assert_eq!(denylist.filter(titles), vec!["B", "A", "B"]);
    }

    #[test]
    fn test_parse_categorymembers_response() {
        let body = r#"{
            "batchcomplete": "",
            "continue": {"cmcontinue": "page|ABC|123", "continue": "-||"},
            "query": {"categorymembers": [
                {"pageid": 1, "ns": 0, "title": "Alpha"},
                {"pageid": 2, "ns": 0, "title": "Beta"}
            ]}
        }"#;

        let parsed: CategoryMembersResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.query.categorymembers.len(), 2);
        assert_eq!(parsed.query.categorymembers[1].title, "Beta");
        let cont = parsed.continuation.unwrap();
        assert_eq!(cont["cmcontinue"], "page|ABC|123");
    }

    #[test]
    fn test_parse_rejects_error_body() {
        let body = r#"{"error": {"code": "badvalue", "info": "nope"}}"#;
        assert!(serde_json::from_str::<CategoryMembersResponse>(body).is_err());
    }
}
