//! HTML parsing and timeline image extraction
//!
//! This module handles parsing rendered article pages and extracting the
//! timeline image URL.

pub mod selectors;
pub mod timeline;

// Re-export main locator and public types
pub use timeline::{
    article_url, extract_image_src, normalize_image_url, ImageLocator, TimelineImage,
    TimelineLocator,
};
