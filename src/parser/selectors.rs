//! CSS selectors for timeline markup
//!
//! Graphical timelines are rendered server-side into an image wrapped in a
//! `.timeline-wrapper` container.

use lazy_static::lazy_static;
use scraper::Selector;

// Helper macro to parse selectors safely at compile time
macro_rules! parse_selector {
    ($s:expr) => {
        Selector::parse($s).expect(concat!("Invalid CSS selector: ", $s))
    };
}

lazy_static! {
    /// Tried in order; the first match wins
    pub static ref TIMELINE_IMAGE: Vec<Selector> = vec![
        parse_selector!(".timeline-wrapper img"),
    ];
}
