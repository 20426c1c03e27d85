//! Fetching, structured-document helpers and site adapters.
//!
//! This crate provides:
//! - [`fetch`]: the stateless HTTP [`Fetcher`]
//! - [`extract`]: body-region extraction and link absolutization
//! - [`adapters`]: listing + transform implementations for the supported sites

pub mod adapters;
pub mod extract;
pub mod fetch;

pub use adapters::{
    DailyPages, ItemListing, ItemMeta, RssFulltextAdapter, RssListing, SectionsAdapter,
    SourceAdapter, parse_feed_items,
};
pub use extract::{BodyExtractor, NamedSelector, absolutize_links, element_text};
pub use fetch::Fetcher;
