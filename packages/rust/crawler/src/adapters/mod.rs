//! Site adapter traits and built-in adapters.
//!
//! An adapter knows two things about a site: how to enumerate this cycle's
//! candidate items as `(key, metadata)` pairs, and how to turn one item into
//! a normalized [`Entry`]. The transform only runs for cache misses.

mod daily;
mod rss;
mod sections;

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::debug;

use centipede_shared::{Entry, Result};

use crate::fetch::Fetcher;

pub use daily::DailyPages;
pub use rss::{RssFulltextAdapter, RssListing, parse_feed_items};
pub use sections::SectionsAdapter;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Raw metadata carried from the listing step to the transform.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemMeta {
    /// Item URL, when the listing knows it.
    pub link: Option<String>,
    /// Item title as listed.
    pub title: Option<String>,
    /// Publication time exactly as the upstream wrote it.
    pub published: Option<String>,
    /// Item markup, when the listing page already carries the whole item.
    pub markup: Option<String>,
}

/// Enumerates the candidate items of the current cycle.
#[async_trait]
pub trait ItemListing: Send + Sync {
    /// Ordered `(key, metadata)` pairs with unique keys.
    async fn list_items(&self, fetcher: &Fetcher) -> Result<Vec<(String, ItemMeta)>>;
}

/// A listing plus the per-item transform.
#[async_trait]
pub trait SourceAdapter: ItemListing {
    /// Human-readable adapter name for tracing.
    fn name(&self) -> &str;

    /// Build the entry for one listed item.
    ///
    /// Fails with `Parse` when the expected structure is missing and with
    /// `Network` when a required fetch fails; never returns a partial entry.
    async fn transform(&self, fetcher: &Fetcher, key: &str, meta: ItemMeta) -> Result<Entry>;
}

/// Drop repeated keys, keeping the first occurrence.
pub(crate) fn dedup_items(items: Vec<(String, ItemMeta)>) -> Vec<(String, ItemMeta)> {
    let mut seen = HashSet::new();
    let before = items.len();
    let unique: Vec<_> = items
        .into_iter()
        .filter(|(key, _)| seen.insert(key.clone()))
        .collect();
    if unique.len() < before {
        debug!(dropped = before - unique.len(), "dropped duplicate item keys");
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_keeps_first_occurrence() {
        let items = vec![
            ("a".to_string(), ItemMeta { title: Some("first".into()), ..Default::default() }),
            ("b".to_string(), ItemMeta::default()),
            ("a".to_string(), ItemMeta { title: Some("second".into()), ..Default::default() }),
        ];
        let unique = dedup_items(items);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].0, "a");
        assert_eq!(unique[0].1.title.as_deref(), Some("first"));
        assert_eq!(unique[1].0, "b");
    }
}
