//! A registered feed: descriptive info, its source, its cache and the
//! entries of the most recent crawl.

use std::time::Instant;

use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use centipede_shared::{Entry, FeedInfo};

use crate::cache::ContentCache;
use crate::source::FeedSource;

pub struct Feed {
    info: FeedInfo,
    source: Box<dyn FeedSource>,
    cache: ContentCache,
    entries: RwLock<Vec<Entry>>,
}

impl Feed {
    pub fn new(info: FeedInfo, source: Box<dyn FeedSource>, cache: ContentCache) -> Self {
        Self {
            info,
            source,
            cache,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn info(&self) -> &FeedInfo {
        &self.info
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Recompute the entry list, replacing the previous one wholesale.
    ///
    /// Never fails: a source that cannot be listed leaves an empty list.
    /// Returns the number of entries now held.
    #[instrument(skip_all, fields(feed = %self.info.id, kind = self.source.kind()))]
    pub async fn crawl(&self) -> usize {
        let started = Instant::now();
        let entries = match self.source.crawl(&self.cache).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "crawl failed, publishing no entries");
                Vec::new()
            }
        };

        let count = entries.len();
        *self.entries.write().await = entries;
        info!(
            entries = count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "crawl finished"
        );
        count
    }

    /// Snapshot of the entries from the most recent crawl.
    pub async fn entries(&self) -> Vec<Entry> {
        self.entries.read().await.clone()
    }
}
