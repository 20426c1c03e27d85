//! The `FeedSource` capability and its adapter-backed implementations.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument};

use centipede_crawler::{DailyPages, Fetcher, SourceAdapter};
use centipede_shared::{Entry, Result};

use crate::cache::ContentCache;

/// Something that can produce this cycle's entries.
///
/// Per-item failures never surface here; they only make the item missing.
/// An `Err` means the source as a whole could not be listed.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Short name of the source kind, for logging.
    fn kind(&self) -> &'static str;

    /// List candidate items and resolve them through `cache`.
    async fn crawl(&self, cache: &ContentCache) -> Result<Vec<Entry>>;
}

/// A listing adapter whose items are transformed one by one on cache misses.
pub struct AdapterSource {
    adapter: Arc<dyn SourceAdapter>,
    fetcher: Fetcher,
}

impl AdapterSource {
    pub fn new(adapter: Arc<dyn SourceAdapter>, fetcher: Fetcher) -> Self {
        Self { adapter, fetcher }
    }
}

#[async_trait]
impl FeedSource for AdapterSource {
    fn kind(&self) -> &'static str {
        "adapter"
    }

    #[instrument(skip_all, fields(adapter = self.adapter.name()))]
    async fn crawl(&self, cache: &ContentCache) -> Result<Vec<Entry>> {
        let items = self.adapter.list_items(&self.fetcher).await?;
        debug!(items = items.len(), "resolving listed items");

        let values = cache
            .get_or_calc(items, |key, meta| {
                let adapter = Arc::clone(&self.adapter);
                let fetcher = self.fetcher.clone();
                async move { adapter.transform(&fetcher, &key, meta).await }
            })
            .await?;
        Ok(values.into_iter().flatten().collect())
    }
}

/// One page per day, keyed by date, with no listing fetch.
pub struct DailySource {
    pages: Arc<DailyPages>,
    fetcher: Fetcher,
}

impl DailySource {
    pub fn new(pages: DailyPages, fetcher: Fetcher) -> Self {
        Self {
            pages: Arc::new(pages),
            fetcher,
        }
    }
}

#[async_trait]
impl FeedSource for DailySource {
    fn kind(&self) -> &'static str {
        "daily"
    }

    async fn crawl(&self, cache: &ContentCache) -> Result<Vec<Entry>> {
        let keys = self.pages.keys(Utc::now().date_naive());
        let values = cache
            .get_or_calc_keys(keys, |key| {
                let pages = Arc::clone(&self.pages);
                let fetcher = self.fetcher.clone();
                async move { pages.transform(&fetcher, &key).await }
            })
            .await?;
        Ok(values.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_cache;
    use centipede_crawler::SectionsAdapter;
    use centipede_shared::BodyRule;
    use std::time::Duration;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn body(blocks: &[&str]) -> BodyRule {
        BodyRule {
            container: None,
            blocks: blocks.iter().map(|b| b.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn adapter_source_skips_broken_items_and_caches_the_rest() {
        let server = MockServer::start().await;
        Mock::given(path("/briefe/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<div class="heft_text">
                     <div class="csc-default"><h1>Eins</h1><p class="bodytext">a</p></div>
                     <div class="csc-default"><p class="bodytext">kein Titel</p></div>
                     <div class="csc-default"><h1>Drei</h1><p class="bodytext">c</p></div>
                   </div>"#,
            ))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(Duration::from_secs(5)).unwrap();
        let adapter = SectionsAdapter::new(
            &format!("{}/briefe/", server.uri()),
            "div.heft_text div.csc-default",
            "h1",
            &body(&["p.bodytext"]),
        )
        .unwrap();
        let source = AdapterSource::new(Arc::new(adapter), fetcher);
        let cache = temp_cache(Duration::from_secs(2)).await;

        let entries = source.crawl(&cache).await.unwrap();
        let titles: Vec<_> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Eins", "Drei"]);
        assert_eq!(cache.len().await.unwrap(), 2);

        let again = source.crawl(&cache).await.unwrap();
        assert_eq!(again, entries);
    }

    #[tokio::test]
    async fn daily_source_keeps_days_that_resolved() {
        let server = MockServer::start().await;
        let today = Utc::now().date_naive();
        Mock::given(path(today.format("/%Y-%m-%d.html").to_string()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"<div class="strip"><img src="today.png"></div>"#),
            )
            .mount(&server)
            .await;

        let pages = DailyPages::new(
            &format!("{}/%Y-%m-%d.html", server.uri()),
            3,
            "%d.%m.%Y",
            &body(&["div.strip"]),
        )
        .unwrap();
        let fetcher = Fetcher::new(Duration::from_secs(5)).unwrap();
        let source = DailySource::new(pages, fetcher);
        let cache = temp_cache(Duration::from_secs(2)).await;

        let entries = source.crawl(&cache).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, today.format("%d.%m.%Y").to_string());
        assert!(
            cache
                .get::<Entry>(&today.format("%Y-%m-%d").to_string())
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn unreachable_listing_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(path("/briefe/"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let adapter = SectionsAdapter::new(
            &format!("{}/briefe/", server.uri()),
            "div",
            "h1",
            &body(&["p"]),
        )
        .unwrap();
        let source = AdapterSource::new(
            Arc::new(adapter),
            Fetcher::new(Duration::from_secs(5)).unwrap(),
        );
        let cache = temp_cache(Duration::from_secs(2)).await;

        assert!(source.crawl(&cache).await.is_err());
    }
}
