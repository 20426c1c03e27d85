//! Feed registry built once at startup.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::TimeDelta;
use tracing::{debug, info};

use centipede_crawler::{DailyPages, Fetcher, RssFulltextAdapter, RssListing, SectionsAdapter};
use centipede_shared::{
    AppConfig, CentipedeError, FeedConfig, FeedInfo, PipelineConfig, Result, SourceConfig,
};
use centipede_storage::Storage;

use crate::aggregator::DigestSource;
use crate::cache::ContentCache;
use crate::feed::Feed;
use crate::pool::WorkerPool;
use crate::source::{AdapterSource, DailySource, FeedSource};

/// Feeds by id, in registration order.
///
/// All feeds share one worker pool and one storage handle; each feed's cache
/// uses the feed id as its namespace.
pub struct Registry {
    feeds: Vec<Feed>,
    index: HashMap<String, usize>,
    pool: WorkerPool,
}

impl Registry {
    pub fn new(pool: WorkerPool) -> Self {
        Self {
            feeds: Vec::new(),
            index: HashMap::new(),
            pool,
        }
    }

    /// Build every configured feed.
    pub fn from_config(
        config: &AppConfig,
        pipeline: &PipelineConfig,
        storage: Arc<Storage>,
        fetcher: Fetcher,
    ) -> Result<Self> {
        let mut registry = Self::new(WorkerPool::new(pipeline.workers));

        for feed_config in &config.feeds {
            let source = build_source(feed_config, &fetcher, pipeline.block_width)?;
            let cache = ContentCache::new(
                Arc::clone(&storage),
                feed_config.id.as_str(),
                registry.pool.clone(),
                pipeline.batch_deadline,
            );
            let info = FeedInfo {
                id: feed_config.id.clone(),
                title: feed_config.title.clone(),
                subtitle: feed_config.subtitle.clone(),
                url: feed_config.url.clone(),
            };
            debug!(feed = %info.id, kind = source.kind(), "registering feed");
            registry.register(Feed::new(info, source, cache))?;
        }

        info!(
            feeds = registry.len(),
            workers = registry.pool.size(),
            "registry ready"
        );
        Ok(registry)
    }

    /// Add a feed; ids must be unique.
    pub fn register(&mut self, feed: Feed) -> Result<()> {
        if self.index.contains_key(feed.id()) {
            return Err(CentipedeError::config(format!(
                "feed id '{}' is registered twice",
                feed.id()
            )));
        }
        self.index.insert(feed.id().to_string(), self.feeds.len());
        self.feeds.push(feed);
        Ok(())
    }

    /// Look up a feed by id.
    pub fn get(&self, id: &str) -> Result<&Feed> {
        self.index
            .get(id)
            .map(|&i| &self.feeds[i])
            .ok_or_else(|| CentipedeError::UnknownFeed(id.to_string()))
    }

    pub fn feeds(&self) -> impl Iterator<Item = &Feed> {
        self.feeds.iter()
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}

/// Compose the source described by a feed's configuration.
pub fn build_source(
    feed: &FeedConfig,
    fetcher: &Fetcher,
    block_width: TimeDelta,
) -> Result<Box<dyn FeedSource>> {
    let with_feed = |e: CentipedeError| match e {
        CentipedeError::Config { message } => {
            CentipedeError::config(format!("feed '{}': {message}", feed.id))
        }
        other => other,
    };

    let source: Box<dyn FeedSource> = match &feed.source {
        SourceConfig::RssFulltext { feed_url, body } => {
            let adapter = RssFulltextAdapter::new(feed_url.as_str(), body).map_err(with_feed)?;
            Box::new(AdapterSource::new(Arc::new(adapter), fetcher.clone()))
        }
        SourceConfig::Sections {
            section_selector,
            title_selector,
            body,
        } => {
            let adapter = SectionsAdapter::new(&feed.url, section_selector, title_selector, body)
                .map_err(with_feed)?;
            Box::new(AdapterSource::new(Arc::new(adapter), fetcher.clone()))
        }
        SourceConfig::Daily {
            url_template,
            days,
            title_format,
            body,
        } => {
            let pages =
                DailyPages::new(url_template, *days, title_format, body).map_err(with_feed)?;
            Box::new(DailySource::new(pages, fetcher.clone()))
        }
        SourceConfig::Digest { feed_url } => Box::new(DigestSource::new(
            Arc::new(RssListing::new(feed_url.as_str())),
            fetcher.clone(),
            block_width,
        )),
    };
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_storage;
    use centipede_shared::BodyRule;
    use std::time::Duration;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> Fetcher {
        Fetcher::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn builds_default_feeds_in_order() {
        let config = AppConfig::default();
        let pipeline = PipelineConfig::from(&config);
        let registry =
            Registry::from_config(&config, &pipeline, temp_storage().await, fetcher()).unwrap();

        let ids: Vec<_> = registry.feeds().map(|f| f.id()).collect();
        assert_eq!(ids, vec!["titanic", "titanic_briefe", "titanic_fachmann"]);
        assert_eq!(registry.get("titanic_briefe").unwrap().cache().namespace(), "titanic_briefe");
        assert_eq!(registry.pool().size(), 10);
    }

    #[tokio::test]
    async fn unknown_id_is_distinct_error() {
        let registry = Registry::new(WorkerPool::new(1));
        let err = registry.get("nope").err().unwrap();
        assert!(matches!(err, CentipedeError::UnknownFeed(ref id) if id == "nope"));
    }

    #[tokio::test]
    async fn bad_selector_names_the_feed() {
        let mut config = AppConfig::default();
        config.feeds[0].source = SourceConfig::RssFulltext {
            feed_url: "http://t.example/rss".into(),
            body: BodyRule {
                container: None,
                blocks: vec!["p[[".into()],
            },
        };
        let pipeline = PipelineConfig::from(&config);
        let err = Registry::from_config(&config, &pipeline, temp_storage().await, fetcher())
            .err()
            .unwrap();
        assert!(err.to_string().contains("feed 'titanic'"));
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let mut config = AppConfig::default();
        config.feeds.truncate(1);
        let pipeline = PipelineConfig::from(&config);
        let storage = temp_storage().await;
        let mut registry =
            Registry::from_config(&config, &pipeline, Arc::clone(&storage), fetcher()).unwrap();

        let again = Registry::from_config(&config, &pipeline, storage, fetcher()).unwrap();
        let feed = again.feeds.into_iter().next().unwrap();
        assert!(registry.register(feed).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn crawls_a_configured_feed_end_to_end() {
        let server = MockServer::start().await;
        Mock::given(path("/briefe/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<div class="heft_text"><div class="csc-default">
                     <h1>Liebe Leser</h1><p class="bodytext">Text <img src="b.png"></p>
                   </div></div>"#,
            ))
            .mount(&server)
            .await;

        let mut config = AppConfig::default();
        config.feeds.retain(|f| f.id == "titanic_briefe");
        config.feeds[0].url = format!("{}/briefe/", server.uri());
        let pipeline = PipelineConfig::from(&config);
        let registry =
            Registry::from_config(&config, &pipeline, temp_storage().await, fetcher()).unwrap();

        let feed = registry.get("titanic_briefe").unwrap();
        assert_eq!(feed.crawl().await, 1);
        let entries = feed.entries().await;
        assert_eq!(entries[0].title, "Liebe Leser");
        assert!(entries[0].content.contains(&format!("{}/briefe/b.png", server.uri())));
        assert_eq!(feed.cache().len().await.unwrap(), 1);
    }
}
