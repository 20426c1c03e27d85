//! RSS/Atom listing and the full-text adapter built on it.

use async_trait::async_trait;
use scraper::Html;
use tracing::{debug, info, instrument, warn};
use url::Url;

use centipede_shared::{BodyRule, CentipedeError, Entry, Result};

use super::{ItemListing, ItemMeta, SourceAdapter, dedup_items};
use crate::extract::{BodyExtractor, absolutize_links};
use crate::fetch::Fetcher;

/// Lists the items of an RSS or Atom feed, keyed by their guid.
#[derive(Debug, Clone)]
pub struct RssListing {
    feed_url: String,
}

impl RssListing {
    pub fn new(feed_url: impl Into<String>) -> Self {
        Self {
            feed_url: feed_url.into(),
        }
    }

    pub fn feed_url(&self) -> &str {
        &self.feed_url
    }
}

#[async_trait]
impl ItemListing for RssListing {
    #[instrument(skip_all, fields(feed_url = %self.feed_url))]
    async fn list_items(&self, fetcher: &Fetcher) -> Result<Vec<(String, ItemMeta)>> {
        let bytes = fetcher.fetch(&self.feed_url, None).await?;
        let items = parse_feed_items(&bytes)?;
        info!(count = items.len(), "listed feed items");
        Ok(items)
    }
}

/// Parse feed bytes into `(guid, metadata)` pairs, skipping items without a link.
pub fn parse_feed_items(bytes: &[u8]) -> Result<Vec<(String, ItemMeta)>> {
    let feed = feed_rs::parser::parse(bytes)
        .map_err(|e| CentipedeError::parse(format!("failed to parse feed: {e}")))?;

    let mut items = Vec::with_capacity(feed.entries.len());
    for entry in feed.entries {
        let Some(link) = entry.links.first().map(|l| l.href.clone()) else {
            warn!(id = %entry.id, "feed item has no link, skipping");
            continue;
        };
        let key = if entry.id.is_empty() {
            link.clone()
        } else {
            entry.id.clone()
        };

        items.push((
            key,
            ItemMeta {
                link: Some(link),
                title: entry.title.map(|t| t.content),
                published: entry.published.or(entry.updated).map(|dt| dt.to_rfc3339()),
                markup: None,
            },
        ));
    }

    Ok(dedup_items(items))
}

// ---------------------------------------------------------------------------
// Full-text adapter
// ---------------------------------------------------------------------------

/// Fetches each feed item's page and extracts its body region.
pub struct RssFulltextAdapter {
    listing: RssListing,
    body: BodyExtractor,
}

impl RssFulltextAdapter {
    pub fn new(feed_url: impl Into<String>, body: &BodyRule) -> Result<Self> {
        Ok(Self {
            listing: RssListing::new(feed_url),
            body: BodyExtractor::from_rule(body)?,
        })
    }
}

#[async_trait]
impl ItemListing for RssFulltextAdapter {
    async fn list_items(&self, fetcher: &Fetcher) -> Result<Vec<(String, ItemMeta)>> {
        self.listing.list_items(fetcher).await
    }
}

#[async_trait]
impl SourceAdapter for RssFulltextAdapter {
    fn name(&self) -> &str {
        "rss_fulltext"
    }

    #[instrument(level = "debug", skip_all, fields(key = %key))]
    async fn transform(&self, fetcher: &Fetcher, key: &str, meta: ItemMeta) -> Result<Entry> {
        let link = meta
            .link
            .ok_or_else(|| CentipedeError::parse(format!("item {key} has no link")))?;
        let page_url = Url::parse(&link)
            .map_err(|e| CentipedeError::parse(format!("invalid item link '{link}': {e}")))?;

        let html = fetcher.fetch_text(&link, None).await?;
        let content = extract_article(&html, &self.body, &page_url)?;
        debug!(bytes = content.len(), "extracted article body");

        let title = meta
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| link.clone());
        Ok(Entry::new(link, title, key, content))
    }
}

fn extract_article(html: &str, body: &BodyExtractor, base: &Url) -> Result<String> {
    let doc = Html::parse_document(html);
    let region = body.extract(&doc)?;
    Ok(absolutize_links(&region, base))
}
