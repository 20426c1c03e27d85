//! Time-bucketed digest source.
//!
//! Every listed item is stamped with the block its publication time falls
//! into. Items from the still-open block are deferred rather than cached, so
//! a block is only ever assembled from items that were seen after it closed.
//! The earliest block of each crawl is dropped because its members may have
//! been cached piecemeal before the cache saw the whole block.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, instrument, warn};

use centipede_crawler::{Fetcher, ItemListing, ItemMeta};
use centipede_shared::{CentipedeError, Entry, Result, TimeStamp, floor_to_block};

use crate::cache::ContentCache;
use crate::source::FeedSource;

/// Title timestamp format of a folded block.
const BLOCK_TITLE_FORMAT: &str = "%Y-%m-%d %H:%M";

pub struct DigestSource {
    listing: Arc<dyn ItemListing>,
    fetcher: Fetcher,
    block_width: TimeDelta,
}

impl DigestSource {
    pub fn new(listing: Arc<dyn ItemListing>, fetcher: Fetcher, block_width: TimeDelta) -> Self {
        Self {
            listing,
            fetcher,
            block_width,
        }
    }

    /// Crawl as if the clock read `now`.
    #[instrument(skip_all, fields(now = %now))]
    pub async fn crawl_at(&self, cache: &ContentCache, now: DateTime<Utc>) -> Result<Vec<Entry>> {
        let width = self.block_width;
        let open_block = floor_to_block(now, width);
        let items = self.listing.list_items(&self.fetcher).await?;

        let stamped: Vec<Option<Entry>> = cache
            .get_or_calc(items, move |key, meta| {
                let outcome = stamp_item(&key, meta, open_block, width);
                async move { outcome }
            })
            .await?;

        let entries = aggregate(stamped.into_iter().flatten().collect(), width);
        debug!(blocks = entries.len(), "folded digest blocks");
        Ok(entries)
    }
}

#[async_trait]
impl FeedSource for DigestSource {
    fn kind(&self) -> &'static str {
        "digest"
    }

    async fn crawl(&self, cache: &ContentCache) -> Result<Vec<Entry>> {
        self.crawl_at(cache, Utc::now()).await
    }
}

/// Turn one listed item into a stamped raw entry.
///
/// Items published at or after `open_block` are deferred with `DoNotCache`.
pub fn stamp_item(
    key: &str,
    meta: ItemMeta,
    open_block: DateTime<Utc>,
    width: TimeDelta,
) -> Result<Entry> {
    let published = meta
        .published
        .as_deref()
        .ok_or_else(|| CentipedeError::parse(format!("item {key} has no publication time")))?;
    let timestamp = parse_timestamp(published)?;

    if timestamp >= open_block {
        return Err(CentipedeError::do_not_cache(format!(
            "{key} belongs to the open block starting {open_block}"
        )));
    }

    let link = meta.link.unwrap_or_else(|| key.to_string());
    let title = meta
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| link.clone());
    Ok(Entry::new(link, title, key, String::new()).with_stamp(timestamp, width))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CentipedeError::parse(format!("unreadable timestamp '{raw}': {e}")))
}

/// Fold stamped entries into one entry per block, without the earliest block.
pub fn aggregate(entries: Vec<Entry>, width: TimeDelta) -> Vec<Entry> {
    let mut blocks = fold_blocks(entries, width);
    if !blocks.is_empty() {
        let dropped = blocks.remove(0);
        debug!(block = %dropped.title, "dropping earliest block");
    }
    blocks
}

/// Fold stamped entries into one entry per block, oldest block first.
///
/// Entries without a stamp cannot be placed and are skipped.
pub fn fold_blocks(entries: Vec<Entry>, width: TimeDelta) -> Vec<Entry> {
    let mut stamped: Vec<_> = entries
        .into_iter()
        .filter_map(|entry| match entry.stamp {
            Some(stamp) => Some((stamp, entry)),
            None => {
                warn!(id = %entry.id, "entry has no timestamp, skipping");
                None
            }
        })
        .collect();
    stamped.sort_by_key(|(stamp, _)| stamp.timestamp);

    stamped
        .chunk_by(|(a, _), (b, _)| a.timeblock == b.timeblock)
        .map(|group| fold_group(group, width))
        .collect()
}

fn fold_group(group: &[(TimeStamp, Entry)], width: TimeDelta) -> Entry {
    let (stamp, first) = &group[0];
    let start = stamp.timeblock;
    let end = start + width;

    let mut content = String::from("<ul>\n");
    for (_, member) in group {
        content.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>\n",
            html_escape::encode_double_quoted_attribute(&member.link),
            html_escape::encode_text(&member.title),
        ));
    }
    content.push_str("</ul>");

    let title = format!(
        "{} - {}",
        start.format(BLOCK_TITLE_FORMAT),
        end.format(BLOCK_TITLE_FORMAT)
    );
    Entry::new(first.link.clone(), title, first.id.clone(), content).with_stamp(start, width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_cache;
    use chrono::TimeZone;
    use centipede_crawler::RssListing;
    use std::time::Duration;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn six() -> TimeDelta {
        TimeDelta::hours(6)
    }

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, h, m, 0).unwrap()
    }

    fn raw(id: &str, ts: DateTime<Utc>) -> Entry {
        Entry::new(format!("http://b.example/{id}"), id, id, "").with_stamp(ts, six())
    }

    fn meta(published: &str) -> ItemMeta {
        ItemMeta {
            link: Some("http://b.example/p".into()),
            title: Some("Post".into()),
            published: Some(published.into()),
            markup: None,
        }
    }

    #[test]
    fn groups_sorted_items_by_block() {
        let items = vec![raw("c", at(10, 8, 5)), raw("b", at(10, 3, 40)), raw("a", at(10, 2, 10))];
        let blocks = fold_blocks(items, six());

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].title, "2024-03-10 00:00 - 2024-03-10 06:00");
        assert_eq!(blocks[0].id, "a");
        let a = blocks[0].content.find("/a\"").unwrap();
        let b = blocks[0].content.find("/b\"").unwrap();
        assert!(a < b);
        assert!(!blocks[0].content.contains("/c\""));

        assert_eq!(blocks[1].title, "2024-03-10 06:00 - 2024-03-10 12:00");
        assert_eq!(blocks[1].id, "c");
        assert_eq!(blocks[1].stamp.unwrap().timeblock, at(10, 6, 0));
    }

    #[test]
    fn aggregate_drops_earliest_block() {
        let items = vec![raw("a", at(10, 2, 10)), raw("b", at(10, 3, 40)), raw("c", at(10, 8, 5))];
        let blocks = aggregate(items, six());

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].id, "c");
        assert!(aggregate(Vec::new(), six()).is_empty());
    }

    #[test]
    fn unstamped_entries_are_skipped() {
        let items = vec![raw("a", at(10, 2, 10)), Entry::new("l", "t", "plain", "")];
        let blocks = fold_blocks(items, six());
        assert_eq!(blocks.len(), 1);
        assert!(!blocks[0].content.contains("plain"));
    }

    #[test]
    fn member_markup_is_escaped() {
        let mut entry = raw("a", at(10, 2, 10));
        entry.title = "Tom & <Jerry>".into();
        entry.link = "http://b.example/?a=1&b=\"2\"".into();
        let block = &fold_blocks(vec![entry], six())[0];

        assert!(block.content.contains("Tom &amp; &lt;Jerry&gt;"));
        assert!(block.content.contains("&quot;2&quot;"));
    }

    #[test]
    fn open_block_item_is_deferred() {
        let open = at(10, 12, 0);
        let err = stamp_item("k", meta("2024-03-10T12:00:00+00:00"), open, six()).unwrap_err();
        assert!(err.is_do_not_cache());

        let err = stamp_item("k", meta("2024-03-10T13:30:00Z"), open, six()).unwrap_err();
        assert!(err.is_do_not_cache());
    }

    #[test]
    fn closed_block_item_is_stamped() {
        let entry =
            stamp_item("k", meta("Sun, 10 Mar 2024 08:05:00 GMT"), at(10, 12, 0), six()).unwrap();
        let stamp = entry.stamp.unwrap();
        assert_eq!(stamp.timestamp, at(10, 8, 5));
        assert_eq!(stamp.timeblock, at(10, 6, 0));
        assert_eq!(entry.id, "k");
        assert_eq!(entry.title, "Post");
    }

    #[test]
    fn missing_or_bad_timestamp_is_parse_error() {
        let mut no_time = meta("");
        no_time.published = None;
        let err = stamp_item("k", no_time, at(10, 12, 0), six()).unwrap_err();
        assert!(matches!(err, CentipedeError::Parse { .. }));

        let err = stamp_item("k", meta("yesterday"), at(10, 12, 0), six()).unwrap_err();
        assert!(matches!(err, CentipedeError::Parse { .. }));
    }

    fn board_feed(base: &str) -> String {
        let item = |id: &str, date: &str| {
            format!(
                "<item><title>Post {id}</title><link>{base}/p/{id}</link>\
                 <guid>{id}</guid><pubDate>{date}</pubDate></item>"
            )
        };
        format!(
            "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>Board</title>\
             <link>{base}</link><description>d</description>{}{}{}{}</channel></rss>",
            item("p1", "Sun, 10 Mar 2024 02:10:00 GMT"),
            item("p2", "Sun, 10 Mar 2024 03:40:00 GMT"),
            item("p3", "Sun, 10 Mar 2024 08:05:00 GMT"),
            item("p4", "Sun, 10 Mar 2024 13:30:00 GMT"),
        )
    }

    #[tokio::test]
    async fn open_block_is_picked_up_once_closed() {
        let server = MockServer::start().await;
        Mock::given(path("/board.rss"))
            .respond_with(ResponseTemplate::new(200).set_body_string(board_feed(&server.uri())))
            .mount(&server)
            .await;

        let cache = temp_cache(Duration::from_secs(2)).await;
        let fetcher = Fetcher::new(Duration::from_secs(5)).unwrap();
        let listing = Arc::new(RssListing::new(format!("{}/board.rss", server.uri())));
        let source = DigestSource::new(listing, fetcher, six());

        let entries = source.crawl_at(&cache, at(10, 14, 0)).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "p3");
        assert!(!entries.iter().any(|e| e.content.contains("/p/p4")));
        assert_eq!(cache.len().await.unwrap(), 3);
        assert!(cache.get::<Entry>("p4").await.unwrap().is_none());

        let entries = source.crawl_at(&cache, at(10, 19, 0)).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].id, "p4");
        assert_eq!(entries[1].title, "2024-03-10 12:00 - 2024-03-10 18:00");
        assert_eq!(cache.len().await.unwrap(), 4);
    }
}
