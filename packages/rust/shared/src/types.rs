//! Core domain types for centipede feeds.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Width of an aggregation window unless configured otherwise.
pub const DEFAULT_BLOCK_HOURS: i64 = 6;

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// One normalized content item ready for presentation.
///
/// `id` is unique within one crawl's output and doubles as a cache key for
/// derived sources. `content` is self-contained markup whose resource
/// references are already absolute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Canonical link to the item.
    pub link: String,
    /// Display title.
    pub title: String,
    /// Stable identifier (de-dup key).
    pub id: String,
    /// Self-contained HTML body.
    pub content: String,
    /// Present only on items that went through time bucketing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stamp: Option<TimeStamp>,
}

impl Entry {
    /// Build an entry without timing information.
    pub fn new(
        link: impl Into<String>,
        title: impl Into<String>,
        id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            link: link.into(),
            title: title.into(),
            id: id.into(),
            content: content.into(),
            stamp: None,
        }
    }

    /// Attach a timestamp and the block it falls into.
    pub fn with_stamp(mut self, timestamp: DateTime<Utc>, width: TimeDelta) -> Self {
        self.stamp = Some(TimeStamp::new(timestamp, width));
        self
    }
}

/// Timestamp extension of an [`Entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeStamp {
    /// When the item was published.
    pub timestamp: DateTime<Utc>,
    /// Start of the window `timestamp` falls into.
    pub timeblock: DateTime<Utc>,
}

impl TimeStamp {
    pub fn new(timestamp: DateTime<Utc>, width: TimeDelta) -> Self {
        Self {
            timestamp,
            timeblock: floor_to_block(timestamp, width),
        }
    }
}

/// Floor `ts` to the start of its fixed-width window (aligned to the Unix epoch).
pub fn floor_to_block(ts: DateTime<Utc>, width: TimeDelta) -> DateTime<Utc> {
    let width_secs = width.num_seconds().max(1);
    let rem = ts.timestamp().rem_euclid(width_secs);
    ts - TimeDelta::seconds(rem) - TimeDelta::nanoseconds(i64::from(ts.timestamp_subsec_nanos()))
}

// ---------------------------------------------------------------------------
// FeedInfo
// ---------------------------------------------------------------------------

/// Descriptive, immutable part of a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedInfo {
    /// Registry key.
    pub id: String,
    /// Human-readable title.
    pub title: String,
    /// Short description.
    pub subtitle: String,
    /// Home page of the upstream site.
    pub url: String,
}
