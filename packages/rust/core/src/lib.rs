//! Crawl pipeline for centipede.
//!
//! This crate ties the crawler's adapters to the persistent cache: a shared
//! [`WorkerPool`], the [`ContentCache`] miss resolver, the [`FeedSource`]
//! implementations (including the time-bucketed [`DigestSource`]) and the
//! [`Registry`] that owns every [`Feed`].

pub mod aggregator;
pub mod cache;
pub mod feed;
pub mod pool;
pub mod registry;
pub mod source;

pub use aggregator::{DigestSource, aggregate, fold_blocks, stamp_item};
pub use cache::{ContentCache, Resolution};
pub use feed::Feed;
pub use pool::WorkerPool;
pub use registry::{Registry, build_source};
pub use source::{AdapterSource, DailySource, FeedSource};
