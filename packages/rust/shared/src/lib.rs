//! Shared types, error model, and configuration for centipede.
//!
//! This crate is the foundation depended on by all other centipede crates.
//! It provides:
//! - [`CentipedeError`]: the unified error type
//! - Domain types ([`Entry`], [`TimeStamp`], [`FeedInfo`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BodyRule, DefaultsConfig, FeedConfig, PipelineConfig, SourceConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{CentipedeError, Result};
pub use types::{DEFAULT_BLOCK_HOURS, Entry, FeedInfo, TimeStamp, floor_to_block};
