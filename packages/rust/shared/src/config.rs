//! Application configuration for centipede.
//!
//! User config lives at `~/.centipede/centipede.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::{CentipedeError, Result};
use crate::types::DEFAULT_BLOCK_HOURS;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "centipede.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".centipede";

// ---------------------------------------------------------------------------
// Config structs (matching centipede.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Registered feeds, in presentation order.
    #[serde(default = "default_feeds")]
    pub feeds: Vec<FeedConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            defaults: DefaultsConfig::default(),
            feeds: default_feeds(),
        }
    }
}

impl AppConfig {
    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.defaults.workers == 0 {
            return Err(CentipedeError::config("defaults.workers must be at least 1"));
        }
        if self.defaults.block_hours <= 0 {
            return Err(CentipedeError::config("defaults.block_hours must be positive"));
        }

        let mut seen = HashSet::new();
        for feed in &self.feeds {
            if !seen.insert(feed.id.as_str()) {
                return Err(CentipedeError::config(format!(
                    "feed id '{}' is registered twice",
                    feed.id
                )));
            }
            feed.source.validate(&feed.id)?;
        }
        Ok(())
    }
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Location of the cache database (`~` is expanded).
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Size of the shared worker pool.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Seconds a cache resolution batch may run before unfinished work is dropped.
    #[serde(default = "default_batch_deadline_secs")]
    pub batch_deadline_secs: u64,

    /// Per-request HTTP timeout.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Width of a digest time block.
    #[serde(default = "default_block_hours")]
    pub block_hours: i64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            workers: default_workers(),
            batch_deadline_secs: default_batch_deadline_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            block_hours: default_block_hours(),
        }
    }
}

fn default_database_path() -> String {
    "~/.centipede/cache.db".into()
}
fn default_workers() -> usize {
    10
}
fn default_batch_deadline_secs() -> u64 {
    5
}
fn default_fetch_timeout_secs() -> u64 {
    10
}
fn default_block_hours() -> i64 {
    DEFAULT_BLOCK_HOURS
}

/// `[[feeds]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Registry key, also the feed's cache namespace.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    /// Upstream home page; the `sections` source also reads its items from here.
    pub url: String,
    /// How candidate items are listed and transformed.
    pub source: SourceConfig,
}

/// `[feeds.source]` table, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Items come from an RSS/Atom feed; each item page is fetched for its body.
    RssFulltext { feed_url: String, body: BodyRule },
    /// Items are sections of the feed's own page.
    Sections {
        section_selector: String,
        title_selector: String,
        body: BodyRule,
    },
    /// One page per day over a trailing window.
    Daily {
        /// chrono format string producing the page URL for a date.
        url_template: String,
        days: u32,
        /// chrono format string producing the entry title for a date.
        title_format: String,
        body: BodyRule,
    },
    /// Feed items folded into one entry per time block.
    Digest { feed_url: String },
}

impl SourceConfig {
    fn validate(&self, feed_id: &str) -> Result<()> {
        match self {
            Self::RssFulltext { body, .. } | Self::Sections { body, .. } => body.validate(feed_id),
            Self::Daily { days, body, .. } => {
                if *days == 0 {
                    return Err(CentipedeError::config(format!(
                        "feed '{feed_id}': daily source needs at least one day"
                    )));
                }
                body.validate(feed_id)
            }
            Self::Digest { .. } => Ok(()),
        }
    }
}

/// Selector-driven description of where an item's body lives.
///
/// Inside `container` (or the whole document when unset) the first entry of
/// `blocks` that matches anything wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    pub blocks: Vec<String>,
}

impl BodyRule {
    fn validate(&self, feed_id: &str) -> Result<()> {
        if self.blocks.is_empty() {
            return Err(CentipedeError::config(format!(
                "feed '{feed_id}': body rule lists no block selectors"
            )));
        }
        Ok(())
    }
}

fn default_feeds() -> Vec<FeedConfig> {
    let letters_body = BodyRule {
        container: None,
        blocks: vec!["p.bodytext".into()],
    };

    vec![
        FeedConfig {
            id: "titanic".into(),
            title: "Titanic RSS".into(),
            subtitle: "Titanic fulltext".into(),
            url: "http://www.titanic-magazin.de".into(),
            source: SourceConfig::RssFulltext {
                feed_url: "http://www.titanic-magazin.de/ich.war.bei.der.waffen.rss".into(),
                body: BodyRule {
                    container: Some("div.tt_news-bodytext".into()),
                    blocks: vec!["p.bodytext".into(), "ul".into()],
                },
            },
        },
        FeedConfig {
            id: "titanic_briefe".into(),
            title: "Titanic Briefe an die Leser".into(),
            subtitle: "Titanic Briefe fulltext".into(),
            url: "http://www.titanic-magazin.de/briefe/".into(),
            source: SourceConfig::Sections {
                section_selector: "div.heft_text div.csc-default".into(),
                title_selector: "h1".into(),
                body: letters_body.clone(),
            },
        },
        FeedConfig {
            id: "titanic_fachmann".into(),
            title: "Titanic Vom Fachmann fuer Kenner".into(),
            subtitle: "Titanic Fachmann fulltext".into(),
            url: "http://www.titanic-magazin.de/fachmann/".into(),
            source: SourceConfig::Sections {
                section_selector: "div.heft_text div.csc-default".into(),
                title_selector: "h1".into(),
                body: letters_body,
            },
        },
    ]
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Resolved cache database location.
    pub database_path: PathBuf,
    /// Shared worker pool size.
    pub workers: usize,
    /// Deadline for one cache resolution batch.
    pub batch_deadline: Duration,
    /// Per-request HTTP timeout.
    pub fetch_timeout: Duration,
    /// Digest time block width.
    pub block_width: TimeDelta,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            database_path: expand_home(&config.defaults.database_path),
            workers: config.defaults.workers,
            batch_deadline: Duration::from_secs(config.defaults.batch_deadline_secs),
            fetch_timeout: Duration::from_secs(config.defaults.fetch_timeout_secs),
            block_width: TimeDelta::hours(config.defaults.block_hours),
        }
    }
}

/// Expand a leading `~/` to the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.centipede/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CentipedeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.centipede/centipede.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CentipedeError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        CentipedeError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CentipedeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CentipedeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CentipedeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("database_path"));
        assert!(toml_str.contains("titanic_briefe"));
        assert!(toml_str.contains("rss_fulltext"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.workers, 10);
        assert_eq!(parsed.defaults.batch_deadline_secs, 5);
        assert_eq!(parsed.feeds.len(), 3);
        parsed.validate().expect("defaults are valid");
    }

    #[test]
    fn config_with_custom_feeds() {
        let toml_str = r#"
[defaults]
workers = 4

[[feeds]]
id = "comic"
title = "Daily Comic"
url = "https://comic.example.com"

[feeds.source]
kind = "daily"
url_template = "https://comic.example.com/%Y/%m/%d/"
days = 7
title_format = "Comic of %Y-%m-%d"

[feeds.source.body]
blocks = ["div.strip img"]

[[feeds]]
id = "board"
title = "Board digest"
url = "https://board.example.com"

[feeds.source]
kind = "digest"
feed_url = "https://board.example.com/atom.xml"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        config.validate().expect("valid");
        assert_eq!(config.defaults.workers, 4);
        assert_eq!(config.defaults.block_hours, 6);
        assert_eq!(config.feeds.len(), 2);
        assert!(matches!(config.feeds[0].source, SourceConfig::Daily { days: 7, .. }));
        assert!(matches!(config.feeds[1].source, SourceConfig::Digest { .. }));
        assert_eq!(config.feeds[1].subtitle, "");
    }

    #[test]
    fn duplicate_feed_ids_rejected() {
        let mut config = AppConfig::default();
        let dup = config.feeds[0].clone();
        config.feeds.push(dup);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("registered twice"));
    }

    #[test]
    fn empty_body_rule_rejected() {
        let mut config = AppConfig::default();
        if let SourceConfig::RssFulltext { body, .. } = &mut config.feeds[0].source {
            body.blocks.clear();
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn pipeline_config_from_app_config() {
        let app = AppConfig::default();
        let pipeline = PipelineConfig::from(&app);
        assert_eq!(pipeline.workers, 10);
        assert_eq!(pipeline.batch_deadline, Duration::from_secs(5));
        assert_eq!(pipeline.block_width, TimeDelta::hours(6));
        assert!(pipeline.database_path.ends_with(".centipede/cache.db"));
    }
}
