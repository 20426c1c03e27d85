//! Date-driven pages: one page per day over a trailing window.
//!
//! The keys are ISO dates derived from the clock, so there is no listing
//! fetch and no per-key metadata.

use std::fmt::Write as _;

use chrono::{Days, NaiveDate};
use scraper::Html;
use tracing::{debug, instrument};
use url::Url;

use centipede_shared::{BodyRule, CentipedeError, Entry, Result};

use crate::extract::{BodyExtractor, absolutize_links};
use crate::fetch::Fetcher;

#[derive(Debug)]
pub struct DailyPages {
    url_template: String,
    days: u32,
    title_format: String,
    body: BodyExtractor,
}

impl DailyPages {
    pub fn new(url_template: &str, days: u32, title_format: &str, body: &BodyRule) -> Result<Self> {
        check_format(url_template)?;
        check_format(title_format)?;
        if days == 0 {
            return Err(CentipedeError::config("daily source needs at least one day"));
        }
        Ok(Self {
            url_template: url_template.to_string(),
            days,
            title_format: title_format.to_string(),
            body: BodyExtractor::from_rule(body)?,
        })
    }

    /// ISO dates of the trailing window ending at `today`, newest first.
    pub fn keys(&self, today: NaiveDate) -> Vec<String> {
        (0..self.days)
            .filter_map(|back| today.checked_sub_days(Days::new(u64::from(back))))
            .map(|date| date.format("%Y-%m-%d").to_string())
            .collect()
    }

    /// Page URL for one date.
    pub fn url_for(&self, date: NaiveDate) -> Result<String> {
        render_date(date, &self.url_template)
    }

    /// Fetch and normalize the page for the date encoded in `key`.
    #[instrument(level = "debug", skip(self, fetcher))]
    pub async fn transform(&self, fetcher: &Fetcher, key: &str) -> Result<Entry> {
        let date = NaiveDate::parse_from_str(key, "%Y-%m-%d")
            .map_err(|e| CentipedeError::validation(format!("invalid day key '{key}': {e}")))?;
        let url = self.url_for(date)?;
        let page_url = Url::parse(&url)
            .map_err(|e| CentipedeError::config(format!("template produced invalid url '{url}': {e}")))?;

        let html = fetcher.fetch_text(&url, None).await?;
        let content = self.extract(&html, &page_url)?;
        debug!(bytes = content.len(), "extracted daily page");

        let title = render_date(date, &self.title_format)?;
        Ok(Entry::new(url.clone(), title, url, content))
    }

    fn extract(&self, html: &str, base: &Url) -> Result<String> {
        let doc = Html::parse_document(html);
        let region = self.body.extract(&doc)?;
        Ok(absolutize_links(&region, base))
    }
}

/// A format is usable only if a plain date can render it; time fields
/// like `%H` parse fine but fail at render time.
fn check_format(format: &str) -> Result<()> {
    render_date(NaiveDate::default(), format).map(|_| ())
}

fn render_date(date: NaiveDate, format: &str) -> Result<String> {
    let mut out = String::new();
    write!(out, "{}", date.format(format))
        .map_err(|_| CentipedeError::config(format!("invalid date format '{format}'")))?;
    Ok(out)
}
