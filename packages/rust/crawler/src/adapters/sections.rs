//! Adapter for pages that carry every item inline as a repeated section.

use async_trait::async_trait;
use scraper::Html;
use sha2::{Digest, Sha256};
use tracing::{info, instrument};
use url::Url;

use centipede_shared::{BodyRule, CentipedeError, Entry, Result};

use super::{ItemListing, ItemMeta, SourceAdapter, dedup_items};
use crate::extract::{BodyExtractor, NamedSelector, absolutize_links, element_text};
use crate::fetch::Fetcher;

/// Splits one page into sections; each section becomes an entry.
///
/// Sections have no identity of their own, so the key is the SHA-256 of the
/// section markup. An edited section is a new item.
pub struct SectionsAdapter {
    page_url: Url,
    section: NamedSelector,
    title: NamedSelector,
    body: BodyExtractor,
}

impl SectionsAdapter {
    pub fn new(
        page_url: &str,
        section_selector: &str,
        title_selector: &str,
        body: &BodyRule,
    ) -> Result<Self> {
        let page_url = Url::parse(page_url)
            .map_err(|e| CentipedeError::config(format!("invalid page url '{page_url}': {e}")))?;
        Ok(Self {
            page_url,
            section: NamedSelector::parse(section_selector)?,
            title: NamedSelector::parse(title_selector)?,
            body: BodyExtractor::from_rule(body)?,
        })
    }

    fn split(&self, html: &str) -> Vec<(String, ItemMeta)> {
        let doc = Html::parse_document(html);
        let items = self
            .section
            .all(doc.root_element())
            .into_iter()
            .map(|section| {
                let markup = section.html();
                let key = section_key(&markup);
                let meta = ItemMeta {
                    link: Some(self.page_url.to_string()),
                    markup: Some(markup),
                    ..Default::default()
                };
                (key, meta)
            })
            .collect();
        dedup_items(items)
    }

    fn build(&self, key: &str, markup: &str) -> Result<Entry> {
        let fragment = Html::parse_fragment(markup);
        let root = fragment.root_element();

        let title = self
            .title
            .first(root)
            .map(element_text)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                CentipedeError::parse(format!("section has no '{}' title", self.title.as_str()))
            })?;
        let body = self.body.extract_from(root)?;

        Ok(Entry::new(
            self.page_url.as_str(),
            title,
            key,
            absolutize_links(&body, &self.page_url),
        ))
    }
}

/// Hex SHA-256 of a section's markup.
pub(crate) fn section_key(markup: &str) -> String {
    format!("{:x}", Sha256::digest(markup.as_bytes()))
}

#[async_trait]
impl ItemListing for SectionsAdapter {
    #[instrument(skip_all, fields(page = %self.page_url))]
    async fn list_items(&self, fetcher: &Fetcher) -> Result<Vec<(String, ItemMeta)>> {
        let html = fetcher.fetch_text(self.page_url.as_str(), None).await?;
        let items = self.split(&html);
        info!(count = items.len(), "listed page sections");
        Ok(items)
    }
}

#[async_trait]
impl SourceAdapter for SectionsAdapter {
    fn name(&self) -> &str {
        "sections"
    }

    async fn transform(&self, _fetcher: &Fetcher, key: &str, meta: ItemMeta) -> Result<Entry> {
        let markup = meta
            .markup
            .ok_or_else(|| CentipedeError::parse(format!("section {key} carries no markup")))?;
        self.build(key, &markup)
    }
}
