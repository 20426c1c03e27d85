//! Structured-document helpers shared by the site adapters.
//!
//! [`BodyExtractor`] is the selector-parameterized "find the body region"
//! strategy every adapter is composed with; [`absolutize_links`] rewrites
//! relative resource references so extracted markup stands on its own.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use centipede_shared::{BodyRule, CentipedeError, Result};

/// `src="..."` / `href="..."` attributes as serialized by `scraper`.
static LINK_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\b(src|href)="([^"]*)""#).expect("valid regex"));

/// A CSS selector kept together with its source text for error messages.
#[derive(Debug, Clone)]
pub struct NamedSelector {
    text: String,
    selector: Selector,
}

impl NamedSelector {
    pub fn parse(text: &str) -> Result<Self> {
        let selector = Selector::parse(text)
            .map_err(|e| CentipedeError::config(format!("invalid selector '{text}': {e}")))?;
        Ok(Self {
            text: text.to_string(),
            selector,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// First match below `root`.
    pub fn first<'a>(&self, root: ElementRef<'a>) -> Option<ElementRef<'a>> {
        root.select(&self.selector).next()
    }

    /// All matches below `root`, in document order.
    pub fn all<'a>(&self, root: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        root.select(&self.selector).collect()
    }
}

// ---------------------------------------------------------------------------
// Body extraction
// ---------------------------------------------------------------------------

/// Locates the body region of a document.
///
/// Inside the container (or the whole document) the first block selector
/// with any match wins; all of its matches are wrapped in one `<div>`.
#[derive(Debug, Clone)]
pub struct BodyExtractor {
    container: Option<NamedSelector>,
    blocks: Vec<NamedSelector>,
}

impl BodyExtractor {
    /// Compile a configured [`BodyRule`].
    pub fn from_rule(rule: &BodyRule) -> Result<Self> {
        let container = rule
            .container
            .as_deref()
            .map(NamedSelector::parse)
            .transpose()?;
        let blocks = rule
            .blocks
            .iter()
            .map(|b| NamedSelector::parse(b))
            .collect::<Result<Vec<_>>>()?;

        if blocks.is_empty() {
            return Err(CentipedeError::config("body rule lists no block selectors"));
        }
        Ok(Self { container, blocks })
    }

    /// Extract the body region from a full document.
    pub fn extract(&self, doc: &Html) -> Result<String> {
        self.extract_from(doc.root_element())
    }

    /// Extract the body region below `root`.
    pub fn extract_from(&self, root: ElementRef<'_>) -> Result<String> {
        let scope = match &self.container {
            Some(container) => container.first(root).ok_or_else(|| {
                CentipedeError::parse(format!("no element matches '{}'", container.as_str()))
            })?,
            None => root,
        };

        for block in &self.blocks {
            let parts = block.all(scope);
            if !parts.is_empty() {
                let inner = parts.iter().map(|el| el.html()).collect::<Vec<_>>().join("\n");
                return Ok(format!("<div>\n{inner}\n</div>"));
            }
        }

        let tried = self
            .blocks
            .iter()
            .map(NamedSelector::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        Err(CentipedeError::parse(format!("no body block found (tried {tried})")))
    }
}

// ---------------------------------------------------------------------------
// Link rewriting
// ---------------------------------------------------------------------------

/// Rewrite relative `src`/`href` references in `html` against `base`.
///
/// Absolute URLs, fragment-only links and `mailto:`/`data:`/`javascript:`
/// references are left as they are.
pub fn absolutize_links(html: &str, base: &Url) -> String {
    LINK_ATTR
        .replace_all(html, |caps: &Captures<'_>| {
            let attr = &caps[1];
            let value = &caps[2];
            match resolve_reference(value, base) {
                Some(resolved) => format!(r#"{attr}="{resolved}""#),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn resolve_reference(value: &str, base: &Url) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || Url::parse(trimmed).is_ok() {
        return None;
    }
    base.join(trimmed).ok().map(|u| u.to_string())
}

/// Text content of an element with whitespace collapsed.
pub fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
