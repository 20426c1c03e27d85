//! Atom rendering of a crawled feed.

use atom_syndication::{Content, Entry as AtomEntry, Feed, FixedDateTime, Link, Text};
use chrono::{DateTime, Utc};
use color_eyre::eyre::{Result, WrapErr};

use centipede_shared::{Entry, FeedInfo};

/// Render `entries` as an Atom document.
///
/// Entries without a time stamp are dated `now`; the feed itself carries the
/// newest entry date.
pub(crate) fn render_feed(
    info: &FeedInfo,
    entries: &[Entry],
    now: DateTime<Utc>,
) -> Result<String> {
    let now = now.fixed_offset();
    let atom_entries: Vec<AtomEntry> = entries.iter().map(|e| atom_entry(e, now)).collect();
    let updated = atom_entries
        .iter()
        .map(|e| *e.updated())
        .max()
        .unwrap_or(now);

    let mut feed = Feed::default();
    feed.set_id(info.url.as_str());
    feed.set_title(info.title.as_str());
    if !info.subtitle.is_empty() {
        feed.set_subtitle(Some(Text::from(info.subtitle.as_str())));
    }
    feed.set_links(vec![link(&info.url)]);
    feed.set_updated(updated);
    feed.set_entries(atom_entries);

    let bytes = feed
        .write_to(Vec::new())
        .wrap_err_with(|| format!("rendering atom feed '{}'", info.id))?;
    String::from_utf8(bytes).wrap_err("atom output is not utf-8")
}

fn atom_entry(entry: &Entry, now: FixedDateTime) -> AtomEntry {
    let updated = entry
        .stamp
        .map(|stamp| stamp.timestamp.fixed_offset())
        .unwrap_or(now);

    let mut content = Content::default();
    content.set_content_type(Some("html".to_string()));
    content.set_value(Some(entry.content.clone()));

    let mut out = AtomEntry::default();
    out.set_id(entry.id.as_str());
    out.set_title(entry.title.as_str());
    out.set_links(vec![link(&entry.link)]);
    out.set_updated(updated);
    out.set_content(Some(content));
    out
}

fn link(href: &str) -> Link {
    let mut link = Link::default();
    link.set_href(href);
    link
}
