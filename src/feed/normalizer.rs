use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use super::article::{article_id, Article};
use super::item::Element;
use crate::registry::FeedSource;
use crate::util::{first_img_src, is_acceptable_image_url, strip_control_chars, summarize};

/// Elements carrying the publish date, in order of preference.
const DATE_ELEMENTS: [&str; 4] = ["pubDate", "published", "updated", "dc:date"];

/// Elements carrying the item body, richest first.
const CONTENT_ELEMENTS: [&str; 4] = ["content:encoded", "content", "description", "summary"];

/// Timestamp layouts with an explicit offset, tried after RFC 2822 / RFC 3339.
const OFFSET_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%a, %d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M:%S %z",
];

/// Timestamp layouts without an offset; interpreted as UTC.
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%a, %d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M:%S",
];

/// Normalises one `<item>` (RSS) or `<entry>` (Atom) into an [`Article`].
///
/// Returns `None` when the item has no title or no resolvable link; every
/// other field degrades gracefully:
///
/// - missing or unparseable dates fall back to `fetched_at`
/// - summary comes from the richest body available, stripped and truncated
/// - image is the first acceptable candidate among media content,
///   image enclosures and the first `<img>` of the body
/// - tags are the trimmed, non-empty, de-duplicated categories
pub fn normalize_item(
    item: &Element,
    source: &FeedSource,
    fetched_at: DateTime<Utc>,
) -> Option<Article> {
    let title = item
        .child_text(&["title"])
        .map(|t| strip_control_chars(&t).trim().to_string())
        .filter(|t| !t.is_empty())?;
    let url = resolve_link(item)?;

    let published_at = DATE_ELEMENTS
        .into_iter()
        .filter_map(|name| item.child_text(&[name]))
        .find_map(|raw| parse_date(&raw))
        .unwrap_or(fetched_at);

    let raw_html = raw_content(item).unwrap_or_default();
    let summary = strip_control_chars(&summarize(&raw_html)).into_owned();
    let image_url = extract_image(item, &raw_html);

    Some(Article {
        id: article_id(&url),
        title,
        summary,
        url,
        source: source.id.clone(),
        source_label: source.label.clone(),
        published_at,
        fetched_at,
        image_url,
        tags: collect_tags(item),
        saved: false,
    })
}

/// Parses a feed-supplied date string, accepting RFC 2822, RFC 3339 and a
/// handful of common near-misses. Offset-less values are taken as UTC.
///
/// # Examples
///
/// ```
/// use scruper::feed::parse_date;
///
/// assert!(parse_date("Sat, 21 Feb 2026 10:00:00 GMT").is_some());
/// assert!(parse_date("2026-02-21T10:00:00+02:00").is_some());
/// assert!(parse_date("yesterday-ish").is_none());
/// ```
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(stripped) = s.strip_suffix(" UTC") {
        if let Some(dt) = parse_date(&format!("{stripped} +0000")) {
            return Some(dt);
        }
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// RSS `<link>` text, Atom `<link href>` (alternate), then `<guid>`, then an
/// Atom `<id>` that is itself an http(s) URL.
fn resolve_link(item: &Element) -> Option<String> {
    for link in item.children_named("link") {
        let text = link.text();
        let text = text.trim();
        if !text.is_empty() {
            return Some(text.to_string());
        }
        let rel = link.attr("rel").unwrap_or("alternate");
        if let Some(href) = link.attr("href").map(str::trim) {
            if rel == "alternate" && !href.is_empty() {
                return Some(href.to_string());
            }
        }
    }

    item.child_text(&["guid"]).or_else(|| {
        item.child_text(&["id"])
            .filter(|id| id.starts_with("http://") || id.starts_with("https://"))
    })
}

fn raw_content(item: &Element) -> Option<String> {
    CONTENT_ELEMENTS.into_iter().find_map(|name| {
        item.children_named(name)
            // Atom out-of-line content (`<content src=..>`) has no body.
            .filter(|el| el.attr("src").is_none())
            .map(|el| el.text())
            .find(|text| !text.trim().is_empty())
    })
}

fn extract_image(item: &Element, raw_html: &str) -> Option<String> {
    let media = item
        .elements()
        .filter(|el| el.local_name() == "content" && is_image_media(el))
        .filter_map(|el| el.attr("url"));

    let enclosures = item
        .children_named("enclosure")
        .filter(|el| has_image_type(el))
        .filter_map(|el| el.attr("url"));

    let atom_enclosures = item
        .children_named("link")
        .filter(|el| el.attr("rel") == Some("enclosure") && has_image_type(el))
        .filter_map(|el| el.attr("href"));

    let body_image = first_img_src(raw_html);

    media
        .chain(enclosures)
        .chain(atom_enclosures)
        .map(|candidate| candidate.trim().to_string())
        .chain(body_image)
        .find(|candidate| is_acceptable_image_url(candidate))
}

fn is_image_media(el: &Element) -> bool {
    let type_ok = el.attr("type").is_none_or(|t| t.starts_with("image"));
    let medium_ok = el.attr("medium").is_none_or(|m| m == "image");
    type_ok && medium_ok
}

fn has_image_type(el: &Element) -> bool {
    el.attr("type").is_some_and(|t| t.starts_with("image"))
}

fn collect_tags(item: &Element) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for category in item.children_named("category") {
        let text = category.text();
        let value = match text.trim() {
            "" => category.attr("term").unwrap_or_default().trim(),
            trimmed => trimmed,
        };
        if !value.is_empty() && !tags.iter().any(|t| t == value) {
            tags.push(value.to_string());
        }
    }
    tags
}
