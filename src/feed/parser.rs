use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;
use thiserror::Error;

use super::article::Article;
use super::item::{local_part, Element, Node};
use super::normalizer::normalize_item;
use crate::registry::FeedSource;

/// SEC-003: Maximum element nesting depth accepted in a feed document.
const MAX_NESTING_DEPTH: usize = 256;

/// The fetched document is not well-formed XML.
#[derive(Debug, Error)]
#[error("XML parse error in feed {source_label}: {detail}")]
pub struct ParseError {
    pub source_label: String,
    pub detail: String,
}

/// Parses a fetched RSS or Atom document into articles, in document order.
///
/// The whole document is checked for well-formedness before any item is
/// normalised, so a broken feed fails fast instead of yielding a partial
/// list. Items the normaliser rejects (no title, no link) are dropped
/// silently; one bad item never fails the feed.
///
/// # Errors
///
/// Returns [`ParseError`] naming the source when the text is not
/// well-formed XML or has no root element.
pub fn parse_feed(
    xml: &str,
    source: &FeedSource,
    fetched_at: DateTime<Utc>,
) -> Result<Vec<Article>, ParseError> {
    let items = read_items(xml).map_err(|detail| ParseError {
        source_label: source.label.clone(),
        detail,
    })?;

    let total = items.len();
    let articles: Vec<Article> = items
        .iter()
        .filter_map(|item| normalize_item(item, source, fetched_at))
        .collect();

    let skipped = total - articles.len();
    if skipped > 0 {
        tracing::debug!(
            source = %source.id,
            skipped = skipped,
            "Items without title or link skipped"
        );
    }

    Ok(articles)
}

/// Streams the document and materialises every `<item>` / `<entry>` subtree.
fn read_items(xml: &str) -> Result<Vec<Element>, String> {
    // SEC-002: quick-xml (0.37) never expands DOCTYPE entity declarations;
    // only the XML builtins and character references are resolved.
    let mut reader = Reader::from_str(xml);

    let mut items = Vec::new();
    // Open elements of the item currently being read, outermost first.
    let mut open: Vec<Element> = Vec::new();
    let mut depth: usize = 0;
    let mut saw_root = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if saw_root && depth == 0 {
                    return Err(content_after_root(&reader));
                }
                depth += 1;
                saw_root = true;
                if depth > MAX_NESTING_DEPTH {
                    return Err(format!(
                        "nesting depth exceeds maximum of {} levels",
                        MAX_NESTING_DEPTH
                    ));
                }
                let element = read_element(&e, &reader);
                if !open.is_empty() || is_item(&element.name) {
                    open.push(element);
                }
            }
            Ok(Event::Empty(e)) => {
                if saw_root && depth == 0 {
                    return Err(content_after_root(&reader));
                }
                saw_root = true;
                let element = read_element(&e, &reader);
                match open.last_mut() {
                    Some(parent) => parent.children.push(Node::Element(element)),
                    None if is_item(&element.name) => items.push(element),
                    None => {}
                }
            }
            Ok(Event::End(_)) => {
                if depth == 0 {
                    return Err("closing tag without matching opening tag".to_string());
                }
                depth -= 1;
                if let Some(element) = open.pop() {
                    match open.last_mut() {
                        Some(parent) => parent.children.push(Node::Element(element)),
                        None => items.push(element),
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if depth == 0 {
                    if is_blank(&e) {
                        continue;
                    }
                    return Err(if saw_root {
                        content_after_root(&reader)
                    } else {
                        format!("text before root element at byte {}", reader.buffer_position())
                    });
                }
                if let Some(current) = open.last_mut() {
                    current.children.push(Node::Text(unescape_text(&e)));
                }
            }
            Ok(Event::CData(e)) => {
                if depth == 0 {
                    return Err(format!(
                        "character data outside root element at byte {}",
                        reader.buffer_position()
                    ));
                }
                if let Some(current) = open.last_mut() {
                    current
                        .children
                        .push(Node::Text(String::from_utf8_lossy(&e).into_owned()));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!("{} at byte {}", e, reader.buffer_position()));
            }
            _ => {}
        }
    }

    if !saw_root {
        return Err("document has no root element".to_string());
    }
    if depth != 0 {
        return Err(format!("document ended with {} unclosed element(s)", depth));
    }

    Ok(items)
}

fn content_after_root(reader: &Reader<&[u8]>) -> String {
    format!("content after root element at byte {}", reader.buffer_position())
}

/// Whitespace between top-level markup; a leading byte-order mark counts.
fn is_blank(text: &BytesText<'_>) -> bool {
    String::from_utf8_lossy(text)
        .chars()
        .all(|c| c.is_whitespace() || c == '\u{feff}')
}

fn is_item(name: &str) -> bool {
    matches!(local_part(name), "item" | "entry")
}

fn read_element(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Element {
    let mut element = Element::new(String::from_utf8_lossy(e.name().as_ref()));
    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(err) => {
                tracing::debug!(element = %element.name, error = %err, "Skipping malformed attribute");
                continue;
            }
        };
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = match attr.decode_and_unescape_value(reader.decoder()) {
            Ok(value) => value.into_owned(),
            // Unknown (HTML) entities in attribute values
            Err(_) => html_escape::decode_html_entities(&String::from_utf8_lossy(&attr.value))
                .into_owned(),
        };
        element.attributes.push((key, value));
    }
    element
}

/// Unescapes a text node; HTML entities (`&nbsp;`) that XML does not define
/// are decoded leniently instead of failing the document.
fn unescape_text(e: &BytesText<'_>) -> String {
    match e.unescape() {
        Ok(text) => text.into_owned(),
        Err(_) => html_escape::decode_html_entities(&String::from_utf8_lossy(e)).into_owned(),
    }
}
