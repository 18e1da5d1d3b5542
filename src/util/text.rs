use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

/// Maximum summary length in characters.
pub const SUMMARY_MAX_CHARS: usize = 300;

/// Marker appended to truncated summaries.
const ELLIPSIS: char = '…';

static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script\s*>").unwrap());
static STYLE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style\s*>").unwrap());
/// Newsletter template variables such as `{{ first_name | default }}`.
static TEMPLATE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{.*?\}\}").unwrap());
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static IMG_SRC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<img[^>]+src\s*=\s*["']([^"']+)["']"#).unwrap());

/// Converts an HTML fragment into a single line of plain text.
///
/// Script and style blocks are removed together with their bodies, template
/// placeholders are dropped, remaining tags become spaces, entities are
/// decoded and whitespace runs collapse to one space.
///
/// # Examples
///
/// ```
/// use scruper::util::strip_html;
///
/// let html = "<p>Hello {{ first_name }}<br>and&nbsp;welcome</p><script>track()</script>";
/// assert_eq!(strip_html(html), "Hello and welcome");
/// ```
pub fn strip_html(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    let text = SCRIPT_BLOCK.replace_all(html, "");
    let text = STYLE_BLOCK.replace_all(&text, "");
    let text = TEMPLATE_PLACEHOLDER.replace_all(&text, "");
    let text = TAG.replace_all(&text, " ");
    let text = html_escape::decode_html_entities(&text);
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncates `text` to at most `max_chars` characters, ending on a word
/// boundary and appending `…` when anything was cut.
///
/// Text that fits is returned borrowed. When the cut lands inside a word the
/// partial word is dropped; text without any whitespace before the cut
/// (e.g. CJK) is cut at the character limit.
///
/// # Examples
///
/// ```
/// use scruper::util::truncate_summary;
///
/// assert_eq!(truncate_summary("short text", 20), "short text");
/// assert_eq!(truncate_summary("hello wonderful world", 12), "hello…");
/// ```
pub fn truncate_summary(text: &str, max_chars: usize) -> Cow<'_, str> {
    let Some((cut, next)) = text.char_indices().nth(max_chars) else {
        return Cow::Borrowed(text);
    };

    let head = &text[..cut];
    let kept = if next.is_whitespace() {
        head
    } else {
        match head.rfind(char::is_whitespace) {
            Some(idx) => &head[..idx],
            None => head,
        }
    };

    let mut out = String::with_capacity(kept.len() + ELLIPSIS.len_utf8());
    out.push_str(kept.trim_end());
    out.push(ELLIPSIS);
    Cow::Owned(out)
}

/// Plain-text summary of an HTML body: [`strip_html`] then [`truncate_summary`]
/// at [`SUMMARY_MAX_CHARS`].
pub fn summarize(html: &str) -> String {
    let text = strip_html(html);
    match truncate_summary(&text, SUMMARY_MAX_CHARS) {
        Cow::Borrowed(_) => text,
        Cow::Owned(truncated) => truncated,
    }
}

/// Returns the `src` of the first `<img>` tag in an HTML fragment, entity-decoded.
pub fn first_img_src(html: &str) -> Option<String> {
    IMG_SRC
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| html_escape::decode_html_entities(m.as_str()).trim().to_string())
}

/// Strips control characters from feed-supplied text.
///
/// Tab, newline and carriage return are preserved. Returns `Cow::Borrowed`
/// when there is nothing to strip (the common case).
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped_control) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|&c| !is_stripped_control(c)).collect())
}

fn is_stripped_control(c: char) -> bool {
    c.is_control() && !matches!(c, '\t' | '\n' | '\r')
}
