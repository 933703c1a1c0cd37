//! Markup stripping for chapter documents.

use std::sync::LazyLock;

use regex::Regex;

// Wide enough that html2text never wraps a paragraph.
const RENDER_WIDTH: usize = 10_000;

static RE_SCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("valid regex"));
static RE_STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>").expect("valid regex"));
static RE_HEAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<head\b[^>]*>.*?</head\s*>").expect("valid regex"));

/// Plain text of an (X)HTML document. Markup and entities are rendered by
/// html2text without decorations, scripts, styles and `<head>` are dropped,
/// spaces are collapsed within each line and every block becomes one line.
pub fn html_to_text(html: &str) -> String {
    let body = RE_SCRIPT.replace_all(html, " ");
    let body = RE_STYLE.replace_all(&body, " ");
    let body = RE_HEAD.replace_all(&body, " ");
    let rendered = match html2text::config::plain_no_decorate()
        .string_from_read(body.as_bytes(), RENDER_WIDTH)
    {
        Ok(rendered) => rendered,
        Err(err) => {
            tracing::warn!(%err, "html2text failed; treating document as empty");
            return String::new();
        }
    };
    rendered
        .lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text up to the first `.` or newline, capped at `max_chars` characters.
pub fn first_sentence(text: &str, max_chars: usize) -> Option<String> {
    let end = text.find(['.', '\n']).unwrap_or(text.len());
    let sentence = text[..end].trim();
    if sentence.is_empty() {
        return None;
    }
    let mut out: String = sentence.chars().take(max_chars).collect();
    if sentence.chars().count() > max_chars {
        out = format!("{}…", out.trim_end());
    }
    Some(out)
}

/// Collapse all whitespace runs to single spaces.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
