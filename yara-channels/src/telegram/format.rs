//! Telegram HTML format converter.
//!
//! The bot only emits light Markdown (bold titles, inline code, links), so this
//! converter handles that subset and escapes everything else. HTML parse mode
//! is used instead of Telegram's Markdown modes because arbitrary page text
//! (underscores, brackets) does not need escaping there.

use regex::Regex;
use std::sync::LazyLock;

static BOLD_DOUBLE_ASTERISK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("valid regex"));
// Runs after the double-asterisk pass.
static BOLD_SINGLE_ASTERISK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*\n]+?)\*").expect("valid regex"));
static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`\n]+?)`").expect("valid regex"));
static LINK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").expect("valid regex"));

/// Convert light Markdown to Telegram-compatible HTML.
///
/// | Input              | Output                    |
/// |--------------------|---------------------------|
/// | `**bold**`         | `<b>bold</b>`             |
/// | `*bold*`           | `<b>bold</b>`             |
/// | `` `code` ``       | `<code>code</code>`       |
/// | `[text](url)`      | `<a href="url">text</a>`  |
pub fn convert_to_telegram_html(input: &str) -> String {
    let escaped = escape_html(input);
    let with_code = INLINE_CODE.replace_all(&escaped, "<code>$1</code>");
    let with_links = LINK_PATTERN.replace_all(&with_code, r#"<a href="$2">$1</a>"#);
    let with_bold = BOLD_DOUBLE_ASTERISK.replace_all(&with_links, "<b>$1</b>");
    BOLD_SINGLE_ASTERISK
        .replace_all(&with_bold, "<b>$1</b>")
        .into_owned()
}

/// Escape the three characters Telegram's HTML mode reserves.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
