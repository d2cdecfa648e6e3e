use log::trace;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Special characters that need escaping in MarkdownV2 format
pub const MARKDOWN_V2_SPECIAL_CHARS: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Special characters that need escaping in legacy Markdown format
pub const MARKDOWN_SPECIAL_CHARS: &[char] = &['_', '*', '`', '['];

/// Regex for identifying HTML entities
static HTML_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"[<>&]").unwrap());

/// Text formatting dialect understood by the Bot API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParseMode {
    MarkdownV2,
    Markdown,
    #[serde(rename = "HTML")]
    Html,
}

impl ParseMode {
    /// Name as sent in the `parse_mode` request field
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseMode::MarkdownV2 => "MarkdownV2",
            ParseMode::Markdown => "Markdown",
            ParseMode::Html => "HTML",
        }
    }
}

impl fmt::Display for ParseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParseMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MarkdownV2" => Ok(ParseMode::MarkdownV2),
            "Markdown" => Ok(ParseMode::Markdown),
            "HTML" => Ok(ParseMode::Html),
            other => Err(Error::configuration(format!(
                "Invalid parse mode: '{}'. Must be 'MarkdownV2', 'Markdown' or 'HTML'",
                other
            ))),
        }
    }
}

fn escape_chars(text: &str, special: &[char]) -> String {
    let mut result = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        if special.contains(&c) {
            result.push('\\');
        }
        result.push(c);
    }
    result
}

/// Escape every MarkdownV2 special character with a backslash.
///
/// Not idempotent: escaping already-escaped text escapes it again.
pub fn escape_markdown_v2(text: &str) -> String {
    let escaped = escape_chars(text, MARKDOWN_V2_SPECIAL_CHARS);
    trace!("MarkdownV2 escaped: {} -> {}", text, escaped);
    escaped
}

/// Escape the legacy Markdown special characters (`_`, `*`, `` ` ``, `[`)
pub fn escape_markdown(text: &str) -> String {
    escape_chars(text, MARKDOWN_SPECIAL_CHARS)
}

/// Escape HTML special characters
pub fn escape_html(text: &str) -> String {
    HTML_REGEX
        .replace_all(text, |caps: &regex::Captures| match &caps[0] {
            "<" => "&lt;".to_string(),
            ">" => "&gt;".to_string(),
            "&" => "&amp;".to_string(),
            _ => caps[0].to_string(),
        })
        .to_string()
}

/// Make `text` safe for `parse_mode`; no parse mode means no escaping.
pub fn sanitize(text: &str, parse_mode: Option<ParseMode>) -> String {
    match parse_mode {
        Some(ParseMode::MarkdownV2) => escape_markdown_v2(text),
        Some(ParseMode::Markdown) => escape_markdown(text),
        Some(ParseMode::Html) => escape_html(text),
        None => text.to_string(),
    }
}

/// Check that no special character of `parse_mode` appears unescaped.
#[cfg(test)]
pub(crate) fn is_escaped(text: &str, parse_mode: ParseMode) -> bool {
    let special = match parse_mode {
        ParseMode::MarkdownV2 => MARKDOWN_V2_SPECIAL_CHARS,
        ParseMode::Markdown => MARKDOWN_SPECIAL_CHARS,
        ParseMode::Html => return !text.contains(['<', '>']),
    };

    let mut escaped = false;
    for c in text.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
        } else if special.contains(&c) {
            return false;
        }
    }
    true
}
