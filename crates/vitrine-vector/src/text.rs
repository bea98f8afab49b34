//! Embedding text composition.
//!
//! Turns a snapshot into the exact text handed to the embedding provider.
//! Every step is a pure function of the snapshot content:
//!
//! ```text
//! title
//!
//! description (HTML → plain text)
//!
//! Specifications:
//! path: value          (canonical order, see vitrine_core::canonical)
//!
//! FAQ:
//! path: value
//! ```
//!
//! Empty sections are left out. The result is cut to [`MAX_EMBEDDING_CHARS`]
//! Unicode scalar values; when whitespace occurs within the last
//! [`TRUNCATION_LOOKBACK_CHARS`] characters of the cut, the cut moves back to
//! it so words are not split. Trailing whitespace is trimmed.
//!
//! These rules are versioned by [`TEXT_RULES_VERSION`]. Vectors built under
//! different rules are not comparable, so any change here ships with a new
//! embedding model version.

use regex::{Captures, Regex};
use std::sync::LazyLock;
use vitrine_catalog::SnapshotContent;

/// Version of the composition and truncation rules in this module.
pub const TEXT_RULES_VERSION: u32 = 1;

/// Maximum embedding text length in Unicode scalar values.
pub const MAX_EMBEDDING_CHARS: usize = 8_000;

/// How far back from the hard cut a word boundary is searched.
pub const TRUNCATION_LOOKBACK_CHARS: usize = 200;

#[allow(clippy::expect_used)]
static SCRIPT_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>").expect("valid regex")
});

#[allow(clippy::expect_used)]
static BLOCK_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)<br\s*/?>|</?(p|div|li|ul|ol|h[1-6]|tr|table|section|article|blockquote)\b[^>]*>",
    )
    .expect("valid regex")
});

#[allow(clippy::expect_used)]
static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

#[allow(clippy::expect_used)]
static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});").expect("valid regex")
});

fn decode_entity(caps: &Captures<'_>) -> String {
    let body = &caps[1];
    let decoded = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
    } else if let Some(dec) = body.strip_prefix('#') {
        dec.parse::<u32>().ok().and_then(char::from_u32)
    } else {
        match body {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            _ => None,
        }
    };
    match decoded {
        Some(c) => c.to_string(),
        None => caps[0].to_string(),
    }
}

/// Convert rich text (HTML) to canonical plain text.
///
/// Block-level tags and `<br>` become line breaks, script/style bodies and
/// all other tags are dropped, entities are decoded in a single pass,
/// whitespace inside a line collapses to one space, and blank lines are
/// removed.
pub fn html_to_text(html: &str) -> String {
    let without_scripts = SCRIPT_STYLE.replace_all(html, "");
    let with_breaks = BLOCK_TAG.replace_all(&without_scripts, "\n");
    let without_tags = ANY_TAG.replace_all(&with_breaks, "");
    let decoded = ENTITY.replace_all(&without_tags, decode_entity);

    decoded
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cut `text` to at most `max_chars` Unicode scalar values, preferring a
/// whitespace boundary within the last [`TRUNCATION_LOOKBACK_CHARS`].
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    let Some((cut_byte, _)) = text.char_indices().nth(max_chars) else {
        return text.trim_end().to_string();
    };
    let head = &text[..cut_byte];

    let lookback_start = max_chars.saturating_sub(TRUNCATION_LOOKBACK_CHARS);
    let boundary = head
        .char_indices()
        .enumerate()
        .filter(|(pos, (_, c))| *pos >= lookback_start && c.is_whitespace())
        .map(|(_, (byte, _))| byte)
        .last();

    match boundary {
        Some(byte) => head[..byte].trim_end().to_string(),
        None => head.trim_end().to_string(),
    }
}

/// Compose the text to embed for one snapshot.
pub fn embedding_text(content: &SnapshotContent) -> String {
    let mut sections: Vec<String> = Vec::with_capacity(4);

    let title = content.title.trim();
    if !title.is_empty() {
        sections.push(title.to_string());
    }

    let description = html_to_text(&content.description);
    if !description.is_empty() {
        sections.push(description);
    }

    let specs = content.specs.flatten_lines();
    if !specs.is_empty() {
        sections.push(format!("Specifications:\n{}", specs.join("\n")));
    }

    let faq = content.faq.flatten_lines();
    if !faq.is_empty() {
        sections.push(format!("FAQ:\n{}", faq.join("\n")));
    }

    truncate_text(&sections.join("\n\n"), MAX_EMBEDDING_CHARS)
}

// ============================================================================
// Tests
// ============================================================================
