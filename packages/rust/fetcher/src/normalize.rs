//! Text normalization shared by the static and rendered strategies.

use std::sync::LazyLock;

use regex::Regex;

/// Anything outside word characters, whitespace and basic punctuation.
static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[^\w\s.,!?;:()"'-]"#).expect("valid regex"));

/// Runs of whitespace that are not newlines.
static HORIZONTAL_WS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\S\n]+").expect("valid regex"));

/// Spaces hugging a newline.
static PADDED_NEWLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" *\n *").expect("valid regex"));

/// Three or more newlines (more than one blank line).
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Normalize extracted page text.
///
/// Line endings become `\n`, characters outside the allow-list are dropped,
/// horizontal whitespace collapses to single spaces, paragraph breaks are kept
/// (at most one blank line) and the result is trimmed.
pub fn normalize_text(raw: &str) -> String {
    let text = raw.replace("\r\n", "\n").replace('\r', "\n");
    let text = DISALLOWED.replace_all(&text, "");
    let text = HORIZONTAL_WS.replace_all(&text, " ");
    let text = PADDED_NEWLINE.replace_all(&text, "\n");
    let text = BLANK_LINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}
