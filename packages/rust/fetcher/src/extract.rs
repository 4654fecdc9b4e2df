//! Main-content extraction from documentation HTML.
//!
//! Order of strategies:
//! 1. Readability-style scoring of candidate blocks
//! 2. Ordered list of common documentation content containers
//! 3. Full `<body>` text
//!
//! Page chrome (scripts, navigation, sidebars, ads, comments) is never part
//! of the extracted text.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::debug;

use crate::normalize::normalize_text;

/// Elements whose subtree never contributes text.
const EXCLUDED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "nav", "header", "footer", "aside", "iframe",
    "svg",
];

/// Classes whose subtree never contributes text.
const EXCLUDED_CLASSES: &[&str] = &[
    "ad",
    "advertisement",
    "sidebar",
    "comments",
    "related-articles",
];

/// Elements that start a new line in extracted text.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "li", "ul", "ol", "pre", "h1", "h2", "h3", "h4",
    "h5", "h6", "br", "tr", "table", "blockquote", "dd", "dt", "figure",
];

/// Container selectors tried in order when scoring finds nothing usable.
const CONTENT_SELECTORS: &[&str] = &[
    "main",
    r#"[role="main"]"#,
    ".content",
    ".main-content",
    ".documentation",
    ".docs-content",
    ".markdown-body",
    ".article-content",
    ".post-content",
    ".entry-content",
    "article",
];

static CONTAINERS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    CONTENT_SELECTORS
        .iter()
        .map(|s| Selector::parse(s).expect("valid selector"))
        .collect()
});

static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").expect("valid selector"));

static PARAGRAPHS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p, pre, td, li, blockquote").expect("valid selector"));

static LINKS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").expect("valid selector"));

static POSITIVE_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)article|body|content|entry|main|page|post|text|story|docs|documentation|markdown|prose")
        .expect("valid regex")
});

static NEGATIVE_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)comment|meta|footer|footnote|sidebar|sponsor|advert|related|menu|nav|social|share|breadcrumb|toc")
        .expect("valid regex")
});

/// Minimum characters for a block to count towards its ancestors' score.
const MIN_PARAGRAPH_CHARS: usize = 25;

/// Extract and normalize the main readable text of an HTML page.
///
/// Scored extraction is accepted when it yields at least `min_readable`
/// characters; otherwise container selectors and finally the body are used.
pub fn extract_main_text(html: &str, min_readable: usize) -> String {
    let doc = Html::parse_document(html);

    if let Some(text) = readability_text(&doc) {
        let text = normalize_text(&text);
        let length = text.chars().count();
        if length >= min_readable {
            return text;
        }
        debug!(length, min_readable, "readability result too short, trying selectors");
    }

    normalize_text(&selector_text(&doc))
}

// ---------------------------------------------------------------------------
// Readability scoring
// ---------------------------------------------------------------------------

fn readability_text(doc: &Html) -> Option<String> {
    let mut scores = HashMap::new();
    let mut order = Vec::new();

    for para in doc.select(&PARAGRAPHS) {
        if is_excluded(&para) || para.ancestors().filter_map(ElementRef::wrap).any(|a| is_excluded(&a)) {
            continue;
        }
        let text = visible_text(para);
        let length = text.trim().chars().count();
        if length < MIN_PARAGRAPH_CHARS {
            continue;
        }

        let score = 1.0 + text.matches(',').count() as f64 + (length as f64 / 100.0).min(3.0);
        let mut ancestors = para.ancestors().filter_map(ElementRef::wrap);

        for (weight, ancestor) in [(1.0, ancestors.next()), (0.5, ancestors.next())] {
            let Some(ancestor) = ancestor else { break };
            let entry = scores.entry(ancestor.id()).or_insert_with(|| {
                order.push(ancestor.id());
                base_score(&ancestor)
            });
            *entry += score * weight;
        }
    }

    let mut best: Option<(ElementRef<'_>, f64)> = None;
    for id in order {
        let Some(element) = doc.tree.get(id).and_then(ElementRef::wrap) else {
            continue;
        };
        let score = scores.get(&id).copied().unwrap_or(0.0) * (1.0 - link_density(element));
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((element, score));
        }
    }

    best.map(|(element, _)| visible_text(element))
}

/// Initial score from the tag name and class/id hints.
fn base_score(element: &ElementRef<'_>) -> f64 {
    let tag = match element.value().name() {
        "article" | "main" => 10.0,
        "div" | "section" => 5.0,
        "pre" | "td" | "blockquote" => 3.0,
        "ol" | "ul" | "dl" | "dd" | "dt" | "li" | "form" => -3.0,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "th" => -5.0,
        _ => 0.0,
    };

    let hints = format!(
        "{} {}",
        element.value().attr("class").unwrap_or_default(),
        element.value().id().unwrap_or_default()
    );
    let mut weight = 0.0;
    if POSITIVE_HINT.is_match(&hints) {
        weight += 25.0;
    }
    if NEGATIVE_HINT.is_match(&hints) {
        weight -= 25.0;
    }
    tag + weight
}

/// Share of an element's text that sits inside links.
fn link_density(element: ElementRef<'_>) -> f64 {
    let total = visible_text(element).chars().count();
    if total == 0 {
        return 0.0;
    }
    let linked: usize = element
        .select(&LINKS)
        .map(|a| a.text().map(|t| t.chars().count()).sum::<usize>())
        .sum();
    (linked as f64 / total as f64).min(1.0)
}

// ---------------------------------------------------------------------------
// Selector fallback
// ---------------------------------------------------------------------------

fn selector_text(doc: &Html) -> String {
    for selector in CONTAINERS.iter() {
        if let Some(element) = doc.select(selector).next() {
            let text = visible_text(element);
            if !text.trim().is_empty() {
                return text;
            }
            break;
        }
    }

    doc.select(&BODY)
        .next()
        .map(visible_text)
        .unwrap_or_else(|| visible_text(doc.root_element()))
}

// ---------------------------------------------------------------------------
// Text walk
// ---------------------------------------------------------------------------

fn is_excluded(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    EXCLUDED_TAGS.contains(&value.name()) || value.classes().any(|c| EXCLUDED_CLASSES.contains(&c))
}

/// Text of an element with excluded subtrees skipped and block boundaries
/// turned into newlines.
fn visible_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(element, &mut out);
    out
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                if is_excluded(&child) {
                    continue;
                }
                let block = BLOCK_TAGS.contains(&child.value().name());
                if block {
                    out.push('\n');
                }
                collect_text(child, out);
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_fixture(name: &str) -> String {
        let path = format!("../../../fixtures/html/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    #[test]
    fn readability_picks_article_and_drops_chrome() {
        let text = extract_main_text(&load_fixture("docs_page.html"), 100);

        assert!(text.contains("Ownership is a set of rules"));
        assert!(text.contains("Each value in Rust has an owner."));
        assert!(text.contains("String::from(\"hello\")"));
        assert!(!text.contains("Sidebar link"));
        assert!(!text.contains("Buy our premium course"));
        assert!(!text.contains("Great article"));
        assert!(!text.contains("Copyright"));
        assert!(!text.contains("analytics"));
    }

    #[test]
    fn selector_fallback_finds_markdown_body() {
        let text = extract_main_text(&load_fixture("markdown_body.html"), 100);

        assert!(text.contains("A runtime for writing reliable asynchronous applications"));
        assert!(!text.contains("Sign in"));
        assert!(!text.contains("Related"));
    }

    #[test]
    fn falls_back_to_body_text() {
        let text = extract_main_text(&load_fixture("sparse.html"), 100);
        assert_eq!(text, "Loading...");
    }

    #[test]
    fn short_pages_use_container_text() {
        let html = r#"<html><body>
            <div class="content"><p>Only one short paragraph here, really.</p>
            <span>Plus inline text that readability never scores.</span></div>
        </body></html>"#;
        let text = extract_main_text(html, 100);
        assert!(text.contains("Plus inline text"));
    }

    #[test]
    fn block_elements_break_lines() {
        let doc = Html::parse_document("<body><p>one</p><p>two</p><span>three</span></body>");
        let body = doc.select(&BODY).next().expect("body");
        let text = normalize_text(&visible_text(body));
        assert_eq!(text, "one\n\ntwo\nthree");
    }
}
