//! Plain-text extraction from legal document HTML
//!
//! This module handles turning a fetched document page into text:
//! - Picking the document container over the surrounding site chrome
//! - Dropping scripts, styles, navigation, headers, footers and forms
//! - Emitting one line per block element with whitespace collapsed

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};

/// Elements never contributing text
const IGNORE_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "nav", "header", "footer", "form", "button",
    "iframe", "svg", "head",
];

/// Site chrome classes on the document source
const IGNORE_CLASSES: &[&str] = &["breadcrumb", "skip-link", "sr-only", "visually-hidden"];

/// Elements that start a new line of output
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "h1", "h2", "h3", "h4", "h5", "h6", "li", "ol", "ul", "tr", "table",
    "section", "article", "blockquote", "dd", "dt", "dl", "pre", "hr",
];

/// Document containers, most specific first
const CONTENT_ROOTS: &[&str] = &[
    "#document1",
    "#textTabContent",
    ".eli-container",
    "#TexteOnly",
    "body",
];

/// Extracts the plain-text body of a document page
///
/// Returns None when the page holds no text once boilerplate is removed.
///
/// # Example
///
/// ```
/// use lex_harvest::documents::extract_text;
///
/// let html = br#"<html><body><nav>Menu</nav><div id="document1"><p>Artikel 1</p><p>Deze  richtlijn</p></div></body></html>"#;
/// assert_eq!(extract_text(html).unwrap(), "Artikel 1\nDeze richtlijn");
/// ```
pub fn extract_text(raw: &[u8]) -> Option<String> {
    let html = String::from_utf8_lossy(raw);
    let document = Html::parse_document(&html);
    let root = select_content_root(&document).unwrap_or_else(|| document.root_element());

    let mut buf = String::new();
    collect_text(root, &mut buf);

    let text = buf
        .lines()
        .map(normalize_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn select_content_root(document: &Html) -> Option<ElementRef<'_>> {
    for selector in CONTENT_ROOTS {
        let Ok(parsed) = Selector::parse(selector) else {
            continue;
        };
        if let Some(element) = document.select(&parsed).next() {
            return Some(element);
        }
    }
    None
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    visit_element(child_element, out);
                }
            }
            _ => {}
        }
    }
}

fn visit_element(element: ElementRef<'_>, out: &mut String) {
    if should_ignore_element(element.value()) {
        return;
    }

    let name = element.value().name();
    let is_block = BLOCK_TAGS.contains(&name);
    if is_block {
        out.push('\n');
    } else if name == "td" || name == "th" {
        out.push(' ');
    }

    collect_text(element, out);

    if is_block {
        out.push('\n');
    }
}

fn should_ignore_element(element: &scraper::node::Element) -> bool {
    if IGNORE_TAGS.contains(&element.name()) {
        return true;
    }
    element
        .classes()
        .any(|class_name| IGNORE_CLASSES.contains(&class_name))
}

fn normalize_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out.trim().to_string()
}
