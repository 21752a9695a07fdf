//! HTML helpers shared by discovery and extraction.

use regex::Regex;
use scraper::{ElementRef, Selector};

/// Compiles a hardcoded regex literal.
///
/// Panics only on an invalid literal in this crate, which is a programming
/// error caught by tests.
#[must_use]
#[allow(clippy::panic)]
pub fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// Compiles a hardcoded CSS selector literal.
#[must_use]
#[allow(clippy::panic)]
pub fn compile_static_selector(selector: &str) -> Selector {
    Selector::parse(selector).unwrap_or_else(|e| panic!("invalid static selector '{selector}': {e}"))
}

/// Collapses whitespace runs and trims.
#[must_use]
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text of an element, whitespace-collapsed.
#[must_use]
pub fn element_text(element: &ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

/// Text of an element, skipping the content of child elements named `skip_tag`.
#[must_use]
pub fn element_text_without(element: &ElementRef<'_>, skip_tag: &str) -> String {
    let mut text = String::new();
    for child in element.children() {
        if let Some(t) = child.value().as_text() {
            text.push_str(t);
        } else if let Some(child_el) = ElementRef::wrap(child)
            && child_el.value().name() != skip_tag
        {
            text.extend(child_el.text());
        }
    }
    collapse_whitespace(&text)
}
