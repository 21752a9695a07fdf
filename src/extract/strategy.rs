//! Extraction strategies: pure functions from a rendered page to raw image
//! URL candidates in document order.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

use super::normalize::first_srcset_candidate;
use crate::html::{compile_static_regex, compile_static_selector};
use crate::session::RenderedPage;

/// One way of finding image URLs in a rendered chapter page.
///
/// Implementations return raw candidates; the extractor normalizes and
/// validates them, and moves on to the next strategy when nothing survives.
pub trait ExtractionStrategy: Send + Sync {
    /// Identifier recorded on every reference this strategy produces.
    fn name(&self) -> &str;

    /// Returns the ordered raw candidates, or `None` when the page has none.
    fn extract(&self, page: &RenderedPage) -> Option<Vec<String>>;
}

/// Reads one attribute from every element matching a CSS selector.
#[derive(Debug, Clone)]
pub struct AttributeScan {
    name: &'static str,
    selector: &'static str,
    attribute: &'static str,
}

impl AttributeScan {
    #[must_use]
    pub const fn new(name: &'static str, selector: &'static str, attribute: &'static str) -> Self {
        Self {
            name,
            selector,
            attribute,
        }
    }
}

impl ExtractionStrategy for AttributeScan {
    fn name(&self) -> &str {
        self.name
    }

    fn extract(&self, page: &RenderedPage) -> Option<Vec<String>> {
        let document = Html::parse_document(&page.html);
        let selector = compile_static_selector(self.selector);

        let candidates: Vec<String> = document
            .select(&selector)
            .filter_map(|el| el.value().attr(self.attribute))
            .filter_map(|value| {
                if self.attribute == "srcset" {
                    first_srcset_candidate(value)
                } else {
                    Some(value)
                }
            })
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .collect();

        (!candidates.is_empty()).then_some(candidates)
    }
}

/// Quoted image URLs inside inline scripts, e.g. a reader's page array.
static SCRIPT_IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r#"(?i)["']((?:https?:)?//[^"'\s]+?\.(?:jpe?g|png|webp|gif|bmp)(?:\?[^"'\s]*)?)["']"#,
    )
});

/// Pattern match over the text of `<script>` elements.
#[derive(Debug, Clone)]
pub struct ScriptPattern {
    name: &'static str,
}

impl ScriptPattern {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl ExtractionStrategy for ScriptPattern {
    fn name(&self) -> &str {
        self.name
    }

    fn extract(&self, page: &RenderedPage) -> Option<Vec<String>> {
        let document = Html::parse_document(&page.html);
        let selector = compile_static_selector("script");

        let mut candidates = Vec::new();
        for script in document.select(&selector) {
            // JSON-encoded arrays escape slashes
            let source = script.text().collect::<String>().replace("\\/", "/");
            candidates.extend(
                SCRIPT_IMAGE_RE
                    .captures_iter(&source)
                    .filter_map(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string()),
            );
        }

        (!candidates.is_empty()).then_some(candidates)
    }
}

/// The strategy list every source uses, in fallback order.
#[must_use]
pub fn default_strategies() -> Vec<Box<dyn ExtractionStrategy>> {
    vec![
        Box::new(AttributeScan::new("primary-src", "div#comics-pics img[src]", "src")),
        Box::new(ScriptPattern::new("script-pattern")),
        Box::new(AttributeScan::new("lazy-data-src", "img[data-src]", "data-src")),
        Box::new(AttributeScan::new("source-srcset", "source[srcset]", "srcset")),
    ]
}
