//! Source profiles and chapter discovery.
//!
//! A [`SiteProfile`] knows where a content item's catalog lives, how to log
//! in, and how to read the content title and chapter list out of the
//! rendered catalog page.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use scraper::Html;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};
use url::Url;

use crate::extract::{AttributeScan, ExtractionStrategy, default_strategies};
use crate::fetch::RetryPolicy;
use crate::html::{
    collapse_whitespace, compile_static_regex, compile_static_selector, element_text,
    element_text_without,
};
use crate::model::ChapterDescriptor;
use crate::session::{BrowserSession, LoginForm, RenderedPage, SessionError, render_with_retry};

/// Title used when the catalog page carries none.
pub const UNKNOWN_TITLE: &str = "Unknown Comic";

/// Errors raised while discovering a content item's chapters.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The content id cannot be placed in a catalog URL.
    #[error("invalid content id {id:?}: use letters, digits, '-' or '_'")]
    InvalidContentId { id: String },

    /// The catalog page could not be rendered.
    #[error("catalog {url} could not be rendered after {attempts} attempt(s): {source}")]
    Render {
        url: String,
        attempts: u32,
        #[source]
        source: SessionError,
    },

    /// The catalog rendered but lists no chapter.
    #[error("no chapters listed on {url}")]
    NoChapters { url: String },
}

/// Supported content sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SiteProfile {
    #[default]
    #[serde(rename = "8comic")]
    EightComic,
    #[serde(rename = "xmanhua")]
    Xmanhua,
}

impl SiteProfile {
    /// Every profile, in the order shown to users.
    pub const ALL: [Self; 2] = [Self::EightComic, Self::Xmanhua];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::EightComic => "8comic",
            Self::Xmanhua => "xmanhua",
        }
    }

    /// Catalog page of a content item.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::InvalidContentId`] for ids that are empty or
    /// contain characters other than ASCII letters, digits, `-` and `_`.
    pub fn catalog_url(self, content_id: &str) -> Result<Url, DiscoveryError> {
        validate_content_id(content_id)?;
        let raw = match self {
            Self::EightComic => format!("https://www.8comic.com/html/{content_id}.html"),
            Self::Xmanhua => format!("https://www.xmanhua.com/{content_id}/"),
        };
        Url::parse(&raw).map_err(|_| DiscoveryError::InvalidContentId {
            id: content_id.to_string(),
        })
    }

    /// Login form for sources that support accounts.
    #[must_use]
    pub fn login_form(self) -> Option<LoginForm> {
        match self {
            Self::EightComic => Url::parse("https://www.8comic.com/member/login")
                .ok()
                .map(|url| LoginForm {
                    url,
                    username_field: "username".to_string(),
                    password_field: "password".to_string(),
                }),
            Self::Xmanhua => None,
        }
    }

    /// Extraction strategies in fallback order for this source's chapter pages.
    #[must_use]
    pub fn strategies(self) -> Vec<Box<dyn ExtractionStrategy>> {
        match self {
            Self::EightComic => default_strategies(),
            Self::Xmanhua => {
                let mut strategies: Vec<Box<dyn ExtractionStrategy>> = vec![Box::new(
                    AttributeScan::new("reader-src", "div#cp_img img[src]", "src"),
                )];
                strategies.extend(default_strategies());
                strategies
            }
        }
    }

    /// Reads the content title and ordered chapters from a rendered catalog.
    #[must_use]
    pub fn parse_catalog(self, page: &RenderedPage) -> Catalog {
        let document = Html::parse_document(&page.html);
        match self {
            Self::EightComic => parse_eight_comic(&document, &page.url),
            Self::Xmanhua => parse_xmanhua(&document, &page.url),
        }
    }
}

impl fmt::Display for SiteProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SiteProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown source '{s}' (expected 8comic or xmanhua)"))
    }
}

/// Title and ordered chapters of a content item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub title: String,
    pub chapters: Vec<ChapterDescriptor>,
}

fn validate_content_id(content_id: &str) -> Result<(), DiscoveryError> {
    let valid = !content_id.is_empty()
        && content_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(DiscoveryError::InvalidContentId {
            id: content_id.to_string(),
        })
    }
}

/// Resolves an anchor to a renderable page reference.
///
/// Real links are made absolute; script-driven anchors fall back to `#id`,
/// which only a browser-backed session holding the catalog page can follow.
/// `cview('10406-3.html', ...)` opens chapter 3 of book 10406.
static CVIEW_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r#"cview\(\s*['"]([A-Za-z0-9_]+)-(\d+)\.html['"]"#));

/// Reader URL a `cview(...)` click handler navigates to.
fn cview_ref(handler: &str, base: &Url) -> Option<String> {
    let captures = CVIEW_RE.captures(handler)?;
    let url = base
        .join(&format!("/view/{}.html?ch={}", &captures[1], &captures[2]))
        .ok()?;
    Some(url.to_string())
}

fn chapter_ref(href: Option<&str>, anchor_id: Option<&str>, base: &Url) -> Option<String> {
    let usable_href = href
        .map(str::trim)
        .filter(|h| !h.is_empty() && !h.starts_with('#') && !h.starts_with("javascript:"));
    if let Some(href) = usable_href
        && let Ok(url) = base.join(href)
    {
        return Some(url.to_string());
    }
    anchor_id.map(|id| format!("#{id}"))
}

fn parse_eight_comic(document: &Html, base: &Url) -> Catalog {
    let title_selector = compile_static_selector(r#"meta[name="name"]"#);
    let title = document
        .select(&title_selector)
        .next()
        .and_then(|meta| meta.value().attr("content"))
        .map(collapse_whitespace)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string());

    let chapter_selector = compile_static_selector("div#chapters a[id]");
    let chapters = document
        .select(&chapter_selector)
        .filter_map(|anchor| {
            let id = anchor.value().attr("id");
            let href = anchor.value().attr("href");
            let page_ref = [href, anchor.value().attr("onclick")]
                .into_iter()
                .flatten()
                .find_map(|handler| cview_ref(handler, base))
                .or_else(|| chapter_ref(href, id, base))?;
            Some((element_text(&anchor), page_ref))
        })
        .enumerate()
        .map(|(i, (name, page_ref))| descriptor(i, name, page_ref))
        .collect();

    Catalog { title, chapters }
}

fn parse_xmanhua(document: &Html, base: &Url) -> Catalog {
    let title_selector = compile_static_selector("p.detail-info-title");
    let title = document
        .select(&title_selector)
        .next()
        .map(|p| element_text(&p))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string());

    // listed newest first
    let chapter_selector = compile_static_selector("a.detail-list-form-item");
    let anchors: Vec<_> = document.select(&chapter_selector).collect();
    let chapters = anchors
        .into_iter()
        .rev()
        .filter_map(|anchor| {
            let page_ref = chapter_ref(anchor.value().attr("href"), anchor.value().attr("id"), base)?;
            Some((element_text_without(&anchor, "span"), page_ref))
        })
        .enumerate()
        .map(|(i, (name, page_ref))| descriptor(i, name, page_ref))
        .collect();

    Catalog { title, chapters }
}

#[allow(clippy::cast_possible_truncation)]
fn descriptor(position: usize, name: String, page_ref: String) -> ChapterDescriptor {
    let sequence_index = position as u32 + 1;
    let title = if name.is_empty() {
        format!("Chapter {sequence_index}")
    } else {
        name
    };
    ChapterDescriptor::new(sequence_index, title, page_ref)
}

/// Renders the catalog page and lists the content item's chapters.
///
/// # Errors
///
/// Returns [`DiscoveryError`] when the id is invalid, the catalog cannot be
/// rendered, or it lists no chapter.
#[instrument(skip(session, render_policy), fields(source = %profile))]
pub async fn discover(
    session: &Arc<dyn BrowserSession>,
    profile: SiteProfile,
    content_id: &str,
    render_policy: &RetryPolicy,
) -> Result<Catalog, DiscoveryError> {
    let url = profile.catalog_url(content_id)?;
    let (page, attempts) = render_with_retry(session, url.as_str(), render_policy)
        .await
        .map_err(|(source, attempts)| DiscoveryError::Render {
            url: url.to_string(),
            attempts,
            source,
        })?;
    debug!(attempts, "catalog rendered");

    let catalog = profile.parse_catalog(&page);
    if catalog.chapters.is_empty() {
        return Err(DiscoveryError::NoChapters {
            url: url.to_string(),
        });
    }

    info!(title = %catalog.title, chapters = catalog.chapters.len(), "catalog discovered");
    Ok(catalog)
}
