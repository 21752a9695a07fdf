//! Candidate URL cleanup and image-extension validation.

use url::Url;

/// Image extensions accepted for page URLs (compared case-insensitively).
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "webp", "gif", "bmp"];

/// Returns the first URL of a `srcset` value (`a.jpg 1x, b.jpg 2x` → `a.jpg`).
#[must_use]
pub fn first_srcset_candidate(srcset: &str) -> Option<&str> {
    srcset
        .split(',')
        .next()
        .and_then(|candidate| candidate.split_whitespace().next())
}

/// Normalizes a raw candidate into an absolute image URL.
///
/// Drops the query string and fragment, percent-decodes, turns
/// protocol-relative references into `https:` and resolves relative
/// references against `base`. Returns `None` unless the result is an
/// http(s) URL whose path ends in an accepted image extension.
#[must_use]
pub fn normalize_candidate(raw: &str, base: &Url) -> Option<String> {
    let trimmed = raw.trim();
    let without_query = trimmed.split(['?', '#']).next().unwrap_or_default();
    if without_query.is_empty() || without_query.starts_with("data:") {
        return None;
    }

    let decoded = urlencoding::decode(without_query)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| without_query.to_string());

    let url = if decoded.starts_with("//") {
        Url::parse(&format!("https:{decoded}")).ok()?
    } else if decoded.starts_with("http://") || decoded.starts_with("https://") {
        Url::parse(&decoded).ok()?
    } else {
        base.join(&decoded).ok()?
    };

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    if !has_image_extension(&url) {
        return None;
    }
    Some(url.to_string())
}

/// True when the URL path ends in one of [`IMAGE_EXTENSIONS`].
#[must_use]
pub fn has_image_extension(url: &Url) -> bool {
    let path = url.path();
    let Some(file_name) = path.rsplit('/').next() else {
        return false;
    };
    let Some((_, extension)) = file_name.rsplit_once('.') else {
        return false;
    };
    IMAGE_EXTENSIONS
        .iter()
        .any(|accepted| accepted.eq_ignore_ascii_case(extension))
}

/// Removes duplicates, keeping the first occurrence.
#[must_use]
pub fn dedupe_preserving_order(urls: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    urls.into_iter().filter(|u| seen.insert(u.clone())).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://reader.example.com/comic/12/ch3.html").unwrap()
    }

    #[test]
    fn test_normalize_strips_query_string() {
        assert_eq!(
            normalize_candidate("https://img.example.com/a/001.jpg?token=abc", &base()).as_deref(),
            Some("https://img.example.com/a/001.jpg")
        );
    }

    #[test]
    fn test_normalize_protocol_relative() {
        assert_eq!(
            normalize_candidate("//img.example.com/a/002.PNG", &base()).as_deref(),
            Some("https://img.example.com/a/002.PNG")
        );
    }

    #[test]
    fn test_normalize_relative_joins_page_url() {
        assert_eq!(
            normalize_candidate("pics/003.webp", &base()).as_deref(),
            Some("https://reader.example.com/comic/12/pics/003.webp")
        );
        assert_eq!(
            normalize_candidate("/static/004.gif", &base()).as_deref(),
            Some("https://reader.example.com/static/004.gif")
        );
    }

    #[test]
    fn test_normalize_percent_decodes() {
        assert_eq!(
            normalize_candidate("https://img.example.com/%E7%AC%AC1/005.jpg", &base()).as_deref(),
            Some("https://img.example.com/%E7%AC%AC1/005.jpg")
        );
        assert_eq!(
            normalize_candidate("https://img.example.com/a%2Fb/006.jpg", &base()).as_deref(),
            Some("https://img.example.com/a/b/006.jpg")
        );
    }

    #[test]
    fn test_normalize_rejects_non_images() {
        assert!(normalize_candidate("https://example.com/ad.js", &base()).is_none());
        assert!(normalize_candidate("https://example.com/page", &base()).is_none());
        assert!(normalize_candidate("data:image/png;base64,AAAA", &base()).is_none());
        assert!(normalize_candidate("   ", &base()).is_none());
        assert!(normalize_candidate("javascript:void(0).jpg", &base()).is_none());
    }

    #[test]
    fn test_first_srcset_candidate() {
        assert_eq!(first_srcset_candidate("a.jpg 1x, b.jpg 2x"), Some("a.jpg"));
        assert_eq!(first_srcset_candidate("  c.png  "), Some("c.png"));
        assert_eq!(first_srcset_candidate(""), None);
    }

    #[test]
    fn test_dedupe_preserving_order() {
        let urls = vec!["b".to_string(), "a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(dedupe_preserving_order(urls), vec!["b", "a", "c"]);
    }
}
