//! Shared User-Agent strings for page rendering and image fetch clients.
//!
//! Image hosts behind comic readers commonly reject non-browser agents, so both
//! clients present the same browser identity. The tool name is appended as a
//! product token so traffic remains attributable.

/// Browser identity presented to the source.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Default User-Agent for session and image requests.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{BROWSER_USER_AGENT} chapter-binder/{version}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_is_browser_like_with_tool_token() {
        let ua = default_user_agent();
        assert!(ua.starts_with("Mozilla/5.0"), "UA must look like a browser: {ua}");
        assert!(
            ua.ends_with(&format!("chapter-binder/{}", env!("CARGO_PKG_VERSION"))),
            "UA must carry the tool token: {ua}"
        );
    }
}
