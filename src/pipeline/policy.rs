//! What a chapter does when some of its pages could not be fetched.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Partial-failure policy for a chapter's page set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialFailurePolicy {
    /// Any failed page aborts the chapter; no document is produced.
    #[default]
    Strict,
    /// Failed pages are dropped, recorded as gaps, and the rest is assembled.
    Lenient,
}

impl PartialFailurePolicy {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Lenient => "lenient",
        }
    }

    /// True when a chapter with `failed` missing pages may still be assembled.
    #[must_use]
    pub fn allows(self, failed: usize) -> bool {
        failed == 0 || self == Self::Lenient
    }
}

impl fmt::Display for PartialFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PartialFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            other => Err(format!("unknown policy '{other}' (expected strict or lenient)")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_strict() {
        assert_eq!(PartialFailurePolicy::default(), PartialFailurePolicy::Strict);
    }

    #[test]
    fn test_allows() {
        assert!(PartialFailurePolicy::Strict.allows(0));
        assert!(!PartialFailurePolicy::Strict.allows(1));
        assert!(PartialFailurePolicy::Lenient.allows(3));
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!("Lenient".parse::<PartialFailurePolicy>().unwrap(), PartialFailurePolicy::Lenient);
        assert!("sometimes".parse::<PartialFailurePolicy>().is_err());
    }
}
