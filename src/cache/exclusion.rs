//! Paths that must always be regenerated.
//!
//! Each configured string is compiled once into an [`ExclusionRule`]. A rule
//! matches a path when the path equals the rule source, or (for pattern rules)
//! when the compiled regex finds a match anywhere in the path. A source that
//! fails to compile keeps only its literal comparison.

use regex::Regex;
use tracing::warn;

const LITERAL_PREFIX: &str = "literal:";

#[derive(Debug, Clone)]
pub enum ExclusionRule {
    /// Exact path comparison only.
    Literal(String),
    /// Literal comparison, then an unanchored regex search.
    Pattern {
        source: String,
        regex: Option<Regex>,
    },
}

impl ExclusionRule {
    /// Parse one configured entry. A `literal:` prefix forces a literal rule.
    pub fn parse(raw: &str) -> Self {
        if let Some(literal) = raw.strip_prefix(LITERAL_PREFIX) {
            return Self::Literal(literal.to_string());
        }

        let regex = match Regex::new(raw) {
            Ok(regex) => Some(regex),
            Err(err) => {
                warn!(
                    target = "static_regen::cache::exclusion",
                    pattern = raw,
                    error = %err,
                    "exclusion pattern does not compile; only exact matches apply"
                );
                None
            }
        };

        Self::Pattern {
            source: raw.to_string(),
            regex,
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Literal(source) => source == path,
            Self::Pattern { source, regex } => {
                source == path || regex.as_ref().is_some_and(|regex| regex.is_match(path))
            }
        }
    }
}

/// Immutable set of exclusion rules.
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    rules: Vec<ExclusionRule>,
}

impl ExclusionFilter {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = patterns
            .into_iter()
            .map(|pattern| pattern.as_ref().trim().to_string())
            .filter(|pattern| !pattern.is_empty())
            .map(|pattern| ExclusionRule::parse(&pattern))
            .collect();
        Self { rules }
    }

    /// True when any rule matches; stops at the first match.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(path))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
