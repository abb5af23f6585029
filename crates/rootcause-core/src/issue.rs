use crate::error::{Result, RootCauseError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

static ISSUE_ID_RE: OnceLock<Regex> = OnceLock::new();

fn issue_id_re() -> &'static Regex {
    ISSUE_ID_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_\-]*$").unwrap())
}

/// Identifier of one issue in the external tracker: a numeric id
/// (`12345678`) or a project-prefixed short id (`CHECKOUT-4F2`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueId(String);

impl IssueId {
    /// Accepts a bare id or an issue URL. For URLs the path segment after
    /// `/issues/` is used, up to the next `/` or `?`.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let candidate = match trimmed.find("/issues/") {
            Some(pos) => {
                let rest = &trimmed[pos + "/issues/".len()..];
                let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
                &rest[..end]
            }
            None => trimmed.trim_end_matches('/'),
        };

        if candidate.is_empty() || candidate.len() > 128 || !issue_id_re().is_match(candidate) {
            return Err(RootCauseError::InvalidIssueId(input.to_string()));
        }
        Ok(Self(candidate.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for IssueId {
    type Err = RootCauseError;

    fn from_str(s: &str) -> Result<Self> {
        IssueId::parse(s)
    }
}
