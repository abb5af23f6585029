use crate::error::RootCauseError;
use crate::issue::IssueId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// RawContext
// ---------------------------------------------------------------------------

/// Unparsed diagnostic text as printed by the external issue CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawContext {
    /// Issue the text was fetched for; `None` when loaded from a file.
    pub issue: Option<IssueId>,
    pub text: String,
}

impl RawContext {
    pub fn new(issue: Option<IssueId>, text: impl Into<String>) -> Self {
        Self {
            issue,
            text: text.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// `file:line` or `file:line:col`.
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    pub in_app: bool,
}

impl Frame {
    pub fn display_name(&self) -> String {
        match &self.function {
            Some(func) => format!("{} in {}", self.location, func),
            None => self.location.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// BreadcrumbCategory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreadcrumbCategory {
    Navigation,
    Http,
    Ui,
    Console,
    Lifecycle,
}

impl BreadcrumbCategory {
    pub fn all() -> &'static [BreadcrumbCategory] {
        &[
            BreadcrumbCategory::Navigation,
            BreadcrumbCategory::Http,
            BreadcrumbCategory::Ui,
            BreadcrumbCategory::Console,
            BreadcrumbCategory::Lifecycle,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BreadcrumbCategory::Navigation => "navigation",
            BreadcrumbCategory::Http => "http",
            BreadcrumbCategory::Ui => "ui",
            BreadcrumbCategory::Console => "console",
            BreadcrumbCategory::Lifecycle => "lifecycle",
        }
    }
}

impl fmt::Display for BreadcrumbCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BreadcrumbCategory {
    type Err = RootCauseError;

    /// Accepts the canonical names plus the aliases issue trackers commonly
    /// print (`xhr`, `fetch`, `nav`, `log`, `app.lifecycle`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "navigation" | "nav" => Ok(BreadcrumbCategory::Navigation),
            "http" | "xhr" | "fetch" => Ok(BreadcrumbCategory::Http),
            "ui" | "user" => Ok(BreadcrumbCategory::Ui),
            "console" | "log" => Ok(BreadcrumbCategory::Console),
            "lifecycle" | "app" | "app.lifecycle" => Ok(BreadcrumbCategory::Lifecycle),
            _ => Err(RootCauseError::InvalidCategory(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Breadcrumb
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub timestamp_ordinal: u64,
    pub category: BreadcrumbCategory,
    /// Sub-category, e.g. `click` in `ui.click`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub summary: String,
}

static STATUS_RE: OnceLock<Regex> = OnceLock::new();
static UNIT_RE: OnceLock<Regex> = OnceLock::new();

fn status_re() -> &'static Regex {
    STATUS_RE.get_or_init(|| Regex::new(r"\b[1-5][0-9]{2}\b").unwrap())
}

fn unit_re() -> &'static Regex {
    UNIT_RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:ms|s|sec|secs|seconds|b|kb|mb|gb|bytes)\b").unwrap()
    })
}

/// A standalone code: not part of a path, version or identifier, and not a
/// quantity with a unit (`250 ms`, `512 bytes`).
fn is_standalone_code(summary: &str, start: usize, end: usize) -> bool {
    let before = summary[..start].chars().next_back();
    let after = summary[end..].chars().next();
    !matches!(before, Some('/' | '.' | '-' | '_' | '#' | '?' | '&'))
        && !matches!(after, Some('/' | '.' | '-' | '_'))
        && !unit_re().is_match(&summary[end..])
}

/// Codes introduced as a status: `status=503`, `-> 503`, `[503]`.
fn is_marked_status(summary: &str, start: usize, end: usize) -> bool {
    let before = summary[..start].trim_end().to_lowercase();
    let after = summary[end..].chars().next();
    before.ends_with("status")
        || before.ends_with("status=")
        || before.ends_with("status:")
        || before.ends_with("->")
        || before.ends_with("=>")
        || before.ends_with('→')
        || (before.ends_with('[') && after == Some(']'))
        || (before.ends_with('(') && after == Some(')'))
}

impl Breadcrumb {
    /// `category` or `category.kind`.
    pub fn label(&self) -> String {
        match &self.kind {
            Some(kind) => format!("{}.{}", self.category, kind),
            None => self.category.to_string(),
        }
    }

    /// Response status of an `http` breadcrumb. A code marked as a status
    /// wins; otherwise the first standalone three-digit code counts.
    pub fn http_status(&self) -> Option<u16> {
        if self.category != BreadcrumbCategory::Http {
            return None;
        }
        let summary = self.summary.as_str();
        let codes: Vec<_> = status_re()
            .find_iter(summary)
            .filter(|m| is_standalone_code(summary, m.start(), m.end()))
            .collect();
        codes
            .iter()
            .find(|m| is_marked_status(summary, m.start(), m.end()))
            .or_else(|| codes.first())
            .and_then(|m| m.as_str().parse().ok())
    }
}

// ---------------------------------------------------------------------------
// DiagnosticRecord
// ---------------------------------------------------------------------------

/// Normalized view of one issue. `frames` is outermost-call-first and never
/// empty; `breadcrumbs` is sorted by `timestamp_ordinal` ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    pub error_type: String,
    pub error_message: String,
    pub frames: Vec<Frame>,
    #[serde(default)]
    pub breadcrumbs: Vec<Breadcrumb>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl DiagnosticRecord {
    /// `Type: message`, or just the type when the message is empty.
    pub fn headline(&self) -> String {
        if self.error_message.is_empty() {
            self.error_type.clone()
        } else {
            format!("{}: {}", self.error_type, self.error_message)
        }
    }

    pub fn in_app_frames(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter().filter(|f| f.in_app)
    }
}

// ---------------------------------------------------------------------------
// ErrorClass
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Crash,
    Concurrency,
    DataIntegrity,
    Configuration,
    DependencyFailure,
}

impl ErrorClass {
    pub fn all() -> &'static [ErrorClass] {
        &[
            ErrorClass::Crash,
            ErrorClass::Concurrency,
            ErrorClass::DataIntegrity,
            ErrorClass::Configuration,
            ErrorClass::DependencyFailure,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::Crash => "crash",
            ErrorClass::Concurrency => "concurrency",
            ErrorClass::DataIntegrity => "data_integrity",
            ErrorClass::Configuration => "configuration",
            ErrorClass::DependencyFailure => "dependency_failure",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ErrorClass::Crash => "Crash",
            ErrorClass::Concurrency => "Concurrency",
            ErrorClass::DataIntegrity => "Data integrity",
            ErrorClass::Configuration => "Configuration",
            ErrorClass::DependencyFailure => "Dependency failure",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorClass {
    type Err = RootCauseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crash" => Ok(ErrorClass::Crash),
            "concurrency" => Ok(ErrorClass::Concurrency),
            "data_integrity" => Ok(ErrorClass::DataIntegrity),
            "configuration" => Ok(ErrorClass::Configuration),
            "dependency_failure" => Ok(ErrorClass::DependencyFailure),
            _ => Err(RootCauseError::InvalidErrorClass(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
