//! Normalizes the markdown printed by the issue CLI into a `DiagnosticRecord`.
//!
//! The text is split into sections by markdown headers. Breadcrumb and tag
//! lines are only read inside their own sections; the error line and stack
//! frames may appear anywhere else.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::ParseError;
use crate::types::{Breadcrumb, BreadcrumbCategory, DiagnosticRecord, Frame, RawContext};

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

static HEADER_RE: OnceLock<Regex> = OnceLock::new();
static BOLD_ERROR_RE: OnceLock<Regex> = OnceLock::new();
static PLAIN_ERROR_RE: OnceLock<Regex> = OnceLock::new();
static FRAME_RE: OnceLock<Regex> = OnceLock::new();
static BREADCRUMB_RE: OnceLock<Regex> = OnceLock::new();
static TAG_RE: OnceLock<Regex> = OnceLock::new();
static TAG_ROW_RE: OnceLock<Regex> = OnceLock::new();

fn header_re() -> &'static Regex {
    HEADER_RE.get_or_init(|| Regex::new(r"^\s{0,3}#{1,6}\s+(?P<title>.+?)\s*#*\s*$").unwrap())
}

fn bold_error_re() -> &'static Regex {
    BOLD_ERROR_RE.get_or_init(|| {
        Regex::new(r"^\s*\*\*(?P<ty>[A-Za-z_][\w.:$<>\-]*)\*\*\s*:\s*(?P<msg>.*?)\s*$").unwrap()
    })
}

fn plain_error_re() -> &'static Regex {
    PLAIN_ERROR_RE.get_or_init(|| {
        Regex::new(
            r"^\s*(?P<ty>(?:[A-Za-z_][\w.:]*)?(?:Error|Exception|Panic|Fault|Rejection))\s*:\s*(?P<msg>.*?)\s*$",
        )
        .unwrap()
    })
}

fn frame_re() -> &'static Regex {
    FRAME_RE.get_or_init(|| {
        Regex::new(
            r"^\s*(?:[-*+]\s+)?(?P<marker>>)?\s*(?:at\s+)?(?P<file>[^\s:()]*[./][^\s:()]*):(?P<line>\d+)(?::(?P<col>\d+))?(?:\s+in\s+(?P<function>\S+))?\s*$",
        )
        .unwrap()
    })
}

fn breadcrumb_re() -> &'static Regex {
    BREADCRUMB_RE.get_or_init(|| {
        Regex::new(
            r"^\s*(?:[-*]\s+)?\[(?P<ord>\d+)\]\s+(?P<cat>[A-Za-z]+(?:\.[A-Za-z_\-]+)*):?\s+(?P<summary>.+?)\s*$",
        )
        .unwrap()
    })
}

fn tag_re() -> &'static Regex {
    TAG_RE.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*]\s+)?`?(?P<key>[A-Za-z0-9_.\-/]+)`?\s*[:=]\s*(?P<value>.*?)\s*$")
            .unwrap()
    })
}

fn tag_row_re() -> &'static Regex {
    TAG_ROW_RE.get_or_init(|| {
        Regex::new(r"^\s*\|\s*(?P<key>[^|]+?)\s*\|\s*(?P<value>[^|]*?)\s*\|\s*$").unwrap()
    })
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Stack,
    Breadcrumbs,
    Tags,
    Other,
}

impl Section {
    fn from_title(title: &str) -> Section {
        let t = title.to_lowercase();
        if t.contains("breadcrumb") {
            Section::Breadcrumbs
        } else if t.contains("tag") {
            Section::Tags
        } else if t.contains("stack") || t.contains("frame") || t.contains("trace") {
            Section::Stack
        } else {
            Section::Other
        }
    }

    fn may_hold_frames(self) -> bool {
        !matches!(self, Section::Breadcrumbs | Section::Tags)
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

pub fn parse(raw: &RawContext) -> Result<DiagnosticRecord, ParseError> {
    parse_text(&raw.text)
}

pub fn parse_text(text: &str) -> Result<DiagnosticRecord, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::MalformedContext("context is empty".to_string()));
    }

    let mut section = Section::Preamble;
    let mut error: Option<(String, String)> = None;
    let mut frames = Vec::new();
    let mut breadcrumbs = Vec::new();
    let mut tags = BTreeMap::new();

    for line in text.lines() {
        if let Some(caps) = header_re().captures(line) {
            section = Section::from_title(&caps["title"]);
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }

        match section {
            Section::Breadcrumbs => {
                if let Some(crumb) = parse_breadcrumb(line) {
                    breadcrumbs.push(crumb);
                }
            }
            Section::Tags => {
                if let Some((key, value)) = parse_tag(line) {
                    tags.insert(key, value);
                }
            }
            s if s.may_hold_frames() => {
                if let Some(frame) = parse_frame(line) {
                    frames.push(frame);
                } else if error.is_none() {
                    error = parse_error_line(line);
                }
            }
            _ => {}
        }
    }

    if frames.is_empty() {
        return Err(ParseError::MalformedContext(
            "no stack frames found".to_string(),
        ));
    }

    let (error_type, error_message) = error.unwrap_or_else(|| {
        tracing::warn!("no error line found; using a generic error type");
        ("Error".to_string(), String::new())
    });

    breadcrumbs.sort_by_key(|b: &Breadcrumb| b.timestamp_ordinal);

    tracing::debug!(
        frames = frames.len(),
        breadcrumbs = breadcrumbs.len(),
        tags = tags.len(),
        "parsed diagnostic context"
    );

    Ok(DiagnosticRecord {
        error_type,
        error_message,
        frames,
        breadcrumbs,
        tags,
    })
}

// ---------------------------------------------------------------------------
// Line parsers
// ---------------------------------------------------------------------------

fn parse_error_line(line: &str) -> Option<(String, String)> {
    let caps = bold_error_re()
        .captures(line)
        .or_else(|| plain_error_re().captures(line))?;
    Some((caps["ty"].to_string(), caps["msg"].to_string()))
}

fn parse_frame(line: &str) -> Option<Frame> {
    let caps = frame_re().captures(line)?;
    let mut location = format!("{}:{}", &caps["file"], &caps["line"]);
    if let Some(col) = caps.name("col") {
        location.push(':');
        location.push_str(col.as_str());
    }
    Some(Frame {
        location,
        function: caps.name("function").map(|m| m.as_str().to_string()),
        in_app: caps.name("marker").is_some(),
    })
}

fn parse_breadcrumb(line: &str) -> Option<Breadcrumb> {
    let caps = breadcrumb_re().captures(line)?;
    let ordinal = caps["ord"].parse::<u64>().ok()?;
    let label = &caps["cat"];

    // Whole label first (`app.lifecycle`), then `category.kind`.
    let split = label.parse::<BreadcrumbCategory>().map(|cat| (cat, None)).or_else(|_| {
        let (head, tail) = label.split_once('.').ok_or(())?;
        head.parse::<BreadcrumbCategory>()
            .map(|cat| (cat, Some(tail.to_lowercase())))
            .map_err(|_| ())
    });
    let Ok((category, kind)) = split else {
        tracing::debug!(label, "skipping breadcrumb with unknown category");
        return None;
    };

    Some(Breadcrumb {
        timestamp_ordinal: ordinal,
        category,
        kind,
        summary: caps["summary"].to_string(),
    })
}

fn parse_tag(line: &str) -> Option<(String, String)> {
    if let Some(caps) = tag_row_re().captures(line) {
        let key = caps["key"].trim_matches('`');
        let value = caps["value"].trim_matches('`');
        let is_header = key.eq_ignore_ascii_case("key") || key.eq_ignore_ascii_case("tag");
        if key.is_empty() || is_header || key.chars().all(|c| c == '-' || c == ':') {
            return None;
        }
        return Some((key.to_string(), value.to_string()));
    }

    let caps = tag_re().captures(line)?;
    Some((
        caps["key"].to_string(),
        caps["value"].trim_matches('`').to_string(),
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
