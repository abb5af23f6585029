use std::fmt::Write as _;

use serde::Serialize;

use crate::classifier::Classification;
use crate::issue::IssueId;
use crate::tracer::{Evidence, TagFinding, TraceChain, TraceMarker, TraceStep};
use crate::types::{DiagnosticRecord, ErrorClass};

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<IssueId>,
    /// `Type: message` of the analyzed failure.
    pub error: String,
    pub error_class: ErrorClass,
    /// Classifier rule that assigned `error_class`.
    pub rule: &'static str,
    pub root_cause: String,
    pub evidence: Vec<TraceStep>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub markers: Vec<TraceMarker>,
    pub suggested_fix: String,
}

/// Assemble the report. Pure and infallible: a one-step (or even empty)
/// chain still produces a complete report.
pub fn build(
    record: &DiagnosticRecord,
    chain: &TraceChain,
    classification: Classification,
    issue: Option<IssueId>,
) -> Report {
    Report {
        issue,
        error: record.headline(),
        error_class: classification.class,
        rule: classification.rule,
        root_cause: root_cause_statement(record, chain, classification.class),
        evidence: chain.steps.clone(),
        markers: chain.markers.clone(),
        suggested_fix: suggested_fix(chain, classification.class),
    }
}

fn crash_site(chain: &TraceChain) -> Option<String> {
    chain.steps.iter().find_map(|step| match &step.evidence {
        Evidence::Frame { frame, .. } => Some(frame.display_name()),
        _ => None,
    })
}

fn origin(step: &TraceStep) -> String {
    match &step.evidence {
        Evidence::Frame { frame, .. } => format!("the code at {}", frame.display_name()),
        Evidence::Breadcrumb { breadcrumb, .. } => format!(
            "the {} event \"{}\" (breadcrumb {})",
            breadcrumb.label(),
            breadcrumb.summary,
            breadcrumb.timestamp_ordinal
        ),
        Evidence::Tags { finding, entries } => {
            let shown: Vec<String> = entries.iter().map(|(k, v)| format!("{k}={v}")).collect();
            match finding {
                TagFinding::MissingConfig => {
                    format!("unset configuration ({})", shown.join(", "))
                }
                TagFinding::SchemaConflict => {
                    format!("conflicting schema tags ({})", shown.join(", "))
                }
            }
        }
    }
}

fn root_cause_statement(record: &DiagnosticRecord, chain: &TraceChain, class: ErrorClass) -> String {
    let headline = record.headline();
    let site = crash_site(chain).unwrap_or_else(|| "an unknown location".to_string());
    let mut text = format!("{headline} was raised at {site}.");

    let upstream = chain.steps.len().saturating_sub(1);
    match chain.terminal() {
        Some(terminal) if upstream > 0 => {
            let _ = write!(
                text,
                " Tracing {upstream} step(s) upstream, the earliest identifiable origin is {}.",
                origin(terminal)
            );
        }
        _ => text.push_str(" No earlier event in the trail explains the failing value; the fault is local to the crash site."),
    }

    if chain.stopped_at_boundary {
        text.push_str(" The value crossed a trust boundary there, so its source lies outside the application.");
    }

    for marker in &chain.markers {
        match marker {
            TraceMarker::ConcurrencyAnomaly { label, gap, .. } => {
                let _ = write!(
                    text,
                    " Duplicate {label} events only {gap} time units apart point to a double submission racing itself."
                );
            }
        }
    }

    let _ = write!(text, " Classified as {}.", class.title().to_lowercase());
    text
}

fn suggested_fix(chain: &TraceChain, class: ErrorClass) -> String {
    let site = crash_site(chain).unwrap_or_else(|| "the crash site".to_string());
    match class {
        ErrorClass::Crash => format!(
            "Guard the value used at {site}: handle the null/undefined or out-of-range case explicitly instead of assuming it is present."
        ),
        ErrorClass::Concurrency => "Make the operation idempotent: disable the trigger while a request is in flight, debounce repeated events, or send an idempotency key so duplicates are rejected server-side.".to_string(),
        ErrorClass::DependencyFailure => {
            let target = chain
                .terminal()
                .and_then(|s| s.evidence.breadcrumb())
                .map(|b| format!("\"{}\"", b.summary))
                .unwrap_or_else(|| "the external call".to_string());
            format!(
                "Check the response status of {target} before using its body, and degrade gracefully (retry with backoff, fallback value, or a user-facing error) when the dependency fails."
            )
        }
        ErrorClass::Configuration => "Validate required configuration at startup and fail fast with the missing key's name, rather than reading it lazily where the absence surfaces as an unrelated crash.".to_string(),
        ErrorClass::DataIntegrity => "Validate the payload shape where it enters the application (schema or enum check) and reject or migrate mismatched data before it reaches the code that failed.".to_string(),
    }
}

impl Report {
    /// Markdown rendering for terminal output.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        match &self.issue {
            Some(issue) => {
                let _ = writeln!(out, "# Root cause: {issue}");
            }
            None => out.push_str("# Root cause\n"),
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "**Error:** {}", self.error);
        let _ = writeln!(
            out,
            "**Class:** {} (`{}`, rule `{}`)",
            self.error_class.title(),
            self.error_class,
            self.rule
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "## Summary");
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", self.root_cause);
        let _ = writeln!(out);
        let _ = writeln!(out, "## Evidence chain");
        let _ = writeln!(out);
        if self.evidence.is_empty() {
            let _ = writeln!(out, "_no evidence recorded_");
        }
        for (i, step) in self.evidence.iter().enumerate() {
            let _ = writeln!(
                out,
                "{}. {} _[{}]_",
                i + 1,
                step.description,
                step.evidence.reference()
            );
        }
        if !self.markers.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "## Markers");
            let _ = writeln!(out);
            for marker in &self.markers {
                match marker {
                    TraceMarker::ConcurrencyAnomaly {
                        first,
                        second,
                        gap,
                        label,
                    } => {
                        let _ = writeln!(
                            out,
                            "- concurrency anomaly: {label} breadcrumbs #{first} and #{second}, gap {gap}"
                        );
                    }
                }
            }
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "## Suggested fix");
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", self.suggested_fix);
        out
    }
}
