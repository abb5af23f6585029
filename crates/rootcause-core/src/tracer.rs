//! Upstream tracing: from the crash site back through the breadcrumb trail
//! to the earliest event that plausibly produced the implicated value.
//!
//! The walk starts at the innermost in-app frame and moves backward in time,
//! visiting each breadcrumb at most once. It stops at the earliest breadcrumb,
//! or earlier at the first trust boundary (by default `http` and `lifecycle`
//! events): values crossing a boundary originate outside the application and
//! nothing behind it is recoverable.
//!
//! Closely spaced duplicates of a watched category (double clicks on a submit
//! button, typically) are recorded as `ConcurrencyAnomaly` markers instead of
//! causal steps.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::config::TracerConfig;
use crate::signals;
use crate::types::{Breadcrumb, BreadcrumbCategory, DiagnosticRecord, Frame};

// ---------------------------------------------------------------------------
// Chain types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagFinding {
    /// Two or more schema/shape tags disagree.
    SchemaConflict,
    /// A configuration tag carries no value.
    MissingConfig,
}

/// What a step rests on. Frames and breadcrumbs are referenced by their
/// index in the record and carried along so the chain stands on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Evidence {
    Frame {
        index: usize,
        frame: Frame,
    },
    Breadcrumb {
        index: usize,
        breadcrumb: Breadcrumb,
    },
    Tags {
        finding: TagFinding,
        entries: BTreeMap<String, String>,
    },
}

impl Evidence {
    pub fn reference(&self) -> String {
        match self {
            Evidence::Frame { index, frame } => format!("frame #{index} ({})", frame.location),
            Evidence::Breadcrumb { breadcrumb, .. } => {
                format!("breadcrumb [{}] {}", breadcrumb.timestamp_ordinal, breadcrumb.label())
            }
            Evidence::Tags { entries, .. } => {
                let keys: Vec<&str> = entries.keys().map(String::as_str).collect();
                format!("tags {}", keys.join(", "))
            }
        }
    }

    pub fn breadcrumb(&self) -> Option<&Breadcrumb> {
        match self {
            Evidence::Breadcrumb { breadcrumb, .. } => Some(breadcrumb),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceStep {
    pub description: String,
    pub evidence: Evidence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceMarker {
    ConcurrencyAnomaly {
        /// Breadcrumb indices of the earlier and later duplicate.
        first: usize,
        second: usize,
        gap: u64,
        label: String,
    },
}

/// Ordered steps from the crash site back to the inferred root cause (the
/// last step), plus anomaly markers found along the trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceChain {
    /// `Type: message` of the traced failure.
    pub failure: String,
    pub steps: Vec<TraceStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub markers: Vec<TraceMarker>,
    pub stopped_at_boundary: bool,
}

impl TraceChain {
    pub fn terminal(&self) -> Option<&TraceStep> {
        self.steps.last()
    }

    pub fn has_concurrency_anomaly(&self) -> bool {
        self.markers
            .iter()
            .any(|m| matches!(m, TraceMarker::ConcurrencyAnomaly { .. }))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tracer
// ---------------------------------------------------------------------------

pub fn trace(record: &DiagnosticRecord, config: &TracerConfig) -> TraceChain {
    let failure = record.headline();
    let mut steps = Vec::new();

    // Top of the stack is the end of the outermost-first list.
    let start = record
        .frames
        .iter()
        .rposition(|f| f.in_app)
        .or_else(|| record.frames.len().checked_sub(1));

    let mut function = None;
    if let Some(index) = start {
        let frame = &record.frames[index];
        function = frame.function.as_deref();
        let where_ = if frame.in_app {
            "innermost in-app frame"
        } else {
            "no in-app frame; innermost frame"
        };
        steps.push(TraceStep {
            description: format!("{failure} surfaced at {} ({where_})", frame.display_name()),
            evidence: Evidence::Frame {
                index,
                frame: frame.clone(),
            },
        });
    }

    let tokens = signals::implicated_tokens(&record.error_message, function);
    let markers = find_anomalies(&record.breadcrumbs, config);
    let anomalous: HashSet<usize> = markers
        .iter()
        .flat_map(|m| match m {
            TraceMarker::ConcurrencyAnomaly { first, second, .. } => [*first, *second],
        })
        .collect();

    let mut stopped_at_boundary = false;
    for (index, crumb) in record.breadcrumbs.iter().enumerate().rev() {
        let boundary = config.is_boundary(crumb.category);
        if anomalous.contains(&index) && !boundary {
            continue;
        }
        let Some(finding) = explain(crumb, boundary, &tokens) else {
            continue;
        };

        let description = if boundary {
            format!("{finding}; trust boundary, tracing stops here")
        } else {
            finding
        };
        steps.push(TraceStep {
            description,
            evidence: Evidence::Breadcrumb {
                index,
                breadcrumb: crumb.clone(),
            },
        });

        if boundary {
            stopped_at_boundary = true;
            break;
        }
    }

    if !stopped_at_boundary {
        if let Some(step) = tag_step(&record.tags) {
            steps.push(step);
        }
    }

    tracing::debug!(
        steps = steps.len(),
        markers = markers.len(),
        stopped_at_boundary,
        "traced failure upstream"
    );

    TraceChain {
        failure,
        steps,
        markers,
        stopped_at_boundary,
    }
}

/// Why `crumb` plausibly produced the implicated value, if it did.
fn explain(crumb: &Breadcrumb, boundary: bool, tokens: &[String]) -> Option<String> {
    let summary = &crumb.summary;

    if crumb.category == BreadcrumbCategory::Http {
        return Some(match crumb.http_status() {
            Some(status) if !(200..300).contains(&status) => {
                format!("HTTP {status} response returned by an external service: {summary}")
            }
            Some(status) => format!("HTTP {status} response delivered the value: {summary}"),
            None => format!("HTTP exchange without a recorded status: {summary}"),
        });
    }
    if crumb.category == BreadcrumbCategory::Lifecycle && boundary {
        return Some(format!("Lifecycle event handed control in from outside: {summary}"));
    }
    if signals::is_config_access(summary) {
        return Some(format!("Configuration read supplied the value: {summary}"));
    }
    if signals::is_state_update(summary) {
        return Some(format!("State update produced the value: {summary}"));
    }

    let lowered = summary.to_lowercase();
    if let Some(token) = tokens.iter().find(|t| lowered.contains(t.as_str())) {
        return Some(format!(
            "{} event references `{token}`: {summary}",
            crumb.label()
        ));
    }

    if boundary {
        return Some(format!("{} event at the trust boundary: {summary}", crumb.label()));
    }
    None
}

/// Pair each watched breadcrumb with the previous one of the same
/// category and kind; a gap under the threshold is an anomaly.
fn find_anomalies(breadcrumbs: &[Breadcrumb], config: &TracerConfig) -> Vec<TraceMarker> {
    let mut last_seen: HashMap<(BreadcrumbCategory, Option<&str>), usize> = HashMap::new();
    let mut markers = Vec::new();

    for (index, crumb) in breadcrumbs.iter().enumerate() {
        if !config.watches_duplicates(crumb.category) {
            continue;
        }
        let key = (crumb.category, crumb.kind.as_deref());
        if let Some(&prev) = last_seen.get(&key) {
            let gap = crumb
                .timestamp_ordinal
                .saturating_sub(breadcrumbs[prev].timestamp_ordinal);
            if gap < config.anomaly_threshold {
                markers.push(TraceMarker::ConcurrencyAnomaly {
                    first: prev,
                    second: index,
                    gap,
                    label: crumb.label(),
                });
            }
        }
        last_seen.insert(key, index);
    }

    markers
}

fn tag_step(tags: &BTreeMap<String, String>) -> Option<TraceStep> {
    let missing: BTreeMap<String, String> = tags
        .iter()
        .filter(|(k, v)| signals::is_config_tag(k) && signals::is_absent_value(v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if !missing.is_empty() {
        let keys: Vec<&str> = missing.keys().map(String::as_str).collect();
        return Some(TraceStep {
            description: format!("Configuration tag(s) {} carry no value", keys.join(", ")),
            evidence: Evidence::Tags {
                finding: TagFinding::MissingConfig,
                entries: missing,
            },
        });
    }

    let schema: BTreeMap<String, String> = tags
        .iter()
        .filter(|(k, _)| signals::is_schema_tag(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let distinct: HashSet<&str> = schema.values().map(String::as_str).collect();
    if distinct.len() >= 2 {
        let shown: Vec<String> = schema.iter().map(|(k, v)| format!("{k}={v}")).collect();
        return Some(TraceStep {
            description: format!("Tags report conflicting schema shapes: {}", shown.join(", ")),
            evidence: Evidence::Tags {
                finding: TagFinding::SchemaConflict,
                entries: schema,
            },
        });
    }

    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(location: &str, function: &str, in_app: bool) -> Frame {
        Frame {
            location: location.to_string(),
            function: Some(function.to_string()),
            in_app,
        }
    }

    fn crumb(ordinal: u64, category: BreadcrumbCategory, kind: Option<&str>, summary: &str) -> Breadcrumb {
        Breadcrumb {
            timestamp_ordinal: ordinal,
            category,
            kind: kind.map(str::to_string),
            summary: summary.to_string(),
        }
    }

    fn record(frames: Vec<Frame>, breadcrumbs: Vec<Breadcrumb>) -> DiagnosticRecord {
        DiagnosticRecord {
            error_type: "TypeError".to_string(),
            error_message: "Cannot read properties of undefined (reading 'total')".to_string(),
            frames,
            breadcrumbs,
            tags: BTreeMap::new(),
        }
    }

    #[test]
    fn starts_at_innermost_in_app_frame() {
        let rec = record(
            vec![
                frame("src/index.ts:3", "main", true),
                frame("src/cart.ts:40", "renderTotal", true),
                frame("node_modules/lib/fmt.js:9", "format", false),
            ],
            vec![],
        );
        let chain = trace(&rec, &TracerConfig::default());
        assert_eq!(chain.len(), 1);
        match &chain.steps[0].evidence {
            Evidence::Frame { index, .. } => assert_eq!(*index, 1),
            other => panic!("expected frame evidence, got {other:?}"),
        }
        assert!(chain.steps[0].description.contains("innermost in-app frame"));
    }

    #[test]
    fn falls_back_to_innermost_frame_without_in_app() {
        let rec = record(
            vec![
                frame("node_modules/a.js:1", "a", false),
                frame("node_modules/b.js:2", "b", false),
            ],
            vec![],
        );
        let chain = trace(&rec, &TracerConfig::default());
        assert!(matches!(chain.steps[0].evidence, Evidence::Frame { index: 1, .. }));
    }

    #[test]
    fn single_unrelated_breadcrumb_yields_one_step() {
        let rec = record(
            vec![frame("src/cart.ts:40", "renderTotal", true)],
            vec![crumb(10, BreadcrumbCategory::Navigation, None, "/home -> /cart")],
        );
        let chain = trace(&rec, &TracerConfig::default());
        assert_eq!(chain.len(), 1);
        assert!(!chain.stopped_at_boundary);
    }

    #[test]
    fn walk_stops_at_http_boundary() {
        let rec = record(
            vec![frame("src/cart.ts:40", "renderTotal", true)],
            vec![
                crumb(10, BreadcrumbCategory::Lifecycle, None, "app started"),
                crumb(20, BreadcrumbCategory::Http, None, "GET /api/cart 200"),
                crumb(30, BreadcrumbCategory::Ui, Some("click"), "checkout button"),
                crumb(40, BreadcrumbCategory::Console, None, "cart total recomputed"),
            ],
        );
        let chain = trace(&rec, &TracerConfig::default());
        // frame, console (mentions `total`), http boundary; lifecycle never reached
        assert_eq!(chain.len(), 3);
        assert!(chain.stopped_at_boundary);
        let terminal = chain.terminal().unwrap();
        assert_eq!(terminal.evidence.breadcrumb().unwrap().timestamp_ordinal, 20);
        assert!(terminal.description.contains("trust boundary"));
    }

    #[test]
    fn boundary_is_configurable() {
        let rec = record(
            vec![frame("src/cart.ts:40", "renderTotal", true)],
            vec![
                crumb(10, BreadcrumbCategory::Lifecycle, None, "app resumed"),
                crumb(20, BreadcrumbCategory::Http, None, "GET /api/cart 200"),
            ],
        );
        let config = TracerConfig {
            boundary_categories: vec![BreadcrumbCategory::Lifecycle],
            ..TracerConfig::default()
        };
        let chain = trace(&rec, &config);
        assert_eq!(chain.len(), 3);
        assert_eq!(
            chain.terminal().unwrap().evidence.breadcrumb().unwrap().category,
            BreadcrumbCategory::Lifecycle
        );
    }

    #[test]
    fn anomalous_boundary_still_ends_the_walk() {
        let rec = record(
            vec![frame("src/orders.ts:77", "createOrder", true)],
            vec![
                crumb(10, BreadcrumbCategory::Console, None, "state updated"),
                crumb(20, BreadcrumbCategory::Http, None, "POST /api/orders 201"),
                crumb(30, BreadcrumbCategory::Http, None, "POST /api/orders 500"),
            ],
        );
        let config = TracerConfig {
            anomaly_categories: vec![BreadcrumbCategory::Ui, BreadcrumbCategory::Http],
            ..TracerConfig::default()
        };
        let chain = trace(&rec, &config);
        assert!(chain.has_concurrency_anomaly());
        assert!(chain.stopped_at_boundary);
        assert_eq!(chain.len(), 2);
        assert_eq!(
            chain.terminal().unwrap().evidence.breadcrumb().unwrap().timestamp_ordinal,
            30
        );
    }

    #[test]
    fn never_visits_a_breadcrumb_twice() {
        let crumbs: Vec<Breadcrumb> = (0..20)
            .map(|i| crumb(i * 10, BreadcrumbCategory::Console, None, "total updated"))
            .collect();
        let rec = record(vec![frame("src/cart.ts:40", "renderTotal", true)], crumbs);
        let chain = trace(&rec, &TracerConfig::default());
        assert_eq!(chain.len(), 21);
        let mut seen = HashSet::new();
        for step in &chain.steps[1..] {
            let Evidence::Breadcrumb { index, .. } = step.evidence else {
                panic!("expected breadcrumb evidence");
            };
            assert!(seen.insert(index));
        }
    }

    #[test]
    fn duplicate_clicks_become_a_marker_not_a_step() {
        let rec = record(
            vec![frame("src/checkout.ts:12", "submitOrder", true)],
            vec![
                crumb(100, BreadcrumbCategory::Ui, Some("click"), "submitOrder button"),
                crumb(115, BreadcrumbCategory::Ui, Some("click"), "submitOrder button"),
            ],
        );
        let chain = trace(&rec, &TracerConfig::default());
        assert!(chain.has_concurrency_anomaly());
        assert_eq!(
            chain.markers,
            vec![TraceMarker::ConcurrencyAnomaly {
                first: 0,
                second: 1,
                gap: 15,
                label: "ui.click".to_string(),
            }]
        );
        // Both clicks mention the function but are not causal steps.
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn spaced_out_clicks_are_not_anomalous() {
        let rec = record(
            vec![frame("src/checkout.ts:12", "submitOrder", true)],
            vec![
                crumb(100, BreadcrumbCategory::Ui, Some("click"), "place order"),
                crumb(1100, BreadcrumbCategory::Ui, Some("click"), "place order"),
            ],
        );
        assert!(!trace(&rec, &TracerConfig::default()).has_concurrency_anomaly());
    }

    #[test]
    fn different_kinds_are_not_duplicates() {
        let rec = record(
            vec![frame("src/checkout.ts:12", "submitOrder", true)],
            vec![
                crumb(100, BreadcrumbCategory::Ui, Some("click"), "place order"),
                crumb(110, BreadcrumbCategory::Ui, Some("input"), "coupon field"),
            ],
        );
        assert!(!trace(&rec, &TracerConfig::default()).has_concurrency_anomaly());
    }

    #[test]
    fn missing_config_tag_ends_an_internal_trace() {
        let mut rec = record(vec![frame("src/pay.ts:8", "charge", true)], vec![]);
        rec.tags.insert("config.payments_url".to_string(), "undefined".to_string());
        rec.tags.insert("environment".to_string(), "production".to_string());
        let chain = trace(&rec, &TracerConfig::default());
        assert_eq!(chain.len(), 2);
        match &chain.terminal().unwrap().evidence {
            Evidence::Tags { finding, entries } => {
                assert_eq!(*finding, TagFinding::MissingConfig);
                assert_eq!(entries.len(), 1);
            }
            other => panic!("expected tag evidence, got {other:?}"),
        }
    }

    #[test]
    fn schema_conflict_tag_step() {
        let mut rec = record(vec![frame("src/pay.ts:8", "charge", true)], vec![]);
        rec.tags.insert("schema.expected".to_string(), "v2".to_string());
        rec.tags.insert("schema.received".to_string(), "v1".to_string());
        let chain = trace(&rec, &TracerConfig::default());
        assert!(matches!(
            chain.terminal().unwrap().evidence,
            Evidence::Tags { finding: TagFinding::SchemaConflict, .. }
        ));
    }

    #[test]
    fn tags_ignored_after_boundary() {
        let mut rec = record(
            vec![frame("src/pay.ts:8", "charge", true)],
            vec![crumb(5, BreadcrumbCategory::Http, None, "POST /charge 502")],
        );
        rec.tags.insert("config.payments_url".to_string(), "".to_string());
        let chain = trace(&rec, &TracerConfig::default());
        assert!(chain.stopped_at_boundary);
        assert!(chain.terminal().unwrap().evidence.breadcrumb().is_some());
    }
}
