use crate::classifier::Rule;
use crate::signals;
use crate::tracer::{Evidence, TagFinding, TraceChain};
use crate::types::{BreadcrumbCategory, ErrorClass};

// ---------------------------------------------------------------------------
// Condition helpers
// ---------------------------------------------------------------------------

fn terminal_evidence(chain: &TraceChain) -> Option<&Evidence> {
    chain.terminal().map(|step| &step.evidence)
}

/// Free text of the terminal evidence. A frame stands for the failure it
/// raised, so its text is the failure headline.
fn terminal_text(chain: &TraceChain) -> Option<&str> {
    match terminal_evidence(chain)? {
        Evidence::Frame { .. } => Some(chain.failure.as_str()),
        Evidence::Breadcrumb { breadcrumb, .. } => Some(breadcrumb.summary.as_str()),
        Evidence::Tags { .. } => None,
    }
}

fn terminal_tag_finding(chain: &TraceChain) -> Option<TagFinding> {
    match terminal_evidence(chain)? {
        Evidence::Tags { finding, .. } => Some(*finding),
        _ => None,
    }
}

fn has_concurrency_anomaly(chain: &TraceChain) -> bool {
    chain.has_concurrency_anomaly()
}

fn terminal_failed_response(chain: &TraceChain) -> bool {
    let Some(crumb) = terminal_evidence(chain).and_then(Evidence::breadcrumb) else {
        return false;
    };
    if crumb.category != BreadcrumbCategory::Http {
        return false;
    }
    match crumb.http_status() {
        Some(status) => !(200..300).contains(&status),
        None => signals::is_network_failure(&crumb.summary),
    }
}

fn terminal_config_read(chain: &TraceChain) -> bool {
    terminal_tag_finding(chain) == Some(TagFinding::MissingConfig)
        || terminal_text(chain).is_some_and(signals::is_config_access)
}

fn terminal_shape_mismatch(chain: &TraceChain) -> bool {
    terminal_tag_finding(chain) == Some(TagFinding::SchemaConflict)
        || terminal_text(chain).is_some_and(signals::is_shape_mismatch)
}

// ---------------------------------------------------------------------------
// Default rules (priority-ordered)
// ---------------------------------------------------------------------------

/// Specific signals first: an anomaly or a failed dependency says more than
/// the generic crash bucket the classifier falls back to.
pub fn default_rules() -> Vec<Rule> {
    vec![
        // 1. Duplicate events close together: double submission / race
        Rule {
            id: "concurrency_anomaly",
            condition: has_concurrency_anomaly,
            class: ErrorClass::Concurrency,
        },
        // 2. The trail ends at an external service that answered non-2xx
        Rule {
            id: "failed_dependency",
            condition: terminal_failed_response,
            class: ErrorClass::DependencyFailure,
        },
        // 3. The trail ends at a configuration or environment read
        Rule {
            id: "configuration_read",
            condition: terminal_config_read,
            class: ErrorClass::Configuration,
        },
        // 4. The trail ends at a type/shape disagreement
        Rule {
            id: "shape_mismatch",
            condition: terminal_shape_mismatch,
            class: ErrorClass::DataIntegrity,
        },
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
