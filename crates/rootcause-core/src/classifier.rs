use crate::rules::default_rules;
use crate::tracer::TraceChain;
use crate::types::ErrorClass;
use serde::Serialize;

/// Rule id reported when no rule matched and the chain defaults to a crash.
pub const FALLBACK_RULE: &str = "fallback";

// ---------------------------------------------------------------------------
// Classification (output)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub class: ErrorClass,
    /// Id of the rule that matched, or `"fallback"`.
    pub rule: &'static str,
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// A fn-pointer rule over a finished trace chain.
pub struct Rule {
    pub id: &'static str,
    pub condition: fn(&TraceChain) -> bool,
    pub class: ErrorClass,
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Evaluates rules top-down; the first match wins. Holds no state between
/// calls, so the same chain always lands in the same class.
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl Classifier {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn classify_with_rule(&self, chain: &TraceChain) -> Classification {
        for rule in &self.rules {
            if (rule.condition)(chain) {
                tracing::debug!(rule = rule.id, class = %rule.class, "classified chain");
                return Classification {
                    class: rule.class,
                    rule: rule.id,
                };
            }
        }

        // Fallback: immediate fault with no further traceable cause
        Classification {
            class: ErrorClass::Crash,
            rule: FALLBACK_RULE,
        }
    }

    pub fn classify(&self, chain: &TraceChain) -> ErrorClass {
        self.classify_with_rule(chain).class
    }
}

/// Classify with the default rule table.
pub fn classify(chain: &TraceChain) -> ErrorClass {
    Classifier::default().classify(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracer::{Evidence, TraceStep};
    use crate::types::Frame;

    fn frame_only_chain() -> TraceChain {
        TraceChain {
            failure: "TypeError: x is undefined".to_string(),
            steps: vec![TraceStep {
                description: "surfaced".to_string(),
                evidence: Evidence::Frame {
                    index: 0,
                    frame: Frame {
                        location: "src/a.ts:1".to_string(),
                        function: None,
                        in_app: true,
                    },
                },
            }],
            markers: vec![],
            stopped_at_boundary: false,
        }
    }

    #[test]
    fn empty_rule_table_falls_back_to_crash() {
        let result = Classifier::new(vec![]).classify_with_rule(&frame_only_chain());
        assert_eq!(result.class, ErrorClass::Crash);
        assert_eq!(result.rule, FALLBACK_RULE);
    }

    #[test]
    fn first_matching_rule_wins() {
        let classifier = Classifier::new(vec![
            Rule {
                id: "never",
                condition: |_| false,
                class: ErrorClass::Configuration,
            },
            Rule {
                id: "always_a",
                condition: |_| true,
                class: ErrorClass::DataIntegrity,
            },
            Rule {
                id: "always_b",
                condition: |_| true,
                class: ErrorClass::Concurrency,
            },
        ]);
        let result = classifier.classify_with_rule(&frame_only_chain());
        assert_eq!(result.rule, "always_a");
        assert_eq!(result.class, ErrorClass::DataIntegrity);
    }

    #[test]
    fn classify_is_idempotent() {
        let chain = frame_only_chain();
        let classifier = Classifier::default();
        assert_eq!(classifier.classify(&chain), classifier.classify(&chain));
        assert_eq!(classify(&chain), ErrorClass::Crash);
    }
}
