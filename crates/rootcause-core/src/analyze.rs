//! The end-to-end run: fetch → parse → trace → classify → report.
//!
//! Every error is fatal to the run; nothing is retried and no partial report
//! is produced.

use crate::classifier::Classifier;
use crate::config::Config;
use crate::error::Result;
use crate::fetcher::{CliFetcher, ContextSource};
use crate::issue::IssueId;
use crate::parser;
use crate::report::{self, Report};
use crate::tracer;
use crate::types::RawContext;

/// Analyze an issue id or issue URL with the configured external CLI.
/// Credentials are checked before any process is launched.
pub fn analyze(input: &str, config: &Config) -> Result<Report> {
    let issue = IssueId::parse(input)?;
    let fetcher = CliFetcher::from_env(&config.fetcher)?;
    analyze_with(&fetcher, &issue, config)
}

/// Analyze `issue` with any context source.
pub fn analyze_with<S: ContextSource + ?Sized>(
    source: &S,
    issue: &IssueId,
    config: &Config,
) -> Result<Report> {
    let raw = source.fetch(issue)?;
    analyze_raw(&raw, config)
}

/// The offline half of the pipeline, for already-fetched context.
pub fn analyze_raw(raw: &RawContext, config: &Config) -> Result<Report> {
    let record = parser::parse(raw)?;
    let chain = tracer::trace(&record, &config.tracer);
    let classification = Classifier::default().classify_with_rule(&chain);
    tracing::debug!(class = %classification.class, steps = chain.len(), "analysis complete");
    Ok(report::build(&record, &chain, classification, raw.issue.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, ParseError, RootCauseError};
    use crate::types::ErrorClass;
    use std::cell::Cell;

    struct StubSource {
        result: std::result::Result<&'static str, FetchError>,
        calls: Cell<u32>,
    }

    impl StubSource {
        fn ok(text: &'static str) -> Self {
            Self {
                result: Ok(text),
                calls: Cell::new(0),
            }
        }

        fn err(e: FetchError) -> Self {
            Self {
                result: Err(e),
                calls: Cell::new(0),
            }
        }
    }

    impl ContextSource for StubSource {
        fn fetch(&self, issue: &IssueId) -> std::result::Result<RawContext, FetchError> {
            self.calls.set(self.calls.get() + 1);
            self.result
                .clone()
                .map(|text| RawContext::new(Some(issue.clone()), text))
        }
    }

    fn issue() -> IssueId {
        IssueId::parse("https://acme.sentry.io/issues/12345678/?project=123").unwrap()
    }

    #[test]
    fn full_pipeline_over_stub() {
        let source = StubSource::ok(
            "\
**TypeError**: Cannot read properties of undefined (reading 'total')
> src/cart.ts:40 in renderTotal

## Breadcrumbs
- [10] navigation: /home -> /cart
- [20] http: GET /api/cart 500
",
        );
        let report = analyze_with(&source, &issue(), &Config::default()).unwrap();
        assert_eq!(source.calls.get(), 1);
        assert_eq!(report.issue.as_ref().map(IssueId::as_str), Some("12345678"));
        assert_eq!(report.error_class, ErrorClass::DependencyFailure);
        assert_eq!(report.evidence.len(), 2);
    }

    #[test]
    fn fetch_errors_surface_verbatim() {
        let source = StubSource::err(FetchError::NotFound("12345678".to_string()));
        let err = analyze_with(&source, &issue(), &Config::default()).unwrap_err();
        assert!(matches!(
            err,
            RootCauseError::Fetch(FetchError::NotFound(ref id)) if id == "12345678"
        ));
        assert_eq!(source.calls.get(), 1);
    }

    #[test]
    fn frameless_context_is_rejected() {
        let source = StubSource::ok("**TypeError**: boom\n\n## Tags\n- env: prod\n");
        let err = analyze_with(&source, &issue(), &Config::default()).unwrap_err();
        assert!(matches!(
            err,
            RootCauseError::Parse(ParseError::MalformedContext(_))
        ));
    }

    #[test]
    fn invalid_issue_is_rejected_before_fetch() {
        let err = analyze("", &Config::default()).unwrap_err();
        assert!(matches!(err, RootCauseError::InvalidIssueId(_)));
    }

    #[test]
    fn offline_analysis_has_no_issue() {
        let raw = RawContext::new(None, "**KeyError**: 'sku'\n> app/cart.py:7 in add\n");
        let report = analyze_raw(&raw, &Config::default()).unwrap();
        assert!(report.issue.is_none());
        assert_eq!(report.error, "KeyError: 'sku'");
    }
}
