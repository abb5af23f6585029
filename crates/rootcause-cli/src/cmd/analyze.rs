use crate::output::print_json;
use anyhow::Context;
use rootcause_core::{
    analyze_raw,
    config::{Config, ConfigSource},
    issue::IssueId,
    types::RawContext,
};
use std::path::Path;

pub fn run(
    root: &Path,
    issue: &str,
    input: Option<&Path>,
    timeout: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    let (mut config, source) = Config::load(root).context("failed to load config")?;
    match &source {
        ConfigSource::Project(p) | ConfigSource::User(p) => {
            tracing::debug!(path = %p.display(), "using config file")
        }
        ConfigSource::Defaults => tracing::debug!("using built-in config"),
    }
    if let Some(secs) = timeout {
        config.fetcher.timeout_seconds = secs;
    }

    let report = match input {
        Some(path) => {
            let id = IssueId::parse(issue)?;
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            analyze_raw(&RawContext::new(Some(id), text), &config)
        }
        None => rootcause_core::analyze(issue, &config),
    }
    .with_context(|| format!("analysis of '{issue}' failed"))?;

    if json {
        print_json(&report)?;
    } else {
        print!("{}", report.to_markdown());
    }

    Ok(())
}
