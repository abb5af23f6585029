use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use rootcause_core::config::{Config, ConfigSource, WarnLevel};
use rootcause_core::{io, paths};
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Write the default config to .rootcause/config.yaml (never overwrites)
    Init,

    /// Show the effective config and where it was loaded from
    Show,

    /// Validate the config for common mistakes
    Validate,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Init => init(root),
        ConfigSubcommand::Show => show(root, json),
        ConfigSubcommand::Validate => validate(root, json),
    }
}

fn load(root: &Path) -> anyhow::Result<(Config, ConfigSource)> {
    Config::load(root).context("failed to load config")
}

fn source_label(source: &ConfigSource) -> String {
    match source {
        ConfigSource::Project(p) | ConfigSource::User(p) => p.display().to_string(),
        ConfigSource::Defaults => "built-in defaults".to_string(),
    }
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

fn init(root: &Path) -> anyhow::Result<()> {
    let path = paths::config_path(root);
    let yaml = serde_yaml::to_string(&Config::default())?;
    let written = io::write_if_missing(&path, yaml.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;

    if written {
        println!("Wrote {}", path.display());
    } else {
        println!("{} already exists; left unchanged.", path.display());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let (config, source) = load(root)?;

    if json {
        let value = serde_json::json!({
            "source": source_label(&source),
            "config": config,
        });
        return print_json(&value);
    }

    println!("# source: {}", source_label(&source));
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let (config, _) = load(root)?;
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    let has_errors = warnings.iter().any(|w| w.level == WarnLevel::Error);
    if has_errors {
        anyhow::bail!("config validation found errors");
    }

    Ok(())
}
