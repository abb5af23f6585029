use crate::error::Result;
use crate::paths;
use crate::types::BreadcrumbCategory;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ISSUE_PLACEHOLDER: &str = "{issue}";
pub const ORG_PLACEHOLDER: &str = "{org}";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// CredentialsConfig
// ---------------------------------------------------------------------------

/// Names of the environment variables holding the collaborator's credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_org_env")]
    pub org_env: String,
}

fn default_token_env() -> String {
    "SENTRY_AUTH_TOKEN".to_string()
}

fn default_org_env() -> String {
    "SENTRY_ORG".to_string()
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
            org_env: default_org_env(),
        }
    }
}

// ---------------------------------------------------------------------------
// FetcherConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetcherConfig {
    #[serde(default = "default_program")]
    pub program: String,
    /// Argument template; `{issue}` and `{org}` are substituted per run.
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// `0` waits indefinitely.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

fn default_program() -> String {
    "sentry-cli".to_string()
}

fn default_args() -> Vec<String> {
    ["issues", "show", ISSUE_PLACEHOLDER, "--org", ORG_PLACEHOLDER, "--format", "markdown"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_timeout() -> u64 {
    60
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            timeout_seconds: default_timeout(),
            credentials: CredentialsConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// TracerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracerConfig {
    /// Categories treated as trust boundaries; the backward walk stops there.
    #[serde(default = "default_boundary_categories")]
    pub boundary_categories: Vec<BreadcrumbCategory>,
    /// Categories in which closely spaced duplicates signal double submission.
    #[serde(default = "default_anomaly_categories")]
    pub anomaly_categories: Vec<BreadcrumbCategory>,
    /// Two duplicates count as an anomaly when their ordinal gap is below this.
    #[serde(default = "default_anomaly_threshold")]
    pub anomaly_threshold: u64,
}

fn default_boundary_categories() -> Vec<BreadcrumbCategory> {
    vec![BreadcrumbCategory::Http, BreadcrumbCategory::Lifecycle]
}

fn default_anomaly_categories() -> Vec<BreadcrumbCategory> {
    vec![BreadcrumbCategory::Ui]
}

fn default_anomaly_threshold() -> u64 {
    1000
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            boundary_categories: default_boundary_categories(),
            anomaly_categories: default_anomaly_categories(),
            anomaly_threshold: default_anomaly_threshold(),
        }
    }
}

impl TracerConfig {
    pub fn is_boundary(&self, category: BreadcrumbCategory) -> bool {
        self.boundary_categories.contains(&category)
    }

    pub fn watches_duplicates(&self, category: BreadcrumbCategory) -> bool {
        self.anomaly_categories.contains(&category)
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub tracer: TracerConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            fetcher: FetcherConfig::default(),
            tracer: TracerConfig::default(),
        }
    }
}

/// Where the effective config came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Project(PathBuf),
    User(PathBuf),
    Defaults,
}

impl Config {
    pub fn load_from(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Project config, then the user config, then built-in defaults.
    pub fn load(root: &Path) -> Result<(Self, ConfigSource)> {
        let project = paths::config_path(root);
        if project.exists() {
            return Ok((Self::load_from(&project)?, ConfigSource::Project(project)));
        }

        match paths::user_config_path() {
            Ok(user) if user.exists() => {
                return Ok((Self::load_from(&user)?, ConfigSource::User(user)));
            }
            Ok(_) => {}
            Err(e) => tracing::debug!("skipping user config: {e}"),
        }

        Ok((Self::default(), ConfigSource::Defaults))
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let fetcher = &self.fetcher;

        // 1. Without a program or an {issue} slot nothing can be fetched
        if fetcher.program.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "fetcher.program is empty".to_string(),
            });
        }
        if !fetcher.args.iter().any(|a| a.contains(ISSUE_PLACEHOLDER)) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("fetcher.args never references {ISSUE_PLACEHOLDER}"),
            });
        }

        // 2. Credential variable names
        let creds = &fetcher.credentials;
        if creds.token_env.trim().is_empty() || creds.org_env.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "fetcher.credentials names an empty environment variable".to_string(),
            });
        } else if creds.token_env == creds.org_env {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "token and organization share the variable '{}'",
                    creds.token_env
                ),
            });
        }

        if fetcher.timeout_seconds == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "fetcher.timeout_seconds is 0: a hung fetch will block forever"
                    .to_string(),
            });
        }

        // 3. Tracer knobs
        let tracer = &self.tracer;
        if tracer.boundary_categories.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "tracer.boundary_categories is empty: traces always run to the first breadcrumb"
                    .to_string(),
            });
        }
        if tracer.anomaly_threshold == 0 && !tracer.anomaly_categories.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "tracer.anomaly_threshold is 0: duplicate events are never flagged"
                    .to_string(),
            });
        }
        for (field, list) in [
            ("boundary_categories", &tracer.boundary_categories),
            ("anomaly_categories", &tracer.anomaly_categories),
        ] {
            let mut seen = Vec::new();
            for cat in list {
                if seen.contains(cat) {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Warning,
                        message: format!("tracer.{field} lists '{cat}' more than once"),
                    });
                } else {
                    seen.push(*cat);
                }
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
