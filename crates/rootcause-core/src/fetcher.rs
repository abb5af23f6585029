//! Invocation of the external issue CLI that prints diagnostic context.
//!
//! The collaborator is a black box: given an issue id it writes markdown to
//! stdout and exits 0, or exits non-zero with a message on stderr. Exactly one
//! process is launched per fetch and nothing is retried.
//!
//! Credentials are checked before the process is spawned so a missing token
//! never costs a round trip to the tracker.

use std::fmt;
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::thread::JoinHandle;
use std::time::Duration;

use regex::Regex;
use wait_timeout::ChildExt;

use crate::config::{CredentialsConfig, FetcherConfig, ISSUE_PLACEHOLDER, ORG_PLACEHOLDER};
use crate::error::FetchError;
use crate::issue::IssueId;
use crate::types::RawContext;

/// Anything that can produce raw diagnostic context for an issue.
pub trait ContextSource {
    fn fetch(&self, issue: &IssueId) -> Result<RawContext, FetchError>;
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Credentials {
    token_env: String,
    token: String,
    org_env: String,
    org: String,
}

impl Credentials {
    pub fn from_env(cfg: &CredentialsConfig) -> Result<Self, FetchError> {
        Self::from_lookup(cfg, |name| std::env::var(name).ok())
    }

    /// Resolve both credentials through `lookup`. Unset and blank values are
    /// both treated as missing.
    pub fn from_lookup<F>(cfg: &CredentialsConfig, lookup: F) -> Result<Self, FetchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let missing: Vec<&str> = [cfg.token_env.as_str(), cfg.org_env.as_str()]
            .into_iter()
            .filter(|name| present(*name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(FetchError::AuthMissing(format!(
                "set {} in the environment",
                missing.join(" and ")
            )));
        }

        Ok(Self {
            token_env: cfg.token_env.clone(),
            token: present(cfg.token_env.as_str()).unwrap_or_default(),
            org_env: cfg.org_env.clone(),
            org: present(cfg.org_env.as_str()).unwrap_or_default(),
        })
    }

    pub fn org(&self) -> &str {
        &self.org
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token_env", &self.token_env)
            .field("token", &"<redacted>")
            .field("org_env", &self.org_env)
            .field("org", &self.org)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// CliFetcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CliFetcher {
    config: FetcherConfig,
    credentials: Credentials,
}

impl CliFetcher {
    pub fn new(config: FetcherConfig, credentials: Credentials) -> Self {
        Self {
            config,
            credentials,
        }
    }

    /// Build a fetcher from the process environment. Fails with
    /// `AuthMissing` before anything is launched.
    pub fn from_env(config: &FetcherConfig) -> Result<Self, FetchError> {
        let credentials = Credentials::from_env(&config.credentials)?;
        Ok(Self::new(config.clone(), credentials))
    }

    /// The argument list for `issue`, with placeholders substituted.
    pub fn args_for(&self, issue: &IssueId) -> Vec<String> {
        self.config
            .args
            .iter()
            .map(|arg| {
                arg.replace(ISSUE_PLACEHOLDER, issue.as_str())
                    .replace(ORG_PLACEHOLDER, self.credentials.org())
            })
            .collect()
    }

    fn build_command(&self, issue: &IssueId) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(self.args_for(issue));
        cmd.env(&self.credentials.token_env, &self.credentials.token);
        cmd.env(&self.credentials.org_env, &self.credentials.org);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }
}

impl ContextSource for CliFetcher {
    fn fetch(&self, issue: &IssueId) -> Result<RawContext, FetchError> {
        let program = &self.config.program;
        which::which(program)
            .map_err(|_| FetchError::Unavailable(format!("'{program}' not found on PATH")))?;

        tracing::info!(program = %program, issue = %issue, "fetching diagnostic context");

        let mut child = self
            .build_command(issue)
            .spawn()
            .map_err(|e| FetchError::Unavailable(format!("failed to spawn '{program}': {e}")))?;

        // Drain both pipes off-thread so a large payload cannot fill the pipe
        // buffer while we wait on the exit status.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = if self.config.timeout_seconds == 0 {
            child.wait().map_err(|e| FetchError::Unavailable(e.to_string()))?
        } else {
            let limit = Duration::from_secs(self.config.timeout_seconds);
            match child
                .wait_timeout(limit)
                .map_err(|e| FetchError::Unavailable(e.to_string()))?
            {
                Some(status) => status,
                None => {
                    let _ = child.kill();
                    let _ = child.wait();
                    tracing::warn!(issue = %issue, "fetch timed out");
                    return Err(FetchError::Unavailable(format!(
                        "'{program}' timed out after {}s",
                        self.config.timeout_seconds
                    )));
                }
            }
        };

        let stdout = collect(stdout);
        let stderr = collect(stderr);

        if !status.success() {
            tracing::debug!(code = ?status.code(), "fetch failed");
            return Err(classify_failure(issue, program, status.code(), &stdout, &stderr));
        }

        tracing::debug!(bytes = stdout.len(), "fetched diagnostic context");
        Ok(RawContext::new(Some(issue.clone()), stdout))
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

static AUTH_RE: OnceLock<Regex> = OnceLock::new();
static NOT_FOUND_RE: OnceLock<Regex> = OnceLock::new();

fn auth_re() -> &'static Regex {
    AUTH_RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b401\b|\bunauthori[sz]ed\b|\bauthentication (?:failed|required|error)\b|\binvalid (?:auth )?token\b",
        )
        .unwrap()
    })
}

fn not_found_re() -> &'static Regex {
    NOT_FOUND_RE.get_or_init(|| {
        Regex::new(r"(?i)\b404\b|\bno such issue\b|\bissue\b[^\n]*\b(?:not found|does not exist)\b")
            .unwrap()
    })
}

/// Map a non-zero exit of the collaborator onto the fetch error taxonomy.
/// Rejected credentials are checked first; not-found must name the issue
/// or carry a 404.
pub fn classify_failure(
    issue: &IssueId,
    program: &str,
    code: Option<i32>,
    stdout: &str,
    stderr: &str,
) -> FetchError {
    let combined = format!("{stderr}\n{stdout}");

    if auth_re().is_match(&combined) {
        return FetchError::AuthMissing(format!("'{program}' rejected the credentials"));
    }
    if not_found_re().is_match(&combined) {
        return FetchError::NotFound(issue.to_string());
    }

    let detail = if stderr.trim().is_empty() { stdout } else { stderr };
    let hint: String = detail.trim().chars().take(500).collect();
    let code = code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}"));
    if hint.is_empty() {
        FetchError::Unavailable(format!("'{program}' exited with {code}"))
    } else {
        FetchError::Unavailable(format!("'{program}' exited with {code}: {hint}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    fn issue() -> IssueId {
        IssueId::parse("12345678").unwrap()
    }

    #[test]
    fn credentials_both_present() {
        let cfg = CredentialsConfig::default();
        let creds = Credentials::from_lookup(
            &cfg,
            lookup(&[("SENTRY_AUTH_TOKEN", "secret"), ("SENTRY_ORG", "acme")]),
        )
        .unwrap();
        assert_eq!(creds.org(), "acme");
        assert!(!format!("{creds:?}").contains("secret"));
    }

    #[test]
    fn credentials_missing_token() {
        let cfg = CredentialsConfig::default();
        let err = Credentials::from_lookup(&cfg, lookup(&[("SENTRY_ORG", "acme")])).unwrap_err();
        match err {
            FetchError::AuthMissing(msg) => {
                assert!(msg.contains("SENTRY_AUTH_TOKEN"));
                assert!(!msg.contains("SENTRY_ORG"));
            }
            other => panic!("expected AuthMissing, got {other:?}"),
        }
    }

    #[test]
    fn credentials_blank_counts_as_missing() {
        let cfg = CredentialsConfig::default();
        let err = Credentials::from_lookup(
            &cfg,
            lookup(&[("SENTRY_AUTH_TOKEN", "  "), ("SENTRY_ORG", "")]),
        )
        .unwrap_err();
        assert_eq!(
            err,
            FetchError::AuthMissing("set SENTRY_AUTH_TOKEN and SENTRY_ORG in the environment".into())
        );
    }

    #[test]
    fn args_substitute_placeholders() {
        let cfg = FetcherConfig::default();
        let creds = Credentials::from_lookup(
            &cfg.credentials,
            lookup(&[("SENTRY_AUTH_TOKEN", "t"), ("SENTRY_ORG", "acme")]),
        )
        .unwrap();
        let fetcher = CliFetcher::new(cfg, creds);
        assert_eq!(
            fetcher.args_for(&issue()),
            vec!["issues", "show", "12345678", "--org", "acme", "--format", "markdown"]
        );
    }

    #[test]
    fn missing_program_is_unavailable() {
        let cfg = FetcherConfig {
            program: "rootcause-test-definitely-missing-binary".to_string(),
            ..FetcherConfig::default()
        };
        let creds = Credentials::from_lookup(
            &cfg.credentials,
            lookup(&[("SENTRY_AUTH_TOKEN", "t"), ("SENTRY_ORG", "acme")]),
        )
        .unwrap();
        let err = CliFetcher::new(cfg, creds).fetch(&issue()).unwrap_err();
        assert!(matches!(err, FetchError::Unavailable(msg) if msg.contains("not found on PATH")));
    }

    #[test]
    fn failure_not_found() {
        let err = classify_failure(&issue(), "sentry-cli", Some(1), "", "error: Issue not found");
        assert_eq!(err, FetchError::NotFound("12345678".to_string()));
    }

    #[test]
    fn failure_rejected_credentials() {
        let err = classify_failure(&issue(), "sentry-cli", Some(1), "", "API request failed: 401 Unauthorized");
        assert!(matches!(err, FetchError::AuthMissing(_)));
    }

    #[test]
    fn failure_404_status_is_not_found() {
        let err = classify_failure(&issue(), "sentry-cli", Some(1), "", "API request failed: 404");
        assert_eq!(err, FetchError::NotFound("12345678".to_string()));
    }

    #[test]
    fn failure_auth_wins_over_not_found_wording() {
        let err = classify_failure(
            &issue(),
            "sentry-cli",
            Some(1),
            "",
            "401 Unauthorized (auth token not found)",
        );
        assert!(matches!(err, FetchError::AuthMissing(_)));
    }

    #[test]
    fn failure_unrelated_text_is_unavailable() {
        for stderr in [
            "request 84041 failed: connection reset",
            "error: config file not found: ~/.sentryclirc",
            "retrying in 4010 ms",
        ] {
            let err = classify_failure(&issue(), "sentry-cli", Some(1), "", stderr);
            assert!(
                matches!(err, FetchError::Unavailable(ref msg) if msg.ends_with(stderr)),
                "{stderr} mapped to {err:?}"
            );
        }
    }

    #[test]
    fn failure_other_is_unavailable_with_hint() {
        let err = classify_failure(&issue(), "sentry-cli", Some(2), "", "connection reset by peer");
        assert_eq!(
            err,
            FetchError::Unavailable("'sentry-cli' exited with code 2: connection reset by peer".into())
        );
    }

    #[test]
    fn failure_hint_is_truncated() {
        let noisy = "x".repeat(2000);
        match classify_failure(&issue(), "sentry-cli", None, "", &noisy) {
            FetchError::Unavailable(msg) => {
                assert!(msg.starts_with("'sentry-cli' exited with a signal: "));
                assert!(msg.len() < 600);
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn fetch_runs_the_program_once() {
        let cfg = FetcherConfig {
            program: "echo".to_string(),
            args: vec!["issue".to_string(), ISSUE_PLACEHOLDER.to_string()],
            ..FetcherConfig::default()
        };
        let creds = Credentials::from_lookup(
            &cfg.credentials,
            lookup(&[("SENTRY_AUTH_TOKEN", "t"), ("SENTRY_ORG", "acme")]),
        )
        .unwrap();
        let raw = CliFetcher::new(cfg, creds).fetch(&issue()).unwrap();
        assert_eq!(raw.text.trim(), "issue 12345678");
        assert_eq!(raw.issue, Some(issue()));
    }
}
