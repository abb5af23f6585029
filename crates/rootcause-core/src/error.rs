use thiserror::Error;

/// Failures of the external diagnostic CLI invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("issue not found: {0}")]
    NotFound(String),

    #[error("credentials missing: {0}")]
    AuthMissing(String),

    #[error("diagnostic source unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed context: {0}")]
    MalformedContext(String),
}

#[derive(Debug, Error)]
pub enum RootCauseError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("invalid issue id '{0}': expected a numeric id, a project-prefixed key, or an issue URL")]
    InvalidIssueId(String),

    #[error("invalid breadcrumb category: {0}")]
    InvalidCategory(String),

    #[error("invalid error class: {0}")]
    InvalidErrorClass(String),

    #[error("home directory not found: set HOME environment variable")]
    HomeNotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, RootCauseError>;
