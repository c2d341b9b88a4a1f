use thiserror::Error;

#[derive(Error, Debug)]
pub enum VerityError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Timeout, rate limit or network failure. Safe to retry.
    #[error("Transient failure ({collaborator}): {message}")]
    Transient {
        collaborator: String,
        message: String,
    },

    /// The collaborator answered, but not in the shape we asked for.
    #[error("Malformed response ({collaborator}): {message}")]
    MalformedResponse {
        collaborator: String,
        message: String,
    },

    /// Permanent collaborator failure (bad request, auth, unexpected status).
    #[error("Collaborator error ({collaborator}): {message}")]
    Collaborator {
        collaborator: String,
        message: String,
    },

    #[error("Data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("Orchestration failure: {0}")]
    Orchestration(String),

    #[error("Relational store error: {0}")]
    Store(String),

    #[error("Graph database error: {0}")]
    Graph(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl VerityError {
    pub fn transient(collaborator: &str, message: impl Into<String>) -> Self {
        Self::Transient {
            collaborator: collaborator.to_string(),
            message: message.into(),
        }
    }

    pub fn malformed(collaborator: &str, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            collaborator: collaborator.to_string(),
            message: message.into(),
        }
    }

    pub fn collaborator(collaborator: &str, message: impl Into<String>) -> Self {
        Self::Collaborator {
            collaborator: collaborator.to_string(),
            message: message.into(),
        }
    }

    /// Default retry predicate: only failures that may succeed on a second try.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient { .. } => true,
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// Classify an HTTP status from a collaborator into transient vs permanent.
    pub fn from_status(collaborator: &str, status: reqwest::StatusCode, body: &str) -> Self {
        let message = format!("status {status}: {}", truncate(body, 300));
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status.is_server_error()
        {
            Self::transient(collaborator, message)
        } else {
            Self::collaborator(collaborator, message)
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

pub type Result<T> = std::result::Result<T, VerityError>;
