//! Error taxonomy for remote requests

use std::time::Duration;

/// Failure of a single transport attempt, before any HTTP status was received.
#[derive(Debug)]
pub enum TransportError {
    /// No complete response within the request timeout
    Timeout(Duration),
    /// Connection refused/reset, DNS failure, truncated body
    Network(String),
    /// Request could not be built (bad base URL, invalid header value)
    Invalid(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout(d) => write!(f, "request timed out after {}s", d.as_secs()),
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::Invalid(msg) => write!(f, "invalid request: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl TransportError {
    /// Classify a reqwest error. The URL is stripped so API keys in query
    /// strings never reach logs.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_builder() {
            Self::Invalid(e.without_url().to_string())
        } else {
            Self::Network(e.without_url().to_string())
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Invalid(_))
    }
}

/// Terminal failure of one logical request, after the retry policy gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Every attempt was answered with 429
    RateLimited { attempts: u32 },
    /// Network-level failure persisted through all attempts (or was not retryable)
    Transient { attempts: u32, message: String },
    /// Non-2xx, non-429 response. Never retried.
    Rejected { status: u16, body: String },
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited { attempts } => {
                write!(f, "still rate-limited after {attempts} attempts")
            }
            Self::Transient { attempts, message } => {
                write!(f, "{message} (after {attempts} attempts)")
            }
            Self::Rejected { status, body } if body.is_empty() => write!(f, "HTTP {status}"),
            Self::Rejected { status, body } => write!(f, "HTTP {status}: {body}"),
        }
    }
}

impl std::error::Error for RequestError {}

impl RequestError {
    /// HTTP status of the terminal attempt, if one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { .. } => Some(429),
            Self::Transient { .. } => None,
            Self::Rejected { status, .. } => Some(*status),
        }
    }

    /// Whether the remote answered with a specific status (e.g. 404 for lookups)
    pub fn is_status(&self, code: u16) -> bool {
        self.status() == Some(code)
    }
}
