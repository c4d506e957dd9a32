use kwrank_core::ErrorClass;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SerpError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by {surface} (retry after {retry_after_secs}s)")]
    RateLimited {
        surface: String,
        retry_after_secs: u64,
    },

    #[error("endpoint not found: {url}")]
    NotFound { url: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("no parser produced results for \"{keyword}\" (tried {attempted})")]
    Parse { keyword: String, attempted: String },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },
}

impl SerpError {
    /// Classify the error for the refresh state machine.
    ///
    /// - 429 is [`ErrorClass::RateLimited`].
    /// - Network failures, timeouts, 5xx and parse failures are
    ///   [`ErrorClass::Transient`]. Markup drift is assumed to be temporary.
    /// - 404, 400 and malformed requests are [`ErrorClass::Permanent`].
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            SerpError::RateLimited { .. } => ErrorClass::RateLimited,
            SerpError::Http(e) => match e.status() {
                Some(status) if status.is_client_error() => ErrorClass::Permanent,
                _ => ErrorClass::Transient,
            },
            SerpError::UnexpectedStatus { status, .. } => {
                if *status == 400 || *status == 410 {
                    ErrorClass::Permanent
                } else {
                    ErrorClass::Transient
                }
            }
            SerpError::Parse { .. } => ErrorClass::Transient,
            SerpError::NotFound { .. } | SerpError::InvalidRequest { .. } => {
                ErrorClass::Permanent
            }
        }
    }

    /// Short machine-readable tag used in structured logs and job error details.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SerpError::Http(e) if e.is_timeout() => "network_timeout",
            SerpError::Http(_) => "network",
            SerpError::RateLimited { .. } => "rate_limited",
            SerpError::NotFound { .. } => "not_found",
            SerpError::UnexpectedStatus { .. } => "unexpected_status",
            SerpError::Parse { .. } => "parse_failure",
            SerpError::InvalidRequest { .. } => "invalid_request",
        }
    }
}
