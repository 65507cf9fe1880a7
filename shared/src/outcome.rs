//! Normalized transmission outcomes
//!
//! Every transmission attempt collapses into one [`NormalizedError`] drawn
//! from a closed taxonomy. Retry eligibility is a property of the code, not
//! of the call site.

use serde::{Deserialize, Serialize};

/// Closed outcome taxonomy for one transmission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// 2xx: accepted by the regulator
    Ok,
    /// Transport failure, timeout, 5xx, or an open circuit breaker
    TempUnavailable,
    /// 409: the regulator already holds this transaction; success-equivalent
    Duplicate,
    /// 429: throttled
    RateLimit,
    /// 4xx whose message points at the signature; credential or signing bug
    InvalidSignature,
    /// 4xx whose message points at the protocol headers
    InvalidHeader,
    /// Anything else; never retried, always logged for triage
    Unknown,
}

impl ErrorCode {
    /// Whether an attempt with this outcome may be retried.
    pub fn retryable(&self) -> bool {
        matches!(self, ErrorCode::TempUnavailable | ErrorCode::RateLimit)
    }

    /// `Ok` and `Duplicate` both complete the entry.
    pub fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Ok | ErrorCode::Duplicate)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::Ok => "OK",
            ErrorCode::TempUnavailable => "TEMP_UNAVAILABLE",
            ErrorCode::Duplicate => "DUPLICATE",
            ErrorCode::RateLimit => "RATE_LIMIT",
            ErrorCode::InvalidSignature => "INVALID_SIGNATURE",
            ErrorCode::InvalidHeader => "INVALID_HEADER",
            ErrorCode::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Canonical outcome of one transmission attempt.
///
/// `detail` is already PII-sanitized by the classifier; it is safe to log
/// and to persist on the queue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedError {
    pub code: ErrorCode,
    pub retryable: bool,
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl NormalizedError {
    /// Build an outcome; retryability follows the code.
    pub fn new(code: ErrorCode, http_status: Option<u16>, detail: Option<String>) -> Self {
        Self {
            code,
            retryable: code.retryable(),
            http_status,
            detail,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }
}
