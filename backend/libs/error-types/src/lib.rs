//! Shared rejection envelope for the content gateway
//!
//! Every response the gate produces on its own (401, 403, 429, 503) uses the
//! same JSON shape so clients can handle rejections uniformly:
//!
//! ```json
//! {
//!   "timestamp": "2024-05-01T12:00:00.000Z",
//!   "status": 429,
//!   "error": "Too Many Requests",
//!   "message": "Rate limit exceeded. Please retry later.",
//!   "path": "/api/auth/login",
//!   "retryAfterSeconds": 42
//! }
//! ```

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Reason phrases used in the `error` field
pub mod error_types {
    pub const UNAUTHORIZED: &str = "Unauthorized";
    pub const FORBIDDEN: &str = "Forbidden";
    pub const TOO_MANY_REQUESTS: &str = "Too Many Requests";
    pub const SERVICE_UNAVAILABLE: &str = "Service Unavailable";
}

/// JSON body of a gate rejection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// ISO-8601 instant the rejection was produced
    pub timestamp: String,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub path: String,
    /// Present on rate-limit rejections only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl ErrorResponse {
    pub fn new(
        status: u16,
        error: impl Into<String>,
        message: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            status,
            error: error.into(),
            message: message.into(),
            path: path.into(),
            retry_after_seconds: None,
        }
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after_seconds = Some(seconds);
        self
    }
}
