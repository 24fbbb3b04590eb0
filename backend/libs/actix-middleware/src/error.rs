//! Gate error taxonomy and its HTTP rendering
//!
//! All failures the gate can produce are recovered here into a response with
//! the shared [`ErrorResponse`] envelope. Credential failures collapse into a
//! single opaque 401 so callers cannot tell which check failed.

use actix_web::{
    http::{
        header::{HeaderName, HeaderValue, RETRY_AFTER},
        StatusCode,
    },
    HttpResponse, ResponseError,
};
use crypto_core::TokenFailure;
use error_types::{error_types as reasons, ErrorResponse};

pub const X_RATE_LIMIT_LIMIT: &str = "x-rate-limit-limit";
pub const X_RATE_LIMIT_REMAINING: &str = "x-rate-limit-remaining";
pub const X_RATE_LIMIT_RESET: &str = "x-rate-limit-reset";

const AUTH_FAILED_MESSAGE: &str = "Invalid or expired authentication credential";
const AUTH_REQUIRED_MESSAGE: &str = "Full authentication is required to access this resource";
const FORBIDDEN_MESSAGE: &str = "You do not have permission to access this resource";
const RATE_LIMITED_MESSAGE: &str = "Rate limit exceeded. Please retry later.";
const STORE_DOWN_MESSAGE: &str = "Request throttling is temporarily unavailable";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("malformed credential")]
    MalformedCredential,

    #[error("invalid credential signature")]
    InvalidSignature,

    #[error("expired credential")]
    ExpiredCredential,

    #[error("unknown principal")]
    UnknownPrincipal,

    #[error("principal store unavailable: {0}")]
    PrincipalStoreUnavailable(String),

    #[error("authentication required")]
    AuthenticationRequired,

    #[error("missing capability {required}")]
    Forbidden { required: String },

    #[error("rate limit of {limit} exceeded, retry after {retry_after_seconds}s")]
    RateLimitExceeded { limit: u32, retry_after_seconds: u64 },

    #[error("counter store unavailable: {0}")]
    CounterStoreUnavailable(String),
}

impl From<TokenFailure> for GateError {
    fn from(failure: TokenFailure) -> Self {
        match failure {
            TokenFailure::Malformed => GateError::MalformedCredential,
            TokenFailure::SignatureInvalid => GateError::InvalidSignature,
            TokenFailure::Expired => GateError::ExpiredCredential,
        }
    }
}

impl GateError {
    /// Short label for logs and metrics; never sent to clients
    pub fn reason(&self) -> &'static str {
        match self {
            GateError::MalformedCredential => "malformed",
            GateError::InvalidSignature => "invalid_signature",
            GateError::ExpiredCredential => "expired",
            GateError::UnknownPrincipal => "unknown_principal",
            GateError::PrincipalStoreUnavailable(_) => "principal_store_unavailable",
            GateError::AuthenticationRequired => "authentication_required",
            GateError::Forbidden { .. } => "forbidden",
            GateError::RateLimitExceeded { .. } => "rate_limited",
            GateError::CounterStoreUnavailable(_) => "counter_store_unavailable",
        }
    }

    /// Build the client-facing envelope for a request to `path`
    pub fn body(&self, path: &str) -> ErrorResponse {
        let status = self.status_code().as_u16();
        match self {
            GateError::MalformedCredential
            | GateError::InvalidSignature
            | GateError::ExpiredCredential
            | GateError::UnknownPrincipal
            | GateError::PrincipalStoreUnavailable(_) => {
                ErrorResponse::new(status, reasons::UNAUTHORIZED, AUTH_FAILED_MESSAGE, path)
            }
            GateError::AuthenticationRequired => {
                ErrorResponse::new(status, reasons::UNAUTHORIZED, AUTH_REQUIRED_MESSAGE, path)
            }
            GateError::Forbidden { .. } => {
                ErrorResponse::new(status, reasons::FORBIDDEN, FORBIDDEN_MESSAGE, path)
            }
            GateError::RateLimitExceeded {
                retry_after_seconds,
                ..
            } => ErrorResponse::new(status, reasons::TOO_MANY_REQUESTS, RATE_LIMITED_MESSAGE, path)
                .with_retry_after(*retry_after_seconds),
            GateError::CounterStoreUnavailable(_) => {
                ErrorResponse::new(status, reasons::SERVICE_UNAVAILABLE, STORE_DOWN_MESSAGE, path)
            }
        }
    }

    /// Render the full HTTP response, including throttling headers on 429
    pub fn to_response(&self, path: &str) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());

        if let GateError::RateLimitExceeded {
            limit,
            retry_after_seconds,
        } = self
        {
            builder
                .insert_header((HeaderName::from_static(X_RATE_LIMIT_LIMIT), HeaderValue::from(*limit)))
                .insert_header((HeaderName::from_static(X_RATE_LIMIT_REMAINING), HeaderValue::from(0u32)))
                .insert_header((
                    HeaderName::from_static(X_RATE_LIMIT_RESET),
                    HeaderValue::from(*retry_after_seconds),
                ))
                .insert_header((RETRY_AFTER, HeaderValue::from(*retry_after_seconds)));
        }

        builder.json(self.body(path))
    }
}

impl ResponseError for GateError {
    fn status_code(&self) -> StatusCode {
        match self {
            GateError::MalformedCredential
            | GateError::InvalidSignature
            | GateError::ExpiredCredential
            | GateError::UnknownPrincipal
            | GateError::PrincipalStoreUnavailable(_)
            | GateError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            GateError::Forbidden { .. } => StatusCode::FORBIDDEN,
            GateError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GateError::CounterStoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        self.to_response("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_failures_share_one_body() {
        let failures = [
            GateError::MalformedCredential,
            GateError::InvalidSignature,
            GateError::ExpiredCredential,
            GateError::UnknownPrincipal,
            GateError::PrincipalStoreUnavailable("timeout".to_string()),
        ];

        for failure in &failures {
            let body = failure.body("/api/me");
            assert_eq!(body.status, 401);
            assert_eq!(body.error, "Unauthorized");
            assert_eq!(body.message, AUTH_FAILED_MESSAGE);
            assert!(!body.message.to_lowercase().contains("expired"));
            assert!(!body.message.to_lowercase().contains("malformed"));
        }
    }

    #[test]
    fn test_token_failure_mapping() {
        assert_eq!(GateError::from(TokenFailure::Malformed), GateError::MalformedCredential);
        assert_eq!(GateError::from(TokenFailure::SignatureInvalid), GateError::InvalidSignature);
        assert_eq!(GateError::from(TokenFailure::Expired), GateError::ExpiredCredential);
    }

    #[test]
    fn test_rate_limited_response_headers() {
        let err = GateError::RateLimitExceeded {
            limit: 10,
            retry_after_seconds: 42,
        };
        let resp = err.to_response("/api/auth/login");

        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        let headers = resp.headers();
        assert_eq!(headers.get(X_RATE_LIMIT_LIMIT).unwrap(), "10");
        assert_eq!(headers.get(X_RATE_LIMIT_REMAINING).unwrap(), "0");
        assert_eq!(headers.get(X_RATE_LIMIT_RESET).unwrap(), "42");
        assert_eq!(headers.get(RETRY_AFTER).unwrap(), "42");
        assert_eq!(
            err.body("/api/auth/login").retry_after_seconds,
            Some(42)
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(GateError::AuthenticationRequired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            GateError::Forbidden { required: "ROLE_ADMIN".into() }.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            GateError::CounterStoreUnavailable("down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
