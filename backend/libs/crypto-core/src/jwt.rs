/// Credential codec for the content gateway
///
/// Signs and verifies compact HS256 credentials carrying a subject, issue time,
/// expiry and optional extra claims. The codec is constructed once at startup
/// from the process-wide secret and shared read-only between workers.
///
/// ## Verification order
///
/// 1. Structure and claims are decoded without trusting the signature (`Malformed`)
/// 2. Expiry is checked against the supplied clock (`Expired`)
/// 3. The HS256 MAC is checked (`SignatureInvalid`)
/// 4. The subject must be non-empty (`Malformed`)
///
/// Every failure is a [`TokenFailure`]; nothing in this module panics on input.
///
/// ## Usage
///
/// ```rust
/// use chrono::Duration;
/// use crypto_core::jwt::TokenCodec;
///
/// let codec = TokenCodec::new("0123456789abcdef0123456789abcdef", Duration::hours(24))
///     .expect("secret is long enough");
/// let token = codec.issue_default("alice@example.com", Default::default()).unwrap();
/// assert_eq!(codec.verify(&token).unwrap().sub, "alice@example.com");
/// ```
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Constants
// ============================================================================

/// Minimum secret length in bytes
pub const MIN_SECRET_LEN: usize = 32;

/// HS256 is the only accepted algorithm
const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

/// Claim names owned by the codec; extra claims may not override them
const RESERVED_CLAIMS: [&str; 3] = ["sub", "iat", "exp"];

// ============================================================================
// Data Structures
// ============================================================================

/// Claims carried by every credential
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// Subject (principal username)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Additional caller-supplied claims
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Why a credential was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenFailure {
    #[error("credential is malformed")]
    Malformed,
    #[error("credential signature is invalid")]
    SignatureInvalid,
    #[error("credential has expired")]
    Expired,
}

/// Codec construction and signing errors
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT secret must be at least {min} bytes long (got {actual})")]
    SecretTooShort { min: usize, actual: usize },

    #[error("failed to sign credential: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

// ============================================================================
// Codec
// ============================================================================

/// HS256 credential codec bound to one secret
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    default_ttl: Duration,
}

impl TokenCodec {
    /// Build a codec from the signing secret.
    ///
    /// A secret shorter than [`MIN_SECRET_LEN`] bytes is a fatal configuration
    /// error; it is checked here once rather than on every call.
    pub fn new(secret: &str, default_ttl: Duration) -> Result<Self, JwtError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(JwtError::SecretTooShort {
                min: MIN_SECRET_LEN,
                actual: secret.len(),
            });
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            default_ttl,
        })
    }

    /// Lifetime applied by [`TokenCodec::issue_default`]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Issue a credential valid for `ttl` from now
    pub fn issue(
        &self,
        subject: &str,
        extra: Map<String, Value>,
        ttl: Duration,
    ) -> Result<String, JwtError> {
        self.issue_at(subject, extra, ttl, Utc::now())
    }

    /// Issue a credential with the configured default lifetime
    pub fn issue_default(&self, subject: &str, extra: Map<String, Value>) -> Result<String, JwtError> {
        self.issue(subject, extra, self.default_ttl)
    }

    /// Issue a credential as if the current time were `now`
    pub fn issue_at(
        &self,
        subject: &str,
        mut extra: Map<String, Value>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, JwtError> {
        for reserved in RESERVED_CLAIMS {
            extra.remove(reserved);
        }

        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            extra,
        };

        Ok(encode(&Header::new(JWT_ALGORITHM), &claims, &self.encoding_key)?)
    }

    /// Verify a credential against the current time
    pub fn verify(&self, token: &str) -> Result<Claims, TokenFailure> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verify a credential against the Unix timestamp `now`.
    ///
    /// A credential is valid only while `now < exp`.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, TokenFailure> {
        let claims = decode_unverified(token)?;

        if now >= claims.exp {
            return Err(TokenFailure::Expired);
        }

        let verified = decode::<Claims>(token, &self.decoding_key, &signature_validation())
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenFailure::SignatureInvalid
                }
                _ => TokenFailure::Malformed,
            })?
            .claims;

        if verified.sub.trim().is_empty() {
            return Err(TokenFailure::Malformed);
        }

        Ok(verified)
    }
}

// ============================================================================
// Internal helpers
// ============================================================================

/// Validation used for the signature pass; expiry is checked separately
fn signature_validation() -> Validation {
    let mut validation = Validation::new(JWT_ALGORITHM);
    validation.leeway = 0;
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp", "sub"]);
    validation
}

/// Decode header and claims without checking the MAC
fn decode_unverified(token: &str) -> Result<Claims, TokenFailure> {
    let mut validation = signature_validation();
    validation.insecure_disable_signature_validation();

    decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(error = %e, "credential failed structural decode");
            TokenFailure::Malformed
        })
}

// ============================================================================
// Tests
// ============================================================================
