//! Shared cryptographic primitives for the content gateway.
//!
//! ## Modules
//! - `jwt`: HS256 credential issuing and verification

pub mod jwt;

pub use jwt::{Claims, JwtError, TokenCodec, TokenFailure};
