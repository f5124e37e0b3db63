//! Secret handling utilities.
//!
//! Re-exports the secrecy types used for the database URL and queue token.

pub use secrecy::{ExposeSecret, SecretString};

/// Format an `Authorization: Bearer` header value without leaving the token
/// in a long-lived `String` field.
pub fn bearer(token: &SecretString) -> String {
    format!("Bearer {}", token.expose_secret())
}
