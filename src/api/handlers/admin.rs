//! Bearer token guard for the admin endpoints.

use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};

/// Shared secret expected in `Authorization: Bearer <token>`.
#[derive(Clone, Debug)]
pub struct AdminToken(SecretString);

impl AdminToken {
    #[must_use]
    pub fn new(token: SecretString) -> Self {
        Self(token)
    }

    fn matches(&self, presented: &str) -> bool {
        let expected = self.0.expose_secret().as_bytes();
        let presented = presented.as_bytes();
        if expected.len() != presented.len() {
            return false;
        }
        expected
            .iter()
            .zip(presented)
            .fold(0_u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// # Errors
/// `401` when the header is missing or malformed, `403` when the token is wrong.
pub fn require_admin(headers: &HeaderMap, token: &AdminToken) -> Result<(), StatusCode> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let presented = value
        .trim()
        .strip_prefix("Bearer ")
        .or_else(|| value.trim().strip_prefix("bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?
        .trim();

    if token.matches(presented) {
        Ok(())
    } else {
        Err(StatusCode::FORBIDDEN)
    }
}
