//! Shared-secret credential encoding.
//!
//! Both credential channels carry the same token: the standard base64 encoding
//! of `user:secret`. The header channel prefixes it with `Basic `, the query
//! channel passes it as the `auth` parameter of an image URL.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// The only username the gallery accepts.
pub const USERNAME: &str = "user";

/// Name of the query parameter used by the URL-embedded channel.
pub const QUERY_PARAM: &str = "auth";

/// Encodes `username:secret` as a Basic token.
pub fn encode_token(username: &str, secret: &str) -> String {
    STANDARD.encode(format!("{username}:{secret}"))
}

/// Decodes a Basic token into `(username, secret)`.
///
/// The username ends at the first colon; the secret may contain colons.
/// Returns `None` for invalid base64, non UTF-8 payloads or a missing colon.
pub fn decode_token(token: &str) -> Option<(String, String)> {
    let bytes = STANDARD.decode(token.trim()).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    let (username, secret) = text.split_once(':')?;
    Some((username.to_string(), secret.to_string()))
}

/// Extracts the token from an `Authorization: Basic <token>` header value.
pub fn basic_header_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if scheme.eq_ignore_ascii_case("basic") {
        Some(token.trim())
    } else {
        None
    }
}

/// The single username/secret pair the server accepts.
#[derive(Clone)]
pub struct SharedSecret {
    secret: String,
}

impl SharedSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// True if `token` decodes to the configured user and secret.
    pub fn verify_token(&self, token: &str) -> bool {
        match decode_token(token) {
            Some((username, secret)) => self.verify(&username, &secret),
            None => false,
        }
    }

    pub fn verify(&self, username: &str, secret: &str) -> bool {
        // Both comparisons always run.
        let user_ok = constant_time_eq(username.as_bytes(), USERNAME.as_bytes());
        let secret_ok = constant_time_eq(secret.as_bytes(), self.secret.as_bytes());
        user_ok & secret_ok
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecret").finish_non_exhaustive()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
