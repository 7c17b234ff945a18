//! SASL payload encoding for `AUTH`.
//!
//! Implements:
//! - PLAIN (RFC 4616)
//! - LOGIN (legacy two-step)
//! - XOAUTH2 (Google/Microsoft proprietary)
//! - OAUTHBEARER (RFC 7628)

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// PLAIN initial response: `\0<username>\0<password>`, base64 encoded.
#[must_use]
pub fn plain_response(username: &str, password: &str) -> String {
    STANDARD.encode(format!("\0{username}\0{password}"))
}

/// One LOGIN step: the value base64 encoded.
#[must_use]
pub fn login_step(value: &str) -> String {
    STANDARD.encode(value)
}

/// XOAUTH2 initial response: `user=<user>\x01auth=Bearer <token>\x01\x01`.
#[must_use]
pub fn xoauth2_response(user: &str, token: &str) -> String {
    STANDARD.encode(format!("user={user}\x01auth=Bearer {token}\x01\x01"))
}

/// OAUTHBEARER initial response: `n,a=<user>,\x01auth=Bearer <token>\x01\x01`.
#[must_use]
pub fn oauthbearer_response(user: &str, token: &str) -> String {
    STANDARD.encode(format!("n,a={user},\x01auth=Bearer {token}\x01\x01"))
}

/// Decodes a 334 challenge for logging. Invalid base64 is returned as is.
#[must_use]
pub fn decode_challenge(challenge: &str) -> String {
    STANDARD
        .decode(challenge.trim())
        .map_or_else(|_| challenge.to_string(), |bytes| String::from_utf8_lossy(&bytes).into_owned())
}
