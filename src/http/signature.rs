//! Request signature verification (`x-waypoint-signature`).
//!
//! # Responsibilities
//! - Sign a request target as `<hex hmac-sha256>.<unix seconds>`
//! - Verify incoming signature headers against the shared secret
//!
//! # Design Decisions
//! - The MAC covers the request target (path plus query) and the timestamp,
//!   so a captured signature cannot be replayed against another path
//! - Timestamps are accepted within a window in either direction to absorb
//!   clock skew between signer and server
//! - Rejection order: malformed header, stale timestamp, then tag mismatch;
//!   the tag comparison itself is constant time

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the request signature.
pub const SIGNATURE_HEADER: &str = "x-waypoint-signature";

/// Why a signature was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// The header does not parse as `<hex>.<seconds>`.
    #[error("signature is malformed")]
    Malformed,
    /// The timestamp is outside the accepted window.
    #[error("signature timestamp is outside the accepted window")]
    Expired,
    /// The tag does not match the request target.
    #[error("signature does not match the request")]
    Mismatch,
}

fn keyed_mac(secret: &str, target: &str, timestamp: u64) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(target.as_bytes());
    mac.update(b".");
    mac.update(timestamp.to_string().as_bytes());
    mac
}

/// Sign a request target (path plus query) for the given instant.
pub fn sign(target: &str, secret: &str, timestamp: u64) -> String {
    let tag = keyed_mac(secret, target, timestamp).finalize().into_bytes();
    format!("{}.{}", hex::encode(tag), timestamp)
}

/// Verify a signature header against the request target.
pub fn verify(
    target: &str,
    header: &str,
    secret: &str,
    window_secs: u64,
    now: u64,
) -> Result<(), SignatureError> {
    let (tag_hex, ts_str) = header.split_once('.').ok_or(SignatureError::Malformed)?;
    let timestamp: u64 = ts_str.parse().map_err(|_| SignatureError::Malformed)?;
    let tag = hex::decode(tag_hex).map_err(|_| SignatureError::Malformed)?;

    if now.abs_diff(timestamp) > window_secs {
        return Err(SignatureError::Expired);
    }

    keyed_mac(secret, target, timestamp)
        .verify_slice(&tag)
        .map_err(|_| SignatureError::Mismatch)
}

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}
