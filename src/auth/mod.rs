//! Credential primitives: salted password digests and bearer tokens.
//!
//! Passwords are stored as `sha256$<salt>$<digest>` where the digest is an
//! iterated SHA-256 over `salt:password`. Session tokens are opaque random
//! values checked against the sessions table — nothing is encoded in them.

pub mod session;

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Digest iteration count. High enough to slow brute force, low enough to
/// keep login latency unnoticeable.
const HASH_ROUNDS: u32 = 100_000;

const SCHEME: &str = "sha256";

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().to_string().replace('-', "");
    let digest = iterated_digest(&salt, password);
    format!("{SCHEME}${salt}${digest}")
}

/// Verify a password against a stored `sha256$salt$digest` string.
/// Malformed stored values verify as false, never panic.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(SCHEME), Some(salt), Some(digest)) => iterated_digest(salt, password) == digest,
        _ => false,
    }
}

fn iterated_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    let mut digest = hasher.finalize();
    for _ in 1..HASH_ROUNDS {
        let mut hasher = Sha256::new();
        hasher.update(digest);
        digest = hasher.finalize();
    }
    hex::encode(digest)
}

/// Generate a new opaque session token (UUID v4, hex without dashes).
pub fn new_token() -> String {
    Uuid::new_v4().to_string().replace('-', "")
}

/// Extract the token from a `Bearer <token>` authorization value.
pub fn parse_bearer(header_value: &str) -> Option<&str> {
    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

// ─── Tests ────────────────────────────────────────────────────────────────────
