//! PKCE (Proof Key for Code Exchange) verification.
//!
//! Implements S256 code challenge verification per RFC 7636. The `plain`
//! method is never accepted.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// The only accepted `code_challenge_method`.
pub const METHOD_S256: &str = "S256";

/// Compute the S256 challenge for a verifier.
#[must_use]
pub fn challenge_s256(code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()))
}

/// Verify a PKCE S256 code challenge.
///
/// Computes `BASE64URL(SHA256(code_verifier))` and compares it to the stored
/// challenge in constant time.
#[must_use]
pub fn verify_s256(code_verifier: &str, code_challenge: &str) -> bool {
    let computed = challenge_s256(code_verifier);
    computed.as_bytes().ct_eq(code_challenge.as_bytes()).into()
}

/// Check the RFC 7636 §4.1 verifier grammar: 43 to 128 unreserved characters.
#[must_use]
pub fn is_valid_verifier(code_verifier: &str) -> bool {
    (43..=128).contains(&code_verifier.len())
        && code_verifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}
