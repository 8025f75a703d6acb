//! Webhook signature header selection and HMAC-SHA256 verification.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::borrow::Cow;
use std::fmt;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// How a provider places its credential in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    /// `sha256=<hex>` HMAC digest of the body (GitHub style).
    HubSignature,
    /// Provider-specific token header (Codeup, GitLab, Gitee).
    Token,
}

/// Recognized signature headers, highest priority first.
pub const SIGNATURE_HEADERS: [(&str, SignatureScheme); 4] = [
    ("x-hub-signature-256", SignatureScheme::HubSignature),
    ("x-codeup-token", SignatureScheme::Token),
    ("x-gitlab-token", SignatureScheme::Token),
    ("x-gitee-token", SignatureScheme::Token),
];

/// The single signature value considered for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureCandidate<'a> {
    pub header: &'static str,
    pub scheme: SignatureScheme,
    pub value: Cow<'a, str>,
}

impl SignatureCandidate<'_> {
    /// Leading part of the presented value, safe to put in a log line.
    pub fn preview(&self) -> String {
        self.value.chars().take(20).collect()
    }
}

impl fmt::Display for SignatureCandidate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.header, self.scheme)
    }
}

/// Picks the first signature header present, in `SIGNATURE_HEADERS` order.
pub fn select_signature(headers: &HeaderMap) -> Option<SignatureCandidate<'_>> {
    SIGNATURE_HEADERS.iter().find_map(|(name, scheme)| {
        headers.get(*name).map(|v| SignatureCandidate {
            header: *name,
            scheme: *scheme,
            value: String::from_utf8_lossy(v.as_bytes()),
        })
    })
}

/// Verifies a presented signature against the HMAC-SHA256 of `payload`.
///
/// Accepts either `sha256=<hex>` or the bare lower-case hex digest. Both
/// comparisons run in constant time. A missing signature never verifies.
pub fn verify_signature(payload: &[u8], signature: Option<&str>, secret: &str) -> bool {
    let Some(signature) = signature else {
        return false;
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);
    let digest = hex::encode(mac.finalize().into_bytes());
    let prefixed = format!("sha256={}", digest);

    let presented = signature.as_bytes();
    let matches_prefixed: bool = presented.ct_eq(prefixed.as_bytes()).into();
    let matches_plain: bool = presented.ct_eq(digest.as_bytes()).into();
    matches_prefixed | matches_plain
}
