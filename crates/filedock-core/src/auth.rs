//! Time-bucketed request signing.
//!
//! A per-request key is derived from the shared secret, the current coarse
//! time window and the declared content length. The same payload signed in a
//! different window or with a different length yields a different signature,
//! which bounds replay to one window and ties the signature to the declared
//! size rather than just the bytes.
//!
//! Signatures are HMAC-SHA256 over the payload under the derived key,
//! base64-encoded for header transport. Signer and verifier both recompute;
//! nothing is stored.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ring::{digest, hmac};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Width of the validity window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(30);

/// Signs and verifies request payloads with a time-bucketed derived key.
///
/// An empty or absent secret disables verification entirely; that is an
/// explicit deployment choice, not a fallback.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    secret: Option<String>,
    window_secs: u64,
}

impl RequestSigner {
    pub fn new(secret: Option<String>, window: Duration) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            window_secs: window.as_secs().max(1),
        }
    }

    /// Whether signatures are checked at all.
    pub fn enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Sign a payload for the current time window. `None` when disabled.
    pub fn sign(&self, content_length: u64, payload: &[u8]) -> Option<String> {
        self.sign_at(content_length, payload, unix_now())
    }

    /// Sign for an explicit clock reading. Exists so window-boundary
    /// behavior is testable without sleeping.
    pub fn sign_at(&self, content_length: u64, payload: &[u8], now_secs: u64) -> Option<String> {
        let secret = self.secret.as_deref()?;
        let key = self.derive_key(secret, content_length, now_secs);
        Some(BASE64.encode(hmac::sign(&key, payload).as_ref()))
    }

    /// Verify a client-supplied signature header against the payload.
    ///
    /// Returns `true` when verification is disabled. The comparison is
    /// constant-time via `ring::hmac::verify`.
    pub fn verify(&self, header: Option<&str>, content_length: u64, payload: &[u8]) -> bool {
        let Some(secret) = self.secret.as_deref() else {
            return true;
        };
        let Some(header) = header else {
            return false;
        };
        let Ok(tag) = BASE64.decode(header.trim()) else {
            return false;
        };

        let key = self.derive_key(secret, content_length, unix_now());
        hmac::verify(&key, payload, &tag).is_ok()
    }

    fn derive_key(&self, secret: &str, content_length: u64, now_secs: u64) -> hmac::Key {
        let bucket = now_secs / self.window_secs;

        let mut material = Vec::with_capacity(secret.len() + 16);
        material.extend_from_slice(secret.as_bytes());
        material.extend_from_slice(&bucket.to_be_bytes());
        material.extend_from_slice(&content_length.to_be_bytes());

        let key_bytes = digest::digest(&digest::SHA256, &material);
        hmac::Key::new(hmac::HMAC_SHA256, key_bytes.as_ref())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> RequestSigner {
        RequestSigner::new(Some("hunter2".to_string()), DEFAULT_WINDOW)
    }

    #[test]
    fn deterministic_within_a_window() {
        let s = signer();
        let a = s.sign_at(42, b"payload", 1_000_000).unwrap();
        let b = s.sign_at(42, b"payload", 1_000_000).unwrap();
        assert_eq!(a, b);

        // Same window, different second.
        let c = s.sign_at(42, b"payload", 1_000_020).unwrap();
        assert_eq!(a, c, "1_000_000 and 1_000_020 share a 30s bucket");
    }

    #[test]
    fn window_boundary_changes_signature() {
        let s = signer();
        let before = s.sign_at(42, b"payload", 29).unwrap();
        let after = s.sign_at(42, b"payload", 30).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn length_binds_the_key() {
        let s = signer();
        let a = s.sign_at(1, b"payload", 1_000_000).unwrap();
        let b = s.sign_at(2, b"payload", 1_000_000).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn verify_roundtrip() {
        let s = signer();
        let sig = s.sign(7, b"body bytes").unwrap();
        assert!(s.verify(Some(&sig), 7, b"body bytes"));
        assert!(!s.verify(Some(&sig), 8, b"body bytes"));
        assert!(!s.verify(Some(&sig), 7, b"other bytes"));
        assert!(!s.verify(Some("not base64!!"), 7, b"body bytes"));
        assert!(!s.verify(None, 7, b"body bytes"));
    }

    #[test]
    fn empty_secret_disables_verification() {
        let open = RequestSigner::new(Some(String::new()), DEFAULT_WINDOW);
        assert!(!open.enabled());
        assert!(open.verify(None, 0, b"anything"));
        assert!(open.sign(0, b"anything").is_none());

        let absent = RequestSigner::new(None, DEFAULT_WINDOW);
        assert!(absent.verify(Some("garbage"), 0, b"anything"));
    }
}
