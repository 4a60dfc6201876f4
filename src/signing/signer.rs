//! Request signing for the ONDC network.
//!
//! # Algorithms
//!
//! - **Digest**: BLAKE2b-512 over the raw request body
//! - **Signature**: Ed25519 over the canonical signing string
//!
//! The signing string binds the digest to the `created`/`expires` window:
//!
//! ```text
//! (created): 1000
//! (expires): 1030
//! digest: BLAKE-512=<base64 digest>
//! ```
//!
//! Peers rebuild that string from the `Authorization` header and verify it
//! textually, so field order and quoting here are part of the protocol.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use blake2::{Blake2b512, Digest};
use ed25519_dalek::{Signer as _, SigningKey};
use serde::Serialize;

use crate::types::{PolicyAgentError, Result};

// =============================================================================
// Constants
// =============================================================================

/// Algorithm identifier carried in the header
pub const ALGORITHM: &str = "ed25519";

/// Headers covered by the signature, in signing-string order
pub const SIGNED_HEADERS: &str = "(created) (expires) digest";

/// Ed25519 seed length
pub const SEED_LEN: usize = 32;

/// Ed25519 seed || public key length
pub const KEYPAIR_LEN: usize = 64;

// =============================================================================
// Types
// =============================================================================

/// Signer identity, fixed at start-up
#[derive(Debug, Clone, Default)]
pub struct SignerConfig {
    /// Base64 Ed25519 private key (32-byte seed or 64-byte keypair)
    pub private_key: Option<String>,
    /// Our subscriber id in the registry
    pub subscriber_id: String,
    /// Unique key id registered alongside our public key
    pub unique_key_id: String,
}

/// Output of a signing operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    /// Base64 Ed25519 signature
    pub signature: String,
    /// Unix seconds the signature becomes valid
    pub created_at: i64,
    /// Unix seconds the signature expires
    pub expires_at: i64,
}

// =============================================================================
// Pure functions
// =============================================================================

/// Base64 BLAKE2b-512 digest of a payload.
pub fn blake512_digest(payload: &[u8]) -> String {
    let mut hasher = Blake2b512::new();
    hasher.update(payload);
    STANDARD.encode(hasher.finalize())
}

/// Build the canonical signing string for a payload and time window.
pub fn signing_string(payload: &[u8], created_at: i64, expires_at: i64) -> String {
    format!(
        "(created): {}\n(expires): {}\ndigest: BLAKE-512={}",
        created_at,
        expires_at,
        blake512_digest(payload)
    )
}

/// Decode a base64 private key into an Ed25519 signing key.
///
/// Accepts either the 32-byte seed or the 64-byte seed||public form the
/// registry onboarding tools emit.
pub fn decode_private_key(private_key: &str) -> Result<SigningKey> {
    let trimmed = private_key.trim();
    if trimmed.is_empty() {
        return Err(PolicyAgentError::Configuration(
            "PRIVATE_KEY not configured".to_string(),
        ));
    }

    let bytes = STANDARD
        .decode(trimmed)
        .map_err(|e| PolicyAgentError::Configuration(format!("PRIVATE_KEY is not base64: {e}")))?;

    match bytes.len() {
        SEED_LEN => {
            let mut seed = [0u8; SEED_LEN];
            seed.copy_from_slice(&bytes);
            Ok(SigningKey::from_bytes(&seed))
        }
        KEYPAIR_LEN => {
            let mut keypair = [0u8; KEYPAIR_LEN];
            keypair.copy_from_slice(&bytes);
            SigningKey::from_keypair_bytes(&keypair).map_err(|e| {
                PolicyAgentError::Configuration(format!("PRIVATE_KEY keypair is inconsistent: {e}"))
            })
        }
        other => Err(PolicyAgentError::Configuration(format!(
            "PRIVATE_KEY has invalid length: expected {} or {} bytes, got {}",
            SEED_LEN, KEYPAIR_LEN, other
        ))),
    }
}

/// Sign a payload for the window `[now, now + ttl_seconds]`.
///
/// # Errors
///
/// `Configuration` when the key is missing or malformed.
pub fn sign(
    private_key: Option<&str>,
    payload: &[u8],
    now: i64,
    ttl_seconds: i64,
) -> Result<SignedPayload> {
    let key = private_key.ok_or_else(|| {
        PolicyAgentError::Configuration("PRIVATE_KEY not configured".to_string())
    })?;
    let signing_key = decode_private_key(key)?;

    let created_at = now;
    let expires_at = now + ttl_seconds;
    let message = signing_string(payload, created_at, expires_at);
    let signature = signing_key.sign(message.as_bytes());

    Ok(SignedPayload {
        signature: STANDARD.encode(signature.to_bytes()),
        created_at,
        expires_at,
    })
}

// =============================================================================
// Signer
// =============================================================================

/// Builds `Authorization` headers for outbound registry calls
#[derive(Debug, Clone)]
pub struct Signer {
    config: SignerConfig,
}

impl Signer {
    /// Create a signer from start-up configuration
    pub fn new(config: SignerConfig) -> Self {
        Self { config }
    }

    /// Sign raw bytes and render the header
    pub fn authorization_header(&self, payload: &[u8], now: i64, ttl_seconds: i64) -> Result<String> {
        let signed = sign(self.config.private_key.as_deref(), payload, now, ttl_seconds)?;
        Ok(self.render_header(&signed))
    }

    /// Serialize a body canonically, then sign it.
    ///
    /// Returns the exact bytes that were signed so the caller sends the same
    /// body the digest covers.
    pub fn sign_json<T: Serialize>(
        &self,
        body: &T,
        now: i64,
        ttl_seconds: i64,
    ) -> Result<(Vec<u8>, String)> {
        let payload = serde_json::to_vec(body)
            .map_err(|e| PolicyAgentError::Encoding(format!("Failed to serialize body: {e}")))?;
        let header = self.authorization_header(&payload, now, ttl_seconds)?;
        Ok((payload, header))
    }

    /// Render the `Signature ...` header text
    pub fn render_header(&self, signed: &SignedPayload) -> String {
        format!(
            r#"Signature keyId="{}|{}|{}",algorithm="{}",created="{}",expires="{}",headers="{}",signature="{}""#,
            self.config.subscriber_id,
            self.config.unique_key_id,
            ALGORITHM,
            ALGORITHM,
            signed.created_at,
            signed.expires_at,
            SIGNED_HEADERS,
            signed.signature,
        )
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier};

    fn test_seed() -> [u8; SEED_LEN] {
        [7u8; SEED_LEN]
    }

    fn test_key_b64() -> String {
        STANDARD.encode(test_seed())
    }

    fn test_signer() -> Signer {
        Signer::new(SignerConfig {
            private_key: Some(test_key_b64()),
            subscriber_id: "buyer.example.com".to_string(),
            unique_key_id: "ukid-1".to_string(),
        })
    }

    #[test]
    fn test_window_is_now_plus_ttl() {
        let signed = sign(Some(&test_key_b64()), b"{}", 1000, 30).unwrap();
        assert_eq!(signed.created_at, 1000);
        assert_eq!(signed.expires_at, 1030);
    }

    #[test]
    fn test_header_embeds_window_verbatim() {
        let header = test_signer().authorization_header(b"{}", 1000, 30).unwrap();

        assert!(header.starts_with(
            r#"Signature keyId="buyer.example.com|ukid-1|ed25519",algorithm="ed25519",created="1000",expires="1030",headers="(created) (expires) digest",signature=""#
        ));
        assert!(header.ends_with('"'));
    }

    #[test]
    fn test_signature_verifies_against_signing_string() {
        let payload = br#"{"country":"IND","type":"BPP","domain":"ONDC:RET10"}"#;
        let signed = sign(Some(&test_key_b64()), payload, 1700000000, 30).unwrap();

        let verifying_key = SigningKey::from_bytes(&test_seed()).verifying_key();
        let sig_bytes: [u8; 64] = STANDARD
            .decode(&signed.signature)
            .unwrap()
            .try_into()
            .unwrap();
        let signature = Signature::from_bytes(&sig_bytes);

        let message = signing_string(payload, 1700000000, 1700000030);
        assert!(verifying_key.verify(message.as_bytes(), &signature).is_ok());

        // A different window must not verify
        let shifted = signing_string(payload, 1700000001, 1700000031);
        assert!(verifying_key.verify(shifted.as_bytes(), &signature).is_err());
    }

    #[test]
    fn test_signing_string_layout() {
        let s = signing_string(b"abc", 1, 2);
        let lines: Vec<&str> = s.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "(created): 1");
        assert_eq!(lines[1], "(expires): 2");
        assert!(lines[2].starts_with("digest: BLAKE-512="));
        assert_eq!(blake512_digest(b"abc").len(), 88);
    }

    #[test]
    fn test_keypair_form_matches_seed_form() {
        let seed_key = SigningKey::from_bytes(&test_seed());
        let keypair_b64 = STANDARD.encode(seed_key.to_keypair_bytes());

        let a = sign(Some(&test_key_b64()), b"payload", 5, 10).unwrap();
        let b = sign(Some(&keypair_b64), b"payload", 5, 10).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let err = sign(None, b"{}", 0, 30).unwrap_err();
        assert!(matches!(err, PolicyAgentError::Configuration(_)));

        let err = sign(Some("   "), b"{}", 0, 30).unwrap_err();
        assert!(matches!(err, PolicyAgentError::Configuration(_)));
    }

    #[test]
    fn test_bad_key_length_is_configuration_error() {
        let short = STANDARD.encode([1u8; 16]);
        let err = decode_private_key(&short).unwrap_err();
        assert!(matches!(err, PolicyAgentError::Configuration(_)));
        assert!(decode_private_key("not base64!!").is_err());
    }

    #[test]
    fn test_sign_json_returns_signed_bytes() {
        let body = serde_json::json!({ "country": "IND" });
        let (bytes, header) = test_signer().sign_json(&body, 10, 30).unwrap();
        assert_eq!(bytes, br#"{"country":"IND"}"#.to_vec());
        assert!(header.contains(r#"created="10",expires="40""#));
    }
}
