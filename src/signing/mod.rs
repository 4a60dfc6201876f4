//! Outbound request signing
//!
//! Registry and seller peers verify a timestamped, TTL-bounded Ed25519
//! signature carried in the `Authorization` header.

pub mod signer;

pub use signer::{
    blake512_digest, decode_private_key, sign, signing_string, SignedPayload, Signer, SignerConfig,
};
