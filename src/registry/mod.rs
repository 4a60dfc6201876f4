//! Network registry access
//!
//! - **RegistryClient**: signed `lookup` calls with timeout and retry
//! - **ParticipantSource**: the seam the reconciler depends on

pub mod client;
pub mod types;

pub use client::{parse_lookup_response, ParticipantSource, RegistryClient, RegistryClientConfig};
pub use types::{LookupRequest, RegistryParticipant, LOOKUP_COUNTRY, LOOKUP_TYPE};
