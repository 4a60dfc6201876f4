//! Policy Agent - registry mirror and buyer permission broadcaster
//!
//! Keeps a local mirror of the network participant registry and uses it to
//! decide which sellers a buyer app may transact with.
//!
//! ## Components
//!
//! - **Signing**: Ed25519 `Authorization` headers for outbound calls
//! - **Registry**: signed lookups against the network registry
//! - **Reconciler**: insert / update / deactivate against the local mirror
//! - **Catalog sync**: pending list and per-seller status
//! - **Broadcast**: concurrent `/search` fan-out that records access policies
//! - **Storage**: MongoDB in production, in-memory for tests

pub mod config;
pub mod db;
pub mod logging;
pub mod registry;
pub mod services;
pub mod signing;
pub mod types;

pub use config::Args;
pub use types::{PolicyAgentError, Result};
