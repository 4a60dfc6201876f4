//! Shared types for the policy agent

pub mod error;

pub use error::{PolicyAgentError, Result};
