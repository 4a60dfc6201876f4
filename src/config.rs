//! Configuration for the policy agent
//!
//! CLI arguments and environment variable handling using clap. Each
//! component gets its own immutable config built once from `Args`.

use std::time::Duration;

use clap::Parser;

use crate::logging::LogFormat;
use crate::registry::RegistryClientConfig;
use crate::services::{BroadcastConfig, NotifierConfig, SyncRequest};
use crate::signing::SignerConfig;

/// Retail domains mirrored when none are configured
pub const DEFAULT_DOMAINS: &str =
    "ONDC:RET10,ONDC:RET11,ONDC:RET12,ONDC:RET13,ONDC:RET14,ONDC:RET15,ONDC:RET16,ONDC:RET17,ONDC:RET18";

/// Policy Agent - registry mirror and buyer permission broadcaster
#[derive(Parser, Debug, Clone)]
#[command(name = "policy-agent")]
#[command(about = "Mirrors the network registry and adjudicates buyer-seller permissions")]
pub struct Args {
    /// Business domains to reconcile (comma-separated)
    #[arg(long, env = "DOMAINS", default_value = DEFAULT_DOMAINS, value_delimiter = ',')]
    pub domains: Vec<String>,

    /// Registry lookup endpoint
    #[arg(
        long,
        env = "REGISTRY_URL",
        default_value = "https://preprod.registry.ondc.org/v2.0/lookup"
    )]
    pub registry_url: String,

    /// Registry environment tag stored on every mirrored row
    #[arg(long, env = "REGISTRY_ENV", default_value = "preprod")]
    pub registry_env: String,

    /// Base64 Ed25519 private key (32-byte seed or 64-byte keypair)
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// Our subscriber id, used in the signature keyId
    #[arg(long, env = "SUBSCRIBER_ID", default_value = "")]
    pub subscriber_id: String,

    /// Our unique key id, used in the signature keyId
    #[arg(long, env = "UNIQUE_KEY_ID", default_value = "")]
    pub unique_key_id: String,

    /// Skip seller calls and record synthetic ALLOWED policies
    #[arg(long, env = "MOCK_SELLER_RESPONSE", default_value = "false")]
    pub mock_seller_response: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "policy_agent")]
    pub mongodb_db: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (pretty, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,

    /// Seconds between scheduled registry syncs
    #[arg(long, env = "SYNC_INTERVAL_SECS", default_value = "21600")]
    pub sync_interval_secs: u64,

    /// Run one registry sync and exit
    #[arg(long, env = "RUN_NOW", default_value = "false")]
    pub run_now: bool,

    /// Maximum concurrent seller dispatches per broadcast
    #[arg(long, env = "BROADCAST_CONCURRENCY", default_value = "64")]
    pub broadcast_concurrency: usize,

    /// Registry request timeout in seconds
    #[arg(long, env = "REGISTRY_TIMEOUT_SECS", default_value = "30")]
    pub registry_timeout_secs: u64,

    /// Registry retries after the first attempt
    #[arg(long, env = "REGISTRY_MAX_RETRIES", default_value = "3")]
    pub registry_max_retries: u32,

    /// Seconds to wait between registry retries
    #[arg(long, env = "REGISTRY_RETRY_WAIT_SECS", default_value = "5")]
    pub registry_retry_wait_secs: u64,

    /// Seller `/search` timeout in seconds
    #[arg(long, env = "SELLER_TIMEOUT_SECS", default_value = "60")]
    pub seller_timeout_secs: u64,
}

impl Args {
    /// Domain list with blanks removed
    pub fn domain_list(&self) -> Vec<String> {
        self.domains
            .iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.domain_list().is_empty() {
            return Err("DOMAINS must list at least one domain".to_string());
        }

        if self.broadcast_concurrency == 0 {
            return Err("BROADCAST_CONCURRENCY must be greater than zero".to_string());
        }

        if self.sync_interval_secs == 0 {
            return Err("SYNC_INTERVAL_SECS must be greater than zero".to_string());
        }

        if self.registry_env.trim().is_empty() {
            return Err("REGISTRY_ENV must not be empty".to_string());
        }

        Ok(())
    }

    pub fn signer_config(&self) -> SignerConfig {
        SignerConfig {
            private_key: self.private_key.clone().filter(|k| !k.trim().is_empty()),
            subscriber_id: self.subscriber_id.clone(),
            unique_key_id: self.unique_key_id.clone(),
        }
    }

    pub fn registry_client_config(&self) -> RegistryClientConfig {
        RegistryClientConfig {
            registry_url: self.registry_url.clone(),
            request_timeout: Duration::from_secs(self.registry_timeout_secs),
            max_retries: self.registry_max_retries,
            retry_wait: Duration::from_secs(self.registry_retry_wait_secs),
            ..Default::default()
        }
    }

    pub fn notifier_config(&self) -> NotifierConfig {
        NotifierConfig {
            request_timeout: Duration::from_secs(self.seller_timeout_secs),
        }
    }

    pub fn broadcast_config(&self) -> BroadcastConfig {
        BroadcastConfig {
            registry_env: self.registry_env.clone(),
            mock_seller_response: self.mock_seller_response,
            max_concurrency: self.broadcast_concurrency,
        }
    }

    pub fn sync_request(&self) -> SyncRequest {
        SyncRequest {
            domains: self.domain_list(),
            registry_env: self.registry_env.clone(),
        }
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}
