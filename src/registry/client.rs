//! Registry Client
//!
//! Issues one signed `lookup` call per business domain against the network
//! registry and parses the participant list.
//!
//! Transport failures are retried with a fixed backoff; a non-2xx answer is
//! returned to the caller immediately as `RegistryUnavailable`.

use std::time::Duration;

use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, info, warn};

use super::types::{LookupRequest, RegistryParticipant};
use crate::signing::Signer;
use crate::types::{PolicyAgentError, Result};

// =============================================================================
// Configuration
// =============================================================================

/// Registry client configuration, fixed at construction
#[derive(Debug, Clone)]
pub struct RegistryClientConfig {
    /// Lookup endpoint (e.g. "https://preprod.registry.ondc.org/v2.0/lookup")
    pub registry_url: String,
    /// Per-attempt request timeout (default: 30 seconds)
    pub request_timeout: Duration,
    /// Retries after the first attempt on transport failure (default: 3)
    pub max_retries: u32,
    /// Wait between attempts (default: 5 seconds)
    pub retry_wait: Duration,
    /// Lifetime of each request signature (default: 30 seconds)
    pub signature_ttl_secs: i64,
}

impl Default for RegistryClientConfig {
    fn default() -> Self {
        Self {
            registry_url: "https://preprod.registry.ondc.org/v2.0/lookup".to_string(),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_wait: Duration::from_secs(5),
            signature_ttl_secs: 30,
        }
    }
}

// =============================================================================
// Participant Source Trait (for dependency injection)
// =============================================================================

/// Anything that can list the live participants of a domain
#[async_trait::async_trait]
pub trait ParticipantSource: Send + Sync {
    /// Fetch the full live participant set for a domain
    async fn lookup(&self, domain: &str) -> Result<Vec<RegistryParticipant>>;
}

// =============================================================================
// Registry Client
// =============================================================================

/// HTTP client for the network registry
pub struct RegistryClient {
    config: RegistryClientConfig,
    signer: Signer,
    http_client: reqwest::Client,
}

impl RegistryClient {
    /// Create a registry client
    pub fn new(config: RegistryClientConfig, signer: Signer) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("policy-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PolicyAgentError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            signer,
            http_client,
        })
    }

    /// Send the signed lookup, retrying transport failures.
    ///
    /// The body is re-signed on every attempt so a retry never carries an
    /// expired signature window.
    async fn send_with_retry(&self, request: &LookupRequest) -> Result<reqwest::Response> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let (body, authorization) = self.signer.sign_json(
                request,
                Utc::now().timestamp(),
                self.config.signature_ttl_secs,
            )?;

            let sent = self
                .http_client
                .post(&self.config.registry_url)
                .header(CONTENT_TYPE, "application/json")
                .header(AUTHORIZATION, authorization)
                .body(body)
                .send()
                .await;

            match sent {
                Ok(response) => return Ok(response),
                Err(e) if attempt <= self.config.max_retries => {
                    warn!(
                        domain = %request.domain,
                        attempt = attempt,
                        error = %e,
                        "Registry lookup transport failure, retrying"
                    );
                    tokio::time::sleep(self.config.retry_wait).await;
                }
                Err(e) => {
                    return Err(PolicyAgentError::RegistryUnavailable(format!(
                        "lookup for {} failed after {} attempts: {}",
                        request.domain, attempt, e
                    )));
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl ParticipantSource for RegistryClient {
    async fn lookup(&self, domain: &str) -> Result<Vec<RegistryParticipant>> {
        let request = LookupRequest::sellers_in(domain);
        debug!(domain = %domain, url = %self.config.registry_url, "Registry lookup");

        let response = self.send_with_retry(&request).await?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PolicyAgentError::RegistryUnavailable(format!("Failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(PolicyAgentError::RegistryUnavailable(format!(
                "API request failed with status {}: {}",
                status.as_u16(),
                text
            )));
        }

        let participants = parse_lookup_response(&text)?;
        info!(
            domain = %domain,
            participants = participants.len(),
            "Registry lookup completed"
        );
        Ok(participants)
    }
}

/// Parse a lookup response body.
///
/// Records that do not match the participant shape are skipped so that one
/// malformed entry cannot hide the rest of the domain.
pub fn parse_lookup_response(body: &str) -> Result<Vec<RegistryParticipant>> {
    let records: Vec<serde_json::Value> = serde_json::from_str(body).map_err(|e| {
        PolicyAgentError::RegistryUnavailable(format!("Invalid lookup response: {e}"))
    })?;

    let mut participants = Vec::with_capacity(records.len());
    for record in records {
        let raw = record.to_string();
        match serde_json::from_value::<RegistryParticipant>(record) {
            Ok(mut participant) => {
                participant.raw = raw;
                participants.push(participant);
            }
            Err(e) => {
                warn!(error = %e, record = %raw, "Skipping malformed registry record");
            }
        }
    }

    Ok(participants)
}
