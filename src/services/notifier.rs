//! Seller Notifier
//!
//! Sends the buyer's `/search` payload to a seller's callback endpoint and
//! classifies the answer.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::types::{PolicyAgentError, Result};

/// Reason recorded when a NACK carries no `error` object
pub const DEFAULT_NACK_REASON: &str = "NACK received from seller";

/// Notifier configuration, fixed at construction
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Per-seller request timeout (default: 60 seconds, no retry)
    pub request_timeout: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Raw answer from a seller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerResponse {
    pub status: u16,
    pub body: String,
}

/// What a seller's answer means for the access policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerOutcome {
    Ack,
    Nack { reason: String },
    /// Non-2xx status
    Error { reason: String },
    /// 2xx body that is neither ACK nor NACK
    Unrecognized,
}

// =============================================================================
// Seller Notifier Trait (for dependency injection)
// =============================================================================

#[async_trait::async_trait]
pub trait SellerNotifier: Send + Sync {
    /// POST `payload` to `url`. A transport failure or timeout is
    /// `PeerUnreachable`; any HTTP answer is returned as-is.
    async fn search(&self, url: &str, payload: &serde_json::Value) -> Result<PeerResponse>;
}

// =============================================================================
// HTTP implementation
// =============================================================================

pub struct HttpSellerNotifier {
    http_client: reqwest::Client,
}

impl HttpSellerNotifier {
    pub fn new(config: NotifierConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("policy-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PolicyAgentError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { http_client })
    }
}

#[async_trait::async_trait]
impl SellerNotifier for HttpSellerNotifier {
    async fn search(&self, url: &str, payload: &serde_json::Value) -> Result<PeerResponse> {
        let response = self
            .http_client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| PolicyAgentError::PeerUnreachable(format!("{}: {}", url, e)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| PolicyAgentError::PeerUnreachable(format!("{}: failed to read body: {}", url, e)))?;

        debug!(url = %url, status = status, "Seller answered");
        Ok(PeerResponse { status, body })
    }
}

/// Build the `/search` endpoint from a seller's registered callback URL.
///
/// A missing scheme defaults to `https://`; `search` is appended to the
/// existing path with exactly one separator.
pub fn search_url(subscriber_url: &str) -> Result<String> {
    let trimmed = subscriber_url.trim();
    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let mut url = reqwest::Url::parse(&with_scheme).map_err(|e| {
        PolicyAgentError::PeerUnreachable(format!("invalid subscriber url {:?}: {}", subscriber_url, e))
    })?;

    let path = format!("{}/search", url.path().trim_end_matches('/'));
    url.set_path(&path);
    Ok(url.to_string())
}

#[derive(Deserialize)]
struct AckBody {
    #[serde(default)]
    message: Option<AckMessage>,
}

impl AckBody {
    fn status(&self) -> Option<&str> {
        self.message
            .as_ref()
            .and_then(|m| m.ack.as_ref())
            .map(|a| a.status.as_str())
    }
}

#[derive(Deserialize)]
struct NackBody {
    #[serde(default)]
    message: Option<AckMessage>,
    #[serde(default)]
    error: Option<PeerError>,
}

#[derive(Deserialize)]
struct AckMessage {
    #[serde(default)]
    ack: Option<Ack>,
}

#[derive(Deserialize)]
struct Ack {
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct PeerError {
    #[serde(default)]
    message: String,
}

/// Classify a seller's answer.
///
/// An ACK is read without looking at `error`. A NACK takes its reason from
/// `error.message` whenever an `error` object is present, even if empty.
pub fn classify_peer_response(response: &PeerResponse) -> PeerOutcome {
    if !(200..300).contains(&response.status) {
        return PeerOutcome::Error {
            reason: format!(
                "Received non-success status {} from seller. Body: {}",
                response.status, response.body
            ),
        };
    }

    if let Ok(ack) = serde_json::from_str::<AckBody>(&response.body) {
        if ack.status() == Some("ACK") {
            return PeerOutcome::Ack;
        }
    }

    let Ok(nack) = serde_json::from_str::<NackBody>(&response.body) else {
        return PeerOutcome::Unrecognized;
    };
    let is_nack = nack
        .message
        .as_ref()
        .and_then(|m| m.ack.as_ref())
        .is_some_and(|a| a.status == "NACK");
    if !is_nack {
        return PeerOutcome::Unrecognized;
    }

    PeerOutcome::Nack {
        reason: match nack.error {
            Some(error) => error.message,
            None => DEFAULT_NACK_REASON.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(body: &str) -> PeerResponse {
        PeerResponse {
            status: 200,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_search_url() {
        assert_eq!(search_url("seller.example.com").unwrap(), "https://seller.example.com/search");
        assert_eq!(
            search_url("https://seller.example.com/ondc/").unwrap(),
            "https://seller.example.com/ondc/search"
        );
        assert_eq!(
            search_url("http://localhost:8080/bpp").unwrap(),
            "http://localhost:8080/bpp/search"
        );
        assert!(search_url("").is_err());
    }

    #[test]
    fn test_ack_and_nack() {
        assert_eq!(
            classify_peer_response(&ok(r#"{"message":{"ack":{"status":"ACK"}}}"#)),
            PeerOutcome::Ack
        );
        assert_eq!(
            classify_peer_response(&ok(
                r#"{"message":{"ack":{"status":"NACK"}},"error":{"code":"40001","message":"not serviceable"}}"#
            )),
            PeerOutcome::Nack {
                reason: "not serviceable".to_string()
            }
        );
        assert_eq!(
            classify_peer_response(&ok(r#"{"message":{"ack":{"status":"NACK"}}}"#)),
            PeerOutcome::Nack {
                reason: DEFAULT_NACK_REASON.to_string()
            }
        );
    }

    #[test]
    fn test_ack_ignores_error_field() {
        assert_eq!(
            classify_peer_response(&ok(r#"{"message":{"ack":{"status":"ACK"}},"error":"none"}"#)),
            PeerOutcome::Ack
        );
        assert_eq!(
            classify_peer_response(&ok(
                r#"{"context":{"domain":"ONDC:RET10"},"message":{"ack":{"status":"ACK"}},"error":{"code":7}}"#
            )),
            PeerOutcome::Ack
        );
    }

    #[test]
    fn test_nack_error_object() {
        // An error object without a message yields an empty reason
        assert_eq!(
            classify_peer_response(&ok(r#"{"message":{"ack":{"status":"NACK"}},"error":{}}"#)),
            PeerOutcome::Nack {
                reason: String::new()
            }
        );
        assert_eq!(
            classify_peer_response(&ok(r#"{"message":{"ack":{"status":"NACK"}},"error":null}"#)),
            PeerOutcome::Nack {
                reason: DEFAULT_NACK_REASON.to_string()
            }
        );
        // A NACK whose error is not an object cannot be decoded
        assert_eq!(
            classify_peer_response(&ok(r#"{"message":{"ack":{"status":"NACK"}},"error":"busy"}"#)),
            PeerOutcome::Unrecognized
        );
    }

    #[test]
    fn test_unrecognized_and_error() {
        assert_eq!(classify_peer_response(&ok("<html>")), PeerOutcome::Unrecognized);
        assert_eq!(classify_peer_response(&ok(r#"{"message":{}}"#)), PeerOutcome::Unrecognized);

        let outcome = classify_peer_response(&PeerResponse {
            status: 503,
            body: "busy".to_string(),
        });
        assert_eq!(
            outcome,
            PeerOutcome::Error {
                reason: "Received non-success status 503 from seller. Body: busy".to_string()
            }
        );
    }
}
