//! Registry client tests against a wiremock registry
//!
//! Covers the signed request shape, error mapping, and retry behaviour.

mod common;

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signature, SigningKey, Verifier};
use serde_json::json;
use wiremock::matchers::{body_json, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{test_private_key, DOMAIN};
use policy_agent::registry::{ParticipantSource, RegistryClient, RegistryClientConfig};
use policy_agent::signing::{signing_string, Signer, SignerConfig};
use policy_agent::types::PolicyAgentError;

fn signer(private_key: Option<String>) -> Signer {
    Signer::new(SignerConfig {
        private_key,
        subscriber_id: "agent.example.com".to_string(),
        unique_key_id: "ukid-7".to_string(),
    })
}

fn client(url: String, private_key: Option<String>) -> RegistryClient {
    client_with_timeout(url, private_key, Duration::from_secs(5))
}

fn client_with_timeout(url: String, private_key: Option<String>, timeout: Duration) -> RegistryClient {
    RegistryClient::new(
        RegistryClientConfig {
            registry_url: url,
            request_timeout: timeout,
            max_retries: 2,
            retry_wait: Duration::from_millis(10),
            signature_ttl_secs: 30,
        },
        signer(private_key),
    )
    .unwrap()
}

/// Pull `name="value"` out of a Signature header
fn header_param<'a>(header: &'a str, name: &str) -> &'a str {
    let marker = format!("{}=\"", name);
    let start = header.find(&marker).unwrap() + marker.len();
    let len = header[start..].find('"').unwrap();
    &header[start..start + len]
}

// =============================================================================
// Signed lookup
// =============================================================================

#[tokio::test]
async fn test_lookup_is_signed_and_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2.0/lookup"))
        .and(header_exists("authorization"))
        .and(body_json(json!({ "country": "IND", "type": "BPP", "domain": DOMAIN })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "subscriber_id": "seller-a.example.com",
                "subscriber_url": "https://seller-a.example.com/ondc",
                "domain": DOMAIN,
                "city": "std:080",
                "country": "IND",
                "status": "SUBSCRIBED",
                "valid_from": "2024-01-01T00:00:00.000Z",
                "valid_until": "2030-01-01T00:00:00.000Z"
            },
            { "subscriber_id": "seller-b.example.com", "status": "SUBSCRIBED" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let registry = client(format!("{}/v2.0/lookup", server.uri()), Some(test_private_key()));
    let participants = registry.lookup(DOMAIN).await.unwrap();

    assert_eq!(participants.len(), 2);
    assert_eq!(participants[0].subscriber_id, "seller-a.example.com");
    assert_eq!(
        participants[0].subscriber_url.as_deref(),
        Some("https://seller-a.example.com/ondc")
    );
    assert!(participants[1].subscriber_url.is_none());

    let received = server.received_requests().await.unwrap();
    let request = &received[0];
    let header = request
        .headers
        .get("authorization")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    assert!(header.starts_with(r#"Signature keyId="agent.example.com|ukid-7|ed25519""#));
    assert_eq!(header_param(&header, "headers"), "(created) (expires) digest");

    let created: i64 = header_param(&header, "created").parse().unwrap();
    let expires: i64 = header_param(&header, "expires").parse().unwrap();
    assert_eq!(expires - created, 30);

    // The signature covers the exact bytes on the wire
    let message = signing_string(&request.body, created, expires);
    let sig_bytes: [u8; 64] = STANDARD
        .decode(header_param(&header, "signature"))
        .unwrap()
        .try_into()
        .unwrap();
    let verifying_key = SigningKey::from_bytes(&[7u8; 32]).verifying_key();
    verifying_key
        .verify(message.as_bytes(), &Signature::from_bytes(&sig_bytes))
        .unwrap();
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_non_success_status_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("signature expired"))
        .expect(1)
        .mount(&server)
        .await;

    let registry = client(server.uri(), Some(test_private_key()));
    let err = registry.lookup(DOMAIN).await.unwrap_err();

    match err {
        PolicyAgentError::RegistryUnavailable(msg) => {
            assert!(msg.contains("401"), "{}", msg);
            assert!(msg.contains("signature expired"), "{}", msg);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_transport_failure_exhausts_retries() {
    let registry = client("http://127.0.0.1:1/lookup".to_string(), Some(test_private_key()));
    let err = registry.lookup(DOMAIN).await.unwrap_err();

    match err {
        PolicyAgentError::RegistryUnavailable(msg) => {
            assert!(msg.contains("after 3 attempts"), "{}", msg);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_timeout_is_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_secs(2)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{ "subscriber_id": "seller-a.example.com" }])),
        )
        .mount(&server)
        .await;

    let registry = client_with_timeout(
        server.uri(),
        Some(test_private_key()),
        Duration::from_millis(200),
    );
    let participants = registry.lookup(DOMAIN).await.unwrap();
    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0].subscriber_id, "seller-a.example.com");

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 2);
    // Each attempt carries its own signature
    assert!(received
        .iter()
        .all(|r| r.headers.get("authorization").is_some()));
}

#[tokio::test]
async fn test_missing_key_fails_before_sending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let registry = client(server.uri(), None);
    let err = registry.lookup(DOMAIN).await.unwrap_err();
    assert!(matches!(err, PolicyAgentError::Configuration(_)));
}

#[tokio::test]
async fn test_invalid_body_is_registry_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let registry = client(server.uri(), Some(test_private_key()));
    let err = registry.lookup(DOMAIN).await.unwrap_err();
    assert!(matches!(err, PolicyAgentError::RegistryUnavailable(_)));
}
