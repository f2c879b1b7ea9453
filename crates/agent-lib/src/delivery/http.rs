//! HTTP client for the tracking service
//!
//! Owns the active bearer credential. Every request except the health probe
//! carries it once present, and a new credential can be activated at runtime
//! after pairing without rebuilding the client.

use super::schema::{
    decode, BatchAck, BatchResponse, ClaimRequest, ClaimResponse, LocationUpdate, UpdateAck,
    UpdateResponse,
};
use super::{async_trait, TrackerApi};
use crate::error::{DeliveryError, PairingError};
use crate::models::AuthToken;
use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";

const HEALTH_PATH: &str = "health";
const UPDATE_PATH: &str = "api/locations/update";
const BATCH_UPDATE_PATH: &str = "api/locations/batch-update";
const PAIRING_CLAIM_PATH: &str = "api/pairing/claim";

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Tracking service base URL (e.g., "https://tracker.example.com")
    pub server_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// reqwest-backed [`TrackerApi`] implementation
pub struct HttpTrackerClient {
    client: Client,
    base_url: Url,
    credential: RwLock<Option<AuthToken>>,
}

impl HttpTrackerClient {
    /// Create a new client, optionally with a stored credential
    pub fn new(config: HttpClientConfig, credential: Option<AuthToken>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("locsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        let mut base_url = Url::parse(&config.server_url)
            .with_context(|| format!("Invalid server URL: {}", config.server_url))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        if credential.is_some() {
            info!("Auth token loaded; updates will be authenticated");
        }

        Ok(Self {
            client,
            base_url,
            credential: RwLock::new(credential),
        })
    }

    /// Create a client with default timeouts for the given server
    pub fn with_server(server_url: &str, credential: Option<AuthToken>) -> Result<Self> {
        let config = HttpClientConfig {
            server_url: server_url.to_string(),
            ..Default::default()
        };
        Self::new(config, credential)
    }

    /// Base URL without the trailing slash
    pub fn server_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    pub async fn has_credential(&self) -> bool {
        self.credential.read().await.is_some()
    }

    fn endpoint(&self, path: &str) -> Result<Url, DeliveryError> {
        self.base_url
            .join(path)
            .map_err(|e| DeliveryError::Network(format!("invalid endpoint {}: {}", path, e)))
    }

    async fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.credential.read().await.as_ref() {
            Some(token) => builder.bearer_auth(token.as_str()),
            None => builder,
        }
    }

    /// Send a JSON POST and return the status and raw body
    async fn post_json<B: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(u16, String), DeliveryError> {
        let url = self.endpoint(path)?;
        let request = self.authorized(self.client.post(url).json(body)).await;

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(DeliveryError::ServerRejected {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok((status.as_u16(), text))
    }
}

#[async_trait]
impl TrackerApi for HttpTrackerClient {
    async fn health(&self) -> Result<serde_json::Value, DeliveryError> {
        let url = self.endpoint(HEALTH_PATH)?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(DeliveryError::ServerRejected {
                status: status.as_u16(),
                body: text,
            });
        }

        decode(&text)
    }

    async fn update_location(&self, update: &LocationUpdate) -> Result<UpdateAck, DeliveryError> {
        debug!(device_id = %update.device_id, "Sending single location update");
        let (status, body) = self.post_json(UPDATE_PATH, update).await?;
        decode::<UpdateResponse>(&body)?.into_ack(status)
    }

    async fn batch_update(&self, updates: &[LocationUpdate]) -> Result<BatchAck, DeliveryError> {
        debug!(count = updates.len(), "Sending batch location update");
        let (status, body) = self.post_json(BATCH_UPDATE_PATH, updates).await?;
        decode::<BatchResponse>(&body)?.into_ack(status)
    }

    async fn claim_pairing(&self, code: &str) -> Result<AuthToken, PairingError> {
        let url = self
            .endpoint(PAIRING_CLAIM_PATH)
            .map_err(|e| PairingError::Network(e.to_string()))?;
        let request = self
            .authorized(self.client.post(url).json(&ClaimRequest { code }))
            .await;

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        if !(200..300).contains(&status) {
            return Err(PairingError::Rejected { status, body });
        }

        let claim: ClaimResponse = serde_json::from_str(&body)
            .map_err(|_| PairingError::Unparsable {
                status,
                body: body.clone(),
            })?;

        match claim.token {
            Some(token) if !token.is_empty() => Ok(AuthToken::new(token)),
            _ => {
                debug!(
                    error = ?claim.error,
                    message = ?claim.message,
                    "Pairing response carried no token"
                );
                Err(PairingError::MissingToken)
            }
        }
    }

    async fn activate_credential(&self, token: AuthToken) {
        *self.credential.write().await = Some(token);
        info!("Activated new auth token");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn update(device: &str) -> LocationUpdate {
        LocationUpdate {
            device_id: device.to_string(),
            latitude: 1.0,
            longitude: 2.0,
            timestamp: "1970-01-01T00:00:01.000Z".to_string(),
        }
    }

    #[test]
    fn test_http_client_config_default() {
        let config = HttpClientConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
    }

    #[test]
    fn test_invalid_server_url() {
        assert!(HttpTrackerClient::with_server("not a url", None).is_err());
    }

    #[test]
    fn test_base_url_with_path_prefix() {
        let client = HttpTrackerClient::with_server("https://host.example/tracker/", None).unwrap();
        assert_eq!(client.server_url(), "https://host.example/tracker");
        assert_eq!(
            client.endpoint(UPDATE_PATH).unwrap().as_str(),
            "https://host.example/tracker/api/locations/update"
        );

        let client = HttpTrackerClient::with_server("https://host.example/tracker", None).unwrap();
        assert_eq!(
            client.endpoint(HEALTH_PATH).unwrap().as_str(),
            "https://host.example/tracker/health"
        );
    }

    #[tokio::test]
    async fn test_health_ok() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/health")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status": "ok"}"#)
            .create_async()
            .await;

        let client =
            HttpTrackerClient::with_server(&server.url(), Some(AuthToken::new("tok"))).unwrap();
        let body = client.health().await.unwrap();

        assert_eq!(body, json!({"status": "ok"}));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_health_server_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(503)
            .with_body("down")
            .create_async()
            .await;

        let client = HttpTrackerClient::with_server(&server.url(), None).unwrap();
        assert!(matches!(
            client.health().await,
            Err(DeliveryError::ServerRejected { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_update_location_sends_bearer_and_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/locations/update")
            .match_header("authorization", "Bearer secret")
            .match_body(Matcher::Json(json!({
                "deviceId": "X",
                "latitude": 1.0,
                "longitude": 2.0,
                "timestamp": "1970-01-01T00:00:01.000Z"
            })))
            .with_status(200)
            .with_body(r#"{"success": true, "isNew": true}"#)
            .create_async()
            .await;

        let client =
            HttpTrackerClient::with_server(&server.url(), Some(AuthToken::new("secret"))).unwrap();
        let ack = client.update_location(&update("X")).await.unwrap();

        assert!(ack.is_new);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_update_location_without_credential_has_no_auth_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/locations/update")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_body(r#"{"success": true, "isNew": false}"#)
            .create_async()
            .await;

        let client = HttpTrackerClient::with_server(&server.url(), None).unwrap();
        let ack = client.update_location(&update("X")).await.unwrap();

        assert!(!ack.is_new);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_batch_update_sends_array() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/locations/batch-update")
            .match_body(Matcher::PartialJson(json!([
                {"deviceId": "A"},
                {"deviceId": "B"}
            ])))
            .with_status(200)
            .with_body(r#"{"success": true, "processed": 2, "newLocations": 2}"#)
            .create_async()
            .await;

        let client = HttpTrackerClient::with_server(&server.url(), None).unwrap();
        let ack = client
            .batch_update(&[update("A"), update("B")])
            .await
            .unwrap();

        assert_eq!(
            ack,
            BatchAck {
                processed: 2,
                new_locations: 2
            }
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_batch_update_non_2xx_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/locations/batch-update")
            .with_status(500)
            .with_body("internal error")
            .create_async()
            .await;

        let client = HttpTrackerClient::with_server(&server.url(), None).unwrap();
        match client.batch_update(&[update("A"), update("B")]).await {
            Err(DeliveryError::ServerRejected { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "internal error");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_claim_pairing_success_and_activation() {
        let mut server = mockito::Server::new_async().await;
        let claim = server
            .mock("POST", "/api/pairing/claim")
            .match_body(Matcher::Json(json!({"code": "ABC123"})))
            .with_status(200)
            .with_body(r#"{"token": "fresh-token"}"#)
            .create_async()
            .await;
        let update_mock = server
            .mock("POST", "/api/locations/update")
            .match_header("authorization", "Bearer fresh-token")
            .with_status(200)
            .with_body(r#"{"success": true, "isNew": true}"#)
            .create_async()
            .await;

        let client = HttpTrackerClient::with_server(&server.url(), None).unwrap();
        assert!(!client.has_credential().await);

        let token = client.claim_pairing("ABC123").await.unwrap();
        assert_eq!(token.as_str(), "fresh-token");
        claim.assert_async().await;

        client.activate_credential(token).await;
        assert!(client.has_credential().await);

        client.update_location(&update("X")).await.unwrap();
        update_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_claim_pairing_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/pairing/claim")
            .with_status(401)
            .with_body("invalid code")
            .create_async()
            .await;

        let client = HttpTrackerClient::with_server(&server.url(), None).unwrap();
        match client.claim_pairing("WRONG").await {
            Err(PairingError::Rejected { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid code");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_claim_pairing_unparsable_and_missing_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/pairing/claim")
            .match_body(Matcher::Json(json!({"code": "HTML"})))
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;
        server
            .mock("POST", "/api/pairing/claim")
            .match_body(Matcher::Json(json!({"code": "EMPTY"})))
            .with_status(200)
            .with_body(r#"{"message": "already claimed"}"#)
            .create_async()
            .await;

        let client = HttpTrackerClient::with_server(&server.url(), None).unwrap();
        assert!(matches!(
            client.claim_pairing("HTML").await,
            Err(PairingError::Unparsable { status: 200, .. })
        ));
        assert!(matches!(
            client.claim_pairing("EMPTY").await,
            Err(PairingError::MissingToken)
        ));
    }
}
