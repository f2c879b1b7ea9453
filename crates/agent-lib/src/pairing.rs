//! One-shot pairing: trade a human-entered code for a bearer token

use crate::credentials::{CredentialStore, StoredCredentials};
use crate::delivery::{TrackerApi, DEFAULT_REQUEST_TIMEOUT};
use crate::error::PairingError;
use crate::models::AuthToken;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Exchanges pairing codes through a [`TrackerApi`]
pub struct PairingClient {
    api: Arc<dyn TrackerApi>,
    request_timeout: Duration,
}

impl PairingClient {
    pub fn new(api: Arc<dyn TrackerApi>) -> Self {
        Self {
            api,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Exchange `code` for a credential. Has no side effects on failure.
    pub async fn pair(&self, code: &str) -> Result<AuthToken, PairingError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(PairingError::EmptyCode);
        }

        info!("Pairing with server using code");
        tokio::time::timeout(self.request_timeout, self.api.claim_pairing(code))
            .await
            .unwrap_or_else(|_| {
                Err(PairingError::Network(format!(
                    "pairing request timed out after {:?}",
                    self.request_timeout
                )))
            })
    }

    /// Pair, persist the record, then activate the token on the client.
    ///
    /// Nothing is written unless pairing succeeds.
    pub async fn pair_and_store(
        &self,
        code: &str,
        store: &CredentialStore,
        server_url: &str,
    ) -> Result<AuthToken> {
        let token = self.pair(code).await.map_err(|e| {
            error!(error = %e, "Pairing failed");
            e
        })?;

        store
            .save(&StoredCredentials::new(&token, server_url))
            .context("Paired, but failed to save the token")?;
        self.api.activate_credential(token.clone()).await;

        info!(path = %store.path().display(), "Paired successfully, token saved");
        Ok(token)
    }
}
