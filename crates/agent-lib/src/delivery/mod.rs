//! Delivery of new observations to the tracking service
//!
//! This module provides:
//! - The [`TrackerApi`] seam over the remote service contract
//! - A reqwest implementation with bearer-token auth
//! - The delivery engine choosing single vs batch transport and
//!   classifying each observation's outcome

mod engine;
mod http;
mod schema;

pub use engine::{DeliveryEngine, DeliveryPath, DeliveryReport, DEFAULT_REQUEST_TIMEOUT};
pub use http::{HttpClientConfig, HttpTrackerClient, DEFAULT_SERVER_URL};
pub use schema::{
    BatchAck, BatchResponse, ClaimResponse, LocationUpdate, UpdateAck, UpdateResponse,
};

use crate::error::{DeliveryError, PairingError};
use crate::models::AuthToken;

pub use async_trait::async_trait;

/// Request/response contract of the tracking service
#[async_trait]
pub trait TrackerApi: Send + Sync {
    /// Lightweight reachability probe, never authenticated
    async fn health(&self) -> Result<serde_json::Value, DeliveryError>;

    /// Send one location
    async fn update_location(&self, update: &LocationUpdate) -> Result<UpdateAck, DeliveryError>;

    /// Send several locations in one request
    async fn batch_update(&self, updates: &[LocationUpdate]) -> Result<BatchAck, DeliveryError>;

    /// Exchange a pairing code for a bearer token
    async fn claim_pairing(&self, code: &str) -> Result<AuthToken, PairingError>;

    /// Attach a credential to all subsequent authenticated requests
    async fn activate_credential(&self, token: AuthToken);
}
