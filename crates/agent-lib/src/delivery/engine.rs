//! Delivery engine
//!
//! Sends one cycle's new observations in at most one request: nothing for an
//! empty set, the single-update endpoint for one observation, the batch
//! endpoint otherwise. Never retries; the poll loop retries at cycle
//! granularity.

use super::schema::{BatchAck, LocationUpdate};
use super::TrackerApi;
use crate::error::DeliveryError;
use crate::models::{DeliveryOutcome, Observation};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Upper bound on any single request to the tracking service
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Which transport a delivery used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPath {
    /// Nothing to send, no request made
    Skipped,
    Single,
    Batch,
}

/// Per-observation results of one delivery
#[derive(Debug)]
pub struct DeliveryReport {
    pub path: DeliveryPath,
    pub outcomes: Vec<(Observation, DeliveryOutcome)>,
    /// Server counts, batch path only
    pub batch: Option<BatchAck>,
    /// Transport or protocol error behind any `Failed` outcome
    pub error: Option<DeliveryError>,
    pub elapsed: Duration,
}

impl DeliveryReport {
    fn skipped() -> Self {
        Self {
            path: DeliveryPath::Skipped,
            outcomes: Vec::new(),
            batch: None,
            error: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn count(&self, outcome: DeliveryOutcome) -> usize {
        self.outcomes.iter().filter(|(_, o)| *o == outcome).count()
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Sends new observations and classifies the outcome of each
#[derive(Clone)]
pub struct DeliveryEngine {
    api: Arc<dyn TrackerApi>,
    request_timeout: Duration,
}

impl DeliveryEngine {
    pub fn new(api: Arc<dyn TrackerApi>) -> Self {
        Self::with_timeout(api, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(api: Arc<dyn TrackerApi>, request_timeout: Duration) -> Self {
        Self {
            api,
            request_timeout,
        }
    }

    pub fn api(&self) -> &Arc<dyn TrackerApi> {
        &self.api
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    async fn bounded<T>(
        &self,
        request: impl Future<Output = Result<T, DeliveryError>>,
    ) -> Result<T, DeliveryError> {
        tokio::time::timeout(self.request_timeout, request)
            .await
            .unwrap_or(Err(DeliveryError::Timeout(self.request_timeout)))
    }

    /// Probe the service's health endpoint
    pub async fn check_health(&self) -> Result<serde_json::Value, DeliveryError> {
        self.bounded(self.api.health()).await
    }

    /// Deliver a cycle's new observations
    pub async fn deliver(&self, observations: Vec<Observation>) -> DeliveryReport {
        match observations.len() {
            0 => DeliveryReport::skipped(),
            1 => self.deliver_single(observations).await,
            _ => self.deliver_batch(observations).await,
        }
    }

    async fn deliver_single(&self, observations: Vec<Observation>) -> DeliveryReport {
        let start = Instant::now();
        let update = LocationUpdate::from(&observations[0]);
        let result = self.bounded(self.api.update_location(&update)).await;
        let elapsed = start.elapsed();

        let (outcome, error) = match result {
            Ok(ack) if ack.is_new => (DeliveryOutcome::Stored, None),
            Ok(_) => (DeliveryOutcome::Duplicate, None),
            Err(e) => {
                error!(device_id = %update.device_id, error = %e, "Failed to send location update");
                (DeliveryOutcome::Failed, Some(e))
            }
        };

        DeliveryReport {
            path: DeliveryPath::Single,
            outcomes: observations.into_iter().map(|o| (o, outcome)).collect(),
            batch: None,
            error,
            elapsed,
        }
    }

    async fn deliver_batch(&self, observations: Vec<Observation>) -> DeliveryReport {
        let start = Instant::now();
        let updates: Vec<LocationUpdate> = observations.iter().map(LocationUpdate::from).collect();
        let result = self.bounded(self.api.batch_update(&updates)).await;
        let elapsed = start.elapsed();

        match result {
            Ok(ack) => {
                info!(
                    processed = ack.processed,
                    new_locations = ack.new_locations,
                    "Sent batch update"
                );
                // The batch reply only carries counts, so the whole batch
                // shares one outcome. A mixed batch is reported as Stored even
                // for items the server already had, so redelivered readings
                // are not always reported Duplicate on this path.
                if ack.new_locations > 0 && ack.new_locations < ack.processed {
                    warn!(
                        processed = ack.processed,
                        new_locations = ack.new_locations,
                        "Batch partly duplicate; reporting every item as stored"
                    );
                }
                let outcome = if ack.new_locations == 0 {
                    DeliveryOutcome::Duplicate
                } else {
                    DeliveryOutcome::Stored
                };
                DeliveryReport {
                    path: DeliveryPath::Batch,
                    outcomes: observations.into_iter().map(|o| (o, outcome)).collect(),
                    batch: Some(ack),
                    error: None,
                    elapsed,
                }
            }
            Err(e) => {
                error!(count = updates.len(), error = %e, "Batch update failed");
                DeliveryReport {
                    path: DeliveryPath::Batch,
                    outcomes: observations
                        .into_iter()
                        .map(|o| (o, DeliveryOutcome::Failed))
                        .collect(),
                    batch: None,
                    error: Some(e),
                    elapsed,
                }
            }
        }
    }
}
