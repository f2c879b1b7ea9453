//! Agent library for location sync
//!
//! This crate provides the core functionality for:
//! - Reading device observations from a local cache
//! - Change detection against per-device cursors
//! - Delivery to the tracking service
//! - The poll loop that ties them together
//! - Pairing and credential storage
//! - Health checks and observability

pub mod controller;
pub mod credentials;
pub mod delivery;
pub mod detector;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod pairing;
pub mod source;

pub use controller::{
    ControllerConfig, ControllerStatus, CycleReport, CycleStatus, LoopState, LoopSummary,
    PollController, PollControllerBuilder, SleepTicker, Ticker,
};
pub use credentials::{CredentialStore, StoredCredentials};
pub use delivery::{DeliveryEngine, HttpClientConfig, HttpTrackerClient, TrackerApi};
pub use detector::{ChangeDetector, CursorPolicy};
pub use error::{ControllerError, CycleError, DeliveryError, PairingError, SourceError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{StructuredLogger, SyncMetrics};
pub use pairing::PairingClient;
pub use source::{FindMyCacheSource, ObservationSource, SourceMarker};
