//! Error taxonomy for the sync pipeline
//!
//! Source and delivery errors never escape a single poll cycle; they are
//! folded into the controller's failure accounting. Pairing errors go back to
//! the caller. Only [`ControllerError`] ends the loop.

use std::time::Duration;
use thiserror::Error;

/// Failure reading the observation source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("observation source unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied reading observation source: {0}")]
    Denied(String),

    #[error("observation source is malformed: {0}")]
    Malformed(String),
}

impl SourceError {
    /// Short label used in metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Unavailable(_) => "unavailable",
            SourceError::Denied(_) => "denied",
            SourceError::Malformed(_) => "malformed",
        }
    }
}

/// Failure talking to the tracking service
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("server rejected request ({status}): {body}")]
    ServerRejected { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        DeliveryError::Network(err.to_string())
    }
}

/// Failure exchanging a pairing code for a token
#[derive(Debug, Clone, Error)]
pub enum PairingError {
    #[error("pairing code is empty")]
    EmptyCode,

    #[error("pairing request failed: {0}")]
    Network(String),

    #[error("pairing rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("unparsable pairing response ({status}): {body}")]
    Unparsable { status: u16, body: String },

    #[error("pairing response did not include a token")]
    MissingToken,
}

impl From<reqwest::Error> for PairingError {
    fn from(err: reqwest::Error) -> Self {
        PairingError::Network(err.to_string())
    }
}

/// Why a single cycle failed
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Conditions that stop the poll loop
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("tracking service unreachable: {0}")]
    Unreachable(#[source] DeliveryError),

    #[error("too many consecutive failures ({count}), stopping")]
    TooManyConsecutiveFailures { count: u32 },
}
