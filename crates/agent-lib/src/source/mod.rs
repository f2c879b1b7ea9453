//! Observation sources
//!
//! A source yields the current location readings for all tracked devices and
//! a modification marker the poll loop uses to skip unchanged snapshots.

mod findmy;

pub use findmy::{default_cache_path, parse_cache, FindMyCacheSource};

use crate::error::SourceError;
use crate::models::Observation;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub use async_trait::async_trait;

/// Opaque, comparable marker of the source's last modification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceMarker(SystemTime);

impl SourceMarker {
    pub fn from_system_time(time: SystemTime) -> Self {
        Self(time)
    }

    pub fn from_millis(millis: u64) -> Self {
        Self(UNIX_EPOCH + Duration::from_millis(millis))
    }

    /// Milliseconds since the Unix epoch, for logging
    pub fn as_millis(&self) -> u128 {
        self.0
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default()
    }
}

/// Trait for location observation sources
#[async_trait]
pub trait ObservationSource: Send + Sync {
    /// Current modification marker of the underlying snapshot
    async fn modification_marker(&self) -> Result<SourceMarker, SourceError>;

    /// Every observation currently present in the snapshot
    async fn current_observations(&self) -> Result<Vec<Observation>, SourceError>;

    /// Human-readable location of the source
    fn describe(&self) -> String;
}
