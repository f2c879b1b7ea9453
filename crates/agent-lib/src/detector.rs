//! Change detection against per-device delivery cursors
//!
//! The detector owns the cursor table: device id to the last timestamp that
//! was classified new. Cursors only ever move forward.

use crate::models::{DeliveryOutcome, Observation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// When a device's cursor moves past a new observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorPolicy {
    /// Advance as soon as the observation is classified new (at-most-once)
    #[default]
    AdvanceOnDetect,
    /// Advance only once the server acknowledged it (at-least-once)
    AdvanceOnConfirm,
}

impl std::str::FromStr for CursorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "detect" | "advance_on_detect" => Ok(CursorPolicy::AdvanceOnDetect),
            "confirm" | "advance_on_confirm" => Ok(CursorPolicy::AdvanceOnConfirm),
            other => Err(format!(
                "unknown cursor policy '{}', expected 'detect' or 'confirm'",
                other
            )),
        }
    }
}

/// Result of classifying one snapshot
#[derive(Debug, Default)]
pub struct Detection {
    pub new: Vec<Observation>,
    pub stale: usize,
}

/// Partitions observations into new and stale
#[derive(Debug, Default)]
pub struct ChangeDetector {
    cursors: HashMap<String, i64>,
    policy: CursorPolicy,
}

impl ChangeDetector {
    pub fn new(policy: CursorPolicy) -> Self {
        Self {
            cursors: HashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> CursorPolicy {
        self.policy
    }

    /// Last timestamp recorded for a device
    pub fn cursor(&self, device_id: &str) -> Option<i64> {
        self.cursors.get(device_id).copied()
    }

    pub fn tracked_devices(&self) -> usize {
        self.cursors.len()
    }

    /// Classify observations in source order.
    ///
    /// An observation is new when its timestamp is strictly greater than the
    /// device's cursor (0 when unseen). Repeated devices ratchet within the
    /// call, so only strictly increasing readings pass.
    pub fn detect_new(&mut self, observations: Vec<Observation>) -> Detection {
        let mut detection = Detection::default();
        let mut staged: HashMap<String, i64> = HashMap::new();

        for obs in observations {
            let previous = staged
                .get(&obs.device_id)
                .or_else(|| self.cursors.get(&obs.device_id))
                .copied()
                .unwrap_or(0);

            if obs.timestamp > previous {
                info!(
                    event = "observation_new",
                    device_id = %obs.device_id,
                    latitude = obs.latitude,
                    longitude = obs.longitude,
                    observed_at = %obs.observed_at,
                    "New location"
                );
                match self.policy {
                    CursorPolicy::AdvanceOnDetect => {
                        self.cursors.insert(obs.device_id.clone(), obs.timestamp);
                    }
                    CursorPolicy::AdvanceOnConfirm => {
                        staged.insert(obs.device_id.clone(), obs.timestamp);
                    }
                }
                detection.new.push(obs);
            } else {
                debug!(
                    device_id = %obs.device_id,
                    latitude = obs.latitude,
                    longitude = obs.longitude,
                    observed_at = %obs.observed_at,
                    "Location unchanged"
                );
                detection.stale += 1;
            }
        }

        detection
    }

    /// Commit cursors for acknowledged deliveries.
    ///
    /// Only meaningful under [`CursorPolicy::AdvanceOnConfirm`]; with
    /// [`CursorPolicy::AdvanceOnDetect`] the cursors already moved.
    pub fn confirm(&mut self, outcomes: &[(Observation, DeliveryOutcome)]) {
        if self.policy != CursorPolicy::AdvanceOnConfirm {
            return;
        }

        for (obs, outcome) in outcomes {
            if !outcome.is_acknowledged() {
                continue;
            }
            let cursor = self.cursors.entry(obs.device_id.clone()).or_insert(0);
            if obs.timestamp > *cursor {
                *cursor = obs.timestamp;
            }
        }
    }
}
