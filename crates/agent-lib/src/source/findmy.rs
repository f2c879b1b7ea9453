//! Find My location cache reader
//!
//! The cache is a JSON document, either a bare array of items or an object
//! with an `items` array. Each item carries an identifier and an optional
//! `location` object with millisecond `timeStamp`, `latitude` and `longitude`.

use super::{async_trait, ObservationSource, SourceMarker};
use crate::error::SourceError;
use crate::models::Observation;
use serde::Deserialize;
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

const CACHE_RELATIVE_PATH: &str = "Library/Caches/com.apple.findmy.fmipcore/Items.data";

/// Default cache location under the user's home directory
pub fn default_cache_path() -> Option<PathBuf> {
    dirs_next::home_dir().map(|home| home.join(CACHE_RELATIVE_PATH))
}

#[derive(Debug, Deserialize)]
struct CacheItem {
    id: Option<String>,
    identifier: Option<String>,
    location: Option<CacheLocation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheLocation {
    time_stamp: Option<f64>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    position_type: Option<String>,
    is_old: Option<bool>,
}

impl CacheItem {
    fn device_id(&self) -> String {
        [&self.id, &self.identifier]
            .into_iter()
            .flatten()
            .find(|id| !id.is_empty())
            .cloned()
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn into_observation(self) -> Option<Observation> {
        let device_id = self.device_id();
        let location = self.location?;

        // Safe locations are geofence anchors, not position fixes
        if location.position_type.as_deref() == Some("safeLocation") {
            return None;
        }
        if location.is_old.unwrap_or(false) {
            return None;
        }

        let timestamp = location.time_stamp?;
        let latitude = location.latitude?;
        let longitude = location.longitude?;

        Some(Observation::new(
            device_id,
            latitude,
            longitude,
            timestamp as i64,
        ))
    }
}

/// Parse raw cache bytes into observations.
///
/// Only invalid JSON is an error. A top level that is neither an array nor
/// an object with an `items` array yields nothing, and items that do not fit
/// the expected shape are skipped one by one.
pub fn parse_cache(bytes: &[u8]) -> Result<Vec<Observation>, serde_json::Error> {
    let items = match serde_json::from_slice::<Value>(bytes)? {
        Value::Array(items) => items,
        Value::Object(mut doc) => match doc.remove("items") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<CacheItem>(item) {
            Ok(item) => item.into_observation(),
            Err(e) => {
                debug!(error = %e, "Skipping unrecognised cache item");
                None
            }
        })
        .collect())
}

/// Observation source backed by the Find My items cache file
#[derive(Debug, Clone)]
pub struct FindMyCacheSource {
    path: PathBuf,
}

impl FindMyCacheSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn map_io_error(&self, err: io::Error) -> SourceError {
        let detail = format!("{}: {}", self.path.display(), err);
        match err.kind() {
            io::ErrorKind::NotFound => SourceError::Unavailable(detail),
            io::ErrorKind::PermissionDenied => {
                error!(
                    path = %self.path.display(),
                    "Permission denied reading location cache; grant Full Disk Access to the terminal running the agent"
                );
                SourceError::Denied(detail)
            }
            _ => SourceError::Unavailable(detail),
        }
    }
}

#[async_trait]
impl ObservationSource for FindMyCacheSource {
    async fn modification_marker(&self) -> Result<SourceMarker, SourceError> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| self.map_io_error(e))?;
        let modified = metadata.modified().map_err(|e| self.map_io_error(e))?;
        Ok(SourceMarker::from_system_time(modified))
    }

    async fn current_observations(&self) -> Result<Vec<Observation>, SourceError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| self.map_io_error(e))?;

        parse_cache(&bytes).map_err(|e| {
            debug!(
                path = %self.path.display(),
                "Cache may be binary or in an unexpected format"
            );
            SourceError::Malformed(format!("{}: {}", self.path.display(), e))
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
