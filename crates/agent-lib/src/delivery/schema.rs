//! Wire schemas for the tracking service
//!
//! Response types reject unknown fields. Required fields are validated when a
//! response is turned into an acknowledgement, so a half-formed reply is a
//! [`DeliveryError::MalformedResponse`] rather than a silent default.

use crate::error::DeliveryError;
use crate::models::Observation;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Per-location body for single and batch updates
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    pub device_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: String,
}

impl From<&Observation> for LocationUpdate {
    fn from(obs: &Observation) -> Self {
        Self {
            device_id: obs.device_id.clone(),
            latitude: obs.latitude,
            longitude: obs.longitude,
            timestamp: obs.observed_at.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimRequest<'a> {
    pub code: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateResponse {
    pub success: bool,
    pub is_new: Option<bool>,
    pub error: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BatchResponse {
    pub success: bool,
    pub processed: Option<u64>,
    pub new_locations: Option<u64>,
    pub error: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClaimResponse {
    pub token: Option<String>,
    pub error: Option<String>,
    pub message: Option<String>,
}

/// Validated reply to a single update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateAck {
    pub is_new: bool,
}

/// Validated reply to a batch update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchAck {
    pub processed: u64,
    pub new_locations: u64,
}

fn rejection(status: u16, error: Option<String>, message: Option<String>) -> DeliveryError {
    DeliveryError::ServerRejected {
        status,
        body: error
            .or(message)
            .unwrap_or_else(|| "success=false".to_string()),
    }
}

impl UpdateResponse {
    pub fn into_ack(self, status: u16) -> Result<UpdateAck, DeliveryError> {
        if !self.success {
            return Err(rejection(status, self.error, self.message));
        }
        let is_new = self.is_new.ok_or_else(|| {
            DeliveryError::MalformedResponse("update response missing 'isNew'".to_string())
        })?;
        Ok(UpdateAck { is_new })
    }
}

impl BatchResponse {
    pub fn into_ack(self, status: u16) -> Result<BatchAck, DeliveryError> {
        if !self.success {
            return Err(rejection(status, self.error, self.message));
        }
        match (self.processed, self.new_locations) {
            (Some(processed), Some(new_locations)) => Ok(BatchAck {
                processed,
                new_locations,
            }),
            _ => Err(DeliveryError::MalformedResponse(
                "batch response missing 'processed' or 'newLocations'".to_string(),
            )),
        }
    }
}

/// Decode a JSON body, mapping failures to a malformed-response error
pub fn decode<T: DeserializeOwned>(body: &str) -> Result<T, DeliveryError> {
    serde_json::from_str(body)
        .map_err(|e| DeliveryError::MalformedResponse(format!("{}: {}", e, body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_location_update_wire_shape() {
        let obs = Observation::new("X", 1.0, 2.0, 1000);
        let value = serde_json::to_value(LocationUpdate::from(&obs)).unwrap();

        assert_eq!(
            value,
            json!({
                "deviceId": "X",
                "latitude": 1.0,
                "longitude": 2.0,
                "timestamp": "1970-01-01T00:00:01.000Z"
            })
        );
    }

    #[test]
    fn test_update_ack_new_and_duplicate() {
        let stored: UpdateResponse = decode(r#"{"success": true, "isNew": true}"#).unwrap();
        assert_eq!(stored.into_ack(200).unwrap(), UpdateAck { is_new: true });

        let duplicate: UpdateResponse = decode(r#"{"success": true, "isNew": false}"#).unwrap();
        assert_eq!(duplicate.into_ack(200).unwrap(), UpdateAck { is_new: false });
    }

    #[test]
    fn test_update_missing_is_new_is_malformed() {
        let response: UpdateResponse = decode(r#"{"success": true}"#).unwrap();
        assert!(matches!(
            response.into_ack(200),
            Err(DeliveryError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_update_rejection_carries_reason() {
        let response: UpdateResponse =
            decode(r#"{"success": false, "error": "unknown device"}"#).unwrap();
        match response.into_ack(200) {
            Err(DeliveryError::ServerRejected { status, body }) => {
                assert_eq!(status, 200);
                assert_eq!(body, "unknown device");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_fields_are_malformed() {
        let result = decode::<UpdateResponse>(r#"{"success": true, "isNew": true, "extra": 1}"#);
        assert!(matches!(result, Err(DeliveryError::MalformedResponse(_))));
    }

    #[test]
    fn test_missing_success_is_malformed() {
        let result = decode::<BatchResponse>(r#"{"processed": 2, "newLocations": 1}"#);
        assert!(matches!(result, Err(DeliveryError::MalformedResponse(_))));
    }

    #[test]
    fn test_batch_ack_requires_counts() {
        let response: BatchResponse =
            decode(r#"{"success": true, "processed": 2, "newLocations": 1}"#).unwrap();
        assert_eq!(
            response.into_ack(200).unwrap(),
            BatchAck {
                processed: 2,
                new_locations: 1
            }
        );

        let response: BatchResponse = decode(r#"{"success": true, "processed": 2}"#).unwrap();
        assert!(matches!(
            response.into_ack(200),
            Err(DeliveryError::MalformedResponse(_))
        ));
    }
}
