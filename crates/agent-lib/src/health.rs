//! Component health for the sync agent
//!
//! The poll loop reports the state of the observation source, the delivery
//! path and itself here; the daemon exposes it on `/healthz` and `/readyz`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Failing, but the loop is still retrying
    Degraded,
    /// Stopped for good
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub updated_at: i64,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const SOURCE: &str = "observation_source";
    pub const DELIVERY: &str = "delivery";
    pub const POLL_LOOP: &str = "poll_loop";
}

/// Shared registry of component health; clones see the same state
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    inner: Arc<RwLock<RegistryState>>,
}

#[derive(Debug, Default)]
struct RegistryState {
    components: BTreeMap<String, ComponentHealth>,
    ready: bool,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn set(&self, name: &str, status: ComponentStatus, message: Option<String>) {
        self.inner
            .write()
            .await
            .components
            .insert(name.to_string(), ComponentHealth::with_status(status, message));
    }

    pub async fn register(&self, name: &str) {
        self.set(name, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_healthy(&self, name: &str) {
        self.set(name, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.set(name, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.set(name, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    pub async fn set_ready(&self, ready: bool) {
        self.inner.write().await.ready = ready;
    }

    /// Worst component status wins
    pub async fn health(&self) -> HealthResponse {
        let components = self.inner.read().await.components.clone();
        let status = components
            .values()
            .map(|c| c.status)
            .max_by_key(|s| match s {
                ComponentStatus::Healthy => 0,
                ComponentStatus::Degraded => 1,
                ComponentStatus::Unhealthy => 2,
            })
            .unwrap_or(ComponentStatus::Healthy);
        HealthResponse { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = self.inner.read().await.ready;
        let health = self.health().await;

        let reason = if !ready {
            Some("Server connectivity not yet verified".to_string())
        } else if health.status == ComponentStatus::Unhealthy {
            Some("Poll loop stopped".to_string())
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_registry_is_healthy_but_not_ready() {
        let registry = HealthRegistry::new();

        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert!(readiness.reason.is_some());
    }

    #[tokio::test]
    async fn test_worst_component_wins() {
        let registry = HealthRegistry::new();
        registry.register(components::SOURCE).await;
        registry.register(components::DELIVERY).await;

        registry
            .set_degraded(components::SOURCE, "permission denied")
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);

        registry
            .set_unhealthy(components::DELIVERY, "aborted")
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);

        registry.set_healthy(components::DELIVERY).await;
        registry.set_healthy(components::SOURCE).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_not_ready_once_loop_stops() {
        let registry = HealthRegistry::new();
        registry.register(components::POLL_LOOP).await;
        registry.set_ready(true).await;
        assert!(registry.readiness().await.ready);

        registry
            .set_unhealthy(components::POLL_LOOP, "too many failures")
            .await;
        assert!(!registry.readiness().await.ready);
    }
}
