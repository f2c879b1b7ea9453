//! Poll loop controller
//!
//! Drives source -> change detector -> delivery engine on a fixed cadence.
//! One cycle runs to completion before the next starts. Shutdown is only
//! honoured between cycles, so the cursor table never disagrees with what was
//! actually sent.

mod ticker;


pub use ticker::{SleepTicker, Ticker};

use crate::delivery::{DeliveryEngine, DeliveryPath, TrackerApi, DEFAULT_REQUEST_TIMEOUT};
use crate::detector::{ChangeDetector, CursorPolicy};
use crate::error::{ControllerError, CycleError};
use crate::health::{components, HealthRegistry};
use crate::models::{DeliveryOutcome, Observation};
use crate::observability::{StructuredLogger, SyncMetrics};
use crate::source::{ObservationSource, SourceMarker};
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Configuration for the poll loop
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Pause between cycles (default: 10 seconds)
    pub poll_interval: Duration,
    /// Failed cycles in a row before the loop aborts (default: 5)
    pub max_consecutive_failures: u32,
    /// Bound on every request to the tracking service (default: 30 seconds)
    pub request_timeout: Duration,
    pub cursor_policy: CursorPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            max_consecutive_failures: 5,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            cursor_policy: CursorPolicy::default(),
        }
    }
}

/// Where the controller is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Idle,
    Polling,
    Processing,
    Sleeping,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    /// Source unchanged, nothing fetched
    NoOp,
    Completed,
    Failed,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStatus::NoOp => "noop",
            CycleStatus::Completed => "completed",
            CycleStatus::Failed => "failed",
        }
    }
}

/// What one cycle did
#[derive(Debug)]
pub struct CycleReport {
    pub status: CycleStatus,
    pub stale: usize,
    pub path: Option<DeliveryPath>,
    pub outcomes: Vec<(Observation, DeliveryOutcome)>,
    pub error: Option<CycleError>,
}

impl CycleReport {
    fn noop() -> Self {
        Self {
            status: CycleStatus::NoOp,
            stale: 0,
            path: None,
            outcomes: Vec::new(),
            error: None,
        }
    }

    fn failed(error: impl Into<CycleError>) -> Self {
        Self {
            status: CycleStatus::Failed,
            error: Some(error.into()),
            ..Self::noop()
        }
    }

    pub fn count(&self, outcome: DeliveryOutcome) -> usize {
        self.outcomes.iter().filter(|(_, o)| *o == outcome).count()
    }
}

/// Snapshot published after every state change
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub state: LoopState,
    pub consecutive_failures: u32,
    pub tracked_devices: usize,
    pub cycles: u64,
    pub last_cycle: Option<CycleStatus>,
}

/// How the loop ended when it ended cleanly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub cycles: u64,
}

/// Owns the poll loop's state: cursor table, snapshot cursor, failure streak
pub struct PollController {
    source: Arc<dyn ObservationSource>,
    engine: DeliveryEngine,
    detector: ChangeDetector,
    ticker: Box<dyn Ticker>,
    config: ControllerConfig,
    snapshot: Option<SourceMarker>,
    consecutive_failures: u32,
    cycles: u64,
    last_cycle: Option<CycleStatus>,
    state: LoopState,
    health: HealthRegistry,
    metrics: SyncMetrics,
    logger: StructuredLogger,
    status_tx: watch::Sender<ControllerStatus>,
}

impl PollController {
    pub fn builder() -> PollControllerBuilder {
        PollControllerBuilder::new()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Receiver that always holds the latest [`ControllerStatus`]
    pub fn subscribe(&self) -> watch::Receiver<ControllerStatus> {
        self.status_tx.subscribe()
    }

    fn status(&self) -> ControllerStatus {
        ControllerStatus {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            tracked_devices: self.detector.tracked_devices(),
            cycles: self.cycles,
            last_cycle: self.last_cycle,
        }
    }

    fn set_state(&mut self, state: LoopState) {
        self.state = state;
        self.status_tx.send_replace(self.status());
    }

    /// Health check the tracking service before any cycle runs
    pub async fn verify_connectivity(&mut self) -> Result<serde_json::Value, ControllerError> {
        match self.engine.check_health().await {
            Ok(body) => {
                self.logger.log_connected(&body);
                self.health.set_healthy(components::DELIVERY).await;
                self.health.set_ready(true).await;
                Ok(body)
            }
            Err(e) => {
                error!(error = %e, "Cannot connect to tracking server");
                self.health
                    .set_unhealthy(components::POLL_LOOP, "tracking server unreachable")
                    .await;
                self.set_state(LoopState::Aborted);
                Err(ControllerError::Unreachable(e))
            }
        }
    }

    /// Run one full cycle and fold its result into the failure streak.
    ///
    /// Returns an error once the streak reaches the configured limit; the
    /// controller is then [`LoopState::Aborted`] and refuses further cycles.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, ControllerError> {
        if self.state == LoopState::Aborted {
            return Err(ControllerError::TooManyConsecutiveFailures {
                count: self.consecutive_failures,
            });
        }

        self.set_state(LoopState::Polling);
        let report = self.execute_cycle().await;
        self.record(&report).await?;
        Ok(report)
    }

    async fn execute_cycle(&mut self) -> CycleReport {
        let marker = match self.source.modification_marker().await {
            Ok(marker) => marker,
            Err(e) => return CycleReport::failed(e),
        };

        if self.snapshot == Some(marker) {
            debug!("No source update detected");
            return CycleReport::noop();
        }

        info!(
            source = %self.source.describe(),
            modified_ms = marker.as_millis() as u64,
            "Observation source updated"
        );
        self.snapshot = Some(marker);
        self.set_state(LoopState::Processing);

        let observations = match self.source.current_observations().await {
            Ok(observations) => observations,
            Err(e) => return CycleReport::failed(e),
        };
        if observations.is_empty() {
            info!("No locations found in observation source");
        }

        let detection = self.detector.detect_new(observations);
        if detection.new.is_empty() {
            info!(stale = detection.stale, "No new locations to send");
        }

        let delivery = self.engine.deliver(detection.new).await;
        self.detector.confirm(&delivery.outcomes);

        if delivery.path != DeliveryPath::Skipped {
            self.metrics
                .observe_delivery_latency(delivery.elapsed.as_secs_f64());
        }
        for (observation, outcome) in &delivery.outcomes {
            self.logger.log_outcome(observation, *outcome);
            self.metrics.inc_outcome(*outcome);
        }

        CycleReport {
            status: if delivery.is_failure() {
                CycleStatus::Failed
            } else {
                CycleStatus::Completed
            },
            stale: detection.stale,
            path: Some(delivery.path),
            outcomes: delivery.outcomes,
            error: delivery.error.map(CycleError::from),
        }
    }

    async fn record(&mut self, report: &CycleReport) -> Result<(), ControllerError> {
        self.cycles += 1;
        self.last_cycle = Some(report.status);
        self.metrics.inc_cycle(report.status.as_str());
        self.metrics
            .set_tracked_devices(self.detector.tracked_devices());

        match (&report.status, &report.error) {
            (CycleStatus::Failed, Some(err)) => {
                self.consecutive_failures += 1;
                // Re-read the source next cycle even if its marker is unchanged
                self.snapshot = None;

                match err {
                    CycleError::Source(e) => {
                        self.metrics.inc_source_error(e.kind());
                        self.health
                            .set_degraded(components::SOURCE, e.to_string())
                            .await;
                    }
                    CycleError::Delivery(e) => {
                        self.health
                            .set_degraded(components::DELIVERY, e.to_string())
                            .await;
                    }
                }
                self.logger.log_cycle_failed(
                    err,
                    self.consecutive_failures,
                    self.config.max_consecutive_failures,
                );
            }
            (CycleStatus::Completed, _) => {
                self.consecutive_failures = 0;
                self.health.set_healthy(components::SOURCE).await;
                self.health.set_healthy(components::DELIVERY).await;
            }
            _ => {
                self.consecutive_failures = 0;
            }
        }
        self.metrics
            .set_consecutive_failures(self.consecutive_failures);

        if self.consecutive_failures >= self.config.max_consecutive_failures {
            self.logger.log_aborted(self.consecutive_failures);
            self.health
                .set_unhealthy(components::POLL_LOOP, "too many consecutive failures")
                .await;
            self.set_state(LoopState::Aborted);
            return Err(ControllerError::TooManyConsecutiveFailures {
                count: self.consecutive_failures,
            });
        }

        self.status_tx.send_replace(self.status());
        Ok(())
    }

    /// Run until shutdown or abort.
    ///
    /// Verifies connectivity first; an unreachable server aborts before the
    /// first cycle. A message on `shutdown` (or its sender closing) ends the
    /// loop at the next cycle boundary.
    pub async fn run(
        mut self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<LoopSummary, ControllerError> {
        info!(
            source = %self.source.describe(),
            interval_secs = self.config.poll_interval.as_secs(),
            "Starting poll loop"
        );

        self.verify_connectivity().await?;

        loop {
            if shutdown_requested(&mut shutdown) {
                break;
            }

            self.run_cycle().await?;

            self.set_state(LoopState::Sleeping);
            tokio::select! {
                _ = self.ticker.tick() => {}
                _ = shutdown.recv() => {
                    break;
                }
            }
        }

        info!(cycles = self.cycles, "Shutting down poll loop");
        self.set_state(LoopState::Idle);
        Ok(LoopSummary {
            cycles: self.cycles,
        })
    }
}

fn shutdown_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    !matches!(shutdown.try_recv(), Err(TryRecvError::Empty))
}

/// Builder for creating the poll controller
pub struct PollControllerBuilder {
    source: Option<Arc<dyn ObservationSource>>,
    api: Option<Arc<dyn TrackerApi>>,
    ticker: Option<Box<dyn Ticker>>,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
    config: ControllerConfig,
}

impl PollControllerBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            api: None,
            ticker: None,
            health: None,
            logger: None,
            config: ControllerConfig::default(),
        }
    }

    pub fn source(mut self, source: Arc<dyn ObservationSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn api(mut self, api: Arc<dyn TrackerApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// Replace the default [`SleepTicker`]
    pub fn ticker(mut self, ticker: Box<dyn Ticker>) -> Self {
        self.ticker = Some(ticker);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn max_consecutive_failures(mut self, max: u32) -> Self {
        self.config.max_consecutive_failures = max;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn cursor_policy(mut self, policy: CursorPolicy) -> Self {
        self.config.cursor_policy = policy;
        self
    }

    pub fn build(self) -> Result<PollController> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Observation source is required"))?;
        let api = self
            .api
            .ok_or_else(|| anyhow::anyhow!("Tracker API is required"))?;
        if self.config.max_consecutive_failures == 0 {
            anyhow::bail!("max_consecutive_failures must be at least 1");
        }

        let ticker = self
            .ticker
            .unwrap_or_else(|| Box::new(SleepTicker::new(self.config.poll_interval)));
        let logger = self
            .logger
            .unwrap_or_else(|| StructuredLogger::new("unknown"));
        let engine = DeliveryEngine::with_timeout(api, self.config.request_timeout);
        let detector = ChangeDetector::new(self.config.cursor_policy);

        let (status_tx, _) = watch::channel(ControllerStatus {
            state: LoopState::Idle,
            consecutive_failures: 0,
            tracked_devices: 0,
            cycles: 0,
            last_cycle: None,
        });

        Ok(PollController {
            source,
            engine,
            detector,
            ticker,
            config: self.config,
            snapshot: None,
            consecutive_failures: 0,
            cycles: 0,
            last_cycle: None,
            state: LoopState::Idle,
            health: self.health.unwrap_or_default(),
            metrics: SyncMetrics::new(),
            logger,
            status_tx,
        })
    }
}

impl Default for PollControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
