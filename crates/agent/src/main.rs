//! Location sync agent
//!
//! Watches the local Find My cache and forwards new device locations to a
//! tracking server.

use agent_lib::{
    controller::{CycleStatus, PollController},
    credentials::CredentialStore,
    delivery::{HttpClientConfig, HttpTrackerClient, TrackerApi},
    detector::CursorPolicy,
    error::ControllerError,
    health::{components, HealthRegistry},
    models::DeliveryOutcome,
    observability::StructuredLogger,
    pairing::PairingClient,
    source::{default_cache_path, FindMyCacheSource, ObservationSource},
};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

mod api;
mod config;
mod logging;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "locsync-agent")]
#[command(author, version, about = "Forward Find My device locations to a tracking server")]
struct Args {
    /// Tracking server URL (overrides the stored server)
    #[arg(long)]
    server: Option<String>,

    /// Path to the Find My items cache
    #[arg(long = "db-path")]
    db_path: Option<PathBuf>,

    /// Pair with the server using this code before starting
    #[arg(long = "pair-code")]
    pair_code: Option<String>,

    /// Run a single cycle and exit
    #[arg(long)]
    test: bool,

    /// Seconds between cycles
    #[arg(long)]
    interval: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Port for the local health/metrics endpoint (0 disables it)
    #[arg(long = "api-port", env = "LOCSYNC_API_PORT")]
    api_port: Option<u16>,

    /// Also write logs to this file
    #[arg(long = "log-file")]
    log_file: Option<PathBuf>,

    /// When device cursors advance: "detect" or "confirm"
    #[arg(long = "cursor-policy")]
    cursor_policy: Option<CursorPolicy>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _log_guard = match logging::init(args.verbose, args.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Agent stopped with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = config::AgentConfig::load()?;
    if let Some(interval) = args.interval {
        config.poll_interval_secs = interval;
    }
    if let Some(port) = args.api_port {
        config.api_port = port;
    }
    if let Some(policy) = args.cursor_policy {
        config.cursor_policy = policy;
    }
    if let Some(path) = args.db_path {
        config.cache_path = Some(path);
    }
    if config.poll_interval_secs == 0 {
        anyhow::bail!("Poll interval must be at least one second");
    }
    let controller_config = config.controller_config();

    let store = match &config.credentials_path {
        Some(path) => CredentialStore::new(path),
        None => CredentialStore::default_location()?,
    };
    let stored = store.load_or_default();

    let server_url = args
        .server
        .or_else(|| stored.server.clone())
        .unwrap_or_else(|| config.server_url.clone());

    let client = Arc::new(HttpTrackerClient::new(
        HttpClientConfig {
            server_url,
            request_timeout: controller_config.request_timeout,
        },
        stored.auth_token(),
    )?);
    let server_url = client.server_url().to_string();
    let logger = StructuredLogger::new(&server_url);

    if let Some(code) = args.pair_code.as_deref() {
        PairingClient::new(client.clone())
            .with_timeout(controller_config.request_timeout)
            .pair_and_store(code, &store, &server_url)
            .await
            .context("Pairing failed")?;
        logger.log_paired(&store.path().display().to_string());
    } else if !client.has_credential().await {
        warn!("No auth token configured; run with --pair-code to pair with the server");
    }

    let cache_path = config
        .cache_path
        .clone()
        .or_else(default_cache_path)
        .context("Could not determine the Find My cache location; pass --db-path")?;
    let source: Arc<dyn ObservationSource> = Arc::new(FindMyCacheSource::new(cache_path));
    let api: Arc<dyn TrackerApi> = client;

    let health_registry = HealthRegistry::new();
    health_registry.register(components::SOURCE).await;
    health_registry.register(components::DELIVERY).await;
    health_registry.register(components::POLL_LOOP).await;

    logger.log_startup(AGENT_VERSION, &source.describe(), config.poll_interval_secs);

    let mut controller = PollController::builder()
        .source(source)
        .api(api)
        .config(controller_config)
        .health(health_registry.clone())
        .logger(logger.clone())
        .build()?;

    if args.test {
        return run_once(&mut controller).await;
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    if config.api_port != 0 {
        let app_state = Arc::new(api::AppState::new(
            health_registry.clone(),
            controller.subscribe(),
        ));
        let api_port = config.api_port;
        let api_shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = api::serve(api_port, app_state, api_shutdown).await {
                error!(error = %e, "API server failed");
            }
        });
    }

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, finishing current cycle"),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
        let _ = signal_tx.send(());
    });

    match controller.run(shutdown_rx).await {
        Ok(summary) => {
            let _ = shutdown_tx.send(());
            logger.log_shutdown(&format!("interrupted after {} cycles", summary.cycles));
            Ok(())
        }
        Err(e) => {
            let _ = shutdown_tx.send(());
            let reason = match &e {
                ControllerError::Unreachable(_) => "tracking server unreachable",
                ControllerError::TooManyConsecutiveFailures { .. } => {
                    "too many consecutive failures"
                }
            };
            logger.log_shutdown(reason);
            Err(e.into())
        }
    }
}

/// Health check plus exactly one cycle
async fn run_once(controller: &mut PollController) -> Result<()> {
    info!("Running single test cycle");
    controller.verify_connectivity().await?;

    let report = controller.run_cycle().await?;
    info!(
        status = report.status.as_str(),
        stale = report.stale,
        stored = report.count(DeliveryOutcome::Stored),
        duplicate = report.count(DeliveryOutcome::Duplicate),
        failed = report.count(DeliveryOutcome::Failed),
        "Test cycle finished"
    );

    match (report.status, report.error) {
        (CycleStatus::Failed, Some(e)) => Err(e).context("Test cycle failed"),
        (CycleStatus::Failed, None) => anyhow::bail!("Test cycle failed"),
        _ => Ok(()),
    }
}
