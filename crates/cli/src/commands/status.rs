//! Status command

use agent_lib::credentials::CredentialStore;
use agent_lib::delivery::{HttpTrackerClient, TrackerApi};
use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use super::resolve_server;
use crate::output::{color_status, print_warning, OutputFormat};

#[derive(Serialize)]
struct StatusReport {
    server: String,
    credential_path: String,
    token_stored: bool,
    reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    health: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Show configuration and probe the server's health endpoint
pub async fn show_status(
    store: &CredentialStore,
    server: Option<&str>,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let stored = store.load_or_default();
    let server_url = resolve_server(server, &stored);
    let client = HttpTrackerClient::with_server(&server_url, stored.auth_token())?;

    let (health, error) = match client.health().await {
        Ok(body) => (Some(body), None),
        Err(e) => (None, Some(e.to_string())),
    };

    let report = StatusReport {
        server: client.server_url().to_string(),
        credential_path: store.path().display().to_string(),
        token_stored: stored.auth_token().is_some(),
        reachable: health.is_some(),
        health,
        error,
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print_report(&report, verbose),
    }

    Ok(())
}

fn print_report(report: &StatusReport, verbose: bool) {
    println!("{}", "Location Sync Status".bold());
    println!("{}", "=".repeat(40));
    println!("Server:      {}", report.server.cyan());
    println!(
        "Token:       {}",
        if report.token_stored {
            color_status("stored")
        } else {
            color_status("missing")
        }
    );
    if verbose {
        println!("Credentials: {}", report.credential_path);
    }

    match (&report.health, &report.error) {
        (Some(body), _) => {
            println!("Connection:  {}", color_status("reachable"));
            if verbose {
                println!("Health:      {}", body);
            }
        }
        (None, Some(e)) => {
            println!("Connection:  {}", color_status("unreachable"));
            print_warning(e);
        }
        (None, None) => {}
    }

    if !report.token_stored {
        print_warning("Not paired; run `locsync pair <CODE>`");
    }
}
