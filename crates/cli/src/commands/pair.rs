//! Pairing command

use agent_lib::credentials::CredentialStore;
use agent_lib::delivery::HttpTrackerClient;
use agent_lib::pairing::PairingClient;
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

use super::resolve_server;
use crate::output::{print_info, print_success, print_warning, OutputFormat};

#[derive(Serialize)]
struct PairResult {
    server: String,
    credential_path: String,
    paired: bool,
}

/// Pair with the server and persist the token
pub async fn pair(
    store: &CredentialStore,
    code: &str,
    server: Option<&str>,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    // A broken record is replaced by a successful pairing
    let stored = store.load().unwrap_or_else(|e| {
        print_warning(&format!("Ignoring unreadable credential file: {:#}", e));
        Default::default()
    });
    let server_url = resolve_server(server, &stored);
    if verbose {
        print_info(&format!("Pairing with {}", server_url));
    }

    let client = Arc::new(HttpTrackerClient::with_server(&server_url, None)?);
    let server_url = client.server_url().to_string();
    PairingClient::new(client)
        .pair_and_store(code, store, &server_url)
        .await?;

    let result = PairResult {
        server: server_url,
        credential_path: store.path().display().to_string(),
        paired: true,
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Table => {
            print_success(&format!("Paired with {}", result.server));
            println!("Token saved to {}", result.credential_path);
        }
    }

    Ok(())
}
