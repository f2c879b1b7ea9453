//! CLI subcommands

pub mod locations;
pub mod pair;
pub mod status;

use agent_lib::credentials::StoredCredentials;
use agent_lib::delivery::DEFAULT_SERVER_URL;

/// Flag first, then the stored server, then the built-in default
pub(crate) fn resolve_server(flag: Option<&str>, stored: &StoredCredentials) -> String {
    flag.map(str::to_string)
        .or_else(|| stored.server.clone())
        .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
}
