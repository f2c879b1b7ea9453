//! Persisted pairing record
//!
//! A small JSON file holding the bearer token and the server it was issued
//! by. It is read at startup and written only after a successful pairing.

use crate::models::AuthToken;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Contents of the credential file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub token: Option<String>,
    pub server: Option<String>,
}

impl StoredCredentials {
    pub fn new(token: &AuthToken, server: impl Into<String>) -> Self {
        Self {
            token: Some(token.as_str().to_string()),
            server: Some(server.into()),
        }
    }

    pub fn auth_token(&self) -> Option<AuthToken> {
        self.token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(AuthToken::new)
    }
}

/// File-backed store for [`StoredCredentials`]
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `~/.locsync/config.json`
    pub fn default_location() -> Result<Self> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(Self::new(home.join(".locsync").join("config.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record; a missing file is an empty record
    pub fn load(&self) -> Result<StoredCredentials> {
        if !self.path.exists() {
            return Ok(StoredCredentials::default());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    /// Load the record, treating any failure as an empty record
    pub fn load_or_default(&self) -> StoredCredentials {
        self.load().unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "Could not read credential file");
            StoredCredentials::default()
        })
    }

    /// Write the record, creating the parent directory if needed
    pub fn save(&self, credentials: &StoredCredentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content =
            serde_json::to_string_pretty(credentials).context("Failed to serialize credentials")?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to restrict credential file permissions")?;
        }

        Ok(())
    }
}
