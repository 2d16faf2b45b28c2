//! Marketplace identity and login.
//!
//! The credentials file path always comes from configuration. Login asks for
//! a password and, when the marketplace rejects it, asks exactly once more.

use sell_client::{ClientError, MarketplaceApi};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Credentials errors.
#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("Failed to read credentials from {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse credentials: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Password prompt failed: {0}")]
    Prompt(String),

    #[error("Login failed: {0}")]
    Login(#[from] ClientError),
}

/// The persisted marketplace identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,

    /// Address earnings are paid out to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payout_address: Option<String>,
}

impl Credentials {
    /// Load credentials from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CredentialsError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| CredentialsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
impl Credentials {
    /// Write credentials as JSON, creating parent directories.
    pub(crate) fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Asks the operator for a password.
pub trait PasswordPrompt: Send + Sync {
    fn password(&self, prompt: &str) -> Result<String, CredentialsError>;
}

/// Log in, re-prompting once if the password is rejected.
///
/// Any error other than an authentication rejection is returned immediately.
///
/// # Errors
///
/// Returns the last login error, or a prompt error.
pub async fn login_with_retry(
    client: &dyn MarketplaceApi,
    credentials: &Credentials,
    prompt: &dyn PasswordPrompt,
) -> Result<(), CredentialsError> {
    let payout = credentials.payout_address.as_deref().unwrap_or_default();
    let label = format!("Password for {}", credentials.username);

    let password = prompt.password(&label)?;
    match client.login(payout, &password).await {
        Ok(()) => {
            info!(username = %credentials.username, "Logged in");
            Ok(())
        }
        Err(e) if e.is_auth_rejection() => {
            warn!(username = %credentials.username, "Password rejected, asking again");
            let password = prompt.password(&label)?;
            client.login(payout, &password).await?;
            info!(username = %credentials.username, "Logged in");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
