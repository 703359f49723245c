//! Saved CLI settings and credential resolution.
//!
//! Credentials resolve in this order (first set wins):
//! 1. `--api-token` / `--base-url` flags or their environment variables
//! 2. the manifest's `provider` block
//! 3. the saved config (`<config dir>/pzctl/config.json`, written by `--save-auth`)
//! 4. built-in defaults

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use pomerium_zero_provider::manifest::ProviderBlock;
use pomerium_zero_provider::{ProviderConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use serde::{Deserialize, Serialize};

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "(sensitive)"))
            .finish()
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pzctl")
        .join("config.json")
}

impl Config {
    /// A missing file is an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))
                .with_context(|| format!("failed to restrict {}", path.display()))?;
        }
        Ok(())
    }
}

/// Connection settings given on the command line.
#[derive(Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub api_token: Option<String>,
    pub timeout_secs: Option<u64>,
}

pub fn resolve(overrides: &Overrides, manifest: Option<&ProviderBlock>, saved: &Config) -> ProviderConfig {
    let api_token = overrides
        .api_token
        .clone()
        .or_else(|| manifest.and_then(|m| m.api_token.clone()))
        .or_else(|| saved.api_token.clone());
    let base_url = overrides
        .base_url
        .clone()
        .or_else(|| manifest.and_then(|m| m.base_url.clone()))
        .or_else(|| saved.base_url.clone())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let timeout = overrides
        .timeout_secs
        .or_else(|| manifest.and_then(|m| m.timeout_secs))
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TIMEOUT);

    ProviderConfig {
        api_token,
        base_url,
        timeout,
    }
}
