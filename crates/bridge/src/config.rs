use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::project::Project;

const DEFAULT_CONFIG_PATH: &str = "/opt/bridge/config.json";

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:4100";
const DEFAULT_API_BASE: &str = "https://bitbucket.org/api/1.0";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub bind_address: Option<String>,
    pub host: Option<String>,
    pub bitbucket: BitbucketConfig,
    pub projects: Vec<Project>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct BitbucketConfig {
    pub api_base: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl BridgeConfig {
    /// Loads the config file named by `BRIDGE_CONFIG_PATH` (or the default
    /// path), falling back to defaults when the file is absent.
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be read or parsed as JSON.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("BRIDGE_CONFIG_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        let path = Path::new(&config_path);
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {config_path}"))?;

        let config = serde_json::from_str::<Self>(&raw)
            .with_context(|| format!("Failed to parse config JSON: {config_path}"))?;

        Ok(config)
    }

    #[must_use]
    pub fn bind_address(&self) -> String {
        self.bind_address
            .clone()
            .or_else(|| std::env::var("BRIDGE_BIND_ADDRESS").ok())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string())
    }

    /// The public base URL registered hooks call back to. Trailing slashes
    /// are stripped so callback URLs concatenate cleanly.
    #[must_use]
    pub fn host(&self) -> Option<String> {
        self.host
            .clone()
            .or_else(|| std::env::var("BRIDGE_HOST").ok())
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
    }

    #[must_use]
    pub fn api_base(&self) -> String {
        self.bitbucket
            .api_base
            .clone()
            .or_else(|| std::env::var("BRIDGE_API_BASE").ok())
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
    }

    #[must_use]
    pub fn bitbucket_username(&self) -> Option<String> {
        self.bitbucket
            .username
            .clone()
            .or_else(|| std::env::var("BRIDGE_BITBUCKET_USERNAME").ok())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    #[must_use]
    pub fn bitbucket_password(&self) -> Option<String> {
        self.bitbucket
            .password
            .clone()
            .or_else(|| std::env::var("BRIDGE_BITBUCKET_PASSWORD").ok())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    #[must_use]
    pub fn projects(&self) -> Vec<Project> {
        self.projects.clone()
    }
}
