use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::auth::Credentials;
use crate::providers::bitbucket::DEFAULT_BASE_URL;

/// Configuration file structure for the exporter.
///
/// Every value can also come from the command line or the
/// `BITBUCKET_PIPELINES_EXPORTER_*` environment variables, which take precedence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub bitbucket: BitbucketConfig,

    #[serde(default)]
    pub exporter: ExporterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BitbucketConfig {
    /// Workspace slug or UUID
    pub workspace: Option<String>,

    /// Bitbucket username
    pub username: Option<String>,

    /// App password with repository and pipeline read access
    pub app_password: Option<String>,

    /// REST API root
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout for each API request, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExporterConfig {
    /// Seconds to sleep between polling cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Address the metrics endpoint listens on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Pipeline requests in flight per cycle
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
}

impl Default for BitbucketConfig {
    fn default() -> Self {
        Self {
            workspace: None,
            username: None,
            app_password: None,
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            listen_addr: default_listen_addr(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_interval_secs() -> u64 {
    60
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_max_concurrent_fetches() -> usize {
    1
}

impl BitbucketConfig {
    pub fn workspace(&self) -> Result<&str> {
        self.workspace
            .as_deref()
            .filter(|w| !w.is_empty())
            .context("Bitbucket workspace is not configured (BITBUCKET_PIPELINES_EXPORTER_WORKSPACE)")
    }

    pub fn credentials(&self) -> Result<Credentials> {
        let username = self
            .username
            .as_deref()
            .context("Bitbucket username is not configured (BITBUCKET_PIPELINES_EXPORTER_USERNAME)")?;
        let app_password = self.app_password.as_deref().context(
            "Bitbucket app password is not configured (BITBUCKET_PIPELINES_EXPORTER_APP_PASSWORD)",
        )?;

        Ok(Credentials::new(username, app_password))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ExporterConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./bitbucket-exporter.toml
    /// 3. ./bitbucket-exporter.json
    /// 4. ./bitbucket-exporter.yaml
    /// 5. ./bitbucket-exporter.yml
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = [
            "bitbucket-exporter.toml",
            "bitbucket-exporter.json",
            "bitbucket-exporter.yaml",
            "bitbucket-exporter.yml",
        ];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        Ok(Self::default())
    }

    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }
}
