use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{Domain, default_domains};
use crate::error::SyncError;
use crate::transfer::HttpOptions;

pub const CONFIG_FILE: &str = "refseq-sync.json";

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub data_root: Option<Utf8PathBuf>,
    #[serde(default)]
    pub domains: Option<Vec<Domain>>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub transfer_timeout_secs: Option<u64>,
    #[serde(default)]
    pub use_system_proxy: Option<bool>,
    #[serde(default)]
    pub refresh_catalogs: Option<bool>,
    #[serde(default)]
    pub filter_distributed: Option<bool>,
    #[serde(default)]
    pub barrier_poll_ms: Option<u64>,
    #[serde(default)]
    pub barrier_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_root: Utf8PathBuf,
    pub domains: Vec<Domain>,
    pub http: HttpOptions,
    pub refresh_catalogs: bool,
    pub filter_distributed: bool,
    pub barrier_poll: Duration,
    pub barrier_timeout: Duration,
}

impl ResolvedConfig {
    pub fn rendezvous_dir(&self) -> Utf8PathBuf {
        self.data_root.join(".rendezvous")
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `refseq-sync.json` from the current directory, or an explicit path.
    /// Without an explicit path a missing file means defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, SyncError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| SyncError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| SyncError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, SyncError> {
        let domains = config.domains.unwrap_or_else(default_domains);
        let mut seen = std::collections::HashSet::new();
        for domain in &domains {
            if !seen.insert(domain.name.as_str()) {
                return Err(SyncError::ConfigParse(format!(
                    "domain {} listed more than once",
                    domain.name
                )));
            }
        }

        let defaults = HttpOptions::default();
        let secs = |value: Option<u64>, fallback: Duration| {
            value
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };

        Ok(ResolvedConfig {
            data_root: config.data_root.unwrap_or_else(default_data_root),
            domains,
            http: HttpOptions {
                connect_timeout: secs(config.connect_timeout_secs, defaults.connect_timeout),
                transfer_timeout: secs(config.transfer_timeout_secs, defaults.transfer_timeout),
                use_system_proxy: config.use_system_proxy.unwrap_or(defaults.use_system_proxy),
            },
            refresh_catalogs: config.refresh_catalogs.unwrap_or(true),
            filter_distributed: config.filter_distributed.unwrap_or(false),
            barrier_poll: Duration::from_millis(config.barrier_poll_ms.unwrap_or(500).max(10)),
            barrier_timeout: secs(config.barrier_timeout_secs, Duration::from_secs(4 * 3600)),
        })
    }
}

pub fn default_data_root() -> Utf8PathBuf {
    Utf8PathBuf::from("RefSeq")
}
