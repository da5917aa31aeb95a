// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Wire protocol used to deliver report batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Http,
    Grpc,
}

impl FromStr for TransportKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "grpc" => Ok(Self::Grpc),
            other => bail!("unknown transport {other:?}, expected http or grpc"),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Http => "http",
            Self::Grpc => "grpc",
        })
    }
}

/// Metrix Agent Configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Server address (host:port) for the selected transport
    pub address: String,

    pub transport: TransportKind,

    /// Seconds between reports
    pub report_interval: u64,

    /// Seconds between polls
    pub poll_interval: u64,

    /// Delivery attempts per report, including the first
    pub report_retry_count: u32,

    /// Number of concurrent report workers and queue capacity
    pub rate_limit: usize,

    /// Shared HMAC key
    pub key: Option<String>,

    /// Path to the RSA public key (PEM)
    pub crypto_key: Option<PathBuf>,

    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8080".to_string(),
            transport: TransportKind::Http,
            report_interval: 10,
            poll_interval: 2,
            report_retry_count: 3,
            rate_limit: 1,
            key: None,
            crypto_key: None,
            log_level: "info".to_string(),
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse_env<T: FromStr>(name: &str, slot: &mut T) {
    if let Ok(raw) = std::env::var(name) {
        match raw.parse() {
            Ok(val) => *slot = val,
            Err(_) => tracing::warn!("Ignoring invalid {}: {}", name, raw),
        }
    }
}

impl AgentConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply environment variables on top of `self`.
    ///
    /// Supported: ADDRESS, AGENT_TRANSPORT, REPORT_INTERVAL, POLL_INTERVAL,
    /// REPORT_RETRY_COUNT, RATE_LIMIT, KEY, CRYPTO_KEY, LOG_LEVEL.
    pub fn merge_env(mut self) -> Self {
        if let Ok(addr) = std::env::var("ADDRESS") {
            self.address = addr;
        }
        parse_env("AGENT_TRANSPORT", &mut self.transport);
        parse_env("REPORT_INTERVAL", &mut self.report_interval);
        parse_env("POLL_INTERVAL", &mut self.poll_interval);
        parse_env("REPORT_RETRY_COUNT", &mut self.report_retry_count);
        parse_env("RATE_LIMIT", &mut self.rate_limit);
        if let Ok(key) = std::env::var("KEY") {
            self.key = non_empty(key);
        }
        if let Ok(path) = std::env::var("CRYPTO_KEY") {
            self.crypto_key = non_empty(path).map(PathBuf::from);
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.log_level = level;
        }
        self
    }

    /// Load configuration with priority: env > file > defaults
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let config = match config_file {
            Some(path) if path.exists() => {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            }
            Some(path) => {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
            None => Self::default(),
        };

        Ok(config.merge_env())
    }

    pub fn poll_every(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn report_every(&self) -> Duration {
        Duration::from_secs(self.report_interval)
    }

    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.key.is_some() {
            config.key = Some("***".to_string());
        }
        config
    }

    pub fn validate(&self) -> Result<()> {
        let (host, port) = self
            .address
            .rsplit_once(':')
            .with_context(|| format!("address must be host:port, got {:?}", self.address))?;
        port.parse::<u16>()
            .with_context(|| format!("address has an invalid port: {:?}", self.address))?;
        if host.is_empty() {
            bail!("address has an empty host: {:?}", self.address);
        }

        if self.poll_interval == 0 {
            bail!("poll_interval must be at least 1 second");
        }
        if self.report_interval == 0 {
            bail!("report_interval must be at least 1 second");
        }
        if self.rate_limit == 0 {
            bail!("rate_limit must be at least 1");
        }

        if let Some(path) = &self.crypto_key {
            if !path.exists() {
                bail!("crypto_key file does not exist: {}", path.display());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert_eq!(config.address, "localhost:8080");
        assert_eq!(config.transport, TransportKind::Http);
        assert_eq!(config.report_interval, 10);
        assert_eq!(config.poll_interval, 2);
        assert_eq!(config.report_retry_count, 3);
        assert_eq!(config.rate_limit, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_env() {
        std::env::set_var("AGENT_TRANSPORT", "GRPC");
        std::env::set_var("RATE_LIMIT", "4");
        std::env::set_var("POLL_INTERVAL", "fast");

        let config = AgentConfig::default().merge_env();
        assert_eq!(config.transport, TransportKind::Grpc);
        assert_eq!(config.rate_limit, 4);
        assert_eq!(config.poll_interval, 2);

        std::env::remove_var("AGENT_TRANSPORT");
        std::env::remove_var("RATE_LIMIT");
        std::env::remove_var("POLL_INTERVAL");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(
            &path,
            "address = \"10.0.0.5:9090\"\ntransport = \"grpc\"\nrate_limit = 3\n",
        )
        .unwrap();

        let config = AgentConfig::from_file(&path).unwrap();
        assert_eq!(config.address, "10.0.0.5:9090");
        assert_eq!(config.transport, TransportKind::Grpc);
        assert_eq!(config.rate_limit, 3);
        assert_eq!(config.report_interval, 10);
    }

    #[test]
    fn test_validation_errors() {
        let zero_poll = AgentConfig {
            poll_interval: 0,
            ..Default::default()
        };
        assert!(zero_poll.validate().is_err());

        let zero_workers = AgentConfig {
            rate_limit: 0,
            ..Default::default()
        };
        assert!(zero_workers.validate().is_err());

        let bad_address = AgentConfig {
            address: "localhost".to_string(),
            ..Default::default()
        };
        assert!(bad_address.validate().is_err());
    }

    #[test]
    fn test_transport_kind_parse() {
        assert_eq!("http".parse::<TransportKind>().unwrap(), TransportKind::Http);
        assert!("udp".parse::<TransportKind>().is_err());
        assert_eq!(TransportKind::Grpc.to_string(), "grpc");
    }
}
