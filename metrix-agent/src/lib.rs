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

pub mod buffer;
pub mod config;
pub mod pipeline;
pub mod pool;
pub mod sender;
pub mod source;
pub mod transport;

use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{
    layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

use metrix_core::{EncryptionKey, Sealer};

use config::{AgentConfig, TransportKind};
use pipeline::Agent;
use sender::RetryingSender;
use source::SystemSource;
use transport::{GrpcTransport, HttpTransport, Transport};

/// Swaps the log filter once the final configuration is known.
pub type LogHandle = reload::Handle<EnvFilter, Registry>;

/// `RUST_LOG` wins over the configured level.
pub fn log_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("metrix_agent={log_level},metrix_core={log_level}"))
    })
}

pub fn init_tracing(log_level: &str) -> LogHandle {
    let (filter, handle) = reload::Layer::new(log_filter(log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
    handle
}

pub fn build_sealer(config: &AgentConfig) -> Result<Sealer> {
    let public_key = match &config.crypto_key {
        Some(path) => {
            tracing::info!("Loading public key from {:?}", path);
            Some(EncryptionKey::from_file(path)?)
        }
        None => None,
    };
    Ok(Sealer::new(config.key.clone(), public_key))
}

pub fn build_transport(config: &AgentConfig) -> Result<Arc<dyn Transport>> {
    let sealer = build_sealer(config)?;
    let transport: Arc<dyn Transport> = match config.transport {
        TransportKind::Http => Arc::new(HttpTransport::new(&config.address, sealer)?),
        TransportKind::Grpc => Arc::new(GrpcTransport::new(&config.address, sealer)?),
    };
    Ok(transport)
}

pub async fn run_agent(config: AgentConfig) -> Result<()> {
    tracing::info!("Starting Metrix Agent");
    tracing::info!("Configuration: {:#?}", config.redacted());

    config.validate()?;

    let sender = Arc::new(RetryingSender::new(
        build_transport(&config)?,
        config.report_retry_count,
    ));
    let agent = Agent::new(&config, Arc::new(SystemSource::new()), sender);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    agent.run(shutdown).await;
    tracing::info!("Metrix Agent stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_transport_selects_protocol() {
        let http = build_transport(&AgentConfig::default()).unwrap();
        assert_eq!(http.name(), "http");
    }

    #[tokio::test]
    async fn test_build_grpc_transport() {
        // connect_lazy needs a runtime but no server.
        let config = AgentConfig {
            address: "127.0.0.1:9090".to_string(),
            transport: TransportKind::Grpc,
            ..Default::default()
        };
        assert_eq!(build_transport(&config).unwrap().name(), "grpc");
    }

    #[test]
    fn test_missing_public_key_fails() {
        let config = AgentConfig {
            crypto_key: Some("/nonexistent/public.pem".into()),
            ..Default::default()
        };
        assert!(build_sealer(&config).is_err());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_configured_log_level_replaces_bootstrap_level() {
        let (filter, handle) = reload::Layer::new(log_filter("warn"));
        let _guard = tracing_subscriber::registry().with(filter).set_default();
        assert!(!tracing::enabled!(tracing::Level::INFO));

        handle.reload(log_filter("debug")).unwrap();
        assert!(tracing::enabled!(tracing::Level::DEBUG));
    }
}
