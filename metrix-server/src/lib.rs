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

pub mod api;
pub mod config;
pub mod middleware;
pub mod rpc;

use anyhow::{anyhow, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{
    layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

use metrix_core::{DecryptionKey, Opener};
use metrix_storage::{
    BackupOptions, MemoryRepository, PostgresRepository, Repository, StorageService,
};

use api::AppState;
use config::ServerConfig;
use rpc::MetricCollectorService;

/// Bound sockets for the two ingress protocols.
pub struct Listeners {
    pub http: TcpListener,
    pub grpc: Option<TcpListener>,
}

impl Listeners {
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let http = TcpListener::bind(&config.address).await?;
        let grpc = if config.grpc_enabled() {
            Some(TcpListener::bind(&config.grpc_address).await?)
        } else {
            None
        };
        Ok(Self { http, grpc })
    }
}

/// Swaps the log filter once the final configuration is known.
pub type LogHandle = reload::Handle<EnvFilter, Registry>;

/// `RUST_LOG` wins over the configured level.
pub fn log_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "metrix_server={log_level},metrix_storage={log_level},metrix_core={log_level},tower_http=info"
        ))
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

/// Select the backend, then restore the backup when asked to.
pub async fn build_storage(config: &ServerConfig) -> Result<Arc<StorageService>> {
    let repo: Arc<dyn Repository> = match &config.database_dsn {
        Some(dsn) => Arc::new(PostgresRepository::connect(dsn).await?),
        None => Arc::new(MemoryRepository::new()),
    };
    tracing::info!("Using {} storage backend", repo.name());

    let service = Arc::new(StorageService::new(
        repo,
        BackupOptions {
            path: config.backup_path().map(|p| p.to_path_buf()),
            interval: config.backup_interval(),
        },
    ));

    if config.restore {
        match service.restore().await {
            Ok(count) => tracing::info!("Restored {} metrics", count),
            Err(e) => tracing::error!("Failed to restore backup: {}", e),
        }
    }

    Ok(service)
}

pub fn build_opener(config: &ServerConfig) -> Result<Opener> {
    let private_key = match &config.crypto_key {
        Some(path) => {
            tracing::info!("Loading private key from {:?}", path);
            Some(DecryptionKey::from_file(path)?)
        }
        None => None,
    };
    Ok(
        Opener::new(config.key.clone(), private_key)
            .with_max_plaintext(middleware::MAX_BODY_BYTES),
    )
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    tracing::info!("Starting Metrix Server");
    tracing::info!("Configuration: {:#?}", config.redacted());

    config.validate()?;

    let listeners = Listeners::bind(&config).await?;
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    serve(config, listeners, shutdown).await
}

/// Serve HTTP and gRPC until `shutdown` is cancelled, then flush the backup.
pub async fn serve(
    config: ServerConfig,
    listeners: Listeners,
    shutdown: CancellationToken,
) -> Result<()> {
    let service = build_storage(&config).await?;
    let state = AppState::new(
        service.clone(),
        build_opener(&config)?,
        config.trusted_subnet()?,
    );
    let backup_handle = service.spawn_backup_loop(shutdown.clone());

    let collector = MetricCollectorService::new(
        service.clone(),
        state.opener.clone(),
        state.subnet.clone(),
    );
    let app = api::router(state);

    tracing::info!("HTTP server listening on http://{}", listeners.http.local_addr()?);
    let http = {
        let shutdown = shutdown.clone();
        async move {
            axum::serve(
                listeners.http,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .map_err(|e| anyhow!("HTTP server error: {e}"))
        }
    };

    let grpc = {
        let shutdown = shutdown.clone();
        let listener = listeners.grpc;
        async move {
            let Some(listener) = listener else {
                return Ok::<(), anyhow::Error>(());
            };
            tracing::info!("gRPC server listening on {}", listener.local_addr()?);
            let incoming = tonic::transport::server::TcpIncoming::from_listener(listener, true, None)
                .map_err(|e| anyhow!("gRPC listener error: {e}"))?;
            tonic::transport::Server::builder()
                .add_service(collector.into_server())
                .serve_with_incoming_shutdown(incoming, shutdown.cancelled_owned())
                .await
                .map_err(|e| anyhow!("gRPC server error: {e}"))
        }
    };

    let result = tokio::try_join!(http, grpc).map(|_| ());
    if let Err(e) = &result {
        tracing::error!("{}", e);
    }

    // Either server may have stopped on its own; release the other tasks.
    shutdown.cancel();
    match backup_handle {
        Some(handle) => {
            if let Err(e) = handle.await {
                tracing::error!("Backup task failed: {}", e);
            }
        }
        None => {
            if let Err(e) = service.backup().await {
                tracing::error!("Final backup failed: {}", e);
            }
        }
    }

    tracing::info!("Metrix Server stopped");
    result
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
