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

use anyhow::Result;
use clap::Parser;
use metrix_server::{config::ServerConfig, init_tracing, log_filter, run_server};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long, env = "CONFIG")]
    config: Option<PathBuf>,

    /// HTTP listen address (host:port)
    #[arg(short, long)]
    address: Option<String>,

    /// gRPC listen address (host:port), empty to disable
    #[arg(long)]
    grpc_address: Option<String>,

    /// Backup file path
    #[arg(short = 'f', long)]
    store_file: Option<PathBuf>,

    /// Backup interval in seconds (0 = after every write)
    #[arg(short = 'i', long)]
    store_interval: Option<u64>,

    /// Restore the backup on startup
    #[arg(short, long)]
    restore: Option<bool>,

    /// PostgreSQL DSN
    #[arg(short = 'd', long)]
    database_dsn: Option<String>,

    /// HMAC key
    #[arg(short, long)]
    key: Option<String>,

    /// RSA private key (PEM)
    #[arg(long)]
    crypto_key: Option<PathBuf>,

    /// Trusted caller subnet (CIDR)
    #[arg(short, long)]
    trusted_subnet: Option<String>,

    /// Log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config loading logs too, so start with the bootstrap level
    let bootstrap = args
        .log_level
        .clone()
        .or_else(|| std::env::var("LOG_LEVEL").ok())
        .unwrap_or_else(|| "info".to_string());
    let log = init_tracing(&bootstrap);

    // Load configuration
    let mut config = ServerConfig::load(args.config)?;

    // Apply CLI overrides
    if let Some(address) = args.address {
        config.address = address;
    }
    if let Some(address) = args.grpc_address {
        config.grpc_address = address;
    }
    if let Some(path) = args.store_file {
        config.store_file = path;
    }
    if let Some(interval) = args.store_interval {
        config.store_interval = interval;
    }
    if let Some(restore) = args.restore {
        config.restore = restore;
    }
    if let Some(dsn) = args.database_dsn {
        config.database_dsn = Some(dsn);
    }
    if let Some(key) = args.key {
        config.key = Some(key);
    }
    if let Some(path) = args.crypto_key {
        config.crypto_key = Some(path);
    }
    if let Some(cidr) = args.trusted_subnet {
        config.trusted_subnet = Some(cidr);
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    if config.log_level != bootstrap {
        log.reload(log_filter(&config.log_level))?;
    }

    // Run server
    run_server(config).await
}
