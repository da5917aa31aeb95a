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
use metrix_agent::{
    config::{AgentConfig, TransportKind},
    init_tracing, log_filter, run_agent,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long, env = "CONFIG")]
    config: Option<PathBuf>,

    /// Server address (host:port)
    #[arg(short, long)]
    address: Option<String>,

    /// Delivery protocol: http or grpc
    #[arg(long)]
    transport: Option<TransportKind>,

    /// Report interval in seconds
    #[arg(short = 'r', long)]
    report_interval: Option<u64>,

    /// Poll interval in seconds
    #[arg(short = 'p', long)]
    poll_interval: Option<u64>,

    /// Delivery attempts per report
    #[arg(long = "retries")]
    report_retry_count: Option<u32>,

    /// Concurrent report workers
    #[arg(short = 'l', long)]
    rate_limit: Option<usize>,

    /// HMAC key
    #[arg(short, long)]
    key: Option<String>,

    /// RSA public key (PEM)
    #[arg(long)]
    crypto_key: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config loading logs too, so start with the bootstrap level
    let bootstrap = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let log = init_tracing(&bootstrap);

    let mut config = AgentConfig::load(args.config)?;

    if let Some(address) = args.address {
        config.address = address;
    }
    if let Some(transport) = args.transport {
        config.transport = transport;
    }
    if let Some(interval) = args.report_interval {
        config.report_interval = interval;
    }
    if let Some(interval) = args.poll_interval {
        config.poll_interval = interval;
    }
    if let Some(retries) = args.report_retry_count {
        config.report_retry_count = retries;
    }
    if let Some(limit) = args.rate_limit {
        config.rate_limit = limit;
    }
    if let Some(key) = args.key {
        config.key = Some(key);
    }
    if let Some(path) = args.crypto_key {
        config.crypto_key = Some(path);
    }

    if config.log_level != bootstrap {
        log.reload(log_filter(&config.log_level))?;
    }

    run_agent(config).await
}
