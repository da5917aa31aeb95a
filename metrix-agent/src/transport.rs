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

//! Outbound delivery of report batches.

use async_trait::async_trait;
use prost::Message;
use std::net::{IpAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, Endpoint};
use tonic::Code;

use metrix_core::rpc::metric_collector_client::MetricCollectorClient;
use metrix_core::rpc::{self, UpdatesRequest, HASH_METADATA, REAL_IP_METADATA};
use metrix_core::{MetricRecord, MetrixError, Result, Sealer};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Deliver one batch. Network failures surface as
    /// [`MetrixError::Transport`]; everything else is final.
    async fn send(&self, batch: &[MetricRecord]) -> Result<()>;
}

/// Address of the local interface used to reach `address`.
///
/// Connecting a UDP socket sends nothing; it only selects a route.
pub fn outbound_ip(address: &str) -> Option<IpAddr> {
    let target = address.to_socket_addrs().ok()?.next()?;
    let bind = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind).ok()?;
    socket.connect(target).ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

/// `POST http://{address}/updates/` with the sealed JSON batch.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    sealer: Sealer,
    real_ip: Option<IpAddr>,
}

impl HttpTransport {
    pub fn new(address: &str, sealer: Sealer) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| MetrixError::Codec(format!("failed to build HTTP client: {e}")))?;

        let real_ip = outbound_ip(address);
        if real_ip.is_none() {
            tracing::warn!(address, "Could not determine outbound IP; X-Real-IP will be omitted");
        }

        Ok(Self {
            client,
            url: format!("http://{address}/updates/"),
            sealer,
            real_ip,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn send(&self, batch: &[MetricRecord]) -> Result<()> {
        let payload = self.sealer.seal_json(batch)?;

        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::CONTENT_ENCODING, "gzip")
            .body(payload.body);
        if let Some(ip) = self.real_ip {
            request = request.header("X-Real-IP", ip.to_string());
        }
        if let Some(hash) = payload.hash {
            request = request.header(metrix_core::HASH_HEADER, hash);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MetrixError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(count = batch.len(), "Batch delivered over HTTP");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = format!("server responded {status}: {}", body.trim());
        if status.is_server_error() {
            Err(MetrixError::Transport(message))
        } else {
            Err(MetrixError::Rejected(message))
        }
    }
}

/// `MetricCollector/Updates` over a lazily connected channel.
pub struct GrpcTransport {
    client: MetricCollectorClient<Channel>,
    sealer: Sealer,
    real_ip: Option<IpAddr>,
}

impl GrpcTransport {
    pub fn new(address: &str, sealer: Sealer) -> Result<Self> {
        let endpoint = Endpoint::from_shared(format!("http://{address}"))
            .map_err(|e| MetrixError::Codec(format!("invalid gRPC address {address:?}: {e}")))?
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT);

        Ok(Self {
            client: MetricCollectorClient::new(endpoint.connect_lazy()),
            sealer,
            real_ip: outbound_ip(address),
        })
    }
}

fn status_to_error(status: tonic::Status) -> MetrixError {
    match status.code() {
        Code::Unavailable | Code::DeadlineExceeded | Code::Unknown | Code::Cancelled => {
            MetrixError::Transport(status.to_string())
        }
        _ => MetrixError::Rejected(status.to_string()),
    }
}

fn metadata(value: &str) -> Result<MetadataValue<tonic::metadata::Ascii>> {
    value
        .parse()
        .map_err(|_| MetrixError::Codec(format!("invalid metadata value {value:?}")))
}

#[async_trait]
impl Transport for GrpcTransport {
    fn name(&self) -> &'static str {
        "grpc"
    }

    async fn send(&self, batch: &[MetricRecord]) -> Result<()> {
        let message = UpdatesRequest {
            metrics: batch.iter().cloned().map(rpc::Metric::from).collect(),
        };
        let hash = self.sealer.sign(&message.encode_to_vec())?;

        let mut request = tonic::Request::new(message);
        if let Some(hash) = hash {
            request.metadata_mut().insert(HASH_METADATA, metadata(&hash)?);
        }
        if let Some(ip) = self.real_ip {
            request
                .metadata_mut()
                .insert(REAL_IP_METADATA, metadata(&ip.to_string())?);
        }

        let mut client = self.client.clone();
        let response = client.updates(request).await.map_err(status_to_error)?;
        tracing::debug!(
            accepted = response.get_ref().accepted,
            "Batch delivered over gRPC"
        );
        Ok(())
    }
}
