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

//! Caller origin filter.

use anyhow::{anyhow, Result};
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use ip_network::IpNetwork;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;

use crate::api::ApiError;

/// Header (and gRPC metadata key) naming the original caller.
pub const REAL_IP_HEADER: &str = "x-real-ip";

/// Optional trusted network. Disabled when no CIDR is configured.
#[derive(Debug, Clone, Default)]
pub struct TrustedSubnet {
    network: Option<IpNetwork>,
}

impl TrustedSubnet {
    /// Parse a CIDR. A bare address is treated as a single-host network.
    pub fn parse(cidr: Option<&str>) -> Result<Self> {
        let Some(cidr) = cidr.map(str::trim).filter(|c| !c.is_empty()) else {
            return Ok(Self::default());
        };

        let network = match IpNetwork::from_str(cidr) {
            Ok(net) => net,
            Err(_) => match IpAddr::from_str(cidr) {
                Ok(IpAddr::V4(ip4)) => IpNetwork::new(ip4, 32)
                    .map_err(|_| anyhow!("failed to add ipv4 address: internal error"))?,
                Ok(IpAddr::V6(ip6)) => IpNetwork::new(ip6, 128)
                    .map_err(|_| anyhow!("failed to add ipv6 address: internal error"))?,
                Err(_) => return Err(anyhow!("invalid trusted subnet: {cidr}")),
            },
        };
        Ok(Self {
            network: Some(network),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.network.is_some()
    }

    pub fn allows(&self, ip: IpAddr) -> bool {
        match &self.network {
            Some(network) => network.contains(ip.to_canonical()),
            None => true,
        }
    }

    /// Allow/deny given the `X-Real-IP` value and the transport peer.
    /// The header wins when it parses.
    pub fn admits(&self, real_ip: Option<&str>, peer: Option<SocketAddr>) -> bool {
        if !self.is_enabled() {
            return true;
        }
        let caller = real_ip
            .and_then(|v| IpAddr::from_str(v.trim()).ok())
            .or_else(|| peer.map(|p| p.ip()));
        match caller {
            Some(ip) => self.allows(ip),
            None => false,
        }
    }
}

/// Rejects callers outside the trusted subnet before the body is read.
pub async fn trusted_subnet_middleware(
    State(subnet): State<Arc<TrustedSubnet>>,
    request: Request,
    next: Next,
) -> Response {
    if !subnet.is_enabled() {
        return next.run(request).await;
    }

    let real_ip = request
        .headers()
        .get(REAL_IP_HEADER)
        .and_then(|v| v.to_str().ok());
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    if subnet.admits(real_ip, peer) {
        next.run(request).await
    } else {
        tracing::warn!(real_ip, ?peer, "Rejected request from untrusted origin");
        ApiError::Forbidden.into_response()
    }
}
