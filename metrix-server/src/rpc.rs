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

//! gRPC ingress. Terminates at the same Storage Service as HTTP.

use prost::Message;
use std::sync::Arc;
use tonic::{Request, Response, Status};

use metrix_core::rpc::metric_collector_server::{MetricCollector, MetricCollectorServer};
use metrix_core::rpc::{
    self, UpdateRequest, UpdateResponse, UpdatesRequest, UpdatesResponse, ValueRequest,
    ValueResponse, HASH_METADATA, REAL_IP_METADATA,
};
use metrix_core::{MetricRecord, MetrixError, Opener};
use metrix_storage::StorageService;

use crate::middleware::TrustedSubnet;

fn to_status(err: MetrixError) -> Status {
    match &err {
        MetrixError::NotFound { .. } => Status::not_found(err.to_string()),
        e if e.is_validation() => Status::invalid_argument(err.to_string()),
        MetrixError::Integrity(_) | MetrixError::Codec(_) | MetrixError::Json(_) => {
            Status::invalid_argument(err.to_string())
        }
        _ => {
            tracing::error!(error = %err, "gRPC request failed");
            Status::internal(err.to_string())
        }
    }
}

pub struct MetricCollectorService {
    service: Arc<StorageService>,
    opener: Arc<Opener>,
    subnet: Arc<TrustedSubnet>,
}

impl MetricCollectorService {
    pub fn new(service: Arc<StorageService>, opener: Arc<Opener>, subnet: Arc<TrustedSubnet>) -> Self {
        Self {
            service,
            opener,
            subnet,
        }
    }

    pub fn into_server(self) -> MetricCollectorServer<Self> {
        MetricCollectorServer::new(self)
    }

    /// Origin filter and payload hash check shared by every method.
    fn admit<T: Message>(&self, request: &Request<T>) -> Result<(), Status> {
        let real_ip = request
            .metadata()
            .get(REAL_IP_METADATA)
            .and_then(|v| v.to_str().ok());
        if !self.subnet.admits(real_ip, request.remote_addr()) {
            tracing::warn!(real_ip, peer = ?request.remote_addr(), "Rejected gRPC call from untrusted origin");
            return Err(Status::permission_denied("your ip-address is not allowed"));
        }

        let hash = request
            .metadata()
            .get(HASH_METADATA)
            .and_then(|v| v.to_str().ok());
        self.opener
            .verify(&request.get_ref().encode_to_vec(), hash)
            .map_err(to_status)
    }
}

#[async_trait::async_trait]
impl MetricCollector for MetricCollectorService {
    async fn update(
        &self,
        request: Request<UpdateRequest>,
    ) -> Result<Response<UpdateResponse>, Status> {
        self.admit(&request)?;
        let metric = request
            .into_inner()
            .metric
            .ok_or_else(|| Status::invalid_argument("metric is required"))?;

        let stored = self
            .service
            .save_metric(&MetricRecord::from(metric))
            .await
            .map_err(to_status)?;
        Ok(Response::new(UpdateResponse {
            metric: Some(rpc::Metric::from(stored)),
        }))
    }

    async fn updates(
        &self,
        request: Request<UpdatesRequest>,
    ) -> Result<Response<UpdatesResponse>, Status> {
        self.admit(&request)?;
        let records: Vec<MetricRecord> = request
            .into_inner()
            .metrics
            .into_iter()
            .map(MetricRecord::from)
            .collect();

        let accepted = self.service.save_batch(&records).await.map_err(to_status)?;
        Ok(Response::new(UpdatesResponse {
            accepted: u32::try_from(accepted).unwrap_or(u32::MAX),
        }))
    }

    async fn value(&self, request: Request<ValueRequest>) -> Result<Response<ValueResponse>, Status> {
        self.admit(&request)?;
        let ValueRequest { id, metric_type } = request.into_inner();
        let mut record = MetricRecord {
            id,
            kind: metric_type,
            ..Default::default()
        };

        self.service
            .get_metric(&mut record)
            .await
            .map_err(to_status)?;
        Ok(Response::new(ValueResponse {
            metric: Some(rpc::Metric::from(record)),
        }))
    }
}
