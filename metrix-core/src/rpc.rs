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

//! gRPC messages and the `metrix.MetricCollector` service, generated from
//! `proto/metrix.proto` by `tonic-build`.

use crate::metric::MetricRecord;

tonic::include_proto!("metrix");

impl From<MetricRecord> for Metric {
    fn from(record: MetricRecord) -> Self {
        Self {
            id: record.id,
            r#type: record.kind,
            delta: record.delta,
            value: record.value,
        }
    }
}

impl From<Metric> for MetricRecord {
    fn from(metric: Metric) -> Self {
        Self {
            id: metric.id,
            kind: metric.r#type,
            delta: metric.delta,
            value: metric.value,
        }
    }
}

/// Metadata key carrying the HMAC of the prost-encoded request.
pub const HASH_METADATA: &str = "hashsha256";

/// Metadata key the agent fills with its own address for origin filtering.
pub const REAL_IP_METADATA: &str = "x-real-ip";
