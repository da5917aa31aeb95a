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

//! Shared building blocks for the metrix agent and server: the metric model,
//! the error taxonomy, the transport envelope, retry policy and gRPC types.

pub mod envelope;
pub mod error;
pub mod metric;
pub mod retry;
pub mod rpc;

pub use envelope::{DecryptionKey, EncryptionKey, Opener, SealedPayload, Sealer, HASH_HEADER};
pub use error::{MetrixError, Result};
pub use metric::{accumulate, Metric, MetricKind, MetricRecord, MetricValue};
pub use retry::RetryPolicy;
