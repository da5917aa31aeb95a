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

//! Error taxonomy shared by the agent, the storage layer and the server.

use thiserror::Error;

use crate::metric::MetricKind;

/// Errors produced anywhere along the collection-to-persistence pipeline.
#[derive(Debug, Error)]
pub enum MetrixError {
    /// The metric type is neither `gauge` nor `counter`.
    #[error("invalid metric type: {0}")]
    InvalidKind(String),

    /// The value is missing or cannot be parsed for the metric type.
    #[error("invalid {kind} metric value: {reason}")]
    InvalidValue { kind: MetricKind, reason: String },

    #[error("metric not found: {kind}/{id}")]
    NotFound { kind: MetricKind, id: String },

    /// Delivery failed at the network level; the agent retries these.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote end refused the payload; retrying would not help.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Connection-level database failure, eligible for retry.
    #[error("transient storage error: {0}")]
    TransientStorage(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// Hash mismatch or decryption failure.
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// Local encoding failure (compression, encryption setup, protobuf).
    #[error("codec error: {0}")]
    Codec(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MetrixError {
    pub fn invalid_value(kind: MetricKind, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            kind,
            reason: reason.into(),
        }
    }

    pub fn not_found(kind: MetricKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Bad user input: unknown kind or unparseable value.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidKind(_) | Self::InvalidValue { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Delivery failures the agent is allowed to retry.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn is_transient_storage(&self) -> bool {
        matches!(self, Self::TransientStorage(_))
    }

    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }
}

pub type Result<T> = std::result::Result<T, MetrixError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(MetrixError::InvalidKind("histogram".into()).is_validation());
        assert!(MetrixError::invalid_value(MetricKind::Counter, "abc").is_validation());
        assert!(MetrixError::not_found(MetricKind::Gauge, "Alloc").is_not_found());
        assert!(MetrixError::Transport("refused".into()).is_transport());
        assert!(!MetrixError::Rejected("400".into()).is_transport());
        assert!(!MetrixError::Codec("gzip".into()).is_transport());
    }

    #[test]
    fn test_display() {
        let err = MetrixError::not_found(MetricKind::Counter, "PollCount");
        assert_eq!(err.to_string(), "metric not found: counter/PollCount");
    }
}
