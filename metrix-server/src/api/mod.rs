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

pub mod health;
pub mod metrics;

use axum::{
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;

use metrix_core::{MetrixError, Opener};
use metrix_storage::StorageService;

use crate::middleware::{
    compression_layer, open_envelope_middleware, sign_response_middleware,
    trusted_subnet_middleware, TrustedSubnet,
};

pub use health::ping;
pub use metrics::{get_all, get_value, get_value_json, update, update_batch, update_json};

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("unsupported content encoding")]
    UnsupportedEncoding,

    #[error("your ip-address is not allowed")]
    Forbidden,

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedEncoding => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

impl From<MetrixError> for ApiError {
    fn from(err: MetrixError) -> Self {
        match err {
            MetrixError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            MetrixError::InvalidKind(_)
            | MetrixError::InvalidValue { .. }
            | MetrixError::Integrity(_)
            | MetrixError::Codec(_)
            | MetrixError::Json(_) => ApiError::BadRequest(err.to_string()),
            other => {
                tracing::error!(error = %other, "Request failed");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<StorageService>,
    pub opener: Arc<Opener>,
    pub subnet: Arc<TrustedSubnet>,
}

impl AppState {
    pub fn new(service: Arc<StorageService>, opener: Opener, subnet: TrustedSubnet) -> Self {
        Self {
            service,
            opener: Arc::new(opener),
            subnet: Arc::new(subnet),
        }
    }
}

/// Full HTTP application.
///
/// Layer order, outermost first: origin filter, request tracing, response
/// compression, envelope opening, response signing.
pub fn router(state: AppState) -> Router {
    let opener = state.opener.clone();
    let subnet = state.subnet.clone();

    Router::new()
        .route("/", get(get_all))
        .route("/ping", get(ping))
        .route("/value/", post(get_value_json))
        .route("/value/:kind/:id", get(get_value))
        .route("/update/", post(update_json))
        .route("/update/:kind/:id/:value", post(update))
        .route("/updates/", post(update_batch))
        .with_state(state)
        .layer(from_fn_with_state(opener.clone(), sign_response_middleware))
        .layer(from_fn_with_state(opener, open_envelope_middleware))
        .layer(compression_layer())
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(subnet, trusted_subnet_middleware))
}
