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

use axum::{extract::State, http::StatusCode};

use super::{ApiError, AppState};

/// GET /ping - storage liveness
pub async fn ping(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.service.ping().await?;
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::TrustedSubnet;
    use axum::body::Body;
    use axum::http::Request;
    use metrix_core::Opener;
    use metrix_storage::StorageService;
    use std::sync::Arc;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_ping_memory_backend() {
        let state = AppState::new(
            Arc::new(StorageService::in_memory()),
            Opener::default(),
            TrustedSubnet::default(),
        );
        let response = crate::api::router(state)
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
