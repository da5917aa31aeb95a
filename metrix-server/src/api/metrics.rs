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

//! Metric read and write handlers.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{de::DeserializeOwned, Serialize};

use metrix_core::{MetricRecord, MetricValue};

use super::{ApiError, AppState};

/// Decode a JSON body regardless of the declared content type.
fn decode<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))
}

/// GET / - plain listing of every stored metric
pub async fn get_all(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let metrics = state.service.get_all().await?;

    let mut page = String::with_capacity(metrics.len() * 32);
    for metric in &metrics {
        match metric.value {
            MetricValue::Gauge(value) => page.push_str(&format!("{}: {:.6}\n", metric.id, value)),
            MetricValue::Counter(delta) => page.push_str(&format!("{}: {}\n", metric.id, delta)),
        }
    }

    Ok(([(header::CONTENT_TYPE, "text/html; charset=utf-8")], page))
}

/// GET /value/:kind/:id
pub async fn get_value(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let value = state.service.get(&kind, &id).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        value.to_string(),
    ))
}

/// POST /update/:kind/:id/:value
pub async fn update(
    State(state): State<AppState>,
    Path((kind, id, value)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    state.service.save_raw(&kind, &id, &value).await?;
    Ok(StatusCode::OK)
}

/// POST /value/ - fill a `{id, type}` record with the stored value
pub async fn get_value_json(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<MetricRecord>, ApiError> {
    let mut record: MetricRecord = decode(&body)?;
    state.service.get_metric(&mut record).await?;
    Ok(Json(record))
}

/// POST /update/ - merge one metric and echo its stored state
pub async fn update_json(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<MetricRecord>, ApiError> {
    let record: MetricRecord = decode(&body)?;
    let stored = state.service.save_metric(&record).await?;
    Ok(Json(stored))
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub accepted: usize,
}

/// POST /updates/ - merge a batch atomically
pub async fn update_batch(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<BatchResponse>, ApiError> {
    let records: Vec<MetricRecord> = decode(&body)?;
    let accepted = state.service.save_batch(&records).await?;
    tracing::debug!(accepted, "Batch update");
    Ok(Json(BatchResponse { accepted }))
}

#[cfg(test)]
mod tests {
    use crate::api::{router, AppState};
    use crate::middleware::TrustedSubnet;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use metrix_core::{MetricRecord, Opener};
    use metrix_storage::StorageService;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn create_test_app() -> Router {
        let state = AppState::new(
            Arc::new(StorageService::in_memory()),
            Opener::default(),
            TrustedSubnet::default(),
        );
        router(state)
    }

    fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(body.into())
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_update_and_read_counter() {
        let app = create_test_app();
        for delta in ["5", "3"] {
            let response = app
                .clone()
                .oneshot(post(&format!("/update/counter/PollCount/{delta}"), Body::empty()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.oneshot(get("/value/counter/PollCount")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(text(response).await, "8");
    }

    #[tokio::test]
    async fn test_update_path_errors() {
        let app = create_test_app();
        let response = app
            .clone()
            .oneshot(post("/update/histogram/X/1", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(post("/update/gauge/X/abc", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.oneshot(get("/value/gauge/Unknown")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_json_update_echoes_merged_value() {
        let app = create_test_app();
        let body = r#"{"id":"PollCount","type":"counter","delta":2}"#;
        app.clone().oneshot(post("/update/", body)).await.unwrap();
        let response = app.oneshot(post("/update/", body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let record: MetricRecord = serde_json::from_str(&text(response).await).unwrap();
        assert_eq!(record.delta, Some(4));
    }

    #[tokio::test]
    async fn test_json_value_lookup() {
        let app = create_test_app();
        app.clone()
            .oneshot(post("/update/gauge/Alloc/1.25", Body::empty()))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(post("/value/", r#"{"id":"Alloc","type":"gauge"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            text(response).await,
            r#"{"id":"Alloc","type":"gauge","value":1.25}"#
        );

        let response = app
            .clone()
            .oneshot(post("/value/", r#"{"id":"Alloc","type":"counter"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.oneshot(post("/value/", "{not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_batch_and_listing() {
        let app = create_test_app();
        let batch = r#"[
            {"id":"Alloc","type":"gauge","value":123},
            {"id":"PollCount","type":"counter","delta":5}
        ]"#;
        let response = app.clone().oneshot(post("/updates/", batch)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(text(response).await, r#"{"accepted":2}"#);

        let response = app.oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(text(response).await, "Alloc: 123.000000\nPollCount: 5\n");
    }

    #[tokio::test]
    async fn test_invalid_batch_is_rejected_whole() {
        let app = create_test_app();
        let batch = r#"[
            {"id":"Alloc","type":"gauge","value":1},
            {"id":"PollCount","type":"counter"}
        ]"#;
        let response = app.clone().oneshot(post("/updates/", batch)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.oneshot(get("/")).await.unwrap();
        assert_eq!(text(response).await, "");
    }

    #[tokio::test]
    async fn test_untrusted_origin_is_forbidden() {
        let state = AppState::new(
            Arc::new(StorageService::in_memory()),
            Opener::default(),
            TrustedSubnet::parse(Some("10.0.0.0/8")).unwrap(),
        );
        let app = router(state);

        let request = Request::builder()
            .method("POST")
            .uri("/update/gauge/Alloc/1")
            .header("X-Real-IP", "192.168.0.10")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            text(response).await,
            r#"{"error":"your ip-address is not allowed"}"#
        );

        let request = Request::builder()
            .method("POST")
            .uri("/update/gauge/Alloc/1")
            .header("X-Real-IP", "10.1.2.3")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
