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

//! Request envelope opening and response signing.

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;

use metrix_core::Opener;

use crate::api::ApiError;

/// `HashSHA256`, lowercased as required for a static header name.
pub const HASH_HEADER: HeaderName = HeaderName::from_static("hashsha256");

/// Upper bound on buffered request and response bodies, and on the size a
/// gzip request body may expand to.
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Create compression layer for responses
///
/// Compresses responses with gzip when the client sends a matching
/// `Accept-Encoding`.
pub fn compression_layer() -> CompressionLayer {
    CompressionLayer::new()
}

/// Request envelope middleware
///
/// Reverses the agent's envelope: decrypt when a private key is configured,
/// gunzip when `Content-Encoding: gzip` is present, then verify the
/// `HashSHA256` header against the plaintext.
pub async fn open_envelope_middleware(
    State(opener): State<Arc<Opener>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (mut parts, body) = request.into_parts();

    let gzipped = match parts
        .headers
        .get(header::CONTENT_ENCODING)
        .map(|v| v.to_str())
    {
        None => false,
        Some(Ok(encoding)) if encoding.eq_ignore_ascii_case("gzip") => true,
        Some(Ok(encoding)) if encoding.eq_ignore_ascii_case("identity") => false,
        Some(_) => return Err(ApiError::UnsupportedEncoding),
    };
    let hash = parts
        .headers
        .get(&HASH_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    if !gzipped && !opener.decrypts() && (hash.is_none() || !opener.signs()) {
        return Ok(next.run(Request::from_parts(parts, body)).await);
    }

    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    let plaintext = opener.open(&bytes, gzipped, hash.as_deref())?;

    parts.headers.remove(header::CONTENT_ENCODING);
    parts.headers.remove(header::CONTENT_LENGTH);
    Ok(next
        .run(Request::from_parts(parts, Body::from(plaintext)))
        .await)
}

/// Adds `HashSHA256` over the (uncompressed) body of successful responses
/// when a key is configured.
pub async fn sign_response_middleware(
    State(opener): State<Arc<Opener>>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if !opener.signs() || !response.status().is_success() {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => return ApiError::Internal(format!("failed to read response: {e}")).into_response(),
    };

    match opener.sign(&bytes) {
        Ok(Some(hash)) => {
            if let Ok(value) = HeaderValue::from_str(&hash) {
                parts.headers.insert(HASH_HEADER, value);
            }
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to sign response"),
    }
    Response::from_parts(parts, Body::from(bytes))
}
