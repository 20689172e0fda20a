//! Request handlers.

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, Uri, header};
use axum::response::Response;
use coze_protocol::{ChatRequest, STREAM_CONTENT_TYPE};
use serde_json::{Value, json};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, instrument};

use crate::relay::{self, Opening, Transcript, UpstreamReader};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Liveness probe.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// JSON 404 for anything outside the relay's two routes.
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(uri.path().to_string())
}

/// Relay one chat turn.
///
/// Returns `200` with a chunked `text/plain` body once the first text delta is
/// available. Anything that fails before that point is a JSON error.
#[instrument(skip_all, fields(bot_id))]
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    request.validate().map_err(ApiError::bad_request)?;
    tracing::Span::current().record("bot_id", request.bot_id.as_str());

    info!(
        user_id = %request.user_id,
        messages = request.additional_messages.len(),
        "relaying chat request"
    );

    let stream = state.upstream.open_chat(&request).await?;
    let reader = UpstreamReader::new(stream, state.limits);
    let opening = relay::open(reader, Transcript::new(&request.bot_id)).await?;

    let body = match opening {
        Opening::Streaming(rx) => Body::from_stream(ReceiverStream::new(rx)),
        Opening::Empty => Body::empty(),
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, STREAM_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache")
        .header("x-accel-buffering", "no")
        .body(body)
        .map_err(|e| ApiError::internal(format!("building response: {e}")))
}
