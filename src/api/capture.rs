//! Capture endpoints: camera control and decoder input.

use axum::{body::Bytes, extract::State, Json};
use serde::Deserialize;

use super::{respond, ApiResult};
use crate::errors::AppError;
use crate::models::{NoticeKind, TerminalSnapshot};
use crate::terminal::Origin;
use crate::AppState;

/// A payload decoded from a live frame.
#[derive(Debug, Deserialize)]
pub struct DecodeRequest {
    pub payload: String,
}

/// POST /api/capture/start - Arm the camera.
pub async fn start_capture(State(state): State<AppState>) -> ApiResult<TerminalSnapshot> {
    respond(state.terminal.start_capture().await)
}

/// POST /api/capture/stop - Disarm the camera.
pub async fn stop_capture(State(state): State<AppState>) -> ApiResult<TerminalSnapshot> {
    respond(state.terminal.stop_capture().await)
}

/// POST /api/capture/decode - Live decode callback.
///
/// Frames that arrive while the terminal is busy are dropped, not queued.
pub async fn decode_frame(
    State(state): State<AppState>,
    Json(request): Json<DecodeRequest>,
) -> ApiResult<TerminalSnapshot> {
    respond(state.terminal.decoded(request.payload, Origin::Live).await)
}

/// POST /api/capture/image - Still-image fallback.
pub async fn decode_image(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<TerminalSnapshot> {
    if body.is_empty() {
        return Err(AppError::BadRequest("Image body is empty".to_string()));
    }

    match state.decoder.decode_once(&body) {
        Ok(payload) => respond(state.terminal.decoded(payload, Origin::Still).await),
        Err(e) => {
            tracing::debug!(error = %e, bytes = body.len(), "Still image yielded no code");
            respond(state.terminal.notify(NoticeKind::Invalid, e.to_string()).await)
        }
    }
}
