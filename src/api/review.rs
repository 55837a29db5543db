//! Review panel endpoints.

use axum::{extract::State, Json};
use serde::Deserialize;

use super::{respond, ApiResult};
use crate::models::TerminalSnapshot;
use crate::terminal::CommitKind;
use crate::AppState;

/// Request body for toggling a member.
#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub email: String,
}

/// POST /api/review/toggle - Toggle a pending mark.
pub async fn toggle_member(
    State(state): State<AppState>,
    Json(request): Json<ToggleRequest>,
) -> ApiResult<TerminalSnapshot> {
    respond(state.terminal.toggle(request.email).await)
}

/// POST /api/review/submit - Commit the pending marks.
pub async fn submit(State(state): State<AppState>) -> ApiResult<TerminalSnapshot> {
    respond(state.terminal.submit(CommitKind::Selective).await)
}

/// POST /api/review/mark-all - Commit the whole team.
pub async fn mark_all(State(state): State<AppState>) -> ApiResult<TerminalSnapshot> {
    respond(state.terminal.submit(CommitKind::Bulk).await)
}

/// POST /api/review/dismiss - Close the review panel.
pub async fn dismiss(State(state): State<AppState>) -> ApiResult<TerminalSnapshot> {
    respond(state.terminal.dismiss().await)
}
