//! Terminal state endpoints.

use axum::{extract::State, Json};
use serde::Deserialize;

use super::{respond, ApiResult};
use crate::models::{MealSlot, Mode, TerminalSnapshot};
use crate::AppState;

/// Request body for switching mode.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetModeRequest {
    pub mode: Mode,
    #[serde(default)]
    pub meal_type: Option<MealSlot>,
}

/// Request body for picking a meal slot.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetMealRequest {
    pub meal_type: MealSlot,
}

/// GET /api/terminal - Current terminal snapshot.
pub async fn get_terminal(State(state): State<AppState>) -> ApiResult<TerminalSnapshot> {
    respond(state.terminal.snapshot().await)
}

/// PUT /api/terminal/mode - Switch between attendance and food.
pub async fn set_mode(
    State(state): State<AppState>,
    Json(request): Json<SetModeRequest>,
) -> ApiResult<TerminalSnapshot> {
    respond(state.terminal.set_mode(request.mode, request.meal_type).await)
}

/// PUT /api/terminal/meal - Pick the meal slot in food mode.
pub async fn set_meal(
    State(state): State<AppState>,
    Json(request): Json<SetMealRequest>,
) -> ApiResult<TerminalSnapshot> {
    respond(state.terminal.set_meal(request.meal_type).await)
}
