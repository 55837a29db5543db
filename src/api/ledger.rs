//! Ledger endpoints.

use axum::extract::{Path, State};
use serde::Serialize;

use super::{respond, ApiResult};
use crate::models::{LedgerEntry, TerminalSnapshot};
use crate::AppState;

/// Result of clearing the ledger.
#[derive(Debug, Serialize)]
pub struct ClearedLedger {
    pub removed: usize,
}

/// GET /api/ledger - All scanned teams, most recent first.
pub async fn list_ledger(State(state): State<AppState>) -> ApiResult<Vec<LedgerEntry>> {
    respond(state.terminal.ledger().await)
}

/// GET /api/ledger/{key} - One scanned team.
pub async fn get_ledger_entry(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<LedgerEntry> {
    respond(state.terminal.ledger_entry(key).await)
}

/// POST /api/ledger/{key}/open - Re-open a scanned team from the registry.
pub async fn open_ledger_entry(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<TerminalSnapshot> {
    respond(state.terminal.open_from_ledger(key).await)
}

/// DELETE /api/ledger - Wipe this device's scan history.
pub async fn clear_ledger(State(state): State<AppState>) -> ApiResult<ClearedLedger> {
    respond(
        state
            .terminal
            .clear_ledger()
            .await
            .map(|removed| ClearedLedger { removed }),
    )
}
