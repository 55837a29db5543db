//! Ledger entry model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TeamRecord;

/// A team as this device last observed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub team: TeamRecord,
    pub resolved_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn key(&self) -> &str {
        self.team.ledger_key()
    }
}
