//! Local ledger of resolved teams.
//!
//! Every mutation is written to SQLite before the call returns, so a crash
//! loses at most the scan that was in flight. Reads are served from an
//! in-memory index loaded at open.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::{Commit, LedgerEntry, TeamRecord};

/// Device-local, most-recent-first record of resolved teams.
pub struct Ledger {
    pool: SqlitePool,
    namespace: String,
    entries: HashMap<String, LedgerEntry>,
    /// Keys, most recent first.
    order: Vec<String>,
    /// Lowest position handed out so far; new entries go below it.
    head: i64,
}

impl Ledger {
    /// Load the ledger stored under `namespace`.
    pub async fn open(pool: SqlitePool, namespace: impl Into<String>) -> Result<Self, AppError> {
        let namespace = namespace.into();
        let rows = sqlx::query(
            "SELECT entry_key, position, team, resolved_at FROM ledger_entries WHERE namespace = ? ORDER BY position ASC",
        )
        .bind(&namespace)
        .fetch_all(&pool)
        .await?;

        let mut entries = HashMap::with_capacity(rows.len());
        let mut order = Vec::with_capacity(rows.len());
        let mut head = 0;

        for row in &rows {
            let key: String = row.get("entry_key");
            let position: i64 = row.get("position");
            head = head.min(position);

            match entry_from_row(row) {
                Ok(entry) => {
                    order.push(key.clone());
                    entries.insert(key, entry);
                }
                Err(e) => tracing::error!(entry_key = %key, error = %e, "Skipping unreadable ledger row"),
            }
        }

        tracing::info!(namespace = %namespace, entries = order.len(), "Ledger loaded");

        Ok(Self {
            pool,
            namespace,
            entries,
            order,
            head,
        })
    }

    /// Duplicate check by team code (or team id for code-less teams).
    pub fn lookup(&self, key: &str) -> Option<&LedgerEntry> {
        self.entries.get(key)
    }

    /// All entries, most recent first.
    pub fn all(&self) -> Vec<LedgerEntry> {
        self.order
            .iter()
            .filter_map(|key| self.entries.get(key))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Record a freshly resolved team. New teams go to the head; known teams
    /// are refreshed in place.
    pub async fn upsert(&mut self, team: TeamRecord) -> Result<LedgerEntry, AppError> {
        let key = team.ledger_key().to_string();
        let entry = LedgerEntry {
            team,
            resolved_at: Utc::now(),
        };
        let is_new = !self.entries.contains_key(&key);
        let position = self.head - 1;

        sqlx::query(
            r#"INSERT INTO ledger_entries (namespace, entry_key, position, team, resolved_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(namespace, entry_key)
               DO UPDATE SET team = excluded.team, resolved_at = excluded.resolved_at"#,
        )
        .bind(&self.namespace)
        .bind(&key)
        .bind(position)
        .bind(serde_json::to_string(&entry.team)?)
        .bind(entry.resolved_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if is_new {
            self.head = position;
            self.order.insert(0, key.clone());
        }
        self.entries.insert(key, entry.clone());
        Ok(entry)
    }

    /// Fold a successful commit into the ledgered snapshot, if the team is
    /// ledgered. Returns whether an entry was updated.
    pub async fn apply_commit(&mut self, commit: &Commit) -> Result<bool, AppError> {
        let key = commit.team_code();
        let Some(existing) = self.entries.get(key) else {
            return Ok(false);
        };

        let mut team = existing.team.clone();
        team.apply(commit);
        if team == existing.team {
            return Ok(true);
        }

        sqlx::query("UPDATE ledger_entries SET team = ? WHERE namespace = ? AND entry_key = ?")
            .bind(serde_json::to_string(&team)?)
            .bind(&self.namespace)
            .bind(key)
            .execute(&self.pool)
            .await?;

        if let Some(entry) = self.entries.get_mut(key) {
            entry.team = team;
        }
        Ok(true)
    }

    /// Operator-initiated wipe of this namespace.
    pub async fn clear(&mut self) -> Result<usize, AppError> {
        sqlx::query("DELETE FROM ledger_entries WHERE namespace = ?")
            .bind(&self.namespace)
            .execute(&self.pool)
            .await?;

        let removed = self.order.len();
        self.entries.clear();
        self.order.clear();
        self.head = 0;
        Ok(removed)
    }
}

fn entry_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<LedgerEntry, String> {
    let team: String = row.get("team");
    let resolved_at: String = row.get("resolved_at");

    let team: TeamRecord = serde_json::from_str(&team).map_err(|e| e.to_string())?;
    let resolved_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&resolved_at)
        .map_err(|e| e.to_string())?
        .with_timezone(&Utc);

    Ok(LedgerEntry { team, resolved_at })
}
