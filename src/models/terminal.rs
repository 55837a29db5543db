//! Operator-facing view of the terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MealSlot, Target, TeamRecord};
use crate::config::DuplicatePolicy;

/// What the terminal records when a team is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    Attendance,
    Food,
}

/// Lifecycle phase of the scan pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PhaseName {
    Ready,
    Scanning,
    Resolving,
    Review,
    Committing,
}

/// Whether the capture session is accepting frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraState {
    Idle,
    Armed,
}

/// How the active team got onto the review panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Selection {
    /// Freshly scanned.
    Preview,
    /// Re-opened from the ledger.
    Selected,
}

/// Operator-visible notice category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NoticeKind {
    NotFound,
    Transport,
    Commit,
    AlreadyProcessed,
    Invalid,
    Committed,
}

/// A transient message for the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub seq: u64,
    pub kind: NoticeKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_code: Option<String>,
    pub at: DateTime<Utc>,
}

/// One checkbox line on the review panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRow {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub leader: bool,
    pub completed: bool,
    pub selected: bool,
}

/// The review panel for the active team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
    pub selection: Selection,
    pub team: TeamRecord,
    /// `None` in food mode until a meal is picked.
    pub target: Option<Target>,
    pub rows: Vec<MemberRow>,
    pub already_completed: bool,
    pub can_submit: bool,
    pub committing: bool,
}

/// Full terminal state as the operator UI renders it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalSnapshot {
    pub phase: PhaseName,
    pub mode: Mode,
    pub meal_type: Option<MealSlot>,
    pub camera: CameraState,
    pub duplicate_policy: DuplicatePolicy,
    pub review: Option<ReviewView>,
    pub notices: Vec<Notice>,
}
