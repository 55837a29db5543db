//! The scan → review → commit state machine.
//!
//! Synchronous and side-effect free apart from its own fields: the actor
//! in [`super`] performs the network calls and ledger writes the machine
//! asks for, and feeds the results back in.

use std::collections::{BTreeSet, VecDeque};
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::capture::CaptureController;
use crate::config::DuplicatePolicy;
use crate::errors::AppError;
use crate::models::{
    Commit, LedgerEntry, MealSlot, MemberRow, Mode, Notice, NoticeKind, PhaseName, ReviewView,
    Selection, Target, TeamRecord, TerminalSnapshot,
};
use crate::registry::{CommitError, ResolveError};
use crate::token::TeamCode;

const MAX_NOTICES: usize = 20;

/// Where a candidate team code came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Live camera frame.
    Live,
    /// Still-image fallback.
    Still,
    /// Re-opened from the ledger.
    Ledger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Ready,
    Scanning,
    Resolving {
        ticket: u64,
        origin: Origin,
        /// Go back to scanning (rather than ready) if resolution fails.
        resume_scanning: bool,
    },
    Review,
    Committing {
        ticket: u64,
    },
}

impl Phase {
    pub fn name(&self) -> PhaseName {
        match self {
            Phase::Ready => PhaseName::Ready,
            Phase::Scanning => PhaseName::Scanning,
            Phase::Resolving { .. } => PhaseName::Resolving,
            Phase::Review => PhaseName::Review,
            Phase::Committing { .. } => PhaseName::Committing,
        }
    }
}

/// Selective commits send the pending marks; bulk commits send everyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitKind {
    Selective,
    Bulk,
}

/// Result of feeding a resolve response back in.
#[derive(Debug, PartialEq)]
pub enum ResolveOutcome {
    /// The cycle was abandoned; nothing applied.
    Stale,
    /// Team is under review; record it in the ledger.
    Resolved(TeamRecord),
    Failed,
}

/// Result of feeding a commit response back in.
#[derive(Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Registry accepted the write; fold it into the ledger.
    Applied,
    Failed,
}

#[derive(Debug, Clone)]
struct Active {
    team: TeamRecord,
    selection: Selection,
}

/// Terminal state. Owned by exactly one actor.
#[derive(Debug)]
pub struct Machine {
    phase: Phase,
    mode: Mode,
    meal: Option<MealSlot>,
    active: Option<Active>,
    pending: BTreeSet<String>,
    capture: CaptureController,
    notices: VecDeque<Notice>,
    next_seq: u64,
    next_ticket: u64,
    auto_rearm: bool,
}

impl Machine {
    pub fn new(rearm_delay: Duration, auto_rearm: bool) -> Self {
        Self {
            phase: Phase::Ready,
            mode: Mode::Attendance,
            meal: None,
            active: None,
            pending: BTreeSet::new(),
            capture: CaptureController::new(rearm_delay),
            notices: VecDeque::new(),
            next_seq: 1,
            next_ticket: 1,
            auto_rearm,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn invalid(&self, message: &str) -> AppError {
        AppError::invalid_state(message, self.phase.name())
    }

    fn ticket(&mut self) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        ticket
    }

    /// Raise an operator-visible notice.
    pub fn notice(&mut self, kind: NoticeKind, message: impl Into<String>, team_code: Option<&str>) {
        let notice = Notice {
            seq: self.next_seq,
            kind,
            message: message.into(),
            team_code: team_code.map(str::to_string),
            at: Utc::now(),
        };
        self.next_seq += 1;
        tracing::info!(kind = ?notice.kind, team_code = ?notice.team_code, "{}", notice.message);

        if self.notices.len() == MAX_NOTICES {
            self.notices.pop_front();
        }
        self.notices.push_back(notice);
    }

    /// What the current mode commits, if determined.
    pub fn target(&self) -> Option<Target> {
        match self.mode {
            Mode::Attendance => Some(Target::Attendance),
            Mode::Food => self.meal.map(Target::Meal),
        }
    }

    fn clear_selection(&mut self) {
        self.active = None;
        self.pending.clear();
    }

    // ==================== CAPTURE ====================

    pub fn start_capture(&mut self) -> Result<(), AppError> {
        match self.phase {
            Phase::Ready => {
                self.clear_selection();
                self.phase = Phase::Scanning;
                self.capture.arm();
                Ok(())
            }
            Phase::Scanning => Ok(()),
            _ => Err(self.invalid("Capture can only start from READY")),
        }
    }

    /// Stop scanning. An in-flight resolution is abandoned and its response
    /// will be discarded.
    pub fn stop_capture(&mut self) -> Result<(), AppError> {
        match self.phase {
            Phase::Ready => Ok(()),
            Phase::Scanning | Phase::Resolving { .. } => {
                self.phase = Phase::Ready;
                self.capture.disarm();
                Ok(())
            }
            _ => Err(self.invalid("Dismiss the review panel first")),
        }
    }

    /// Whether a decoded payload from `origin` may enter the pipeline now.
    /// At most one resolution is ever in flight.
    pub fn admits(&self, origin: Origin, now: Instant) -> bool {
        match origin {
            Origin::Live => self.phase == Phase::Scanning && self.capture.accepts_frame(now),
            Origin::Still | Origin::Ledger => {
                matches!(self.phase, Phase::Ready | Phase::Scanning)
            }
        }
    }

    /// Enter RESOLVING for `code`. Returns the ticket the response must carry.
    pub fn begin_resolve(&mut self, code: &TeamCode, origin: Origin) -> Result<u64, AppError> {
        let resume_scanning = match (self.phase, origin) {
            (Phase::Scanning, _) => true,
            (Phase::Ready, Origin::Still | Origin::Ledger) => false,
            _ => return Err(self.invalid("A team is already being processed")),
        };

        let ticket = self.ticket();
        tracing::debug!(team_code = %code, ticket, ?origin, "Resolving");
        self.clear_selection();
        self.phase = Phase::Resolving {
            ticket,
            origin,
            resume_scanning,
        };
        Ok(ticket)
    }

    /// A scanned team is already ledgered and the policy rejects repeats.
    pub fn reject_duplicate(&mut self, entry: &LedgerEntry, now: Instant) {
        self.notice(
            NoticeKind::AlreadyProcessed,
            format!("{} was already scanned", entry.team.team_name),
            Some(entry.key()),
        );
        if self.phase == Phase::Scanning {
            self.capture.arm_after_guard(now);
        }
    }

    pub fn finish_resolve(
        &mut self,
        ticket: u64,
        result: Result<TeamRecord, ResolveError>,
        now: Instant,
    ) -> ResolveOutcome {
        let Phase::Resolving {
            ticket: current,
            origin,
            resume_scanning,
        } = self.phase
        else {
            tracing::debug!(ticket, "Discarding resolve response for a closed cycle");
            return ResolveOutcome::Stale;
        };
        if current != ticket {
            tracing::debug!(ticket, current, "Discarding stale resolve response");
            return ResolveOutcome::Stale;
        }

        match result {
            Ok(team) => {
                self.phase = Phase::Review;
                self.capture.disarm();
                self.pending.clear();
                self.active = Some(Active {
                    team: team.clone(),
                    selection: match origin {
                        Origin::Ledger => Selection::Selected,
                        Origin::Live | Origin::Still => Selection::Preview,
                    },
                });
                ResolveOutcome::Resolved(team)
            }
            Err(err) => {
                match &err {
                    ResolveError::NotFound(code) => {
                        self.notice(NoticeKind::NotFound, "Invalid team", Some(code))
                    }
                    ResolveError::Transport(detail) => self.notice(
                        NoticeKind::Transport,
                        format!("Registry unreachable, scan again ({})", detail),
                        None,
                    ),
                }
                if resume_scanning {
                    self.phase = Phase::Scanning;
                    self.capture.arm_after_guard(now);
                } else {
                    self.phase = Phase::Ready;
                    self.capture.disarm();
                }
                ResolveOutcome::Failed
            }
        }
    }

    // ==================== REVIEW ====================

    /// Switch between attendance and food. Only allowed when idle.
    pub fn set_mode(&mut self, mode: Mode, meal: Option<MealSlot>) -> Result<(), AppError> {
        if self.phase != Phase::Ready {
            return Err(self.invalid("Mode can only change in READY"));
        }
        self.mode = mode;
        self.meal = match mode {
            Mode::Attendance => None,
            Mode::Food => meal,
        };
        self.clear_selection();
        Ok(())
    }

    pub fn set_meal(&mut self, meal: MealSlot) -> Result<(), AppError> {
        if self.mode != Mode::Food {
            return Err(AppError::Validation(
                "Meal type only applies in FOOD mode".to_string(),
            ));
        }
        if matches!(self.phase, Phase::Resolving { .. } | Phase::Committing { .. }) {
            return Err(self.invalid("Wait for the current request to finish"));
        }
        if self.meal != Some(meal) {
            self.meal = Some(meal);
            self.pending.clear();
        }
        Ok(())
    }

    pub fn toggle(&mut self, email: &str) -> Result<(), AppError> {
        if self.phase != Phase::Review {
            return Err(self.invalid("No team under review"));
        }
        let target = self.target().ok_or_else(|| {
            AppError::Validation("Select a meal first".to_string())
        })?;
        let Some(active) = &self.active else {
            return Err(self.invalid("No team under review"));
        };
        if !active.team.is_on_roster(email) {
            return Err(AppError::Validation(format!("{} is not on this team", email)));
        }
        if active.team.is_completed(target, email) {
            return Err(AppError::Validation(format!("{} is already completed", email)));
        }

        if !self.pending.remove(email) {
            self.pending.insert(email.to_string());
        }
        Ok(())
    }

    /// Build the commit for the active team and enter COMMITTING.
    ///
    /// `Ok(None)` means everything requested is already recorded: an
    /// already-completed notice is raised and nothing is sent.
    pub fn begin_commit(&mut self, kind: CommitKind) -> Result<Option<(u64, Commit)>, AppError> {
        if self.phase != Phase::Review {
            return Err(self.invalid("No team under review"));
        }
        let target = self
            .target()
            .ok_or_else(|| AppError::Validation("Select a meal first".to_string()))?;
        let Some(active) = &self.active else {
            return Err(self.invalid("No team under review"));
        };
        let team = &active.team;
        let team_code = team.team_code.clone();
        if team_code.trim().is_empty() {
            return Err(AppError::Validation(
                "Team has no code to commit against".to_string(),
            ));
        }

        let outstanding = team.outstanding(target);
        let emails: Vec<String> = match kind {
            CommitKind::Selective => {
                if self.pending.is_empty() {
                    return Err(AppError::Validation("No members selected".to_string()));
                }
                outstanding
                    .into_iter()
                    .filter(|e| self.pending.contains(e))
                    .collect()
            }
            CommitKind::Bulk => outstanding,
        };

        if emails.is_empty() {
            let name = team.team_name.clone();
            self.notice(
                NoticeKind::AlreadyProcessed,
                format!("{} is already completed", name),
                Some(&team_code),
            );
            return Ok(None);
        }

        let commit = match (target, kind) {
            (Target::Attendance, CommitKind::Bulk) => Commit::AllPresent { team_code },
            (Target::Attendance, CommitKind::Selective) => Commit::Attendance { team_code, emails },
            (Target::Meal(meal), _) => Commit::Food {
                team_code,
                meal,
                emails,
            },
        };

        let ticket = self.ticket();
        self.phase = Phase::Committing { ticket };
        Ok(Some((ticket, commit)))
    }

    pub fn finish_commit(
        &mut self,
        ticket: u64,
        commit: &Commit,
        result: Result<(), CommitError>,
    ) -> CommitOutcome {
        let current = self.phase == Phase::Committing { ticket };
        let code = commit.team_code().to_string();

        match result {
            Ok(()) => {
                let message = match commit {
                    Commit::Attendance { emails, .. } => {
                        format!("Attendance recorded for {} member(s)", emails.len())
                    }
                    Commit::AllPresent { .. } => "Whole team marked present".to_string(),
                    Commit::Food { meal, emails, .. } => {
                        format!("{} recorded for {} member(s)", meal.as_str(), emails.len())
                    }
                };
                self.notice(NoticeKind::Committed, message, Some(&code));
                if current {
                    self.clear_selection();
                    if self.auto_rearm {
                        self.phase = Phase::Scanning;
                        self.capture.arm();
                    } else {
                        self.phase = Phase::Ready;
                    }
                }
                CommitOutcome::Applied
            }
            Err(err) => {
                self.notice(
                    NoticeKind::Commit,
                    format!("Could not save, try again ({})", err),
                    Some(&code),
                );
                if current {
                    self.phase = Phase::Review;
                }
                CommitOutcome::Failed
            }
        }
    }

    /// Close the review panel. An in-flight commit keeps running; its
    /// response will only update the ledger.
    pub fn dismiss(&mut self) -> Result<(), AppError> {
        match self.phase {
            Phase::Ready => Ok(()),
            Phase::Review | Phase::Committing { .. } => {
                self.clear_selection();
                self.phase = Phase::Ready;
                self.capture.disarm();
                Ok(())
            }
            _ => Err(self.invalid("No team under review")),
        }
    }

    // ==================== VIEW ====================

    pub fn snapshot(&self, duplicate_policy: DuplicatePolicy) -> TerminalSnapshot {
        TerminalSnapshot {
            phase: self.phase.name(),
            mode: self.mode,
            meal_type: self.meal,
            camera: self.capture.state(),
            duplicate_policy,
            review: self.review_view(),
            notices: self.notices.iter().cloned().collect(),
        }
    }

    fn review_view(&self) -> Option<ReviewView> {
        let active = self.active.as_ref()?;
        let team = &active.team;
        let target = self.target();

        let rows = team
            .roster()
            .into_iter()
            .map(|m| MemberRow {
                name: m.name.clone(),
                email: m.email.clone(),
                phone: m.phone.clone(),
                leader: m.email == team.leader.email,
                completed: target.is_some_and(|t| team.is_completed(t, &m.email)),
                selected: self.pending.contains(&m.email),
            })
            .collect();

        let already_completed = target.is_some_and(|t| team.outstanding(t).is_empty());
        let committing = matches!(self.phase, Phase::Committing { .. });

        Some(ReviewView {
            selection: active.selection,
            team: team.clone(),
            target,
            rows,
            already_completed,
            can_submit: self.phase == Phase::Review && target.is_some() && !already_completed,
            committing,
        })
    }
}
