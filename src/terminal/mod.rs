//! The terminal actor.
//!
//! One task owns the state machine, the ledger and the registry client.
//! Operator actions, decode callbacks and network responses all arrive as
//! [`Command`]s on a single queue, so the machine is only ever touched from
//! that task. Registry calls run on spawned tasks and report back through
//! the same queue; the actor never waits on the network.

mod machine;

pub use machine::{CommitKind, CommitOutcome, Machine, Origin, ResolveOutcome};

use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

use crate::config::{Config, DuplicatePolicy};
use crate::db::Ledger;
use crate::errors::AppError;
use crate::models::{Commit, LedgerEntry, MealSlot, Mode, NoticeKind, TeamRecord, TerminalSnapshot};
use crate::registry::{CommitError, RegistryClient, ResolveError};
use crate::token::{self, TeamCode};

const QUEUE_DEPTH: usize = 64;

type Reply<T> = oneshot::Sender<Result<T, AppError>>;

/// Messages handled by the terminal actor.
enum Command {
    Snapshot(Reply<TerminalSnapshot>),
    SetMode {
        mode: Mode,
        meal: Option<MealSlot>,
        reply: Reply<TerminalSnapshot>,
    },
    SetMeal {
        meal: MealSlot,
        reply: Reply<TerminalSnapshot>,
    },
    StartCapture(Reply<TerminalSnapshot>),
    StopCapture(Reply<TerminalSnapshot>),
    Decoded {
        payload: String,
        origin: Origin,
        reply: Reply<TerminalSnapshot>,
    },
    Notice {
        kind: NoticeKind,
        message: String,
        reply: Reply<TerminalSnapshot>,
    },
    Toggle {
        email: String,
        reply: Reply<TerminalSnapshot>,
    },
    Submit {
        kind: CommitKind,
        reply: Reply<TerminalSnapshot>,
    },
    Dismiss(Reply<TerminalSnapshot>),
    Ledger(Reply<Vec<LedgerEntry>>),
    LedgerEntry {
        key: String,
        reply: Reply<LedgerEntry>,
    },
    OpenFromLedger {
        key: String,
        reply: Reply<TerminalSnapshot>,
    },
    ClearLedger(Reply<usize>),
    Resolved {
        ticket: u64,
        result: Result<TeamRecord, ResolveError>,
    },
    Committed {
        ticket: u64,
        commit: Commit,
        result: Result<(), CommitError>,
    },
}

/// Cloneable handle to the terminal actor.
#[derive(Clone)]
pub struct TerminalHandle {
    tx: mpsc::Sender<Command>,
}

/// Start the actor on the current runtime.
pub fn spawn(config: &Config, ledger: Ledger, registry: RegistryClient) -> TerminalHandle {
    let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
    let terminal = Terminal {
        machine: Machine::new(config.rearm_delay, config.auto_rearm),
        ledger,
        registry,
        policy: config.duplicate_policy,
        tx: tx.downgrade(),
    };
    tokio::spawn(terminal.run(rx));
    TerminalHandle { tx }
}

impl TerminalHandle {
    async fn call<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, AppError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| AppError::Internal("Terminal is not running".to_string()))?;
        rx.await
            .map_err(|_| AppError::Internal("Terminal dropped the request".to_string()))?
    }

    pub async fn snapshot(&self) -> Result<TerminalSnapshot, AppError> {
        self.call(Command::Snapshot).await
    }

    pub async fn set_mode(
        &self,
        mode: Mode,
        meal: Option<MealSlot>,
    ) -> Result<TerminalSnapshot, AppError> {
        self.call(|reply| Command::SetMode { mode, meal, reply }).await
    }

    pub async fn set_meal(&self, meal: MealSlot) -> Result<TerminalSnapshot, AppError> {
        self.call(|reply| Command::SetMeal { meal, reply }).await
    }

    pub async fn start_capture(&self) -> Result<TerminalSnapshot, AppError> {
        self.call(Command::StartCapture).await
    }

    pub async fn stop_capture(&self) -> Result<TerminalSnapshot, AppError> {
        self.call(Command::StopCapture).await
    }

    /// Feed a decoded payload into the pipeline.
    pub async fn decoded(
        &self,
        payload: String,
        origin: Origin,
    ) -> Result<TerminalSnapshot, AppError> {
        self.call(|reply| Command::Decoded {
            payload,
            origin,
            reply,
        })
        .await
    }

    /// Raise a notice that originates outside the machine (e.g. a failed
    /// still-image decode).
    pub async fn notify(
        &self,
        kind: NoticeKind,
        message: impl Into<String>,
    ) -> Result<TerminalSnapshot, AppError> {
        let message = message.into();
        self.call(|reply| Command::Notice {
            kind,
            message,
            reply,
        })
        .await
    }

    pub async fn toggle(&self, email: String) -> Result<TerminalSnapshot, AppError> {
        self.call(|reply| Command::Toggle { email, reply }).await
    }

    pub async fn submit(&self, kind: CommitKind) -> Result<TerminalSnapshot, AppError> {
        self.call(|reply| Command::Submit { kind, reply }).await
    }

    pub async fn dismiss(&self) -> Result<TerminalSnapshot, AppError> {
        self.call(Command::Dismiss).await
    }

    pub async fn ledger(&self) -> Result<Vec<LedgerEntry>, AppError> {
        self.call(Command::Ledger).await
    }

    pub async fn ledger_entry(&self, key: String) -> Result<LedgerEntry, AppError> {
        self.call(|reply| Command::LedgerEntry { key, reply }).await
    }

    pub async fn open_from_ledger(&self, key: String) -> Result<TerminalSnapshot, AppError> {
        self.call(|reply| Command::OpenFromLedger { key, reply })
            .await
    }

    pub async fn clear_ledger(&self) -> Result<usize, AppError> {
        self.call(Command::ClearLedger).await
    }
}

struct Terminal {
    machine: Machine,
    ledger: Ledger,
    registry: RegistryClient,
    policy: DuplicatePolicy,
    tx: mpsc::WeakSender<Command>,
}

impl Terminal {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        tracing::info!(policy = ?self.policy, ledger = self.ledger.len(), "Terminal started");
        while let Some(command) = rx.recv().await {
            self.handle(command).await;
        }
        tracing::info!("Terminal stopped");
    }

    fn snapshot(&self) -> TerminalSnapshot {
        self.machine.snapshot(self.policy)
    }

    fn respond(&self, reply: Reply<TerminalSnapshot>, result: Result<(), AppError>) {
        let _ = reply.send(result.map(|()| self.snapshot()));
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Snapshot(reply) => {
                let _ = reply.send(Ok(self.snapshot()));
            }
            Command::SetMode { mode, meal, reply } => {
                let result = self.machine.set_mode(mode, meal);
                self.respond(reply, result);
            }
            Command::SetMeal { meal, reply } => {
                let result = self.machine.set_meal(meal);
                self.respond(reply, result);
            }
            Command::StartCapture(reply) => {
                let result = self.machine.start_capture();
                self.respond(reply, result);
            }
            Command::StopCapture(reply) => {
                let result = self.machine.stop_capture();
                self.respond(reply, result);
            }
            Command::Decoded {
                payload,
                origin,
                reply,
            } => {
                self.on_decoded(&payload, origin);
                self.respond(reply, Ok(()));
            }
            Command::Notice {
                kind,
                message,
                reply,
            } => {
                self.machine.notice(kind, message, None);
                self.respond(reply, Ok(()));
            }
            Command::Toggle { email, reply } => {
                let result = self.machine.toggle(&email);
                self.respond(reply, result);
            }
            Command::Submit { kind, reply } => {
                let result = self.on_submit(kind);
                self.respond(reply, result);
            }
            Command::Dismiss(reply) => {
                let result = self.machine.dismiss();
                self.respond(reply, result);
            }
            Command::Ledger(reply) => {
                let _ = reply.send(Ok(self.ledger.all()));
            }
            Command::LedgerEntry { key, reply } => {
                let result = self
                    .ledger
                    .lookup(&key)
                    .cloned()
                    .ok_or_else(|| AppError::NotFound(format!("Team {} not in ledger", key)));
                let _ = reply.send(result);
            }
            Command::OpenFromLedger { key, reply } => {
                let result = self.on_open(&key);
                self.respond(reply, result);
            }
            Command::ClearLedger(reply) => {
                let result = self.ledger.clear().await;
                if let Ok(removed) = result {
                    tracing::info!(removed, "Ledger cleared by operator");
                }
                let _ = reply.send(result);
            }
            Command::Resolved { ticket, result } => self.on_resolved(ticket, result).await,
            Command::Committed {
                ticket,
                commit,
                result,
            } => self.on_committed(ticket, commit, result).await,
        }
    }

    fn on_decoded(&mut self, payload: &str, origin: Origin) {
        let now = Instant::now();
        if !self.machine.admits(origin, now) {
            tracing::debug!(?origin, phase = ?self.machine.phase(), "Dropping decode event");
            return;
        }

        let code = match token::parse(payload) {
            Ok(code) => code,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring payload that is not a team QR");
                return;
            }
        };

        if self.policy == DuplicatePolicy::Reject {
            if let Some(entry) = self.ledger.lookup(code.as_str()) {
                self.machine.reject_duplicate(entry, now);
                return;
            }
        }

        self.begin_resolve(code, origin);
    }

    fn on_open(&mut self, key: &str) -> Result<(), AppError> {
        let entry = self
            .ledger
            .lookup(key)
            .ok_or_else(|| AppError::NotFound(format!("Team {} not in ledger", key)))?;
        let code = TeamCode::new(&entry.team.team_code).ok_or_else(|| {
            AppError::Validation(format!("Team {} has no code to verify", key))
        })?;

        if !self.machine.admits(Origin::Ledger, Instant::now()) {
            return Err(AppError::invalid_state(
                "Finish the current team first",
                self.machine.phase().name(),
            ));
        }
        self.begin_resolve(code, Origin::Ledger);
        Ok(())
    }

    fn begin_resolve(&mut self, code: TeamCode, origin: Origin) {
        let Some(tx) = self.tx.upgrade() else {
            tracing::warn!(team_code = %code, "Terminal is shutting down, scan ignored");
            return;
        };
        let ticket = match self.machine.begin_resolve(&code, origin) {
            Ok(ticket) => ticket,
            Err(e) => {
                tracing::debug!(error = %e, "Resolution not started");
                return;
            }
        };

        let registry = self.registry.clone();
        tokio::spawn(async move {
            let result = registry.resolve(&code).await;
            let _ = tx.send(Command::Resolved { ticket, result }).await;
        });
    }

    async fn on_resolved(&mut self, ticket: u64, result: Result<TeamRecord, ResolveError>) {
        if let ResolveOutcome::Resolved(team) =
            self.machine.finish_resolve(ticket, result, Instant::now())
        {
            let code = team.ledger_key().to_string();
            if let Err(e) = self.ledger.upsert(team).await {
                tracing::error!(team_code = %code, error = %e, "Failed to record scan");
                self.history_not_saved(&code);
            }
        }
    }

    fn on_submit(&mut self, kind: CommitKind) -> Result<(), AppError> {
        let Some(tx) = self.tx.upgrade() else {
            return Err(AppError::Internal("Terminal is shutting down".to_string()));
        };
        let Some((ticket, commit)) = self.machine.begin_commit(kind)? else {
            return Ok(());
        };

        let registry = self.registry.clone();
        tokio::spawn(async move {
            let result = registry.commit(&commit).await;
            let _ = tx
                .send(Command::Committed {
                    ticket,
                    commit,
                    result,
                })
                .await;
        });
        Ok(())
    }

    async fn on_committed(&mut self, ticket: u64, commit: Commit, result: Result<(), CommitError>) {
        if self.machine.finish_commit(ticket, &commit, result) == CommitOutcome::Applied {
            if let Err(e) = self.ledger.apply_commit(&commit).await {
                tracing::error!(team_code = %commit.team_code(), error = %e, "Failed to update ledger after commit");
                self.history_not_saved(commit.team_code());
            }
        }
    }

    fn history_not_saved(&mut self, code: &str) {
        self.machine.notice(
            NoticeKind::Invalid,
            "Scan history could not be saved on this device",
            Some(code),
        );
    }
}
