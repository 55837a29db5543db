//! Remote lock watchdog.
//!
//! Polls a status endpoint and mirrors the result into a single boolean.
//! It never touches the scan pipeline: the operator router consults the
//! flag and refuses requests while the terminal is locked.

use std::time::Duration;

use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use reqwest::{Client, Url};
use serde::Deserialize;
use tokio::sync::watch;

use crate::errors::AppError;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Body of the status endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockStatus {
    #[serde(default)]
    allowed: Option<bool>,
    #[serde(default)]
    force_logout: Option<bool>,
}

impl LockStatus {
    fn locked(&self) -> bool {
        self.allowed == Some(false) || self.force_logout == Some(true)
    }
}

/// Poller for the remote kill switch.
pub struct LockWatchdog {
    http: Client,
    status_url: Url,
    app_id: String,
    poll: Duration,
}

impl LockWatchdog {
    pub fn new(
        status_url: &str,
        app_id: impl Into<String>,
        poll: Duration,
    ) -> Result<Self, AppError> {
        let status_url = Url::parse(status_url)
            .map_err(|e| AppError::Validation(format!("Invalid lock status url: {}", e)))?;
        let http = Client::builder()
            .timeout(poll.max(Duration::from_secs(5)))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build http client: {}", e)))?;

        Ok(Self {
            http,
            status_url,
            app_id: app_id.into(),
            poll,
        })
    }

    /// Start polling. The receiver starts unlocked.
    pub fn spawn(self) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(self.run(tx));
        rx
    }

    async fn run(self, tx: watch::Sender<bool>) {
        let mut delay = self.poll;
        loop {
            match self.check().await {
                Ok(locked) => {
                    let changed = tx.send_if_modified(|current| {
                        let changed = *current != locked;
                        *current = locked;
                        changed
                    });
                    if changed {
                        if locked {
                            tracing::warn!("Terminal locked remotely");
                        } else {
                            tracing::info!("Terminal unlocked remotely");
                        }
                    }
                    delay = self.poll;
                }
                Err(e) => {
                    delay = (delay * 2).min(MAX_BACKOFF);
                    tracing::warn!(error = %e, retry_in = ?delay, "Lock status check failed");
                }
            }

            if tx.is_closed() {
                break;
            }
            tokio::time::sleep(delay).await;
        }
    }

    async fn check(&self) -> Result<bool, reqwest::Error> {
        let mut url = self.status_url.clone();
        url.query_pairs_mut()
            .append_pair("appId", &self.app_id)
            .append_pair("t", &Utc::now().timestamp_millis().to_string());

        let status: LockStatus = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(status.locked())
    }
}

/// Watch receiver that is permanently unlocked, for terminals without a
/// status endpoint.
pub fn never_locked() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    // Dropping the sender freezes the value.
    drop(tx);
    rx
}

/// Refuse operator requests while locked.
pub async fn lock_gate(lock: watch::Receiver<bool>, request: Request, next: Next) -> Response {
    if *lock.borrow() {
        return AppError::Locked("Terminal is locked".to_string()).into_response();
    }
    next.run(request).await
}
