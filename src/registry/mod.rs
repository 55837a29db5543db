//! Registry HTTP client.
//!
//! Stateless: every call is a single request against the registry, which
//! owns the authoritative team records. Writes are set-unions on the
//! registry side, so repeating any of them is harmless.

use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use thiserror::Error;

use crate::models::{Commit, FoodRequest, MemberAttendanceRequest, RegistryTeam, TeamRecord};
use crate::token::TeamCode;

const USER_AGENT: &str = concat!("checkin-terminal/", env!("CARGO_PKG_VERSION"));

/// Client construction error.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid registry url: {0}")]
    Url(String),
    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Resolution failure.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Unknown code, non-success status, or a payload missing required fields.
    #[error("team {0} not found")]
    NotFound(String),
    /// Network failure or timeout; retryable.
    #[error("registry unreachable: {0}")]
    Transport(String),
}

/// Commit failure.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("registry rejected commit ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("registry unreachable: {0}")]
    Transport(String),
}

/// HTTP client for the team registry.
#[derive(Clone)]
pub struct RegistryClient {
    http: Client,
    base: Url,
}

impl RegistryClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base = Url::parse(base_url).map_err(|e| ClientError::Url(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::Url(base_url.to_string()));
        }

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self { http, base })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// `GET /verify/{teamCode}`.
    pub async fn resolve(&self, code: &TeamCode) -> Result<TeamRecord, ResolveError> {
        let url = self.endpoint(&["verify", code.as_str()]);
        tracing::debug!(team_code = %code, url = %url, "Resolving team");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ResolveError::Transport(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            tracing::info!(team_code = %code, status = status.as_u16(), "Registry has no such team");
            return Err(ResolveError::NotFound(code.to_string()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ResolveError::Transport(e.to_string()))?;

        let mut wire: RegistryTeam = serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!(team_code = %code, error = %e, "Registry payload is missing required fields");
            ResolveError::NotFound(code.to_string())
        })?;

        // Older verify bodies omit the code; the team was found under the one we asked for.
        if wire.team_code.as_deref().map_or(true, |c| c.trim().is_empty()) {
            wire.team_code = Some(code.to_string());
        }

        Ok(wire.into())
    }

    /// Send one commit. Success means the registry accepted the union.
    pub async fn commit(&self, commit: &Commit) -> Result<(), CommitError> {
        let request = match commit {
            Commit::Attendance { team_code, emails } => self
                .http
                .patch(self.endpoint(&["member-attendance"]))
                .json(&MemberAttendanceRequest {
                    team_code: team_code.clone(),
                    present_members: emails.clone(),
                }),
            Commit::AllPresent { team_code } => self
                .http
                .patch(self.endpoint(&["mark-all-present", team_code.as_str()])),
            Commit::Food {
                team_code,
                meal,
                emails,
            } => self.http.patch(self.endpoint(&["food"])).json(&FoodRequest {
                team_code: team_code.clone(),
                meal_type: *meal,
                members: emails.clone(),
            }),
        };

        tracing::debug!(team_code = %commit.team_code(), ?commit, "Sending commit");

        let response = request
            .send()
            .await
            .map_err(|e| CommitError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CommitError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
