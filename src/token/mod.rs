//! Scan payload parsing.
//!
//! A team QR carries a small JSON object such as `{"teamCode":"TX42"}`.
//! Anything else is "not a team QR": the caller logs it and keeps scanning.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Why a payload was not recognized as a team QR.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("payload carries no team code")]
    MissingTeamCode,
}

/// Team code extracted from a scan payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TeamCode(String);

impl TeamCode {
    /// Wrap an already-known code, e.g. one read back from the ledger.
    pub fn new(code: &str) -> Option<Self> {
        let code = code.trim();
        (!code.is_empty()).then(|| TeamCode(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TeamCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract the team code from a raw decoded payload.
pub fn parse(raw: &str) -> Result<TeamCode, ParseError> {
    let value: Value = serde_json::from_str(raw.trim()).map_err(|_| ParseError::NotAnObject)?;
    let object = value.as_object().ok_or(ParseError::NotAnObject)?;

    let code = match object.get("teamCode") {
        Some(Value::String(s)) => TeamCode::new(s),
        Some(Value::Number(n)) => TeamCode::new(&n.to_string()),
        _ => None,
    };
    code.ok_or(ParseError::MissingTeamCode)
}
