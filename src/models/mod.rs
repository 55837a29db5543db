//! Data models for the check-in terminal.
//!
//! Registry wire shapes are kept apart from the canonical team model so the
//! rest of the crate never sees the registry's field names.

mod ledger;
mod team;
mod terminal;
mod wire;

pub use ledger::*;
pub use team::*;
pub use terminal::*;
pub use wire::*;

#[cfg(test)]
pub(crate) use team::fixtures;
