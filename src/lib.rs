//! Triage chat client
//!
//! Session and conversation lifecycle for a symptom-triage chat: access,
//! history restore, message exchange, symptom tracking, finalization and
//! report retrieval against the triage backend.

pub mod api;
pub mod cache;
pub mod config;
pub mod report;
pub mod runtime;
pub mod state_machine;
pub mod symptoms;
pub mod transcript;

pub use runtime::{Command, SessionController, SessionUpdate};
pub use state_machine::{Lifecycle, Notice, SessionContext, SessionState, TransitionError};
