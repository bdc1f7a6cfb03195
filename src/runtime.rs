//! Runtime for driving a session
//!
//! The controller applies events to the state machine, executes the
//! resulting effects and streams updates to subscribers.

mod controller;
pub mod traits;

#[cfg(test)]
pub mod testing;


pub use controller::SessionController;
pub use traits::*;

use crate::state_machine::{Notice, SessionState};

/// Updates sent to subscribers
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    /// State after a transition was applied
    State(Box<SessionState>),
    Notice(Notice),
    /// A command was refused; carries the user-facing reason
    Rejected { message: String },
}

/// User commands accepted by [`SessionController::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SubmitCredential(String),
    Send(String),
    Finalize,
    FetchReport,
    ClearTranscript,
}
