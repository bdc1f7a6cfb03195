//! Session lifecycle state machine
//!
//! Pure transitions in the Elm style: `(state, event) -> (state, effects)`.
//! All I/O is described by [`Effect`]s and carried out by the runtime.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::{Effect, Notice};
pub use event::{Event, ReportFailure};
pub use state::{InFlight, Lifecycle, SessionContext, SessionState};
pub use transition::{transition, TransitionError, TransitionResult};
