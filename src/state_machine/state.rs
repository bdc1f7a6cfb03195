//! Session state types

use crate::api::SessionId;
use crate::symptoms::SymptomSet;
use crate::transcript::{IdClock, Transcript};
use serde::{Deserialize, Serialize};

/// Where the session is in its lifecycle.
///
/// Moves forward only, except `Finalizing -> Active` when finalization fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// No credential accepted yet
    #[default]
    Unauthenticated,
    /// Conversation open
    Active,
    /// Finalize request outstanding
    Finalizing,
    /// Session closed; only report retrieval remains
    Ended,
}

impl Lifecycle {
    pub fn as_str(self) -> &'static str {
        match self {
            Lifecycle::Unauthenticated => "unauthenticated",
            Lifecycle::Active => "active",
            Lifecycle::Finalizing => "finalizing",
            Lifecycle::Ended => "ended",
        }
    }
}

/// Outstanding requests, one flag per category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InFlight {
    pub access: bool,
    pub history: bool,
    pub exchange: bool,
    pub report: bool,
}

/// Everything the controller knows about the session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: Option<SessionId>,
    pub lifecycle: Lifecycle,
    pub transcript: Transcript,
    pub symptoms: SymptomSet,
    pub in_flight: InFlight,
    #[serde(skip)]
    pub ids: IdClock,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh session over a transcript restored from the cache
    pub fn with_transcript(transcript: Transcript) -> Self {
        Self {
            ids: IdClock::after(transcript.messages()),
            transcript,
            ..Self::default()
        }
    }

    /// Whether an utterance would currently be accepted (ignoring its text)
    pub fn can_send(&self) -> bool {
        self.session_id.is_some()
            && self.lifecycle == Lifecycle::Active
            && !self.in_flight.history
            && !self.in_flight.exchange
    }

    pub fn is_ended(&self) -> bool {
        self.lifecycle == Lifecycle::Ended
    }

    /// True when `id` names the current session
    pub fn is_current(&self, id: &SessionId) -> bool {
        self.session_id.as_ref() == Some(id)
    }
}

/// Immutable inputs of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    /// Sent with the finalize request
    pub patient_name: String,
    /// Named in the closing confirmation
    pub delivery_destination: String,
}

impl SessionContext {
    pub fn new(patient_name: impl Into<String>, delivery_destination: impl Into<String>) -> Self {
        Self {
            patient_name: patient_name.into(),
            delivery_destination: delivery_destination.into(),
        }
    }
}
