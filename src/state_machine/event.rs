//! Events that drive the session

use crate::api::{ApiError, AssistantReply, FinalizeOutcome, SessionId};
use crate::report::ReportDelivery;
use crate::transcript::Message;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User commands
    CredentialSubmitted {
        credential: String,
    },
    UtteranceSubmitted {
        text: String,
    },
    FinalizeRequested,
    ReportRequested,
    TranscriptCleared,

    // Access
    AccessGranted {
        session_id: SessionId,
    },
    AccessFailed {
        error: ApiError,
    },

    // History
    HistoryLoaded {
        session_id: SessionId,
        messages: Vec<Message>,
    },
    HistoryFailed {
        session_id: SessionId,
        error: ApiError,
    },

    // Conversation
    ReplyReceived {
        session_id: SessionId,
        reply: AssistantReply,
    },
    ExchangeFailed {
        session_id: SessionId,
        error: ApiError,
    },

    // Finalization
    FinalizeCompleted {
        session_id: SessionId,
        outcome: FinalizeOutcome,
    },
    FinalizeFailed {
        session_id: SessionId,
        error: ApiError,
    },

    // Report
    ReportDelivered {
        session_id: SessionId,
        delivery: ReportDelivery,
    },
    ReportFailed {
        session_id: SessionId,
        failure: ReportFailure,
    },
}

impl Event {
    /// Session a completion belongs to, if it carries one
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Event::AccessGranted { session_id }
            | Event::HistoryLoaded { session_id, .. }
            | Event::HistoryFailed { session_id, .. }
            | Event::ReplyReceived { session_id, .. }
            | Event::ExchangeFailed { session_id, .. }
            | Event::FinalizeCompleted { session_id, .. }
            | Event::FinalizeFailed { session_id, .. }
            | Event::ReportDelivered { session_id, .. }
            | Event::ReportFailed { session_id, .. } => Some(session_id),
            _ => None,
        }
    }
}

/// Why a report fetch did not complete
#[derive(Debug, Clone)]
pub enum ReportFailure {
    /// The document could not be downloaded
    Download(ApiError),
    /// Downloaded, but saving or sharing failed
    Delivery(String),
}
