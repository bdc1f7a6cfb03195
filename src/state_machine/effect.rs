//! Effects produced by state transitions

use crate::api::{FinalizeRequest, SessionId};
use crate::transcript::Message;
use serde::Serialize;
use std::fmt;

/// Effects to be executed after a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Exchange the credential for a session
    RedeemCredential { credential: String },

    /// Load prior messages of the session
    FetchHistory { session_id: SessionId },

    /// Send one utterance to the assistant
    SendUtterance { session_id: SessionId, text: String },

    /// Close the session and have the report delivered
    FinalizeSession(FinalizeRequest),

    /// Download, save and share the report
    FetchReport { session_id: SessionId },

    /// Overwrite the cached transcript
    PersistTranscript(Vec<Message>),

    /// Delete the cached transcript
    ClearCache,

    /// Tell the user something outside the transcript
    Notify(Notice),
}

impl Effect {
    pub fn persist(messages: &[Message]) -> Self {
        Effect::PersistTranscript(messages.to_vec())
    }

    /// Whether this effect starts a network request
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Effect::RedeemCredential { .. }
                | Effect::FetchHistory { .. }
                | Effect::SendUtterance { .. }
                | Effect::FinalizeSession(_)
                | Effect::FetchReport { .. }
        )
    }
}

/// User-facing notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    AccessGranted {
        session_id: SessionId,
    },
    AccessDenied {
        reason: String,
    },
    /// A request could not reach the service
    Connectivity {
        message: String,
    },
    SessionFinalized {
        symptom_count: usize,
        destination: String,
        report_handle: Option<String>,
    },
    FinalizeRejected {
        reason: String,
    },
    ReportSaved {
        location: String,
    },
    ReportShared {
        location: String,
    },
    ReportFailed {
        message: String,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::AccessGranted { session_id } => write!(f, "Access granted (session {session_id})."),
            Notice::AccessDenied { reason } => f.write_str(reason),
            Notice::Connectivity { message } => f.write_str(message),
            Notice::SessionFinalized {
                symptom_count,
                destination,
                report_handle,
            } => {
                write!(f, "Session finalized: {symptom_count} symptom(s) sent to {destination}.")?;
                if let Some(handle) = report_handle {
                    write!(f, " Report: {handle}")?;
                }
                Ok(())
            }
            Notice::FinalizeRejected { reason } => write!(f, "Could not finalize: {reason}"),
            Notice::ReportSaved { location } => write!(f, "Report saved to {location}"),
            Notice::ReportShared { location } => write!(f, "Report saved to {location} and shared"),
            Notice::ReportFailed { message } => f.write_str(message),
        }
    }
}
