//! Types exchanged with the triage backend

use crate::symptoms::SymptomSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque session identifier issued by the access service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reply to one user utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantReply {
    pub text: String,
    /// `None` when the server sent no extraction; prior symptoms stay as they are
    pub symptoms: Option<SymptomSet>,
    pub off_topic: bool,
}

impl AssistantReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            symptoms: None,
            off_topic: false,
        }
    }

    pub fn with_symptoms(mut self, symptoms: SymptomSet) -> Self {
        self.symptoms = Some(symptoms);
        self
    }
}

/// Request to close a session and generate its report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeRequest {
    pub session_id: SessionId,
    pub patient_name: String,
    pub symptoms: SymptomSet,
}

/// Structured answer of the finalization service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeOutcome {
    pub success: bool,
    pub message: Option<String>,
    /// Server-side handle of the generated report
    pub report_handle: Option<String>,
}

impl FinalizeOutcome {
    pub fn succeeded(report_handle: Option<String>) -> Self {
        Self {
            success: true,
            message: None,
            report_handle,
        }
    }

    pub fn declined(message: Option<String>) -> Self {
        Self {
            success: false,
            message,
            report_handle: None,
        }
    }
}

/// Rendered report as downloaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDocument {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub file_name: String,
}

impl ReportDocument {
    pub fn default_file_name(session_id: &SessionId) -> String {
        format!("patient_report_{session_id}.pdf")
    }
}
