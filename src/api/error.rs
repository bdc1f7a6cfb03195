//! Backend error types

use thiserror::Error;

/// Backend error with classification
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
    /// HTTP status, for rejections
    pub status: Option<u16>,
    /// Server-provided reason, for rejections that carried one
    pub reason: Option<String>,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            reason: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Network, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Malformed, message)
    }

    /// Server was reachable and declined the request
    pub fn rejected(status: u16, reason: Option<String>) -> Self {
        let message = match &reason {
            Some(reason) => format!("HTTP {status}: {reason}"),
            None => format!("HTTP {status}"),
        };
        Self {
            kind: ApiErrorKind::Rejected,
            message,
            status: Some(status),
            reason,
        }
    }

    pub fn is_transport(&self) -> bool {
        self.kind.is_transport()
    }
}

/// Error classification for user-facing messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Unreachable, timed out, or the body could not be read
    Network,
    /// Success status with a body we could not understand
    Malformed,
    /// Non-success status
    Rejected,
}

impl ApiErrorKind {
    pub fn is_transport(self) -> bool {
        matches!(self, Self::Network | Self::Malformed)
    }
}
