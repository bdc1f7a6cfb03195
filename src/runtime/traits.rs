//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the controller with mock implementations.

use crate::api::{
    ApiError, AssistantReply, FinalizeOutcome, FinalizeRequest, ReportDocument, SessionId,
};
use crate::transcript::Message;
use async_trait::async_trait;
use std::sync::Arc;

/// Exchanges an access credential for a session
#[async_trait]
pub trait AccessService: Send + Sync {
    async fn redeem(&self, credential: &str) -> Result<SessionId, ApiError>;
}

/// Prior messages of a session
#[async_trait]
pub trait HistoryService: Send + Sync {
    async fn history(&self, session_id: &SessionId) -> Result<Vec<Message>, ApiError>;
}

/// One utterance in, one reply out
#[async_trait]
pub trait ConversationService: Send + Sync {
    async fn send(&self, session_id: &SessionId, text: &str) -> Result<AssistantReply, ApiError>;
}

/// Closes a session and triggers report delivery
#[async_trait]
pub trait FinalizationService: Send + Sync {
    async fn finalize(&self, request: &FinalizeRequest) -> Result<FinalizeOutcome, ApiError>;
}

/// Downloads the rendered report of a finalized session
#[async_trait]
pub trait ReportService: Send + Sync {
    async fn fetch_report(&self, session_id: &SessionId) -> Result<ReportDocument, ApiError>;
}

/// Combined backend trait for convenience
pub trait Backend:
    AccessService + HistoryService + ConversationService + FinalizationService + ReportService
{
}
impl<T> Backend for T where
    T: AccessService + HistoryService + ConversationService + FinalizationService + ReportService
{
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: AccessService + ?Sized> AccessService for Arc<T> {
    async fn redeem(&self, credential: &str) -> Result<SessionId, ApiError> {
        (**self).redeem(credential).await
    }
}

#[async_trait]
impl<T: HistoryService + ?Sized> HistoryService for Arc<T> {
    async fn history(&self, session_id: &SessionId) -> Result<Vec<Message>, ApiError> {
        (**self).history(session_id).await
    }
}

#[async_trait]
impl<T: ConversationService + ?Sized> ConversationService for Arc<T> {
    async fn send(&self, session_id: &SessionId, text: &str) -> Result<AssistantReply, ApiError> {
        (**self).send(session_id, text).await
    }
}

#[async_trait]
impl<T: FinalizationService + ?Sized> FinalizationService for Arc<T> {
    async fn finalize(&self, request: &FinalizeRequest) -> Result<FinalizeOutcome, ApiError> {
        (**self).finalize(request).await
    }
}

#[async_trait]
impl<T: ReportService + ?Sized> ReportService for Arc<T> {
    async fn fetch_report(&self, session_id: &SessionId) -> Result<ReportDocument, ApiError> {
        (**self).fetch_report(session_id).await
    }
}
