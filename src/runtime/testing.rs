//! Mock implementations for testing
//!
//! These mocks enable controller testing without real I/O.

use super::traits::*;
use crate::api::{
    ApiError, AssistantReply, FinalizeOutcome, FinalizeRequest, ReportDocument, SessionId,
};
use crate::cache::{CacheError, CacheResult, TranscriptCache};
use crate::report::{ReportDelivery, ReportError, ReportSink};
use crate::transcript::Message;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type Queue<T> = Mutex<VecDeque<Result<T, ApiError>>>;

fn next_or_unqueued<T>(queue: &Queue<T>) -> Result<T, ApiError> {
    queue
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(ApiError::network("No mock response queued")))
}

// ============================================================================
// Mock Backend
// ============================================================================

/// Backend that answers from per-service queues and records every call
#[derive(Default)]
pub struct MockBackend {
    sessions: Queue<SessionId>,
    histories: Queue<Vec<Message>>,
    replies: Queue<AssistantReply>,
    outcomes: Queue<FinalizeOutcome>,
    documents: Queue<ReportDocument>,
    /// Panic inside the next conversation call
    panic_on_send: AtomicBool,

    pub credentials: Mutex<Vec<String>>,
    pub history_requests: Mutex<Vec<SessionId>>,
    pub utterances: Mutex<Vec<(SessionId, String)>>,
    pub finalize_requests: Mutex<Vec<FinalizeRequest>>,
    pub report_requests: Mutex<Vec<SessionId>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_session(&self, result: Result<SessionId, ApiError>) {
        self.sessions.lock().unwrap().push_back(result);
    }

    pub fn queue_history(&self, result: Result<Vec<Message>, ApiError>) {
        self.histories.lock().unwrap().push_back(result);
    }

    pub fn queue_reply(&self, result: Result<AssistantReply, ApiError>) {
        self.replies.lock().unwrap().push_back(result);
    }

    pub fn queue_finalize(&self, result: Result<FinalizeOutcome, ApiError>) {
        self.outcomes.lock().unwrap().push_back(result);
    }

    pub fn queue_report(&self, result: Result<ReportDocument, ApiError>) {
        self.documents.lock().unwrap().push_back(result);
    }

    pub fn panic_on_next_send(&self) {
        self.panic_on_send.store(true, Ordering::SeqCst);
    }

    pub fn utterance_count(&self) -> usize {
        self.utterances.lock().unwrap().len()
    }

    pub fn finalize_count(&self) -> usize {
        self.finalize_requests.lock().unwrap().len()
    }

    pub fn report_count(&self) -> usize {
        self.report_requests.lock().unwrap().len()
    }
}

#[async_trait]
impl AccessService for MockBackend {
    async fn redeem(&self, credential: &str) -> Result<SessionId, ApiError> {
        self.credentials.lock().unwrap().push(credential.to_string());
        next_or_unqueued(&self.sessions)
    }
}

#[async_trait]
impl HistoryService for MockBackend {
    async fn history(&self, session_id: &SessionId) -> Result<Vec<Message>, ApiError> {
        self.history_requests.lock().unwrap().push(session_id.clone());
        // Unqueued history behaves like a fresh session
        self.histories
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[async_trait]
impl ConversationService for MockBackend {
    async fn send(&self, session_id: &SessionId, text: &str) -> Result<AssistantReply, ApiError> {
        self.utterances
            .lock()
            .unwrap()
            .push((session_id.clone(), text.to_string()));
        assert!(
            !self.panic_on_send.swap(false, Ordering::SeqCst),
            "mock conversation service panicked"
        );
        next_or_unqueued(&self.replies)
    }
}

#[async_trait]
impl FinalizationService for MockBackend {
    async fn finalize(&self, request: &FinalizeRequest) -> Result<FinalizeOutcome, ApiError> {
        self.finalize_requests.lock().unwrap().push(request.clone());
        next_or_unqueued(&self.outcomes)
    }
}

#[async_trait]
impl ReportService for MockBackend {
    async fn fetch_report(&self, session_id: &SessionId) -> Result<ReportDocument, ApiError> {
        self.report_requests.lock().unwrap().push(session_id.clone());
        next_or_unqueued(&self.documents)
    }
}

// ============================================================================
// In-Memory Cache
// ============================================================================

/// Transcript cache held in memory, with switchable write failures
#[derive(Default)]
pub struct InMemoryCache {
    record: Mutex<Option<Vec<Message>>>,
    failing: AtomicBool,
    pub writes: Mutex<usize>,
}

impl InMemoryCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_record(messages: Vec<Message>) -> Arc<Self> {
        let cache = Self::default();
        *cache.record.lock().unwrap() = Some(messages);
        Arc::new(cache)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn record(&self) -> Option<Vec<Message>> {
        self.record.lock().unwrap().clone()
    }

    fn check(&self) -> CacheResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CacheError::Unavailable("storage full".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TranscriptCache for InMemoryCache {
    async fn load(&self) -> CacheResult<Option<Vec<Message>>> {
        self.check()?;
        Ok(self.record())
    }

    async fn store(&self, messages: &[Message]) -> CacheResult<()> {
        self.check()?;
        *self.writes.lock().unwrap() += 1;
        *self.record.lock().unwrap() = Some(messages.to_vec());
        Ok(())
    }

    async fn clear(&self) -> CacheResult<()> {
        self.check()?;
        *self.record.lock().unwrap() = None;
        Ok(())
    }
}

// ============================================================================
// Mock Report Sink
// ============================================================================

/// Report sink that records documents instead of writing them
#[derive(Default)]
pub struct MockReportSink {
    failures: Mutex<VecDeque<ReportError>>,
    pub delivered: Mutex<Vec<(SessionId, ReportDocument)>>,
}

impl MockReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, error: ReportError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }
}

#[async_trait]
impl ReportSink for MockReportSink {
    async fn deliver(
        &self,
        session_id: &SessionId,
        document: ReportDocument,
    ) -> Result<ReportDelivery, ReportError> {
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let location = format!("/reports/{}", document.file_name);
        self.delivered
            .lock()
            .unwrap()
            .push((session_id.clone(), document));
        Ok(ReportDelivery::Saved { location })
    }
}
