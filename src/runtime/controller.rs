//! Session controller

use super::traits::{
    AccessService, Backend, ConversationService, FinalizationService, HistoryService,
    ReportService,
};
use super::{Command, SessionUpdate};
use crate::api::{ApiError, SessionId};
use crate::cache::{CacheWriter, TranscriptCache};
use crate::report::ReportSink;
use crate::state_machine::{
    transition, Effect, Event, Lifecycle, ReportFailure, SessionContext, SessionState,
    TransitionError, TransitionResult,
};
use crate::symptoms::SymptomSet;
use crate::transcript::{Message, Transcript};
use chrono::Utc;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};

const UPDATE_CHANNEL_CAPACITY: usize = 128;

/// Owns one session and mediates every exchange with the backend.
///
/// Commands are validated synchronously; requests run as background tasks
/// whose outcomes come back as [`Event`]s and are applied by
/// [`process_next`](Self::process_next), [`settle`](Self::settle) or
/// [`run`](Self::run).
pub struct SessionController<B, R>
where
    B: Backend + 'static,
    R: ReportSink + 'static,
{
    context: SessionContext,
    state: SessionState,
    backend: Arc<B>,
    reports: Arc<R>,
    cache: CacheWriter,
    event_tx: mpsc::UnboundedSender<Event>,
    event_rx: mpsc::UnboundedReceiver<Event>,
    /// Spawned requests whose outcome has not been applied yet
    pending: usize,
    broadcast_tx: broadcast::Sender<SessionUpdate>,
}

impl<B, R> SessionController<B, R>
where
    B: Backend + 'static,
    R: ReportSink + 'static,
{
    pub fn new(
        context: SessionContext,
        state: SessionState,
        backend: B,
        reports: R,
        cache: CacheWriter,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            context,
            state,
            backend: Arc::new(backend),
            reports: Arc::new(reports),
            cache,
            event_tx,
            event_rx,
            pending: 0,
            broadcast_tx,
        }
    }

    /// Start a controller over whatever transcript the cache holds.
    ///
    /// An unreadable cache is logged and treated as empty.
    pub async fn restore<C>(context: SessionContext, backend: B, reports: R, cache: C) -> Self
    where
        C: TranscriptCache + 'static,
    {
        let transcript = match cache.load().await {
            Ok(Some(messages)) => {
                tracing::info!(messages = messages.len(), "Restored cached transcript");
                Transcript::restore(messages)
            }
            Ok(None) => Transcript::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable transcript cache");
                Transcript::new()
            }
        };
        Self::new(
            context,
            SessionState::with_transcript(transcript),
            backend,
            reports,
            CacheWriter::spawn(cache),
        )
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    pub fn submit_credential(&mut self, credential: &str) -> Result<(), TransitionError> {
        self.dispatch(Event::CredentialSubmitted {
            credential: credential.to_string(),
        })
    }

    pub fn send(&mut self, text: &str) -> Result<(), TransitionError> {
        self.dispatch(Event::UtteranceSubmitted {
            text: text.to_string(),
        })
    }

    pub fn finalize(&mut self) -> Result<(), TransitionError> {
        self.dispatch(Event::FinalizeRequested)
    }

    pub fn fetch_report(&mut self) -> Result<(), TransitionError> {
        self.dispatch(Event::ReportRequested)
    }

    /// Reset the transcript to the welcome message and drop the cached copy
    pub fn clear_transcript(&mut self) -> Result<(), TransitionError> {
        self.dispatch(Event::TranscriptCleared)
    }

    pub fn handle_command(&mut self, command: Command) -> Result<(), TransitionError> {
        match command {
            Command::SubmitCredential(credential) => self.submit_credential(&credential),
            Command::Send(text) => self.send(&text),
            Command::Finalize => self.finalize(),
            Command::FetchReport => self.fetch_report(),
            Command::ClearTranscript => self.clear_transcript(),
        }
    }

    // ------------------------------------------------------------------
    // Event loop
    // ------------------------------------------------------------------

    /// Wait for the next request outcome and apply it.
    ///
    /// Returns `false` without waiting when nothing is outstanding.
    pub async fn process_next(&mut self) -> bool {
        if self.pending == 0 {
            return false;
        }
        match self.event_rx.recv().await {
            Some(event) => {
                self.pending -= 1;
                self.handle_completion(event);
                true
            }
            None => false,
        }
    }

    /// Apply outcomes until no request is outstanding
    pub async fn settle(&mut self) {
        while self.process_next().await {}
    }

    /// Interleave commands with request outcomes until the command channel closes
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        tracing::info!("Starting session controller");

        loop {
            tokio::select! {
                Some(event) = self.event_rx.recv() => {
                    self.pending = self.pending.saturating_sub(1);
                    self.handle_completion(event);
                }
                command = commands.recv() => match command {
                    // Refusals are already broadcast as SessionUpdate::Rejected
                    Some(command) => { let _ = self.handle_command(command); }
                    None => break,
                },
            }
        }

        self.settle().await;
        self.shutdown().await;
        tracing::info!("Session controller stopped");
    }

    /// Wait for queued cache writes to land
    pub async fn shutdown(self) {
        self.cache.close().await;
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.broadcast_tx.subscribe()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn transcript(&self) -> &[Message] {
        self.state.transcript.messages()
    }

    pub fn symptoms(&self) -> &SymptomSet {
        &self.state.symptoms
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.state.lifecycle
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.state.session_id.as_ref()
    }

    pub fn can_send(&self) -> bool {
        self.state.can_send()
    }

    pub fn pending_requests(&self) -> usize {
        self.pending
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn dispatch(&mut self, event: Event) -> Result<(), TransitionError> {
        match transition(&self.state, &self.context, event, Utc::now()) {
            Ok(result) => {
                self.apply(result);
                Ok(())
            }
            Err(e) => {
                tracing::debug!(error = %e, "Command refused");
                let _ = self.broadcast_tx.send(SessionUpdate::Rejected {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn handle_completion(&mut self, event: Event) {
        if let Some(session_id) = event.session_id() {
            if self.state.session_id.is_some() && !self.state.is_current(session_id) {
                tracing::debug!(
                    session_id = %session_id,
                    "Result for a different session, only clearing its request flag"
                );
            }
        }
        log_completion(&event);

        match transition(&self.state, &self.context, event, Utc::now()) {
            Ok(result) => self.apply(result),
            Err(e) => tracing::error!(error = %e, "Request outcome could not be applied"),
        }
    }

    fn apply(&mut self, result: TransitionResult) {
        let previous = self.state.lifecycle;
        self.state = result.new_state;
        if previous != self.state.lifecycle {
            tracing::info!(
                session_id = ?self.state.session_id.as_ref().map(SessionId::as_str),
                from = previous.as_str(),
                to = self.state.lifecycle.as_str(),
                "Lifecycle changed"
            );
        }
        let _ = self
            .broadcast_tx
            .send(SessionUpdate::State(Box::new(self.state.clone())));

        for effect in result.effects {
            self.execute_effect(effect);
        }
    }

    fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::RedeemCredential { credential } => {
                let backend = Arc::clone(&self.backend);
                self.spawn_request(
                    "access",
                    async move {
                        match backend.redeem(&credential).await {
                            Ok(session_id) => Event::AccessGranted { session_id },
                            Err(error) => Event::AccessFailed { error },
                        }
                    },
                    Event::AccessFailed {
                        error: ApiError::network("request task failed"),
                    },
                );
            }

            Effect::FetchHistory { session_id } => {
                let backend = Arc::clone(&self.backend);
                let fallback = Event::HistoryFailed {
                    session_id: session_id.clone(),
                    error: ApiError::network("request task failed"),
                };
                self.spawn_request(
                    "history",
                    async move {
                        match backend.history(&session_id).await {
                            Ok(messages) => Event::HistoryLoaded {
                                session_id,
                                messages,
                            },
                            Err(error) => Event::HistoryFailed { session_id, error },
                        }
                    },
                    fallback,
                );
            }

            Effect::SendUtterance { session_id, text } => {
                let backend = Arc::clone(&self.backend);
                let fallback = Event::ExchangeFailed {
                    session_id: session_id.clone(),
                    error: ApiError::network("request task failed"),
                };
                self.spawn_request(
                    "exchange",
                    async move {
                        match backend.send(&session_id, &text).await {
                            Ok(reply) => Event::ReplyReceived { session_id, reply },
                            Err(error) => Event::ExchangeFailed { session_id, error },
                        }
                    },
                    fallback,
                );
            }

            Effect::FinalizeSession(request) => {
                let backend = Arc::clone(&self.backend);
                let fallback = Event::FinalizeFailed {
                    session_id: request.session_id.clone(),
                    error: ApiError::network("request task failed"),
                };
                self.spawn_request(
                    "finalize",
                    async move {
                        let session_id = request.session_id.clone();
                        match backend.finalize(&request).await {
                            Ok(outcome) => Event::FinalizeCompleted {
                                session_id,
                                outcome,
                            },
                            Err(error) => Event::FinalizeFailed { session_id, error },
                        }
                    },
                    fallback,
                );
            }

            Effect::FetchReport { session_id } => {
                let backend = Arc::clone(&self.backend);
                let reports = Arc::clone(&self.reports);
                let fallback = Event::ReportFailed {
                    session_id: session_id.clone(),
                    failure: ReportFailure::Download(ApiError::network("request task failed")),
                };
                self.spawn_request(
                    "report",
                    async move {
                        let document = match backend.fetch_report(&session_id).await {
                            Ok(document) => document,
                            Err(error) => {
                                return Event::ReportFailed {
                                    session_id,
                                    failure: ReportFailure::Download(error),
                                }
                            }
                        };
                        match reports.deliver(&session_id, document).await {
                            Ok(delivery) => Event::ReportDelivered {
                                session_id,
                                delivery,
                            },
                            Err(e) => Event::ReportFailed {
                                session_id,
                                failure: ReportFailure::Delivery(e.to_string()),
                            },
                        }
                    },
                    fallback,
                );
            }

            Effect::PersistTranscript(messages) => self.cache.store(messages),

            Effect::ClearCache => self.cache.clear(),

            Effect::Notify(notice) => {
                let _ = self.broadcast_tx.send(SessionUpdate::Notice(notice));
            }
        }
    }

    /// Run a request in the background and post its outcome back.
    ///
    /// A panicking request resolves to `fallback` so its in-flight flag clears.
    fn spawn_request<F>(&mut self, request: &'static str, fut: F, fallback: Event)
    where
        F: Future<Output = Event> + Send + 'static,
    {
        self.pending += 1;
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let event = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(event) => event,
                Err(_) => {
                    tracing::error!(request, "Request task panicked");
                    fallback
                }
            };
            #[allow(clippy::cast_possible_truncation)]
            let duration_ms = started.elapsed().as_millis() as u64;
            tracing::debug!(request, duration_ms, "Request finished");
            let _ = event_tx.send(event);
        });
    }
}

fn log_completion(event: &Event) {
    match event {
        Event::AccessGranted { session_id } => {
            tracing::info!(session_id = %session_id, "Access granted");
        }
        Event::AccessFailed { error } if error.is_transport() => {
            tracing::error!(error = %error, "Access request failed");
        }
        Event::AccessFailed { error } => {
            tracing::info!(error = %error, "Access code rejected");
        }
        Event::HistoryLoaded {
            session_id,
            messages,
        } => {
            tracing::info!(session_id = %session_id, messages = messages.len(), "History loaded");
        }
        Event::HistoryFailed { session_id, error } => {
            tracing::warn!(session_id = %session_id, error = %error, "History unavailable, continuing without it");
        }
        Event::ExchangeFailed { session_id, error } if error.is_transport() => {
            tracing::error!(session_id = %session_id, error = %error, "Exchange failed");
        }
        Event::ExchangeFailed { session_id, error } => {
            tracing::warn!(session_id = %session_id, error = %error, "Exchange rejected");
        }
        Event::FinalizeCompleted {
            session_id,
            outcome,
        } if !outcome.success => {
            tracing::warn!(session_id = %session_id, message = ?outcome.message, "Finalization declined");
        }
        Event::FinalizeCompleted { session_id, .. } => {
            tracing::info!(session_id = %session_id, "Session finalized");
        }
        Event::FinalizeFailed { session_id, error } if error.is_transport() => {
            tracing::error!(session_id = %session_id, error = %error, "Finalize request failed");
        }
        Event::FinalizeFailed { session_id, error } => {
            tracing::warn!(session_id = %session_id, error = %error, "Finalization rejected");
        }
        Event::ReportFailed {
            session_id,
            failure,
        } => {
            tracing::warn!(session_id = %session_id, failure = ?failure, "Report retrieval failed");
        }
        _ => {}
    }
}
