//! Pure state transition function
//!
//! Validation failures are returned as [`TransitionError`] and leave the state
//! untouched. Request outcomes (including rejections and transport failures)
//! always transition successfully; they surface as transcript entries or
//! [`Notice`]s.

use super::{Effect, Event, Lifecycle, Notice, ReportFailure, SessionContext, SessionState};
use crate::api::{ApiError, ApiErrorKind, FinalizeOutcome, FinalizeRequest, SessionId};
use crate::report::ReportDelivery;
use crate::transcript::{Message, Transcript};
use chrono::{DateTime, Utc};
use thiserror::Error;

pub const ACCESS_DENIED_FALLBACK: &str = "Invalid code. Please check the code and try again.";
pub const ACCESS_UNREACHABLE: &str =
    "Unable to reach the triage service. Check your connection and try again.";
pub const EXCHANGE_UNREACHABLE: &str = "Network error. Please check your connection and try again.";
pub const FINALIZE_REJECTED_FALLBACK: &str = "The session could not be finalized.";
pub const FINALIZE_UNREACHABLE: &str =
    "Could not reach the server to finalize. Check your connection and try again.";
pub const REPORT_DOWNLOAD_FAILED: &str = "Could not download the report. Please try again.";

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: SessionState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SessionState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Commands refused before any request is made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Please enter your access code.")]
    BlankCredential,
    #[error("Checking your access code, please wait.")]
    AccessInProgress,
    #[error("You are already signed in.")]
    AlreadyAuthenticated,
    #[error("Please type a message first.")]
    BlankMessage,
    #[error("Please wait for the assistant to reply.")]
    ExchangeInFlight,
    #[error("No active session. Enter your access code first.")]
    NoSession,
    #[error("This session has ended.")]
    SessionEnded,
    #[error("Loading your earlier messages, please wait.")]
    HistoryLoading,
    #[error("This session was already finalized.")]
    AlreadyFinalized,
    #[error("Finalization is already in progress.")]
    FinalizeInProgress,
    #[error("There is nothing to finalize yet. Describe your symptoms first.")]
    NothingToFinalize,
    #[error("The report is available once the session is finalized.")]
    ReportUnavailable,
    #[error("The report is already being downloaded.")]
    ReportInProgress,
}

/// Pure transition function.
///
/// `now` only feeds the id clock for locally authored messages.
pub fn transition(
    state: &SessionState,
    context: &SessionContext,
    event: Event,
    now: DateTime<Utc>,
) -> Result<TransitionResult, TransitionError> {
    let now_ms = now.timestamp_millis();
    let mut next = state.clone();

    match event {
        // ============================================================
        // Access
        // ============================================================
        Event::CredentialSubmitted { credential } => {
            let credential = credential.trim();
            if credential.is_empty() {
                return Err(TransitionError::BlankCredential);
            }
            if state.session_id.is_some() {
                return Err(TransitionError::AlreadyAuthenticated);
            }
            if state.in_flight.access {
                return Err(TransitionError::AccessInProgress);
            }
            next.in_flight.access = true;
            Ok(TransitionResult::new(next).with_effect(Effect::RedeemCredential {
                credential: credential.to_string(),
            }))
        }

        Event::AccessGranted { session_id } => {
            next.in_flight.access = false;
            if state.session_id.is_some() {
                return Ok(TransitionResult::new(next));
            }
            next.session_id = Some(session_id.clone());
            next.lifecycle = Lifecycle::Active;
            next.in_flight.history = true;
            Ok(TransitionResult::new(next)
                .with_effect(Effect::Notify(Notice::AccessGranted {
                    session_id: session_id.clone(),
                }))
                .with_effect(Effect::FetchHistory { session_id }))
        }

        Event::AccessFailed { error } => {
            next.in_flight.access = false;
            let notice = match error.kind {
                ApiErrorKind::Rejected => Notice::AccessDenied {
                    reason: reason_or(&error, ACCESS_DENIED_FALLBACK),
                },
                ApiErrorKind::Network | ApiErrorKind::Malformed => Notice::Connectivity {
                    message: ACCESS_UNREACHABLE.to_string(),
                },
            };
            Ok(TransitionResult::new(next).with_effect(Effect::Notify(notice)))
        }

        // ============================================================
        // History
        // ============================================================
        Event::HistoryLoaded {
            session_id,
            messages,
        } => {
            next.in_flight.history = false;
            if !state.is_current(&session_id) {
                return Ok(TransitionResult::new(next));
            }
            let inserted = next.transcript.merge_history(messages);
            if next.transcript == state.transcript {
                return Ok(TransitionResult::new(next));
            }
            next.ids.observe(next.transcript.messages());
            if inserted > 0 {
                let id = next.ids.mint(now_ms);
                next.transcript.push(Message::assistant(
                    id,
                    format!("Welcome back! We restored {inserted} earlier message(s)."),
                ));
            }
            let persist = Effect::persist(next.transcript.messages());
            Ok(TransitionResult::new(next).with_effect(persist))
        }

        Event::HistoryFailed { .. } => {
            next.in_flight.history = false;
            Ok(TransitionResult::new(next))
        }

        // ============================================================
        // Conversation
        // ============================================================
        Event::UtteranceSubmitted { text } => {
            let text = text.trim();
            if text.is_empty() {
                return Err(TransitionError::BlankMessage);
            }
            let session_id = active_session(state)?;
            if state.in_flight.history {
                return Err(TransitionError::HistoryLoading);
            }
            if state.in_flight.exchange {
                return Err(TransitionError::ExchangeInFlight);
            }

            let id = next.ids.mint(now_ms);
            next.transcript.push(Message::user(id, text));
            next.in_flight.exchange = true;
            let persist = Effect::persist(next.transcript.messages());
            Ok(TransitionResult::new(next)
                .with_effect(persist)
                .with_effect(Effect::SendUtterance {
                    session_id,
                    text: text.to_string(),
                }))
        }

        Event::ReplyReceived { session_id, reply } => {
            next.in_flight.exchange = false;
            if !state.is_current(&session_id) {
                return Ok(TransitionResult::new(next));
            }
            let id = next.ids.mint(now_ms);
            next.transcript.push(Message::assistant(id, reply.text));
            if let Some(symptoms) = reply.symptoms {
                next.symptoms = symptoms;
            }
            let persist = Effect::persist(next.transcript.messages());
            Ok(TransitionResult::new(next).with_effect(persist))
        }

        Event::ExchangeFailed { session_id, error } => {
            next.in_flight.exchange = false;
            if !state.is_current(&session_id) {
                return Ok(TransitionResult::new(next));
            }
            let id = next.ids.mint(now_ms);
            next.transcript
                .push(Message::assistant(id, exchange_error_text(&error)));
            let persist = Effect::persist(next.transcript.messages());
            Ok(TransitionResult::new(next).with_effect(persist))
        }

        Event::TranscriptCleared => {
            if state.in_flight.exchange {
                return Err(TransitionError::ExchangeInFlight);
            }
            next.transcript = Transcript::new();
            Ok(TransitionResult::new(next).with_effect(Effect::ClearCache))
        }

        // ============================================================
        // Finalization
        // ============================================================
        Event::FinalizeRequested => {
            let Some(session_id) = state.session_id.clone() else {
                return Err(TransitionError::NoSession);
            };
            match state.lifecycle {
                Lifecycle::Ended => return Err(TransitionError::AlreadyFinalized),
                Lifecycle::Finalizing => return Err(TransitionError::FinalizeInProgress),
                Lifecycle::Unauthenticated => return Err(TransitionError::NoSession),
                Lifecycle::Active => {}
            }
            if state.symptoms.is_empty() {
                return Err(TransitionError::NothingToFinalize);
            }
            if state.in_flight.exchange {
                return Err(TransitionError::ExchangeInFlight);
            }

            next.lifecycle = Lifecycle::Finalizing;
            Ok(
                TransitionResult::new(next).with_effect(Effect::FinalizeSession(FinalizeRequest {
                    session_id,
                    patient_name: context.patient_name.clone(),
                    symptoms: state.symptoms.clone(),
                })),
            )
        }

        Event::FinalizeCompleted {
            session_id,
            outcome,
        } => {
            if !is_finalizing(state, &session_id) {
                return Ok(TransitionResult::new(next));
            }
            if outcome.success {
                Ok(finalize_succeeded(next, context, outcome, now_ms))
            } else {
                next.lifecycle = Lifecycle::Active;
                let reason = outcome
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| FINALIZE_REJECTED_FALLBACK.to_string());
                Ok(TransitionResult::new(next)
                    .with_effect(Effect::Notify(Notice::FinalizeRejected { reason })))
            }
        }

        Event::FinalizeFailed { session_id, error } => {
            if !is_finalizing(state, &session_id) {
                return Ok(TransitionResult::new(next));
            }
            next.lifecycle = Lifecycle::Active;
            let notice = match error.kind {
                ApiErrorKind::Rejected => Notice::FinalizeRejected {
                    reason: reason_or(&error, FINALIZE_REJECTED_FALLBACK),
                },
                ApiErrorKind::Network | ApiErrorKind::Malformed => Notice::Connectivity {
                    message: FINALIZE_UNREACHABLE.to_string(),
                },
            };
            Ok(TransitionResult::new(next).with_effect(Effect::Notify(notice)))
        }

        // ============================================================
        // Report
        // ============================================================
        Event::ReportRequested => {
            let session_id = match (&state.session_id, state.lifecycle) {
                (Some(id), Lifecycle::Ended) => id.clone(),
                _ => return Err(TransitionError::ReportUnavailable),
            };
            if state.in_flight.report {
                return Err(TransitionError::ReportInProgress);
            }
            next.in_flight.report = true;
            Ok(TransitionResult::new(next).with_effect(Effect::FetchReport { session_id }))
        }

        Event::ReportDelivered {
            session_id,
            delivery,
        } => {
            next.in_flight.report = false;
            if !state.is_current(&session_id) {
                return Ok(TransitionResult::new(next));
            }
            let notice = match delivery {
                ReportDelivery::Saved { location } => Notice::ReportSaved { location },
                ReportDelivery::Shared { location } => Notice::ReportShared { location },
            };
            Ok(TransitionResult::new(next).with_effect(Effect::Notify(notice)))
        }

        Event::ReportFailed {
            session_id,
            failure,
        } => {
            next.in_flight.report = false;
            if !state.is_current(&session_id) {
                return Ok(TransitionResult::new(next));
            }
            let message = match failure {
                ReportFailure::Download(_) => REPORT_DOWNLOAD_FAILED.to_string(),
                ReportFailure::Delivery(message) => message,
            };
            Ok(TransitionResult::new(next)
                .with_effect(Effect::Notify(Notice::ReportFailed { message })))
        }
    }
}

/// Session id of an active conversation, or why there is none
fn active_session(state: &SessionState) -> Result<SessionId, TransitionError> {
    let Some(session_id) = state.session_id.clone() else {
        return Err(TransitionError::NoSession);
    };
    match state.lifecycle {
        Lifecycle::Active => Ok(session_id),
        Lifecycle::Finalizing => Err(TransitionError::FinalizeInProgress),
        Lifecycle::Ended => Err(TransitionError::SessionEnded),
        Lifecycle::Unauthenticated => Err(TransitionError::NoSession),
    }
}

fn is_finalizing(state: &SessionState, session_id: &SessionId) -> bool {
    state.lifecycle == Lifecycle::Finalizing && state.is_current(session_id)
}

fn finalize_succeeded(
    mut next: SessionState,
    context: &SessionContext,
    outcome: FinalizeOutcome,
    now_ms: i64,
) -> TransitionResult {
    let symptom_count = next.symptoms.len();
    next.lifecycle = Lifecycle::Ended;
    let id = next.ids.mint(now_ms);
    next.transcript.push(Message::assistant(
        id,
        format!(
            "Thank you. Your summary of {symptom_count} symptom(s) has been sent to {}.",
            context.delivery_destination
        ),
    ));
    let persist = Effect::persist(next.transcript.messages());
    TransitionResult::new(next)
        .with_effect(persist)
        .with_effect(Effect::Notify(Notice::SessionFinalized {
            symptom_count,
            destination: context.delivery_destination.clone(),
            report_handle: outcome.report_handle,
        }))
}

fn reason_or(error: &ApiError, fallback: &str) -> String {
    error
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/// Assistant-role text recorded when an exchange fails
pub fn exchange_error_text(error: &ApiError) -> String {
    match error.kind {
        ApiErrorKind::Network | ApiErrorKind::Malformed => EXCHANGE_UNREACHABLE.to_string(),
        ApiErrorKind::Rejected => {
            let detail = match (&error.reason, error.status) {
                (Some(reason), _) if !reason.trim().is_empty() => reason.trim().to_string(),
                (_, Some(status)) => format!("HTTP {status}"),
                _ => error.message.clone(),
            };
            format!("The assistant could not respond: {detail}. Please try again.")
        }
    }
}
