//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across arbitrary event sequences.

use super::transition::*;
use super::*;
use crate::api::{ApiError, AssistantReply, FinalizeOutcome, SessionId};
use crate::report::ReportDelivery;
use crate::symptoms::{Symptom, SymptomSet};
use crate::transcript::{Message, MessageId, Role};
use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::HashSet;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context() -> SessionContext {
    SessionContext::new("Test Patient", "the clinic")
}

fn at(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).unwrap()
}

fn current() -> SessionId {
    SessionId::new("42")
}

fn active_state() -> SessionState {
    let mut state = SessionState::new();
    state.session_id = Some(current());
    state.lifecycle = Lifecycle::Active;
    state
}

fn lifecycle_rank(lifecycle: Lifecycle) -> u8 {
    match lifecycle {
        Lifecycle::Unauthenticated => 0,
        Lifecycle::Active | Lifecycle::Finalizing => 1,
        Lifecycle::Ended => 2,
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_session_id() -> impl Strategy<Value = SessionId> {
    prop_oneof![4 => Just(current()), 1 => Just(SessionId::new("7"))]
}

fn arb_api_error() -> impl Strategy<Value = ApiError> {
    prop_oneof![
        "[a-z ]{0,20}".prop_map(ApiError::network),
        "[a-z ]{0,20}".prop_map(ApiError::malformed),
        (400u16..600, proptest::option::of("[A-Za-z ]{0,20}"))
            .prop_map(|(status, reason)| ApiError::rejected(status, reason)),
    ]
}

fn arb_symptoms() -> impl Strategy<Value = SymptomSet> {
    proptest::collection::vec("[a-z]{3,10}", 0..4)
        .prop_map(|names| names.into_iter().map(Symptom::named).collect())
}

fn arb_reply() -> impl Strategy<Value = AssistantReply> {
    ("[A-Za-z ?]{0,30}", proptest::option::of(arb_symptoms())).prop_map(|(text, symptoms)| {
        AssistantReply {
            text,
            symptoms,
            off_topic: false,
        }
    })
}

fn arb_history() -> impl Strategy<Value = Vec<Message>> {
    proptest::collection::vec(("[0-9]{1,3}", any::<bool>(), "[a-z ]{1,20}"), 0..4).prop_map(
        |entries| {
            entries
                .into_iter()
                .map(|(id, user, text)| {
                    let id = MessageId::new(format!("h{id}"));
                    if user {
                        Message::user(id, text)
                    } else {
                        Message::assistant(id, text)
                    }
                })
                .collect()
        },
    )
}

fn arb_command() -> impl Strategy<Value = Event> {
    prop_oneof![
        "[A-Z0-9 ]{0,8}".prop_map(|credential| Event::CredentialSubmitted { credential }),
        "[a-z ]{0,20}".prop_map(|text| Event::UtteranceSubmitted { text }),
        Just(Event::FinalizeRequested),
        Just(Event::ReportRequested),
        Just(Event::TranscriptCleared),
    ]
}

fn arb_completion() -> impl Strategy<Value = Event> {
    prop_oneof![
        arb_session_id().prop_map(|session_id| Event::AccessGranted { session_id }),
        arb_api_error().prop_map(|error| Event::AccessFailed { error }),
        (arb_session_id(), arb_history())
            .prop_map(|(session_id, messages)| Event::HistoryLoaded { session_id, messages }),
        (arb_session_id(), arb_api_error())
            .prop_map(|(session_id, error)| Event::HistoryFailed { session_id, error }),
        (arb_session_id(), arb_reply())
            .prop_map(|(session_id, reply)| Event::ReplyReceived { session_id, reply }),
        (arb_session_id(), arb_api_error())
            .prop_map(|(session_id, error)| Event::ExchangeFailed { session_id, error }),
        (arb_session_id(), any::<bool>()).prop_map(|(session_id, success)| {
            Event::FinalizeCompleted {
                session_id,
                outcome: FinalizeOutcome {
                    success,
                    message: None,
                    report_handle: None,
                },
            }
        }),
        (arb_session_id(), arb_api_error())
            .prop_map(|(session_id, error)| Event::FinalizeFailed { session_id, error }),
        arb_session_id().prop_map(|session_id| Event::ReportDelivered {
            session_id,
            delivery: ReportDelivery::Saved {
                location: "/tmp/r.pdf".into()
            },
        }),
        (arb_session_id(), arb_api_error()).prop_map(|(session_id, error)| Event::ReportFailed {
            session_id,
            failure: ReportFailure::Download(error),
        }),
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![arb_command(), arb_completion()]
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn prop_blank_credential_never_redeemed(credential in "[ \t]{0,6}") {
        let state = SessionState::new();
        let result = transition(&state, &test_context(), Event::CredentialSubmitted { credential }, at(0));
        prop_assert_eq!(result.unwrap_err(), TransitionError::BlankCredential);
    }

    #[test]
    fn prop_lifecycle_never_moves_backwards_past_active(events in proptest::collection::vec(arb_event(), 0..40)) {
        let mut state = SessionState::new();
        let ctx = test_context();
        for (i, event) in events.into_iter().enumerate() {
            if let Ok(result) = transition(&state, &ctx, event, at(i as i64)) {
                prop_assert!(lifecycle_rank(result.new_state.lifecycle) >= lifecycle_rank(state.lifecycle));
                if state.session_id.is_some() {
                    prop_assert_eq!(&result.new_state.session_id, &state.session_id);
                }
                state = result.new_state;
            }
        }
    }

    #[test]
    fn prop_command_starts_at_most_one_request(events in proptest::collection::vec(arb_event(), 0..30), command in arb_command()) {
        let mut state = SessionState::new();
        let ctx = test_context();
        for (i, event) in events.into_iter().enumerate() {
            if let Ok(result) = transition(&state, &ctx, event, at(i as i64)) {
                state = result.new_state;
            }
        }
        if let Ok(result) = transition(&state, &ctx, command, at(1_000)) {
            let requests = result.effects.iter().filter(|e| e.is_request()).count();
            prop_assert!(requests <= 1);
        }
    }

    #[test]
    fn prop_transcript_append_only(events in proptest::collection::vec(arb_event(), 0..40)) {
        let mut state = active_state();
        let ctx = test_context();
        for (i, event) in events.into_iter().enumerate() {
            let cleared = matches!(event, Event::TranscriptCleared);
            let splices = matches!(event, Event::HistoryLoaded { .. });
            if let Ok(result) = transition(&state, &ctx, event, at(i as i64)) {
                let before = state.transcript.messages();
                let after = result.new_state.transcript.messages();
                prop_assert!(after[0].is_welcome());
                if !cleared {
                    prop_assert!(after.len() >= before.len());
                    if !splices {
                        prop_assert_eq!(&after[..before.len()], before);
                    }
                    // Every earlier message survives in the same relative order;
                    // a history merge may swap in the server's id
                    let mut it = after.iter();
                    for m in before {
                        prop_assert!(it.any(|a| a.role == m.role && a.text == m.text));
                    }
                }
                state = result.new_state;
            }
        }
    }

    #[test]
    fn prop_local_ids_unique(events in proptest::collection::vec(arb_event(), 0..40), clock in proptest::collection::vec(0i64..5, 40)) {
        let mut state = active_state();
        let ctx = test_context();
        for (event, ms) in events.into_iter().zip(clock) {
            if let Ok(result) = transition(&state, &ctx, event, at(ms)) {
                state = result.new_state;
            }
        }
        let ids: HashSet<_> = state.transcript.messages().iter().map(|m| m.id.clone()).collect();
        prop_assert_eq!(ids.len(), state.transcript.len());
    }

    #[test]
    fn prop_exchange_flag_cleared_on_resolution(
        text in "[a-z]{1,20}",
        outcome in prop_oneof![
            arb_reply().prop_map(Ok::<AssistantReply, ApiError>),
            arb_api_error().prop_map(Err::<AssistantReply, ApiError>),
        ],
        session_id in arb_session_id(),
    ) {
        let ctx = test_context();
        let sent = transition(&active_state(), &ctx, Event::UtteranceSubmitted { text }, at(1)).unwrap().new_state;
        prop_assert!(sent.in_flight.exchange);
        let event = match outcome {
            Ok(reply) => Event::ReplyReceived { session_id, reply },
            Err(error) => Event::ExchangeFailed { session_id, error },
        };
        let result = transition(&sent, &ctx, event, at(2)).unwrap();
        prop_assert!(!result.new_state.in_flight.exchange);
    }

    #[test]
    fn prop_failed_exchange_keeps_message_and_adds_one_error(text in "[a-z]{1,20}", error in arb_api_error()) {
        let ctx = test_context();
        let sent = transition(&active_state(), &ctx, Event::UtteranceSubmitted { text: text.clone() }, at(1)).unwrap().new_state;
        let failed = transition(&sent, &ctx, Event::ExchangeFailed { session_id: current(), error }, at(2)).unwrap().new_state;
        let messages = failed.transcript.messages();
        prop_assert_eq!(messages.len(), sent.transcript.len() + 1);
        let user_count = messages.iter().filter(|m| m.role == Role::User && m.text == text).count();
        prop_assert_eq!(user_count, 1);
        let n = messages.len();
        prop_assert_eq!(&messages[n - 2].text, &text);
        prop_assert_eq!(messages[n - 1].role, Role::Assistant);
    }

    #[test]
    fn prop_symptoms_replaced_or_retained(prior in arb_symptoms(), reply in arb_reply()) {
        let ctx = test_context();
        let mut state = active_state();
        state.symptoms = prior.clone();
        state.in_flight.exchange = true;
        let expected = reply.symptoms.clone().unwrap_or(prior);
        let result = transition(&state, &ctx, Event::ReplyReceived { session_id: current(), reply }, at(1)).unwrap();
        prop_assert_eq!(result.new_state.symptoms, expected);
    }

    #[test]
    fn prop_finalize_accepted_iff_active_with_symptoms(
        has_session in any::<bool>(),
        lifecycle in prop_oneof![Just(Lifecycle::Active), Just(Lifecycle::Ended)],
        symptoms in arb_symptoms(),
    ) {
        let mut state = SessionState::new();
        if has_session {
            state.session_id = Some(current());
            state.lifecycle = lifecycle;
        }
        state.symptoms = symptoms;
        let result = transition(&state, &test_context(), Event::FinalizeRequested, at(0));
        let should_accept = has_session && lifecycle == Lifecycle::Active && !state.symptoms.is_empty();
        prop_assert_eq!(result.is_ok(), should_accept);
        if let Ok(result) = result {
            prop_assert_eq!(result.new_state.lifecycle, Lifecycle::Finalizing);
        }
    }

    #[test]
    fn prop_finalizing_always_resolves(success in any::<bool>(), error in proptest::option::of(arb_api_error()), symptoms in arb_symptoms()) {
        prop_assume!(!symptoms.is_empty());
        let ctx = test_context();
        let mut state = active_state();
        state.symptoms = symptoms;
        let finalizing = transition(&state, &ctx, Event::FinalizeRequested, at(0)).unwrap().new_state;
        let event = match error {
            Some(error) => Event::FinalizeFailed { session_id: current(), error },
            None => Event::FinalizeCompleted {
                session_id: current(),
                outcome: FinalizeOutcome { success, message: None, report_handle: None },
            },
        };
        let resolved = transition(&finalizing, &ctx, event, at(1)).unwrap().new_state;
        prop_assert!(matches!(resolved.lifecycle, Lifecycle::Active | Lifecycle::Ended));
    }

    #[test]
    fn prop_ended_refuses_sends(text in "[a-z ]{0,20}") {
        let mut state = active_state();
        state.lifecycle = Lifecycle::Ended;
        let result = transition(&state, &test_context(), Event::UtteranceSubmitted { text }, at(0));
        prop_assert!(result.is_err());
    }

    #[test]
    fn prop_report_refused_unless_ended(
        has_session in any::<bool>(),
        lifecycle in prop_oneof![
            Just(Lifecycle::Unauthenticated),
            Just(Lifecycle::Active),
            Just(Lifecycle::Finalizing),
            Just(Lifecycle::Ended),
        ],
    ) {
        let mut state = SessionState::new();
        state.lifecycle = lifecycle;
        if has_session {
            state.session_id = Some(current());
        }
        let result = transition(&state, &test_context(), Event::ReportRequested, at(0));
        prop_assert_eq!(result.is_ok(), has_session && lifecycle == Lifecycle::Ended);
    }
}
