//! Transcript types
//!
//! The transcript is the ordered list of messages shown to the patient. It
//! always starts with the welcome message. Local writes append; only a history
//! merge places messages earlier.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Id of the fixed welcome message
pub const WELCOME_MESSAGE_ID: &str = "welcome";

/// Text of the fixed welcome message
pub const WELCOME_TEXT: &str = "Hi! Please describe your symptoms.";

/// Substituted for blank assistant text
pub const EMPTY_REPLY_FALLBACK: &str = "I couldn't generate a reply. Please try again.";

/// Unique id of a message within a transcript
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One transcript entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn user(id: MessageId, text: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::User,
            text: text.into(),
        }
    }

    /// Assistant message; blank text is replaced with [`EMPTY_REPLY_FALLBACK`].
    pub fn assistant(id: MessageId, text: impl Into<String>) -> Self {
        let text = text.into();
        let text = if text.trim().is_empty() {
            EMPTY_REPLY_FALLBACK.to_string()
        } else {
            text
        };
        Self {
            id,
            role: Role::Assistant,
            text,
        }
    }

    pub fn welcome() -> Self {
        Self::assistant(MessageId::new(WELCOME_MESSAGE_ID), WELCOME_TEXT)
    }

    pub fn is_welcome(&self) -> bool {
        self.id.as_str() == WELCOME_MESSAGE_ID
    }
}

/// Ordered message list, welcome message first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    /// Transcript holding only the welcome message
    pub fn new() -> Self {
        Self {
            messages: vec![Message::welcome()],
        }
    }

    /// Rebuild a transcript from a cached sequence.
    ///
    /// An empty sequence yields the seeded transcript; a sequence that does not
    /// start with the welcome message gets it prepended.
    pub fn restore(messages: Vec<Message>) -> Self {
        if messages.is_empty() {
            return Self::new();
        }
        let mut restored = Vec::with_capacity(messages.len() + 1);
        if !messages[0].is_welcome() {
            restored.push(Message::welcome());
        }
        restored.extend(messages);
        Self { messages: restored }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Merge server history into the transcript.
    ///
    /// History is walked in order against the local entries after the welcome
    /// message. A local entry with the same id, or failing that the same role
    /// and text, is the same message and is replaced by the server copy. Local
    /// entries the server does not know keep their relative place. Returns how
    /// many history messages had no local counterpart.
    pub fn merge_history(&mut self, history: Vec<Message>) -> usize {
        let local = self.messages.split_off(1);
        let local_ids: HashSet<MessageId> = local.iter().map(|m| m.id.clone()).collect();
        let mut seen = HashSet::new();
        let mut cursor = 0;
        let mut inserted = 0;

        for message in history {
            if !seen.insert(message.id.clone()) {
                continue;
            }
            let remaining = &local[cursor..];
            let matched = match remaining.iter().position(|m| m.id == message.id) {
                Some(offset) => Some(offset),
                // Already merged earlier in the transcript
                None if local_ids.contains(&message.id) => continue,
                None => remaining
                    .iter()
                    .position(|m| m.role == message.role && m.text == message.text),
            };
            match matched {
                Some(offset) => {
                    self.messages.extend(remaining[..offset].iter().cloned());
                    cursor += offset + 1;
                    self.messages.push(message);
                }
                None => {
                    inserted += 1;
                    self.messages.push(message);
                }
            }
        }
        self.messages.extend(local[cursor..].iter().cloned());
        inserted
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Message> {
        self.messages.clone()
    }
}

/// Mints ids for locally authored messages from a millisecond clock.
///
/// Ids are strictly increasing even when the clock stalls or steps back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdClock {
    last: i64,
}

impl IdClock {
    /// Clock that mints past every numeric id in `messages`
    pub fn after(messages: &[Message]) -> Self {
        let mut clock = Self::default();
        clock.observe(messages);
        clock
    }

    /// Advance past every numeric id in `messages`
    pub fn observe(&mut self, messages: &[Message]) {
        let highest = messages
            .iter()
            .filter_map(|m| m.id.as_str().parse::<i64>().ok())
            .max();
        if let Some(highest) = highest {
            self.last = self.last.max(highest);
        }
    }

    pub fn mint(&mut self, now_ms: i64) -> MessageId {
        self.last = now_ms.max(self.last + 1);
        MessageId::new(self.last.to_string())
    }
}
