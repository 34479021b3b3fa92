//! Append-only message log
//!
//! The log is the audit trail of a conversation. Messages are stamped with
//! their append index and never modified afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Optional annotations carried by a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_cost: Option<u32>,
}

impl MessageMetadata {
    pub fn is_empty(&self) -> bool {
        self.report_type.is_none() && self.credit_cost.is_none()
    }
}

/// A single exchanged message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Position in the log (0-based), assigned on append
    pub sequence_id: u64,
    pub text: String,
    pub is_user: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text, true)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(text, false)
    }

    fn new(text: impl Into<String>, is_user: bool) -> Self {
        Self {
            sequence_id: 0,
            text: text.into(),
            is_user,
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// Attach metadata; empty metadata is dropped
    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = if metadata.is_empty() {
            None
        } else {
            Some(metadata)
        };
        self
    }
}

/// Ordered, append-only record of a conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from previously appended messages.
    ///
    /// Sequence ids are re-stamped from the slice order so a log restored
    /// from a hand-edited snapshot is still dense.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        let mut log = Self::new();
        for message in messages {
            log.append(message);
        }
        log
    }

    /// Append a message, stamping its sequence id. Returns the stored message.
    pub fn append(&mut self, mut message: Message) -> &Message {
        message.sequence_id = self.messages.len() as u64;
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn user_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_user).count()
    }

    pub fn assistant_message_count(&self) -> usize {
        self.messages.iter().filter(|m| !m.is_user).count()
    }
}
