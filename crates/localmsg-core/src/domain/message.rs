//! Message record: the durable unit of delivery intent.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned identifier of a message row.
///
/// Ids come from a per-store sequence. A rolled back transaction may leave a
/// gap, so callers must not assume ids are dense.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(i64);

impl MessageId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl From<i64> for MessageId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

/// Delivery status.
///
/// State transitions:
/// - Pending -> Sent
///
/// There is no way back. The persisted column stores the integer code
/// (1 = Pending, 2 = Sent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Written with the business change, not yet acknowledged by the broker.
    Pending,

    /// Acknowledged by the broker at least once.
    Sent,
}

impl MessageStatus {
    pub fn code(self) -> i32 {
        match self {
            MessageStatus::Pending => 1,
            MessageStatus::Sent => 2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(MessageStatus::Pending),
            2 => Some(MessageStatus::Sent),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MessageStatus::Sent)
    }
}

/// What a business operation hands back to the coordinator.
///
/// Only topic and payload are chosen by the caller. Id, status and
/// timestamps are filled in when the row is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDraft {
    pub topic: String,
    pub content: Vec<u8>,
}

impl MessageDraft {
    pub fn new(topic: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            content: content.into(),
        }
    }

    /// Serialize `value` as JSON and use it as the payload.
    pub fn json<T: Serialize>(
        topic: impl Into<String>,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(topic, serde_json::to_vec(value)?))
    }
}

/// One row of a message table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Zero until the store assigns an id on insert.
    pub id: MessageId,
    pub topic: String,
    pub content: Vec<u8>,
    pub status: MessageStatus,

    /// Epoch milliseconds.
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl Message {
    /// Build a pending row from a draft. Both timestamps are set to `now_ms`.
    pub fn pending(draft: MessageDraft, now_ms: i64) -> Self {
        Self {
            id: MessageId::new(0),
            topic: draft.topic,
            content: draft.content,
            status: MessageStatus::Pending,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    /// Mark as sent.
    pub fn mark_sent(&mut self, now_ms: i64) {
        self.status = MessageStatus::Sent;
        self.updated_at_ms = now_ms;
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.created_at_ms).single()
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.updated_at_ms).single()
    }
}
