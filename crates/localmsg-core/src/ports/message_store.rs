//! MessageStore port - the relational store holding the message tables
//!
//! Schema per message table:
//!
//! | column    | type    | notes                    |
//! |-----------|---------|--------------------------|
//! | `id`      | bigint  | unique, store-assigned   |
//! | `topic`   | text    |                          |
//! | `content` | blob    |                          |
//! | `status`  | integer | 1 = Pending, 2 = Sent    |
//! | `ctime`   | bigint  | epoch ms                 |
//! | `utime`   | bigint  | epoch ms                 |

use async_trait::async_trait;

use crate::domain::{Message, MessageId, MessageStatus, StoreError};

/// Filter for the reconciler scan.
///
/// Matches `status = ? AND utime < ?`, ordered by id, at most `limit` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingQuery {
    pub status: MessageStatus,
    pub updated_before_ms: i64,
    pub limit: usize,
}

impl PendingQuery {
    pub fn stale(updated_before_ms: i64, limit: usize) -> Self {
        Self {
            status: MessageStatus::Pending,
            updated_before_ms,
            limit,
        }
    }

    pub fn matches(&self, message: &Message) -> bool {
        message.status == self.status && message.updated_at_ms < self.updated_before_ms
    }
}

/// A store transaction.
///
/// Business operations receive `&mut Tx` and write their own rows through
/// the concrete type. Dropping a transaction without `commit` discards it.
#[async_trait]
pub trait MessageTx: Send {
    /// Insert a message row and return it with the assigned id.
    async fn insert_message(&mut self, table: &str, message: Message)
    -> Result<Message, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// MessageStore owns one database (one shard in a sharded deployment).
///
/// # 設計原則
/// - Isolation of the message table is the store's business. The outbox adds
///   no locking of its own.
/// - Timeouts are applied by the caller with `tokio::time::timeout`.
///   Implementations must be cancel-safe: a dropped future leaves no partial
///   write behind.
#[async_trait]
pub trait MessageStore: Send + Sync + 'static {
    type Tx: MessageTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    async fn find_pending(&self, table: &str, query: PendingQuery)
    -> Result<Vec<Message>, StoreError>;

    /// Set `status = Sent, utime = updated_at_ms` on the row with this id.
    async fn mark_sent(
        &self,
        table: &str,
        id: MessageId,
        updated_at_ms: i64,
    ) -> Result<(), StoreError>;
}
