//! Publisher - broker send + status transition
//!
//! # フロー
//! 1. Broker::send() で (topic, content) を送信（ack まで待つ）
//! 2. MessageStore::mark_sent() で Sent にマーク
//! 3. どちらかが失敗したら row は Pending のまま（reconciler が再送）

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::domain::{BrokerError, Message, OutboxError, StoreError};
use crate::ports::{Broker, Clock, MessageStore};

/// Sends one message and records the transition to Sent.
///
/// Shared by the coordinator (immediate send after commit) and every
/// reconciler. Both may send the same row concurrently; duplicates reach the
/// broker and consumers must be idempotent.
pub struct Publisher {
    broker: Arc<dyn Broker>,
    clock: Arc<dyn Clock>,
    op_timeout: Duration,
}

impl Publisher {
    pub fn new(broker: Arc<dyn Broker>, clock: Arc<dyn Clock>, op_timeout: Duration) -> Self {
        Self {
            broker,
            clock,
            op_timeout,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn op_timeout(&self) -> Duration {
        self.op_timeout
    }

    /// Publish `message` and mark it Sent in `store`/`table`.
    ///
    /// The update is matched by id only. Each step has its own deadline; a
    /// timeout is reported like any other failure.
    pub async fn send_msg<S: MessageStore>(
        &self,
        message: &Message,
        store: &S,
        table: &str,
    ) -> Result<(), OutboxError> {
        timeout(
            self.op_timeout,
            self.broker.send(&message.topic, &message.content),
        )
        .await
        .map_err(|_| BrokerError::Timeout(self.op_timeout))??;

        let now_ms = self.clock.now_ms();
        timeout(self.op_timeout, store.mark_sent(table, message.id, now_ms))
            .await
            .map_err(|_| StoreError::Timeout {
                operation: "mark_sent",
                after: self.op_timeout,
            })??;

        tracing::trace!(id = %message.id, topic = %message.topic, table, "message sent");
        Ok(())
    }
}
