//! Reconciler - stale な Pending message の再送
//!
//! # フロー
//! 1. cutoff = now - stale_after
//! 2. MessageStore::find_pending() で `status = Pending AND utime < cutoff` を最大 batch_limit 件取得
//! 3. 1 件ずつ Publisher::send_msg()（失敗はログして次へ）
//! 4. 進捗がなければ idle backoff してから次のサイクル

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::app::publisher::Publisher;
use crate::config::OutboxConfig;
use crate::domain::{Destination, OutboxError, StoreError};
use crate::ports::{MessageStore, PendingQuery};

/// Result of one reconcile cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Rows returned by the scan (never more than `batch_limit`).
    pub fetched: usize,
    pub sent: usize,
    pub failed: usize,
}

impl PollReport {
    pub fn made_progress(&self) -> bool {
        self.sent > 0
    }
}

/// Scans one destination for stale pending messages and republishes them.
///
/// There is no retry cap: a message that keeps failing is retried every
/// cycle for as long as the reconciler runs.
pub struct Reconciler<S> {
    destination: Destination,
    store: Arc<S>,
    publisher: Arc<Publisher>,
    config: OutboxConfig,
}

impl<S: MessageStore> Reconciler<S> {
    pub fn new(
        destination: Destination,
        store: Arc<S>,
        publisher: Arc<Publisher>,
        config: OutboxConfig,
    ) -> Self {
        Self {
            destination,
            store,
            publisher,
            config,
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Run one cycle: scan, then send each row under its own deadline.
    ///
    /// Only the scan can fail the cycle. Per-row failures are counted in the
    /// report and the row stays pending.
    pub async fn poll_once(&self) -> Result<PollReport, OutboxError> {
        let stale_after_ms = i64::try_from(self.config.stale_after_ms).unwrap_or(i64::MAX);
        let cutoff_ms = self.publisher.clock().now_ms().saturating_sub(stale_after_ms);
        let query = PendingQuery::stale(cutoff_ms, self.config.batch_limit);
        let table = self.destination.table.as_str();

        let op_timeout = self.publisher.op_timeout();
        let batch = timeout(op_timeout, self.store.find_pending(table, query))
            .await
            .map_err(|_| StoreError::Timeout {
                operation: "find_pending",
                after: op_timeout,
            })??;

        let mut report = PollReport {
            fetched: batch.len(),
            ..PollReport::default()
        };
        for message in &batch {
            match self.publisher.send_msg(message, self.store.as_ref(), table).await {
                Ok(()) => report.sent += 1,
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(
                        destination = %self.destination,
                        id = %message.id,
                        topic = %message.topic,
                        error = %err,
                        "resend failed, will retry next cycle"
                    );
                }
            }
        }
        Ok(report)
    }

    /// Poll until shutdown is signalled.
    ///
    /// A cycle in flight is allowed to finish; shutdown interrupts only the
    /// idle sleep between cycles.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        tracing::info!(destination = %self.destination, "reconciler started");
        let mut idle_cycles: u32 = 0;

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            match self.poll_once().await {
                Ok(report) if report.made_progress() => {
                    tracing::debug!(
                        destination = %self.destination,
                        fetched = report.fetched,
                        sent = report.sent,
                        failed = report.failed,
                        "reconcile cycle"
                    );
                    idle_cycles = 0;
                    continue;
                }
                Ok(report) => {
                    if report.fetched > 0 {
                        tracing::debug!(
                            destination = %self.destination,
                            failed = report.failed,
                            "reconcile cycle made no progress"
                        );
                    }
                    idle_cycles = idle_cycles.saturating_add(1);
                }
                Err(err) => {
                    // 非同期タスクは終了しない
                    tracing::error!(destination = %self.destination, error = %err, "pending scan failed");
                    idle_cycles = idle_cycles.saturating_add(1);
                }
            }

            let delay = self.config.idle_backoff.sleep_for(idle_cycles);
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    // sender dropped: nobody can stop us any more, so stop now
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!(destination = %self.destination, "reconciler stopped");
    }
}

/// Reconciler group handle.
/// - `request_shutdown()` で全 reconciler に停止を通知
/// - `shutdown_and_join()` で全 reconciler の終了を待てる
pub struct ReconcilerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<(Destination, JoinHandle<()>)>,
}

impl ReconcilerGroup {
    /// Spawn one task per reconciler.
    pub fn spawn<S: MessageStore>(reconcilers: Vec<Reconciler<S>>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(reconcilers.len());
        for reconciler in reconcilers {
            let destination = reconciler.destination().clone();
            let rx = shutdown_rx.clone();
            let join = tokio::spawn(reconciler.run(rx));
            joins.push((destination, join));
        }

        Self { shutdown_tx, joins }
    }

    pub fn destinations(&self) -> Vec<Destination> {
        self.joins.iter().map(|(dst, _)| dst.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Ask every reconciler to stop after its current cycle.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all reconcilers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for (destination, join) in self.joins {
            if let Err(err) = join.await {
                tracing::error!(destination = %destination, error = %err, "reconciler task panicked");
            }
        }
    }
}
