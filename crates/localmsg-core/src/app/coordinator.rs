//! Outbox - transaction coordinator
//!
//! # フロー
//! 1. ShardRouter で routing key を (Destination, store) に解決
//! 2. トランザクション開始 → business operation → message insert → commit
//! 3. commit 後に best-effort で即時 publish（失敗はログのみ）
//!
//! Once `exec_tx` returns `Ok`, the message row exists and the reconciler
//! guarantees it reaches the broker eventually. Any `Err` means nothing was
//! written.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::time::timeout;

use crate::app::publisher::Publisher;
use crate::app::reconciler::{Reconciler, ReconcilerGroup};
use crate::app::router::ShardRouter;
use crate::config::OutboxConfig;
use crate::domain::{
    BoxError, Destination, Message, MessageDraft, MessageId, OutboxError, RoutingError,
    StoreError,
};
use crate::impls::SingleStore;
use crate::ports::{Broker, Clock, MessageStore, MessageTx, ShardingStrategy, SystemClock};

/// Future returned by a business operation. Borrows the transaction.
pub type TxFuture<'t, T> = Pin<Box<dyn Future<Output = Result<T, BoxError>> + Send + 't>>;

/// Coordinates the business write, the message insert and the first publish.
///
/// # 使用例
/// ```ignore
/// let id = outbox
///     .exec_tx(&user_id, |tx| {
///         Box::pin(async move {
///             tx.put_row("orders", "o-1", json!({"amount": 10}));
///             Ok(MessageDraft::new("order_created", "o-1"))
///         })
///     })
///     .await?;
/// ```
pub struct Outbox<S, R> {
    router: Arc<ShardRouter<S, R>>,
    publisher: Arc<Publisher>,
    config: OutboxConfig,
}

impl<S: MessageStore, R: ShardingStrategy> Outbox<S, R> {
    pub fn new(router: ShardRouter<S, R>, broker: Arc<dyn Broker>, config: OutboxConfig) -> Self {
        Self::with_clock(router, broker, Arc::new(SystemClock), config)
    }

    pub fn with_clock(
        router: ShardRouter<S, R>,
        broker: Arc<dyn Broker>,
        clock: Arc<dyn Clock>,
        config: OutboxConfig,
    ) -> Self {
        let publisher = Publisher::new(broker, clock, config.op_timeout());
        Self {
            router: Arc::new(router),
            publisher: Arc::new(publisher),
            config,
        }
    }

    pub fn router(&self) -> &ShardRouter<S, R> {
        &self.router
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn config(&self) -> &OutboxConfig {
        &self.config
    }

    /// Run `op` and the message insert in one transaction on the store that
    /// owns `key`, then try to publish right away.
    ///
    /// # Errors
    /// - `Routing`: no destination for `key`. Nothing touched.
    /// - `Business`: `op` failed. Rolled back; the caller's error is inside.
    /// - `Persistence`: begin/insert/commit failed or timed out. Rolled back.
    ///
    /// A failed immediate publish is not an error here.
    pub async fn exec_tx<F>(&self, key: &R::Key, op: F) -> Result<MessageId, OutboxError>
    where
        F: for<'t> FnOnce(&'t mut S::Tx) -> TxFuture<'t, MessageDraft> + Send,
    {
        let (destination, store) = self.router.resolve(key)?;

        let op_timeout = self.config.op_timeout();
        let message = timeout(op_timeout, self.write(store.as_ref(), &destination.table, op))
            .await
            .map_err(|_| StoreError::Timeout {
                operation: "transaction",
                after: op_timeout,
            })??;

        // 業務は成功済み。ここでの失敗は reconciler に任せる
        if let Err(err) = self
            .publisher
            .send_msg(&message, store.as_ref(), &destination.table)
            .await
        {
            tracing::warn!(
                id = %message.id,
                topic = %message.topic,
                destination = %destination,
                error = %err,
                "immediate publish failed, left for reconciliation"
            );
        }

        Ok(message.id)
    }

    async fn write<F>(&self, store: &S, table: &str, op: F) -> Result<Message, OutboxError>
    where
        F: for<'t> FnOnce(&'t mut S::Tx) -> TxFuture<'t, MessageDraft> + Send,
    {
        let mut tx = store.begin().await?;

        let draft = match op(&mut tx).await {
            Ok(draft) => draft,
            Err(err) => {
                rollback(tx).await;
                return Err(OutboxError::Business(err));
            }
        };

        let pending = Message::pending(draft, self.publisher.clock().now_ms());
        let message = match tx.insert_message(table, pending).await {
            Ok(message) => message,
            Err(err) => {
                rollback(tx).await;
                return Err(err.into());
            }
        };

        tx.commit().await?;
        Ok(message)
    }

    /// Reconciler for one destination, sharing this outbox's publisher.
    pub fn reconciler_for(&self, destination: Destination) -> Result<Reconciler<S>, RoutingError> {
        let store = self.router.store(&destination.store)?;
        Ok(Reconciler::new(
            destination,
            store,
            Arc::clone(&self.publisher),
            self.config.clone(),
        ))
    }

    /// Spawn one reconciler per effective destination.
    ///
    /// The destination set is read once here. Destinations whose store is
    /// not registered are logged and skipped.
    pub fn start_reconcilers(&self) -> ReconcilerGroup {
        let mut reconcilers = Vec::new();
        for destination in self.router.effective_destinations() {
            match self.reconciler_for(destination.clone()) {
                Ok(reconciler) => reconcilers.push(reconciler),
                Err(err) => {
                    tracing::error!(destination = %destination, error = %err, "skipping reconciler");
                }
            }
        }
        ReconcilerGroup::spawn(reconcilers)
    }
}

impl<S: MessageStore> Outbox<S, SingleStore> {
    /// Unsharded form of [`Outbox::exec_tx`].
    pub async fn exec<F>(&self, op: F) -> Result<MessageId, OutboxError>
    where
        F: for<'t> FnOnce(&'t mut S::Tx) -> TxFuture<'t, MessageDraft> + Send,
    {
        self.exec_tx(&(), op).await
    }
}

async fn rollback<T: MessageTx>(tx: T) {
    if let Err(err) = tx.rollback().await {
        tracing::warn!(error = %err, "rollback failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BrokerError, MessageStatus};
    use crate::impls::{InMemoryBroker, InMemoryStore, InMemoryTx, ModuloSharding, StoreOp};
    use crate::ports::ManualClock;
    use serde_json::json;
    use std::time::Duration;

    const TABLE: &str = "local_msgs";

    #[derive(Debug, thiserror::Error)]
    #[error("insufficient funds")]
    struct InsufficientFunds;

    struct Fixture {
        store: InMemoryStore,
        broker: InMemoryBroker,
        outbox: Outbox<InMemoryStore, SingleStore>,
    }

    fn fixture() -> Fixture {
        let store = InMemoryStore::with_tables("main", [TABLE]);
        let broker = InMemoryBroker::new();
        let outbox = Outbox::with_clock(
            ShardRouter::single("main", TABLE, store.clone()),
            Arc::new(broker.clone()),
            Arc::new(ManualClock::at_millis(1_000_000)),
            OutboxConfig::default(),
        );
        Fixture {
            store,
            broker,
            outbox,
        }
    }

    fn create_order(tx: &mut InMemoryTx) -> TxFuture<'_, MessageDraft> {
        Box::pin(async move {
            tx.put_row("orders", "o-1", json!({"amount": 10}));
            Ok(MessageDraft::new("order_created", "o-1"))
        })
    }

    #[tokio::test]
    async fn business_failure_writes_nothing() {
        let f = fixture();

        let err = f
            .outbox
            .exec(|tx| {
                Box::pin(async move {
                    tx.put_row("orders", "o-1", json!({"amount": 10}));
                    Err(BoxError::from(InsufficientFunds))
                })
            })
            .await
            .unwrap_err();

        let source = err.business_source().unwrap();
        assert!(source.downcast_ref::<InsufficientFunds>().is_some());
        assert!(f.store.messages(TABLE).await.is_empty());
        assert_eq!(f.store.row_count("orders").await, 0);
        assert!(f.broker.deliveries().await.is_empty());
    }

    #[tokio::test]
    async fn success_publishes_and_marks_sent() {
        let f = fixture();

        let id = f.outbox.exec(create_order).await.unwrap();

        let row = f.store.message(TABLE, id).await.unwrap();
        assert_eq!(row.status, MessageStatus::Sent);
        assert_eq!(row.created_at_ms, 1_000_000);
        assert_eq!(f.store.row("orders", "o-1").await, Some(json!({"amount": 10})));
        let deliveries = f.broker.deliveries_for("order_created").await;
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].payload, b"o-1".to_vec());
    }

    #[tokio::test]
    async fn broker_outage_is_invisible_to_the_caller() {
        let f = fixture();
        f.broker.set_online(false).await;

        let id = f.outbox.exec(create_order).await.unwrap();

        let row = f.store.message(TABLE, id).await.unwrap();
        assert_eq!(row.status, MessageStatus::Pending);
        assert_eq!(row.created_at_ms, row.updated_at_ms);
        assert!(f.store.row("orders", "o-1").await.is_some());
    }

    #[tokio::test]
    async fn insert_failure_rolls_back_business_rows() {
        let f = fixture();
        f.store.fail_next(StoreOp::Insert, 1).await;

        let err = f.outbox.exec(create_order).await.unwrap_err();

        assert!(matches!(err, OutboxError::Persistence(StoreError::Unavailable(_))));
        assert!(f.store.messages(TABLE).await.is_empty());
        assert_eq!(f.store.row_count("orders").await, 0);
    }

    #[tokio::test]
    async fn commit_failure_rolls_back_everything() {
        let f = fixture();
        f.store.fail_next(StoreOp::Commit, 1).await;

        let err = f.outbox.exec(create_order).await.unwrap_err();

        assert!(matches!(err, OutboxError::Persistence(_)));
        assert!(f.store.messages(TABLE).await.is_empty());
        assert_eq!(f.store.row_count("orders").await, 0);
        assert!(f.broker.deliveries().await.is_empty());
    }

    #[tokio::test]
    async fn slow_transaction_times_out_without_writes() {
        let store = InMemoryStore::with_tables("main", [TABLE]);
        let config = OutboxConfig {
            op_timeout_ms: 30,
            ..OutboxConfig::default()
        };
        let outbox = Outbox::new(
            ShardRouter::single("main", TABLE, store.clone()),
            Arc::new(InMemoryBroker::new()),
            config,
        );

        let err = outbox
            .exec(|tx| {
                Box::pin(async move {
                    tx.put_row("orders", "o-1", json!({}));
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    Ok(MessageDraft::new("order_created", "o-1"))
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OutboxError::Persistence(StoreError::Timeout { operation: "transaction", .. })
        ));
        assert!(store.messages(TABLE).await.is_empty());
        assert_eq!(store.row_count("orders").await, 0);
    }

    #[tokio::test]
    async fn unroutable_key_touches_no_store() {
        let db0 = InMemoryStore::with_tables("db_0", ["msgs_0"]);
        let router = ShardRouter::builder(ModuloSharding::new(["db_0"], "msgs", 1))
            .store("db_0", db0.clone())
            .build()
            .unwrap();
        let outbox = Outbox::new(router, Arc::new(InMemoryBroker::new()), OutboxConfig::default());

        // a strategy with no shards cannot route at all
        let empty = ShardRouter::builder(ModuloSharding::new(Vec::<String>::new(), "msgs", 1))
            .store("db_0", db0.clone())
            .build()
            .unwrap();
        let unroutable = Outbox::new(empty, Arc::new(InMemoryBroker::new()), OutboxConfig::default());

        let err = unroutable.exec_tx(&7, create_order).await.unwrap_err();
        assert!(matches!(err, OutboxError::Routing(RoutingError::Unroutable(_))));
        assert!(db0.messages("msgs_0").await.is_empty());
        assert_eq!(db0.row_count("orders").await, 0);

        // sanity: the routable outbox does write
        outbox.exec_tx(&7, create_order).await.unwrap();
        assert_eq!(db0.messages("msgs_0").await.len(), 1);
    }

    /// Routes each key to the store of the same name.
    struct ByName;

    impl ShardingStrategy for ByName {
        type Key = str;

        fn route(&self, key: &str) -> Result<Destination, RoutingError> {
            Ok(Destination::new(key, TABLE))
        }

        fn effective_destinations(&self) -> Vec<Destination> {
            vec![Destination::new("main", TABLE)]
        }
    }

    #[tokio::test]
    async fn key_routed_to_unregistered_store_touches_no_store() {
        let store = InMemoryStore::with_tables("main", [TABLE]);
        let broker = InMemoryBroker::new();
        let router = ShardRouter::builder(ByName)
            .store("main", store.clone())
            .build()
            .unwrap();
        let outbox = Outbox::new(router, Arc::new(broker.clone()), OutboxConfig::default());

        let err = outbox.exec_tx("archive", create_order).await.unwrap_err();

        assert!(matches!(
            err,
            OutboxError::Routing(RoutingError::UnknownStore(id)) if id == "archive"
        ));
        assert!(store.messages(TABLE).await.is_empty());
        assert_eq!(store.row_count("orders").await, 0);
        assert!(broker.deliveries().await.is_empty());
    }

    #[tokio::test]
    async fn each_call_gets_its_own_row() {
        let f = fixture();
        let a = f.outbox.exec(create_order).await.unwrap();
        let b = f.outbox.exec(create_order).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(f.store.messages(TABLE).await.len(), 2);
        assert_eq!(f.broker.deliveries().await.len(), 2);
    }

    #[tokio::test]
    async fn rejected_topic_still_commits() {
        let f = fixture();
        f.broker.reject_topic("order_created").await;

        let id = f.outbox.exec(create_order).await.unwrap();

        let row = f.store.message(TABLE, id).await.unwrap();
        assert_eq!(row.status, MessageStatus::Pending);
        let err = f
            .outbox
            .publisher()
            .send_msg(&row, &f.store, TABLE)
            .await
            .unwrap_err();
        assert!(matches!(err, OutboxError::Publish(BrokerError::Rejected { .. })));
    }
}
