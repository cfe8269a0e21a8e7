//! InMemoryStore - 開発用の MessageStore
//!
//! Stands in for one relational database: named message tables, a generic
//! business-row area, and transactions whose writes are staged and applied
//! atomically on commit. Faults and latency can be injected to simulate an
//! unhealthy database.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{Message, MessageId, StoreError};
use crate::ports::{MessageStore, MessageTx, PendingQuery};

/// Store operation that a fault can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Begin,
    Insert,
    Commit,
    FindPending,
    MarkSent,
}

/// In-memory database state.
#[derive(Default)]
struct InMemoryStoreState {
    /// Message tables: table name -> rows ordered by id.
    tables: HashMap<String, BTreeMap<MessageId, Message>>,

    /// Business rows: collection -> key -> value.
    rows: HashMap<String, BTreeMap<String, serde_json::Value>>,

    /// Remaining injected failures per operation.
    faults: HashMap<StoreOp, u32>,

    /// Artificial delay applied to every operation.
    latency: Option<Duration>,
}

impl InMemoryStoreState {
    /// Consume one injected failure for `op`, if any.
    fn take_fault(&mut self, op: StoreOp) -> Result<(), StoreError> {
        if let Some(remaining) = self.faults.get_mut(&op)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(StoreError::Unavailable(format!("injected {op:?} failure")));
        }
        Ok(())
    }

    fn table(&self, table: &str) -> Result<&BTreeMap<MessageId, Message>, StoreError> {
        self.tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))
    }
}

/// In-memory message store.
///
/// # 使用例
/// ```ignore
/// let store = InMemoryStore::with_tables("db_0", ["local_msgs"]);
/// let mut tx = store.begin().await?;
/// tx.put_row("orders", "42", json!({"amount": 10}));
/// tx.insert_message("local_msgs", msg).await?;
/// tx.commit().await?;
/// ```
#[derive(Clone)]
pub struct InMemoryStore {
    name: String,
    state: Arc<Mutex<InMemoryStoreState>>,
    next_id: Arc<AtomicI64>,
}

impl InMemoryStore {
    /// Create a store with no tables.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_tables(name, std::iter::empty::<String>())
    }

    /// Create a store with the given message tables.
    pub fn with_tables<I, T>(name: impl Into<String>, tables: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut state = InMemoryStoreState::default();
        for table in tables {
            state.tables.insert(table.into(), BTreeMap::new());
        }
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(state)),
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn create_table(&self, table: impl Into<String>) {
        let mut state = self.state.lock().await;
        state.tables.entry(table.into()).or_default();
    }

    /// Make the next `times` calls of `op` fail with `StoreError::Unavailable`.
    pub async fn fail_next(&self, op: StoreOp, times: u32) {
        let mut state = self.state.lock().await;
        *state.faults.entry(op).or_default() += times;
    }

    /// Delay every operation by `latency` (None to clear).
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().await.latency = latency;
    }

    /// Committed rows of a message table, ordered by id.
    pub async fn messages(&self, table: &str) -> Vec<Message> {
        let state = self.state.lock().await;
        state
            .tables
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn message(&self, table: &str, id: MessageId) -> Option<Message> {
        let state = self.state.lock().await;
        state.tables.get(table).and_then(|rows| rows.get(&id)).cloned()
    }

    /// Committed business row.
    pub async fn row(&self, collection: &str, key: &str) -> Option<serde_json::Value> {
        let state = self.state.lock().await;
        state
            .rows
            .get(collection)
            .and_then(|rows| rows.get(key))
            .cloned()
    }

    pub async fn row_count(&self, collection: &str) -> usize {
        let state = self.state.lock().await;
        state.rows.get(collection).map_or(0, BTreeMap::len)
    }

    async fn simulate_latency(&self) {
        let latency = self.state.lock().await.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx, StoreError> {
        self.simulate_latency().await;
        self.state.lock().await.take_fault(StoreOp::Begin)?;
        Ok(InMemoryTx {
            state: Arc::clone(&self.state),
            next_id: Arc::clone(&self.next_id),
            staged_messages: Vec::new(),
            staged_rows: Vec::new(),
        })
    }

    async fn find_pending(
        &self,
        table: &str,
        query: PendingQuery,
    ) -> Result<Vec<Message>, StoreError> {
        self.simulate_latency().await;
        let mut state = self.state.lock().await;
        state.take_fault(StoreOp::FindPending)?;
        let rows = state.table(table)?;
        Ok(rows
            .values()
            .filter(|msg| query.matches(msg))
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn mark_sent(
        &self,
        table: &str,
        id: MessageId,
        updated_at_ms: i64,
    ) -> Result<(), StoreError> {
        self.simulate_latency().await;
        let mut state = self.state.lock().await;
        state.take_fault(StoreOp::MarkSent)?;
        let row = state
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?
            .get_mut(&id)
            .ok_or_else(|| StoreError::RowNotFound {
                table: table.to_string(),
                id,
            })?;
        row.mark_sent(updated_at_ms);
        Ok(())
    }
}

/// Transaction on an [`InMemoryStore`].
///
/// Writes are staged here and become visible only on commit. Ids are drawn
/// from the store's sequence at insert time, so a rolled back insert leaves a
/// gap, like a database sequence.
pub struct InMemoryTx {
    state: Arc<Mutex<InMemoryStoreState>>,
    next_id: Arc<AtomicI64>,
    staged_messages: Vec<(String, Message)>,
    staged_rows: Vec<(String, String, serde_json::Value)>,
}

impl InMemoryTx {
    /// Stage a business row write.
    pub fn put_row(
        &mut self,
        collection: impl Into<String>,
        key: impl Into<String>,
        value: serde_json::Value,
    ) {
        self.staged_rows
            .push((collection.into(), key.into(), value));
    }

    /// Read a business row as seen by this transaction.
    pub async fn get_row(&self, collection: &str, key: &str) -> Option<serde_json::Value> {
        let staged = self
            .staged_rows
            .iter()
            .rev()
            .find(|(c, k, _)| c == collection && k == key)
            .map(|(_, _, v)| v.clone());
        if staged.is_some() {
            return staged;
        }
        let state = self.state.lock().await;
        state
            .rows
            .get(collection)
            .and_then(|rows| rows.get(key))
            .cloned()
    }
}

#[async_trait]
impl MessageTx for InMemoryTx {
    async fn insert_message(
        &mut self,
        table: &str,
        mut message: Message,
    ) -> Result<Message, StoreError> {
        {
            let mut state = self.state.lock().await;
            state.take_fault(StoreOp::Insert)?;
            state.table(table)?;
        }
        message.id = MessageId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.staged_messages
            .push((table.to_string(), message.clone()));
        Ok(message)
    }

    async fn commit(self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.take_fault(StoreOp::Commit)?;

        // Validate before applying anything so a commit is all-or-nothing.
        for (table, _) in &self.staged_messages {
            state.table(table)?;
        }

        for (table, message) in self.staged_messages {
            if let Some(rows) = state.tables.get_mut(&table) {
                rows.insert(message.id, message);
            }
        }
        for (collection, key, value) in self.staged_rows {
            state.rows.entry(collection).or_default().insert(key, value);
        }
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        // Staged writes are simply dropped.
        Ok(())
    }
}
