//! ShardRouter - routing key から (Destination, store handle) への解決
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - Strategy はジェネリクスで差し替え（dispatch only, no sharding logic here）

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::domain::{Destination, RoutingError};
use crate::impls::SingleStore;
use crate::ports::{MessageStore, ShardingStrategy};

/// BuildError はルーター構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Unknown stores: {0:?}. These stores are referenced by effective destinations but not registered.")]
    UnknownStores(Vec<String>),

    #[error("Store '{0}' is registered twice")]
    DuplicateStore(String),
}

/// Thin dispatch layer: store id -> handle, plus the caller's strategy.
pub struct ShardRouter<S, R> {
    stores: HashMap<String, Arc<S>>,
    strategy: R,
}

impl<S: MessageStore, R: ShardingStrategy> ShardRouter<S, R> {
    pub fn builder(strategy: R) -> ShardRouterBuilder<S, R> {
        ShardRouterBuilder::new(strategy)
    }

    /// Resolve a key to its destination and the store that owns it.
    pub fn resolve(&self, key: &R::Key) -> Result<(Destination, Arc<S>), RoutingError> {
        let destination = self.strategy.route(key)?;
        let store = self.store(&destination.store)?;
        Ok((destination, store))
    }

    pub fn store(&self, id: &str) -> Result<Arc<S>, RoutingError> {
        self.stores
            .get(id)
            .cloned()
            .ok_or_else(|| RoutingError::UnknownStore(id.to_string()))
    }

    /// Destinations that currently need a reconciler.
    pub fn effective_destinations(&self) -> Vec<Destination> {
        self.strategy.effective_destinations()
    }

    pub fn strategy(&self) -> &R {
        &self.strategy
    }

    pub fn store_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.stores.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl<S: MessageStore> ShardRouter<S, SingleStore> {
    /// Router for an unsharded deployment: one store, one table.
    pub fn single(store_id: impl Into<String>, table: impl Into<String>, store: S) -> Self {
        let store_id = store_id.into();
        let mut stores = HashMap::with_capacity(1);
        stores.insert(store_id.clone(), Arc::new(store));
        Self {
            stores,
            strategy: SingleStore::new(store_id, table),
        }
    }
}

/// ShardRouterBuilder はルーターを構築
///
/// # 使用例
/// ```ignore
/// let router = ShardRouter::builder(ModuloSharding::new(["db_0", "db_1"], "msgs", 4))
///     .store("db_0", db0)
///     .store("db_1", db1)
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - build() 時に「effective destinations の store ⊆ 登録済み store」をチェック
/// - 不足があれば BuildError を返す
///
/// Keys routed later to a store outside this set still fail at runtime with
/// `RoutingError::UnknownStore`.
pub struct ShardRouterBuilder<S, R> {
    strategy: R,
    stores: Vec<(String, Arc<S>)>,
}

impl<S: MessageStore, R: ShardingStrategy> ShardRouterBuilder<S, R> {
    pub fn new(strategy: R) -> Self {
        Self {
            strategy,
            stores: Vec::new(),
        }
    }

    pub fn store(mut self, id: impl Into<String>, store: S) -> Self {
        self.stores.push((id.into(), Arc::new(store)));
        self
    }

    pub fn shared_store(mut self, id: impl Into<String>, store: Arc<S>) -> Self {
        self.stores.push((id.into(), store));
        self
    }

    pub fn build(self) -> Result<ShardRouter<S, R>, BuildError> {
        let mut stores = HashMap::with_capacity(self.stores.len());
        for (id, store) in self.stores {
            if stores.contains_key(&id) {
                return Err(BuildError::DuplicateStore(id));
            }
            stores.insert(id, store);
        }

        let missing: BTreeSet<String> = self
            .strategy
            .effective_destinations()
            .into_iter()
            .map(|dst| dst.store)
            .filter(|id| !stores.contains_key(id))
            .collect();
        if !missing.is_empty() {
            return Err(BuildError::UnknownStores(missing.into_iter().collect()));
        }

        Ok(ShardRouter {
            stores,
            strategy: self.strategy,
        })
    }
}
