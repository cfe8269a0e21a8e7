//! Sharding strategies.
//!
//! - **SingleStore**: unsharded deployment, one (store, table).
//! - **ModuloSharding**: numeric key spread over N stores × M tables.

use std::collections::BTreeSet;

use crate::domain::{Destination, RoutingError};
use crate::ports::ShardingStrategy;

/// Everything goes to one destination.
#[derive(Debug, Clone)]
pub struct SingleStore {
    destination: Destination,
}

impl SingleStore {
    pub fn new(store: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            destination: Destination::new(store, table),
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }
}

impl ShardingStrategy for SingleStore {
    type Key = ();

    fn route(&self, _key: &()) -> Result<Destination, RoutingError> {
        Ok(self.destination.clone())
    }

    fn effective_destinations(&self) -> Vec<Destination> {
        vec![self.destination.clone()]
    }
}

/// Splits a numeric key (user id, order id, ...) across stores and tables.
///
/// - store = `stores[key % stores.len()]`
/// - table = `{prefix}_{(key / stores.len()) % tables_per_store}`
///
/// Retired tables keep routing (so their rows are still addressable) but are
/// left out of `effective_destinations`, so no reconciler scans them.
#[derive(Debug, Clone)]
pub struct ModuloSharding {
    stores: Vec<String>,
    table_prefix: String,
    tables_per_store: u64,
    retired: BTreeSet<Destination>,
}

impl ModuloSharding {
    pub fn new<I, S>(stores: I, table_prefix: impl Into<String>, tables_per_store: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stores: stores.into_iter().map(Into::into).collect(),
            table_prefix: table_prefix.into(),
            tables_per_store,
            retired: BTreeSet::new(),
        }
    }

    /// Stop reconciling `destination`.
    pub fn retire(mut self, destination: Destination) -> Self {
        self.retired.insert(destination);
        self
    }

    pub fn table_name(&self, index: u64) -> String {
        format!("{}_{}", self.table_prefix, index)
    }

    /// Every table name of a store, in index order.
    pub fn table_names(&self) -> Vec<String> {
        (0..self.tables_per_store).map(|i| self.table_name(i)).collect()
    }
}

impl ShardingStrategy for ModuloSharding {
    type Key = u64;

    fn route(&self, key: &u64) -> Result<Destination, RoutingError> {
        if self.stores.is_empty() || self.tables_per_store == 0 {
            return Err(RoutingError::Unroutable(format!(
                "key {key}: no shards configured"
            )));
        }
        let n = self.stores.len() as u64;
        let store = &self.stores[(key % n) as usize];
        let table = self.table_name((key / n) % self.tables_per_store);
        Ok(Destination::new(store.clone(), table))
    }

    fn effective_destinations(&self) -> Vec<Destination> {
        self.stores
            .iter()
            .flat_map(|store| {
                (0..self.tables_per_store)
                    .map(move |i| Destination::new(store.clone(), self.table_name(i)))
            })
            .filter(|dst| !self.retired.contains(dst))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn single_store_routes_everything_to_one_place() {
        let strategy = SingleStore::new("main", "local_msgs");
        let dst = strategy.route(&()).unwrap();
        assert_eq!(dst, Destination::new("main", "local_msgs"));
        assert_eq!(strategy.effective_destinations(), vec![dst]);
    }

    #[rstest]
    #[case(0, "db_0", "msgs_0")]
    #[case(1, "db_1", "msgs_0")]
    #[case(2, "db_0", "msgs_1")]
    #[case(3, "db_1", "msgs_1")]
    #[case(4, "db_0", "msgs_2")]
    #[case(6, "db_0", "msgs_0")]
    fn modulo_routing(#[case] key: u64, #[case] store: &str, #[case] table: &str) {
        let strategy = ModuloSharding::new(["db_0", "db_1"], "msgs", 3);
        assert_eq!(strategy.route(&key).unwrap(), Destination::new(store, table));
    }

    #[test]
    fn modulo_enumerates_every_combination_except_retired() {
        let strategy = ModuloSharding::new(["db_0", "db_1"], "msgs", 2)
            .retire(Destination::new("db_1", "msgs_0"));
        let dsts = strategy.effective_destinations();
        assert_eq!(
            dsts,
            vec![
                Destination::new("db_0", "msgs_0"),
                Destination::new("db_0", "msgs_1"),
                Destination::new("db_1", "msgs_1"),
            ]
        );
    }

    #[test]
    fn empty_modulo_is_unroutable() {
        let strategy = ModuloSharding::new(Vec::<String>::new(), "msgs", 2);
        assert!(matches!(strategy.route(&7), Err(RoutingError::Unroutable(_))));
        assert!(strategy.effective_destinations().is_empty());
    }
}
