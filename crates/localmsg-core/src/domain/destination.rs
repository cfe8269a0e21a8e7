//! Destination: one physical (store, table) shard.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies where a message row lives.
///
/// Never persisted. It is recomputed from the routing key on every write and
/// enumerated by the router when reconcilers start.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Destination {
    /// Key into the router's store map.
    pub store: String,
    /// Message table inside that store.
    pub table: String,
}

impl Destination {
    pub fn new(store: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.store, self.table)
    }
}
