//! ShardingStrategy port - routing key から Destination へのマッピング
//!
//! The strategy belongs to the caller's domain: by user id, by tenant, by
//! month, ... The router only dispatches to it.

use crate::domain::{Destination, RoutingError};

/// ShardingStrategy decides where a key's messages live and which
/// destinations still need reconciling.
///
/// # 設計原則
/// - `route` is a pure function of the key.
/// - `effective_destinations` is read once when reconcilers start.
///   Retired shards (e.g. tables of an expired month) should be left out.
pub trait ShardingStrategy: Send + Sync + 'static {
    /// Routing key type, defined by the integrating application.
    type Key: ?Sized + Sync;

    fn route(&self, key: &Self::Key) -> Result<Destination, RoutingError>;

    fn effective_destinations(&self) -> Vec<Destination>;
}
