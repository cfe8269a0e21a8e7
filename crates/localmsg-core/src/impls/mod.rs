//! Impls - 実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryStore**: message tables + business rows with staged transactions
//! - **InMemoryBroker**: acknowledging broker with outage simulation
//! - **SingleStore / ModuloSharding**: ready-made sharding strategies
//!
//! Production adapters (a SQL store, a Kafka producer) implement the same
//! ports in the integrating application.

pub mod inmem_broker;
pub mod inmem_store;
pub mod sharding;

pub use self::inmem_broker::{Delivery, InMemoryBroker};
pub use self::inmem_store::{InMemoryStore, InMemoryTx, StoreOp};
pub use self::sharding::{ModuloSharding, SingleStore};
