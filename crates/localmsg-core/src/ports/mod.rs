//! Ports - 抽象化レイヤー
//!
//! Each trait is the seam to an external system the outbox consumes but does
//! not implement: the relational store, the broker, the clock and the
//! caller's sharding scheme.

pub mod broker;
pub mod clock;
pub mod message_store;
pub mod sharding;

pub use self::broker::Broker;
pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::message_store::{MessageStore, MessageTx, PendingQuery};
pub use self::sharding::ShardingStrategy;
