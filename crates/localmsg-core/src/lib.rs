//! localmsg-core
//!
//! Transactional outbox ("local message table") for sharded relational stores.
//!
//! A business write and the message describing it commit in the same local
//! transaction. The message is published right after commit; if that fails,
//! a per-destination reconciler republishes it once it has been pending for
//! longer than `stale_after`. Delivery is at-least-once.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（Message, MessageStatus, Destination, errors）
//! - **ports**: 抽象化レイヤー（MessageStore, Broker, Clock, ShardingStrategy）
//! - **app**: アプリケーションロジック（Outbox, Publisher, Reconciler, ShardRouter）
//! - **impls**: 実装（InMemoryStore, InMemoryBroker, ModuloSharding など開発用）
//! - **config**: OutboxConfig（JSON）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use crate::app::{Outbox, ReconcilerGroup, ShardRouter, TxFuture};
pub use crate::config::OutboxConfig;
pub use crate::domain::{
    BoxError, Destination, Message, MessageDraft, MessageId, MessageStatus, OutboxError,
};
