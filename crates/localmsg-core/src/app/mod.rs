//! App - アプリケーション層
//!
//! ports を組み合わせて outbox のロジックを実装します。
//!
//! # 主要コンポーネント
//! - **ShardRouter**: routing key → (Destination, store) の解決
//! - **Outbox**: 業務トランザクション + message insert + 即時 publish（exec_tx）
//! - **Publisher**: broker send → Sent へのマーク（send_msg）
//! - **Reconciler**: stale な Pending message の再送ループ
//! - **IdleBackoff**: 進捗がないサイクル後の待機

pub mod backoff;
pub mod coordinator;
pub mod publisher;
pub mod reconciler;
pub mod router;

// 主要な型を再エクスポート
pub use self::backoff::IdleBackoff;
pub use self::coordinator::{Outbox, TxFuture};
pub use self::publisher::Publisher;
pub use self::reconciler::{PollReport, Reconciler, ReconcilerGroup};
pub use self::router::{BuildError, ShardRouter, ShardRouterBuilder};
