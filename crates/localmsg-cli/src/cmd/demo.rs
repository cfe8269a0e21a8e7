//! `localmsg demo`
//!
//! Two stores (`db_0`, `db_1`) with two message tables each, sharded by
//! order number. The run goes through three phases:
//! 1. broker up: orders are published right after commit
//! 2. broker down: orders commit, messages stay pending
//! 3. broker back: reconcilers drain every table
//!
//! An order with amount 0 is refused by the business operation and leaves
//! no trace in either store.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use serde::Serialize;

use localmsg_core::app::{Outbox, ShardRouter};
use localmsg_core::config::OutboxConfig;
use localmsg_core::domain::{BoxError, MessageDraft, MessageStatus, OutboxError};
use localmsg_core::impls::{InMemoryBroker, InMemoryStore, ModuloSharding};

use super::error::CliError;

const STORES: [&str; 2] = ["db_0", "db_1"];
const TABLE_PREFIX: &str = "local_msgs";
const TABLES_PER_STORE: u64 = 2;

#[derive(Args, Clone, Debug)]
pub struct DemoArgs {
    /// Path to an OutboxConfig JSON file
    #[arg(long, env = "LOCALMSG_CONFIG")]
    pub config: Option<String>,

    /// Orders placed in each phase
    #[arg(long, default_value_t = 4)]
    pub orders: u64,

    /// How long to wait for the reconcilers to drain every table
    #[arg(long, default_value_t = 30_000)]
    pub drain_timeout_ms: u64,
}

#[derive(Debug, Serialize)]
struct OrderCreated {
    order_no: u64,
    amount: u64,
}

#[derive(Debug, thiserror::Error)]
#[error("order {0} has no amount")]
struct EmptyOrder(u64);

fn load_config(path: Option<&str>) -> Result<OutboxConfig, CliError> {
    let Some(path) = path else {
        return Ok(OutboxConfig::default());
    };
    let json = std::fs::read_to_string(path).map_err(|source| CliError::ReadConfig {
        path: path.to_string(),
        source,
    })?;
    Ok(OutboxConfig::from_json_str(&json)?)
}

async fn place_order(
    outbox: &Outbox<InMemoryStore, ModuloSharding>,
    order_no: u64,
    amount: u64,
) -> Result<(), OutboxError> {
    let id = outbox
        .exec_tx(&order_no, move |tx| {
            Box::pin(async move {
                if amount == 0 {
                    return Err(BoxError::from(EmptyOrder(order_no)));
                }
                tx.put_row(
                    "orders",
                    format!("o-{order_no}"),
                    serde_json::json!({ "amount": amount }),
                );
                let draft = MessageDraft::json("order_created", &OrderCreated { order_no, amount })?;
                Ok(draft)
            })
        })
        .await?;
    println!("order {order_no}: committed as {id}");
    Ok(())
}

async fn pending_count(stores: &[InMemoryStore], sharding: &ModuloSharding) -> usize {
    let mut pending = 0;
    for store in stores {
        for table in sharding.table_names() {
            pending += store
                .messages(&table)
                .await
                .iter()
                .filter(|m| m.status == MessageStatus::Pending)
                .count();
        }
    }
    pending
}

pub async fn run(args: &DemoArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref())?;

    let sharding = ModuloSharding::new(STORES, TABLE_PREFIX, TABLES_PER_STORE);
    let tables = sharding.table_names();
    let stores: Vec<InMemoryStore> = STORES
        .iter()
        .map(|name| InMemoryStore::with_tables(*name, tables.iter().cloned()))
        .collect();

    let mut builder = ShardRouter::builder(sharding.clone());
    for store in &stores {
        builder = builder.store(store.name().to_string(), store.clone());
    }
    let router = builder.build()?;

    let broker = InMemoryBroker::new();
    let outbox = Outbox::new(router, Arc::new(broker.clone()), config);

    println!("== phase 1: broker up");
    for order_no in 0..args.orders {
        place_order(&outbox, order_no, 10 * (order_no + 1)).await?;
    }
    match place_order(&outbox, args.orders, 0).await {
        Err(OutboxError::Business(err)) => println!("order {}: refused ({err})", args.orders),
        other => other?,
    }

    println!("== phase 2: broker down");
    broker.set_online(false).await;
    let first = args.orders + 1;
    for order_no in first..first + args.orders {
        place_order(&outbox, order_no, 10 * (order_no + 1)).await?;
    }
    println!("pending: {}", pending_count(&stores, &sharding).await);

    println!("== phase 3: broker back, reconciling");
    broker.set_online(true).await;
    let group = outbox.start_reconcilers();
    println!("reconcilers: {}", group.len());

    let drain_timeout = Duration::from_millis(args.drain_timeout_ms);
    let deadline = tokio::time::Instant::now() + drain_timeout;
    let mut pending = pending_count(&stores, &sharding).await;
    while pending > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(200)).await;
        pending = pending_count(&stores, &sharding).await;
    }
    group.shutdown_and_join().await;

    if pending > 0 {
        return Err(CliError::NotDrained(pending, drain_timeout));
    }

    for store in &stores {
        println!("{}: {} order row(s)", store.name(), store.row_count("orders").await);
    }
    println!("delivered: {}", broker.deliveries_for("order_created").await.len());
    Ok(())
}
