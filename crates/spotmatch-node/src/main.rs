//! SpotMatch node.
//!
//! Loads an [`EngineConfig`] (JSON file named by `SPOTMATCH_CONFIG`, else
//! defaults), installs logging, starts the expiry sweeper and runs a short
//! demo session on the first configured pair. The process then keeps
//! sweeping until Ctrl-C.
//!
//! `RUST_LOG` controls the filter; `SPOTMATCH_LOG_FORMAT=json` switches to
//! JSON lines.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rust_decimal::Decimal;
use spotmatch_engine::{BroadcastSink, MatchingEngine, TracingSink, spawn_expiry_sweeper};
use spotmatch_types::{
    EngineConfig, EngineEvent, MarketPair, OrderRequest, OrderSide, TimeInForce, UserId,
    constants,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,spotmatch_engine=debug"));
    let json = std::env::var("SPOTMATCH_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

fn load_config() -> anyhow::Result<EngineConfig> {
    match std::env::var(constants::CONFIG_ENV_VAR) {
        Ok(path) => EngineConfig::from_file(&path)
            .with_context(|| format!("loading engine config from {path}")),
        Err(_) => Ok(EngineConfig::default()),
    }
}

/// Two users cross a few orders so the sinks and logs have something to show.
fn demo_session(engine: &MatchingEngine, pair: &MarketPair) -> anyhow::Result<()> {
    let alice = UserId::new();
    let bob = UserId::new();
    let ledger = engine.ledger();
    ledger.deposit(alice, &pair.quote, Decimal::new(50_000, 0))?;
    ledger.deposit(bob, &pair.base, Decimal::new(5, 0))?;

    for (price, qty) in [(101, 1), (102, 2), (104, 1)] {
        engine.submit_order(OrderRequest::limit(
            bob,
            pair.clone(),
            OrderSide::Sell,
            Decimal::new(qty, 0),
            Decimal::new(price, 0),
        ))?;
    }
    engine.submit_order(
        OrderRequest::limit(
            alice,
            pair.clone(),
            OrderSide::Buy,
            Decimal::new(2, 0),
            Decimal::new(100, 0),
        )
        .with_tif(TimeInForce::Day),
    )?;
    let sweep = engine.submit_order(OrderRequest::market(
        alice,
        pair.clone(),
        OrderSide::Buy,
        Decimal::new(2, 0),
    ))?;
    tracing::info!(
        order_id = %sweep.order_id,
        status = %sweep.status,
        filled = %sweep.filled_quantity,
        avg_price = %sweep.average_fill_price,
        "demo market buy done"
    );

    let snapshot = engine.get_order_book_snapshot(pair, 5)?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    for (who, user) in [("alice", alice), ("bob", bob)] {
        for currency in [&pair.base, &pair.quote] {
            let balance = engine.balance(user, currency);
            println!(
                "{who:>5} {currency:<5} available={} locked={}",
                balance.available, balance.locked
            );
        }
    }
    ledger.verify_all_supply()?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = load_config()?;
    let sweep_every = Duration::from_millis(config.sweep_interval_ms);
    let event_buffer = config.event_buffer;
    let engine = Arc::new(MatchingEngine::new(config)?);
    engine.add_sink(Arc::new(TracingSink));

    let broadcast = BroadcastSink::new(event_buffer);
    let mut events = broadcast.subscribe();
    engine.add_sink(Arc::new(broadcast));
    let listener = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(EngineEvent::Trade(trade)) => {
                    tracing::debug!(trade_id = %trade.trade_id, pair = %trade.pair, "listener saw trade");
                }
                Ok(EngineEvent::Alert(alert)) => {
                    tracing::error!(kind = %alert.kind, message = %alert.message, "alert received");
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "event listener lagging");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let sweeper = spawn_expiry_sweeper(Arc::clone(&engine), sweep_every);

    if let Some(pair) = engine.pairs().first() {
        demo_session(&engine, pair)?;
    }

    tracing::info!(pairs = engine.pairs().len(), "node running, Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    sweeper.abort();
    listener.abort();
    tracing::info!("node stopped");
    Ok(())
}
