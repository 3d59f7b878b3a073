//! Background expiry of DAY and explicitly dated orders.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::MatchingEngine;

/// Spawn a task that calls [`MatchingEngine::expire_orders`] every `period`.
///
/// Must be called from within a tokio runtime. Abort the returned handle to
/// stop sweeping.
pub fn spawn_expiry_sweeper(engine: Arc<MatchingEngine>, period: Duration) -> JoinHandle<()> {
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let expired = engine.expire_orders(Utc::now());
            if !expired.is_empty() {
                tracing::info!(count = expired.len(), "expired orders swept");
            }
        }
    })
}
