//! The event-sink boundary.
//!
//! The engine calls [`EventSink::publish`] while it holds the pair lock, so
//! a sink must return promptly and must never call back into the engine.
//! None of the sinks here block: the broadcast channel and the queue are
//! bounded and shed their oldest entries when a consumer falls behind.
//! User callbacks run on their own thread behind such a channel.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use parking_lot::Mutex;
use spotmatch_types::{EngineEvent, Result, TradeEvent};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Receives every event the engine emits.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &EngineEvent);
}

// =================================================================
// Broadcast
// =================================================================

/// Fan-out over a bounded `tokio::sync::broadcast` channel.
///
/// Receivers that lag by more than the capacity lose the oldest events and
/// see `RecvError::Lagged` on their next receive.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<EngineEvent>,
}

impl BroadcastSink {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl EventSink for BroadcastSink {
    fn publish(&self, event: &EngineEvent) {
        // No subscribers is not an error.
        let _ = self.tx.send(event.clone());
    }
}

// =================================================================
// Bounded queue
// =================================================================

/// Drop-oldest ring buffer for consumers that poll.
#[derive(Debug)]
pub struct BoundedQueueSink {
    queue: Mutex<VecDeque<EngineEvent>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl BoundedQueueSink {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Take everything queued so far, oldest first.
    pub fn drain(&self) -> Vec<EngineEvent> {
        self.queue.lock().drain(..).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Events shed because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for BoundedQueueSink {
    fn publish(&self, event: &EngineEvent) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            queue.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        queue.push_back(event.clone());
    }
}

// =================================================================
// Tracing
// =================================================================

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: &EngineEvent) {
        match event {
            EngineEvent::Trade(t) => tracing::info!(
                pair = %t.pair,
                trade_id = %t.trade_id,
                price = %t.price,
                quantity = %t.quantity,
                taker_side = %t.taker_side,
                "trade"
            ),
            EngineEvent::OrderUpdated(u) => tracing::debug!(
                order_id = %u.order_id,
                status = %u.status,
                filled = %u.filled_qty,
                remaining = %u.remaining_qty,
                reason = u.reason.as_deref().unwrap_or(""),
                "order updated"
            ),
            EngineEvent::BookChanged(b) => tracing::trace!(
                pair = %b.pair,
                best_bid = ?b.best_bid,
                best_ask = ?b.best_ask,
                "book changed"
            ),
            EngineEvent::Alert(a) => tracing::error!(
                pair = %a.pair,
                kind = %a.kind,
                order_id = ?a.order_id,
                message = %a.message,
                "engine alert"
            ),
        }
    }
}

// =================================================================
// Trade callback
// =================================================================

/// Calls a closure once per trade on a dedicated thread; other events are
/// ignored.
///
/// Trades are handed over through a bounded broadcast channel. A callback
/// that falls more than `capacity` trades behind loses the oldest ones, and
/// the loss is logged. The thread exits once the sink is dropped.
#[derive(Debug)]
pub struct TradeCallbackSink {
    tx: broadcast::Sender<TradeEvent>,
}

impl TradeCallbackSink {
    pub fn spawn<F>(callback: F, capacity: usize) -> Result<Self>
    where
        F: Fn(&TradeEvent) + Send + 'static,
    {
        let (tx, mut rx) = broadcast::channel::<TradeEvent>(capacity.max(1));
        thread::Builder::new()
            .name("spotmatch-on-trade".into())
            .spawn(move || {
                loop {
                    match rx.blocking_recv() {
                        Ok(trade) => callback(&trade),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "trade callback fell behind, trades dropped");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
                tracing::debug!("trade callback thread stopped");
            })?;
        Ok(Self { tx })
    }
}

impl EventSink for TradeCallbackSink {
    fn publish(&self, event: &EngineEvent) {
        if let EngineEvent::Trade(trade) = event {
            let _ = self.tx.send(trade.clone());
        }
    }
}
