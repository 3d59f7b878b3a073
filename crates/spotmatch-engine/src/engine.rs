//! The matching engine facade.
//!
//! Owns one [`PairState`] per configured pair behind its own
//! `parking_lot::Mutex`, the shared [`WalletLedger`], the registered event
//! sinks and an order-id routing table. Calls on different pairs run in
//! parallel; calls on the same pair are serialized by the pair lock.
//!
//! ## Lock order
//!
//! pair lock ─▶ wallet entries (sorted, inside the ledger). The sink list
//! and the routing table are only read or written for short critical
//! sections and never held across a ledger call.
//!
//! Events are published to the sinks before the pair lock is released, so
//! every sink sees one pair's events in the order they happened. Sinks must
//! not block; [`MatchingEngine::on_trade`] callbacks run on their own thread.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use spotmatch_book::BookSnapshot;
use spotmatch_types::{
    EngineConfig, EngineEvent, MarketPair, Order, OrderId, OrderRequest, Result,
    SpotmatchError, Trade, TradeEvent, UserId, WalletBalance,
};
use spotmatch_wallet::WalletLedger;

use crate::matcher::{MatchContext, PairState};
use crate::outcome::{CancelResult, OrderResult};
use crate::sink::{EventSink, TradeCallbackSink};

/// Continuous price-time matching over a fixed set of pairs.
pub struct MatchingEngine {
    config: EngineConfig,
    markets: HashMap<MarketPair, Mutex<PairState>>,
    ledger: Arc<WalletLedger>,
    sinks: RwLock<Vec<Arc<dyn EventSink>>>,
    order_locator: RwLock<HashMap<OrderId, MarketPair>>,
}

impl MatchingEngine {
    /// Build an engine with a fresh ledger sized from `config`.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let ledger = Arc::new(WalletLedger::new(config.settlement_guard_size));
        Self::with_ledger(config, ledger)
    }

    /// Build an engine over an existing ledger.
    pub fn with_ledger(config: EngineConfig, ledger: Arc<WalletLedger>) -> Result<Self> {
        config.validate()?;
        let markets = config
            .pairs
            .iter()
            .map(|pair| {
                let state = PairState::new(pair.clone(), config.terminal_retention);
                (pair.pair(), Mutex::new(state))
            })
            .collect::<HashMap<_, _>>();

        tracing::info!(
            pairs = markets.len(),
            taker_fee_rate = %config.fees.taker_fee_rate,
            market_slippage = %config.market_slippage,
            "matching engine ready"
        );
        Ok(Self {
            config,
            markets,
            ledger,
            sinks: RwLock::new(Vec::new()),
            order_locator: RwLock::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn ledger(&self) -> &Arc<WalletLedger> {
        &self.ledger
    }

    fn market(&self, pair: &MarketPair) -> Result<&Mutex<PairState>> {
        self.markets
            .get(pair)
            .ok_or_else(|| SpotmatchError::PairNotFound(pair.clone()))
    }

    fn context(&self) -> MatchContext<'_> {
        MatchContext {
            ledger: self.ledger.as_ref(),
            fees: &self.config.fees,
            market_slippage: self.config.market_slippage,
            events: Vec::new(),
            evicted: Vec::new(),
        }
    }

    /// Drop routing entries of orders no longer archived.
    fn forget(&self, evicted: &[OrderId]) {
        if evicted.is_empty() {
            return;
        }
        let mut locator = self.order_locator.write();
        for order_id in evicted {
            locator.remove(order_id);
        }
        tracing::debug!(evicted = evicted.len(), "terminal orders evicted");
    }

    fn publish(&self, events: &[EngineEvent]) {
        if events.is_empty() {
            return;
        }
        let sinks = self.sinks.read();
        for event in events {
            for sink in sinks.iter() {
                sink.publish(event);
            }
        }
    }

    // =================================================================
    // Commands
    // =================================================================

    /// Validate, fund and match an order.
    ///
    /// Validation and balance failures are returned with nothing changed.
    /// A settlement failure inside the matching loop is not an error for the
    /// caller: the loop stops, an alert is published and the order rests.
    pub fn submit_order(&self, request: OrderRequest) -> Result<OrderResult> {
        let market = self.market(&request.pair)?;
        let mut state = market.lock();
        let mut ctx = self.context();

        let result = state.submit(&request, Utc::now(), &mut ctx);
        match &result {
            Ok(outcome) => {
                self.order_locator
                    .write()
                    .insert(outcome.order_id, request.pair.clone());
                tracing::info!(
                    order_id = %outcome.order_id,
                    pair = %request.pair,
                    side = %request.side,
                    order_type = %request.order_type,
                    status = %outcome.status,
                    filled = %outcome.filled_quantity,
                    trades = outcome.trades.len(),
                    "order submitted"
                );
            }
            Err(err) => tracing::warn!(
                owner = %request.owner,
                pair = %request.pair,
                error = %err,
                "order refused"
            ),
        }
        self.forget(&ctx.evicted);
        self.publish(&ctx.events);
        result
    }

    /// Cancel a resting or parked order on behalf of its owner.
    pub fn cancel_order(&self, order_id: OrderId, owner: UserId) -> Result<CancelResult> {
        let pair = self
            .order_locator
            .read()
            .get(&order_id)
            .cloned()
            .ok_or(SpotmatchError::OrderNotFound(order_id))?;
        let market = self.market(&pair)?;
        let mut state = market.lock();
        let mut ctx = self.context();

        let result = state.cancel(order_id, owner, &mut ctx);
        if let Err(err) = &result {
            tracing::warn!(order_id = %order_id, error = %err, "cancel refused");
        }
        self.forget(&ctx.evicted);
        self.publish(&ctx.events);
        result
    }

    /// Expire every order on every pair whose expiry is at or before `now`.
    pub fn expire_orders(&self, now: DateTime<Utc>) -> Vec<CancelResult> {
        let mut expired = Vec::new();
        for pair in self.pairs() {
            let Some(market) = self.markets.get(&pair) else {
                continue;
            };
            let mut state = market.lock();
            let mut ctx = self.context();
            expired.extend(state.expire(now, &mut ctx));
            self.forget(&ctx.evicted);
            self.publish(&ctx.events);
        }
        expired
    }

    /// Start or stop accepting new orders on a pair. Resting orders and
    /// cancels are unaffected.
    pub fn set_pair_active(&self, pair: &MarketPair, active: bool) -> Result<()> {
        self.market(pair)?.lock().set_active(active);
        tracing::info!(pair = %pair, active, "pair activity changed");
        Ok(())
    }

    /// Put orders suspended by a failed settlement back into matching.
    /// Call once the affected wallets have been repaired.
    pub fn resume_suspended(&self, pair: &MarketPair) -> Result<Vec<Trade>> {
        let mut state = self.market(pair)?.lock();
        let mut ctx = self.context();
        let trades = state.resume_suspended(&mut ctx);
        self.forget(&ctx.evicted);
        self.publish(&ctx.events);
        Ok(trades)
    }

    // =================================================================
    // Sinks
    // =================================================================

    /// Register a sink for every engine event.
    pub fn add_sink(&self, sink: Arc<dyn EventSink>) {
        self.sinks.write().push(sink);
    }

    /// Invoke `callback` once per executed trade, on a dedicated thread.
    ///
    /// Trades are queued up to `event_buffer` deep; a callback that falls
    /// further behind loses the oldest.
    pub fn on_trade<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&TradeEvent) + Send + 'static,
    {
        let sink = TradeCallbackSink::spawn(callback, self.config.event_buffer)?;
        self.add_sink(Arc::new(sink));
        Ok(())
    }

    // =================================================================
    // Queries
    // =================================================================

    /// Aggregated depth for a pair, best level first.
    pub fn get_order_book_snapshot(&self, pair: &MarketPair, depth: usize) -> Result<BookSnapshot> {
        Ok(self.market(pair)?.lock().snapshot(depth))
    }

    /// Current state of any order this engine has accepted.
    #[must_use]
    pub fn order(&self, order_id: &OrderId) -> Option<Order> {
        let pair = self.order_locator.read().get(order_id).cloned()?;
        let market = self.markets.get(&pair)?;
        market.lock().lookup(order_id).cloned()
    }

    /// Resting and parked orders of `owner`, optionally on one pair only.
    #[must_use]
    pub fn open_orders(&self, owner: UserId, pair: Option<&MarketPair>) -> Vec<Order> {
        let pairs = match pair {
            Some(pair) => vec![pair.clone()],
            None => self.pairs(),
        };
        pairs
            .iter()
            .filter_map(|p| self.markets.get(p))
            .flat_map(|market| market.lock().open_orders(owner))
            .collect()
    }

    /// Orders of `pair` held out of matching after a failed settlement.
    pub fn suspended_count(&self, pair: &MarketPair) -> Result<usize> {
        Ok(self.market(pair)?.lock().suspended_count())
    }

    /// Orders the engine can still route by id, live or archived.
    #[must_use]
    pub fn tracked_orders(&self) -> usize {
        self.order_locator.read().len()
    }

    #[must_use]
    pub fn last_trade_price(&self, pair: &MarketPair) -> Option<Decimal> {
        self.markets.get(pair)?.lock().last_trade_price()
    }

    #[must_use]
    pub fn balance(&self, user: UserId, currency: &str) -> WalletBalance {
        self.ledger.balance(user, currency)
    }

    /// Configured pairs in symbol order.
    #[must_use]
    pub fn pairs(&self) -> Vec<MarketPair> {
        let mut pairs: Vec<MarketPair> = self.markets.keys().cloned().collect();
        pairs.sort_by_key(MarketPair::symbol);
        pairs
    }
}

impl std::fmt::Debug for MatchingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchingEngine")
            .field("pairs", &self.pairs())
            .field("sinks", &self.sinks.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use spotmatch_types::{OrderSide, OrderStatus, PairConfig};

    use super::*;

    fn engine() -> MatchingEngine {
        MatchingEngine::new(EngineConfig::default()).unwrap()
    }

    #[test]
    fn unknown_pair_is_reported() {
        let engine = engine();
        let request = OrderRequest::limit(
            UserId::new(),
            MarketPair::new("DOGE", "USD"),
            OrderSide::Buy,
            Decimal::ONE,
            Decimal::ONE,
        );
        assert!(matches!(
            engine.submit_order(request),
            Err(SpotmatchError::PairNotFound(_))
        ));
        assert!(engine
            .get_order_book_snapshot(&MarketPair::new("DOGE", "USD"), 5)
            .is_err());
    }

    #[test]
    fn invalid_config_is_refused() {
        let mut config = EngineConfig::default();
        config.pairs.push(PairConfig::btc_usd());
        assert!(MatchingEngine::new(config).is_err());
    }

    #[test]
    fn inactive_pair_refuses_new_orders_but_allows_cancel() {
        let engine = engine();
        let user = UserId::new();
        let pair = MarketPair::new("BTC", "USD");
        engine.ledger().deposit(user, "USD", Decimal::new(1_000, 0)).unwrap();

        let placed = engine
            .submit_order(OrderRequest::limit(
                user,
                pair.clone(),
                OrderSide::Buy,
                Decimal::ONE,
                Decimal::new(100, 0),
            ))
            .unwrap();
        engine.set_pair_active(&pair, false).unwrap();

        let refused = engine.submit_order(OrderRequest::limit(
            user,
            pair.clone(),
            OrderSide::Buy,
            Decimal::ONE,
            Decimal::new(100, 0),
        ));
        assert!(matches!(refused, Err(SpotmatchError::PairInactive(_))));

        let cancelled = engine.cancel_order(placed.order_id, user).unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(engine.balance(user, "USD").available, Decimal::new(1_000, 0));
    }

    #[test]
    fn evicted_terminal_orders_are_forgotten() {
        let config = EngineConfig {
            terminal_retention: 2,
            ..EngineConfig::default()
        };
        let engine = MatchingEngine::new(config).unwrap();
        let user = UserId::new();
        let pair = MarketPair::new("BTC", "USD");
        engine.ledger().deposit(user, "USD", Decimal::new(1_000, 0)).unwrap();

        let ids: Vec<OrderId> = (0..3)
            .map(|_| {
                let placed = engine
                    .submit_order(OrderRequest::limit(
                        user,
                        pair.clone(),
                        OrderSide::Buy,
                        Decimal::ONE,
                        Decimal::new(100, 0),
                    ))
                    .unwrap();
                engine.cancel_order(placed.order_id, user).unwrap();
                placed.order_id
            })
            .collect();

        assert!(engine.order(&ids[0]).is_none());
        assert!(matches!(
            engine.cancel_order(ids[0], user),
            Err(SpotmatchError::OrderNotFound(_))
        ));
        assert_eq!(engine.order(&ids[2]).unwrap().status, OrderStatus::Cancelled);
        assert_eq!(engine.tracked_orders(), 2);
    }

    #[test]
    fn pairs_are_listed_in_symbol_order() {
        let symbols: Vec<String> = engine().pairs().iter().map(MarketPair::symbol).collect();
        assert_eq!(symbols, vec!["BTC/USD".to_string(), "ETH/USD".to_string()]);
    }
}
