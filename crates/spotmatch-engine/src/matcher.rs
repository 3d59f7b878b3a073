//! Per-pair matching state and the continuous matching loop.
//!
//! A [`PairState`] is only ever touched while its pair lock is held. Every
//! mutation of the book, the stop watch list and the terminal archive goes
//! through the methods here; wallet effects go through the
//! [`WalletLedger`] carried in the [`MatchContext`].
//!
//! ## Matching
//!
//! ```text
//! submit ─▶ validate ─▶ reserve ─▶ insert (OPEN) ─▶ while crossed:
//!              fronts ─▶ price = maker's ─▶ settle legs ─▶ fill both
//!           ─▶ IOC/FOK remainder cancelled ─▶ stop cascade
//! ```
//!
//! The maker is whichever front arrived first (lower sequence). A trade is
//! applied to the book only after its settlement succeeded, so an aborted
//! settlement leaves both orders exactly as they were.
//!
//! After an aborted settlement both fronts are suspended: they leave the
//! book with their status and reservations untouched, so later submissions
//! do not meet them again. They stay visible, cancellable and expirable,
//! and [`PairState::resume_suspended`] puts them back once the wallets are
//! repaired.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use spotmatch_book::{BookSnapshot, OrderBook, StopBook};
use spotmatch_types::{
    Alert, AlertKind, BookTop, EngineEvent, FeeSchedule, MarketPair, Order, OrderId,
    OrderRequest, OrderSide, OrderStatus, OrderType, OrderUpdate, PairConfig, Result,
    SpotmatchError, TimeInForce, Trade, TradeEvent, TradeId, UserId, constants,
};
use spotmatch_wallet::{SettlementLeg, WalletLedger};

use crate::archive::TerminalArchive;
use crate::fees;
use crate::outcome::{CancelResult, OrderResult};
use crate::validation;

/// Shared collaborators plus the events produced by one engine call.
pub(crate) struct MatchContext<'a> {
    pub ledger: &'a WalletLedger,
    pub fees: &'a FeeSchedule,
    pub market_slippage: Decimal,
    pub events: Vec<EngineEvent>,
    /// Terminal orders dropped from the archive during this call.
    pub evicted: Vec<OrderId>,
}

impl MatchContext<'_> {
    fn order_updated(&mut self, order: &Order, reason: Option<&str>) {
        self.events.push(EngineEvent::OrderUpdated(OrderUpdate::from_order(
            order,
            reason.map(str::to_owned),
        )));
    }

    fn alert(
        &mut self,
        kind: AlertKind,
        pair: &MarketPair,
        order_id: Option<OrderId>,
        message: String,
    ) {
        self.events.push(EngineEvent::Alert(Alert {
            kind,
            pair: pair.clone(),
            order_id,
            message,
            raised_at: Utc::now(),
        }));
    }
}

/// Everything the engine knows about one trading pair.
pub(crate) struct PairState {
    pub config: PairConfig,
    pub pair: MarketPair,
    book: OrderBook,
    stops: StopBook,
    /// Live orders taken out of matching after a failed settlement.
    suspended: HashMap<OrderId, Order>,
    /// Orders that reached a terminal state, kept for lookups.
    archive: TerminalArchive,
    last_trade_price: Option<Decimal>,
    trade_seq: u64,
    order_seq: u64,
}

impl PairState {
    pub fn new(config: PairConfig, terminal_retention: usize) -> Self {
        let pair = config.pair();
        Self {
            book: OrderBook::new(pair.clone()),
            stops: StopBook::new(pair.clone()),
            suspended: HashMap::new(),
            archive: TerminalArchive::new(terminal_retention),
            last_trade_price: None,
            trade_seq: 0,
            order_seq: 0,
            config,
            pair,
        }
    }

    fn next_order_seq(&mut self) -> u64 {
        self.order_seq += 1;
        self.order_seq
    }

    // =================================================================
    // Queries
    // =================================================================

    /// Current state of an order wherever it lives.
    pub fn lookup(&self, order_id: &OrderId) -> Option<&Order> {
        self.book
            .get(order_id)
            .or_else(|| self.stops.get(order_id))
            .or_else(|| self.suspended.get(order_id))
            .or_else(|| self.archive.get(order_id))
    }

    fn is_live(&self, order_id: &OrderId) -> bool {
        self.book.contains(order_id)
            || self.stops.contains(order_id)
            || self.suspended.contains_key(order_id)
    }

    /// Resting and parked orders of `owner`, oldest first.
    pub fn open_orders(&self, owner: UserId) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .book
            .orders_for(owner)
            .chain(self.stops.orders_for(owner))
            .chain(self.suspended.values().filter(|o| o.owner == owner))
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.sequence);
        orders
    }

    pub fn last_trade_price(&self) -> Option<Decimal> {
        self.last_trade_price
    }

    pub fn snapshot(&self, depth: usize) -> BookSnapshot {
        self.book.snapshot(depth)
    }

    pub fn suspended_count(&self) -> usize {
        self.suspended.len()
    }

    // =================================================================
    // Submission
    // =================================================================

    /// Validate, fund and match one request, then run any stop cascade it
    /// set off.
    pub fn submit(
        &mut self,
        request: &OrderRequest,
        now: DateTime<Utc>,
        ctx: &mut MatchContext<'_>,
    ) -> Result<OrderResult> {
        validation::validate_request(request, &self.config, now)?;
        let expires_at =
            validation::effective_expiry(request.time_in_force, request.expires_at, now)?;
        let sequence = self.next_order_seq();
        let mut order = Order::from_request(request, sequence, now);
        order.expires_at = expires_at;
        let order_id = order.id;

        let mut trades = if order.order_type.is_stop_family() {
            tracing::debug!(
                order_id = %order_id,
                pair = %self.pair,
                stop_price = ?order.stop_price,
                "stop order parked"
            );
            let parked = OrderUpdate::from_order(&order, Some("parked until triggered".into()));
            self.stops.park(order)?;
            ctx.events.push(EngineEvent::OrderUpdated(parked));
            Vec::new()
        } else {
            self.execute(order, ctx)?
        };

        let cascaded = self.run_triggers(now, ctx);
        trades.extend(
            cascaded
                .into_iter()
                .filter(|t| t.maker_order_id == order_id || t.taker_order_id == order_id),
        );

        let order = self.lookup(&order_id).ok_or_else(|| {
            SpotmatchError::Internal(format!("order {order_id} vanished during submission"))
        })?;
        Ok(OrderResult::from_order(order, trades))
    }

    /// Fund a PENDING order, rest it and match until the book is uncrossed.
    ///
    /// Errors are only returned before any state changes.
    fn execute(&mut self, mut order: Order, ctx: &mut MatchContext<'_>) -> Result<Vec<Trade>> {
        if order.order_type == OrderType::Market {
            order.protection_price = Some(self.protection_price(order.side, ctx.market_slippage)?);
        }
        let limit = order
            .working_price()
            .ok_or_else(|| SpotmatchError::validation("order has no executable price"))?;
        let notional = validation::notional(order.quantity, limit)?;
        let reservation = match order.side {
            OrderSide::Buy => notional,
            OrderSide::Sell => order.quantity,
        };

        if order.time_in_force == TimeInForce::Fok
            && self.book.fillable_quantity(order.side, Some(limit), order.quantity) < order.quantity
        {
            tracing::info!(
                order_id = %order.id,
                pair = %self.pair,
                quantity = %order.quantity,
                "fill-or-kill order cannot fill completely"
            );
            order.transition(OrderStatus::Rejected)?;
            self.retire(order, Some("fill-or-kill could not be filled"), ctx);
            return Ok(Vec::new());
        }

        ctx.ledger
            .reserve(order.owner, order.funding_currency(), reservation)?;
        order.locked_amount = reservation;
        order.transition(OrderStatus::Open)?;

        let order_id = order.id;
        let owner = order.owner;
        let funding = order.funding_currency().clone();
        let time_in_force = order.time_in_force;
        ctx.order_updated(&order, None);
        if let Err(err) = self.book.insert(order) {
            if let Err(release_err) = ctx.ledger.release(owner, &funding, reservation) {
                tracing::warn!(order_id = %order_id, error = %release_err, "rollback release clamped");
            }
            return Err(err);
        }

        let trades = self.match_crossed(ctx);

        if matches!(time_in_force, TimeInForce::Ioc | TimeInForce::Fok)
            && self.is_live(&order_id)
        {
            self.terminate(
                &order_id,
                OrderStatus::Cancelled,
                Some("unfilled remainder of immediate order"),
                ctx,
            )?;
        }
        self.push_book_top(ctx);
        Ok(trades)
    }

    /// Price collar for a market order: the best opposite price moved by
    /// `slippage` against the taker, else the last trade price.
    fn protection_price(&self, side: OrderSide, slippage: Decimal) -> Result<Decimal> {
        let reference = match side {
            OrderSide::Buy => self.book.best_ask(),
            OrderSide::Sell => self.book.best_bid(),
        }
        .or(self.last_trade_price)
        .ok_or_else(|| {
            SpotmatchError::validation(format!(
                "no reference price for a market order on {}",
                self.pair
            ))
        })?;
        let factor = match side {
            OrderSide::Buy => Decimal::ONE + slippage,
            OrderSide::Sell => Decimal::ONE - slippage,
        };
        let collar = reference.checked_mul(factor).ok_or_else(|| {
            SpotmatchError::validation(format!("protection price from {reference} overflows"))
        })?;
        Ok(collar.round_dp(constants::PRICE_PRECISION))
    }

    // =================================================================
    // Matching loop
    // =================================================================

    fn match_crossed(&mut self, ctx: &mut MatchContext<'_>) -> Vec<Trade> {
        let mut trades = Vec::new();
        while let Some((bid_id, ask_id)) = self.book.crossed_fronts() {
            match self.match_fronts(bid_id, ask_id, ctx) {
                Ok(trade) => trades.push(trade),
                Err(err) => {
                    tracing::error!(
                        pair = %self.pair,
                        bid = %bid_id,
                        ask = %ask_id,
                        error = %err,
                        "settlement failed, matching stopped"
                    );
                    ctx.alert(
                        AlertKind::SettlementAborted,
                        &self.pair,
                        Some(bid_id),
                        format!("bid {bid_id} x ask {ask_id}: {err}"),
                    );
                    self.suspend(bid_id, ctx);
                    self.suspend(ask_id, ctx);
                    break;
                }
            }
        }
        trades
    }

    /// Move a front out of the book without touching its status or
    /// reservation.
    fn suspend(&mut self, order_id: OrderId, ctx: &mut MatchContext<'_>) {
        match self.book.remove(&order_id) {
            Ok(order) => {
                tracing::warn!(order_id = %order_id, pair = %self.pair, "order suspended");
                ctx.order_updated(&order, Some("suspended after failed settlement"));
                self.suspended.insert(order_id, order);
            }
            Err(err) => tracing::error!(order_id = %order_id, error = %err, "cannot suspend order"),
        }
    }

    /// Return suspended orders to the book, oldest first, and match again.
    /// They rejoin their price levels behind the orders already resting.
    pub fn resume_suspended(&mut self, ctx: &mut MatchContext<'_>) -> Vec<Trade> {
        let mut orders: Vec<Order> = self.suspended.drain().map(|(_, order)| order).collect();
        orders.sort_by_key(|o| o.sequence);
        for order in orders {
            let order_id = order.id;
            if let Err(err) = self.book.insert(order.clone()) {
                tracing::error!(order_id = %order_id, error = %err, "cannot resume order");
                self.suspended.insert(order_id, order);
            }
        }
        let trades = self.match_crossed(ctx);
        self.push_book_top(ctx);
        tracing::info!(
            pair = %self.pair,
            trades = trades.len(),
            still_suspended = self.suspended.len(),
            "suspended orders resumed"
        );
        trades
    }

    /// Trade the two front orders against each other.
    fn match_fronts(
        &mut self,
        bid_id: OrderId,
        ask_id: OrderId,
        ctx: &mut MatchContext<'_>,
    ) -> Result<Trade> {
        let bid = self
            .book
            .get(&bid_id)
            .ok_or(SpotmatchError::OrderNotFound(bid_id))?;
        let ask = self
            .book
            .get(&ask_id)
            .ok_or(SpotmatchError::OrderNotFound(ask_id))?;
        let (maker, taker) = if bid.sequence <= ask.sequence {
            (bid, ask)
        } else {
            (ask, bid)
        };
        let price = maker.working_price().ok_or_else(|| {
            SpotmatchError::Internal(format!("resting order {} has no price", maker.id))
        })?;
        let quantity = bid.remaining_qty.min(ask.remaining_qty);
        let notional = price.checked_mul(quantity).ok_or_else(|| {
            SpotmatchError::Internal(format!("notional of {quantity} at {price} overflows"))
        })?;
        let fee = fees::charge_for(ctx.fees, &self.pair, taker.side, price, quantity)?;

        let sequence = self.trade_seq + 1;
        let trade = Trade {
            id: TradeId::deterministic(&self.pair, sequence),
            sequence,
            pair: self.pair.clone(),
            maker_order_id: maker.id,
            maker_user_id: maker.owner,
            taker_order_id: taker.id,
            taker_user_id: taker.owner,
            taker_side: taker.side,
            quantity,
            price,
            quote_amount: notional,
            fee: fee.amount,
            fee_currency: fee.currency,
            executed_at: Utc::now(),
        };
        let (base_fee, quote_fee) = match trade.taker_side {
            OrderSide::Buy => (trade.fee, Decimal::ZERO),
            OrderSide::Sell => (Decimal::ZERO, trade.fee),
        };
        let legs = [
            SettlementLeg::new(ask.owner, bid.owner, self.pair.base.clone(), quantity, base_fee),
            SettlementLeg::new(bid.owner, ask.owner, self.pair.quote.clone(), notional, quote_fee),
        ];
        ctx.ledger.settle_trade(trade.id, &legs)?;

        self.trade_seq = sequence;
        self.last_trade_price = Some(price);
        self.book.consume_locked(&bid_id, notional)?;
        self.book.consume_locked(&ask_id, quantity)?;

        tracing::debug!(
            trade_id = %trade.id,
            pair = %self.pair,
            price = %price,
            quantity = %quantity,
            maker = %trade.maker_order_id,
            taker = %trade.taker_order_id,
            "trade executed"
        );
        ctx.events.push(EngineEvent::Trade(TradeEvent::from(&trade)));

        for order_id in [trade.maker_order_id, trade.taker_order_id] {
            match self.book.fill(&order_id, quantity, price)? {
                Some(filled) => {
                    self.retire(filled, None, ctx);
                }
                None => {
                    if let Some(order) = self.book.get(&order_id) {
                        ctx.order_updated(order, None);
                    }
                }
            }
        }
        Ok(trade)
    }

    // =================================================================
    // Terminal states
    // =================================================================

    /// Release what is still reserved for a terminal order and archive it.
    /// Returns the amount actually released.
    fn retire(
        &mut self,
        mut order: Order,
        reason: Option<&str>,
        ctx: &mut MatchContext<'_>,
    ) -> Decimal {
        let mut released = Decimal::ZERO;
        if order.locked_amount > Decimal::ZERO {
            match ctx
                .ledger
                .release(order.owner, order.funding_currency(), order.locked_amount)
            {
                Ok(amount) => released = amount,
                Err(err) => {
                    if let SpotmatchError::LockedUnderflow { released: partial, .. } = &err {
                        released = *partial;
                    }
                    tracing::warn!(order_id = %order.id, error = %err, "release on retire clamped");
                    ctx.alert(
                        AlertKind::LockedUnderflow,
                        &self.pair,
                        Some(order.id),
                        err.to_string(),
                    );
                }
            }
            order.locked_amount = Decimal::ZERO;
        }
        ctx.order_updated(&order, reason);
        ctx.evicted.extend(self.archive.insert(order));
        released
    }

    /// The single path by which a live order is cancelled or expired.
    fn terminate(
        &mut self,
        order_id: &OrderId,
        status: OrderStatus,
        reason: Option<&str>,
        ctx: &mut MatchContext<'_>,
    ) -> Result<CancelResult> {
        let current = self
            .lookup(order_id)
            .ok_or(SpotmatchError::OrderNotFound(*order_id))?;
        if !current.status.can_transition_to(status) {
            return Err(SpotmatchError::NotCancellable {
                status: current.status,
            });
        }

        let mut order = if self.book.contains(order_id) {
            self.book.remove(order_id)?
        } else if let Some(order) = self.suspended.remove(order_id) {
            order
        } else {
            self.stops.remove(order_id)?
        };
        order.transition(status)?;
        let released = self.retire(order, reason, ctx);
        Ok(CancelResult {
            order_id: *order_id,
            status,
            released,
        })
    }

    /// Owner-initiated cancel of a resting or parked order.
    pub fn cancel(
        &mut self,
        order_id: OrderId,
        owner: UserId,
        ctx: &mut MatchContext<'_>,
    ) -> Result<CancelResult> {
        let current = self
            .lookup(&order_id)
            .ok_or(SpotmatchError::OrderNotFound(order_id))?;
        if current.owner != owner {
            return Err(SpotmatchError::NotOwner(order_id));
        }
        if !self.is_live(&order_id) {
            return Err(SpotmatchError::NotCancellable {
                status: current.status,
            });
        }

        let result = self.terminate(
            &order_id,
            OrderStatus::Cancelled,
            Some("cancelled by owner"),
            ctx,
        )?;
        self.push_book_top(ctx);
        tracing::info!(
            order_id = %order_id,
            pair = %self.pair,
            released = %result.released,
            "order cancelled"
        );
        Ok(result)
    }

    /// Expire every resting or parked order whose expiry is at or before
    /// `now`.
    pub fn expire(&mut self, now: DateTime<Utc>, ctx: &mut MatchContext<'_>) -> Vec<CancelResult> {
        let mut due = self.book.expired_orders(now);
        due.extend(self.stops.expired(now));
        due.extend(
            self.suspended
                .values()
                .filter(|o| o.is_expired(now))
                .map(|o| o.id),
        );
        if due.is_empty() {
            return Vec::new();
        }

        let mut results = Vec::with_capacity(due.len());
        for order_id in due {
            match self.terminate(&order_id, OrderStatus::Expired, Some("expired"), ctx) {
                Ok(result) => results.push(result),
                Err(err) => tracing::warn!(order_id = %order_id, error = %err, "expiry skipped"),
            }
        }
        self.push_book_top(ctx);
        results
    }

    // =================================================================
    // Stop cascade
    // =================================================================

    fn take_fired(&mut self) -> Vec<Order> {
        match self.last_trade_price {
            Some(last) => self.stops.take_triggered(last),
            None => Vec::new(),
        }
    }

    /// Activate triggered stops until none fire. Returns every trade the
    /// cascade produced.
    fn run_triggers(&mut self, now: DateTime<Utc>, ctx: &mut MatchContext<'_>) -> Vec<Trade> {
        let mut trades = Vec::new();
        let mut worklist: VecDeque<Order> = self.take_fired().into();
        while let Some(stop) = worklist.pop_front() {
            trades.extend(self.activate(stop, now, ctx));
            worklist.extend(self.take_fired());
        }
        trades
    }

    /// Convert a fired stop to its underlying type and submit it as a fresh
    /// arrival. A stop that can no longer be accepted is REJECTED.
    fn activate(
        &mut self,
        mut order: Order,
        now: DateTime<Utc>,
        ctx: &mut MatchContext<'_>,
    ) -> Vec<Trade> {
        let original = order.order_type;
        order.order_type = original.underlying(order.price.is_some());
        order.triggered_from = Some(original);
        order.sequence = self.next_order_seq();
        tracing::info!(
            order_id = %order.id,
            pair = %self.pair,
            from = %original,
            to = %order.order_type,
            last = ?self.last_trade_price,
            "stop order triggered"
        );

        let request = OrderRequest {
            owner: order.owner,
            pair: order.pair.clone(),
            side: order.side,
            order_type: order.order_type,
            quantity: order.quantity,
            price: order.price,
            stop_price: None,
            time_in_force: order.time_in_force,
            expires_at: order.expires_at,
        };
        let outcome = validation::validate_request(&request, &self.config, now)
            .and_then(|()| self.execute(order.clone(), ctx));

        match outcome {
            Ok(trades) => trades,
            Err(err) => {
                tracing::warn!(order_id = %order.id, error = %err, "triggered stop rejected");
                ctx.alert(
                    AlertKind::StopRejected,
                    &self.pair,
                    Some(order.id),
                    err.to_string(),
                );
                let reason = err.to_string();
                if let Err(transition_err) = order.transition(OrderStatus::Rejected) {
                    tracing::error!(order_id = %order.id, error = %transition_err, "cannot reject stop");
                }
                self.retire(order, Some(reason.as_str()), ctx);
                Vec::new()
            }
        }
    }

    // =================================================================
    // Administration
    // =================================================================

    pub fn set_active(&mut self, active: bool) {
        self.config.active = active;
    }

    fn push_book_top(&self, ctx: &mut MatchContext<'_>) {
        ctx.events.push(EngineEvent::BookChanged(BookTop {
            pair: self.pair.clone(),
            best_bid: self.book.best_bid(),
            best_ask: self.book.best_ask(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use spotmatch_types::WalletBalance;

    use super::*;

    fn dec(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    fn btc_usd() -> MarketPair {
        MarketPair::new("BTC", "USD")
    }

    fn funded(ledger: &WalletLedger) -> UserId {
        let user = UserId::new();
        ledger.deposit(user, "BTC", dec(100)).unwrap();
        ledger.deposit(user, "USD", dec(1_000_000)).unwrap();
        user
    }

    fn ctx<'a>(ledger: &'a WalletLedger, fees: &'a FeeSchedule) -> MatchContext<'a> {
        MatchContext {
            ledger,
            fees,
            market_slippage: Decimal::new(5, 2),
            events: Vec::new(),
            evicted: Vec::new(),
        }
    }

    fn state() -> PairState {
        PairState::new(PairConfig::btc_usd(), constants::DEFAULT_TERMINAL_RETENTION)
    }

    fn settlement_alerts(cx: &MatchContext<'_>) -> usize {
        cx.events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    EngineEvent::Alert(Alert { kind: AlertKind::SettlementAborted, .. })
                )
            })
            .count()
    }

    fn limit(user: UserId, side: OrderSide, qty: Decimal, price: Decimal) -> OrderRequest {
        OrderRequest::limit(user, btc_usd(), side, qty, price)
    }

    #[test]
    fn earlier_arrival_is_maker_and_sets_price() {
        let ledger = WalletLedger::default();
        let fees = FeeSchedule::free();
        let mut state = state();
        let (a, b) = (funded(&ledger), funded(&ledger));

        let mut cx = ctx(&ledger, &fees);
        let ask = state
            .submit(&limit(a, OrderSide::Sell, Decimal::ONE, dec(100)), Utc::now(), &mut cx)
            .unwrap();
        let bid = state
            .submit(&limit(b, OrderSide::Buy, Decimal::ONE, dec(105)), Utc::now(), &mut cx)
            .unwrap();

        assert_eq!(bid.trades.len(), 1);
        let trade = &bid.trades[0];
        assert_eq!(trade.maker_order_id, ask.order_id);
        assert_eq!(trade.price, dec(100));
        assert_eq!(trade.taker_side, OrderSide::Buy);
        // price improvement released once the bid is filled
        assert_eq!(ledger.balance(b, "USD").locked, Decimal::ZERO);
        assert_eq!(ledger.balance(b, "USD").available, dec(1_000_000 - 100));
        assert_eq!(state.last_trade_price(), Some(dec(100)));
    }

    #[test]
    fn market_order_without_reference_is_rejected_cleanly() {
        let ledger = WalletLedger::default();
        let fees = FeeSchedule::free();
        let mut state = state();
        let user = funded(&ledger);

        let mut cx = ctx(&ledger, &fees);
        let request = OrderRequest::market(user, btc_usd(), OrderSide::Buy, Decimal::ONE);
        let err = state.submit(&request, Utc::now(), &mut cx).unwrap_err();
        assert!(matches!(err, SpotmatchError::ValidationError { .. }));
        assert!(cx.events.is_empty());
        assert_eq!(ledger.balance(user, "USD").locked, Decimal::ZERO);
    }

    #[test]
    fn protection_price_falls_back_to_last_trade() {
        let mut state = state();
        state.last_trade_price = Some(dec(200));
        let slippage = Decimal::new(5, 2);
        assert_eq!(state.protection_price(OrderSide::Buy, slippage).unwrap(), dec(210));
        assert_eq!(state.protection_price(OrderSide::Sell, slippage).unwrap(), dec(190));
    }

    #[test]
    fn aborted_settlement_suspends_both_fronts() {
        let ledger = WalletLedger::default();
        let fees = FeeSchedule::free();
        let mut state = state();
        let (seller, buyer) = (funded(&ledger), funded(&ledger));

        let mut cx = ctx(&ledger, &fees);
        let ask = state
            .submit(&limit(seller, OrderSide::Sell, Decimal::ONE, dec(100)), Utc::now(), &mut cx)
            .unwrap();
        // The seller's reservation disappears behind the engine's back.
        ledger.force_balance(
            seller,
            "BTC",
            WalletBalance {
                available: dec(99),
                locked: Decimal::ZERO,
            },
        );

        let bid = state
            .submit(&limit(buyer, OrderSide::Buy, Decimal::ONE, dec(100)), Utc::now(), &mut cx)
            .unwrap();
        assert!(bid.trades.is_empty());
        assert_eq!(bid.status, OrderStatus::Open);
        assert_eq!(state.lookup(&ask.order_id).unwrap().status, OrderStatus::Open);
        assert_eq!(settlement_alerts(&cx), 1);
        assert_eq!(state.trade_seq, 0);
        assert_eq!(state.last_trade_price(), None);

        assert_eq!(state.suspended_count(), 2);
        assert!(!state.book.is_crossed());
        assert!(state.book.is_empty());
        assert_eq!(ledger.balance(buyer, "USD").locked, dec(100));
        assert_eq!(state.open_orders(buyer).len(), 1);
    }

    #[test]
    fn suspended_orders_are_not_matched_again() {
        let ledger = WalletLedger::default();
        let fees = FeeSchedule::free();
        let mut state = state();
        let (seller, buyer, other) = (funded(&ledger), funded(&ledger), funded(&ledger));
        let mut cx = ctx(&ledger, &fees);

        state
            .submit(&limit(seller, OrderSide::Sell, Decimal::ONE, dec(100)), Utc::now(), &mut cx)
            .unwrap();
        ledger.force_balance(
            seller,
            "BTC",
            WalletBalance {
                available: dec(99),
                locked: Decimal::ZERO,
            },
        );
        state
            .submit(&limit(buyer, OrderSide::Buy, Decimal::ONE, dec(100)), Utc::now(), &mut cx)
            .unwrap();
        assert_eq!(settlement_alerts(&cx), 1);

        for price in [200, 300, 400] {
            state
                .submit(&limit(other, OrderSide::Sell, Decimal::ONE, dec(price)), Utc::now(), &mut cx)
                .unwrap();
        }
        assert_eq!(settlement_alerts(&cx), 1);
        assert_eq!(state.book.best_bid(), None);
        assert_eq!(state.book.best_ask(), Some(dec(200)));
    }

    #[test]
    fn resumed_orders_trade_once_wallets_are_repaired() {
        let ledger = WalletLedger::default();
        let fees = FeeSchedule::free();
        let mut state = state();
        let (seller, buyer) = (funded(&ledger), funded(&ledger));
        let mut cx = ctx(&ledger, &fees);

        let ask = state
            .submit(&limit(seller, OrderSide::Sell, Decimal::ONE, dec(100)), Utc::now(), &mut cx)
            .unwrap();
        ledger.force_balance(
            seller,
            "BTC",
            WalletBalance {
                available: dec(99),
                locked: Decimal::ZERO,
            },
        );
        let bid = state
            .submit(&limit(buyer, OrderSide::Buy, Decimal::ONE, dec(100)), Utc::now(), &mut cx)
            .unwrap();

        // Operator restores the missing reservation.
        ledger.force_balance(
            seller,
            "BTC",
            WalletBalance {
                available: dec(99),
                locked: Decimal::ONE,
            },
        );
        let trades = state.resume_suspended(&mut cx);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].maker_order_id, ask.order_id);
        assert_eq!(state.suspended_count(), 0);
        assert_eq!(state.lookup(&bid.order_id).unwrap().status, OrderStatus::Filled);
        assert_eq!(ledger.balance(buyer, "BTC").available, dec(101));
    }

    #[test]
    fn suspended_order_can_be_cancelled() {
        let ledger = WalletLedger::default();
        let fees = FeeSchedule::free();
        let mut state = state();
        let (seller, buyer) = (funded(&ledger), funded(&ledger));
        let mut cx = ctx(&ledger, &fees);

        state
            .submit(&limit(seller, OrderSide::Sell, Decimal::ONE, dec(100)), Utc::now(), &mut cx)
            .unwrap();
        ledger.force_balance(
            seller,
            "BTC",
            WalletBalance {
                available: dec(99),
                locked: Decimal::ZERO,
            },
        );
        let bid = state
            .submit(&limit(buyer, OrderSide::Buy, Decimal::ONE, dec(100)), Utc::now(), &mut cx)
            .unwrap();

        let cancelled = state.cancel(bid.order_id, buyer, &mut cx).unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.released, dec(100));
        assert_eq!(state.suspended_count(), 1);
        assert_eq!(ledger.balance(buyer, "USD").locked, Decimal::ZERO);
    }

    #[test]
    fn oversized_market_buy_is_refused_before_reserving() {
        let ledger = WalletLedger::default();
        let fees = FeeSchedule::free();
        let mut state = state();
        state.last_trade_price = Some(Decimal::new(1_000_000_000_000_000, 0));
        let user = funded(&ledger);
        let mut cx = ctx(&ledger, &fees);

        let request = OrderRequest::market(
            user,
            btc_usd(),
            OrderSide::Buy,
            Decimal::new(1_000_000_000_000_000, 0),
        );
        let err = state.submit(&request, Utc::now(), &mut cx).unwrap_err();
        assert!(matches!(err, SpotmatchError::ValidationError { .. }));
        assert_eq!(ledger.balance(user, "USD").locked, Decimal::ZERO);
        assert!(state.book.is_empty());
    }

    #[test]
    fn archive_evictions_are_reported() {
        let ledger = WalletLedger::default();
        let fees = FeeSchedule::free();
        let mut state = PairState::new(PairConfig::btc_usd(), 1);
        let user = funded(&ledger);
        let mut cx = ctx(&ledger, &fees);

        let first = state
            .submit(&limit(user, OrderSide::Buy, Decimal::ONE, dec(100)), Utc::now(), &mut cx)
            .unwrap();
        let second = state
            .submit(&limit(user, OrderSide::Buy, Decimal::ONE, dec(99)), Utc::now(), &mut cx)
            .unwrap();
        state.cancel(first.order_id, user, &mut cx).unwrap();
        assert!(cx.evicted.is_empty());
        state.cancel(second.order_id, user, &mut cx).unwrap();

        assert_eq!(cx.evicted, vec![first.order_id]);
        assert!(state.lookup(&first.order_id).is_none());
        assert_eq!(
            state.lookup(&second.order_id).unwrap().status,
            OrderStatus::Cancelled
        );
    }

    #[test]
    fn cascade_converts_and_fills_triggered_stops() {
        let ledger = WalletLedger::default();
        let fees = FeeSchedule::free();
        let mut state = state();
        let (maker, trader, stopper) = (funded(&ledger), funded(&ledger), funded(&ledger));
        let mut cx = ctx(&ledger, &fees);

        // Liquidity for the stop to hit once it fires.
        state
            .submit(&limit(maker, OrderSide::Buy, Decimal::ONE, dec(95)), Utc::now(), &mut cx)
            .unwrap();
        let stop = OrderRequest::stop(
            stopper,
            btc_usd(),
            OrderSide::Sell,
            OrderType::StopLoss,
            Decimal::ONE,
            dec(99),
            None,
        );
        let parked = state.submit(&stop, Utc::now(), &mut cx).unwrap();
        assert_eq!(parked.status, OrderStatus::Pending);
        assert_eq!(state.stops.len(), 1);

        // A trade at 98 fires the sell stop (last <= 99).
        state
            .submit(&limit(trader, OrderSide::Sell, Decimal::ONE, dec(98)), Utc::now(), &mut cx)
            .unwrap();
        state
            .submit(&limit(maker, OrderSide::Buy, Decimal::ONE, dec(98)), Utc::now(), &mut cx)
            .unwrap();

        let converted = state.lookup(&parked.order_id).unwrap();
        assert_eq!(converted.triggered_from, Some(OrderType::StopLoss));
        assert_eq!(converted.order_type, OrderType::Market);
        assert_eq!(converted.status, OrderStatus::Filled);
        assert_eq!(converted.avg_fill_price, dec(95));
        assert!(state.stops.is_empty());
        assert!(!state.book.is_crossed());
    }

    #[test]
    fn unfunded_triggered_stop_is_rejected_with_alert() {
        let ledger = WalletLedger::default();
        let fees = FeeSchedule::free();
        let mut state = state();
        let (a, b) = (funded(&ledger), funded(&ledger));
        let broke = UserId::new();
        let mut cx = ctx(&ledger, &fees);

        let stop = OrderRequest::stop(
            broke,
            btc_usd(),
            OrderSide::Buy,
            OrderType::StopLimit,
            Decimal::ONE,
            dec(100),
            Some(dec(101)),
        );
        let parked = state.submit(&stop, Utc::now(), &mut cx).unwrap();
        state
            .submit(&limit(a, OrderSide::Sell, Decimal::ONE, dec(100)), Utc::now(), &mut cx)
            .unwrap();
        state
            .submit(&limit(b, OrderSide::Buy, Decimal::ONE, dec(100)), Utc::now(), &mut cx)
            .unwrap();

        assert_eq!(state.lookup(&parked.order_id).unwrap().status, OrderStatus::Rejected);
        assert!(cx.events.iter().any(|e| matches!(
            e,
            EngineEvent::Alert(Alert { kind: AlertKind::StopRejected, .. })
        )));
    }

    #[test]
    fn expiry_releases_reservation() {
        let ledger = WalletLedger::default();
        let fees = FeeSchedule::free();
        let mut state = state();
        let user = funded(&ledger);
        let mut cx = ctx(&ledger, &fees);

        let now = Utc::now();
        let request = limit(user, OrderSide::Buy, Decimal::ONE, dec(100))
            .with_expiry(now + chrono::Duration::seconds(30));
        let placed = state.submit(&request, now, &mut cx).unwrap();
        assert_eq!(ledger.balance(user, "USD").locked, dec(100));

        assert!(state.expire(now, &mut cx).is_empty());
        let expired = state.expire(now + chrono::Duration::minutes(1), &mut cx);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].order_id, placed.order_id);
        assert_eq!(expired[0].status, OrderStatus::Expired);
        assert_eq!(expired[0].released, dec(100));
        assert_eq!(ledger.balance(user, "USD").locked, Decimal::ZERO);
    }
}
