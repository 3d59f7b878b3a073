//! Settlement idempotency guard.
//!
//! Each trade id can be settled once. A second attempt is
//! [`SpotmatchError::TradeAlreadySettled`]. The set is bounded; once full,
//! the oldest id is evicted (FIFO), so memory stays flat on a long-running
//! engine.

use std::collections::{HashSet, VecDeque};

use spotmatch_types::{Result, SpotmatchError, TradeId};

/// Bounded FIFO set of settled trade ids.
#[derive(Debug)]
pub struct SettlementGuard {
    settled: HashSet<TradeId>,
    /// Insertion order (front = oldest).
    order: VecDeque<TradeId>,
    max_size: usize,
}

impl SettlementGuard {
    /// A guard remembering at most `max_size` ids (at least one).
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            settled: HashSet::with_capacity(max_size.min(4096)),
            order: VecDeque::with_capacity(max_size.min(4096)),
            max_size,
        }
    }

    /// Claim `trade_id` for settlement.
    pub fn mark_settled(&mut self, trade_id: TradeId) -> Result<()> {
        if self.settled.contains(&trade_id) {
            return Err(SpotmatchError::TradeAlreadySettled(trade_id));
        }
        if self.settled.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.settled.remove(&oldest);
            }
        }
        self.settled.insert(trade_id);
        self.order.push_back(trade_id);
        Ok(())
    }

    /// Drop a claim whose settlement did not go through.
    pub fn forget(&mut self, trade_id: &TradeId) {
        if self.settled.remove(trade_id) {
            self.order.retain(|id| id != trade_id);
        }
    }

    #[must_use]
    pub fn is_settled(&self, trade_id: &TradeId) -> bool {
        self.settled.contains(trade_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.settled.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.settled.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use spotmatch_types::MarketPair;

    use super::*;

    fn trade(seq: u64) -> TradeId {
        TradeId::deterministic(&MarketPair::new("BTC", "USD"), seq)
    }

    #[test]
    fn double_settle_blocked() {
        let mut guard = SettlementGuard::new(100);
        let id = trade(1);
        guard.mark_settled(id).unwrap();
        let err = guard.mark_settled(id).unwrap_err();
        assert!(matches!(err, SpotmatchError::TradeAlreadySettled(x) if x == id));
    }

    #[test]
    fn evicts_oldest() {
        let mut guard = SettlementGuard::new(3);
        for seq in 1..=4 {
            guard.mark_settled(trade(seq)).unwrap();
        }
        assert_eq!(guard.len(), 3);
        assert!(!guard.is_settled(&trade(1)), "oldest should have been evicted");
        assert!(guard.is_settled(&trade(4)));
    }

    #[test]
    fn forget_allows_retry() {
        let mut guard = SettlementGuard::new(10);
        let id = trade(9);
        guard.mark_settled(id).unwrap();
        guard.forget(&id);
        assert!(guard.is_empty());
        guard.mark_settled(id).unwrap();
    }

    #[test]
    fn zero_size_still_guards_latest() {
        let mut guard = SettlementGuard::new(0);
        guard.mark_settled(trade(1)).unwrap();
        assert!(guard.mark_settled(trade(1)).is_err());
    }
}
