//! Configuration types for the engine and its trading pairs.
//!
//! Loaded from JSON by the node binary; every field has a default so a
//! partial file is enough.

use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{MarketPair, Result, SpotmatchError, constants};

/// Taker fee schedule. Makers pay nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    /// Fraction of the trade notional charged to the taker.
    pub taker_fee_rate: Decimal,
    /// Floor for a single taker fee, in quote currency.
    pub minimum_fee: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            taker_fee_rate: Decimal::new(constants::DEFAULT_TAKER_FEE_BPS, 4),
            minimum_fee: Decimal::ZERO,
        }
    }
}

impl FeeSchedule {
    /// No fees at all.
    #[must_use]
    pub fn free() -> Self {
        Self {
            taker_fee_rate: Decimal::ZERO,
            minimum_fee: Decimal::ZERO,
        }
    }
}

/// Per-pair configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairConfig {
    pub base: String,
    pub quote: String,
    /// Minimum order size in base currency.
    #[serde(default)]
    pub min_order_size: Decimal,
    /// Price granularity. Zero disables the check.
    #[serde(default)]
    pub tick_size: Decimal,
    /// Quantity granularity. Zero disables the check.
    #[serde(default)]
    pub lot_size: Decimal,
    /// Inactive pairs reject new orders; cancels still work.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl PairConfig {
    /// BTC/USD with cent ticks and satoshi-ish lots.
    #[must_use]
    pub fn btc_usd() -> Self {
        Self {
            base: "BTC".to_string(),
            quote: "USD".to_string(),
            min_order_size: Decimal::new(1, 5), // 0.00001 BTC
            tick_size: Decimal::new(1, 2),      // 0.01 USD
            lot_size: Decimal::new(1, 5),       // 0.00001 BTC
            active: true,
        }
    }

    #[must_use]
    pub fn eth_usd() -> Self {
        Self {
            base: "ETH".to_string(),
            quote: "USD".to_string(),
            min_order_size: Decimal::new(1, 4), // 0.0001 ETH
            tick_size: Decimal::new(1, 2),      // 0.01 USD
            lot_size: Decimal::new(1, 4),       // 0.0001 ETH
            active: true,
        }
    }

    #[must_use]
    pub fn pair(&self) -> MarketPair {
        MarketPair::new(self.base.clone(), self.quote.clone())
    }

    /// Returns the pair symbol (e.g., "BTC/USD").
    #[must_use]
    pub fn symbol(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub pairs: Vec<PairConfig>,
    pub fees: FeeSchedule,
    /// Price collar for market orders as a fraction of the reference price.
    pub market_slippage: Decimal,
    /// Capacity of bounded event queues.
    pub event_buffer: usize,
    /// Period of the background expiry sweep.
    pub sweep_interval_ms: u64,
    /// How many settled trade ids the ledger remembers.
    pub settlement_guard_size: usize,
    /// How many terminal orders each pair keeps for lookups.
    pub terminal_retention: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pairs: vec![PairConfig::btc_usd(), PairConfig::eth_usd()],
            fees: FeeSchedule::default(),
            market_slippage: Decimal::new(constants::DEFAULT_MARKET_SLIPPAGE_BPS, 4),
            event_buffer: constants::DEFAULT_EVENT_BUFFER,
            sweep_interval_ms: constants::DEFAULT_SWEEP_INTERVAL_MS,
            settlement_guard_size: constants::DEFAULT_SETTLEMENT_GUARD_SIZE,
            terminal_retention: constants::DEFAULT_TERMINAL_RETENTION,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.fees.taker_fee_rate < Decimal::ZERO || self.fees.taker_fee_rate >= Decimal::ONE {
            return Err(SpotmatchError::Configuration(format!(
                "taker_fee_rate must be in [0, 1), got {}",
                self.fees.taker_fee_rate
            )));
        }
        if self.fees.minimum_fee < Decimal::ZERO {
            return Err(SpotmatchError::Configuration(
                "minimum_fee must not be negative".to_string(),
            ));
        }
        if self.market_slippage < Decimal::ZERO || self.market_slippage >= Decimal::ONE {
            return Err(SpotmatchError::Configuration(format!(
                "market_slippage must be in [0, 1), got {}",
                self.market_slippage
            )));
        }
        if self.event_buffer == 0
            || self.settlement_guard_size == 0
            || self.terminal_retention == 0
        {
            return Err(SpotmatchError::Configuration(
                "event_buffer, settlement_guard_size and terminal_retention must be > 0"
                    .to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for pair in &self.pairs {
            if pair.base == pair.quote {
                return Err(SpotmatchError::Configuration(format!(
                    "pair {} trades a currency against itself",
                    pair.symbol()
                )));
            }
            if pair.tick_size < Decimal::ZERO
                || pair.lot_size < Decimal::ZERO
                || pair.min_order_size < Decimal::ZERO
            {
                return Err(SpotmatchError::Configuration(format!(
                    "pair {} has a negative size parameter",
                    pair.symbol()
                )));
            }
            if !seen.insert(pair.symbol()) {
                return Err(SpotmatchError::Configuration(format!(
                    "pair {} configured twice",
                    pair.symbol()
                )));
            }
        }
        Ok(())
    }
}
