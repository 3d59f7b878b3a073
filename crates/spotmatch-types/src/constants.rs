//! System-wide constants for the SpotMatch matching core.

/// Decimal places kept for prices.
pub const PRICE_PRECISION: u32 = 8;

/// Decimal places kept for quantities (also used for fees converted to base).
pub const QTY_PRECISION: u32 = 8;

/// Default taker fee rate in basis points (10 bps = 0.10%).
pub const DEFAULT_TAKER_FEE_BPS: i64 = 10;

/// Default market-order price collar in basis points (500 bps = 5%).
pub const DEFAULT_MARKET_SLIPPAGE_BPS: i64 = 500;

/// Default capacity of event queues handed to sinks.
pub const DEFAULT_EVENT_BUFFER: usize = 4096;

/// Default period of the expiry sweep in milliseconds.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1000;

/// Settlement idempotency cache size (number of trade IDs to remember).
pub const DEFAULT_SETTLEMENT_GUARD_SIZE: usize = 100_000;

/// Terminal orders kept queryable per pair before the oldest are evicted.
pub const DEFAULT_TERMINAL_RETENTION: usize = 100_000;

/// Maximum depth returned by a book snapshot.
pub const MAX_SNAPSHOT_DEPTH: usize = 500;

/// Environment variable naming the engine config file.
pub const CONFIG_ENV_VAR: &str = "SPOTMATCH_CONFIG";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "SpotMatch";
