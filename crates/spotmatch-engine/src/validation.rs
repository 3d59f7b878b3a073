//! Order validation.
//!
//! Every check runs before the engine touches a wallet or the book, so a
//! failure here has no side effects. [`validate_request`] is the single
//! entry point; the individual rules are exposed for reuse and tests.

use chrono::{DateTime, Days, Utc};
use rust_decimal::Decimal;
use spotmatch_types::{
    OrderRequest, OrderType, PairConfig, Result, SpotmatchError, TimeInForce,
};

// ============================================================================
// Individual rules
// ============================================================================

/// Quantity must be positive, at least the pair minimum, and a whole number
/// of lots.
pub fn validate_quantity(quantity: Decimal, config: &PairConfig) -> Result<()> {
    if quantity <= Decimal::ZERO {
        return Err(SpotmatchError::validation(format!(
            "quantity must be positive, got {quantity}"
        )));
    }
    if quantity < config.min_order_size {
        return Err(SpotmatchError::validation(format!(
            "quantity {quantity} below minimum {}",
            config.min_order_size
        )));
    }
    if config.lot_size > Decimal::ZERO && !(quantity % config.lot_size).is_zero() {
        return Err(SpotmatchError::validation(format!(
            "quantity {quantity} is not a multiple of lot size {}",
            config.lot_size
        )));
    }
    Ok(())
}

/// Limit-family orders need a positive price; any price given must sit on
/// the tick grid.
pub fn validate_price(
    price: Option<Decimal>,
    order_type: OrderType,
    config: &PairConfig,
) -> Result<()> {
    match price {
        None if order_type.requires_price() => Err(SpotmatchError::validation(format!(
            "{order_type} orders must carry a price"
        ))),
        None => Ok(()),
        Some(p) if p <= Decimal::ZERO => Err(SpotmatchError::validation(format!(
            "price must be positive, got {p}"
        ))),
        Some(p) => validate_tick(p, config),
    }
}

/// Stop-family orders need a positive stop price on the tick grid.
pub fn validate_stop_price(
    stop_price: Option<Decimal>,
    order_type: OrderType,
    config: &PairConfig,
) -> Result<()> {
    if !order_type.is_stop_family() {
        return Ok(());
    }
    match stop_price {
        None => Err(SpotmatchError::validation(format!(
            "{order_type} orders must carry a stop price"
        ))),
        Some(p) if p <= Decimal::ZERO => Err(SpotmatchError::validation(format!(
            "stop price must be positive, got {p}"
        ))),
        Some(p) => validate_tick(p, config),
    }
}

fn validate_tick(price: Decimal, config: &PairConfig) -> Result<()> {
    if config.tick_size > Decimal::ZERO && !(price % config.tick_size).is_zero() {
        return Err(SpotmatchError::validation(format!(
            "price {price} is not a multiple of tick size {}",
            config.tick_size
        )));
    }
    Ok(())
}

/// `quantity × price`, refused when it does not fit a `Decimal`.
pub fn notional(quantity: Decimal, price: Decimal) -> Result<Decimal> {
    quantity.checked_mul(price).ok_or_else(|| {
        SpotmatchError::validation(format!(
            "notional of {quantity} at {price} exceeds the representable range"
        ))
    })
}

/// An explicit expiry must lie in the future.
pub fn validate_expiry(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Result<()> {
    match expires_at {
        Some(at) if at <= now => Err(SpotmatchError::validation(format!(
            "expiry {at} is not in the future"
        ))),
        _ => Ok(()),
    }
}

/// Expiry for a DAY order placed at `now`: the next UTC midnight.
pub fn end_of_day(now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    now.date_naive()
        .checked_add_days(Days::new(1))
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .ok_or_else(|| SpotmatchError::validation(format!("no trading day after {now}")))
}

/// Expiry the engine assigns: the explicit one, else end of day for DAY.
pub fn effective_expiry(
    time_in_force: TimeInForce,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    match (expires_at, time_in_force) {
        (Some(at), _) => Ok(Some(at)),
        (None, TimeInForce::Day) => end_of_day(now).map(Some),
        (None, _) => Ok(None),
    }
}

// ============================================================================
// Composite
// ============================================================================

/// Validate a request against its pair's configuration.
///
/// Checks, in order: pair active, quantity, price, stop price, notional at
/// each given price, expiry.
pub fn validate_request(
    request: &OrderRequest,
    config: &PairConfig,
    now: DateTime<Utc>,
) -> Result<()> {
    if !config.active {
        return Err(SpotmatchError::PairInactive(request.pair.clone()));
    }
    validate_quantity(request.quantity, config)?;
    validate_price(request.price, request.order_type, config)?;
    validate_stop_price(request.stop_price, request.order_type, config)?;
    for price in [request.price, request.stop_price].into_iter().flatten() {
        notional(request.quantity, price)?;
    }
    validate_expiry(request.expires_at, now)?;
    Ok(())
}
