//! Taker fee calculation.
//!
//! The fee is priced in quote currency, `max(minimum_fee, notional × rate)`,
//! and taken out of whatever the taker receives: quote for a selling taker,
//! base for a buying taker (converted at the execution price). It never
//! exceeds the amount received. Makers pay nothing.

use rust_decimal::Decimal;
use spotmatch_types::{
    Currency, FeeSchedule, MarketPair, OrderSide, Result, SpotmatchError, constants,
};

/// A fee in the currency it is collected in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeCharge {
    pub amount: Decimal,
    pub currency: Currency,
}

/// Quote-denominated taker fee for a trade notional.
pub fn taker_fee(schedule: &FeeSchedule, notional: Decimal) -> Result<Decimal> {
    let fee = notional.checked_mul(schedule.taker_fee_rate).ok_or_else(|| {
        SpotmatchError::Internal(format!("fee on notional {notional} overflows"))
    })?;
    Ok(fee.max(schedule.minimum_fee))
}

/// The fee a taker on `taker_side` pays for `quantity` at `price`.
pub fn charge_for(
    schedule: &FeeSchedule,
    pair: &MarketPair,
    taker_side: OrderSide,
    price: Decimal,
    quantity: Decimal,
) -> Result<FeeCharge> {
    let notional = price.checked_mul(quantity).ok_or_else(|| {
        SpotmatchError::Internal(format!("notional of {quantity} at {price} overflows"))
    })?;
    let quote_fee = taker_fee(schedule, notional)?;
    let charge = match taker_side {
        OrderSide::Buy => {
            let base_fee = if price.is_zero() {
                Decimal::ZERO
            } else {
                (quote_fee / price).round_dp(constants::QTY_PRECISION)
            };
            FeeCharge {
                amount: base_fee.min(quantity),
                currency: pair.base.clone(),
            }
        }
        OrderSide::Sell => FeeCharge {
            amount: quote_fee.min(notional),
            currency: pair.quote.clone(),
        },
    };
    Ok(charge)
}
