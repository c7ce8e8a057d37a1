//! Ledger Primitives
//!
//! Fee-split arithmetic. The platform fee is rounded to paise once and the
//! creator's share is derived by subtraction, so the two always add back up
//! to the order amount exactly.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SettlementError};

/// Minor-unit precision of INR
pub const CURRENCY_SCALE: u32 = 2;

/// Platform fee applied to new orders
pub const DEFAULT_FEE_PERCENTAGE: Decimal = dec!(10);

/// Result of splitting an order amount
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub platform_fee: Decimal,
    pub creator_earnings: Decimal,
}

/// Round to paise, half away from zero
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Reject non-positive amounts and amounts finer than one paisa
pub fn validate_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(SettlementError::InvalidAmount(format!(
            "amount must be positive, got {amount}"
        )));
    }
    if amount.normalize().scale() > CURRENCY_SCALE {
        return Err(SettlementError::InvalidAmount(format!(
            "amount {amount} has more than {CURRENCY_SCALE} decimal places"
        )));
    }
    Ok(())
}

/// Split `amount` into platform fee and creator earnings
pub fn split(amount: Decimal, fee_percentage: Decimal) -> Result<FeeSplit> {
    validate_amount(amount)?;
    if fee_percentage < Decimal::ZERO || fee_percentage > dec!(100) {
        return Err(SettlementError::InvalidInput(format!(
            "fee percentage out of range: {fee_percentage}"
        )));
    }

    let platform_fee = round2(amount * fee_percentage / dec!(100));
    Ok(FeeSplit {
        platform_fee,
        creator_earnings: amount - platform_fee,
    })
}

/// `(current - previous) / previous * 100`, or zero without a baseline
pub fn growth_percent(current: Decimal, previous: Decimal) -> Decimal {
    if previous.is_zero() {
        return Decimal::ZERO;
    }
    round2((current - previous) / previous * dec!(100))
}
