//! Platform Configuration

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::ledger::DEFAULT_FEE_PERCENTAGE;

/// Settlement policy knobs
#[derive(Clone, Debug)]
pub struct PlatformConfig {
    /// Percentage of each order retained by the platform
    pub fee_percentage: Decimal,

    /// Smallest payout a creator may request (INR)
    pub min_payout_amount: Decimal,

    /// Count `processing` payouts against the available balance
    pub deduct_processing_payouts: bool,

    /// Look-ahead window for expiry reminders
    pub expiry_reminder_days: u32,

    /// Attempts for the membership side effect of a completed order
    pub side_effect_attempts: u32,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            fee_percentage: DEFAULT_FEE_PERCENTAGE,
            min_payout_amount: dec!(100),
            deduct_processing_payouts: true,
            expiry_reminder_days: 3,
            side_effect_attempts: 3,
        }
    }
}

impl PlatformConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            fee_percentage: env_parse("PLATFORM_FEE_PERCENT").unwrap_or(defaults.fee_percentage),
            min_payout_amount: env_parse("MIN_PAYOUT_AMOUNT")
                .unwrap_or(defaults.min_payout_amount),
            deduct_processing_payouts: env_parse("PAYOUT_DEDUCT_PROCESSING")
                .unwrap_or(defaults.deduct_processing_payouts),
            expiry_reminder_days: env_parse("EXPIRY_REMINDER_DAYS")
                .unwrap_or(defaults.expiry_reminder_days),
            ..defaults
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
