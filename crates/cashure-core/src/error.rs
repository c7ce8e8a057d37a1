//! Settlement Error Types

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, SettlementError>;

/// Settlement, membership and payout errors
#[derive(Error, Debug)]
pub enum SettlementError {
    /// Non-positive or malformed monetary input
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Payout below the platform minimum
    #[error("Payout of {amount} is below the minimum of {minimum}")]
    BelowMinimum { amount: Decimal, minimum: Decimal },

    /// Payout larger than the creator's available balance
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },

    /// Unknown order/product/membership/payout id
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Status change not permitted by the state machine
    #[error("Invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// Confirmation data disagrees with the stored record
    #[error("Integrity mismatch: {0}")]
    IntegrityMismatch(String),

    /// Bank/UPI details missing or ambiguous
    #[error("Invalid payment details: {0}")]
    InvalidPaymentDetails(String),

    /// Other malformed input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Caller lacks the required role
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Persistence failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Outbound notification could not be delivered
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

impl SettlementError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn transition(entity: &'static str, from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Delivery(_))
    }

    /// Stable machine-readable code
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::BelowMinimum { .. } => "BELOW_MINIMUM",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::IntegrityMismatch(_) => "INTEGRITY_MISMATCH",
            Self::InvalidPaymentDetails(_) => "INVALID_PAYMENT_DETAILS",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Delivery(_) => "DELIVERY_FAILED",
        }
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::BelowMinimum { minimum, .. } => {
                format!("Minimum payout amount is ₹{minimum}.")
            }
            Self::InsufficientBalance { .. } => {
                "Payout amount exceeds available balance.".into()
            }
            Self::NotFound { entity, .. } => format!("{entity} not found."),
            Self::Unauthorized(_) => "You are not allowed to perform this action.".into(),
            Self::Storage(_) => "A temporary error occurred. Please try again.".into(),
            other => other.to_string(),
        }
    }
}
