//! Payment Error Types

use std::time::Duration;

use cashure_core::SettlementError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Rejected by the settlement core
    #[error(transparent)]
    Settlement(#[from] SettlementError),

    /// Payment gateway API error
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Gateway did not answer in time; nothing was committed
    #[error("Gateway timed out after {0:?}")]
    GatewayTimeout(Duration),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Email provider error
    #[error("Email error: {0}")]
    Email(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Settlement(e) => e.is_retryable(),
            Self::Gateway(_) | Self::GatewayTimeout(_) | Self::Email(_) => true,
            _ => false,
        }
    }

    /// Stable machine-readable code
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Settlement(e) => e.code(),
            Self::Gateway(_) => "GATEWAY_ERROR",
            Self::GatewayTimeout(_) => "GATEWAY_TIMEOUT",
            Self::WebhookSignature(_) => "INVALID_SIGNATURE",
            Self::WebhookParse(_) => "INVALID_WEBHOOK",
            Self::Email(_) => "EMAIL_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Settlement(e) => e.user_message(),
            Self::Gateway(_) => "Payment processing failed. Please try again.".into(),
            Self::GatewayTimeout(_) => {
                "The payment provider is not responding. Your order is saved; please retry.".into()
            }
            Self::Config(_) => "Service configuration error.".into(),
            _ => "An error occurred processing your request.".into(),
        }
    }
}

impl From<reqwest::Error> for PaymentError {
    fn from(e: reqwest::Error) -> Self {
        Self::Gateway(e.to_string())
    }
}
