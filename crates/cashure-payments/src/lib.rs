//! # cashure-payments
//!
//! Payment processing and transactional email for Cashure.
//!
//! ## Checkout flow
//!
//! ```text
//! ┌──────────────┐  submit   ┌──────────────┐  redirect  ┌──────────────┐
//! │   Customer   │──────────▶│   Checkout   │───────────▶│   Gateway    │
//! └──────────────┘           │ (order: pend)│            │ hosted page  │
//!                            └──────────────┘            └──────┬───────┘
//!                                   ▲   verify (poll)           │ webhook
//!                                   │                           ▼
//!                            ┌──────┴───────────────────────────────────┐
//!                            │  apply_confirmation → OrderService       │
//!                            │  (completed | failed, membership, email) │
//!                            └──────────────────────────────────────────┘
//! ```
//!
//! Gateway calls are bounded by [`GatewayConfig::timeout`]. A checkout whose
//! gateway call times out keeps its pending order and reports
//! [`PaymentError::GatewayTimeout`]; nothing is charged.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cashure_payments::{CashfreeClient, CheckoutService, GatewayConfig};
//!
//! let config = GatewayConfig::from_env()?;
//! let gateway = Arc::new(CashfreeClient::new(config.clone())?);
//! let checkout = CheckoutService::new(orders, stores.products.clone(), gateway, config);
//!
//! let session = checkout.submit(request).await?;
//! // Redirect the customer to: session.payment_url
//! ```

mod checkout;
mod email;
mod error;
mod gateway;
mod webhook;

pub use checkout::{CheckoutRequest, CheckoutService, CheckoutSession};
pub use email::{BrevoNotifier, EmailConfig, EmailMessage, EmailTemplates};
pub use error::{PaymentError, Result};
pub use gateway::{
    CashfreeClient, GatewayConfig, GatewayPayment, PaymentGateway, PaymentOutcome,
    PaymentRequest, PaymentSession, order_ref, parse_order_ref,
};
pub use webhook::{PaymentConfirmation, WebhookHandler, apply_confirmation, sign};
