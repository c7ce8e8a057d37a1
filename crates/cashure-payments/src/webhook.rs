//! Payment Confirmation Handling
//!
//! Verifies signed gateway callbacks and applies the payment outcome to the
//! order. The same path serves polled verification.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use cashure_core::service::OrderService;
use cashure_core::{Clock, Order, OrderId, OrderStatus, PaymentMeta, SettlementError};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;

use crate::error::{PaymentError, Result};
use crate::gateway::{PaymentOutcome, parse_order_ref};

type HmacSha256 = Hmac<Sha256>;

/// A payment outcome reported for one of our orders
#[derive(Clone, Debug)]
pub struct PaymentConfirmation {
    pub order_id: OrderId,
    pub outcome: PaymentOutcome,
    pub reference_id: Option<String>,
    /// Amount the processor collected, when it says
    pub amount: Option<Decimal>,
    /// Raw processor payload, stored on the order
    pub payload: serde_json::Value,
}

/// Callback body as the gateway posts it
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload {
    order_id: String,
    order_amount: serde_json::Value,
    payment_status: String,
    #[serde(default)]
    reference_id: Option<serde_json::Value>,
}

fn json_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `hex(hmac_sha256(secret, timestamp ++ payload))`
pub fn sign(secret: &str, timestamp: &str, payload: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::Config(format!("bad webhook secret: {e}")))?;
    mac.update(timestamp.as_bytes());
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Apply a confirmation to its order.
///
/// Amounts that disagree with the stored order are rejected without any
/// state change. A success redelivered for a completed order re-applies
/// missing side effects instead of failing.
pub async fn apply_confirmation(orders: &OrderService, confirmation: &PaymentConfirmation) -> Result<Order> {
    let id = confirmation.order_id;
    let order = orders.get(id).await?;

    if let Some(amount) = confirmation.amount {
        if amount != order.amount {
            tracing::warn!(
                order_id = %id,
                reported = %amount,
                stored = %order.amount,
                "Payment amount mismatch; order left unchanged"
            );
            return Err(SettlementError::IntegrityMismatch(format!(
                "order {id} is {} but payment reported {amount}",
                order.amount
            ))
            .into());
        }
    }

    let meta = PaymentMeta {
        payment_id: confirmation.reference_id.clone(),
        payment_data: Some(confirmation.payload.clone()),
    };

    match (confirmation.outcome, order.status) {
        (PaymentOutcome::Pending, _) => Ok(order),
        (PaymentOutcome::Success, OrderStatus::Completed) => {
            tracing::debug!(order_id = %id, "Duplicate success confirmation");
            Ok(orders.ensure_fulfilled(id).await?)
        }
        (PaymentOutcome::Success, _) => match orders.complete(id, meta).await {
            Ok(done) => Ok(done),
            // Lost a race with another confirmation for the same order
            Err(e @ SettlementError::InvalidTransition { .. }) => {
                if orders.get(id).await?.is_completed() {
                    Ok(orders.ensure_fulfilled(id).await?)
                } else {
                    Err(e.into())
                }
            }
            Err(e) => Err(e.into()),
        },
        (PaymentOutcome::Failure, OrderStatus::Pending) => {
            Ok(orders.update_status(id, OrderStatus::Failed, meta).await?)
        }
        (PaymentOutcome::Failure, status) => {
            tracing::warn!(order_id = %id, status = %status, "Ignoring failure for settled order");
            Ok(order)
        }
    }
}

/// Signed payment callback handler
pub struct WebhookHandler {
    orders: Arc<OrderService>,
    secret: String,
    tolerance: Duration,
    clock: Arc<dyn Clock>,
}

impl WebhookHandler {
    pub fn new(
        orders: Arc<OrderService>,
        secret: impl Into<String>,
        tolerance: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            orders,
            secret: secret.into(),
            tolerance,
            clock,
        }
    }

    /// Check the signature and timestamp freshness of a raw callback body
    pub fn verify_signature(&self, payload: &[u8], timestamp: &str, signature: &str) -> Result<()> {
        let sent_at: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| PaymentError::WebhookSignature("invalid timestamp".into()))?;
        let age = (self.clock.now().timestamp() - sent_at).unsigned_abs();
        if age > self.tolerance.as_secs() {
            return Err(PaymentError::WebhookSignature(format!(
                "timestamp outside tolerance ({age}s)"
            )));
        }

        let provided = hex::decode(signature.trim())
            .map_err(|_| PaymentError::WebhookSignature("signature is not hex".into()))?;
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| PaymentError::Config(format!("bad webhook secret: {e}")))?;
        mac.update(timestamp.trim().as_bytes());
        mac.update(payload);
        mac.verify_slice(&provided)
            .map_err(|_| PaymentError::WebhookSignature("signature mismatch".into()))
    }

    /// Parse a callback body; SUCCESS means paid, anything else means failed
    pub fn parse(payload: &[u8]) -> Result<PaymentConfirmation> {
        let body: WebhookPayload =
            serde_json::from_slice(payload).map_err(|e| PaymentError::WebhookParse(e.to_string()))?;
        let raw: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| PaymentError::WebhookParse(e.to_string()))?;

        let amount = Decimal::from_str(json_text(&body.order_amount).trim()).map_err(|_| {
            PaymentError::WebhookParse(format!("invalid orderAmount {}", body.order_amount))
        })?;
        let outcome = if body.payment_status.trim().eq_ignore_ascii_case("SUCCESS") {
            PaymentOutcome::Success
        } else {
            PaymentOutcome::Failure
        };

        Ok(PaymentConfirmation {
            order_id: parse_order_ref(&body.order_id)?,
            outcome,
            reference_id: body.reference_id.as_ref().map(json_text),
            amount: Some(amount),
            payload: raw,
        })
    }

    /// Verify, parse and apply a callback
    pub async fn handle(&self, payload: &[u8], timestamp: &str, signature: &str) -> Result<Order> {
        if let Err(e) = self.verify_signature(payload, timestamp, signature) {
            tracing::warn!(error = %e, "Rejected payment webhook");
            return Err(e);
        }

        let confirmation = Self::parse(payload)?;
        tracing::info!(
            order_id = %confirmation.order_id,
            outcome = ?confirmation.outcome,
            reference_id = ?confirmation.reference_id,
            "Processing payment webhook"
        );

        apply_confirmation(&self.orders, &confirmation).await
    }
}
