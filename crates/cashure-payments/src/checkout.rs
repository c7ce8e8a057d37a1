//! Hosted Checkout
//!
//! Creates the pending order, opens a gateway session for it and later
//! polls the gateway to settle orders whose callback never arrived.

use std::sync::Arc;

use cashure_core::service::OrderService;
use cashure_core::store::ProductStore;
use cashure_core::{NewOrder, Order, OrderId, OrderType, ProductId, SettlementError, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};
use crate::gateway::{GatewayConfig, PaymentGateway, PaymentOutcome, PaymentRequest, order_ref};
use crate::webhook::{PaymentConfirmation, apply_confirmation};

/// Request to create a checkout
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub creator_id: UserId,

    /// Absent for donations
    #[serde(default)]
    pub product_id: Option<ProductId>,

    pub amount: Decimal,

    pub customer_email: String,

    #[serde(default)]
    pub customer_name: Option<String>,

    #[serde(default)]
    pub customer_phone: Option<String>,

    /// Logged-in buyer; required for memberships
    #[serde(default)]
    pub customer_id: Option<UserId>,

    #[serde(rename = "type")]
    pub order_type: OrderType,
}

/// Result of a successful checkout
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub order: Order,
    /// Gateway-side order reference
    pub order_ref: String,
    pub session_id: String,
    /// URL to redirect the customer to
    pub payment_url: String,
}

/// Checkout flow over a [`PaymentGateway`]
pub struct CheckoutService {
    orders: Arc<OrderService>,
    products: Arc<dyn ProductStore>,
    gateway: Arc<dyn PaymentGateway>,
    config: GatewayConfig,
}

impl CheckoutService {
    pub fn new(
        orders: Arc<OrderService>,
        products: Arc<dyn ProductStore>,
        gateway: Arc<dyn PaymentGateway>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            orders,
            products,
            gateway,
            config,
        }
    }

    /// Record a pending order and open a payment session for it.
    ///
    /// A gateway failure or timeout leaves the pending order in place; it
    /// is never charged and can be retried through [`Self::verify`].
    pub async fn submit(&self, request: CheckoutRequest) -> Result<CheckoutSession> {
        let product_name = match request.product_id {
            Some(product_id) => {
                let product = self
                    .products
                    .get(product_id)
                    .await?
                    .ok_or_else(|| SettlementError::not_found("product", product_id))?;
                if !product.is_active {
                    return Err(SettlementError::InvalidInput(format!(
                        "product {product_id} is not available"
                    ))
                    .into());
                }
                if product.price != request.amount {
                    return Err(SettlementError::InvalidAmount(format!(
                        "amount {} does not match price {}",
                        request.amount, product.price
                    ))
                    .into());
                }
                product.title
            }
            None => "Support".to_string(),
        };

        let order = self
            .orders
            .create(NewOrder {
                creator_id: request.creator_id,
                product_id: request.product_id,
                amount: request.amount,
                customer_email: request.customer_email.clone(),
                customer_name: request.customer_name.clone(),
                customer_id: request.customer_id,
                order_type: request.order_type,
            })
            .await?;

        let payment = PaymentRequest {
            order_id: order.id,
            amount: order.amount,
            customer_email: request.customer_email,
            customer_name: request
                .customer_name
                .unwrap_or_else(|| "Customer".to_string()),
            customer_phone: request.customer_phone,
            return_url: self.config.return_url(order.id),
            notify_url: self.config.notify_url(),
            product_name,
        };

        let session = match tokio::time::timeout(
            self.config.timeout,
            self.gateway.create_session(&payment),
        )
        .await
        {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                tracing::warn!(order_id = %order.id, error = %e, "Payment session failed; order left pending");
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(
                    order_id = %order.id,
                    timeout = ?self.config.timeout,
                    "Payment gateway timed out; order left pending"
                );
                return Err(PaymentError::GatewayTimeout(self.config.timeout));
            }
        };

        tracing::info!(
            order_id = %order.id,
            session_id = %session.session_id,
            "Opened payment session"
        );

        Ok(CheckoutSession {
            order,
            order_ref: session.order_ref,
            session_id: session.session_id,
            payment_url: session.payment_url,
        })
    }

    /// Ask the gateway for the order's payment and settle accordingly.
    ///
    /// Orders with no payment yet, or one still in flight, are returned
    /// unchanged.
    pub async fn verify(&self, order_id: OrderId) -> Result<Order> {
        let order = self.orders.get(order_id).await?;
        let reference = order_ref(order_id);

        let payment = tokio::time::timeout(self.config.timeout, self.gateway.fetch_payment(&reference))
            .await
            .map_err(|_| PaymentError::GatewayTimeout(self.config.timeout))??;

        let Some(payment) = payment else {
            tracing::debug!(order_id = %order_id, "No payment recorded yet");
            return Ok(order);
        };

        let outcome = PaymentOutcome::from_status(&payment.status);
        if outcome == PaymentOutcome::Pending {
            return Ok(order);
        }

        let confirmation = PaymentConfirmation {
            order_id,
            outcome,
            reference_id: payment.payment_id.clone(),
            amount: payment.amount,
            payload: serde_json::to_value(&payment)
                .map_err(|e| PaymentError::Gateway(e.to_string()))?,
        };
        apply_confirmation(&self.orders, &confirmation).await
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}
