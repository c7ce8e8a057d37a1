//! Application State

use std::sync::Arc;

use cashure_core::{
    AnalyticsAggregator, MembershipService, OrderService, PayoutEngine, SubscriptionManager,
};
use cashure_payments::{CheckoutService, WebhookHandler};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderService>,

    pub memberships: Arc<MembershipService>,

    pub payouts: Arc<PayoutEngine>,

    pub subscriptions: Arc<SubscriptionManager>,

    pub analytics: Arc<AnalyticsAggregator>,

    /// Checkout (optional - None if the gateway is not configured)
    pub checkout: Option<Arc<CheckoutService>>,

    /// Payment webhook handler (optional, configured with the gateway)
    pub webhook: Option<Arc<WebhookHandler>>,
}
