//! Cashure HTTP Server
//!
//! Axum-based composition root: builds the stores and services once and
//! maps them onto JSON routes. Caller identity comes from the upstream
//! auth layer as `x-user-id` / `x-user-role` headers.

mod handlers;
mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cashure_core::{
    AnalyticsAggregator, Clock, MembershipService, MemoryDirectory, Notifier, OrderService,
    PayoutEngine, PlatformConfig, Stores, SubscriptionManager, SystemClock, UserDirectory,
};
use cashure_payments::{
    BrevoNotifier, CashfreeClient, CheckoutService, EmailConfig, GatewayConfig, PaymentGateway,
    WebhookHandler,
};

use crate::handlers::{
    admin_list_payouts, admin_update_payout, analytics_dashboard, analytics_trends,
    create_checkout, health_check, list_orders, list_payouts, payment_webhook, payout_balance,
    product_analytics, renew_subscription, request_payout, subscription_analytics,
    subscription_status, verify_payment,
};
use crate::state::AppState;

/// Wire services over the given stores and integrations
pub(crate) fn build_state(
    stores: Stores,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: PlatformConfig,
    gateway: Option<(Arc<dyn PaymentGateway>, GatewayConfig)>,
) -> AppState {
    let memberships = Arc::new(MembershipService::new(
        stores.products.clone(),
        stores.memberships.clone(),
        clock.clone(),
    ));
    let orders = Arc::new(OrderService::new(
        stores.clone(),
        memberships.clone(),
        notifier.clone(),
        clock.clone(),
        config.clone(),
    ));
    let payouts = Arc::new(PayoutEngine::new(
        stores.orders.clone(),
        stores.payouts.clone(),
        notifier.clone(),
        clock.clone(),
        config,
    ));
    let subscriptions = Arc::new(SubscriptionManager::new(
        memberships.clone(),
        stores.clone(),
        notifier,
        clock.clone(),
    ));
    let analytics = Arc::new(AnalyticsAggregator::new(stores.clone(), clock.clone()));

    let (checkout, webhook) = match gateway {
        Some((gateway, gateway_config)) => {
            let webhook = WebhookHandler::new(
                orders.clone(),
                gateway_config.webhook_secret.clone(),
                gateway_config.webhook_tolerance,
                clock,
            );
            let checkout = CheckoutService::new(
                orders.clone(),
                stores.products.clone(),
                gateway,
                gateway_config,
            );
            (Some(Arc::new(checkout)), Some(Arc::new(webhook)))
        }
        None => (None, None),
    };

    AppState {
        orders,
        memberships,
        payouts,
        subscriptions,
        analytics,
        checkout,
        webhook,
    }
}

pub(crate) fn build_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(health_check))
        // Payments
        .route("/api/checkout", post(create_checkout))
        .route("/api/payments/webhook", post(payment_webhook))
        .route("/api/payments/verify/{order_id}", post(verify_payment))
        // Creator
        .route("/api/orders", get(list_orders))
        .route("/api/payouts", get(list_payouts).post(request_payout))
        .route("/api/payouts/balance", get(payout_balance))
        // Admin
        .route("/api/admin/payouts", get(admin_list_payouts))
        .route("/api/admin/payouts/{id}", put(admin_update_payout))
        // Subscriptions
        .route("/api/subscriptions/status/{creator_id}", get(subscription_status))
        .route("/api/subscriptions/renew/{membership_id}", post(renew_subscription))
        .route("/api/subscriptions/analytics", get(subscription_analytics))
        // Analytics
        .route("/api/analytics/dashboard", get(analytics_dashboard))
        .route("/api/analytics/trends", get(analytics_trends))
        .route("/api/analytics/products/{id}", get(product_analytics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn open_stores() -> anyhow::Result<Stores> {
    match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10);
            let pool = cashure_core::store::postgres::connect(&url, max_connections).await?;
            tracing::info!("✓ Connected to Postgres");
            Ok(cashure_core::store::postgres::PgStore::new(pool).into_stores())
        }
        Err(_) => {
            tracing::warn!("⚠ DATABASE_URL not set - using in-memory stores");
            Ok(Stores::in_memory())
        }
    }
}

/// Contact lookup for creator and subscriber mail
fn open_directory() -> anyhow::Result<Arc<dyn UserDirectory>> {
    match std::env::var("USER_DIRECTORY_PATH") {
        Ok(path) => {
            let json = std::fs::read_to_string(&path)?;
            let directory = MemoryDirectory::from_json(&json)?;
            tracing::info!(path = %path, "✓ User directory loaded");
            Ok(Arc::new(directory))
        }
        Err(_) => {
            tracing::warn!("⚠ USER_DIRECTORY_PATH not set - creator and subscriber mail is skipped");
            Ok(Arc::new(MemoryDirectory::new()))
        }
    }
}

fn open_notifier(directory: Arc<dyn UserDirectory>) -> Arc<dyn Notifier> {
    let notifier =
        EmailConfig::from_env().and_then(|config| BrevoNotifier::new(config, directory));

    match notifier {
        Ok(notifier) => {
            tracing::info!("✓ Email configured");
            Arc::new(notifier)
        }
        Err(e) => {
            tracing::warn!("⚠ Email not configured ({e}) - notifications are logged only");
            Arc::new(cashure_core::LogNotifier)
        }
    }
}

fn open_gateway() -> Option<(Arc<dyn PaymentGateway>, GatewayConfig)> {
    let opened = GatewayConfig::from_env().and_then(|config| {
        let client = CashfreeClient::new(config.clone())?;
        Ok((Arc::new(client) as Arc<dyn PaymentGateway>, config))
    });

    match opened {
        Ok(gateway) => {
            tracing::info!("✓ Payment gateway configured");
            Some(gateway)
        }
        Err(e) => {
            tracing::warn!("⚠ Payment gateway not configured ({e}) - payments disabled");
            tracing::warn!("  Set CASHFREE_APP_ID, CASHFREE_SECRET_KEY and PAYMENT_WEBHOOK_SECRET in .env");
            None
        }
    }
}

const MAX_REMINDER_INTERVAL_HOURS: u64 = 24 * 365;

/// Reminder period: 24 hours when unset or invalid, clamped to one hour..one year
fn reminder_interval(hours: Option<&str>) -> Duration {
    let hours = hours
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(24)
        .clamp(1, MAX_REMINDER_INTERVAL_HOURS);
    Duration::from_secs(hours.saturating_mul(3600))
}

/// Periodically remind subscribers whose membership is about to lapse
fn spawn_expiry_reminders(subscriptions: Arc<SubscriptionManager>, within_days: u32) {
    let period = reminder_interval(std::env::var("EXPIRY_REMINDER_INTERVAL_HOURS").ok().as_deref());

    tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        loop {
            tick.tick().await;
            match subscriptions.notify_expiring(within_days).await {
                Ok(sent) => tracing::info!(sent, "Expiry reminders dispatched"),
                Err(e) => tracing::error!(error = %e, "Expiry reminder run failed"),
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = PlatformConfig::from_env();
    tracing::info!(
        fee_percentage = %config.fee_percentage,
        min_payout_amount = %config.min_payout_amount,
        "Platform configuration loaded"
    );

    let stores = open_stores().await?;
    let state = build_state(
        stores,
        open_notifier(open_directory()?),
        Arc::new(SystemClock),
        config.clone(),
        open_gateway(),
    );

    spawn_expiry_reminders(state.subscriptions.clone(), config.expiry_reminder_days);

    let app = build_router(state);

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 Cashure server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");

    axum::serve(listener, app).await?;

    Ok(())
}
