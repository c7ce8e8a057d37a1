//! HTTP Handlers

use axum::{
    Json,
    body::Bytes,
    extract::{FromRequestParts, Path, Query, State},
    http::{HeaderMap, StatusCode, request::Parts},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cashure_core::service::{
    CreatorAnalytics, DEFAULT_TREND_MONTHS, EarningsSummary, MembershipAnalytics, MonthlyTrend,
    ProductAnalytics, SubscriptionStatus,
};
use cashure_core::{
    Actor, MembershipId, Order, OrderId, PaymentDetails, Payout, PayoutId, PayoutStatus,
    ProductId, Role, SettlementError, UserId,
};
use cashure_payments::{CheckoutRequest, PaymentError};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub payments_configured: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order_id: OrderId,
    pub order_ref: String,
    pub payment_session_id: String,
    pub payment_url: String,
}

#[derive(Debug, Deserialize)]
pub struct PayoutRequestBody {
    pub amount: Decimal,
    pub payment_details: PaymentDetails,
}

#[derive(Debug, Deserialize)]
pub struct PayoutDecision {
    pub status: PayoutStatus,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RenewResponse {
    pub renewed: bool,
}

#[derive(Debug, Deserialize)]
pub struct TrendsQuery {
    #[serde(default)]
    pub months: Option<u32>,
}

// ============================================================================
// Errors
// ============================================================================

fn status_for(err: &PaymentError) -> StatusCode {
    match err {
        PaymentError::Settlement(e) => match e {
            SettlementError::NotFound { .. } => StatusCode::NOT_FOUND,
            SettlementError::InvalidTransition { .. } => StatusCode::CONFLICT,
            SettlementError::Unauthorized(_) => StatusCode::FORBIDDEN,
            SettlementError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            SettlementError::Delivery(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::BAD_REQUEST,
        },
        PaymentError::Gateway(_) | PaymentError::Email(_) => StatusCode::BAD_GATEWAY,
        PaymentError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        PaymentError::WebhookSignature(_) => StatusCode::UNAUTHORIZED,
        PaymentError::WebhookParse(_) => StatusCode::BAD_REQUEST,
        PaymentError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(err: impl Into<PaymentError>) -> ApiError {
    let err = err.into();
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!(code = err.code(), error = %err, "Request failed");
    } else {
        tracing::warn!(code = err.code(), error = %err, "Request rejected");
    }
    (
        status,
        Json(ErrorResponse {
            error: err.user_message(),
            code: err.code().into(),
        }),
    )
}

fn payments_disabled() -> ApiError {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse {
            error: "Payments not configured".into(),
            code: "PAYMENTS_DISABLED".into(),
        }),
    )
}

// ============================================================================
// Caller identity
// ============================================================================

/// Caller identity forwarded by the upstream auth layer
#[derive(Clone, Copy, Debug)]
pub struct Caller(pub Actor);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let unauthenticated = || {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Authentication required".into(),
                    code: "UNAUTHENTICATED".into(),
                }),
            )
        };

        let user_id: UserId = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or_else(unauthenticated)?;
        let role = match parts.headers.get("x-user-role").and_then(|v| v.to_str().ok()) {
            Some(raw) => raw.parse::<Role>().map_err(api_error)?,
            None => Role::Creator,
        };

        Ok(Self(Actor { user_id, role }))
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        payments_configured: state.checkout.is_some(),
    })
}

/// Create a pending order and a hosted payment session
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let checkout = state.checkout.as_ref().ok_or_else(payments_disabled)?;
    let session = checkout.submit(payload).await.map_err(api_error)?;

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            order_id: session.order.id,
            order_ref: session.order_ref,
            payment_session_id: session.session_id,
            payment_url: session.payment_url,
        }),
    ))
}

/// Signed payment confirmation from the gateway
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let webhook = state.webhook.as_ref().ok_or_else(payments_disabled)?;

    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .ok_or_else(|| {
                (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse {
                        error: format!("Missing {name} header"),
                        code: "MISSING_SIGNATURE".into(),
                    }),
                )
            })
    };
    let timestamp = header("x-webhook-timestamp")?;
    let signature = header("x-webhook-signature")?;

    webhook
        .handle(&body, &timestamp, &signature)
        .await
        .map_err(api_error)?;
    Ok(StatusCode::OK)
}

/// Poll the gateway for an order's payment status
pub async fn verify_payment(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
) -> ApiResult<Order> {
    let checkout = state.checkout.as_ref().ok_or_else(payments_disabled)?;
    checkout.verify(order_id).await.map(Json).map_err(api_error)
}

/// The caller's orders as a creator
pub async fn list_orders(
    State(state): State<AppState>,
    Caller(actor): Caller,
) -> ApiResult<Vec<Order>> {
    state
        .orders
        .list_by_creator(actor.user_id)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn list_payouts(
    State(state): State<AppState>,
    Caller(actor): Caller,
) -> ApiResult<Vec<Payout>> {
    state
        .payouts
        .list_by_creator(actor.user_id)
        .await
        .map(Json)
        .map_err(api_error)
}

/// Earnings totals and withdrawable balance
pub async fn payout_balance(
    State(state): State<AppState>,
    Caller(actor): Caller,
) -> ApiResult<EarningsSummary> {
    state
        .payouts
        .earnings_summary(actor.user_id)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn request_payout(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(payload): Json<PayoutRequestBody>,
) -> Result<(StatusCode, Json<Payout>), ApiError> {
    let payout = state
        .payouts
        .request_payout(actor.user_id, payload.amount, payload.payment_details)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(payout)))
}

/// Admin review queue
pub async fn admin_list_payouts(
    State(state): State<AppState>,
    Caller(actor): Caller,
) -> ApiResult<Vec<Payout>> {
    state
        .payouts
        .list_pending(&actor)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn admin_update_payout(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<PayoutId>,
    Json(payload): Json<PayoutDecision>,
) -> ApiResult<Payout> {
    state
        .payouts
        .admin_update_status(&actor, id, payload.status, payload.admin_notes)
        .await
        .map(Json)
        .map_err(api_error)
}

/// Whether the caller holds a membership with `creator_id`
pub async fn subscription_status(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(creator_id): Path<UserId>,
) -> ApiResult<SubscriptionStatus> {
    state
        .subscriptions
        .check_status(actor.user_id, creator_id)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn renew_subscription(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<MembershipId>,
) -> ApiResult<RenewResponse> {
    let membership = state.memberships.get(id).await.map_err(api_error)?;
    if membership.user_id != actor.user_id && !actor.is_admin() {
        return Err(api_error(SettlementError::Unauthorized(
            "membership belongs to another user".into(),
        )));
    }

    let renewed = state.subscriptions.renew(id).await.map_err(api_error)?;
    if !renewed {
        return Err(api_error(SettlementError::not_found("membership", id)));
    }
    Ok(Json(RenewResponse { renewed }))
}

pub async fn subscription_analytics(
    State(state): State<AppState>,
    Caller(actor): Caller,
) -> ApiResult<MembershipAnalytics> {
    state
        .subscriptions
        .membership_analytics(actor.user_id)
        .await
        .map(Json)
        .map_err(api_error)
}

/// Creator dashboard
pub async fn analytics_dashboard(
    State(state): State<AppState>,
    Caller(actor): Caller,
) -> ApiResult<CreatorAnalytics> {
    state
        .analytics
        .creator_analytics(actor.user_id)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn analytics_trends(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Query(query): Query<TrendsQuery>,
) -> ApiResult<Vec<MonthlyTrend>> {
    let months = query.months.unwrap_or(DEFAULT_TREND_MONTHS);
    state
        .analytics
        .monthly_trends(actor.user_id, months)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn product_analytics(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(product_id): Path<ProductId>,
) -> ApiResult<ProductAnalytics> {
    let analytics = state
        .analytics
        .product_analytics(product_id)
        .await
        .map_err(api_error)?;

    // Another creator's product is reported as missing
    if analytics.product.creator_id != actor.user_id && !actor.is_admin() {
        return Err(api_error(SettlementError::not_found("product", product_id)));
    }
    Ok(Json(analytics))
}
