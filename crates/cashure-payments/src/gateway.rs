//! Payment Gateway
//!
//! The core only needs three things from the processor: open a payment
//! session for an order, report a payment's status, and the reference id it
//! assigned. [`CashfreeClient`] speaks Cashfree's PG API over reqwest.

use std::time::Duration;

use async_trait::async_trait;
use cashure_core::OrderId;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};

const DEFAULT_BASE_URL: &str = "https://api.cashfree.com";
const DEFAULT_API_VERSION: &str = "2023-08-01";
const REF_PREFIX: &str = "order_";

/// Gateway-side reference for an order
pub fn order_ref(id: OrderId) -> String {
    format!("{REF_PREFIX}{id}")
}

/// Inverse of [`order_ref`]; bare ids are accepted too
pub fn parse_order_ref(reference: &str) -> Result<OrderId> {
    let raw = reference.trim();
    raw.strip_prefix(REF_PREFIX)
        .unwrap_or(raw)
        .parse()
        .map_err(|_| PaymentError::WebhookParse(format!("unrecognised order reference '{reference}'")))
}

/// Gateway configuration
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub app_id: String,
    pub secret_key: String,
    pub base_url: String,
    pub api_version: String,
    /// Upper bound on any single gateway call
    pub timeout: Duration,
    /// Shared secret for webhook signatures
    pub webhook_secret: String,
    /// Maximum age of a signed webhook
    pub webhook_tolerance: Duration,
    /// Public origin used to build return and notify URLs
    pub public_base_url: String,
}

impl GatewayConfig {
    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let app_id = std::env::var("CASHFREE_APP_ID")
            .map_err(|_| PaymentError::Config("CASHFREE_APP_ID not set".into()))?;
        let secret_key = std::env::var("CASHFREE_SECRET_KEY")
            .map_err(|_| PaymentError::Config("CASHFREE_SECRET_KEY not set".into()))?;
        let webhook_secret = std::env::var("PAYMENT_WEBHOOK_SECRET")
            .map_err(|_| PaymentError::Config("PAYMENT_WEBHOOK_SECRET not set".into()))?;

        let secs = |key: &str, default: u64| {
            std::env::var(key)
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };

        Ok(Self {
            app_id,
            secret_key,
            base_url: std::env::var("CASHFREE_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into()),
            api_version: std::env::var("CASHFREE_API_VERSION")
                .unwrap_or_else(|_| DEFAULT_API_VERSION.into()),
            timeout: Duration::from_secs(secs("PAYMENT_TIMEOUT_SECS", 15)),
            webhook_secret,
            webhook_tolerance: Duration::from_secs(secs("PAYMENT_WEBHOOK_TOLERANCE_SECS", 300)),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
        })
    }

    pub fn return_url(&self, id: OrderId) -> String {
        format!(
            "{}/payment/success?order_id={}",
            self.public_base_url.trim_end_matches('/'),
            order_ref(id)
        )
    }

    pub fn notify_url(&self) -> String {
        format!(
            "{}/api/payments/webhook",
            self.public_base_url.trim_end_matches('/')
        )
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            secret_key: String::new(),
            base_url: DEFAULT_BASE_URL.into(),
            api_version: DEFAULT_API_VERSION.into(),
            timeout: Duration::from_secs(15),
            webhook_secret: String::new(),
            webhook_tolerance: Duration::from_secs(300),
            public_base_url: "http://localhost:3000".into(),
        }
    }
}

/// Request to open a payment session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub order_id: OrderId,
    pub amount: Decimal,
    pub customer_email: String,
    pub customer_name: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    pub return_url: String,
    pub notify_url: String,
    pub product_name: String,
}

/// Hosted payment session the customer is redirected to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSession {
    pub order_ref: String,
    pub session_id: String,
    pub payment_url: String,
}

/// A payment as the gateway reports it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayPayment {
    /// Raw gateway status, e.g. `SUCCESS`, `FAILED`, `PENDING`
    pub status: String,
    pub payment_id: Option<String>,
    pub amount: Option<Decimal>,
}

/// Normalised gateway payment status
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaymentOutcome {
    Success,
    Failure,
    /// Not settled yet; leave the order alone
    Pending,
}

impl PaymentOutcome {
    pub fn from_status(status: &str) -> Self {
        match status.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" | "PAID" => Self::Success,
            "PENDING" | "NOT_ATTEMPTED" | "ACTIVE" => Self::Pending,
            _ => Self::Failure,
        }
    }
}

/// External payment processor
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(&self, request: &PaymentRequest) -> Result<PaymentSession>;

    /// Latest payment attempt for an order reference, if any
    async fn fetch_payment(&self, order_ref: &str) -> Result<Option<GatewayPayment>>;
}

#[derive(Serialize)]
struct CreateOrderBody<'a> {
    order_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    order_amount: Decimal,
    order_currency: &'static str,
    customer_details: CustomerDetails<'a>,
    order_meta: OrderMeta<'a>,
    order_note: String,
}

#[derive(Serialize)]
struct CustomerDetails<'a> {
    customer_id: &'a str,
    customer_email: &'a str,
    customer_name: &'a str,
    customer_phone: &'a str,
}

#[derive(Serialize)]
struct OrderMeta<'a> {
    return_url: &'a str,
    notify_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    order_id: Option<String>,
    payment_session_id: Option<String>,
    payment_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    cf_payment_id: Option<serde_json::Value>,
    payment_status: String,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    payment_amount: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    message: Option<String>,
    error_description: Option<String>,
}

/// Cashfree PG client built on reqwest
pub struct CashfreeClient {
    http: reqwest::Client,
    config: GatewayConfig,
}

impl CashfreeClient {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(GatewayConfig::from_env()?)
    }

    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("x-client-id", &self.config.app_id)
            .header("x-client-secret", &self.config.secret_key)
            .header("x-api-version", &self.config.api_version)
    }

    async fn error_from(response: reqwest::Response) -> PaymentError {
        let status = response.status();
        let detail = response
            .json::<ErrorEnvelope>()
            .await
            .ok()
            .and_then(|e| e.message.or(e.error_description))
            .unwrap_or_else(|| "no error detail".into());
        tracing::error!(%status, detail = %detail, "Cashfree API error");
        PaymentError::Gateway(format!("HTTP {status}: {detail}"))
    }
}

#[async_trait]
impl PaymentGateway for CashfreeClient {
    async fn create_session(&self, request: &PaymentRequest) -> Result<PaymentSession> {
        let reference = order_ref(request.order_id);
        let body = CreateOrderBody {
            order_id: reference.clone(),
            order_amount: request.amount,
            order_currency: "INR",
            customer_details: CustomerDetails {
                customer_id: &request.customer_email,
                customer_email: &request.customer_email,
                customer_name: &request.customer_name,
                customer_phone: request.customer_phone.as_deref().unwrap_or("9999999999"),
            },
            order_meta: OrderMeta {
                return_url: &request.return_url,
                notify_url: &request.notify_url,
            },
            order_note: format!("Payment for {}", request.product_name),
        };

        let response = self
            .authed(self.http.post(format!("{}/pg/orders", self.config.base_url)))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let created: CreateOrderResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::Gateway(format!("invalid response from payment gateway: {e}")))?;
        let session_id = created
            .payment_session_id
            .ok_or_else(|| PaymentError::Gateway("no payment session returned".into()))?;

        tracing::info!(order_ref = %reference, "Created payment session");

        Ok(PaymentSession {
            order_ref: created.order_id.unwrap_or(reference),
            payment_url: created.payment_link.unwrap_or_else(|| {
                format!("{}/pg/view/order/{session_id}", self.config.base_url)
            }),
            session_id,
        })
    }

    async fn fetch_payment(&self, order_ref: &str) -> Result<Option<GatewayPayment>> {
        let response = self
            .authed(
                self.http
                    .get(format!("{}/pg/orders/{order_ref}/payments", self.config.base_url)),
            )
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let payments: Vec<PaymentEntity> = response
            .json()
            .await
            .map_err(|e| PaymentError::Gateway(format!("invalid payments response: {e}")))?;

        Ok(payments.into_iter().next().map(|p| GatewayPayment {
            status: p.payment_status,
            payment_id: p.cf_payment_id.map(|id| match id {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            }),
            amount: p.payment_amount,
        }))
    }
}
