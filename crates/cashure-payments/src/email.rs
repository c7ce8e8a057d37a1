//! Transactional Email
//!
//! [`BrevoNotifier`] turns settlement notifications into Brevo template
//! sends. Recipients that cannot be resolved are skipped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cashure_core::{Contact, Notification, Notifier, SettlementError, UserDirectory, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::error::{PaymentError, Result};

const DEFAULT_API_URL: &str = "https://api.brevo.com/v3/smtp/email";
const PLATFORM_NAME: &str = "Cashure";

/// Brevo template ids per message kind
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmailTemplates {
    pub purchase_confirmation: i64,
    pub payment_notification: i64,
    pub status_update: i64,
    pub expiry_reminder: i64,
}

impl Default for EmailTemplates {
    fn default() -> Self {
        Self {
            purchase_confirmation: 1,
            payment_notification: 2,
            status_update: 4,
            expiry_reminder: 7,
        }
    }
}

/// Email provider configuration
#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub api_key: String,
    pub api_url: String,
    pub sender_email: String,
    pub sender_name: String,
    pub templates: EmailTemplates,
    pub timeout: Duration,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: DEFAULT_API_URL.into(),
            sender_email: "noreply@cashure.in".into(),
            sender_name: PLATFORM_NAME.into(),
            templates: EmailTemplates::default(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl EmailConfig {
    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("BREVO_API_KEY")
            .map_err(|_| PaymentError::Config("BREVO_API_KEY not set".into()))?;
        let defaults = Self::default();

        let mut templates = defaults.templates;
        if let Some(id) = std::env::var("EMAIL_TEMPLATE_EXPIRY_REMINDER")
            .ok()
            .and_then(|v| v.trim().parse().ok())
        {
            templates.expiry_reminder = id;
        }

        Ok(Self {
            api_key,
            api_url: std::env::var("BREVO_API_URL").unwrap_or(defaults.api_url),
            sender_email: std::env::var("EMAIL_SENDER").unwrap_or(defaults.sender_email),
            sender_name: std::env::var("EMAIL_SENDER_NAME").unwrap_or(defaults.sender_name),
            templates,
            timeout: defaults.timeout,
        })
    }
}

/// One template send
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub template_id: i64,
    pub to: Contact,
    pub params: serde_json::Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendBody<'a> {
    sender: Address<'a>,
    to: [Address<'a>; 1],
    template_id: i64,
    params: &'a serde_json::Value,
}

#[derive(Serialize)]
struct Address<'a> {
    email: &'a str,
    name: &'a str,
}

fn display_date(at: DateTime<Utc>) -> String {
    at.format("%d/%m/%Y").to_string()
}

/// Notifier backed by the Brevo transactional email API
pub struct BrevoNotifier {
    http: reqwest::Client,
    config: EmailConfig,
    directory: Arc<dyn UserDirectory>,
}

impl BrevoNotifier {
    pub fn new(config: EmailConfig, directory: Arc<dyn UserDirectory>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PaymentError::Config(format!("email client: {e}")))?;
        Ok(Self {
            http,
            config,
            directory,
        })
    }

    async fn contact(&self, user_id: UserId) -> Result<Option<Contact>> {
        let contact = self.directory.contact(user_id).await?;
        if contact.is_none() {
            tracing::debug!(user_id = %user_id, "No contact on file; skipping email");
        }
        Ok(contact)
    }

    /// Messages a notification expands to
    pub async fn compose(&self, notification: &Notification) -> Result<Vec<EmailMessage>> {
        let templates = self.config.templates;
        let mut messages = Vec::new();

        match notification {
            Notification::OrderCompleted { order, product } => {
                let completed = order.completed_at.unwrap_or(order.created_at);
                let product_name = product.as_ref().map_or("Donation", |p| p.title.as_str());
                let customer = Contact {
                    name: order
                        .customer_name
                        .clone()
                        .unwrap_or_else(|| "Customer".into()),
                    email: order.customer_email.clone(),
                };
                let creator = self.contact(order.creator_id).await?;
                let creator_name = creator.as_ref().map_or("", |c| c.name.as_str());

                messages.push(EmailMessage {
                    template_id: templates.purchase_confirmation,
                    params: json!({
                        "customer_name": customer.name,
                        "creator_name": creator_name,
                        "product_name": product_name,
                        "amount": order.amount.to_string(),
                        "order_id": order.id.to_string(),
                        "purchase_date": display_date(completed),
                        "platform_name": PLATFORM_NAME,
                    }),
                    to: customer,
                });

                if let Some(creator) = creator {
                    messages.push(EmailMessage {
                        template_id: templates.payment_notification,
                        params: json!({
                            "creator_name": creator.name,
                            "customer_name": order.customer_name,
                            "customer_email": order.customer_email,
                            "product_name": product_name,
                            "amount": order.amount.to_string(),
                            "creator_earnings": order.creator_earnings.to_string(),
                            "order_id": order.id.to_string(),
                            "purchase_date": display_date(completed),
                            "platform_name": PLATFORM_NAME,
                        }),
                        to: creator,
                    });
                }
            }
            Notification::MembershipRenewed {
                membership,
                product,
            } => {
                if let Some(subscriber) = self.contact(membership.user_id).await? {
                    messages.push(EmailMessage {
                        template_id: templates.status_update,
                        params: json!({
                            "customer_name": subscriber.name,
                            "order_id": membership.order_id.to_string(),
                            "order_status": "renewed",
                            "product_name": product.title,
                            "amount": product.price.to_string(),
                            "expires_at": display_date(membership.expires_at),
                            "platform_name": PLATFORM_NAME,
                        }),
                        to: subscriber,
                    });
                }
            }
            Notification::MembershipExpiring {
                membership,
                days_remaining,
            } => {
                if let Some(subscriber) = self.contact(membership.user_id).await? {
                    messages.push(EmailMessage {
                        template_id: templates.expiry_reminder,
                        params: json!({
                            "customer_name": subscriber.name,
                            "days_remaining": days_remaining,
                            "expires_at": display_date(membership.expires_at),
                            "platform_name": PLATFORM_NAME,
                        }),
                        to: subscriber,
                    });
                }
            }
            Notification::PayoutStatusChanged { payout } => {
                if let Some(creator) = self.contact(payout.creator_id).await? {
                    messages.push(EmailMessage {
                        template_id: templates.status_update,
                        params: json!({
                            "customer_name": creator.name,
                            "order_id": payout.id.to_string(),
                            "order_status": payout.status.to_string(),
                            "amount": payout.amount.to_string(),
                            "admin_notes": payout.admin_notes,
                            "platform_name": PLATFORM_NAME,
                        }),
                        to: creator,
                    });
                }
            }
        }
        Ok(messages)
    }

    /// Send a single template email
    pub async fn send(&self, message: &EmailMessage) -> Result<()> {
        let body = SendBody {
            sender: Address {
                email: &self.config.sender_email,
                name: &self.config.sender_name,
            },
            to: [Address {
                email: &message.to.email,
                name: &message.to.name,
            }],
            template_id: message.template_id,
            params: &message.params,
        };

        let response = self
            .http
            .post(&self.config.api_url)
            .header("api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PaymentError::Email(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PaymentError::Email(format!("{status}: {text}")));
        }

        tracing::info!(
            template_id = message.template_id,
            to = %message.to.email,
            "Email sent"
        );
        Ok(())
    }
}

#[async_trait]
impl Notifier for BrevoNotifier {
    async fn notify(&self, notification: &Notification) -> cashure_core::Result<()> {
        let messages = self
            .compose(notification)
            .await
            .map_err(|e| SettlementError::Delivery(e.to_string()))?;

        let mut failures = 0;
        for message in &messages {
            if let Err(e) = self.send(message).await {
                failures += 1;
                tracing::warn!(
                    kind = notification.kind(),
                    template_id = message.template_id,
                    error = %e,
                    "Email delivery failed"
                );
            }
        }

        if failures > 0 {
            return Err(SettlementError::Delivery(format!(
                "{failures} of {} emails failed",
                messages.len()
            )));
        }
        Ok(())
    }
}
