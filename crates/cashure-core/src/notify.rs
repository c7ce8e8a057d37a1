//! Notification Port
//!
//! Outbound messages triggered by settlement events. Delivery is best effort:
//! a failed notification is logged and never undoes the state change that
//! caused it.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SettlementError};
use crate::model::{Membership, Order, Payout, Product, UserId};

/// Something worth telling a customer or creator about
#[derive(Clone, Debug)]
pub enum Notification {
    /// Order paid; customer gets a receipt, creator gets a sale notice
    OrderCompleted {
        order: Order,
        product: Option<Product>,
    },

    /// Membership extended by one period
    MembershipRenewed {
        membership: Membership,
        product: Product,
    },

    /// Membership ends within the reminder window
    MembershipExpiring {
        membership: Membership,
        days_remaining: i64,
    },

    /// Admin moved a payout to a new status
    PayoutStatusChanged { payout: Payout },
}

impl Notification {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::OrderCompleted { .. } => "order_completed",
            Self::MembershipRenewed { .. } => "membership_renewed",
            Self::MembershipExpiring { .. } => "membership_expiring",
            Self::PayoutStatusChanged { .. } => "payout_status_changed",
        }
    }
}

/// Delivery channel for notifications
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Deliver and swallow failures
pub async fn dispatch(notifier: &dyn Notifier, notification: Notification) {
    if let Err(e) = notifier.notify(&notification).await {
        tracing::warn!(
            kind = notification.kind(),
            error = %e,
            "Notification delivery failed"
        );
    }
}

/// Notifier that only writes to the log
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        match notification {
            Notification::OrderCompleted { order, .. } => tracing::info!(
                order_id = %order.id,
                creator_id = %order.creator_id,
                amount = %order.amount,
                "Order completed"
            ),
            Notification::MembershipRenewed { membership, .. } => tracing::info!(
                membership_id = %membership.id,
                expires_at = %membership.expires_at,
                "Membership renewed"
            ),
            Notification::MembershipExpiring {
                membership,
                days_remaining,
            } => tracing::info!(
                membership_id = %membership.id,
                days_remaining,
                "Membership expiring soon"
            ),
            Notification::PayoutStatusChanged { payout } => tracing::info!(
                payout_id = %payout.id,
                status = %payout.status,
                "Payout status changed"
            ),
        }
        Ok(())
    }
}

/// Name and address of an account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub email: String,
}

/// Account lookup owned by the user-management collaborator
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn contact(&self, user_id: UserId) -> Result<Option<Contact>>;
}

/// In-memory directory (for development)
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    contacts: RwLock<HashMap<UserId, Contact>>,
}

/// One account in a directory export
#[derive(Debug, Deserialize)]
struct DirectoryEntry {
    user_id: UserId,
    name: String,
    email: String,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON array of `{"user_id", "name", "email"}` records
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<DirectoryEntry> = serde_json::from_str(json)
            .map_err(|e| SettlementError::InvalidInput(format!("bad user directory: {e}")))?;
        let directory = Self::new();
        for entry in entries {
            directory.insert(
                entry.user_id,
                Contact {
                    name: entry.name,
                    email: entry.email,
                },
            );
        }
        Ok(directory)
    }

    pub fn insert(&self, user_id: UserId, contact: Contact) {
        self.contacts
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(user_id, contact);
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn contact(&self, user_id: UserId) -> Result<Option<Contact>> {
        let contacts = self
            .contacts
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(contacts.get(&user_id).cloned())
    }
}
