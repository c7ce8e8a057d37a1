//! Subscription Manager
//!
//! Status checks, renewals and expiry reminders layered over
//! [`MembershipService`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::MembershipService;
use crate::clock::Clock;
use crate::error::Result;
use crate::ledger::round2;
use crate::model::{Membership, MembershipId, Product, ProductId, ProductType, UserId};
use crate::notify::{self, Notification, Notifier};
use crate::store::Stores;

const DAY_MS: i64 = 86_400_000;

/// Whole days left, rounded up
fn days_remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let ms = (expires_at - now).num_milliseconds();
    (ms + DAY_MS - 1).div_euclid(DAY_MS)
}

/// Membership product as shown to a subscriber
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionTier {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub duration_days: u32,
    pub is_active: bool,
}

impl From<&Product> for SubscriptionTier {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id,
            name: product.title.clone(),
            price: product.price,
            duration_days: product.membership_duration_days.unwrap_or_default(),
            is_active: product.is_active,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionStatus {
    pub is_active: bool,
    pub tier: Option<SubscriptionTier>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Set only while active
    pub days_remaining: Option<i64>,
    pub auto_renew: bool,
}

impl SubscriptionStatus {
    const fn inactive() -> Self {
        Self {
            is_active: false,
            tier: None,
            expires_at: None,
            days_remaining: None,
            auto_renew: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiringMembership {
    pub membership: Membership,
    pub days_remaining: i64,
}

/// Membership health for a creator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipAnalytics {
    pub total: usize,
    pub active: usize,
    pub expired: usize,
    pub expiring_this_week: usize,
    /// Active members times the average membership price
    pub mrr: Decimal,
    pub avg_membership_price: Decimal,
    pub retention_rate: Decimal,
}

pub struct SubscriptionManager {
    memberships: Arc<MembershipService>,
    stores: Stores,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl SubscriptionManager {
    pub fn new(
        memberships: Arc<MembershipService>,
        stores: Stores,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            memberships,
            stores,
            notifier,
            clock,
        }
    }

    /// Whether `user_id` currently holds a membership with `creator_id`
    pub async fn check_status(&self, user_id: UserId, creator_id: UserId) -> Result<SubscriptionStatus> {
        let now = self.clock.now();
        let current = self
            .memberships
            .active_for_user(user_id)
            .await?
            .into_iter()
            .find(|m| m.creator_id == creator_id);

        let Some(membership) = current else {
            return Ok(SubscriptionStatus::inactive());
        };

        let tier = self
            .stores
            .products
            .get(membership.product_id)
            .await?
            .as_ref()
            .map(SubscriptionTier::from);

        Ok(SubscriptionStatus {
            is_active: true,
            tier,
            expires_at: Some(membership.expires_at),
            days_remaining: Some(days_remaining(membership.expires_at, now)),
            auto_renew: false,
        })
    }

    /// Extend a membership by one period and tell the subscriber
    pub async fn renew(&self, id: MembershipId) -> Result<bool> {
        let Some((membership, product)) = self.memberships.renew_inner(id).await? else {
            return Ok(false);
        };

        notify::dispatch(
            self.notifier.as_ref(),
            Notification::MembershipRenewed {
                membership,
                product,
            },
        )
        .await;
        Ok(true)
    }

    /// Entitled memberships ending within `within_days`, soonest first
    pub async fn find_expiring_soon(&self, within_days: u32) -> Result<Vec<ExpiringMembership>> {
        let now = self.clock.now();
        let horizon = now + Duration::days(i64::from(within_days));

        let mut expiring: Vec<_> = self
            .stores
            .memberships
            .list_flagged_active()
            .await?
            .into_iter()
            .filter(|m| m.is_entitled_at(now) && m.expires_at <= horizon)
            .map(|membership| ExpiringMembership {
                days_remaining: days_remaining(membership.expires_at, now),
                membership,
            })
            .collect();
        expiring.sort_by_key(|e| e.membership.expires_at);
        Ok(expiring)
    }

    /// Send a reminder for every membership in the window; returns how many
    pub async fn notify_expiring(&self, within_days: u32) -> Result<usize> {
        let expiring = self.find_expiring_soon(within_days).await?;
        let count = expiring.len();

        for entry in expiring {
            notify::dispatch(
                self.notifier.as_ref(),
                Notification::MembershipExpiring {
                    membership: entry.membership,
                    days_remaining: entry.days_remaining,
                },
            )
            .await;
        }

        tracing::info!(within_days, count, "Sent membership expiry reminders");
        Ok(count)
    }

    pub async fn membership_analytics(&self, creator_id: UserId) -> Result<MembershipAnalytics> {
        let now = self.clock.now();
        let week = now + Duration::days(7);
        let memberships = self.memberships.list_by_creator(creator_id).await?;
        let products = self.stores.products.list_by_creator(creator_id).await?;

        let active: Vec<&Membership> = memberships.iter().filter(|m| m.is_entitled_at(now)).collect();
        let expired = memberships.iter().filter(|m| m.expires_at <= now).count();
        let expiring_this_week = active.iter().filter(|m| m.expires_at <= week).count();

        let prices: Vec<Decimal> = products
            .iter()
            .filter(|p| p.product_type == ProductType::Membership)
            .map(|p| p.price)
            .collect();
        let avg_membership_price = if prices.is_empty() {
            Decimal::ZERO
        } else {
            round2(prices.iter().sum::<Decimal>() / Decimal::from(prices.len()))
        };
        let retention_rate = if memberships.is_empty() {
            Decimal::ZERO
        } else {
            round2(Decimal::from(active.len()) / Decimal::from(memberships.len()) * Decimal::ONE_HUNDRED)
        };

        Ok(MembershipAnalytics {
            total: memberships.len(),
            active: active.len(),
            expired,
            expiring_this_week,
            mrr: round2(Decimal::from(active.len()) * avg_membership_price),
            avg_membership_price,
            retention_rate,
        })
    }
}
