//! Settlement Services
//!
//! Plain constructed components wired at the composition root. Each holds
//! `Arc` handles to the stores it reads and writes.

mod analytics;
mod memberships;
mod orders;
mod payouts;
mod subscriptions;

pub use analytics::{
    ActivityEntry, AnalyticsAggregator, CreatorAnalytics, CreatorStats, CustomerSummary,
    DEFAULT_TOP_PRODUCTS, DEFAULT_TREND_MONTHS, MonthlyTrend, PeriodSummary, ProductAnalytics,
    ProductSales, ProductSummary, TopProduct,
};
pub use memberships::MembershipService;
pub use orders::OrderService;
pub use payouts::{EarningsSummary, PayoutEngine};
pub use subscriptions::{
    ExpiringMembership, MembershipAnalytics, SubscriptionManager, SubscriptionStatus,
    SubscriptionTier,
};

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per key, created on demand
pub(crate) struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Copy + Eq + Hash> KeyedLocks<K> {
    /// Wait for exclusive access to `key`
    pub(crate) async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop idle entries nobody is holding or waiting on
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks.entry(key).or_default().clone()
        };
        lock.lock_owned().await
    }
}
