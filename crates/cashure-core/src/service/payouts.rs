//! Payout Engine
//!
//! Reconciles payout requests against a creator's available balance:
//!
//! ```text
//! available = Σ creator_earnings (completed orders)
//!           − Σ amount (pending | completed [| processing] payouts)
//! ```
//!
//! Balance read and payout insert run under a per-creator lock so two
//! concurrent requests cannot both spend the same balance.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::KeyedLocks;
use super::analytics::month_start;
use crate::clock::Clock;
use crate::config::PlatformConfig;
use crate::error::{Result, SettlementError};
use crate::ledger;
use crate::model::{
    Actor, PaymentDetails, Payout, PayoutDestination, PayoutId, PayoutStatus, UserId,
};
use crate::notify::{self, Notification, Notifier};
use crate::store::{OrderStore, PayoutStore};

/// Earnings overview for a creator's payout page
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningsSummary {
    /// Lifetime earnings from completed orders
    pub total: Decimal,
    /// Earnings from completed orders created this calendar month
    pub this_month: Decimal,
    pub available_balance: Decimal,
    /// Sum of payouts still awaiting an admin decision
    pub pending_payouts: Decimal,
    pub paid_out: Decimal,
}

pub struct PayoutEngine {
    orders: Arc<dyn OrderStore>,
    payouts: Arc<dyn PayoutStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: PlatformConfig,
    locks: KeyedLocks<UserId>,
}

impl PayoutEngine {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        payouts: Arc<dyn PayoutStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: PlatformConfig,
    ) -> Self {
        Self {
            orders,
            payouts,
            notifier,
            clock,
            config,
            locks: KeyedLocks::default(),
        }
    }

    /// Statuses whose amounts are already committed against the balance
    fn deducts(&self, status: PayoutStatus) -> bool {
        match status {
            PayoutStatus::Pending | PayoutStatus::Completed => true,
            PayoutStatus::Processing => self.config.deduct_processing_payouts,
            PayoutStatus::Rejected => false,
        }
    }

    async fn completed_earnings(&self, creator_id: UserId) -> Result<Decimal> {
        Ok(self
            .orders
            .list_by_creator(creator_id)
            .await?
            .iter()
            .filter(|o| o.is_completed())
            .map(|o| o.creator_earnings)
            .sum())
    }

    pub async fn available_balance(&self, creator_id: UserId) -> Result<Decimal> {
        let earned = self.completed_earnings(creator_id).await?;
        let committed: Decimal = self
            .payouts
            .list_by_creator(creator_id)
            .await?
            .iter()
            .filter(|p| self.deducts(p.status))
            .map(|p| p.amount)
            .sum();

        Ok(earned - committed)
    }

    /// Create a pending payout if the creator can cover it
    pub async fn request_payout(
        &self,
        creator_id: UserId,
        amount: Decimal,
        details: PaymentDetails,
    ) -> Result<Payout> {
        ledger::validate_amount(amount)?;
        let destination = PayoutDestination::try_from(details)?;

        let _guard = self.locks.lock(creator_id).await;

        let available = self.available_balance(creator_id).await?;
        if amount > available {
            tracing::warn!(
                creator_id = %creator_id,
                requested = %amount,
                available = %available,
                "Payout exceeds available balance"
            );
            return Err(SettlementError::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        if amount < self.config.min_payout_amount {
            return Err(SettlementError::BelowMinimum {
                amount,
                minimum: self.config.min_payout_amount,
            });
        }

        let payout = Payout::request(creator_id, amount, destination, self.clock.now());
        self.payouts.insert(&payout).await?;

        tracing::info!(
            payout_id = %payout.id,
            creator_id = %creator_id,
            amount = %amount,
            "Payout requested"
        );
        Ok(payout)
    }

    /// Admin decision on a payout
    pub async fn admin_update_status(
        &self,
        actor: &Actor,
        id: PayoutId,
        status: PayoutStatus,
        notes: Option<String>,
    ) -> Result<Payout> {
        Self::require_admin(actor)?;

        let mut payout = self
            .payouts
            .get(id)
            .await?
            .ok_or_else(|| SettlementError::not_found("payout", id))?;

        // Same lock as request_payout
        let _guard = self.locks.lock(payout.creator_id).await;
        if let Some(latest) = self.payouts.get(id).await? {
            payout = latest;
        }

        let from = payout.status;
        payout.transition(status, notes, self.clock.now())?;
        self.payouts.save(&payout).await?;

        tracing::info!(
            payout_id = %id,
            creator_id = %payout.creator_id,
            admin_id = %actor.user_id,
            from = %from,
            to = %status,
            "Payout status changed"
        );

        notify::dispatch(
            self.notifier.as_ref(),
            Notification::PayoutStatusChanged {
                payout: payout.clone(),
            },
        )
        .await;
        Ok(payout)
    }

    pub async fn list_by_creator(&self, creator_id: UserId) -> Result<Vec<Payout>> {
        let mut payouts = self.payouts.list_by_creator(creator_id).await?;
        payouts.reverse();
        Ok(payouts)
    }

    /// Admin review queue, oldest first
    pub async fn list_pending(&self, actor: &Actor) -> Result<Vec<Payout>> {
        Self::require_admin(actor)?;
        self.payouts.list_by_status(PayoutStatus::Pending).await
    }

    pub async fn earnings_summary(&self, creator_id: UserId) -> Result<EarningsSummary> {
        let since = month_start(self.clock.now(), 0);
        let completed: Vec<_> = self
            .orders
            .list_by_creator(creator_id)
            .await?
            .into_iter()
            .filter(|o| o.is_completed())
            .collect();
        let payouts = self.payouts.list_by_creator(creator_id).await?;

        let total: Decimal = completed.iter().map(|o| o.creator_earnings).sum();
        let this_month = completed
            .iter()
            .filter(|o| o.created_at >= since)
            .map(|o| o.creator_earnings)
            .sum();
        let committed: Decimal = payouts
            .iter()
            .filter(|p| self.deducts(p.status))
            .map(|p| p.amount)
            .sum();
        let sum_status = |status: PayoutStatus| -> Decimal {
            payouts
                .iter()
                .filter(|p| p.status == status)
                .map(|p| p.amount)
                .sum()
        };

        Ok(EarningsSummary {
            total,
            this_month,
            available_balance: total - committed,
            pending_payouts: sum_status(PayoutStatus::Pending),
            paid_out: sum_status(PayoutStatus::Completed),
        })
    }

    fn require_admin(actor: &Actor) -> Result<()> {
        if actor.is_admin() {
            Ok(())
        } else {
            tracing::warn!(user_id = %actor.user_id, "Non-admin attempted payout administration");
            Err(SettlementError::Unauthorized("admin role required".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::model::{NewOrder, Order, OrderStatus, OrderType, PaymentMeta};
    use crate::notify::MockNotifier;
    use crate::store::Stores;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn upi() -> PaymentDetails {
        PaymentDetails {
            upi: Some("creator@okaxis".into()),
            ..Default::default()
        }
    }

    fn engine(stores: &Stores, config: PlatformConfig) -> PayoutEngine {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().returning(|_| Ok(()));
        PayoutEngine::new(
            stores.orders.clone(),
            stores.payouts.clone(),
            Arc::new(notifier),
            Arc::new(FixedClock::new(
                Utc.with_ymd_and_hms(2024, 5, 20, 10, 0, 0).unwrap(),
            )),
            config,
        )
    }

    /// Store a completed order whose earnings are exactly `earnings`
    async fn earn(stores: &Stores, creator_id: UserId, earnings: Decimal) {
        let new = NewOrder {
            creator_id,
            product_id: None,
            amount: earnings,
            customer_email: "buyer@example.com".into(),
            customer_name: None,
            customer_id: None,
            order_type: OrderType::Donation,
        };
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap();
        let mut order = Order::create(new, ledger::split(earnings, dec!(0)).unwrap(), now);
        order
            .transition(OrderStatus::Completed, PaymentMeta::default(), now)
            .unwrap();
        stores.orders.insert(&order).await.unwrap();
    }

    async fn recompute(stores: &Stores, creator_id: UserId) -> Decimal {
        let earned: Decimal = stores
            .orders
            .list_by_creator(creator_id)
            .await
            .unwrap()
            .iter()
            .filter(|o| o.status == OrderStatus::Completed)
            .map(|o| o.creator_earnings)
            .sum();
        let committed: Decimal = stores
            .payouts
            .list_by_creator(creator_id)
            .await
            .unwrap()
            .iter()
            .filter(|p| matches!(p.status, PayoutStatus::Pending | PayoutStatus::Completed))
            .map(|p| p.amount)
            .sum();
        earned - committed
    }

    #[tokio::test]
    async fn test_full_balance_withdrawal() {
        let stores = Stores::in_memory();
        let engine = engine(&stores, PlatformConfig::default());
        let creator = UserId::new();
        earn(&stores, creator, dec!(500)).await;
        earn(&stores, creator, dec!(300)).await;
        assert_eq!(engine.available_balance(creator).await.unwrap(), dec!(800));

        let payout = engine.request_payout(creator, dec!(800), upi()).await.unwrap();
        assert_eq!(payout.status, PayoutStatus::Pending);
        assert_eq!(engine.available_balance(creator).await.unwrap(), Decimal::ZERO);

        for amount in [dec!(0.01), dec!(100), dec!(5000)] {
            let err = engine.request_payout(creator, amount, upi()).await.unwrap_err();
            assert!(matches!(err, SettlementError::InsufficientBalance { .. }), "{amount}");
        }
        assert_eq!(stores.payouts.list_by_creator(creator).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_overdraft_creates_nothing() {
        let stores = Stores::in_memory();
        let engine = engine(&stores, PlatformConfig::default());
        let creator = UserId::new();
        earn(&stores, creator, dec!(250)).await;

        let err = engine.request_payout(creator, dec!(250.01), upi()).await.unwrap_err();
        assert!(matches!(
            err,
            SettlementError::InsufficientBalance { available, .. } if available == dec!(250)
        ));
        assert!(stores.payouts.list_by_creator(creator).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_below_minimum() {
        let stores = Stores::in_memory();
        let engine = engine(&stores, PlatformConfig::default());
        let creator = UserId::new();
        earn(&stores, creator, dec!(1000)).await;

        let err = engine.request_payout(creator, dec!(99.99), upi()).await.unwrap_err();
        assert!(matches!(err, SettlementError::BelowMinimum { .. }));
        assert!(engine.request_payout(creator, dec!(100), upi()).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejects_bad_input_before_balance() {
        let stores = Stores::in_memory();
        let engine = engine(&stores, PlatformConfig::default());
        let creator = UserId::new();
        earn(&stores, creator, dec!(1000)).await;

        assert!(matches!(
            engine.request_payout(creator, dec!(-5), upi()).await,
            Err(SettlementError::InvalidAmount(_))
        ));
        assert!(matches!(
            engine
                .request_payout(creator, dec!(200), PaymentDetails::default())
                .await,
            Err(SettlementError::InvalidPaymentDetails(_))
        ));
    }

    #[tokio::test]
    async fn test_balance_matches_independent_recompute() {
        let stores = Stores::in_memory();
        let config = PlatformConfig {
            deduct_processing_payouts: false,
            ..PlatformConfig::default()
        };
        let engine = engine(&stores, config);
        let admin = Actor::admin(UserId::new());
        let creator = UserId::new();
        for e in [dec!(120.50), dec!(999.99), dec!(310), dec!(45.01)] {
            earn(&stores, creator, e).await;
        }

        let a = engine.request_payout(creator, dec!(200), upi()).await.unwrap();
        let b = engine.request_payout(creator, dec!(300), upi()).await.unwrap();
        let c = engine.request_payout(creator, dec!(150), upi()).await.unwrap();
        engine
            .admin_update_status(&admin, a.id, PayoutStatus::Completed, None)
            .await
            .unwrap();
        engine
            .admin_update_status(&admin, b.id, PayoutStatus::Rejected, Some("bad IFSC".into()))
            .await
            .unwrap();
        engine
            .admin_update_status(&admin, c.id, PayoutStatus::Processing, None)
            .await
            .unwrap();

        assert_eq!(
            engine.available_balance(creator).await.unwrap(),
            recompute(&stores, creator).await
        );
    }

    #[tokio::test]
    async fn test_processing_deducted_by_default() {
        let stores = Stores::in_memory();
        let engine = engine(&stores, PlatformConfig::default());
        let admin = Actor::admin(UserId::new());
        let creator = UserId::new();
        earn(&stores, creator, dec!(500)).await;

        let payout = engine.request_payout(creator, dec!(500), upi()).await.unwrap();
        engine
            .admin_update_status(&admin, payout.id, PayoutStatus::Processing, None)
            .await
            .unwrap();

        assert_eq!(engine.available_balance(creator).await.unwrap(), Decimal::ZERO);
        assert!(engine.request_payout(creator, dec!(500), upi()).await.is_err());
    }

    #[tokio::test]
    async fn test_rejection_releases_balance() {
        let stores = Stores::in_memory();
        let engine = engine(&stores, PlatformConfig::default());
        let admin = Actor::admin(UserId::new());
        let creator = UserId::new();
        earn(&stores, creator, dec!(400)).await;

        let payout = engine.request_payout(creator, dec!(400), upi()).await.unwrap();
        let rejected = engine
            .admin_update_status(&admin, payout.id, PayoutStatus::Rejected, Some("KYC".into()))
            .await
            .unwrap();
        assert!(rejected.processed_at.is_some());
        assert_eq!(rejected.admin_notes.as_deref(), Some("KYC"));
        assert_eq!(engine.available_balance(creator).await.unwrap(), dec!(400));
    }

    #[tokio::test]
    async fn test_admin_only() {
        let stores = Stores::in_memory();
        let engine = engine(&stores, PlatformConfig::default());
        let creator = UserId::new();
        earn(&stores, creator, dec!(400)).await;
        let payout = engine.request_payout(creator, dec!(200), upi()).await.unwrap();

        let err = engine
            .admin_update_status(&Actor::creator(creator), payout.id, PayoutStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::Unauthorized(_)));
        assert!(engine.list_pending(&Actor::creator(creator)).await.is_err());

        let stored = stores.payouts.get(payout.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PayoutStatus::Pending);
        assert!(stored.processed_at.is_none());
    }

    #[tokio::test]
    async fn test_terminal_payout_is_final() {
        let stores = Stores::in_memory();
        let engine = engine(&stores, PlatformConfig::default());
        let admin = Actor::admin(UserId::new());
        let creator = UserId::new();
        earn(&stores, creator, dec!(400)).await;
        let payout = engine.request_payout(creator, dec!(200), upi()).await.unwrap();

        engine
            .admin_update_status(&admin, payout.id, PayoutStatus::Completed, None)
            .await
            .unwrap();
        let err = engine
            .admin_update_status(&admin, payout.id, PayoutStatus::Rejected, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::InvalidTransition { .. }));

        let missing = engine
            .admin_update_status(&admin, PayoutId::new(), PayoutStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(missing, SettlementError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_requests_cannot_overdraw() {
        let stores = Stores::in_memory();
        let engine = Arc::new(engine(&stores, PlatformConfig::default()));
        let creator = UserId::new();
        earn(&stores, creator, dec!(1000)).await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.request_payout(creator, dec!(300), upi()).await })
            })
            .collect();

        let mut granted = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                granted += 1;
            }
        }
        assert_eq!(granted, 3);
        assert_eq!(engine.available_balance(creator).await.unwrap(), dec!(100));
    }

    #[tokio::test]
    async fn test_earnings_summary() {
        let stores = Stores::in_memory();
        let engine = engine(&stores, PlatformConfig::default());
        let admin = Actor::admin(UserId::new());
        let creator = UserId::new();
        earn(&stores, creator, dec!(700)).await;

        let paid = engine.request_payout(creator, dec!(200), upi()).await.unwrap();
        engine
            .admin_update_status(&admin, paid.id, PayoutStatus::Completed, None)
            .await
            .unwrap();
        engine.request_payout(creator, dec!(150), upi()).await.unwrap();

        let summary = engine.earnings_summary(creator).await.unwrap();
        assert_eq!(summary.total, dec!(700));
        assert_eq!(summary.this_month, dec!(700));
        assert_eq!(summary.paid_out, dec!(200));
        assert_eq!(summary.pending_payouts, dec!(150));
        assert_eq!(summary.available_balance, dec!(350));
    }
}
