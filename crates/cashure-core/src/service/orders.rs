//! Order lifecycle: creation with a frozen fee split, guarded status
//! transitions, and the side effects of completion.

use std::sync::Arc;
use std::time::Duration;

use super::{KeyedLocks, MembershipService};
use crate::clock::Clock;
use crate::config::PlatformConfig;
use crate::error::{Result, SettlementError};
use crate::ledger;
use crate::model::{NewOrder, Order, OrderId, OrderStatus, OrderType, PaymentMeta, Product, UserId};
use crate::notify::{self, Notification, Notifier};
use crate::store::Stores;

const SIDE_EFFECT_BACKOFF: Duration = Duration::from_millis(25);

pub struct OrderService {
    stores: Stores,
    memberships: Arc<MembershipService>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: PlatformConfig,
    locks: KeyedLocks<OrderId>,
}

impl OrderService {
    pub fn new(
        stores: Stores,
        memberships: Arc<MembershipService>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: PlatformConfig,
    ) -> Self {
        Self {
            stores,
            memberships,
            notifier,
            clock,
            config,
            locks: KeyedLocks::default(),
        }
    }

    /// Create a pending order with its fee split computed once
    pub async fn create(&self, new: NewOrder) -> Result<Order> {
        new.validate()?;
        if let Some(product_id) = new.product_id {
            let product = self
                .stores
                .products
                .get(product_id)
                .await?
                .ok_or_else(|| SettlementError::not_found("product", product_id))?;
            Self::check_product(&new, &product)?;
        }

        let split = ledger::split(new.amount, self.config.fee_percentage)?;
        let order = Order::create(new, split, self.clock.now());
        self.stores.orders.insert(&order).await?;

        tracing::info!(
            order_id = %order.id,
            creator_id = %order.creator_id,
            amount = %order.amount,
            platform_fee = %order.platform_fee,
            order_type = %order.order_type,
            "Created pending order"
        );
        Ok(order)
    }

    pub async fn get(&self, id: OrderId) -> Result<Order> {
        self.stores
            .orders
            .get(id)
            .await?
            .ok_or_else(|| SettlementError::not_found("order", id))
    }

    pub async fn list_by_creator(&self, creator_id: UserId) -> Result<Vec<Order>> {
        tracing::debug!(creator_id = %creator_id, "Listing orders by creator");
        self.stores.orders.list_by_creator(creator_id).await
    }

    pub async fn list_by_customer(&self, customer_email: &str) -> Result<Vec<Order>> {
        self.stores.orders.list_by_customer(customer_email).await
    }

    /// Apply a status change.
    ///
    /// Moving to `completed` stamps `completed_at`, grants the membership a
    /// membership order pays for, and notifies the customer and creator.
    /// The notification goes out exactly once, with the status change. If
    /// the membership cannot be granted after retrying, the order stays
    /// completed and the error is returned so the confirmation gets
    /// redelivered; [`Self::ensure_fulfilled`] picks it up from there.
    pub async fn update_status(
        &self,
        id: OrderId,
        next: OrderStatus,
        meta: PaymentMeta,
    ) -> Result<Order> {
        let _guard = self.locks.lock(id).await;

        let mut order = self.get(id).await?;
        let from = order.status;
        order.transition(next, meta, self.clock.now())?;
        self.stores.orders.save(&order).await?;

        tracing::info!(
            order_id = %id,
            creator_id = %order.creator_id,
            from = %from,
            to = %next,
            "Order status changed"
        );

        if next == OrderStatus::Completed {
            let fulfilled = self.fulfill(&order).await;
            let product = self.product_for(&order).await;
            notify::dispatch(
                self.notifier.as_ref(),
                Notification::OrderCompleted {
                    order: order.clone(),
                    product,
                },
            )
            .await;
            fulfilled?;
        }
        Ok(order)
    }

    pub async fn complete(&self, id: OrderId, meta: PaymentMeta) -> Result<Order> {
        self.update_status(id, OrderStatus::Completed, meta).await
    }

    /// Re-apply completion side effects that an earlier attempt left undone.
    ///
    /// The completion notice already went out with the status change, so
    /// nothing is sent from here.
    pub async fn ensure_fulfilled(&self, id: OrderId) -> Result<Order> {
        let _guard = self.locks.lock(id).await;

        let order = self.get(id).await?;
        if !order.is_completed() {
            return Err(SettlementError::transition("order", order.status, "fulfilled"));
        }
        self.fulfill(&order).await?;
        Ok(order)
    }

    async fn fulfill(&self, order: &Order) -> Result<()> {
        if order.order_type != OrderType::Membership {
            return Ok(());
        }

        let attempts = self.config.side_effect_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.memberships.activate_for_order(order).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let backoff = SIDE_EFFECT_BACKOFF * 2u32.pow(attempt - 1);
                    tracing::warn!(
                        order_id = %order.id,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Membership grant failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    tracing::error!(
                        order_id = %order.id,
                        attempt,
                        error = %e,
                        "Membership grant failed for completed order"
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn product_for(&self, order: &Order) -> Option<Product> {
        let product_id = order.product_id?;
        match self.stores.products.get(product_id).await {
            Ok(product) => product,
            Err(e) => {
                tracing::warn!(order_id = %order.id, error = %e, "Product lookup failed");
                None
            }
        }
    }

    fn check_product(new: &NewOrder, product: &Product) -> Result<()> {
        if product.creator_id != new.creator_id {
            return Err(SettlementError::InvalidInput(format!(
                "product {} does not belong to creator {}",
                product.id, new.creator_id
            )));
        }
        if new.order_type.expected_product_type() != Some(product.product_type) {
            return Err(SettlementError::InvalidInput(format!(
                "{} order cannot buy a {} product",
                new.order_type,
                product.product_type.as_str()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::model::{Membership, MembershipId, NewProduct, ProductId, ProductType};
    use crate::notify::MockNotifier;
    use crate::store::{MemoryMembershipStore, MembershipStore};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Membership store whose first `failures` inserts fail
    struct FlakyMemberships {
        inner: MemoryMembershipStore,
        failures: AtomicU32,
    }

    #[async_trait]
    impl MembershipStore for FlakyMemberships {
        async fn insert(&self, membership: &Membership) -> Result<()> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(SettlementError::Storage("connection reset".into()));
            }
            self.inner.insert(membership).await
        }
        async fn get(&self, id: MembershipId) -> Result<Option<Membership>> {
            self.inner.get(id).await
        }
        async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Membership>> {
            self.inner.list_by_user(user_id).await
        }
        async fn list_by_creator(&self, creator_id: UserId) -> Result<Vec<Membership>> {
            self.inner.list_by_creator(creator_id).await
        }
        async fn list_flagged_active(&self) -> Result<Vec<Membership>> {
            self.inner.list_flagged_active().await
        }
        async fn find_by_order(&self, order_id: OrderId) -> Result<Option<Membership>> {
            self.inner.find_by_order(order_id).await
        }
        async fn find_for_subscriber(
            &self,
            user_id: UserId,
            product_id: ProductId,
        ) -> Result<Option<Membership>> {
            self.inner.find_for_subscriber(user_id, product_id).await
        }
        async fn save(&self, membership: &Membership) -> Result<()> {
            self.inner.save(membership).await
        }
    }

    fn service_with(stores: Stores, notifier: MockNotifier) -> OrderService {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap(),
        ));
        let memberships = Arc::new(MembershipService::new(
            stores.products.clone(),
            stores.memberships.clone(),
            clock.clone(),
        ));
        OrderService::new(
            stores,
            memberships,
            Arc::new(notifier),
            clock,
            PlatformConfig::default(),
        )
    }

    fn quiet_notifier() -> MockNotifier {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().returning(|_| Ok(()));
        notifier
    }

    async fn membership_product(stores: &Stores, creator_id: UserId) -> Product {
        let product = Product::create(
            NewProduct {
                creator_id,
                title: "Inner circle".into(),
                description: None,
                price: dec!(499),
                product_type: ProductType::Membership,
                membership_duration_days: Some(30),
            },
            Utc::now(),
        )
        .unwrap();
        stores.products.insert(&product).await.unwrap();
        product
    }

    fn donation(creator_id: UserId, amount: rust_decimal::Decimal) -> NewOrder {
        NewOrder {
            creator_id,
            product_id: None,
            amount,
            customer_email: "fan@example.com".into(),
            customer_name: Some("Fan".into()),
            customer_id: None,
            order_type: OrderType::Donation,
        }
    }

    #[tokio::test]
    async fn test_create_freezes_split() {
        let stores = Stores::in_memory();
        let service = service_with(stores, quiet_notifier());

        let order = service
            .create(donation(UserId::new(), dec!(1000)))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.platform_fee, dec!(100.00));
        assert_eq!(order.creator_earnings, dec!(900.00));
        assert!(order.completed_at.is_none());
        assert_eq!(service.get(order.id).await.unwrap(), order);
    }

    #[tokio::test]
    async fn test_create_rejects_foreign_product() {
        let stores = Stores::in_memory();
        let product = membership_product(&stores, UserId::new()).await;
        let service = service_with(stores, quiet_notifier());

        let new = NewOrder {
            product_id: Some(product.id),
            customer_id: Some(UserId::new()),
            order_type: OrderType::Membership,
            ..donation(UserId::new(), dec!(499))
        };
        assert!(matches!(
            service.create(new).await,
            Err(SettlementError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_completion_notifies_once() {
        let stores = Stores::in_memory();
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|n| matches!(n, Notification::OrderCompleted { .. }))
            .times(1)
            .returning(|_| Ok(()));
        let service = service_with(stores, notifier);

        let order = service
            .create(donation(UserId::new(), dec!(250)))
            .await
            .unwrap();
        let done = service
            .complete(order.id, PaymentMeta::reference("cf_123"))
            .await
            .unwrap();
        assert!(done.completed_at.is_some());
        assert_eq!(done.payment_id.as_deref(), Some("cf_123"));

        let again = service
            .complete(order.id, PaymentMeta::reference("cf_123"))
            .await
            .unwrap_err();
        assert!(matches!(again, SettlementError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_notification_failure_keeps_completion() {
        let stores = Stores::in_memory();
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .returning(|_| Err(SettlementError::Storage("mail relay down".into())));
        let service = service_with(stores, notifier);

        let order = service
            .create(donation(UserId::new(), dec!(80)))
            .await
            .unwrap();
        service.complete(order.id, PaymentMeta::default()).await.unwrap();
        assert!(service.get(order.id).await.unwrap().is_completed());
    }

    #[tokio::test]
    async fn test_failed_order_cannot_complete() {
        let stores = Stores::in_memory();
        let service = service_with(stores, quiet_notifier());
        let order = service
            .create(donation(UserId::new(), dec!(80)))
            .await
            .unwrap();

        service
            .update_status(order.id, OrderStatus::Failed, PaymentMeta::default())
            .await
            .unwrap();
        let err = service
            .complete(order.id, PaymentMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::InvalidTransition { .. }));
        assert!(service.get(order.id).await.unwrap().completed_at.is_none());
    }

    #[tokio::test]
    async fn test_membership_order_grants_membership() {
        let stores = Stores::in_memory();
        let creator = UserId::new();
        let subscriber = UserId::new();
        let product = membership_product(&stores, creator).await;
        let service = service_with(stores.clone(), quiet_notifier());

        let order = service
            .create(NewOrder {
                product_id: Some(product.id),
                customer_id: Some(subscriber),
                order_type: OrderType::Membership,
                ..donation(creator, dec!(499))
            })
            .await
            .unwrap();
        let done = service.complete(order.id, PaymentMeta::default()).await.unwrap();

        let granted = stores.memberships.find_by_order(order.id).await.unwrap().unwrap();
        assert_eq!(granted.user_id, subscriber);
        assert_eq!(
            granted.expires_at,
            done.completed_at.unwrap() + chrono::Duration::days(30)
        );
    }

    #[tokio::test]
    async fn test_membership_grant_retried() {
        let mut stores = Stores::in_memory();
        stores.memberships = Arc::new(FlakyMemberships {
            inner: MemoryMembershipStore::new(),
            failures: AtomicU32::new(2),
        });
        let creator = UserId::new();
        let product = membership_product(&stores, creator).await;
        let service = service_with(stores.clone(), quiet_notifier());

        let order = service
            .create(NewOrder {
                product_id: Some(product.id),
                customer_id: Some(UserId::new()),
                order_type: OrderType::Membership,
                ..donation(creator, dec!(499))
            })
            .await
            .unwrap();
        service.complete(order.id, PaymentMeta::default()).await.unwrap();
        assert!(stores.memberships.find_by_order(order.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_exhausted_grant_recovers_on_redelivery() {
        let mut stores = Stores::in_memory();
        stores.memberships = Arc::new(FlakyMemberships {
            inner: MemoryMembershipStore::new(),
            failures: AtomicU32::new(3),
        });
        let creator = UserId::new();
        let product = membership_product(&stores, creator).await;
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|n| matches!(n, Notification::OrderCompleted { .. }))
            .times(1)
            .returning(|_| Ok(()));
        let service = service_with(stores.clone(), notifier);

        let order = service
            .create(NewOrder {
                product_id: Some(product.id),
                customer_id: Some(UserId::new()),
                order_type: OrderType::Membership,
                ..donation(creator, dec!(499))
            })
            .await
            .unwrap();

        let err = service.complete(order.id, PaymentMeta::default()).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(service.get(order.id).await.unwrap().is_completed());
        assert!(stores.memberships.find_by_order(order.id).await.unwrap().is_none());

        service.ensure_fulfilled(order.id).await.unwrap();
        service.ensure_fulfilled(order.id).await.unwrap();
        assert_eq!(
            stores.memberships.list_by_creator(creator).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_redelivered_superseded_order_keeps_expiry() {
        let stores = Stores::in_memory();
        let creator = UserId::new();
        let subscriber = UserId::new();
        let product = membership_product(&stores, creator).await;
        let service = service_with(stores.clone(), quiet_notifier());

        let mut order_ids = Vec::new();
        for _ in 0..2 {
            let order = service
                .create(NewOrder {
                    product_id: Some(product.id),
                    customer_id: Some(subscriber),
                    order_type: OrderType::Membership,
                    ..donation(creator, dec!(499))
                })
                .await
                .unwrap();
            service.complete(order.id, PaymentMeta::default()).await.unwrap();
            order_ids.push(order.id);
        }
        let before = stores
            .memberships
            .find_for_subscriber(subscriber, product.id)
            .await
            .unwrap()
            .unwrap();

        for _ in 0..3 {
            for id in &order_ids {
                service.ensure_fulfilled(*id).await.unwrap();
            }
        }
        let after = stores
            .memberships
            .find_for_subscriber(subscriber, product.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.id, before.id);
        assert_eq!(after.expires_at, before.expires_at);
        assert_eq!(stores.memberships.list_by_user(subscriber).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let service = service_with(Stores::in_memory(), quiet_notifier());
        let err = service
            .update_status(OrderId::new(), OrderStatus::Completed, PaymentMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::NotFound { entity: "order", .. }));
    }
}
