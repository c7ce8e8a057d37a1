//! Membership lifecycle: creation from completed orders, additive renewal,
//! and the entitlement query.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::KeyedLocks;
use crate::clock::Clock;
use crate::error::{Result, SettlementError};
use crate::model::{Membership, MembershipId, Order, OrderType, Product, ProductId, UserId};
use crate::store::{MembershipStore, ProductStore};

pub struct MembershipService {
    products: Arc<dyn ProductStore>,
    memberships: Arc<dyn MembershipStore>,
    clock: Arc<dyn Clock>,
    subscriber_locks: KeyedLocks<(UserId, ProductId)>,
}

impl MembershipService {
    pub fn new(
        products: Arc<dyn ProductStore>,
        memberships: Arc<dyn MembershipStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            products,
            memberships,
            clock,
            subscriber_locks: KeyedLocks::default(),
        }
    }

    pub async fn get(&self, id: MembershipId) -> Result<Membership> {
        self.memberships
            .get(id)
            .await?
            .ok_or_else(|| SettlementError::not_found("membership", id))
    }

    pub async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Membership>> {
        self.memberships.list_by_user(user_id).await
    }

    pub async fn list_by_creator(&self, creator_id: UserId) -> Result<Vec<Membership>> {
        self.memberships.list_by_creator(creator_id).await
    }

    /// New membership starting at the order's completion time
    pub async fn create(&self, order: &Order, product: &Product) -> Result<Membership> {
        let (user_id, completed_at) = Self::membership_terms(order)?;
        let period = product.membership_period().ok_or_else(|| {
            SettlementError::InvalidInput(format!("product {} is not a membership", product.id))
        })?;

        let membership = Membership {
            id: MembershipId::new(),
            user_id,
            creator_id: order.creator_id,
            product_id: product.id,
            order_id: order.id,
            expires_at: completed_at + period,
            is_active: true,
            created_at: completed_at,
        };
        self.memberships.insert(&membership).await?;

        tracing::info!(
            membership_id = %membership.id,
            order_id = %order.id,
            expires_at = %membership.expires_at,
            "Created membership"
        );
        Ok(membership)
    }

    /// Grant the membership a completed order paid for.
    ///
    /// Idempotent per order, including orders a later purchase has since
    /// superseded. A subscriber who still holds an unexpired membership on
    /// the same product gets it extended from its current expiry instead of
    /// a second record.
    pub async fn activate_for_order(&self, order: &Order) -> Result<Membership> {
        let (user_id, completed_at) = Self::membership_terms(order)?;
        let product_id = order
            .product_id
            .ok_or_else(|| SettlementError::InvalidInput("membership order without product".into()))?;

        // Two orders for the same subscription must not extend concurrently
        let _guard = self.subscriber_locks.lock((user_id, product_id)).await;

        if let Some(existing) = self.memberships.find_by_order(order.id).await? {
            tracing::debug!(order_id = %order.id, "Membership already granted for order");
            return Ok(existing);
        }
        let product = self
            .products
            .get(product_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("product", product_id))?;

        match self.memberships.find_for_subscriber(user_id, product_id).await? {
            Some(mut current) if current.is_entitled_at(completed_at) => {
                let period = product.membership_period().ok_or_else(|| {
                    SettlementError::InvalidInput(format!("product {product_id} is not a membership"))
                })?;
                current.extend(period);
                current.order_id = order.id;
                self.memberships.save(&current).await?;

                tracing::info!(
                    membership_id = %current.id,
                    order_id = %order.id,
                    expires_at = %current.expires_at,
                    "Extended membership from repeat purchase"
                );
                Ok(current)
            }
            _ => self.create(order, &product).await,
        }
    }

    /// Extend by one product period from the current expiry.
    ///
    /// Returns `false` when the membership or its product no longer exists.
    pub async fn renew(&self, id: MembershipId) -> Result<bool> {
        Ok(self.renew_inner(id).await?.is_some())
    }

    pub(crate) async fn renew_inner(&self, id: MembershipId) -> Result<Option<(Membership, Product)>> {
        let Some(mut membership) = self.memberships.get(id).await? else {
            return Ok(None);
        };
        let Some(product) = self.products.get(membership.product_id).await? else {
            tracing::warn!(membership_id = %id, "Cannot renew: product missing");
            return Ok(None);
        };
        let Some(period) = product.membership_period() else {
            return Ok(None);
        };

        membership.extend(period);
        self.memberships.save(&membership).await?;

        tracing::info!(
            membership_id = %id,
            expires_at = %membership.expires_at,
            "Renewed membership"
        );
        Ok(Some((membership, product)))
    }

    /// Memberships of `user_id` that currently entitle access
    pub async fn active_for_user(&self, user_id: UserId) -> Result<Vec<Membership>> {
        let now = self.clock.now();
        let mut active: Vec<_> = self
            .memberships
            .list_by_user(user_id)
            .await?
            .into_iter()
            .filter(|m| m.is_entitled_at(now))
            .collect();
        active.sort_by_key(|m| std::cmp::Reverse(m.expires_at));
        Ok(active)
    }

    /// Content-gating check for a subscriber and creator
    pub async fn is_entitled(&self, user_id: UserId, creator_id: UserId) -> Result<bool> {
        Ok(self
            .active_for_user(user_id)
            .await?
            .iter()
            .any(|m| m.creator_id == creator_id))
    }

    fn membership_terms(order: &Order) -> Result<(UserId, DateTime<Utc>)> {
        if order.order_type != OrderType::Membership {
            return Err(SettlementError::InvalidInput(format!(
                "order {} is a {} order",
                order.id, order.order_type
            )));
        }
        let completed_at = order.completed_at.filter(|_| order.is_completed()).ok_or_else(|| {
            SettlementError::transition("membership", order.status, "active")
        })?;
        let user_id = order.customer_id.ok_or_else(|| {
            SettlementError::InvalidInput(format!("order {} has no subscriber", order.id))
        })?;
        Ok((user_id, completed_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::ledger;
    use crate::model::{NewOrder, NewProduct, OrderStatus, PaymentMeta, ProductType};
    use crate::store::Stores;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    struct Fixture {
        stores: Stores,
        clock: Arc<FixedClock>,
        service: MembershipService,
        product: Product,
    }

    async fn fixture() -> Fixture {
        let stores = Stores::in_memory();
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        ));
        let service = MembershipService::new(
            stores.products.clone(),
            stores.memberships.clone(),
            clock.clone(),
        );
        let product = Product::create(
            NewProduct {
                creator_id: UserId::new(),
                title: "Backstage pass".into(),
                description: None,
                price: dec!(199),
                product_type: ProductType::Membership,
                membership_duration_days: Some(30),
            },
            clock.now(),
        )
        .unwrap();
        stores.products.insert(&product).await.unwrap();

        Fixture {
            stores,
            clock,
            service,
            product,
        }
    }

    fn completed_order(product: &Product, subscriber: UserId, at: DateTime<Utc>) -> Order {
        let new = NewOrder {
            creator_id: product.creator_id,
            product_id: Some(product.id),
            amount: product.price,
            customer_email: "sub@example.com".into(),
            customer_name: None,
            customer_id: Some(subscriber),
            order_type: OrderType::Membership,
        };
        let mut order = Order::create(new, ledger::split(product.price, dec!(10)).unwrap(), at);
        order
            .transition(OrderStatus::Completed, PaymentMeta::reference("ref"), at)
            .unwrap();
        order
    }

    #[tokio::test]
    async fn test_create_expires_from_completion() {
        let f = fixture().await;
        let at = f.clock.now();
        let order = completed_order(&f.product, UserId::new(), at);

        let membership = f.service.activate_for_order(&order).await.unwrap();
        assert_eq!(membership.expires_at, at + Duration::days(30));
        assert!(membership.is_active);
    }

    #[tokio::test]
    async fn test_activate_is_idempotent_per_order() {
        let f = fixture().await;
        let order = completed_order(&f.product, UserId::new(), f.clock.now());

        let first = f.service.activate_for_order(&order).await.unwrap();
        let second = f.service.activate_for_order(&order).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            f.stores
                .memberships
                .list_by_creator(f.product.creator_id)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_repeat_purchase_extends_active_membership() {
        let f = fixture().await;
        let subscriber = UserId::new();
        let start = f.clock.now();
        let first = f
            .service
            .activate_for_order(&completed_order(&f.product, subscriber, start))
            .await
            .unwrap();

        let later = start + Duration::days(10);
        let second_order = completed_order(&f.product, subscriber, later);
        let extended = f.service.activate_for_order(&second_order).await.unwrap();

        assert_eq!(extended.id, first.id);
        assert_eq!(extended.order_id, second_order.id);
        assert_eq!(extended.expires_at, start + Duration::days(60));
    }

    #[tokio::test]
    async fn test_superseded_order_does_not_extend_again() {
        let f = fixture().await;
        let subscriber = UserId::new();
        let start = f.clock.now();
        let first_order = completed_order(&f.product, subscriber, start);
        let second_order = completed_order(&f.product, subscriber, start + Duration::days(5));

        f.service.activate_for_order(&first_order).await.unwrap();
        let extended = f.service.activate_for_order(&second_order).await.unwrap();
        assert_eq!(extended.expires_at, start + Duration::days(60));

        for _ in 0..3 {
            let a = f.service.activate_for_order(&first_order).await.unwrap();
            let b = f.service.activate_for_order(&second_order).await.unwrap();
            assert_eq!(a.id, extended.id);
            assert_eq!(b.expires_at, extended.expires_at);
        }
        assert_eq!(
            f.service.get(extended.id).await.unwrap().expires_at,
            start + Duration::days(60)
        );
    }

    #[tokio::test]
    async fn test_purchase_after_expiry_starts_fresh() {
        let f = fixture().await;
        let subscriber = UserId::new();
        let start = f.clock.now();
        let first = f
            .service
            .activate_for_order(&completed_order(&f.product, subscriber, start))
            .await
            .unwrap();

        let much_later = start + Duration::days(90);
        let fresh = f
            .service
            .activate_for_order(&completed_order(&f.product, subscriber, much_later))
            .await
            .unwrap();
        assert_ne!(fresh.id, first.id);
        assert_eq!(fresh.expires_at, much_later + Duration::days(30));
    }

    #[tokio::test]
    async fn test_renew_is_additive() {
        let f = fixture().await;
        let expires = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let membership = Membership {
            id: MembershipId::new(),
            user_id: UserId::new(),
            creator_id: f.product.creator_id,
            product_id: f.product.id,
            order_id: crate::model::OrderId::new(),
            expires_at: expires,
            is_active: true,
            created_at: expires - Duration::days(30),
        };
        f.stores.memberships.insert(&membership).await.unwrap();
        f.clock.set(Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap());

        assert!(f.service.renew(membership.id).await.unwrap());
        let renewed = f.service.get(membership.id).await.unwrap();
        assert_eq!(
            renewed.expires_at,
            Utc.with_ymd_and_hms(2024, 2, 9, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_renew_missing_returns_false() {
        let f = fixture().await;
        assert!(!f.service.renew(MembershipId::new()).await.unwrap());

        let order = completed_order(&f.product, UserId::new(), f.clock.now());
        let membership = f.service.activate_for_order(&order).await.unwrap();
        f.stores.products.delete(f.product.id).await.unwrap();
        assert!(!f.service.renew(membership.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_entitlement_needs_flag_and_time() {
        let f = fixture().await;
        let subscriber = UserId::new();
        let order = completed_order(&f.product, subscriber, f.clock.now());
        let mut membership = f.service.activate_for_order(&order).await.unwrap();

        assert!(f.service.is_entitled(subscriber, f.product.creator_id).await.unwrap());

        f.clock.advance(Duration::days(31));
        assert!(!f.service.is_entitled(subscriber, f.product.creator_id).await.unwrap());

        f.clock.set(order.completed_at.unwrap());
        membership.is_active = false;
        f.stores.memberships.save(&membership).await.unwrap();
        assert!(!f.service.is_entitled(subscriber, f.product.creator_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_pending_order_grants_nothing() {
        let f = fixture().await;
        let mut order = completed_order(&f.product, UserId::new(), f.clock.now());
        order.status = OrderStatus::Pending;
        order.completed_at = None;

        let err = f.service.activate_for_order(&order).await.unwrap_err();
        assert!(matches!(err, SettlementError::InvalidTransition { .. }));
    }
}
