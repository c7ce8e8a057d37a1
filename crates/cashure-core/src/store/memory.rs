//! In-memory stores (for development and tests)

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{MembershipStore, OrderStore, PayoutStore, ProductStore};
use crate::error::{Result, SettlementError};
use crate::model::{
    Membership, MembershipId, Order, OrderId, Payout, PayoutId, PayoutStatus, Product, ProductId,
    UserId,
};

/// In-memory product catalog
#[derive(Debug, Default)]
pub struct MemoryProductStore {
    products: RwLock<HashMap<ProductId, Product>>,
}

impl MemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProductStore for MemoryProductStore {
    async fn insert(&self, product: &Product) -> Result<()> {
        self.products
            .write()
            .await
            .insert(product.id, product.clone());
        Ok(())
    }

    async fn get(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.products.read().await.get(&id).cloned())
    }

    async fn list_by_creator(&self, creator_id: UserId) -> Result<Vec<Product>> {
        let products = self.products.read().await;
        let mut found: Vec<_> = products
            .values()
            .filter(|p| p.creator_id == creator_id)
            .cloned()
            .collect();
        found.sort_by_key(|p| p.created_at);
        Ok(found)
    }

    async fn update(&self, product: &Product) -> Result<()> {
        let mut products = self.products.write().await;
        match products.get_mut(&product.id) {
            Some(slot) => {
                *slot = product.clone();
                Ok(())
            }
            None => Err(SettlementError::not_found("product", product.id)),
        }
    }

    async fn delete(&self, id: ProductId) -> Result<bool> {
        Ok(self.products.write().await.remove(&id).is_some())
    }
}

/// In-memory order store
#[derive(Debug, Default)]
pub struct MemoryOrderStore {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn select(&self, keep: impl Fn(&Order) -> bool + Send) -> Vec<Order> {
        let orders = self.orders.read().await;
        let mut found: Vec<_> = orders.values().filter(|o| keep(o)).cloned().collect();
        found.sort_by_key(|o| o.created_at);
        found
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(SettlementError::Storage(format!("duplicate order id {}", order.id)));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn list_by_creator(&self, creator_id: UserId) -> Result<Vec<Order>> {
        Ok(self.select(|o| o.creator_id == creator_id).await)
    }

    async fn list_by_customer(&self, customer_email: &str) -> Result<Vec<Order>> {
        let wanted = customer_email.trim().to_lowercase();
        Ok(self
            .select(|o| o.customer_email.to_lowercase() == wanted)
            .await)
    }

    async fn save(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&order.id) {
            Some(slot) => {
                *slot = order.clone();
                Ok(())
            }
            None => Err(SettlementError::not_found("order", order.id)),
        }
    }
}

/// In-memory membership store
#[derive(Debug, Default)]
pub struct MemoryMembershipStore {
    memberships: RwLock<HashMap<MembershipId, Membership>>,
    /// Every order applied to a membership
    order_links: RwLock<HashMap<OrderId, MembershipId>>,
}

impl MemoryMembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn select(&self, keep: impl Fn(&Membership) -> bool + Send) -> Vec<Membership> {
        let memberships = self.memberships.read().await;
        let mut found: Vec<_> = memberships.values().filter(|m| keep(m)).cloned().collect();
        found.sort_by_key(|m| m.created_at);
        found
    }
}

#[async_trait]
impl MembershipStore for MemoryMembershipStore {
    async fn insert(&self, membership: &Membership) -> Result<()> {
        let mut memberships = self.memberships.write().await;
        let mut links = self.order_links.write().await;
        memberships.insert(membership.id, membership.clone());
        links.entry(membership.order_id).or_insert(membership.id);
        Ok(())
    }

    async fn get(&self, id: MembershipId) -> Result<Option<Membership>> {
        Ok(self.memberships.read().await.get(&id).cloned())
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Membership>> {
        Ok(self.select(|m| m.user_id == user_id).await)
    }

    async fn list_by_creator(&self, creator_id: UserId) -> Result<Vec<Membership>> {
        Ok(self.select(|m| m.creator_id == creator_id).await)
    }

    async fn list_flagged_active(&self) -> Result<Vec<Membership>> {
        Ok(self.select(|m| m.is_active).await)
    }

    async fn find_by_order(&self, order_id: OrderId) -> Result<Option<Membership>> {
        let Some(id) = self.order_links.read().await.get(&order_id).copied() else {
            return Ok(None);
        };
        Ok(self.memberships.read().await.get(&id).cloned())
    }

    async fn find_for_subscriber(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<Membership>> {
        Ok(self
            .select(|m| m.user_id == user_id && m.product_id == product_id)
            .await
            .into_iter()
            .max_by_key(|m| m.expires_at))
    }

    async fn save(&self, membership: &Membership) -> Result<()> {
        let mut memberships = self.memberships.write().await;
        let mut links = self.order_links.write().await;
        match memberships.get_mut(&membership.id) {
            Some(slot) => {
                *slot = membership.clone();
                links.entry(membership.order_id).or_insert(membership.id);
                Ok(())
            }
            None => Err(SettlementError::not_found("membership", membership.id)),
        }
    }
}

/// In-memory payout store
#[derive(Debug, Default)]
pub struct MemoryPayoutStore {
    payouts: RwLock<HashMap<PayoutId, Payout>>,
}

impl MemoryPayoutStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn select(&self, keep: impl Fn(&Payout) -> bool + Send) -> Vec<Payout> {
        let payouts = self.payouts.read().await;
        let mut found: Vec<_> = payouts.values().filter(|p| keep(p)).cloned().collect();
        found.sort_by_key(|p| p.requested_at);
        found
    }
}

#[async_trait]
impl PayoutStore for MemoryPayoutStore {
    async fn insert(&self, payout: &Payout) -> Result<()> {
        self.payouts
            .write()
            .await
            .insert(payout.id, payout.clone());
        Ok(())
    }

    async fn get(&self, id: PayoutId) -> Result<Option<Payout>> {
        Ok(self.payouts.read().await.get(&id).cloned())
    }

    async fn list_by_creator(&self, creator_id: UserId) -> Result<Vec<Payout>> {
        Ok(self.select(|p| p.creator_id == creator_id).await)
    }

    async fn list_by_status(&self, status: PayoutStatus) -> Result<Vec<Payout>> {
        Ok(self.select(|p| p.status == status).await)
    }

    async fn save(&self, payout: &Payout) -> Result<()> {
        let mut payouts = self.payouts.write().await;
        match payouts.get_mut(&payout.id) {
            Some(slot) => {
                *slot = payout.clone();
                Ok(())
            }
            None => Err(SettlementError::not_found("payout", payout.id)),
        }
    }
}
