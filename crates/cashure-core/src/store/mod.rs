//! Persistence Ports
//!
//! Storage traits for each aggregate. Services only talk to these; the
//! backing store is picked at the composition root.

mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::{MemoryMembershipStore, MemoryOrderStore, MemoryPayoutStore, MemoryProductStore};

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{
    Membership, MembershipId, Order, OrderId, Payout, PayoutId, PayoutStatus, Product, ProductId,
    UserId,
};

/// Product catalog
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn insert(&self, product: &Product) -> Result<()>;

    async fn get(&self, id: ProductId) -> Result<Option<Product>>;

    async fn list_by_creator(&self, creator_id: UserId) -> Result<Vec<Product>>;

    /// Replace an existing product; `NotFound` if absent
    async fn update(&self, product: &Product) -> Result<()>;

    /// Returns whether a product was removed
    async fn delete(&self, id: ProductId) -> Result<bool>;
}

/// Order records
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<()>;

    async fn get(&self, id: OrderId) -> Result<Option<Order>>;

    async fn list_by_creator(&self, creator_id: UserId) -> Result<Vec<Order>>;

    async fn list_by_customer(&self, customer_email: &str) -> Result<Vec<Order>>;

    /// Persist a mutated order; `NotFound` if absent
    async fn save(&self, order: &Order) -> Result<()>;
}

/// Membership records
#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn insert(&self, membership: &Membership) -> Result<()>;

    async fn get(&self, id: MembershipId) -> Result<Option<Membership>>;

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Membership>>;

    async fn list_by_creator(&self, creator_id: UserId) -> Result<Vec<Membership>>;

    /// Memberships with the active flag set, expired or not
    async fn list_flagged_active(&self) -> Result<Vec<Membership>>;

    /// Membership that `order_id` created or extended.
    ///
    /// Every order a membership has carried stays linked to it, so this
    /// still answers after a later purchase takes over `order_id`.
    async fn find_by_order(&self, order_id: OrderId) -> Result<Option<Membership>>;

    /// Latest-expiring membership a subscriber holds on a product
    async fn find_for_subscriber(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<Membership>>;

    /// Persist a mutated membership; `NotFound` if absent
    async fn save(&self, membership: &Membership) -> Result<()>;
}

/// Payout records
#[async_trait]
pub trait PayoutStore: Send + Sync {
    async fn insert(&self, payout: &Payout) -> Result<()>;

    async fn get(&self, id: PayoutId) -> Result<Option<Payout>>;

    async fn list_by_creator(&self, creator_id: UserId) -> Result<Vec<Payout>>;

    async fn list_by_status(&self, status: PayoutStatus) -> Result<Vec<Payout>>;

    /// Persist a mutated payout; `NotFound` if absent
    async fn save(&self, payout: &Payout) -> Result<()>;
}

/// All store handles, wired once at startup
#[derive(Clone)]
pub struct Stores {
    pub products: Arc<dyn ProductStore>,
    pub orders: Arc<dyn OrderStore>,
    pub memberships: Arc<dyn MembershipStore>,
    pub payouts: Arc<dyn PayoutStore>,
}

impl Stores {
    /// Fresh in-memory stores
    pub fn in_memory() -> Self {
        Self {
            products: Arc::new(MemoryProductStore::new()),
            orders: Arc::new(MemoryOrderStore::new()),
            memberships: Arc::new(MemoryMembershipStore::new()),
            payouts: Arc::new(MemoryPayoutStore::new()),
        }
    }
}
