//! Postgres stores
//!
//! One `PgStore` implements every port against a shared connection pool.
//! Status enums are stored as text, payout destinations as JSONB.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Transaction;
use sqlx::postgres::{PgPool, PgPoolOptions, Postgres};
use sqlx::types::Json;
use uuid::Uuid;

use super::{MembershipStore, OrderStore, PayoutStore, ProductStore, Stores};
use crate::error::{Result, SettlementError};
use crate::model::{
    Membership, MembershipId, Order, OrderId, Payout, PayoutDestination, PayoutId, PayoutStatus,
    Product, ProductId, UserId,
};

const SCHEMA: &str = include_str!("../../migrations/0001_settlement.sql");

impl From<sqlx::Error> for SettlementError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Connect and bootstrap the schema
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    sqlx::raw_sql(SCHEMA).execute(&pool).await?;
    Ok(pool)
}

/// Postgres-backed implementation of all store ports
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn into_stores(self) -> Stores {
        let shared = Arc::new(self);
        Stores {
            products: shared.clone(),
            orders: shared.clone(),
            memberships: shared.clone(),
            payouts: shared,
        }
    }
}

fn missing(entity: &'static str, id: impl ToString, rows: u64) -> Result<()> {
    if rows == 0 {
        Err(SettlementError::not_found(entity, id))
    } else {
        Ok(())
    }
}

// ============================================================================
// Row mappings
// ============================================================================

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    creator_id: Uuid,
    title: String,
    description: Option<String>,
    price: Decimal,
    product_type: String,
    membership_duration_days: Option<i32>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = SettlementError;

    fn try_from(row: ProductRow) -> Result<Self> {
        Ok(Self {
            id: ProductId::from_uuid(row.id),
            creator_id: UserId::from_uuid(row.creator_id),
            title: row.title,
            description: row.description,
            price: row.price,
            product_type: row.product_type.parse()?,
            membership_duration_days: row
                .membership_duration_days
                .map(u32::try_from)
                .transpose()
                .map_err(|e| SettlementError::Storage(format!("bad duration: {e}")))?,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    creator_id: Uuid,
    customer_email: String,
    customer_name: Option<String>,
    customer_id: Option<Uuid>,
    product_id: Option<Uuid>,
    amount: Decimal,
    platform_fee: Decimal,
    creator_earnings: Decimal,
    order_type: String,
    status: String,
    payment_id: Option<String>,
    payment_data: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = SettlementError;

    fn try_from(row: OrderRow) -> Result<Self> {
        Ok(Self {
            id: OrderId::from_uuid(row.id),
            creator_id: UserId::from_uuid(row.creator_id),
            customer_email: row.customer_email,
            customer_name: row.customer_name,
            customer_id: row.customer_id.map(UserId::from_uuid),
            product_id: row.product_id.map(ProductId::from_uuid),
            amount: row.amount,
            platform_fee: row.platform_fee,
            creator_earnings: row.creator_earnings,
            order_type: row.order_type.parse()?,
            status: row.status.parse()?,
            payment_id: row.payment_id,
            payment_data: row.payment_data,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MembershipRow {
    id: Uuid,
    user_id: Uuid,
    creator_id: Uuid,
    product_id: Uuid,
    order_id: Uuid,
    expires_at: DateTime<Utc>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<MembershipRow> for Membership {
    fn from(row: MembershipRow) -> Self {
        Self {
            id: MembershipId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            creator_id: UserId::from_uuid(row.creator_id),
            product_id: ProductId::from_uuid(row.product_id),
            order_id: OrderId::from_uuid(row.order_id),
            expires_at: row.expires_at,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PayoutRow {
    id: Uuid,
    creator_id: Uuid,
    amount: Decimal,
    status: String,
    destination: Json<PayoutDestination>,
    admin_notes: Option<String>,
    requested_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<PayoutRow> for Payout {
    type Error = SettlementError;

    fn try_from(row: PayoutRow) -> Result<Self> {
        Ok(Self {
            id: PayoutId::from_uuid(row.id),
            creator_id: UserId::from_uuid(row.creator_id),
            amount: row.amount,
            status: row.status.parse()?,
            destination: row.destination.0,
            admin_notes: row.admin_notes,
            requested_at: row.requested_at,
            processed_at: row.processed_at,
        })
    }
}

fn collect<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = SettlementError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn duration_column(product: &Product) -> Result<Option<i32>> {
    product
        .membership_duration_days
        .map(i32::try_from)
        .transpose()
        .map_err(|e| SettlementError::InvalidInput(format!("duration too large: {e}")))
}

// ============================================================================
// Products
// ============================================================================

#[async_trait]
impl ProductStore for PgStore {
    async fn insert(&self, product: &Product) -> Result<()> {
        sqlx::query(
            "INSERT INTO products (id, creator_id, title, description, price, product_type, \
             membership_duration_days, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(product.id.as_uuid())
        .bind(product.creator_id.as_uuid())
        .bind(&product.title)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.product_type.as_str())
        .bind(duration_column(product)?)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: ProductId) -> Result<Option<Product>> {
        sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Product::try_from)
            .transpose()
    }

    async fn list_by_creator(&self, creator_id: UserId) -> Result<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(
            "SELECT * FROM products WHERE creator_id = $1 ORDER BY created_at",
        )
        .bind(creator_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn update(&self, product: &Product) -> Result<()> {
        let result = sqlx::query(
            "UPDATE products SET title = $2, description = $3, price = $4, product_type = $5, \
             membership_duration_days = $6, is_active = $7, updated_at = $8 WHERE id = $1",
        )
        .bind(product.id.as_uuid())
        .bind(&product.title)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.product_type.as_str())
        .bind(duration_column(product)?)
        .bind(product.is_active)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;
        missing("product", product.id, result.rows_affected())
    }

    async fn delete(&self, id: ProductId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// Orders
// ============================================================================

#[async_trait]
impl OrderStore for PgStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        sqlx::query(
            "INSERT INTO orders (id, creator_id, customer_email, customer_name, customer_id, \
             product_id, amount, platform_fee, creator_earnings, order_type, status, payment_id, \
             payment_data, created_at, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
        )
        .bind(order.id.as_uuid())
        .bind(order.creator_id.as_uuid())
        .bind(&order.customer_email)
        .bind(&order.customer_name)
        .bind(order.customer_id.map(UserId::as_uuid))
        .bind(order.product_id.map(ProductId::as_uuid))
        .bind(order.amount)
        .bind(order.platform_fee)
        .bind(order.creator_earnings)
        .bind(order.order_type.as_str())
        .bind(order.status.as_str())
        .bind(&order.payment_id)
        .bind(&order.payment_data)
        .bind(order.created_at)
        .bind(order.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn list_by_creator(&self, creator_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE creator_id = $1 ORDER BY created_at",
        )
        .bind(creator_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn list_by_customer(&self, customer_email: &str) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE lower(customer_email) = lower($1) ORDER BY created_at",
        )
        .bind(customer_email.trim())
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    /// Fee columns are never rewritten
    async fn save(&self, order: &Order) -> Result<()> {
        let result = sqlx::query(
            "UPDATE orders SET status = $2, payment_id = $3, payment_data = $4, \
             completed_at = $5, customer_name = $6 WHERE id = $1",
        )
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(&order.payment_id)
        .bind(&order.payment_data)
        .bind(order.completed_at)
        .bind(&order.customer_name)
        .execute(&self.pool)
        .await?;
        missing("order", order.id, result.rows_affected())
    }
}

// ============================================================================
// Memberships
// ============================================================================

async fn link_order(tx: &mut Transaction<'_, Postgres>, membership: &Membership) -> Result<()> {
    sqlx::query(
        "INSERT INTO membership_orders (order_id, membership_id) VALUES ($1, $2) \
         ON CONFLICT (order_id) DO NOTHING",
    )
    .bind(membership.order_id.as_uuid())
    .bind(membership.id.as_uuid())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl MembershipStore for PgStore {
    async fn insert(&self, membership: &Membership) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO memberships (id, user_id, creator_id, product_id, order_id, expires_at, \
             is_active, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(membership.id.as_uuid())
        .bind(membership.user_id.as_uuid())
        .bind(membership.creator_id.as_uuid())
        .bind(membership.product_id.as_uuid())
        .bind(membership.order_id.as_uuid())
        .bind(membership.expires_at)
        .bind(membership.is_active)
        .bind(membership.created_at)
        .execute(&mut *tx)
        .await?;
        link_order(&mut tx, membership).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: MembershipId) -> Result<Option<Membership>> {
        let row = sqlx::query_as::<_, MembershipRow>("SELECT * FROM memberships WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Membership::from))
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Membership>> {
        let rows = sqlx::query_as::<_, MembershipRow>(
            "SELECT * FROM memberships WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Membership::from).collect())
    }

    async fn list_by_creator(&self, creator_id: UserId) -> Result<Vec<Membership>> {
        let rows = sqlx::query_as::<_, MembershipRow>(
            "SELECT * FROM memberships WHERE creator_id = $1 ORDER BY created_at",
        )
        .bind(creator_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Membership::from).collect())
    }

    async fn list_flagged_active(&self) -> Result<Vec<Membership>> {
        let rows = sqlx::query_as::<_, MembershipRow>(
            "SELECT * FROM memberships WHERE is_active ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Membership::from).collect())
    }

    async fn find_by_order(&self, order_id: OrderId) -> Result<Option<Membership>> {
        let row = sqlx::query_as::<_, MembershipRow>(
            "SELECT m.* FROM memberships m \
             JOIN membership_orders l ON l.membership_id = m.id WHERE l.order_id = $1",
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Membership::from))
    }

    async fn find_for_subscriber(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<Membership>> {
        let row = sqlx::query_as::<_, MembershipRow>(
            "SELECT * FROM memberships WHERE user_id = $1 AND product_id = $2 \
             ORDER BY expires_at DESC LIMIT 1",
        )
        .bind(user_id.as_uuid())
        .bind(product_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Membership::from))
    }

    async fn save(&self, membership: &Membership) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE memberships SET order_id = $2, expires_at = $3, is_active = $4 WHERE id = $1",
        )
        .bind(membership.id.as_uuid())
        .bind(membership.order_id.as_uuid())
        .bind(membership.expires_at)
        .bind(membership.is_active)
        .execute(&mut *tx)
        .await?;
        missing("membership", membership.id, result.rows_affected())?;
        link_order(&mut tx, membership).await?;
        tx.commit().await?;
        Ok(())
    }
}

// ============================================================================
// Payouts
// ============================================================================

#[async_trait]
impl PayoutStore for PgStore {
    async fn insert(&self, payout: &Payout) -> Result<()> {
        sqlx::query(
            "INSERT INTO payouts (id, creator_id, amount, status, destination, admin_notes, \
             requested_at, processed_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(payout.id.as_uuid())
        .bind(payout.creator_id.as_uuid())
        .bind(payout.amount)
        .bind(payout.status.as_str())
        .bind(Json(&payout.destination))
        .bind(&payout.admin_notes)
        .bind(payout.requested_at)
        .bind(payout.processed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: PayoutId) -> Result<Option<Payout>> {
        sqlx::query_as::<_, PayoutRow>("SELECT * FROM payouts WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Payout::try_from)
            .transpose()
    }

    async fn list_by_creator(&self, creator_id: UserId) -> Result<Vec<Payout>> {
        let rows = sqlx::query_as::<_, PayoutRow>(
            "SELECT * FROM payouts WHERE creator_id = $1 ORDER BY requested_at",
        )
        .bind(creator_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn list_by_status(&self, status: PayoutStatus) -> Result<Vec<Payout>> {
        let rows = sqlx::query_as::<_, PayoutRow>(
            "SELECT * FROM payouts WHERE status = $1 ORDER BY requested_at",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn save(&self, payout: &Payout) -> Result<()> {
        let result = sqlx::query(
            "UPDATE payouts SET status = $2, admin_notes = $3, processed_at = $4 WHERE id = $1",
        )
        .bind(payout.id.as_uuid())
        .bind(payout.status.as_str())
        .bind(&payout.admin_notes)
        .bind(payout.processed_at)
        .execute(&self.pool)
        .await?;
        missing("payout", payout.id, result.rows_affected())
    }
}
