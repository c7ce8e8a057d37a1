//! Analytics Aggregator
//!
//! Read-only rollups over orders, products and memberships, recomputed on
//! every call. Calendar months are UTC and orders are bucketed by
//! `created_at`. Revenue sums `creator_earnings`; average order value uses
//! the gross `amount`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{Result, SettlementError};
use crate::ledger::{growth_percent, round2};
use crate::model::{Order, OrderId, OrderStatus, Product, ProductId, UserId};
use crate::store::Stores;

pub const DEFAULT_TOP_PRODUCTS: usize = 5;
pub const DEFAULT_TREND_MONTHS: u32 = 6;
const MAX_TREND_MONTHS: u32 = 36;
const RECENT_LIMIT: usize = 10;

/// First instant of the UTC calendar month `months_back` months before `now`
pub(crate) fn month_start(now: DateTime<Utc>, months_back: u32) -> DateTime<Utc> {
    now.date_naive()
        .with_day(1)
        .and_then(|d| d.checked_sub_months(Months::new(months_back)))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map_or(now, |d| d.and_utc())
}

fn ratio_percent(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        Decimal::ZERO
    } else {
        round2(part / whole * Decimal::ONE_HUNDRED)
    }
}

fn earnings(orders: &[&Order]) -> Decimal {
    orders.iter().map(|o| o.creator_earnings).sum()
}

fn mean(total: Decimal, count: usize) -> Decimal {
    if count == 0 {
        Decimal::ZERO
    } else {
        round2(total / Decimal::from(count))
    }
}

/// Lifetime, this-month and last-month figures with month-over-month growth
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodSummary<T> {
    pub total: T,
    pub this_month: T,
    pub last_month: T,
    /// Percent; zero when last month is zero
    pub growth: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopProduct {
    pub id: ProductId,
    pub title: String,
    pub sales: usize,
    pub revenue: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub total: usize,
    pub active: usize,
    pub top_selling: Vec<TopProduct>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerSummary {
    /// Distinct customer emails over all orders
    pub total: usize,
    pub returning: usize,
    /// Distinct emails with any order this month, repeat buyers included
    pub new_this_month: usize,
    /// Distinct emails whose first order falls in this month
    pub first_time_this_month: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub order_id: OrderId,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub amount: Decimal,
    pub status: OrderStatus,
}

/// Creator dashboard
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorAnalytics {
    pub revenue: PeriodSummary<Decimal>,
    pub orders: PeriodSummary<usize>,
    pub products: ProductSummary,
    pub customers: CustomerSummary,
    /// Completed orders per distinct customer, as a percentage
    pub conversion_rate: Decimal,
    pub avg_order_value: Decimal,
    pub recent_activity: Vec<ActivityEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyTrend {
    /// e.g. "Mar 2024"
    pub month: String,
    pub revenue: Decimal,
    pub orders: usize,
    pub customers: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSales {
    pub total: usize,
    pub revenue: Decimal,
    pub avg_price: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductAnalytics {
    pub product: Product,
    pub sales: ProductSales,
    /// Order count per status
    pub conversion: BTreeMap<String, usize>,
    pub recent_sales: Vec<Order>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorStats {
    pub total_orders: usize,
    pub total_products: usize,
    pub total_members: usize,
}

pub struct AnalyticsAggregator {
    stores: Stores,
    clock: Arc<dyn Clock>,
}

impl AnalyticsAggregator {
    pub fn new(stores: Stores, clock: Arc<dyn Clock>) -> Self {
        Self { stores, clock }
    }

    pub async fn creator_analytics(&self, creator_id: UserId) -> Result<CreatorAnalytics> {
        let now = self.clock.now();
        let this_start = month_start(now, 0);
        let last_start = month_start(now, 1);

        let orders = self.stores.orders.list_by_creator(creator_id).await?;
        let products = self.stores.products.list_by_creator(creator_id).await?;

        let in_this_month = |o: &&Order| o.created_at >= this_start;
        let in_last_month = |o: &&Order| o.created_at >= last_start && o.created_at < this_start;
        let completed: Vec<&Order> = orders.iter().filter(|o| o.is_completed()).collect();

        let this_month: Vec<&Order> = completed.iter().copied().filter(in_this_month).collect();
        let last_month: Vec<&Order> = completed.iter().copied().filter(in_last_month).collect();

        let revenue_this = earnings(&this_month);
        let revenue_last = earnings(&last_month);
        let revenue = PeriodSummary {
            total: earnings(&completed),
            this_month: revenue_this,
            last_month: revenue_last,
            growth: growth_percent(revenue_this, revenue_last),
        };
        let order_counts = PeriodSummary {
            total: completed.len(),
            this_month: this_month.len(),
            last_month: last_month.len(),
            growth: growth_percent(
                Decimal::from(this_month.len()),
                Decimal::from(last_month.len()),
            ),
        };

        let customers = Self::customers(&orders, this_start);
        let gross: Decimal = completed.iter().map(|o| o.amount).sum();

        tracing::debug!(
            creator_id = %creator_id,
            orders = orders.len(),
            completed = completed.len(),
            "Computed creator analytics"
        );

        Ok(CreatorAnalytics {
            revenue,
            orders: order_counts,
            products: ProductSummary {
                total: products.len(),
                active: products.iter().filter(|p| p.is_active).count(),
                top_selling: self.top_selling(&completed, &products, DEFAULT_TOP_PRODUCTS).await?,
            },
            conversion_rate: if completed.is_empty() {
                Decimal::ZERO
            } else {
                ratio_percent(Decimal::from(completed.len()), Decimal::from(customers.total))
            },
            customers,
            avg_order_value: mean(gross, completed.len()),
            recent_activity: Self::recent(&orders)
                .into_iter()
                .map(|o| ActivityEntry {
                    order_id: o.id,
                    timestamp: o.created_at,
                    description: format!(
                        "Order from {} - {}",
                        o.customer_name.as_deref().unwrap_or(&o.customer_email),
                        o.order_type
                    ),
                    amount: o.amount,
                    status: o.status,
                })
                .collect(),
        })
    }

    /// Completed-order rollups for the last `months` calendar months, oldest first
    pub async fn monthly_trends(&self, creator_id: UserId, months: u32) -> Result<Vec<MonthlyTrend>> {
        let now = self.clock.now();
        let orders = self.stores.orders.list_by_creator(creator_id).await?;

        let trends = (0..months.min(MAX_TREND_MONTHS))
            .rev()
            .map(|back| {
                let start = month_start(now, back);
                let end = start.checked_add_months(Months::new(1)).unwrap_or(now);
                let bucket: Vec<&Order> = orders
                    .iter()
                    .filter(|o| o.is_completed() && o.created_at >= start && o.created_at < end)
                    .collect();

                MonthlyTrend {
                    month: start.format("%b %Y").to_string(),
                    revenue: bucket.iter().map(|o| o.creator_earnings).sum(),
                    orders: bucket.len(),
                    customers: bucket
                        .iter()
                        .map(|o| o.customer_email.to_lowercase())
                        .collect::<HashSet<_>>()
                        .len(),
                }
            })
            .collect();
        Ok(trends)
    }

    pub async fn product_analytics(&self, product_id: ProductId) -> Result<ProductAnalytics> {
        let product = self
            .stores
            .products
            .get(product_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("product", product_id))?;

        let orders: Vec<Order> = self
            .stores
            .orders
            .list_by_creator(product.creator_id)
            .await?
            .into_iter()
            .filter(|o| o.product_id == Some(product_id))
            .collect();

        let completed: Vec<&Order> = orders.iter().filter(|o| o.is_completed()).collect();
        let revenue: Decimal = completed.iter().map(|o| o.creator_earnings).sum();

        let mut conversion = BTreeMap::new();
        for order in &orders {
            *conversion.entry(order.status.as_str().to_string()).or_insert(0) += 1;
        }

        Ok(ProductAnalytics {
            sales: ProductSales {
                total: completed.len(),
                revenue,
                avg_price: mean(revenue, completed.len()),
            },
            conversion,
            recent_sales: Self::recent(&orders).into_iter().cloned().collect(),
            product,
        })
    }

    /// Headline counts for the creator profile
    pub async fn creator_stats(&self, creator_id: UserId) -> Result<CreatorStats> {
        let now = self.clock.now();
        let orders = self.stores.orders.list_by_creator(creator_id).await?;
        let products = self.stores.products.list_by_creator(creator_id).await?;
        let memberships = self.stores.memberships.list_by_creator(creator_id).await?;

        Ok(CreatorStats {
            total_orders: orders.iter().filter(|o| o.is_completed()).count(),
            total_products: products.iter().filter(|p| p.is_active).count(),
            total_members: memberships.iter().filter(|m| m.is_entitled_at(now)).count(),
        })
    }

    async fn top_selling(
        &self,
        completed: &[&Order],
        products: &[Product],
        limit: usize,
    ) -> Result<Vec<TopProduct>> {
        let mut sales: HashMap<ProductId, (usize, Decimal)> = HashMap::new();
        for order in completed {
            if let Some(product_id) = order.product_id {
                let entry = sales.entry(product_id).or_default();
                entry.0 += 1;
                entry.1 += order.creator_earnings;
            }
        }

        let mut ranked: Vec<_> = sales.into_iter().collect();
        ranked.sort_by(|(a_id, a), (b_id, b)| {
            b.0.cmp(&a.0).then(b.1.cmp(&a.1)).then(a_id.cmp(b_id))
        });
        ranked.truncate(limit);

        let mut top = Vec::with_capacity(ranked.len());
        for (id, (count, revenue)) in ranked {
            let title = match products.iter().find(|p| p.id == id) {
                Some(p) => p.title.clone(),
                None => self
                    .stores
                    .products
                    .get(id)
                    .await?
                    .map_or_else(|| "Unknown Product".to_string(), |p| p.title),
            };
            top.push(TopProduct {
                id,
                title,
                sales: count,
                revenue,
            });
        }
        Ok(top)
    }

    fn customers(orders: &[Order], this_start: DateTime<Utc>) -> CustomerSummary {
        let mut first_seen: HashMap<String, DateTime<Utc>> = HashMap::new();
        for order in orders {
            let seen = first_seen
                .entry(order.customer_email.to_lowercase())
                .or_insert(order.created_at);
            *seen = (*seen).min(order.created_at);
        }

        let this_month: HashSet<String> = orders
            .iter()
            .filter(|o| o.created_at >= this_start)
            .map(|o| o.customer_email.to_lowercase())
            .collect();

        CustomerSummary {
            total: first_seen.len(),
            returning: first_seen.len() - this_month.len(),
            new_this_month: this_month.len(),
            first_time_this_month: first_seen.values().filter(|&&t| t >= this_start).count(),
        }
    }

    fn recent(orders: &[Order]) -> Vec<&Order> {
        let mut sorted: Vec<&Order> = orders.iter().collect();
        sorted.sort_by_key(|o| std::cmp::Reverse(o.created_at));
        sorted.truncate(RECENT_LIMIT);
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::ledger;
    use crate::model::{
        Membership, MembershipId, NewOrder, NewProduct, OrderType, PaymentMeta, ProductType,
    };
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    struct Fixture {
        stores: Stores,
        clock: Arc<FixedClock>,
        analytics: AnalyticsAggregator,
        creator: UserId,
    }

    fn fixture() -> Fixture {
        let stores = Stores::in_memory();
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap(),
        ));
        Fixture {
            analytics: AnalyticsAggregator::new(stores.clone(), clock.clone()),
            stores,
            clock,
            creator: UserId::new(),
        }
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap()
    }

    impl Fixture {
        async fn product(&self, title: &str) -> Product {
            let product = Product::create(
                NewProduct {
                    creator_id: self.creator,
                    title: title.into(),
                    description: None,
                    price: dec!(100),
                    product_type: ProductType::Product,
                    membership_duration_days: None,
                },
                at(2024, 1, 1),
            )
            .unwrap();
            self.stores.products.insert(&product).await.unwrap();
            product
        }

        async fn order(
            &self,
            email: &str,
            amount: Decimal,
            product: Option<ProductId>,
            created: DateTime<Utc>,
            status: OrderStatus,
        ) -> Order {
            let new = NewOrder {
                creator_id: self.creator,
                product_id: product,
                amount,
                customer_email: email.into(),
                customer_name: None,
                customer_id: None,
                order_type: if product.is_some() {
                    OrderType::Product
                } else {
                    OrderType::Donation
                },
            };
            let mut order = Order::create(new, ledger::split(amount, dec!(10)).unwrap(), created);
            if status != OrderStatus::Pending {
                order.transition(status, PaymentMeta::default(), created).unwrap();
            }
            self.stores.orders.insert(&order).await.unwrap();
            order
        }
    }

    #[test]
    fn test_month_start() {
        let now = at(2024, 3, 20);
        assert_eq!(month_start(now, 0), Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(month_start(now, 1), Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(month_start(now, 3), Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_growth_without_last_month() {
        let f = fixture();
        f.order("a@example.com", dec!(500), None, at(2024, 3, 5), OrderStatus::Completed)
            .await;

        let report = f.analytics.creator_analytics(f.creator).await.unwrap();
        assert_eq!(report.revenue.last_month, Decimal::ZERO);
        assert_eq!(report.revenue.this_month, dec!(450));
        assert_eq!(report.revenue.growth, Decimal::ZERO);
        assert_eq!(report.orders.growth, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_revenue_and_order_rollups() {
        let f = fixture();
        f.order("a@example.com", dec!(200), None, at(2024, 2, 10), OrderStatus::Completed)
            .await;
        f.order("b@example.com", dec!(100), None, at(2024, 3, 2), OrderStatus::Completed)
            .await;
        f.order("c@example.com", dec!(200), None, at(2024, 3, 3), OrderStatus::Completed)
            .await;
        f.order("d@example.com", dec!(999), None, at(2024, 3, 4), OrderStatus::Failed)
            .await;
        f.order("e@example.com", dec!(50), None, at(2024, 3, 5), OrderStatus::Pending)
            .await;

        let report = f.analytics.creator_analytics(f.creator).await.unwrap();
        assert_eq!(report.revenue.total, dec!(450));
        assert_eq!(report.revenue.this_month, dec!(270));
        assert_eq!(report.revenue.last_month, dec!(180));
        assert_eq!(report.revenue.growth, dec!(50));

        assert_eq!(report.orders.total, 3);
        assert_eq!(report.orders.this_month, 2);
        assert_eq!(report.orders.last_month, 1);
        assert_eq!(report.orders.growth, dec!(100));

        assert_eq!(report.avg_order_value, dec!(166.67));
        assert_eq!(report.conversion_rate, dec!(60));
        assert_eq!(report.recent_activity.len(), 5);
        assert_eq!(report.recent_activity[0].timestamp, at(2024, 3, 5));
    }

    #[tokio::test]
    async fn test_new_this_month_counts_returning_buyers() {
        let f = fixture();
        f.order("loyal@example.com", dec!(100), None, at(2024, 1, 15), OrderStatus::Completed)
            .await;
        f.order("LOYAL@example.com", dec!(100), None, at(2024, 3, 1), OrderStatus::Completed)
            .await;
        f.order("fresh@example.com", dec!(100), None, at(2024, 3, 2), OrderStatus::Completed)
            .await;

        let customers = f.analytics.creator_analytics(f.creator).await.unwrap().customers;
        assert_eq!(customers.total, 2);
        // The loyal customer ordered this month, so the reference count calls them new
        assert_eq!(customers.new_this_month, 2);
        assert_eq!(customers.first_time_this_month, 1);
        assert_eq!(customers.returning, 0);
    }

    #[tokio::test]
    async fn test_top_selling() {
        let f = fixture();
        let ebook = f.product("E-book").await;
        let preset = f.product("Preset pack").await;
        for day in 1..=3 {
            f.order("x@example.com", dec!(100), Some(ebook.id), at(2024, 3, day), OrderStatus::Completed)
                .await;
        }
        f.order("y@example.com", dec!(100), Some(preset.id), at(2024, 3, 4), OrderStatus::Completed)
            .await;
        f.order("z@example.com", dec!(100), Some(preset.id), at(2024, 3, 5), OrderStatus::Pending)
            .await;

        let top = f.analytics.creator_analytics(f.creator).await.unwrap().products.top_selling;
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].title, "E-book");
        assert_eq!(top[0].sales, 3);
        assert_eq!(top[0].revenue, dec!(270));
        assert_eq!(top[1].sales, 1);
    }

    #[tokio::test]
    async fn test_monthly_trends() {
        let f = fixture();
        f.order("a@example.com", dec!(100), None, at(2024, 1, 31), OrderStatus::Completed)
            .await;
        f.order("a@example.com", dec!(100), None, at(2024, 3, 1), OrderStatus::Completed)
            .await;
        f.order("b@example.com", dec!(300), None, at(2024, 3, 19), OrderStatus::Completed)
            .await;
        f.order("c@example.com", dec!(300), None, at(2024, 3, 19), OrderStatus::Failed)
            .await;

        let trends = f.analytics.monthly_trends(f.creator, 3).await.unwrap();
        let labels: Vec<_> = trends.iter().map(|t| t.month.as_str()).collect();
        assert_eq!(labels, ["Jan 2024", "Feb 2024", "Mar 2024"]);
        assert_eq!(trends[0].revenue, dec!(90));
        assert_eq!(trends[1].orders, 0);
        assert_eq!(trends[2].orders, 2);
        assert_eq!(trends[2].customers, 2);
        assert_eq!(trends[2].revenue, dec!(360));
    }

    #[tokio::test]
    async fn test_product_analytics() {
        let f = fixture();
        let product = f.product("Course").await;
        f.order("a@example.com", dec!(100), Some(product.id), at(2024, 3, 1), OrderStatus::Completed)
            .await;
        f.order("b@example.com", dec!(100), Some(product.id), at(2024, 3, 2), OrderStatus::Failed)
            .await;
        f.order("c@example.com", dec!(100), None, at(2024, 3, 3), OrderStatus::Completed)
            .await;

        let report = f.analytics.product_analytics(product.id).await.unwrap();
        assert_eq!(report.sales.total, 1);
        assert_eq!(report.sales.revenue, dec!(90));
        assert_eq!(report.sales.avg_price, dec!(90));
        assert_eq!(report.conversion.get("completed"), Some(&1));
        assert_eq!(report.conversion.get("failed"), Some(&1));
        assert_eq!(report.recent_sales.len(), 2);

        assert!(matches!(
            f.analytics.product_analytics(ProductId::new()).await,
            Err(SettlementError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_creator_stats_uses_expiry() {
        let f = fixture();
        f.product("Zine").await;
        f.order("a@example.com", dec!(100), None, at(2024, 3, 1), OrderStatus::Completed)
            .await;

        let now = f.clock.now();
        for expires_at in [now + Duration::days(5), now - Duration::days(1)] {
            let membership = Membership {
                id: MembershipId::new(),
                user_id: UserId::new(),
                creator_id: f.creator,
                product_id: ProductId::new(),
                order_id: OrderId::new(),
                expires_at,
                is_active: true,
                created_at: now - Duration::days(30),
            };
            f.stores.memberships.insert(&membership).await.unwrap();
        }

        let stats = f.analytics.creator_stats(f.creator).await.unwrap();
        assert_eq!(stats.total_orders, 1);
        assert_eq!(stats.total_products, 1);
        assert_eq!(stats.total_members, 1);
    }
}
