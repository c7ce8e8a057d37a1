//! Domain Models
//!
//! Entities of the settlement subsystem: products, orders, memberships and
//! payouts, plus the status machines that govern them.
//! All monetary values are `rust_decimal::Decimal` in INR with 2-decimal precision.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SettlementError};
use crate::ledger::{self, FeeSplit};

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            pub const fn as_uuid(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = SettlementError;

            fn from_str(s: &str) -> Result<Self> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|e| SettlementError::InvalidInput(format!("bad id '{s}': {e}")))
            }
        }
    };
}

uuid_id!(
    /// Creator, customer or admin account
    UserId
);
uuid_id!(ProductId);
uuid_id!(OrderId);
uuid_id!(MembershipId);
uuid_id!(PayoutId);

fn parse_enum<T>(kind: &str, s: &str, table: &[(&str, T)]) -> Result<T>
where
    T: Copy,
{
    let wanted = s.trim().to_lowercase();
    table
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, v)| *v)
        .ok_or_else(|| SettlementError::InvalidInput(format!("unknown {kind}: {s}")))
}

// ============================================================================
// Actors
// ============================================================================

/// Account roles
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Creator,
    Admin,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Creator => "creator",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self> {
        parse_enum("role", s, &[("creator", Self::Creator), ("admin", Self::Admin)])
    }
}

/// A caller whose identity was verified by the authentication layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub const fn creator(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Creator,
        }
    }

    pub const fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    pub const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}

// ============================================================================
// Products
// ============================================================================

/// What a product sells
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    Product,
    Membership,
}

impl ProductType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Membership => "membership",
        }
    }
}

impl FromStr for ProductType {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self> {
        parse_enum(
            "product type",
            s,
            &[("product", Self::Product), ("membership", Self::Membership)],
        )
    }
}

/// Input for creating or replacing a product
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewProduct {
    pub creator_id: UserId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(rename = "type")]
    pub product_type: ProductType,
    /// Days of access granted; present iff `product_type` is membership
    #[serde(default)]
    pub membership_duration_days: Option<u32>,
}

impl NewProduct {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(SettlementError::InvalidInput("product title is empty".into()));
        }
        ledger::validate_amount(self.price)?;

        match (self.product_type, self.membership_duration_days) {
            (ProductType::Membership, Some(days)) if days > 0 => Ok(()),
            (ProductType::Membership, _) => Err(SettlementError::InvalidInput(
                "membership products need a positive duration".into(),
            )),
            (ProductType::Product, None) => Ok(()),
            (ProductType::Product, Some(_)) => Err(SettlementError::InvalidInput(
                "only membership products carry a duration".into(),
            )),
        }
    }
}

/// A product or membership tier sold by a creator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub creator_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(rename = "type")]
    pub product_type: ProductType,
    pub membership_duration_days: Option<u32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn create(new: NewProduct, now: DateTime<Utc>) -> Result<Self> {
        new.validate()?;
        Ok(Self {
            id: ProductId::new(),
            creator_id: new.creator_id,
            title: new.title,
            description: new.description,
            price: new.price,
            product_type: new.product_type,
            membership_duration_days: new.membership_duration_days,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Access period granted per purchase or renewal
    pub fn membership_period(&self) -> Option<Duration> {
        match self.product_type {
            ProductType::Membership => self
                .membership_duration_days
                .map(|days| Duration::days(i64::from(days))),
            ProductType::Product => None,
        }
    }
}

// ============================================================================
// Orders
// ============================================================================

/// What an order pays for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Donation,
    Product,
    Membership,
}

impl OrderType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Donation => "donation",
            Self::Product => "product",
            Self::Membership => "membership",
        }
    }

    /// The product type an order of this kind must reference
    pub const fn expected_product_type(self) -> Option<ProductType> {
        match self {
            Self::Donation => None,
            Self::Product => Some(ProductType::Product),
            Self::Membership => Some(ProductType::Membership),
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self> {
        parse_enum(
            "order type",
            s,
            &[
                ("donation", Self::Donation),
                ("product", Self::Product),
                ("membership", Self::Membership),
            ],
        )
    }
}

/// Order lifecycle
///
/// ```text
/// pending ──▶ completed ──▶ refunded
///    │
///    └──────▶ failed
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [Self; 4] = [Self::Pending, Self::Completed, Self::Failed, Self::Refunded];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Completed | Self::Failed) | (Self::Completed, Self::Refunded)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self> {
        parse_enum(
            "order status",
            s,
            &[
                ("pending", Self::Pending),
                ("completed", Self::Completed),
                ("failed", Self::Failed),
                ("refunded", Self::Refunded),
            ],
        )
    }
}

/// Checkout submission
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewOrder {
    pub creator_id: UserId,
    /// `None` for donations
    #[serde(default)]
    pub product_id: Option<ProductId>,
    pub amount: Decimal,
    pub customer_email: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    /// Subscriber account; required for membership orders
    #[serde(default)]
    pub customer_id: Option<UserId>,
    #[serde(rename = "type")]
    pub order_type: OrderType,
}

impl NewOrder {
    pub fn validate(&self) -> Result<()> {
        ledger::validate_amount(self.amount)?;

        let email = self.customer_email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(SettlementError::InvalidInput(format!(
                "invalid customer email: {}",
                self.customer_email
            )));
        }

        match (self.order_type, self.product_id) {
            (OrderType::Donation, Some(_)) => Err(SettlementError::InvalidInput(
                "donations do not reference a product".into(),
            )),
            (OrderType::Product | OrderType::Membership, None) => Err(
                SettlementError::InvalidInput(format!("{} orders need a product", self.order_type)),
            ),
            (OrderType::Membership, Some(_)) if self.customer_id.is_none() => Err(
                SettlementError::InvalidInput("membership orders need a subscriber account".into()),
            ),
            _ => Ok(()),
        }
    }
}

/// Payment processor data attached on a status change
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PaymentMeta {
    pub payment_id: Option<String>,
    pub payment_data: Option<serde_json::Value>,
}

impl PaymentMeta {
    pub fn reference(payment_id: impl Into<String>) -> Self {
        Self {
            payment_id: Some(payment_id.into()),
            payment_data: None,
        }
    }
}

/// A checkout order with its frozen fee split
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub creator_id: UserId,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub customer_id: Option<UserId>,
    pub product_id: Option<ProductId>,
    pub amount: Decimal,
    pub platform_fee: Decimal,
    pub creator_earnings: Decimal,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub payment_id: Option<String>,
    pub payment_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    /// Set iff `status == completed`
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Build a pending order; the split is computed once here and never again
    pub fn create(new: NewOrder, split: FeeSplit, now: DateTime<Utc>) -> Self {
        debug_assert_eq!(split.platform_fee + split.creator_earnings, new.amount);
        Self {
            id: OrderId::new(),
            creator_id: new.creator_id,
            customer_email: new.customer_email.trim().to_string(),
            customer_name: new.customer_name,
            customer_id: new.customer_id,
            product_id: new.product_id,
            amount: new.amount,
            platform_fee: split.platform_fee,
            creator_earnings: split.creator_earnings,
            order_type: new.order_type,
            status: OrderStatus::Pending,
            payment_id: None,
            payment_data: None,
            created_at: now,
            completed_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == OrderStatus::Completed
    }

    /// Move to `next`, enforcing the transition table
    pub fn transition(&mut self, next: OrderStatus, meta: PaymentMeta, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(SettlementError::transition("order", self.status, next));
        }

        self.status = next;
        self.completed_at = (next == OrderStatus::Completed).then_some(now);
        if meta.payment_id.is_some() {
            self.payment_id = meta.payment_id;
        }
        if meta.payment_data.is_some() {
            self.payment_data = meta.payment_data;
        }
        Ok(())
    }
}

// ============================================================================
// Memberships
// ============================================================================

/// A subscriber's time-bounded entitlement to a creator's membership product
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: MembershipId,
    pub user_id: UserId,
    pub creator_id: UserId,
    pub product_id: ProductId,
    /// The order that created or last renewed this membership
    pub order_id: OrderId,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Membership {
    /// Both the flag and the clock must agree
    pub fn is_entitled_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }

    /// Extend from the current expiry, never from now
    pub fn extend(&mut self, period: Duration) {
        self.expires_at += period;
    }
}

// ============================================================================
// Payouts
// ============================================================================

/// Payout lifecycle
///
/// ```text
/// pending ──▶ processing ──▶ completed
///    │             │
///    ├─────────────┴───────▶ rejected
///    └─────────────────────▶ completed
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Rejected,
}

impl PayoutStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }

    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing | Self::Completed | Self::Rejected)
                | (Self::Processing, Self::Completed | Self::Rejected)
        )
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayoutStatus {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self> {
        parse_enum(
            "payout status",
            s,
            &[
                ("pending", Self::Pending),
                ("processing", Self::Processing),
                ("completed", Self::Completed),
                ("rejected", Self::Rejected),
            ],
        )
    }
}

/// Where a payout is sent
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum PayoutDestination {
    Bank {
        account_number: String,
        ifsc: String,
        account_holder_name: String,
        bank_name: String,
    },
    Upi {
        upi_id: String,
    },
}

/// Payment details as submitted with a payout request
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PaymentDetails {
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub ifsc: Option<String>,
    #[serde(default)]
    pub account_holder_name: Option<String>,
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub upi: Option<String>,
}

fn filled(field: Option<&String>) -> Option<String> {
    field
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl TryFrom<PaymentDetails> for PayoutDestination {
    type Error = SettlementError;

    /// Exactly one of a full bank set or a UPI id
    fn try_from(details: PaymentDetails) -> Result<Self> {
        let bank = [
            filled(details.account_number.as_ref()),
            filled(details.ifsc.as_ref()),
            filled(details.account_holder_name.as_ref()),
            filled(details.bank_name.as_ref()),
        ];
        let upi = filled(details.upi.as_ref());
        let bank_fields = bank.iter().filter(|f| f.is_some()).count();

        match (bank, upi) {
            (_, Some(_)) if bank_fields > 0 => Err(SettlementError::InvalidPaymentDetails(
                "provide bank details or a UPI id, not both".into(),
            )),
            (_, Some(upi_id)) => {
                if !upi_id.contains('@') {
                    return Err(SettlementError::InvalidPaymentDetails(format!(
                        "malformed UPI id: {upi_id}"
                    )));
                }
                Ok(Self::Upi { upi_id })
            }
            ([Some(account_number), Some(ifsc), Some(account_holder_name), Some(bank_name)], None) => {
                Ok(Self::Bank {
                    account_number,
                    ifsc: ifsc.to_uppercase(),
                    account_holder_name,
                    bank_name,
                })
            }
            (_, None) if bank_fields > 0 => Err(SettlementError::InvalidPaymentDetails(
                "bank details need account number, IFSC, holder name and bank name".into(),
            )),
            (_, None) => Err(SettlementError::InvalidPaymentDetails(
                "no bank details or UPI id given".into(),
            )),
        }
    }
}

/// A creator-initiated withdrawal request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub id: PayoutId,
    pub creator_id: UserId,
    pub amount: Decimal,
    pub status: PayoutStatus,
    pub destination: PayoutDestination,
    pub admin_notes: Option<String>,
    pub requested_at: DateTime<Utc>,
    /// Set when the payout reaches completed or rejected
    pub processed_at: Option<DateTime<Utc>>,
}

impl Payout {
    pub fn request(
        creator_id: UserId,
        amount: Decimal,
        destination: PayoutDestination,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PayoutId::new(),
            creator_id,
            amount,
            status: PayoutStatus::Pending,
            destination,
            admin_notes: None,
            requested_at: now,
            processed_at: None,
        }
    }

    pub fn transition(
        &mut self,
        next: PayoutStatus,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(SettlementError::transition("payout", self.status, next));
        }

        self.status = next;
        if next.is_terminal() {
            self.processed_at = Some(now);
        }
        if notes.is_some() {
            self.admin_notes = notes;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn donation(amount: Decimal) -> NewOrder {
        NewOrder {
            creator_id: UserId::new(),
            product_id: None,
            amount,
            customer_email: "fan@example.com".into(),
            customer_name: Some("Fan".into()),
            customer_id: None,
            order_type: OrderType::Donation,
        }
    }

    #[test]
    fn test_order_transition_table() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Failed));
        assert!(Completed.can_transition_to(Refunded));
        assert!(!Completed.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Refunded.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Refunded));
    }

    #[test]
    fn test_completed_at_tracks_status() {
        let now = Utc::now();
        let split = ledger::split(dec!(250), dec!(10)).unwrap();
        let mut order = Order::create(donation(dec!(250)), split, now);
        assert!(order.completed_at.is_none());

        order
            .transition(OrderStatus::Completed, PaymentMeta::reference("ref_1"), now)
            .unwrap();
        assert_eq!(order.completed_at, Some(now));
        assert_eq!(order.payment_id.as_deref(), Some("ref_1"));

        order
            .transition(OrderStatus::Refunded, PaymentMeta::default(), now)
            .unwrap();
        assert!(order.completed_at.is_none());
        assert_eq!(order.payment_id.as_deref(), Some("ref_1"));
    }

    #[test]
    fn test_failed_order_has_no_completion() {
        let now = Utc::now();
        let split = ledger::split(dec!(99.99), dec!(10)).unwrap();
        let mut order = Order::create(donation(dec!(99.99)), split, now);
        order
            .transition(OrderStatus::Failed, PaymentMeta::default(), now)
            .unwrap();
        assert!(order.completed_at.is_none());

        let err = order
            .transition(OrderStatus::Completed, PaymentMeta::default(), now)
            .unwrap_err();
        assert!(matches!(err, SettlementError::InvalidTransition { .. }));
    }

    #[test]
    fn test_new_order_validation() {
        assert!(donation(dec!(50)).validate().is_ok());
        assert!(donation(dec!(0)).validate().is_err());
        assert!(donation(dec!(10.005)).validate().is_err());

        let mut bad_email = donation(dec!(50));
        bad_email.customer_email = "nobody".into();
        assert!(bad_email.validate().is_err());

        let mut membership = donation(dec!(50));
        membership.order_type = OrderType::Membership;
        membership.product_id = Some(ProductId::new());
        assert!(membership.validate().is_err());
        membership.customer_id = Some(UserId::new());
        assert!(membership.validate().is_ok());
    }

    #[test]
    fn test_product_duration_invariant() {
        let mut new = NewProduct {
            creator_id: UserId::new(),
            title: "Gold tier".into(),
            description: None,
            price: dec!(299),
            product_type: ProductType::Membership,
            membership_duration_days: None,
        };
        assert!(new.validate().is_err());

        new.membership_duration_days = Some(30);
        let product = Product::create(new.clone(), Utc::now()).unwrap();
        assert_eq!(product.membership_period(), Some(Duration::days(30)));

        new.product_type = ProductType::Product;
        assert!(new.validate().is_err());
    }

    #[test]
    fn test_payment_details_exclusive() {
        let upi = PaymentDetails {
            upi: Some("creator@okbank".into()),
            ..Default::default()
        };
        assert_eq!(
            PayoutDestination::try_from(upi).unwrap(),
            PayoutDestination::Upi {
                upi_id: "creator@okbank".into()
            }
        );

        let bank = PaymentDetails {
            account_number: Some("001122334455".into()),
            ifsc: Some("hdfc0001234".into()),
            account_holder_name: Some("A Creator".into()),
            bank_name: Some("HDFC".into()),
            upi: Some("  ".into()),
        };
        match PayoutDestination::try_from(bank.clone()).unwrap() {
            PayoutDestination::Bank { ifsc, .. } => assert_eq!(ifsc, "HDFC0001234"),
            PayoutDestination::Upi { .. } => panic!("expected bank"),
        }

        let both = PaymentDetails {
            upi: Some("creator@okbank".into()),
            ..bank.clone()
        };
        assert!(PayoutDestination::try_from(both).is_err());

        let partial = PaymentDetails {
            bank_name: None,
            upi: None,
            ..bank
        };
        assert!(PayoutDestination::try_from(partial).is_err());
        assert!(PayoutDestination::try_from(PaymentDetails::default()).is_err());
    }

    #[test]
    fn test_payout_processed_at() {
        let now = Utc::now();
        let mut payout = Payout::request(
            UserId::new(),
            dec!(500),
            PayoutDestination::Upi {
                upi_id: "c@upi".into(),
            },
            now,
        );

        payout
            .transition(PayoutStatus::Processing, Some("queued".into()), now)
            .unwrap();
        assert!(payout.processed_at.is_none());

        payout.transition(PayoutStatus::Completed, None, now).unwrap();
        assert_eq!(payout.processed_at, Some(now));
        assert_eq!(payout.admin_notes.as_deref(), Some("queued"));

        assert!(payout.transition(PayoutStatus::Rejected, None, now).is_err());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Completed".parse::<OrderStatus>().unwrap(), OrderStatus::Completed);
        assert_eq!("processing".parse::<PayoutStatus>().unwrap(), PayoutStatus::Processing);
        assert!("paid".parse::<OrderStatus>().is_err());
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
    }
}
