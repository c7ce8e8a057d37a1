//! # cashure-core
//!
//! Order settlement and payout accounting for the Cashure creator platform.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Services                              │
//! │  ┌────────────┐ ┌──────────────┐ ┌────────────┐ ┌──────────┐ │
//! │  │   Orders   │─│ Memberships  │ │  Payouts   │ │Analytics │ │
//! │  └────────────┘ └──────────────┘ └────────────┘ └──────────┘ │
//! │        │          Subscriptions        │                      │
//! │  ┌─────▼─────────────────────────────────▼──────────────────┐ │
//! │  │       Stores (memory | postgres)   Notifier   Clock      │ │
//! │  └──────────────────────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//!                 ▲ ledger: fee split, rounding
//! ```
//!
//! Every order carries a fee split computed once by [`ledger::split`]; the
//! balance a creator can withdraw is derived from completed orders and
//! committed payouts, never stored.

pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod model;
pub mod notify;
pub mod service;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::PlatformConfig;
pub use error::{Result, SettlementError};
pub use ledger::FeeSplit;
pub use model::{
    Actor, Membership, MembershipId, NewOrder, NewProduct, Order, OrderId, OrderStatus,
    OrderType, PaymentDetails, PaymentMeta, Payout, PayoutDestination, PayoutId, PayoutStatus,
    Product, ProductId, ProductType, Role, UserId,
};
pub use notify::{Contact, LogNotifier, MemoryDirectory, Notification, Notifier, UserDirectory};
pub use service::{
    AnalyticsAggregator, MembershipService, OrderService, PayoutEngine, SubscriptionManager,
};
pub use store::Stores;
