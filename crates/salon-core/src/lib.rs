//! # salon-core: Pure Business Logic for the Salon Transaction Core
//!
//! This crate holds every rule of the bill-processing core that can be
//! decided without touching storage.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Salon POS Core Architecture                        │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │        Collaborators (front desk UI, CRM triggers, reports)     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ createBill / refundBill / voidBill     │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               salon-billing (saga + services)                   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ salon-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐  │   │
//! │  │   │  types  │ │ billing │ │  fifo   │ │ loyalty │ │referral │  │   │
//! │  │   │  Bill   │ │ totals  │ │  plan   │ │ points  │ │  codes  │  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 salon-db (Database Layer)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records (Bill, LineItem, StockBatch, LoyaltyAccount, ...)
//! - [`money`] - Integer money (no floating point)
//! - [`billing`] - Sales-type classification, totals, bill state machine
//! - [`fifo`] - Oldest-first deduction planning over cost batches
//! - [`loyalty`] - Earn/redeem point arithmetic
//! - [`referral`] - Referral code formatting
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use salon_core::loyalty::{points_earned, EarnRate};
//! use salon_core::money::Money;
//!
//! // 10,000.00 spent at 0.01 points per unit
//! let points = points_earned(Money::from_cents(1_000_000), EarnRate::from_bps(100));
//! assert_eq!(points, 100);
//! ```

pub mod billing;
pub mod error;
pub mod fifo;
pub mod loyalty;
pub mod money;
pub mod referral;
pub mod types;
pub mod validation;

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

/// Maximum line items allowed on a single bill.
pub const MAX_BILL_LINES: usize = 100;

/// Maximum quantity on a single line.
///
/// Catches keying mistakes at the front desk (1000 instead of 10).
pub const MAX_LINE_QUANTITY: i64 = 999;

/// Highest unit price accepted on a line (100,000,000.00).
pub const MAX_UNIT_PRICE_CENTS: i64 = 10_000_000_000;

/// Most points a single earn, credit or redemption may move.
pub const MAX_POINTS: i64 = 1_000_000_000;
