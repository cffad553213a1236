//! # Domain Types
//!
//! Records owned or read by the transaction core.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Bill       │   │   StockBatch    │   │ LoyaltyAccount  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  items[]        │   │  usage_type     │   │  (client,branch)│       │
//! │  │  sales_type     │   │  remaining_qty  │   │  balance        │       │
//! │  │  state          │   │  received_date  │   │  version        │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  ReferralCode   │   │ ReferralRecord  │   │  AuditLogEntry  │       │
//! │  │  (client,branch)│   │ (new,branch)    │   │  append-only    │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every entity is keyed by a UUID v4 string; bills also carry a
//! human-readable `bill_number`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate in basis points (1200 = 12%).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

// =============================================================================
// People
// =============================================================================

/// The staff member performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Actor {
    pub id: String,
    pub name: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Actor {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Second authorized identity that verifies a void.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Witness {
    pub id: String,
    pub email: String,
    pub name: String,
}

// =============================================================================
// Bill Enums
// =============================================================================

/// Kind of a bill line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LineItemKind {
    Service,
    Product,
}

/// Classification of a whole bill, derived from its lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SalesType {
    Service,
    Product,
    Mixed,
}

/// Flat status of a bill.
///
/// The data attached to each status lives on [`BillState`]; this enum is the
/// column value and the filter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    Paid,
    Refunded,
    Voided,
}

impl BillStatus {
    /// Refunded and Voided are terminal.
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, BillStatus::Paid)
    }
}

impl fmt::Display for BillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BillStatus::Paid => write!(f, "paid"),
            BillStatus::Refunded => write!(f, "refunded"),
            BillStatus::Voided => write!(f, "voided"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    EWallet,
    BankTransfer,
}

/// How the bill-level discount is computed from the subtotal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscountTerms {
    #[default]
    None,
    /// Percentage of the subtotal in basis points.
    Percentage { bps: u32 },
    /// Fixed amount in cents, clamped to the subtotal.
    Fixed { amount_cents: i64 },
}

/// Promotion applied at the counter. Recorded for reporting only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Promotion {
    pub code: Option<String>,
    pub name: String,
    pub description: Option<String>,
}

// =============================================================================
// Line Item
// =============================================================================

/// A line on a bill. Immutable once the bill is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineItem {
    pub id: String,
    pub kind: LineItemKind,
    /// Service or product id in the catalog.
    pub catalog_id: String,
    /// Catalog name at time of sale (frozen).
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
    /// unit_price × quantity.
    pub line_total_cents: i64,
    /// Stylist or therapist who performed a service line.
    pub staff_id: Option<String>,
}

impl LineItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

// =============================================================================
// Bill State
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RefundDetails {
    pub amount_cents: i64,
    pub reason: String,
    pub approved_by: String,
    #[ts(as = "String")]
    pub refunded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VoidDetails {
    pub reason: String,
    pub approved_by: String,
    pub witness: Witness,
    #[ts(as = "String")]
    pub voided_at: DateTime<Utc>,
}

/// Lifecycle state of a bill with the metadata each terminal state carries.
///
/// ```text
/// Paid ──refund──► Refunded (terminal)
///   │
///   └────void────► Voided   (terminal)
/// ```
///
/// Transitions are implemented in [`crate::billing`]; nothing leaves a
/// terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BillState {
    Paid,
    Refunded(RefundDetails),
    Voided(VoidDetails),
}

impl BillState {
    pub fn status(&self) -> BillStatus {
        match self {
            BillState::Paid => BillStatus::Paid,
            BillState::Refunded(_) => BillStatus::Refunded,
            BillState::Voided(_) => BillStatus::Voided,
        }
    }
}

// =============================================================================
// Bill
// =============================================================================

/// One completed point-of-sale record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Bill {
    pub id: String,
    /// Human-readable number: YYYYMMDD-BRANCH-NNNN.
    pub bill_number: String,
    pub branch_id: String,
    /// None for walk-in guests.
    pub client_id: Option<String>,
    pub items: Vec<LineItem>,
    pub sales_type: SalesType,
    pub subtotal_cents: i64,
    pub discount_terms: DiscountTerms,
    pub discount_cents: i64,
    pub loyalty_points_used: i64,
    pub loyalty_discount_cents: i64,
    pub tax_rate_bps: u32,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub payment_method: PaymentMethod,
    pub promotion: Option<Promotion>,
    pub notes: Option<String>,
    pub state: BillState,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Bill {
    #[inline]
    pub fn status(&self) -> BillStatus {
        self.state.status()
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    pub fn product_lines(&self) -> impl Iterator<Item = &LineItem> {
        self.items
            .iter()
            .filter(|item| item.kind == LineItemKind::Product)
    }

    pub fn service_lines(&self) -> impl Iterator<Item = &LineItem> {
        self.items
            .iter()
            .filter(|item| item.kind == LineItemKind::Service)
    }
}

// =============================================================================
// Stock
// =============================================================================

/// Partition of a product's stock by how it leaves the shelf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum UsageType {
    /// Sold over the counter.
    #[serde(rename = "otc")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "otc"))]
    Otc,
    /// Consumed while performing a service.
    #[serde(rename = "salon-use")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "salon-use"))]
    SalonUse,
}

impl fmt::Display for UsageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsageType::Otc => write!(f, "otc"),
            UsageType::SalonUse => write!(f, "salon-use"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Active,
    Depleted,
}

/// A costed lot of one product received at one branch.
///
/// Created by the inventory-receiving process; the core only decrements
/// `remaining_quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockBatch {
    pub id: String,
    pub branch_id: String,
    pub product_id: String,
    pub usage_type: UsageType,
    pub received_quantity: i64,
    /// 0 ≤ remaining_quantity ≤ received_quantity.
    pub remaining_quantity: i64,
    pub unit_cost_cents: i64,
    /// FIFO ordering key.
    #[ts(as = "String")]
    pub received_date: DateTime<Utc>,
    pub status: BatchStatus,
    /// Optimistic-concurrency token, bumped on every write.
    pub version: i64,
}

impl StockBatch {
    #[inline]
    pub fn is_available(&self) -> bool {
        self.status == BatchStatus::Active && self.remaining_quantity > 0
    }
}

/// Why stock left a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementReason {
    TransactionSale,
    ServiceUse,
}

impl MovementReason {
    /// Usage partition a deduction with this reason draws from.
    pub const fn usage_type(&self) -> UsageType {
        match self {
            MovementReason::TransactionSale => UsageType::Otc,
            MovementReason::ServiceUse => UsageType::SalonUse,
        }
    }
}

impl fmt::Display for MovementReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MovementReason::TransactionSale => write!(f, "Transaction Sale"),
            MovementReason::ServiceUse => write!(f, "Service Use"),
        }
    }
}

/// Stock-movement note written for every batch a deduction touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockMovement {
    pub id: String,
    pub batch_id: String,
    pub branch_id: String,
    pub product_id: String,
    pub usage_type: UsageType,
    pub quantity: i64,
    pub reason: MovementReason,
    pub bill_id: Option<String>,
    pub actor_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// How much of a product one unit of a service consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ServiceProductUsage {
    pub service_id: String,
    pub product_id: String,
    pub quantity_per_service: i64,
}

// =============================================================================
// Loyalty
// =============================================================================

/// Branch-scoped point balance of one client.
///
/// A cached projection of the loyalty log: `balance` always equals the sum
/// of the log entries for the same (client, branch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LoyaltyAccount {
    pub client_id: String,
    pub branch_id: String,
    pub balance: i64,
    pub version: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LoyaltyEntryType {
    Earned,
    Redeemed,
}

impl fmt::Display for LoyaltyEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoyaltyEntryType::Earned => write!(f, "earned"),
            LoyaltyEntryType::Redeemed => write!(f, "redeemed"),
        }
    }
}

/// Append-only loyalty history row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LoyaltyLogEntry {
    pub id: String,
    pub client_id: String,
    pub branch_id: String,
    pub entry_type: LoyaltyEntryType,
    /// Signed: positive for earned, negative for redeemed.
    pub points: i64,
    pub bill_id: Option<String>,
    pub resulting_balance: i64,
    pub note: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Referral
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ReferralCode {
    pub code: String,
    pub client_id: String,
    pub branch_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A credited referral. At most one per (new_client_id, branch_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ReferralRecord {
    pub id: String,
    pub new_client_id: String,
    pub referrer_id: String,
    pub branch_id: String,
    pub code: String,
    pub referrer_points: i64,
    pub new_client_points: i64,
    pub processed_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Audit
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    BillCreated,
    StockDeducted,
    LoyaltyRedeemed,
    LoyaltyEarned,
    ReferralCodeIssued,
    ReferralChecked,
    ReferralProcessed,
    BillRefunded,
    BillVoided,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Degraded,
    Failed,
}

/// Immutable compliance record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct AuditLogEntry {
    pub id: String,
    pub bill_id: Option<String>,
    pub action: AuditAction,
    pub outcome: AuditOutcome,
    pub performed_by: String,
    pub branch_id: String,
    /// JSON document describing the target and result.
    pub details: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}
