//! # Billing Rules
//!
//! Pure pieces of bill creation and the bill state machine.
//!
//! ## Totals Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  lines ──► subtotal = Σ unit_price × qty                                │
//! │                │                                                        │
//! │                ▼                                                        │
//! │         discount terms (none | % | fixed, clamped to subtotal)          │
//! │                │                                                        │
//! │                ▼                                                        │
//! │         loyalty discount = points × point value                         │
//! │         (must fit in what is left, else RedemptionExceedsBill)          │
//! │                │                                                        │
//! │                ▼                                                        │
//! │         taxable ──► tax (bps, half up) ──► total = taxable + tax        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Loyalty points are later earned on `total`, which already reflects the
//! redemption discount.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{
    BillState, BillStatus, DiscountTerms, LineItem, LineItemKind, RefundDetails, SalesType,
    TaxRate, VoidDetails, Witness,
};
use crate::validation::{validate_refund_amount, validate_witness};

// =============================================================================
// Classification
// =============================================================================

/// Classifies a bill by its line kinds.
///
/// All-service → Service, all-product → Product, anything else → Mixed.
/// An empty slice is rejected by validation before this is reached and
/// classifies as Mixed.
pub fn classify_sales_type(items: &[LineItem]) -> SalesType {
    let has_service = items.iter().any(|i| i.kind == LineItemKind::Service);
    let has_product = items.iter().any(|i| i.kind == LineItemKind::Product);

    match (has_service, has_product) {
        (true, false) => SalesType::Service,
        (false, true) => SalesType::Product,
        _ => SalesType::Mixed,
    }
}

// =============================================================================
// Totals
// =============================================================================

/// Amounts persisted on a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BillTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub loyalty_discount: Money,
    pub tax: Money,
    pub total: Money,
}

/// Computes the discount a set of terms grants on `subtotal`.
pub fn discount_amount(subtotal: Money, terms: DiscountTerms) -> Money {
    match terms {
        DiscountTerms::None => Money::zero(),
        DiscountTerms::Percentage { bps } => subtotal.portion_bps(bps.min(10_000)),
        DiscountTerms::Fixed { amount_cents } => {
            Money::from_cents(amount_cents.max(0)).min(subtotal)
        }
    }
}

/// Computes all bill totals.
///
/// ## Errors
/// - `RedemptionExceedsBill` when the loyalty discount is larger than the
///   subtotal left after the counter discount
/// - `Validation` when an amount overflows
pub fn compute_totals(
    items: &[LineItem],
    terms: DiscountTerms,
    loyalty_discount: Money,
    tax_rate: TaxRate,
) -> CoreResult<BillTotals> {
    let subtotal = Money::checked_sum(items.iter().map(LineItem::line_total))
        .ok_or_else(|| amount_overflow("subtotal"))?;
    let discount = discount_amount(subtotal, terms);
    let payable = subtotal.saturating_sub(discount);

    if loyalty_discount > payable {
        return Err(CoreError::RedemptionExceedsBill {
            discount_cents: loyalty_discount.cents(),
            payable_cents: payable.cents(),
        });
    }

    let taxable = payable - loyalty_discount;
    let tax = taxable.calculate_tax(tax_rate);
    let total = taxable
        .checked_add(tax)
        .ok_or_else(|| amount_overflow("total"))?;

    Ok(BillTotals {
        subtotal,
        discount,
        loyalty_discount,
        tax,
        total,
    })
}

fn amount_overflow(field: &str) -> CoreError {
    ValidationError::OutOfRange {
        field: field.to_string(),
        min: 0,
        max: i64::MAX,
    }
    .into()
}

// =============================================================================
// Bill Numbers
// =============================================================================

/// Formats a bill number: `YYYYMMDD-BRANCH-NNNN`.
///
/// The branch code is the first four alphanumeric characters of the branch
/// id, upper-cased, padded with `X`.
///
/// ```rust
/// use chrono::NaiveDate;
/// use salon_core::billing::format_bill_number;
///
/// let day = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
/// assert_eq!(format_bill_number(day, "makati-01", 7), "20260314-MAKA-0007");
/// ```
pub fn format_bill_number(date: NaiveDate, branch_id: &str, sequence: u32) -> String {
    format!(
        "{}-{}-{:04}",
        date.format("%Y%m%d"),
        branch_code(branch_id),
        sequence
    )
}

/// Prefix shared by all bill numbers of one branch on one day.
pub fn bill_number_prefix(date: NaiveDate, branch_id: &str) -> String {
    format!("{}-{}-", date.format("%Y%m%d"), branch_code(branch_id))
}

fn branch_code(branch_id: &str) -> String {
    let mut code: String = branch_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(4)
        .collect::<String>()
        .to_ascii_uppercase();
    while code.len() < 4 {
        code.push('X');
    }
    code
}

// =============================================================================
// State Machine
// =============================================================================

/// Request to move a Paid bill into a terminal state.
#[derive(Debug, Clone)]
pub enum BillTransition {
    Refund {
        amount: Option<Money>,
        reason: String,
        approved_by: String,
    },
    Void {
        reason: String,
        approved_by: String,
        witness: Option<Witness>,
    },
}

impl BillState {
    /// Applies a transition, returning the new state.
    ///
    /// ## Transition Table
    /// | From     | Refund   | Void     |
    /// |----------|----------|----------|
    /// | Paid     | Refunded | Voided   |
    /// | Refunded | error    | error    |
    /// | Voided   | error    | error    |
    ///
    /// A void without a valid witness fails with `WitnessRequired` before
    /// the current state is consulted.
    pub fn apply(
        &self,
        bill_id: &str,
        bill_total: Money,
        transition: BillTransition,
        at: DateTime<Utc>,
    ) -> CoreResult<BillState> {
        match transition {
            BillTransition::Refund {
                amount,
                reason,
                approved_by,
            } => {
                self.ensure_paid(bill_id)?;
                let amount = amount.unwrap_or(bill_total);
                validate_refund_amount(amount, bill_total)?;
                Ok(BillState::Refunded(RefundDetails {
                    amount_cents: amount.cents(),
                    reason,
                    approved_by,
                    refunded_at: at,
                }))
            }
            BillTransition::Void {
                reason,
                approved_by,
                witness,
            } => {
                let witness = validate_witness(witness.as_ref(), &approved_by)?.clone();
                self.ensure_paid(bill_id)?;
                Ok(BillState::Voided(VoidDetails {
                    reason,
                    approved_by,
                    witness,
                    voided_at: at,
                }))
            }
        }
    }

    fn ensure_paid(&self, bill_id: &str) -> CoreResult<()> {
        match self.status() {
            BillStatus::Paid => Ok(()),
            status => Err(CoreError::AlreadyFinalized {
                bill_id: bill_id.to_string(),
                status,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LineItemKind;

    fn line(kind: LineItemKind, price: i64, qty: i64) -> LineItem {
        LineItem {
            id: format!("line-{price}-{qty}"),
            kind,
            catalog_id: "cat-1".to_string(),
            name: "Item".to_string(),
            unit_price_cents: price,
            quantity: qty,
            line_total_cents: price * qty,
            staff_id: (kind == LineItemKind::Service).then(|| "staff-1".to_string()),
        }
    }

    fn witness() -> Witness {
        Witness {
            id: "mgr-2".to_string(),
            email: "mgr2@salon.test".to_string(),
            name: "Second Manager".to_string(),
        }
    }

    #[test]
    fn test_classify_sales_type() {
        let service = line(LineItemKind::Service, 50_000, 1);
        let product = line(LineItemKind::Product, 12_000, 2);

        assert_eq!(classify_sales_type(&[service.clone()]), SalesType::Service);
        assert_eq!(classify_sales_type(&[product.clone()]), SalesType::Product);
        assert_eq!(classify_sales_type(&[service, product]), SalesType::Mixed);
    }

    #[test]
    fn test_compute_totals_with_percentage_discount_and_tax() {
        let items = vec![
            line(LineItemKind::Service, 50_000, 1),
            line(LineItemKind::Product, 25_000, 2),
        ];
        let totals = compute_totals(
            &items,
            DiscountTerms::Percentage { bps: 1000 },
            Money::from_cents(5_000),
            TaxRate::from_bps(1200),
        )
        .unwrap();

        assert_eq!(totals.subtotal.cents(), 100_000);
        assert_eq!(totals.discount.cents(), 10_000);
        assert_eq!(totals.loyalty_discount.cents(), 5_000);
        // taxable 85,000 × 12% = 10,200
        assert_eq!(totals.tax.cents(), 10_200);
        assert_eq!(totals.total.cents(), 95_200);
    }

    #[test]
    fn test_fixed_discount_is_clamped() {
        let items = vec![line(LineItemKind::Product, 1_000, 1)];
        let totals = compute_totals(
            &items,
            DiscountTerms::Fixed {
                amount_cents: 5_000,
            },
            Money::zero(),
            TaxRate::zero(),
        )
        .unwrap();
        assert_eq!(totals.discount.cents(), 1_000);
        assert_eq!(totals.total, Money::zero());
    }

    #[test]
    fn test_loyalty_discount_cannot_exceed_payable() {
        let items = vec![line(LineItemKind::Product, 1_000, 1)];
        let err = compute_totals(
            &items,
            DiscountTerms::None,
            Money::from_cents(1_001),
            TaxRate::zero(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::RedemptionExceedsBill { .. }));
    }

    #[test]
    fn test_subtotal_overflow_is_an_error() {
        let mut huge = line(LineItemKind::Product, 1, 1);
        huge.unit_price_cents = i64::MAX;
        huge.line_total_cents = i64::MAX;
        let items = vec![huge, line(LineItemKind::Product, 1, 1)];

        let err = compute_totals(&items, DiscountTerms::None, Money::zero(), TaxRate::zero())
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_free_bill_refunds_zero() {
        let state = BillState::Paid
            .apply(
                "b-1",
                Money::zero(),
                BillTransition::Refund {
                    amount: None,
                    reason: "complimentary trim".to_string(),
                    approved_by: "mgr-1".to_string(),
                },
                Utc::now(),
            )
            .unwrap();
        assert!(matches!(state, BillState::Refunded(ref d) if d.amount_cents == 0));
    }

    #[test]
    fn test_bill_number_format() {
        let day = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        assert_eq!(format_bill_number(day, "b1", 42), "20260105-B1XX-0042");
        assert_eq!(bill_number_prefix(day, "qc-main"), "20260105-QCMA-");
    }

    #[test]
    fn test_refund_from_paid_defaults_to_full_total() {
        let now = Utc::now();
        let state = BillState::Paid
            .apply(
                "b-1",
                Money::from_cents(9_000),
                BillTransition::Refund {
                    amount: None,
                    reason: "allergic reaction".to_string(),
                    approved_by: "mgr-1".to_string(),
                },
                now,
            )
            .unwrap();

        match state {
            BillState::Refunded(details) => {
                assert_eq!(details.amount_cents, 9_000);
                assert_eq!(details.approved_by, "mgr-1");
            }
            other => panic!("expected refunded, got {other:?}"),
        }
    }

    #[test]
    fn test_terminal_states_reject_every_transition() {
        let now = Utc::now();
        let refunded = BillState::Paid
            .apply(
                "b-1",
                Money::from_cents(100),
                BillTransition::Refund {
                    amount: None,
                    reason: "r".to_string(),
                    approved_by: "mgr-1".to_string(),
                },
                now,
            )
            .unwrap();

        let again = refunded.apply(
            "b-1",
            Money::from_cents(100),
            BillTransition::Refund {
                amount: None,
                reason: "r".to_string(),
                approved_by: "mgr-1".to_string(),
            },
            now,
        );
        assert!(matches!(
            again,
            Err(CoreError::AlreadyFinalized {
                status: BillStatus::Refunded,
                ..
            })
        ));

        let void = refunded.apply(
            "b-1",
            Money::from_cents(100),
            BillTransition::Void {
                reason: "r".to_string(),
                approved_by: "mgr-1".to_string(),
                witness: Some(witness()),
            },
            now,
        );
        assert!(matches!(void, Err(CoreError::AlreadyFinalized { .. })));
    }

    #[test]
    fn test_void_requires_witness_before_state_check() {
        let now = Utc::now();
        let voided = BillState::Paid
            .apply(
                "b-1",
                Money::from_cents(100),
                BillTransition::Void {
                    reason: "keyed twice".to_string(),
                    approved_by: "mgr-1".to_string(),
                    witness: Some(witness()),
                },
                now,
            )
            .unwrap();
        assert_eq!(voided.status(), BillStatus::Voided);

        let err = voided
            .apply(
                "b-1",
                Money::from_cents(100),
                BillTransition::Void {
                    reason: "keyed twice".to_string(),
                    approved_by: "mgr-1".to_string(),
                    witness: None,
                },
                now,
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::WitnessRequired { .. }));
    }

    #[test]
    fn test_refund_amount_bounds() {
        let now = Utc::now();
        let err = BillState::Paid
            .apply(
                "b-1",
                Money::from_cents(100),
                BillTransition::Refund {
                    amount: Some(Money::from_cents(101)),
                    reason: "r".to_string(),
                    approved_by: "mgr-1".to_string(),
                },
                now,
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
