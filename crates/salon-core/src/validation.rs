//! # Validation Module
//!
//! Input checks run before anything is written.
//!
//! ## Where Validation Happens
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  createBill / refundBill / voidBill request                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  THIS MODULE: shape of the input (lines, ids, witness, amounts)         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  salon-billing: rules needing storage (balance, bill status, codes)     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  SQLite: NOT NULL, UNIQUE, CHECK constraints                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use salon_core::validation::{validate_quantity, validate_required};
//!
//! validate_required("branch_id", "makati-01").unwrap();
//! validate_quantity(5).unwrap();
//! assert!(validate_quantity(1000).is_err());
//! ```

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{DiscountTerms, LineItem, LineItemKind, Witness};
use crate::{MAX_BILL_LINES, MAX_LINE_QUANTITY, MAX_POINTS, MAX_UNIT_PRICE_CENTS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Rejects empty or whitespace-only values.
pub fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::required(field));
    }
    Ok(())
}

/// Validates a free-text reason (refund, void).
///
/// ## Rules
/// - Must not be empty
/// - At most 500 characters
pub fn validate_reason(reason: &str) -> ValidationResult<()> {
    validate_required("reason", reason)?;

    if reason.trim().chars().count() > 500 {
        return Err(ValidationError::TooLong {
            field: "reason".to_string(),
            max: 500,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a unit price in cents. Zero is allowed (complimentary service).
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if !(0..=MAX_UNIT_PRICE_CENTS).contains(&cents) {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: MAX_UNIT_PRICE_CENTS,
        });
    }

    Ok(())
}

/// Validates a tax rate in basis points (0% to 100%).
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10_000 {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate".to_string(),
            min: 0,
            max: 10_000,
        });
    }

    Ok(())
}

pub fn validate_discount_terms(terms: &DiscountTerms) -> ValidationResult<()> {
    match *terms {
        DiscountTerms::None => Ok(()),
        DiscountTerms::Percentage { bps } if bps > 10_000 => Err(ValidationError::OutOfRange {
            field: "discount".to_string(),
            min: 0,
            max: 10_000,
        }),
        DiscountTerms::Fixed { amount_cents } if amount_cents < 0 => {
            Err(ValidationError::OutOfRange {
                field: "discount".to_string(),
                min: 0,
                max: i64::MAX,
            })
        }
        _ => Ok(()),
    }
}

/// Validates a number of points being earned or redeemed.
pub fn validate_points(points: i64) -> ValidationResult<()> {
    if !(0..=MAX_POINTS).contains(&points) {
        return Err(ValidationError::OutOfRange {
            field: "points".to_string(),
            min: 0,
            max: MAX_POINTS,
        });
    }
    Ok(())
}

/// Validates a refund amount against the bill total.
///
/// ## Rules
/// - Must be positive, except on a bill that totals zero
/// - Must not exceed the bill total
pub fn validate_refund_amount(amount: Money, bill_total: Money) -> ValidationResult<()> {
    if bill_total.is_zero() && amount.is_zero() {
        return Ok(());
    }

    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "refund amount".to_string(),
        });
    }

    if amount > bill_total {
        return Err(ValidationError::OutOfRange {
            field: "refund amount".to_string(),
            min: 1,
            max: bill_total.cents(),
        });
    }

    Ok(())
}

// =============================================================================
// Bill Lines
// =============================================================================

/// Validates one bill line.
///
/// Service lines must name the staff member who performed them.
pub fn validate_line_item(item: &LineItem) -> ValidationResult<()> {
    validate_required("catalog_id", &item.catalog_id)?;
    validate_required("name", &item.name)?;
    validate_quantity(item.quantity)?;
    validate_price_cents(item.unit_price_cents)?;

    if item.kind == LineItemKind::Service
        && item.staff_id.as_deref().map_or(true, |s| s.trim().is_empty())
    {
        return Err(ValidationError::required("staff_id"));
    }

    Ok(())
}

/// Validates the full set of lines on a bill.
///
/// ## Rules
/// - At least one line
/// - At most MAX_BILL_LINES (100)
/// - Every line valid
pub fn validate_bill_lines(items: &[LineItem]) -> ValidationResult<()> {
    if items.is_empty() {
        return Err(ValidationError::required("items"));
    }

    if items.len() > MAX_BILL_LINES {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_BILL_LINES as i64,
        });
    }

    items.iter().try_for_each(validate_line_item)
}

// =============================================================================
// Witness
// =============================================================================

/// Checks that a void carries a complete witness distinct from the approver.
///
/// Returns the witness on success so callers can keep it.
pub fn validate_witness<'a>(
    witness: Option<&'a Witness>,
    approver_id: &str,
) -> CoreResult<&'a Witness> {
    let witness = witness.ok_or_else(|| CoreError::WitnessRequired {
        reason: "no witness supplied".to_string(),
    })?;

    let missing = [
        ("id", &witness.id),
        ("email", &witness.email),
        ("name", &witness.name),
    ]
    .into_iter()
    .find(|(_, value)| value.trim().is_empty());

    if let Some((field, _)) = missing {
        return Err(CoreError::WitnessRequired {
            reason: format!("witness {field} is empty"),
        });
    }

    if witness.id == approver_id {
        return Err(CoreError::WitnessRequired {
            reason: "witness must differ from the approver".to_string(),
        });
    }

    Ok(witness)
}

// =============================================================================
// Unit Tests
// =============================================================================
