//! # Error Types
//!
//! Domain-specific error types for salon-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  salon-core errors (this file)                                         │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  salon-db errors                                                       │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  salon-billing errors                                                  │
//! │  └── BillingError     - What collaborators see                         │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → BillingError ← DbError            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::types::BillStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations that can be decided without storage.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The bill already left the Paid state.
    ///
    /// ## When This Occurs
    /// - Refunding a bill that was already refunded or voided
    /// - Voiding a bill that was already refunded or voided
    #[error("Bill {bill_id} is already {status}")]
    AlreadyFinalized { bill_id: String, status: BillStatus },

    /// Void attempted without a distinct, fully identified witness.
    #[error("A witness distinct from the approver is required: {reason}")]
    WitnessRequired { reason: String },

    /// Redemption asks for more points than the branch balance holds.
    #[error("Insufficient points: balance {balance}, requested {requested}")]
    InsufficientPoints { balance: i64, requested: i64 },

    /// The referrer tried to use their own code.
    #[error("Client {client_id} cannot use their own referral code")]
    SelfReferral { client_id: String },

    /// The code was issued for a different branch than the one supplied.
    #[error("Referral code belongs to branch {code_branch}, not {requested_branch}")]
    BranchMismatch {
        code_branch: String,
        requested_branch: String,
    },

    /// Loyalty discount would exceed what is left of the bill.
    #[error("Loyalty discount {discount_cents} exceeds payable amount {payable_cents}")]
    RedemptionExceedsBill {
        discount_cents: i64,
        payable_cents: i64,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid referral code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// The operation is not available for this kind of input.
    #[error("{field}: {reason}")]
    NotAllowed { field: String, reason: String },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    pub fn not_allowed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::NotAllowed {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
