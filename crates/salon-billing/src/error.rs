//! # Billing Error Types
//!
//! What collaborators see when an operation is refused or cannot complete.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Billing Error Categories                           │
//! │                                                                         │
//! │  ┌──────────────────────────┐  ┌──────────────────────────────────┐    │
//! │  │  Precondition            │  │  Lookup / Input                  │    │
//! │  │  (nothing was written)   │  │                                  │    │
//! │  │                          │  │  BillNotFound                    │    │
//! │  │  AlreadyFinalized        │  │  Validation                      │    │
//! │  │  WitnessRequired         │  └──────────────────────────────────┘    │
//! │  │  InsufficientPoints      │                                          │
//! │  │  InvalidCode             │  ┌──────────────────────────────────┐    │
//! │  │  SelfReferral            │  │  Infrastructure                  │    │
//! │  │  AlreadyProcessed        │  │                                  │    │
//! │  │  BranchMismatch          │  │  Contention  CodeSpaceExhausted  │    │
//! │  └──────────────────────────┘  │  Database    Config              │    │
//! │                                └──────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Failures of saga side effects after a bill is committed never surface
//! here; they are reported on the receipt.

use thiserror::Error;

use salon_core::{BillStatus, CoreError, ValidationError};
use salon_db::DbError;

/// Result type alias for billing operations.
pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, Error)]
pub enum BillingError {
    // =========================================================================
    // Precondition Errors
    // =========================================================================
    #[error("Bill {bill_id} is already {status}")]
    AlreadyFinalized { bill_id: String, status: BillStatus },

    #[error("A witness distinct from the approver is required: {reason}")]
    WitnessRequired { reason: String },

    #[error("Insufficient points: balance {balance}, requested {requested}")]
    InsufficientPoints { balance: i64, requested: i64 },

    #[error("Referral code '{code}' does not exist")]
    InvalidCode { code: String },

    #[error("Client {client_id} cannot use their own referral code")]
    SelfReferral { client_id: String },

    #[error("Client {new_client_id} was already referred at branch {branch_id}")]
    AlreadyProcessed {
        new_client_id: String,
        branch_id: String,
    },

    #[error("Referral code belongs to branch {code_branch}, not {requested_branch}")]
    BranchMismatch {
        code_branch: String,
        requested_branch: String,
    },

    // =========================================================================
    // Lookup / Input Errors
    // =========================================================================
    #[error("Bill not found: {0}")]
    BillNotFound(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    // =========================================================================
    // Infrastructure Errors
    // =========================================================================
    /// Version conflicts kept winning until the retry budget ran out.
    #[error("Gave up on {resource} after {attempts} conflicting attempts")]
    Contention { resource: String, attempts: u32 },

    /// Every generated referral code collided with an existing one.
    #[error("No free referral code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Configuration error: {0}")]
    Config(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for BillingError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AlreadyFinalized { bill_id, status } => {
                BillingError::AlreadyFinalized { bill_id, status }
            }
            CoreError::WitnessRequired { reason } => BillingError::WitnessRequired { reason },
            CoreError::InsufficientPoints { balance, requested } => {
                BillingError::InsufficientPoints { balance, requested }
            }
            CoreError::SelfReferral { client_id } => BillingError::SelfReferral { client_id },
            CoreError::BranchMismatch {
                code_branch,
                requested_branch,
            } => BillingError::BranchMismatch {
                code_branch,
                requested_branch,
            },
            other @ CoreError::RedemptionExceedsBill { .. } => {
                BillingError::Validation(other.to_string())
            }
            CoreError::Validation(v) => BillingError::Validation(v.to_string()),
        }
    }
}

impl From<ValidationError> for BillingError {
    fn from(err: ValidationError) -> Self {
        BillingError::Validation(err.to_string())
    }
}

impl From<std::io::Error> for BillingError {
    fn from(err: std::io::Error) -> Self {
        BillingError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for BillingError {
    fn from(err: toml::de::Error) -> Self {
        BillingError::Config(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl BillingError {
    /// True for errors raised before anything was written.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            BillingError::AlreadyFinalized { .. }
                | BillingError::WitnessRequired { .. }
                | BillingError::InsufficientPoints { .. }
                | BillingError::InvalidCode { .. }
                | BillingError::SelfReferral { .. }
                | BillingError::AlreadyProcessed { .. }
                | BillingError::BranchMismatch { .. }
        )
    }

    /// True when the store reported a version conflict.
    pub(crate) fn is_conflict(&self) -> bool {
        matches!(self, BillingError::Database(db) if db.is_conflict())
    }

    /// Stable machine-readable code for collaborators.
    pub fn code(&self) -> &'static str {
        match self {
            BillingError::AlreadyFinalized { .. } => "ALREADY_FINALIZED",
            BillingError::WitnessRequired { .. } => "WITNESS_REQUIRED",
            BillingError::InsufficientPoints { .. } => "INSUFFICIENT_POINTS",
            BillingError::InvalidCode { .. } => "INVALID_CODE",
            BillingError::SelfReferral { .. } => "SELF_REFERRAL",
            BillingError::AlreadyProcessed { .. } => "ALREADY_PROCESSED",
            BillingError::BranchMismatch { .. } => "BRANCH_MISMATCH",
            BillingError::BillNotFound(_) => "BILL_NOT_FOUND",
            BillingError::Validation(_) => "VALIDATION_ERROR",
            BillingError::Contention { .. } => "CONTENTION",
            BillingError::CodeSpaceExhausted { .. } => "CODE_SPACE_EXHAUSTED",
            BillingError::Database(_) => "DATABASE_ERROR",
            BillingError::Config(_) => "CONFIG_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_errors() {
        assert!(BillingError::WitnessRequired {
            reason: "none".into()
        }
        .is_precondition());
        assert!(BillingError::InvalidCode { code: "X".into() }.is_precondition());
        assert!(!BillingError::BillNotFound("b1".into()).is_precondition());
        assert!(!BillingError::Config("bad".into()).is_precondition());
    }

    #[test]
    fn test_core_error_mapping() {
        let err: BillingError = CoreError::InsufficientPoints {
            balance: 10,
            requested: 20,
        }
        .into();
        assert_eq!(err.code(), "INSUFFICIENT_POINTS");

        let err: BillingError = CoreError::RedemptionExceedsBill {
            discount_cents: 500,
            payable_cents: 100,
        }
        .into();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_conflict_detection() {
        let err: BillingError = DbError::conflict("StockBatch", "b1").into();
        assert!(err.is_conflict());
        assert!(!BillingError::BillNotFound("b1".into()).is_conflict());
    }
}
