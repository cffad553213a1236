//! # Bill Saga Outcomes
//!
//! A committed bill is final. The steps that follow it report what they
//! did instead of failing the call.
//!
//! ```text
//! bill committed ─► stock (per line) ─► redeem ─► earn ─► referral check
//!                        │                 │        │          │
//!                        ▼                 ▼        ▼          ▼
//!                    StepReport        StepReport  ...      StepReport
//!
//! Ok        the side effect happened in full
//! Skipped   nothing to do (guest, no mapping, zero points)
//! Degraded  partially applied (stock shortfall)
//! Failed    not applied; the bill stands
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use salon_core::SalesType;

use crate::inventory::DeductionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    StockDeduction,
    LoyaltyRedeem,
    LoyaltyEarn,
    ReferralCheck,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::StockDeduction => write!(f, "stock deduction"),
            StepKind::LoyaltyRedeem => write!(f, "loyalty redeem"),
            StepKind::LoyaltyEarn => write!(f, "loyalty earn"),
            StepKind::ReferralCheck => write!(f, "referral check"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Ok,
    Skipped { reason: String },
    Degraded { reason: String },
    Failed { reason: String },
}

impl StepOutcome {
    /// True for Degraded and Failed.
    pub fn is_warning(&self) -> bool {
        matches!(self, StepOutcome::Degraded { .. } | StepOutcome::Failed { .. })
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        StepOutcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn degraded(reason: impl Into<String>) -> Self {
        StepOutcome::Degraded {
            reason: reason.into(),
        }
    }

    pub fn failed(reason: impl fmt::Display) -> Self {
        StepOutcome::Failed {
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StepReport {
    pub step: StepKind,
    /// Product, service or client the step acted on.
    pub target: Option<String>,
    pub outcome: StepOutcome,
}

impl StepReport {
    pub fn new(step: StepKind, target: Option<&str>, outcome: StepOutcome) -> Self {
        StepReport {
            step,
            target: target.map(str::to_string),
            outcome,
        }
    }

    /// Human-readable warning, or `None` for Ok and Skipped.
    pub fn warning(&self) -> Option<String> {
        let reason = match &self.outcome {
            StepOutcome::Degraded { reason } | StepOutcome::Failed { reason } => reason,
            StepOutcome::Ok | StepOutcome::Skipped { .. } => return None,
        };
        Some(match &self.target {
            Some(target) => format!("{} ({}): {}", self.step, target, reason),
            None => format!("{}: {}", self.step, reason),
        })
    }
}

/// What `create_bill` returns once the bill is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreateBillReceipt {
    pub bill_id: String,
    pub bill_number: String,
    pub sales_type: SalesType,
    pub total_cents: i64,
    pub loyalty_discount_cents: i64,
    /// In execution order.
    pub steps: Vec<StepReport>,
    /// Stock deductions that ran, in execution order.
    pub deductions: Vec<DeductionResult>,
}

impl CreateBillReceipt {
    pub fn warnings(&self) -> Vec<String> {
        self.steps.iter().filter_map(StepReport::warning).collect()
    }

    /// True when no step degraded or failed.
    pub fn is_fully_applied(&self) -> bool {
        !self.steps.iter().any(|s| s.outcome.is_warning())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(steps: Vec<StepReport>) -> CreateBillReceipt {
        CreateBillReceipt {
            bill_id: "bill-1".into(),
            bill_number: "20260314-MAKA-0001".into(),
            sales_type: SalesType::Product,
            total_cents: 10_000,
            loyalty_discount_cents: 0,
            steps,
            deductions: Vec::new(),
        }
    }

    #[test]
    fn test_warnings_skip_ok_and_skipped() {
        let r = receipt(vec![
            StepReport::new(StepKind::StockDeduction, Some("prod-1"), StepOutcome::Ok),
            StepReport::new(
                StepKind::StockDeduction,
                Some("prod-2"),
                StepOutcome::degraded("short by 3"),
            ),
            StepReport::new(StepKind::LoyaltyEarn, None, StepOutcome::skipped("guest")),
            StepReport::new(StepKind::ReferralCheck, Some("c-1"), StepOutcome::failed("db down")),
        ]);

        assert!(!r.is_fully_applied());
        assert_eq!(
            r.warnings(),
            vec![
                "stock deduction (prod-2): short by 3".to_string(),
                "referral check (c-1): db down".to_string(),
            ]
        );
    }

    #[test]
    fn test_clean_receipt() {
        let r = receipt(vec![StepReport::new(
            StepKind::LoyaltyEarn,
            Some("c-1"),
            StepOutcome::Ok,
        )]);
        assert!(r.is_fully_applied());
        assert!(r.warnings().is_empty());
    }

    #[test]
    fn test_outcome_json_shape() {
        let json = serde_json::to_string(&StepOutcome::degraded("short by 2")).unwrap();
        assert_eq!(json, r#"{"outcome":"degraded","reason":"short by 2"}"#);
    }
}
