//! # FIFO Deduction Planning
//!
//! Decides which batches a deduction consumes. The plan is computed from a
//! snapshot of batches; salon-db applies it under per-batch version checks.
//!
//! ## Algorithm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  batches (branch, product, usage type)                                  │
//! │       │                                                                 │
//! │       ▼  keep active with remaining > 0                                 │
//! │       ▼  sort by (received_date, id)                                    │
//! │                                                                         │
//! │  B1 day 1 [5] ─► take 5 (depleted)                                      │
//! │  B2 day 2 [10] ─► take 2 (8 left)         need 7                        │
//! │  B3 day 3 [4] ─► untouched                                              │
//! │                                                                         │
//! │  need > available: take everything, report the shortfall               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::StockBatch;

/// Quantity taken from one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BatchAllocation {
    pub batch_id: String,
    pub quantity: i64,
    /// Remaining quantity after this allocation.
    pub remaining_after: i64,
    pub unit_cost_cents: i64,
    /// Version read with the snapshot; the write must match it.
    pub expected_version: i64,
}

impl BatchAllocation {
    #[inline]
    pub fn depletes(&self) -> bool {
        self.remaining_after == 0
    }

    pub fn cost(&self) -> Money {
        Money::from_cents(self.unit_cost_cents).multiply_quantity(self.quantity)
    }
}

/// Result of planning a deduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DeductionPlan {
    pub allocations: Vec<BatchAllocation>,
    pub requested: i64,
    pub deducted: i64,
    pub shortfall: i64,
}

impl DeductionPlan {
    /// True when the full quantity is covered.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.shortfall == 0
    }

    /// Cost of goods for the deducted quantity.
    pub fn total_cost(&self) -> Money {
        self.allocations
            .iter()
            .map(BatchAllocation::cost)
            .fold(Money::zero(), |acc, cost| {
                acc.checked_add(cost).unwrap_or(Money::from_cents(i64::MAX))
            })
    }
}

/// Plans an oldest-first deduction of `quantity` units.
///
/// Batches that are depleted or empty are ignored. Ties on `received_date`
/// are broken by batch id so the plan is deterministic. A non-positive
/// quantity yields an empty, complete plan.
pub fn plan_deduction(batches: &[StockBatch], quantity: i64) -> DeductionPlan {
    let requested = quantity.max(0);

    let mut ordered: Vec<&StockBatch> = batches.iter().filter(|b| b.is_available()).collect();
    ordered.sort_by(|a, b| {
        a.received_date
            .cmp(&b.received_date)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut still_needed = requested;
    let mut allocations = Vec::new();

    for batch in ordered {
        if still_needed == 0 {
            break;
        }
        let take = batch.remaining_quantity.min(still_needed);
        still_needed -= take;
        allocations.push(BatchAllocation {
            batch_id: batch.id.clone(),
            quantity: take,
            remaining_after: batch.remaining_quantity - take,
            unit_cost_cents: batch.unit_cost_cents,
            expected_version: batch.version,
        });
    }

    DeductionPlan {
        allocations,
        requested,
        deducted: requested - still_needed,
        shortfall: still_needed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BatchStatus, UsageType};
    use chrono::{TimeZone, Utc};

    fn batch(id: &str, day: u32, remaining: i64) -> StockBatch {
        StockBatch {
            id: id.to_string(),
            branch_id: "branch-1".to_string(),
            product_id: "shampoo".to_string(),
            usage_type: UsageType::Otc,
            received_quantity: remaining.max(10),
            remaining_quantity: remaining,
            unit_cost_cents: 1_000,
            received_date: Utc.with_ymd_and_hms(2026, 1, day, 9, 0, 0).unwrap(),
            status: if remaining > 0 {
                BatchStatus::Active
            } else {
                BatchStatus::Depleted
            },
            version: 3,
        }
    }

    #[test]
    fn test_oldest_batch_consumed_first() {
        // Deliberately out of order
        let batches = vec![batch("b2", 2, 10), batch("b1", 1, 5)];
        let plan = plan_deduction(&batches, 7);

        assert!(plan.is_complete());
        assert_eq!(plan.deducted, 7);
        assert_eq!(plan.allocations.len(), 2);

        assert_eq!(plan.allocations[0].batch_id, "b1");
        assert_eq!(plan.allocations[0].quantity, 5);
        assert!(plan.allocations[0].depletes());

        assert_eq!(plan.allocations[1].batch_id, "b2");
        assert_eq!(plan.allocations[1].quantity, 2);
        assert_eq!(plan.allocations[1].remaining_after, 8);
        assert_eq!(plan.allocations[1].expected_version, 3);
    }

    #[test]
    fn test_shortage_takes_everything_and_reports() {
        let batches = vec![batch("b1", 1, 5), batch("b2", 2, 10)];
        let plan = plan_deduction(&batches, 20);

        assert!(!plan.is_complete());
        assert_eq!(plan.deducted, 15);
        assert_eq!(plan.shortfall, 5);
        assert!(plan.allocations.iter().all(BatchAllocation::depletes));
    }

    #[test]
    fn test_ties_broken_by_id() {
        let batches = vec![batch("b-z", 1, 3), batch("b-a", 1, 3)];
        let plan = plan_deduction(&batches, 2);
        assert_eq!(plan.allocations[0].batch_id, "b-a");
    }

    #[test]
    fn test_depleted_batches_ignored() {
        let batches = vec![batch("old", 1, 0), batch("new", 2, 4)];
        let plan = plan_deduction(&batches, 1);
        assert_eq!(plan.allocations.len(), 1);
        assert_eq!(plan.allocations[0].batch_id, "new");
    }

    #[test]
    fn test_zero_quantity_is_noop() {
        let plan = plan_deduction(&[batch("b1", 1, 5)], 0);
        assert!(plan.allocations.is_empty());
        assert!(plan.is_complete());
    }

    #[test]
    fn test_total_cost() {
        let plan = plan_deduction(&[batch("b1", 1, 5), batch("b2", 2, 5)], 6);
        assert_eq!(plan.total_cost().cents(), 6_000);
    }
}
