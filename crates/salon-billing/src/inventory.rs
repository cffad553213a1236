//! # FIFO Deduction Engine
//!
//! Decrements cost batches oldest-first for one (branch, product, usage
//! type) pool.
//!
//! ## Deduction Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  deduct_stock_fifo(branch, product, usage, qty)                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  read active batches ──► plan_deduction (salon-core, pure)              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  apply_deduction: one transaction, WHERE version = ? per batch          │
//! │       │                                                                 │
//! │       ├── Conflict ──► backoff, re-read, re-plan                        │
//! │       └── Ok ──► movements written, result returned                     │
//! │                                                                         │
//! │  Shortage is not an error: everything available is taken and the      │
//! │  shortfall is reported with success = false.                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use ts_rs::TS;

use salon_core::fifo::{plan_deduction, DeductionPlan};
use salon_core::{MovementReason, StockBatch, StockMovement, UsageType};
use salon_db::{Database, MovementContext, NewBatch, StockRepository};

use crate::config::ConcurrencySettings;
use crate::error::{BillingError, BillingResult};
use crate::retry::with_conflict_retry;

/// Quantity taken from one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BatchDeduction {
    pub batch_id: String,
    pub quantity: i64,
}

/// Outcome of one FIFO deduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DeductionResult {
    pub product_id: String,
    pub usage_type: UsageType,
    pub requested: i64,
    pub deducted: i64,
    pub shortfall: i64,
    /// Oldest batch first.
    pub deductions: Vec<BatchDeduction>,
    /// Cost of goods for the deducted quantity.
    pub cost_cents: i64,
    /// False when stock ran short.
    pub success: bool,
}

impl DeductionResult {
    fn from_plan(product_id: &str, usage_type: UsageType, plan: &DeductionPlan) -> Self {
        DeductionResult {
            product_id: product_id.to_string(),
            usage_type,
            requested: plan.requested,
            deducted: plan.deducted,
            shortfall: plan.shortfall,
            deductions: plan
                .allocations
                .iter()
                .map(|a| BatchDeduction {
                    batch_id: a.batch_id.clone(),
                    quantity: a.quantity,
                })
                .collect(),
            cost_cents: plan.total_cost().cents(),
            success: plan.is_complete(),
        }
    }
}

/// Who triggered a deduction and for which bill.
#[derive(Debug, Clone, Copy)]
pub struct DeductionContext<'a> {
    pub bill_id: Option<&'a str>,
    pub actor_id: &'a str,
}

#[derive(Debug, Clone)]
pub struct FifoDeductionEngine {
    stock: StockRepository,
    concurrency: ConcurrencySettings,
}

impl FifoDeductionEngine {
    pub fn new(db: &Database, concurrency: ConcurrencySettings) -> Self {
        FifoDeductionEngine {
            stock: db.stock(),
            concurrency,
        }
    }

    /// Deducts `quantity` units oldest-first.
    ///
    /// The movement reason follows the pool: `otc` stock leaves as a
    /// Transaction Sale, `salon-use` stock as Service Use.
    ///
    /// ## Errors
    /// - `Validation` for a non-positive quantity or empty ids
    /// - `Contention` when concurrent writers kept winning
    /// - `Database` for storage failures
    pub async fn deduct_stock_fifo(
        &self,
        branch_id: &str,
        product_id: &str,
        usage_type: UsageType,
        quantity: i64,
        ctx: DeductionContext<'_>,
    ) -> BillingResult<DeductionResult> {
        if branch_id.trim().is_empty() || product_id.trim().is_empty() {
            return Err(BillingError::Validation(
                "branch_id and product_id are required".into(),
            ));
        }
        if quantity <= 0 {
            return Err(BillingError::Validation(format!(
                "deduction quantity must be positive, got {quantity}"
            )));
        }

        let reason = match usage_type {
            UsageType::Otc => MovementReason::TransactionSale,
            UsageType::SalonUse => MovementReason::ServiceUse,
        };
        let resource = format!("stock {branch_id}/{product_id}/{usage_type}");

        let engine = self;
        let plan = with_conflict_retry(&self.concurrency, &resource, move || async move {
            engine
                .attempt(branch_id, product_id, usage_type, quantity, reason, ctx)
                .await
        })
        .await?;

        let result = DeductionResult::from_plan(product_id, usage_type, &plan);
        if result.success {
            info!(
                branch_id,
                product_id,
                %usage_type,
                deducted = result.deducted,
                batches = result.deductions.len(),
                "Stock deducted"
            );
        } else {
            warn!(
                branch_id,
                product_id,
                %usage_type,
                requested = result.requested,
                shortfall = result.shortfall,
                "Insufficient stock, deducted what was available"
            );
        }

        Ok(result)
    }

    async fn attempt(
        &self,
        branch_id: &str,
        product_id: &str,
        usage_type: UsageType,
        quantity: i64,
        reason: MovementReason,
        ctx: DeductionContext<'_>,
    ) -> BillingResult<DeductionPlan> {
        let batches = self
            .stock
            .active_batches(branch_id, product_id, usage_type)
            .await?;
        let plan = plan_deduction(&batches, quantity);

        debug!(
            product_id,
            batches = batches.len(),
            planned = plan.deducted,
            "Planned FIFO deduction"
        );

        if plan.allocations.is_empty() {
            return Ok(plan);
        }

        let movement_ctx = MovementContext {
            branch_id: branch_id.to_string(),
            product_id: product_id.to_string(),
            reason,
            bill_id: ctx.bill_id.map(str::to_string),
            actor_id: ctx.actor_id.to_string(),
        };
        self.stock.apply_deduction(&plan, &movement_ctx).await?;

        Ok(plan)
    }

    /// Inventory-receiving entry point. The ledger never calls this.
    pub async fn receive_batch(&self, batch: &NewBatch) -> BillingResult<StockBatch> {
        if batch.quantity <= 0 {
            return Err(BillingError::Validation(
                "received quantity must be positive".into(),
            ));
        }
        if batch.unit_cost_cents < 0 {
            return Err(BillingError::Validation(
                "unit cost must not be negative".into(),
            ));
        }

        let stored = self.stock.receive_batch(batch).await?;
        info!(
            batch_id = %stored.id,
            product_id = %stored.product_id,
            usage_type = %stored.usage_type,
            quantity = stored.received_quantity,
            "Batch received"
        );
        Ok(stored)
    }

    pub async fn available_quantity(
        &self,
        branch_id: &str,
        product_id: &str,
        usage_type: UsageType,
    ) -> BillingResult<i64> {
        Ok(self
            .stock
            .available_quantity(branch_id, product_id, usage_type)
            .await?)
    }

    pub async fn active_batches(
        &self,
        branch_id: &str,
        product_id: &str,
        usage_type: UsageType,
    ) -> BillingResult<Vec<StockBatch>> {
        Ok(self
            .stock
            .active_batches(branch_id, product_id, usage_type)
            .await?)
    }

    pub async fn movements_for_bill(&self, bill_id: &str) -> BillingResult<Vec<StockMovement>> {
        Ok(self.stock.movements_for_bill(bill_id).await?)
    }
}
