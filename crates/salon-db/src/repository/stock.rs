//! # Stock Repository
//!
//! Cost batches and the movement notes written when they are consumed.
//!
//! ## Applying a Deduction Plan
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   for each allocation (oldest first):                                   │
//! │     UPDATE stock_batches                                                │
//! │        SET remaining = ?, status = ?, version = version + 1             │
//! │      WHERE id = ? AND version = <version read with the plan>            │
//! │     0 rows? ──► ROLLBACK, DbError::Conflict (caller re-plans)           │
//! │     INSERT stock_movements (batch, qty, reason, bill, actor)            │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use salon_core::fifo::DeductionPlan;
use salon_core::{BatchStatus, MovementReason, StockBatch, StockMovement, UsageType};

/// Who and what a deduction is recorded against.
#[derive(Debug, Clone)]
pub struct MovementContext {
    pub branch_id: String,
    pub product_id: String,
    pub reason: MovementReason,
    pub bill_id: Option<String>,
    pub actor_id: String,
}

/// A batch delivered by the inventory-receiving process.
#[derive(Debug, Clone)]
pub struct NewBatch {
    pub branch_id: String,
    pub product_id: String,
    pub usage_type: UsageType,
    pub quantity: i64,
    pub unit_cost_cents: i64,
    pub received_date: DateTime<Utc>,
}

/// Repository for stock batches and movements.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Active batches of one (branch, product, usage type) pool.
    pub async fn active_batches(
        &self,
        branch_id: &str,
        product_id: &str,
        usage_type: UsageType,
    ) -> DbResult<Vec<StockBatch>> {
        let batches: Vec<StockBatch> = sqlx::query_as(
            r#"
            SELECT id, branch_id, product_id, usage_type, received_quantity,
                   remaining_quantity, unit_cost_cents, received_date, status, version
            FROM stock_batches
            WHERE branch_id = ?1 AND product_id = ?2 AND usage_type = ?3
              AND status = 'active'
            ORDER BY received_date, id
            "#,
        )
        .bind(branch_id)
        .bind(product_id)
        .bind(usage_type)
        .fetch_all(&self.pool)
        .await?;

        Ok(batches)
    }

    pub async fn get_batch(&self, id: &str) -> DbResult<Option<StockBatch>> {
        let batch: Option<StockBatch> = sqlx::query_as(
            r#"
            SELECT id, branch_id, product_id, usage_type, received_quantity,
                   remaining_quantity, unit_cost_cents, received_date, status, version
            FROM stock_batches
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(batch)
    }

    /// Total remaining quantity across active batches of a pool.
    pub async fn available_quantity(
        &self,
        branch_id: &str,
        product_id: &str,
        usage_type: UsageType,
    ) -> DbResult<i64> {
        let total: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(remaining_quantity)
            FROM stock_batches
            WHERE branch_id = ?1 AND product_id = ?2 AND usage_type = ?3
              AND status = 'active'
            "#,
        )
        .bind(branch_id)
        .bind(product_id)
        .bind(usage_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(total.unwrap_or(0))
    }

    /// Inserts a new active batch.
    pub async fn receive_batch(&self, batch: &NewBatch) -> DbResult<StockBatch> {
        let stored = StockBatch {
            id: Uuid::new_v4().to_string(),
            branch_id: batch.branch_id.clone(),
            product_id: batch.product_id.clone(),
            usage_type: batch.usage_type,
            received_quantity: batch.quantity,
            remaining_quantity: batch.quantity,
            unit_cost_cents: batch.unit_cost_cents,
            received_date: batch.received_date,
            status: BatchStatus::Active,
            version: 0,
        };

        debug!(
            batch_id = %stored.id,
            branch_id = %stored.branch_id,
            product_id = %stored.product_id,
            usage_type = %stored.usage_type,
            quantity = stored.received_quantity,
            "Receiving stock batch"
        );

        sqlx::query(
            r#"
            INSERT INTO stock_batches (
                id, branch_id, product_id, usage_type, received_quantity,
                remaining_quantity, unit_cost_cents, received_date, status, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&stored.id)
        .bind(&stored.branch_id)
        .bind(&stored.product_id)
        .bind(stored.usage_type)
        .bind(stored.received_quantity)
        .bind(stored.remaining_quantity)
        .bind(stored.unit_cost_cents)
        .bind(stored.received_date)
        .bind(stored.status)
        .bind(stored.version)
        .execute(&self.pool)
        .await?;

        Ok(stored)
    }

    /// Applies a deduction plan atomically.
    ///
    /// ## Errors
    /// `Conflict` when any batch changed since the plan was computed;
    /// nothing is written in that case.
    pub async fn apply_deduction(
        &self,
        plan: &DeductionPlan,
        ctx: &MovementContext,
    ) -> DbResult<Vec<StockMovement>> {
        let usage_type = ctx.reason.usage_type();
        let now = Utc::now();
        let mut movements = Vec::with_capacity(plan.allocations.len());

        let mut tx = self.pool.begin().await?;

        for allocation in plan.allocations.iter().filter(|a| a.quantity > 0) {
            let status = if allocation.depletes() {
                BatchStatus::Depleted
            } else {
                BatchStatus::Active
            };

            let updated = sqlx::query(
                r#"
                UPDATE stock_batches SET
                    remaining_quantity = ?2,
                    status = ?3,
                    version = version + 1
                WHERE id = ?1 AND version = ?4
                "#,
            )
            .bind(&allocation.batch_id)
            .bind(allocation.remaining_after)
            .bind(status)
            .bind(allocation.expected_version)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                debug!(batch_id = %allocation.batch_id, "Batch version moved, rolling back");
                // Dropping the transaction rolls it back
                return Err(DbError::conflict("StockBatch", &allocation.batch_id));
            }

            let movement = StockMovement {
                id: Uuid::new_v4().to_string(),
                batch_id: allocation.batch_id.clone(),
                branch_id: ctx.branch_id.clone(),
                product_id: ctx.product_id.clone(),
                usage_type,
                quantity: allocation.quantity,
                reason: ctx.reason,
                bill_id: ctx.bill_id.clone(),
                actor_id: ctx.actor_id.clone(),
                created_at: now,
            };

            sqlx::query(
                r#"
                INSERT INTO stock_movements (
                    id, batch_id, branch_id, product_id, usage_type,
                    quantity, reason, bill_id, actor_id, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )
            .bind(&movement.id)
            .bind(&movement.batch_id)
            .bind(&movement.branch_id)
            .bind(&movement.product_id)
            .bind(movement.usage_type)
            .bind(movement.quantity)
            .bind(movement.reason)
            .bind(&movement.bill_id)
            .bind(&movement.actor_id)
            .bind(movement.created_at)
            .execute(&mut *tx)
            .await?;

            movements.push(movement);
        }

        tx.commit().await?;
        Ok(movements)
    }

    /// Movements written for a bill, in write order.
    pub async fn movements_for_bill(&self, bill_id: &str) -> DbResult<Vec<StockMovement>> {
        let movements: Vec<StockMovement> = sqlx::query_as(
            r#"
            SELECT id, batch_id, branch_id, product_id, usage_type,
                   quantity, reason, bill_id, actor_id, created_at
            FROM stock_movements
            WHERE bill_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(bill_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }
}
