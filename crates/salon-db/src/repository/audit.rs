//! # Audit Repository
//!
//! Append-only compliance records. There is no update or delete.

use sqlx::SqlitePool;

use crate::error::DbResult;
use salon_core::AuditLogEntry;

#[derive(Debug, Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AuditRepository { pool }
    }

    pub async fn insert(&self, entry: &AuditLogEntry) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (
                id, bill_id, action, outcome, performed_by, branch_id, details, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.bill_id)
        .bind(entry.action)
        .bind(entry.outcome)
        .bind(&entry.performed_by)
        .bind(&entry.branch_id)
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Entries about one bill, in write order.
    pub async fn for_bill(&self, bill_id: &str) -> DbResult<Vec<AuditLogEntry>> {
        let entries: Vec<AuditLogEntry> = sqlx::query_as(
            r#"
            SELECT id, bill_id, action, outcome, performed_by, branch_id, details, created_at
            FROM audit_log
            WHERE bill_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(bill_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Most recent entries for a branch.
    pub async fn for_branch(&self, branch_id: &str, limit: i64) -> DbResult<Vec<AuditLogEntry>> {
        let entries: Vec<AuditLogEntry> = sqlx::query_as(
            r#"
            SELECT id, bill_id, action, outcome, performed_by, branch_id, details, created_at
            FROM audit_log
            WHERE branch_id = ?1
            ORDER BY rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(branch_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
