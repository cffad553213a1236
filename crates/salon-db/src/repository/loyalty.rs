//! # Loyalty Repository
//!
//! Branch-scoped point balances and their append-only log.
//!
//! The balance row and the log entry that explains it are written in the
//! same transaction, so `balance` always equals the sum of the log.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use salon_core::{LoyaltyAccount, LoyaltyEntryType, LoyaltyLogEntry};

/// A signed change to one account.
#[derive(Debug, Clone)]
pub struct LoyaltyChange {
    pub client_id: String,
    pub branch_id: String,
    pub entry_type: LoyaltyEntryType,
    /// Positive for earned, negative for redeemed.
    pub points: i64,
    pub bill_id: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoyaltyRepository {
    pool: SqlitePool,
}

impl LoyaltyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        LoyaltyRepository { pool }
    }

    pub async fn get_account(
        &self,
        client_id: &str,
        branch_id: &str,
    ) -> DbResult<Option<LoyaltyAccount>> {
        let account: Option<LoyaltyAccount> = sqlx::query_as(
            r#"
            SELECT client_id, branch_id, balance, version, created_at, updated_at
            FROM loyalty_accounts
            WHERE client_id = ?1 AND branch_id = ?2
            "#,
        )
        .bind(client_id)
        .bind(branch_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    /// Applies a change if the account is still at `expected_version`.
    ///
    /// A missing account counts as version 0 with balance 0 and is created
    /// inside the same transaction.
    ///
    /// ## Errors
    /// `Conflict` when the version moved or the change would take the
    /// balance below zero. Nothing is written.
    pub async fn apply_change(
        &self,
        change: &LoyaltyChange,
        expected_version: i64,
    ) -> DbResult<LoyaltyLogEntry> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO loyalty_accounts (client_id, branch_id, balance, version, created_at, updated_at)
            VALUES (?1, ?2, 0, 0, ?3, ?3)
            ON CONFLICT (client_id, branch_id) DO NOTHING
            "#,
        )
        .bind(&change.client_id)
        .bind(&change.branch_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE loyalty_accounts SET
                balance = balance + ?3,
                version = version + 1,
                updated_at = ?4
            WHERE client_id = ?1 AND branch_id = ?2
              AND version = ?5
              AND balance + ?3 >= 0
            RETURNING balance
            "#,
        )
        .bind(&change.client_id)
        .bind(&change.branch_id)
        .bind(change.points)
        .bind(now)
        .bind(expected_version)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(resulting_balance) = balance else {
            let key = format!("{}/{}", change.client_id, change.branch_id);
            debug!(account = %key, expected_version, "Loyalty version moved, rolling back");
            return Err(DbError::conflict("LoyaltyAccount", key));
        };

        let entry = LoyaltyLogEntry {
            id: Uuid::new_v4().to_string(),
            client_id: change.client_id.clone(),
            branch_id: change.branch_id.clone(),
            entry_type: change.entry_type,
            points: change.points,
            bill_id: change.bill_id.clone(),
            resulting_balance,
            note: change.note.clone(),
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO loyalty_log (
                id, client_id, branch_id, entry_type, points,
                bill_id, resulting_balance, note, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.client_id)
        .bind(&entry.branch_id)
        .bind(entry.entry_type)
        .bind(entry.points)
        .bind(&entry.bill_id)
        .bind(entry.resulting_balance)
        .bind(&entry.note)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(entry)
    }

    /// Log entries for an account, newest first.
    pub async fn history(&self, client_id: &str, branch_id: &str) -> DbResult<Vec<LoyaltyLogEntry>> {
        let entries: Vec<LoyaltyLogEntry> = sqlx::query_as(
            r#"
            SELECT id, client_id, branch_id, entry_type, points,
                   bill_id, resulting_balance, note, created_at
            FROM loyalty_log
            WHERE client_id = ?1 AND branch_id = ?2
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(client_id)
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Running sum of the log for an account.
    pub async fn log_sum(&self, client_id: &str, branch_id: &str) -> DbResult<i64> {
        let sum: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(points) FROM loyalty_log WHERE client_id = ?1 AND branch_id = ?2",
        )
        .bind(client_id)
        .bind(branch_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum.unwrap_or(0))
    }
}
