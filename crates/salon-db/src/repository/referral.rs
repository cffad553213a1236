//! # Referral Repository
//!
//! Issued codes and credited referrals. Both tables carry UNIQUE
//! constraints that back the at-most-once rules:
//!
//! - `referral_codes`: UNIQUE(code), UNIQUE(client_id, branch_id)
//! - `referral_records`: UNIQUE(new_client_id, branch_id)

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use salon_core::{ReferralCode, ReferralRecord};

#[derive(Debug, Clone)]
pub struct ReferralRepository {
    pool: SqlitePool,
}

impl ReferralRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReferralRepository { pool }
    }

    /// Code already issued to a client for a branch.
    pub async fn code_for(&self, client_id: &str, branch_id: &str) -> DbResult<Option<ReferralCode>> {
        let code: Option<ReferralCode> = sqlx::query_as(
            r#"
            SELECT code, client_id, branch_id, created_at
            FROM referral_codes
            WHERE client_id = ?1 AND branch_id = ?2
            "#,
        )
        .bind(client_id)
        .bind(branch_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(code)
    }

    /// Resolves a code string.
    pub async fn find_code(&self, code: &str) -> DbResult<Option<ReferralCode>> {
        let found: Option<ReferralCode> = sqlx::query_as(
            "SELECT code, client_id, branch_id, created_at FROM referral_codes WHERE code = ?1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found)
    }

    /// ## Errors
    /// `UniqueViolation` on `referral_codes.code` for a colliding code, or on
    /// `referral_codes.client_id` when the pair already has one.
    pub async fn insert_code(&self, code: &ReferralCode) -> DbResult<()> {
        debug!(code = %code.code, client_id = %code.client_id, branch_id = %code.branch_id, "Issuing referral code");

        sqlx::query(
            r#"
            INSERT INTO referral_codes (code, client_id, branch_id, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&code.code)
        .bind(&code.client_id)
        .bind(&code.branch_id)
        .bind(code.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Referral already credited for a new client at a branch.
    pub async fn record_for(
        &self,
        new_client_id: &str,
        branch_id: &str,
    ) -> DbResult<Option<ReferralRecord>> {
        let record: Option<ReferralRecord> = sqlx::query_as(
            r#"
            SELECT id, new_client_id, referrer_id, branch_id, code,
                   referrer_points, new_client_points, processed_by, created_at
            FROM referral_records
            WHERE new_client_id = ?1 AND branch_id = ?2
            "#,
        )
        .bind(new_client_id)
        .bind(branch_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// ## Errors
    /// `UniqueViolation` on `referral_records.new_client_id` when the pair was
    /// already referred.
    pub async fn insert_record(&self, record: &ReferralRecord) -> DbResult<()> {
        debug!(
            new_client_id = %record.new_client_id,
            referrer_id = %record.referrer_id,
            branch_id = %record.branch_id,
            "Recording referral"
        );

        sqlx::query(
            r#"
            INSERT INTO referral_records (
                id, new_client_id, referrer_id, branch_id, code,
                referrer_points, new_client_points, processed_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&record.id)
        .bind(&record.new_client_id)
        .bind(&record.referrer_id)
        .bind(&record.branch_id)
        .bind(&record.code)
        .bind(record.referrer_points)
        .bind(record.new_client_points)
        .bind(&record.processed_by)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Referrals credited to a referrer at a branch, newest first.
    pub async fn records_by_referrer(
        &self,
        referrer_id: &str,
        branch_id: &str,
    ) -> DbResult<Vec<ReferralRecord>> {
        let records: Vec<ReferralRecord> = sqlx::query_as(
            r#"
            SELECT id, new_client_id, referrer_id, branch_id, code,
                   referrer_points, new_client_points, processed_by, created_at
            FROM referral_records
            WHERE referrer_id = ?1 AND branch_id = ?2
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(referrer_id)
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Utc;

    fn code(code: &str, client: &str) -> ReferralCode {
        ReferralCode {
            code: code.to_string(),
            client_id: client.to_string(),
            branch_id: "branch-1".to_string(),
            created_at: Utc::now(),
        }
    }

    fn record(id: &str, new_client: &str) -> ReferralRecord {
        ReferralRecord {
            id: id.to_string(),
            new_client_id: new_client.to_string(),
            referrer_id: "client-1".to_string(),
            branch_id: "branch-1".to_string(),
            code: "CLIBRA-AAAAAA".to_string(),
            referrer_points: 100,
            new_client_points: 50,
            processed_by: "cashier-1".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_code_uniqueness() {
        let referrals = Database::new(DbConfig::in_memory()).await.unwrap().referrals();
        referrals
            .insert_code(&code("CLIBRA-AAAAAA", "client-1"))
            .await
            .unwrap();

        let collision = referrals
            .insert_code(&code("CLIBRA-AAAAAA", "client-2"))
            .await
            .unwrap_err();
        assert!(collision.is_unique_violation_on("referral_codes.code"));

        let second = referrals
            .insert_code(&code("CLIBRA-BBBBBB", "client-1"))
            .await
            .unwrap_err();
        assert!(second.is_unique_violation_on("client_id"));

        let found = referrals.find_code("CLIBRA-AAAAAA").await.unwrap().unwrap();
        assert_eq!(found.client_id, "client-1");
        assert!(referrals.code_for("client-2", "branch-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_once_per_new_client_and_branch() {
        let referrals = Database::new(DbConfig::in_memory()).await.unwrap().referrals();
        referrals
            .insert_code(&code("CLIBRA-AAAAAA", "client-1"))
            .await
            .unwrap();

        referrals.insert_record(&record("r1", "client-9")).await.unwrap();
        let err = referrals
            .insert_record(&record("r2", "client-9"))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation_on("new_client_id"));

        assert!(referrals.record_for("client-9", "branch-1").await.unwrap().is_some());
        assert_eq!(
            referrals
                .records_by_referrer("client-1", "branch-1")
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
