//! # Audit Log
//!
//! Append-only compliance sink shared by every service.
//!
//! Writing is fire-and-forget from the caller's point of view: a failed
//! insert is logged at `warn` and dropped, never returned.

use chrono::Utc;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use salon_core::{AuditAction, AuditLogEntry, AuditOutcome};
use salon_db::{AuditRepository, Database};

use crate::error::BillingResult;

/// One audit record before it is stamped and stored.
#[derive(Debug, Clone)]
pub struct AuditEvent<'a> {
    pub bill_id: Option<&'a str>,
    pub action: AuditAction,
    pub outcome: AuditOutcome,
    pub performed_by: &'a str,
    pub branch_id: &'a str,
    pub details: Value,
}

#[derive(Debug, Clone)]
pub struct AuditLog {
    repo: AuditRepository,
}

impl AuditLog {
    pub fn new(db: &Database) -> Self {
        AuditLog { repo: db.audit() }
    }

    /// Stores an event. Never fails.
    pub async fn record(&self, event: AuditEvent<'_>) {
        let entry = AuditLogEntry {
            id: Uuid::new_v4().to_string(),
            bill_id: event.bill_id.map(str::to_string),
            action: event.action,
            outcome: event.outcome,
            performed_by: event.performed_by.to_string(),
            branch_id: event.branch_id.to_string(),
            details: event.details.to_string(),
            created_at: Utc::now(),
        };

        if let Err(e) = self.repo.insert(&entry).await {
            warn!(
                action = ?entry.action,
                bill_id = ?entry.bill_id,
                error = %e,
                "Dropping audit entry"
            );
        }
    }

    pub async fn for_bill(&self, bill_id: &str) -> BillingResult<Vec<AuditLogEntry>> {
        Ok(self.repo.for_bill(bill_id).await?)
    }

    pub async fn for_branch(
        &self,
        branch_id: &str,
        limit: i64,
    ) -> BillingResult<Vec<AuditLogEntry>> {
        Ok(self.repo.for_branch(branch_id, limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use salon_db::DbConfig;
    use serde_json::json;

    #[tokio::test]
    async fn test_record_and_query() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let audit = AuditLog::new(&db);

        audit
            .record(AuditEvent {
                bill_id: Some("bill-9"),
                action: AuditAction::BillRefunded,
                outcome: AuditOutcome::Success,
                performed_by: "manager-1",
                branch_id: "branch-1",
                details: json!({ "amount_cents": 5000 }),
            })
            .await;

        let entries = audit.for_bill("bill-9").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].performed_by, "manager-1");
        let details: Value = serde_json::from_str(&entries[0].details).unwrap();
        assert_eq!(details["amount_cents"], 5000);
    }

    #[tokio::test]
    async fn test_failed_write_is_swallowed() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let audit = AuditLog::new(&db);
        db.close().await;

        // Pool is closed; record must still return normally
        audit
            .record(AuditEvent {
                bill_id: None,
                action: AuditAction::LoyaltyEarned,
                outcome: AuditOutcome::Success,
                performed_by: "system",
                branch_id: "branch-1",
                details: Value::Null,
            })
            .await;
    }
}
