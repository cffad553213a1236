//! # Referral Program
//!
//! Branch-gated referral codes and one-time referral crediting.
//!
//! ## Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Code issuance                                                          │
//! │    (client, branch) has a Paid bill?  no ──► no code                    │
//! │                                       yes ──► existing code, or a new   │
//! │                                               PREFIX-SUFFIX (regenerated│
//! │                                               on collision)             │
//! │                                                                         │
//! │  Processing a code for a new client                                     │
//! │    unknown code                  ──► InvalidCode                        │
//! │    explicit branch ≠ code branch ──► BranchMismatch                     │
//! │    referrer == new client        ──► SelfReferral                       │
//! │    (new client, branch) credited ──► AlreadyProcessed                   │
//! │    otherwise: record + points for both parties                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use salon_core::referral::{generate_code, normalize_code};
use salon_core::validation::validate_required;
use salon_core::{
    AuditAction, AuditOutcome, LoyaltyLogEntry, ReferralCode, ReferralRecord,
};
use salon_db::{BillRepository, Database, ReferralRepository};

use crate::audit::{AuditEvent, AuditLog};
use crate::config::ReferralSettings;
use crate::error::{BillingError, BillingResult};
use crate::loyalty::LoyaltyLedger;

/// Result of a processed referral.
///
/// The record is committed even when a credit fails; failed credits are
/// listed in `warnings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReferralOutcome {
    pub record: ReferralRecord,
    pub referrer_credit: Option<LoyaltyLogEntry>,
    pub new_client_credit: Option<LoyaltyLogEntry>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ReferralProgram {
    referrals: ReferralRepository,
    bills: BillRepository,
    loyalty: LoyaltyLedger,
    settings: ReferralSettings,
    audit: AuditLog,
}

impl ReferralProgram {
    pub fn new(
        db: &Database,
        loyalty: LoyaltyLedger,
        settings: ReferralSettings,
        audit: AuditLog,
    ) -> Self {
        ReferralProgram {
            referrals: db.referrals(),
            bills: db.bills(),
            loyalty,
            settings,
            audit,
        }
    }

    /// True when the client has at least one Paid bill at the branch.
    pub async fn has_visited_branch(
        &self,
        client_id: &str,
        branch_id: &str,
    ) -> BillingResult<bool> {
        Ok(self.bills.has_paid_bill(client_id, branch_id).await?)
    }

    /// Returns the client's code for the branch, issuing one if eligible.
    ///
    /// `None` means the client has no Paid bill at the branch yet.
    pub async fn get_referral_code(
        &self,
        client_id: &str,
        branch_id: &str,
    ) -> BillingResult<Option<String>> {
        self.issue_code(client_id, branch_id, "system").await
    }

    pub(crate) async fn issue_code(
        &self,
        client_id: &str,
        branch_id: &str,
        performed_by: &str,
    ) -> BillingResult<Option<String>> {
        validate_required("client_id", client_id)?;
        validate_required("branch_id", branch_id)?;

        if let Some(existing) = self.referrals.code_for(client_id, branch_id).await? {
            return Ok(Some(existing.code));
        }

        if !self.has_visited_branch(client_id, branch_id).await? {
            debug!(client_id, branch_id, "No paid visit yet, no referral code");
            return Ok(None);
        }

        for attempt in 1..=self.settings.max_code_attempts {
            let entropy = Uuid::new_v4().simple().to_string();
            let code = ReferralCode {
                code: generate_code(client_id, branch_id, &entropy, self.settings.code_suffix_len),
                client_id: client_id.to_string(),
                branch_id: branch_id.to_string(),
                created_at: Utc::now(),
            };

            match self.referrals.insert_code(&code).await {
                Ok(()) => {
                    info!(client_id, branch_id, code = %code.code, "Referral code issued");
                    self.audit
                        .record(AuditEvent {
                            bill_id: None,
                            action: AuditAction::ReferralCodeIssued,
                            outcome: AuditOutcome::Success,
                            performed_by,
                            branch_id,
                            details: json!({ "client_id": client_id, "code": code.code }),
                        })
                        .await;
                    return Ok(Some(code.code));
                }
                Err(e) if e.is_unique_violation_on("referral_codes.code") => {
                    debug!(attempt, code = %code.code, "Referral code collided, regenerating");
                }
                Err(e) if e.is_unique_violation_on("referral_codes.client_id") => {
                    // Issued concurrently for the same pair
                    let stored = self.referrals.code_for(client_id, branch_id).await?;
                    return Ok(stored.map(|c| c.code));
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(client_id, branch_id, "Could not find a free referral code");
        Err(BillingError::CodeSpaceExhausted {
            attempts: self.settings.max_code_attempts,
        })
    }

    /// Credits a referral of `new_client_id` through `code`.
    ///
    /// Rejections are audited as failed `ReferralProcessed` entries.
    ///
    /// ## Errors
    /// `InvalidCode`, `BranchMismatch`, `SelfReferral` or
    /// `AlreadyProcessed`, each before anything is written.
    pub async fn process_referral(
        &self,
        new_client_id: &str,
        code: &str,
        branch_id: Option<&str>,
        performed_by: &str,
    ) -> BillingResult<ReferralOutcome> {
        let record = match self
            .record_referral(new_client_id, code, branch_id, performed_by)
            .await
        {
            Ok(record) => record,
            Err(err) => {
                warn!(new_client_id, code, error = %err, "Referral rejected");
                let audit_branch = match &err {
                    BillingError::BranchMismatch { code_branch, .. } => code_branch.as_str(),
                    BillingError::AlreadyProcessed { branch_id, .. } => branch_id.as_str(),
                    _ => branch_id.unwrap_or_default(),
                };
                self.audit
                    .record(AuditEvent {
                        bill_id: None,
                        action: AuditAction::ReferralProcessed,
                        outcome: AuditOutcome::Failed,
                        performed_by,
                        branch_id: audit_branch,
                        details: json!({
                            "new_client_id": new_client_id,
                            "code": code,
                            "error": err.to_string(),
                        }),
                    })
                    .await;
                return Err(err);
            }
        };

        let mut warnings = Vec::new();
        let note = format!("referral {}", record.code);

        let referrer_credit = self
            .credit(
                &record.referrer_id,
                &record.branch_id,
                record.referrer_points,
                &note,
                &mut warnings,
            )
            .await;
        let new_client_credit = self
            .credit(
                &record.new_client_id,
                &record.branch_id,
                record.new_client_points,
                &note,
                &mut warnings,
            )
            .await;

        let outcome = if warnings.is_empty() {
            AuditOutcome::Success
        } else {
            AuditOutcome::Degraded
        };

        info!(
            new_client_id,
            referrer_id = %record.referrer_id,
            branch_id = %record.branch_id,
            warnings = warnings.len(),
            "Referral processed"
        );
        self.audit
            .record(AuditEvent {
                bill_id: None,
                action: AuditAction::ReferralProcessed,
                outcome,
                performed_by,
                branch_id: &record.branch_id,
                details: json!({
                    "new_client_id": record.new_client_id,
                    "referrer_id": record.referrer_id,
                    "code": record.code,
                    "referrer_points": record.referrer_points,
                    "new_client_points": record.new_client_points,
                    "warnings": warnings,
                }),
            })
            .await;

        Ok(ReferralOutcome {
            record,
            referrer_credit,
            new_client_credit,
            warnings,
        })
    }

    /// Referrals credited to a referrer at a branch, newest first.
    pub async fn get_referrals_by_referrer(
        &self,
        referrer_id: &str,
        branch_id: &str,
    ) -> BillingResult<Vec<ReferralRecord>> {
        Ok(self.referrals.records_by_referrer(referrer_id, branch_id).await?)
    }

    /// Checks a referral and stores its record. Nothing is credited here.
    async fn record_referral(
        &self,
        new_client_id: &str,
        code: &str,
        branch_id: Option<&str>,
        performed_by: &str,
    ) -> BillingResult<ReferralRecord> {
        validate_required("new_client_id", new_client_id)?;

        let normalized = normalize_code(code).map_err(|_| BillingError::InvalidCode {
            code: code.to_string(),
        })?;

        let issued = self
            .referrals
            .find_code(&normalized)
            .await?
            .ok_or_else(|| BillingError::InvalidCode {
                code: normalized.clone(),
            })?;

        if let Some(requested) = branch_id {
            if requested != issued.branch_id {
                return Err(BillingError::BranchMismatch {
                    code_branch: issued.branch_id,
                    requested_branch: requested.to_string(),
                });
            }
        }

        if issued.client_id == new_client_id {
            return Err(BillingError::SelfReferral {
                client_id: new_client_id.to_string(),
            });
        }

        let already_processed = || BillingError::AlreadyProcessed {
            new_client_id: new_client_id.to_string(),
            branch_id: issued.branch_id.clone(),
        };

        if self
            .referrals
            .record_for(new_client_id, &issued.branch_id)
            .await?
            .is_some()
        {
            return Err(already_processed());
        }

        let record = ReferralRecord {
            id: Uuid::new_v4().to_string(),
            new_client_id: new_client_id.to_string(),
            referrer_id: issued.client_id.clone(),
            branch_id: issued.branch_id.clone(),
            code: issued.code.clone(),
            referrer_points: self.settings.referrer_points,
            new_client_points: self.settings.new_client_points,
            processed_by: performed_by.to_string(),
            created_at: Utc::now(),
        };

        match self.referrals.insert_record(&record).await {
            Ok(()) => {}
            Err(e) if e.is_unique_violation_on("referral_records.new_client_id") => {
                return Err(already_processed());
            }
            Err(e) => return Err(e.into()),
        }

        Ok(record)
    }

    async fn credit(
        &self,
        client_id: &str,
        branch_id: &str,
        points: i64,
        note: &str,
        warnings: &mut Vec<String>,
    ) -> Option<LoyaltyLogEntry> {
        if points == 0 {
            return None;
        }

        match self.loyalty.credit_points(client_id, branch_id, points, note).await {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(client_id, branch_id, points, error = %e, "Referral credit failed");
                warnings.push(format!("crediting {points} points to {client_id} failed: {e}"));
                None
            }
        }
    }
}
