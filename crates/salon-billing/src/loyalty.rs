//! # Loyalty Ledger
//!
//! Branch-scoped point balances. Every change is a version-checked write
//! that appends one log entry in the same transaction.
//!
//! ## Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  earn_points    points = floor(amount × rate); 0 points is a no-op      │
//! │  redeem_points  balance ≥ points or InsufficientPoints (nothing written)│
//! │  credit_points  fixed grant (referrals, promotions)                     │
//! │  get_points     balance, 0 for a client with no account                 │
//! │                                                                         │
//! │  read (balance, version) ──► check ──► UPDATE ... WHERE version = ?     │
//! │           ▲                                   │                         │
//! │           └──────── Conflict: backoff ◄───────┘                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use ts_rs::TS;

use salon_core::loyalty::{balance_after_redeem, points_earned, redemption_value, EarnRate};
use salon_core::validation::validate_points;
use salon_core::{LoyaltyEntryType, LoyaltyLogEntry, Money};
use salon_db::{Database, LoyaltyChange, LoyaltyRepository};

use crate::config::ConcurrencySettings;
use crate::error::{BillingError, BillingResult};
use crate::retry::with_conflict_retry;

/// A completed redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Redemption {
    pub entry: LoyaltyLogEntry,
    /// points × point value.
    pub discount_cents: i64,
}

#[derive(Debug, Clone)]
pub struct LoyaltyLedger {
    repo: LoyaltyRepository,
    concurrency: ConcurrencySettings,
}

impl LoyaltyLedger {
    pub fn new(db: &Database, concurrency: ConcurrencySettings) -> Self {
        LoyaltyLedger {
            repo: db.loyalty(),
            concurrency,
        }
    }

    /// Current balance. A client without an account has 0 points.
    pub async fn get_points(&self, client_id: &str, branch_id: &str) -> BillingResult<i64> {
        let account = self.repo.get_account(client_id, branch_id).await?;
        Ok(account.map(|a| a.balance).unwrap_or(0))
    }

    /// Credits `floor(amount × rate)` points.
    ///
    /// Returns `None` when the amount earns nothing.
    pub async fn earn_points(
        &self,
        client_id: &str,
        branch_id: &str,
        amount: Money,
        bill_id: Option<&str>,
        rate: EarnRate,
    ) -> BillingResult<Option<LoyaltyLogEntry>> {
        let points = points_earned(amount, rate);
        if points <= 0 {
            debug!(client_id, branch_id, amount = %amount, "Amount earns no points");
            return Ok(None);
        }
        validate_points(points)?;

        let entry = self
            .apply(client_id, branch_id, LoyaltyEntryType::Earned, points, bill_id, None)
            .await?;

        info!(
            client_id,
            branch_id,
            points,
            balance = entry.resulting_balance,
            "Loyalty points earned"
        );
        Ok(Some(entry))
    }

    /// Grants a fixed number of points, e.g. a referral reward.
    pub async fn credit_points(
        &self,
        client_id: &str,
        branch_id: &str,
        points: i64,
        note: &str,
    ) -> BillingResult<LoyaltyLogEntry> {
        validate_points(points)?;
        if points == 0 {
            return Err(BillingError::Validation(
                "credited points must be positive".into(),
            ));
        }

        let entry = self
            .apply(
                client_id,
                branch_id,
                LoyaltyEntryType::Earned,
                points,
                None,
                Some(note),
            )
            .await?;

        info!(client_id, branch_id, points, note, "Loyalty points credited");
        Ok(entry)
    }

    /// Debits `points` and returns the discount they are worth.
    ///
    /// ## Errors
    /// `InsufficientPoints` when the balance is smaller than `points`; the
    /// balance is left unchanged.
    pub async fn redeem_points(
        &self,
        client_id: &str,
        branch_id: &str,
        points: i64,
        bill_id: Option<&str>,
        point_value: Money,
    ) -> BillingResult<Redemption> {
        validate_points(points)?;
        if points == 0 {
            return Err(BillingError::Validation(
                "redeemed points must be positive".into(),
            ));
        }

        let discount = redemption_value(points, point_value)?;
        let entry = self
            .apply(
                client_id,
                branch_id,
                LoyaltyEntryType::Redeemed,
                -points,
                bill_id,
                None,
            )
            .await?;

        info!(
            client_id,
            branch_id,
            points,
            discount = %discount,
            balance = entry.resulting_balance,
            "Loyalty points redeemed"
        );
        Ok(Redemption {
            entry,
            discount_cents: discount.cents(),
        })
    }

    /// Log entries, newest first.
    pub async fn history(
        &self,
        client_id: &str,
        branch_id: &str,
    ) -> BillingResult<Vec<LoyaltyLogEntry>> {
        Ok(self.repo.history(client_id, branch_id).await?)
    }

    async fn apply(
        &self,
        client_id: &str,
        branch_id: &str,
        entry_type: LoyaltyEntryType,
        delta: i64,
        bill_id: Option<&str>,
        note: Option<&str>,
    ) -> BillingResult<LoyaltyLogEntry> {
        let resource = format!("loyalty {client_id}/{branch_id}");
        let ledger = self;

        with_conflict_retry(&self.concurrency, &resource, move || async move {
            let (balance, version) = match ledger.repo.get_account(client_id, branch_id).await? {
                Some(account) => (account.balance, account.version),
                None => (0, 0),
            };

            if delta < 0 {
                balance_after_redeem(balance, -delta)?;
            }

            let change = LoyaltyChange {
                client_id: client_id.to_string(),
                branch_id: branch_id.to_string(),
                entry_type,
                points: delta,
                bill_id: bill_id.map(str::to_string),
                note: note.map(str::to_string),
            };
            Ok(ledger.repo.apply_change(&change, version).await?)
        })
        .await
    }
}
