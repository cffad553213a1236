//! # Bill Repository
//!
//! Database operations for bills and their lines.
//!
//! ## Bill Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Bill Lifecycle                                    │
//! │                                                                         │
//! │  1. INSERT (one transaction: bill row + every line)                    │
//! │     └── insert() → status 'paid'                                       │
//! │                                                                         │
//! │  2. (OPTIONAL) ONE TERMINAL TRANSITION                                 │
//! │     ├── mark_refunded() → 'refunded'   WHERE status = 'paid'           │
//! │     └── mark_voided()   → 'voided'     WHERE status = 'paid'           │
//! │                                                                         │
//! │  Lines are never updated; bills are never deleted.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use salon_core::billing::bill_number_prefix;
use salon_core::{
    Bill, BillState, BillStatus, DiscountTerms, LineItem, LineItemKind, PaymentMethod, Promotion,
    RefundDetails, SalesType, VoidDetails, Witness,
};

/// Optional filters for listing a branch's bills.
#[derive(Debug, Clone, Default)]
pub struct BillFilter {
    pub status: Option<BillStatus>,
    /// Inclusive lower bound on `created_at`.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct BillRow {
    id: String,
    bill_number: String,
    branch_id: String,
    client_id: Option<String>,
    sales_type: SalesType,
    subtotal_cents: i64,
    discount_terms: String,
    discount_cents: i64,
    loyalty_points_used: i64,
    loyalty_discount_cents: i64,
    tax_rate_bps: i64,
    tax_cents: i64,
    total_cents: i64,
    payment_method: PaymentMethod,
    promotion: Option<String>,
    notes: Option<String>,
    status: BillStatus,
    refund_amount_cents: Option<i64>,
    refund_reason: Option<String>,
    refunded_by: Option<String>,
    refunded_at: Option<DateTime<Utc>>,
    void_reason: Option<String>,
    voided_by: Option<String>,
    witness_id: Option<String>,
    witness_email: Option<String>,
    witness_name: Option<String>,
    voided_at: Option<DateTime<Utc>>,
    created_by: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct BillItemRow {
    id: String,
    kind: LineItemKind,
    catalog_id: String,
    name: String,
    unit_price_cents: i64,
    quantity: i64,
    line_total_cents: i64,
    staff_id: Option<String>,
}

impl From<BillItemRow> for LineItem {
    fn from(row: BillItemRow) -> Self {
        LineItem {
            id: row.id,
            kind: row.kind,
            catalog_id: row.catalog_id,
            name: row.name,
            unit_price_cents: row.unit_price_cents,
            quantity: row.quantity,
            line_total_cents: row.line_total_cents,
            staff_id: row.staff_id,
        }
    }
}

impl BillRow {
    fn state(&self) -> DbResult<BillState> {
        let corrupt = |what: &str| DbError::corrupt("Bill", &self.id, format!("missing {what}"));

        match self.status {
            BillStatus::Paid => Ok(BillState::Paid),
            BillStatus::Refunded => Ok(BillState::Refunded(RefundDetails {
                amount_cents: self
                    .refund_amount_cents
                    .ok_or_else(|| corrupt("refund_amount_cents"))?,
                reason: self.refund_reason.clone().unwrap_or_default(),
                approved_by: self.refunded_by.clone().ok_or_else(|| corrupt("refunded_by"))?,
                refunded_at: self.refunded_at.ok_or_else(|| corrupt("refunded_at"))?,
            })),
            BillStatus::Voided => Ok(BillState::Voided(VoidDetails {
                reason: self.void_reason.clone().unwrap_or_default(),
                approved_by: self.voided_by.clone().ok_or_else(|| corrupt("voided_by"))?,
                witness: Witness {
                    id: self.witness_id.clone().ok_or_else(|| corrupt("witness_id"))?,
                    email: self.witness_email.clone().unwrap_or_default(),
                    name: self.witness_name.clone().unwrap_or_default(),
                },
                voided_at: self.voided_at.ok_or_else(|| corrupt("voided_at"))?,
            })),
        }
    }

    fn into_bill(self, items: Vec<LineItem>) -> DbResult<Bill> {
        let state = self.state()?;

        let discount_terms: DiscountTerms = serde_json::from_str(&self.discount_terms)
            .map_err(|e| DbError::corrupt("Bill", &self.id, e.to_string()))?;

        let promotion: Option<Promotion> = self
            .promotion
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| DbError::corrupt("Bill", &self.id, e.to_string()))?;

        let tax_rate_bps = u32::try_from(self.tax_rate_bps)
            .map_err(|e| DbError::corrupt("Bill", &self.id, e.to_string()))?;

        Ok(Bill {
            id: self.id,
            bill_number: self.bill_number,
            branch_id: self.branch_id,
            client_id: self.client_id,
            items,
            sales_type: self.sales_type,
            subtotal_cents: self.subtotal_cents,
            discount_terms,
            discount_cents: self.discount_cents,
            loyalty_points_used: self.loyalty_points_used,
            loyalty_discount_cents: self.loyalty_discount_cents,
            tax_rate_bps,
            tax_cents: self.tax_cents,
            total_cents: self.total_cents,
            payment_method: self.payment_method,
            promotion,
            notes: self.notes,
            state,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }
}

const SELECT_BILL: &str = r#"
    SELECT
        id, bill_number, branch_id, client_id, sales_type,
        subtotal_cents, discount_terms, discount_cents,
        loyalty_points_used, loyalty_discount_cents,
        tax_rate_bps, tax_cents, total_cents,
        payment_method, promotion, notes, status,
        refund_amount_cents, refund_reason, refunded_by, refunded_at,
        void_reason, voided_by, witness_id, witness_email, witness_name, voided_at,
        created_by, created_at
    FROM bills
"#;

/// Repository for bill database operations.
#[derive(Debug, Clone)]
pub struct BillRepository {
    pool: SqlitePool,
}

impl BillRepository {
    pub fn new(pool: SqlitePool) -> Self {
        BillRepository { pool }
    }

    /// Inserts a bill and all of its lines in one transaction.
    ///
    /// ## Errors
    /// `UniqueViolation` on `bills.bill_number` when another bill took the
    /// same number first.
    pub async fn insert(&self, bill: &Bill) -> DbResult<()> {
        debug!(bill_id = %bill.id, bill_number = %bill.bill_number, "Inserting bill");

        let discount_terms = serde_json::to_string(&bill.discount_terms)
            .map_err(|e| DbError::Internal(e.to_string()))?;
        let promotion = bill
            .promotion
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| DbError::Internal(e.to_string()))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO bills (
                id, bill_number, branch_id, client_id, sales_type,
                subtotal_cents, discount_terms, discount_cents,
                loyalty_points_used, loyalty_discount_cents,
                tax_rate_bps, tax_cents, total_cents,
                payment_method, promotion, notes, status,
                created_by, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8,
                ?9, ?10,
                ?11, ?12, ?13,
                ?14, ?15, ?16, ?17,
                ?18, ?19
            )
            "#,
        )
        .bind(&bill.id)
        .bind(&bill.bill_number)
        .bind(&bill.branch_id)
        .bind(&bill.client_id)
        .bind(bill.sales_type)
        .bind(bill.subtotal_cents)
        .bind(&discount_terms)
        .bind(bill.discount_cents)
        .bind(bill.loyalty_points_used)
        .bind(bill.loyalty_discount_cents)
        .bind(i64::from(bill.tax_rate_bps))
        .bind(bill.tax_cents)
        .bind(bill.total_cents)
        .bind(bill.payment_method)
        .bind(&promotion)
        .bind(&bill.notes)
        .bind(bill.status())
        .bind(&bill.created_by)
        .bind(bill.created_at)
        .execute(&mut *tx)
        .await?;

        for (position, item) in bill.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO bill_items (
                    id, bill_id, position, kind, catalog_id, name,
                    unit_price_cents, quantity, line_total_cents, staff_id
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )
            .bind(&item.id)
            .bind(&bill.id)
            .bind(position as i64)
            .bind(item.kind)
            .bind(&item.catalog_id)
            .bind(&item.name)
            .bind(item.unit_price_cents)
            .bind(item.quantity)
            .bind(item.line_total_cents)
            .bind(&item.staff_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Gets a bill with its lines.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Bill>> {
        let sql = format!("{SELECT_BILL} WHERE id = ?1");
        let row: Option<BillRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let items = self.get_items(&row.id).await?;
                Ok(Some(row.into_bill(items)?))
            }
            None => Ok(None),
        }
    }

    /// Lists a branch's bills, newest first.
    pub async fn list_by_branch(&self, branch_id: &str, filter: &BillFilter) -> DbResult<Vec<Bill>> {
        let sql = format!(
            r#"{SELECT_BILL}
            WHERE branch_id = ?1
              AND (?2 IS NULL OR status = ?2)
              AND (?3 IS NULL OR created_at >= ?3)
              AND (?4 IS NULL OR created_at <= ?4)
            ORDER BY created_at DESC, bill_number DESC
            "#
        );

        let rows: Vec<BillRow> = sqlx::query_as(&sql)
            .bind(branch_id)
            .bind(filter.status)
            .bind(filter.start)
            .bind(filter.end)
            .fetch_all(&self.pool)
            .await?;

        let mut bills = Vec::with_capacity(rows.len());
        for row in rows {
            let items = self.get_items(&row.id).await?;
            bills.push(row.into_bill(items)?);
        }
        Ok(bills)
    }

    /// Lines of a bill in entry order.
    pub async fn get_items(&self, bill_id: &str) -> DbResult<Vec<LineItem>> {
        let rows: Vec<BillItemRow> = sqlx::query_as(
            r#"
            SELECT id, kind, catalog_id, name, unit_price_cents,
                   quantity, line_total_cents, staff_id
            FROM bill_items
            WHERE bill_id = ?1
            ORDER BY position
            "#,
        )
        .bind(bill_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LineItem::from).collect())
    }

    /// Next free bill-number sequence for a branch on a day (starts at 1).
    ///
    /// Counted over the branch's own bills only, so branches whose ids
    /// share a short code keep separate sequences.
    pub async fn next_sequence(&self, branch_id: &str, date: NaiveDate) -> DbResult<u32> {
        let prefix = bill_number_prefix(date, branch_id);

        let max: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(CAST(substr(bill_number, ?2) AS INTEGER))
            FROM bills
            WHERE branch_id = ?3 AND bill_number LIKE ?1 || '%'
            "#,
        )
        .bind(&prefix)
        .bind(prefix.len() as i64 + 1)
        .bind(branch_id)
        .fetch_one(&self.pool)
        .await?;

        let next = max.unwrap_or(0) + 1;
        u32::try_from(next).map_err(|e| DbError::Internal(e.to_string()))
    }

    /// True when the client has at least one Paid bill at the branch.
    pub async fn has_paid_bill(&self, client_id: &str, branch_id: &str) -> DbResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM bills
                WHERE client_id = ?1 AND branch_id = ?2 AND status = 'paid'
            )
            "#,
        )
        .bind(client_id)
        .bind(branch_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Moves a Paid bill to Refunded.
    ///
    /// Returns `false` when the bill was no longer Paid.
    pub async fn mark_refunded(&self, bill_id: &str, refund: &RefundDetails) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE bills SET
                status = 'refunded',
                refund_amount_cents = ?2,
                refund_reason = ?3,
                refunded_by = ?4,
                refunded_at = ?5
            WHERE id = ?1 AND status = 'paid'
            "#,
        )
        .bind(bill_id)
        .bind(refund.amount_cents)
        .bind(&refund.reason)
        .bind(&refund.approved_by)
        .bind(refund.refunded_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Moves a Paid bill to Voided.
    ///
    /// Returns `false` when the bill was no longer Paid.
    pub async fn mark_voided(&self, bill_id: &str, void: &VoidDetails) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE bills SET
                status = 'voided',
                void_reason = ?2,
                voided_by = ?3,
                witness_id = ?4,
                witness_email = ?5,
                witness_name = ?6,
                voided_at = ?7
            WHERE id = ?1 AND status = 'paid'
            "#,
        )
        .bind(bill_id)
        .bind(&void.reason)
        .bind(&void.approved_by)
        .bind(&void.witness.id)
        .bind(&void.witness.email)
        .bind(&void.witness.name)
        .bind(void.voided_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Duration;

    fn sample_bill(id: &str, number: &str, client: Option<&str>) -> Bill {
        Bill {
            id: id.to_string(),
            bill_number: number.to_string(),
            branch_id: "branch-1".to_string(),
            client_id: client.map(str::to_string),
            items: vec![
                LineItem {
                    id: format!("{id}-l1"),
                    kind: LineItemKind::Service,
                    catalog_id: "svc-color".to_string(),
                    name: "Hair Color".to_string(),
                    unit_price_cents: 150_000,
                    quantity: 1,
                    line_total_cents: 150_000,
                    staff_id: Some("stylist-1".to_string()),
                },
                LineItem {
                    id: format!("{id}-l2"),
                    kind: LineItemKind::Product,
                    catalog_id: "prod-serum".to_string(),
                    name: "Hair Serum".to_string(),
                    unit_price_cents: 45_000,
                    quantity: 2,
                    line_total_cents: 90_000,
                    staff_id: None,
                },
            ],
            sales_type: SalesType::Mixed,
            subtotal_cents: 240_000,
            discount_terms: DiscountTerms::Percentage { bps: 1000 },
            discount_cents: 24_000,
            loyalty_points_used: 0,
            loyalty_discount_cents: 0,
            tax_rate_bps: 0,
            tax_cents: 0,
            total_cents: 216_000,
            payment_method: PaymentMethod::EWallet,
            promotion: Some(Promotion {
                code: Some("RAINY10".to_string()),
                name: "Rainy Day".to_string(),
                description: None,
            }),
            notes: None,
            state: BillState::Paid,
            created_by: "cashier-1".to_string(),
            created_at: Utc::now(),
        }
    }

    async fn repo() -> BillRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().bills()
    }

    #[tokio::test]
    async fn test_insert_and_get_round_trip() {
        let bills = repo().await;
        let bill = sample_bill("b1", "20260101-BRAN-0001", Some("client-1"));
        bills.insert(&bill).await.unwrap();

        let loaded = bills.get_by_id("b1").await.unwrap().unwrap();
        assert_eq!(loaded.items.len(), 2);
        assert_eq!(loaded.items[0].kind, LineItemKind::Service);
        assert_eq!(loaded.discount_terms, bill.discount_terms);
        assert_eq!(loaded.promotion, bill.promotion);
        assert_eq!(loaded.payment_method, PaymentMethod::EWallet);
        assert_eq!(loaded.status(), BillStatus::Paid);

        assert!(bills.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_bill_number_is_unique_violation() {
        let bills = repo().await;
        bills
            .insert(&sample_bill("b1", "20260101-BRAN-0001", None))
            .await
            .unwrap();
        let err = bills
            .insert(&sample_bill("b2", "20260101-BRAN-0001", None))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation_on("bill_number"));

        // Lines of the failed insert were rolled back with it
        assert!(bills.get_items("b2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_next_sequence_per_day() {
        let bills = repo().await;
        let day = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert_eq!(bills.next_sequence("branch-1", day).await.unwrap(), 1);

        bills
            .insert(&sample_bill("b1", "20260101-BRAN-0001", None))
            .await
            .unwrap();
        bills
            .insert(&sample_bill("b2", "20260101-BRAN-0007", None))
            .await
            .unwrap();

        assert_eq!(bills.next_sequence("branch-1", day).await.unwrap(), 8);
        let next_day = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        assert_eq!(bills.next_sequence("branch-1", next_day).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sequences_are_per_branch_not_per_code() {
        let bills = repo().await;
        let day = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        bills
            .insert(&sample_bill("b1", "20260101-BRAN-0001", None))
            .await
            .unwrap();

        // "branch-2" abbreviates to the same BRAN code
        assert_eq!(bills.next_sequence("branch-2", day).await.unwrap(), 1);

        let mut other = sample_bill("b2", "20260101-BRAN-0001", None);
        other.branch_id = "branch-2".to_string();
        bills.insert(&other).await.unwrap();

        assert_eq!(bills.next_sequence("branch-1", day).await.unwrap(), 2);
        assert_eq!(bills.next_sequence("branch-2", day).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_terminal_transition_happens_once() {
        let bills = repo().await;
        bills
            .insert(&sample_bill("b1", "20260101-BRAN-0001", Some("c1")))
            .await
            .unwrap();

        let refund = RefundDetails {
            amount_cents: 216_000,
            reason: "service complaint".to_string(),
            approved_by: "mgr-1".to_string(),
            refunded_at: Utc::now(),
        };
        assert!(bills.mark_refunded("b1", &refund).await.unwrap());
        assert!(!bills.mark_refunded("b1", &refund).await.unwrap());

        let void = VoidDetails {
            reason: "wrong client".to_string(),
            approved_by: "mgr-1".to_string(),
            witness: Witness {
                id: "mgr-2".to_string(),
                email: "mgr2@salon.test".to_string(),
                name: "Manager Two".to_string(),
            },
            voided_at: Utc::now(),
        };
        assert!(!bills.mark_voided("b1", &void).await.unwrap());

        let loaded = bills.get_by_id("b1").await.unwrap().unwrap();
        assert_eq!(loaded.state, BillState::Refunded(refund));
    }

    #[tokio::test]
    async fn test_list_by_branch_filters() {
        let bills = repo().await;
        let mut old = sample_bill("b-old", "20250101-BRAN-0001", Some("c1"));
        old.created_at = Utc::now() - Duration::days(30);
        bills.insert(&old).await.unwrap();
        bills
            .insert(&sample_bill("b-new", "20260101-BRAN-0001", Some("c1")))
            .await
            .unwrap();

        let all = bills
            .list_by_branch("branch-1", &BillFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "b-new");

        let recent = bills
            .list_by_branch(
                "branch-1",
                &BillFilter {
                    start: Some(Utc::now() - Duration::days(1)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);

        let voided = bills
            .list_by_branch(
                "branch-1",
                &BillFilter {
                    status: Some(BillStatus::Voided),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(voided.is_empty());

        assert!(bills.has_paid_bill("c1", "branch-1").await.unwrap());
        assert!(!bills.has_paid_bill("c1", "branch-2").await.unwrap());
    }
}
