//! # Transaction Ledger
//!
//! Single authority for the bill lifecycle and the saga that follows every
//! sale.
//!
//! ## create_bill
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  PRECONDITIONS (error, nothing written)                                 │
//! │    validate lines, discount, tax rate, redemption                       │
//! │    compute totals; balance ≥ points to redeem                           │
//! │                                                                         │
//! │  COMMIT (durability boundary)                                           │
//! │    INSERT bill + lines, status Paid ──► audit BillCreated               │
//! │                                                                         │
//! │  SAGA (best effort, strictly sequential, reported on the receipt)       │
//! │    1. product lines      ──► FIFO deduct from otc                       │
//! │    2. mapped services    ──► FIFO deduct from salon-use                 │
//! │    3. redeem points                                                     │
//! │    4. earn on the final total                                           │
//! │    5. referral code eligibility                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## State Machine
//! ```text
//! Paid ──refund_bill──► Refunded (terminal)
//!   │
//!   └────void_bill────► Voided   (terminal, needs a witness)
//! ```
//! Refunds annotate the bill only; stock and loyalty are not reversed.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use salon_core::billing::{classify_sales_type, compute_totals, format_bill_number, BillTransition};
use salon_core::loyalty::redemption_value;
use salon_core::validation::{
    validate_bill_lines, validate_discount_terms, validate_points, validate_reason,
    validate_required, validate_tax_rate_bps, validate_witness,
};
use salon_core::{
    Actor, AuditAction, AuditOutcome, Bill, BillState, DiscountTerms, LineItem, LineItemKind,
    Money, PaymentMethod, Promotion, TaxRate, UsageType, ValidationError, Witness,
};
use salon_db::{BillFilter, BillRepository, Database, MappingRepository};

use crate::audit::{AuditEvent, AuditLog};
use crate::config::{BillingConfig, LoyaltySettings};
use crate::error::{BillingError, BillingResult};
use crate::inventory::{DeductionContext, DeductionResult, FifoDeductionEngine};
use crate::loyalty::LoyaltyLedger;
use crate::referral::ReferralProgram;
use crate::saga::{CreateBillReceipt, StepKind, StepOutcome, StepReport};

// =============================================================================
// Inputs
// =============================================================================

/// A line as entered at the counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineItemInput {
    pub kind: LineItemKind,
    pub catalog_id: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
    #[serde(default)]
    pub staff_id: Option<String>,
}

impl LineItemInput {
    fn into_line_item(self) -> Result<LineItem, ValidationError> {
        let line_total = Money::from_cents(self.unit_price_cents)
            .checked_mul(self.quantity)
            .ok_or_else(|| ValidationError::OutOfRange {
                field: "line total".to_string(),
                min: 0,
                max: i64::MAX,
            })?;

        Ok(LineItem {
            id: Uuid::new_v4().to_string(),
            kind: self.kind,
            line_total_cents: line_total.cents(),
            catalog_id: self.catalog_id,
            name: self.name,
            unit_price_cents: self.unit_price_cents,
            quantity: self.quantity,
            staff_id: self.staff_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreateBillInput {
    /// None for a walk-in guest.
    #[serde(default)]
    pub client_id: Option<String>,
    pub branch_id: String,
    pub items: Vec<LineItemInput>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub discount: DiscountTerms,
    #[serde(default)]
    pub loyalty_points_to_redeem: i64,
    #[serde(default)]
    pub promotion: Option<Promotion>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Branch tax rate in basis points.
    #[serde(default)]
    pub tax_rate_bps: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RefundRequest {
    /// Defaults to the bill total.
    #[serde(default)]
    pub amount_cents: Option<i64>,
    pub reason: String,
}

// =============================================================================
// Transaction Ledger
// =============================================================================

#[derive(Debug, Clone)]
pub struct TransactionLedger {
    bills: BillRepository,
    mappings: MappingRepository,
    stock: FifoDeductionEngine,
    loyalty: LoyaltyLedger,
    referrals: ReferralProgram,
    audit: AuditLog,
    loyalty_settings: LoyaltySettings,
    max_number_attempts: u32,
}

impl TransactionLedger {
    pub fn new(
        db: &Database,
        config: &BillingConfig,
        stock: FifoDeductionEngine,
        loyalty: LoyaltyLedger,
        referrals: ReferralProgram,
        audit: AuditLog,
    ) -> Self {
        TransactionLedger {
            bills: db.bills(),
            mappings: db.mappings(),
            stock,
            loyalty,
            referrals,
            audit,
            loyalty_settings: config.loyalty.clone(),
            max_number_attempts: config.concurrency.max_conflict_retries,
        }
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Records a sale and runs its side effects.
    ///
    /// Returns once the bill is committed. Side-effect problems are on the
    /// receipt, never an `Err`.
    ///
    /// ## Errors
    /// - `Validation` for malformed input or a redemption by a guest
    /// - `InsufficientPoints` when the balance cannot cover the redemption
    /// - `Database` when the bill itself could not be stored
    pub async fn create_bill(
        &self,
        input: CreateBillInput,
        actor: &Actor,
    ) -> BillingResult<CreateBillReceipt> {
        validate_required("actor.id", &actor.id)?;
        validate_required("branch_id", &input.branch_id)?;
        if let Some(client_id) = &input.client_id {
            validate_required("client_id", client_id)?;
        }
        validate_discount_terms(&input.discount)?;
        validate_tax_rate_bps(input.tax_rate_bps)?;
        validate_points(input.loyalty_points_to_redeem)?;

        let branch_id = input.branch_id.clone();
        let client_id = input.client_id.clone();
        let points_to_redeem = input.loyalty_points_to_redeem;

        let items = input
            .items
            .into_iter()
            .map(LineItemInput::into_line_item)
            .collect::<Result<Vec<_>, _>>()?;
        validate_bill_lines(&items)?;

        if points_to_redeem > 0 {
            if client_id.is_none() {
                return Err(ValidationError::not_allowed(
                    "loyalty_points_to_redeem",
                    "guests cannot redeem points",
                )
                .into());
            }
            if !self.loyalty_settings.enabled {
                return Err(ValidationError::not_allowed(
                    "loyalty_points_to_redeem",
                    "loyalty is disabled",
                )
                .into());
            }
        }

        let point_value = self.loyalty_settings.point_value(&branch_id);
        let loyalty_discount = redemption_value(points_to_redeem, point_value)?;
        let totals = compute_totals(
            &items,
            input.discount,
            loyalty_discount,
            TaxRate::from_bps(input.tax_rate_bps),
        )?;

        if let (Some(client), true) = (&client_id, points_to_redeem > 0) {
            let balance = self.loyalty.get_points(client, &branch_id).await?;
            if balance < points_to_redeem {
                return Err(BillingError::InsufficientPoints {
                    balance,
                    requested: points_to_redeem,
                });
            }
        }

        let now = Utc::now();
        let mut bill = Bill {
            id: Uuid::new_v4().to_string(),
            bill_number: String::new(),
            branch_id: branch_id.clone(),
            client_id: client_id.clone(),
            sales_type: classify_sales_type(&items),
            items,
            subtotal_cents: totals.subtotal.cents(),
            discount_terms: input.discount,
            discount_cents: totals.discount.cents(),
            loyalty_points_used: points_to_redeem,
            loyalty_discount_cents: totals.loyalty_discount.cents(),
            tax_rate_bps: input.tax_rate_bps,
            tax_cents: totals.tax.cents(),
            total_cents: totals.total.cents(),
            payment_method: input.payment_method,
            promotion: input.promotion,
            notes: input.notes,
            state: BillState::Paid,
            created_by: actor.id.clone(),
            created_at: now,
        };

        self.persist_with_number(&mut bill).await?;

        info!(
            bill_id = %bill.id,
            bill_number = %bill.bill_number,
            branch_id = %bill.branch_id,
            sales_type = ?bill.sales_type,
            total = %bill.total(),
            "Bill created"
        );
        self.audit
            .record(AuditEvent {
                bill_id: Some(bill.id.as_str()),
                action: AuditAction::BillCreated,
                outcome: AuditOutcome::Success,
                performed_by: &actor.id,
                branch_id: &bill.branch_id,
                details: json!({
                    "bill_number": bill.bill_number,
                    "client_id": bill.client_id,
                    "sales_type": bill.sales_type,
                    "total_cents": bill.total_cents,
                    "line_count": bill.items.len(),
                }),
            })
            .await;

        let mut steps = Vec::new();
        let mut deductions = Vec::new();

        self.deduct_products(&bill, actor, &mut steps, &mut deductions)
            .await;
        self.deduct_service_usage(&bill, actor, &mut steps, &mut deductions)
            .await;

        if let Some(client) = bill.client_id.as_deref() {
            if bill.loyalty_points_used > 0 {
                steps.push(self.redeem_step(&bill, client, actor, point_value).await);
            }
            steps.push(self.earn_step(&bill, client, actor).await);
            steps.push(self.referral_step(&bill, client, actor).await);
        } else {
            debug!(bill_id = %bill.id, "Guest bill, skipping loyalty and referral");
            steps.push(StepReport::new(
                StepKind::LoyaltyEarn,
                None,
                StepOutcome::skipped("guest bill"),
            ));
            steps.push(StepReport::new(
                StepKind::ReferralCheck,
                None,
                StepOutcome::skipped("guest bill"),
            ));
        }

        let receipt = CreateBillReceipt {
            bill_id: bill.id,
            bill_number: bill.bill_number,
            sales_type: bill.sales_type,
            total_cents: bill.total_cents,
            loyalty_discount_cents: bill.loyalty_discount_cents,
            steps,
            deductions,
        };

        if !receipt.is_fully_applied() {
            warn!(
                bill_id = %receipt.bill_id,
                warnings = ?receipt.warnings(),
                "Bill committed with degraded side effects"
            );
        }

        Ok(receipt)
    }

    /// Assigns the next bill number and inserts, retrying on number
    /// collisions with concurrent sales.
    async fn persist_with_number(&self, bill: &mut Bill) -> BillingResult<()> {
        let date = bill.created_at.date_naive();

        for attempt in 1..=self.max_number_attempts {
            let sequence = self.bills.next_sequence(&bill.branch_id, date).await?;
            bill.bill_number = format_bill_number(date, &bill.branch_id, sequence);

            match self.bills.insert(bill).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_unique_violation_on("bills.bill_number") => {
                    debug!(attempt, bill_number = %bill.bill_number, "Bill number taken, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(BillingError::Contention {
            resource: format!("bill numbers for {}", bill.branch_id),
            attempts: self.max_number_attempts,
        })
    }

    // =========================================================================
    // Saga Steps
    // =========================================================================

    async fn deduct_products(
        &self,
        bill: &Bill,
        actor: &Actor,
        steps: &mut Vec<StepReport>,
        deductions: &mut Vec<DeductionResult>,
    ) {
        for line in bill.product_lines() {
            let report = self
                .deduct(
                    bill,
                    actor,
                    &line.catalog_id,
                    UsageType::Otc,
                    line.quantity,
                    deductions,
                )
                .await;
            steps.push(report);
        }
    }

    async fn deduct_service_usage(
        &self,
        bill: &Bill,
        actor: &Actor,
        steps: &mut Vec<StepReport>,
        deductions: &mut Vec<DeductionResult>,
    ) {
        for line in bill.service_lines() {
            let usages = match self.mappings.for_service(&line.catalog_id).await {
                Ok(usages) => usages,
                Err(e) => {
                    warn!(bill_id = %bill.id, service_id = %line.catalog_id, error = %e, "Could not read service mappings");
                    steps.push(StepReport::new(
                        StepKind::StockDeduction,
                        Some(line.catalog_id.as_str()),
                        StepOutcome::failed(format!("reading product mappings: {e}")),
                    ));
                    continue;
                }
            };

            for usage in usages {
                let quantity = usage.quantity_per_service.saturating_mul(line.quantity);
                let report = self
                    .deduct(
                        bill,
                        actor,
                        &usage.product_id,
                        UsageType::SalonUse,
                        quantity,
                        deductions,
                    )
                    .await;
                steps.push(report);
            }
        }
    }

    async fn deduct(
        &self,
        bill: &Bill,
        actor: &Actor,
        product_id: &str,
        usage_type: UsageType,
        quantity: i64,
        deductions: &mut Vec<DeductionResult>,
    ) -> StepReport {
        let ctx = DeductionContext {
            bill_id: Some(bill.id.as_str()),
            actor_id: &actor.id,
        };

        let (outcome, details) = match self
            .stock
            .deduct_stock_fifo(&bill.branch_id, product_id, usage_type, quantity, ctx)
            .await
        {
            Ok(result) => {
                let outcome = if result.success {
                    StepOutcome::Ok
                } else {
                    StepOutcome::degraded(format!(
                        "insufficient {usage_type} stock: short by {} of {}",
                        result.shortfall, result.requested
                    ))
                };
                let details = json!({
                    "product_id": product_id,
                    "usage_type": usage_type,
                    "requested": result.requested,
                    "deducted": result.deducted,
                    "shortfall": result.shortfall,
                    "deductions": result.deductions,
                });
                deductions.push(result);
                (outcome, details)
            }
            Err(e) => {
                warn!(bill_id = %bill.id, product_id, error = %e, "Stock deduction failed");
                let details = json!({
                    "product_id": product_id,
                    "usage_type": usage_type,
                    "requested": quantity,
                    "error": e.to_string(),
                });
                (StepOutcome::failed(e), details)
            }
        };

        self.audit_step(bill, actor, AuditAction::StockDeducted, &outcome, details)
            .await;
        StepReport::new(StepKind::StockDeduction, Some(product_id), outcome)
    }

    async fn redeem_step(
        &self,
        bill: &Bill,
        client_id: &str,
        actor: &Actor,
        point_value: Money,
    ) -> StepReport {
        let outcome = match self
            .loyalty
            .redeem_points(
                client_id,
                &bill.branch_id,
                bill.loyalty_points_used,
                Some(bill.id.as_str()),
                point_value,
            )
            .await
        {
            Ok(_) => StepOutcome::Ok,
            Err(e) => {
                warn!(bill_id = %bill.id, client_id, error = %e, "Loyalty redemption failed");
                StepOutcome::failed(e)
            }
        };

        self.audit_step(
            bill,
            actor,
            AuditAction::LoyaltyRedeemed,
            &outcome,
            json!({ "client_id": client_id, "points": bill.loyalty_points_used }),
        )
        .await;
        StepReport::new(StepKind::LoyaltyRedeem, Some(client_id), outcome)
    }

    async fn earn_step(&self, bill: &Bill, client_id: &str, actor: &Actor) -> StepReport {
        if !self.loyalty_settings.enabled {
            let outcome = StepOutcome::skipped("loyalty is disabled");
            self.audit_step(
                bill,
                actor,
                AuditAction::LoyaltyEarned,
                &outcome,
                json!({ "client_id": client_id, "points": 0 }),
            )
            .await;
            return StepReport::new(StepKind::LoyaltyEarn, Some(client_id), outcome);
        }

        let rate = self.loyalty_settings.earn_rate(&bill.branch_id);
        let (outcome, points) = match self
            .loyalty
            .earn_points(client_id, &bill.branch_id, bill.total(), Some(bill.id.as_str()), rate)
            .await
        {
            Ok(Some(entry)) => (StepOutcome::Ok, entry.points),
            Ok(None) => (StepOutcome::skipped("total earns no points"), 0),
            Err(e) => {
                warn!(bill_id = %bill.id, client_id, error = %e, "Loyalty earn failed");
                (StepOutcome::failed(e), 0)
            }
        };

        self.audit_step(
            bill,
            actor,
            AuditAction::LoyaltyEarned,
            &outcome,
            json!({
                "client_id": client_id,
                "points": points,
                "rate_bps": rate.bps(),
                "total_cents": bill.total_cents,
            }),
        )
        .await;
        StepReport::new(StepKind::LoyaltyEarn, Some(client_id), outcome)
    }

    async fn referral_step(&self, bill: &Bill, client_id: &str, actor: &Actor) -> StepReport {
        let (outcome, code) = match self
            .referrals
            .issue_code(client_id, &bill.branch_id, &actor.id)
            .await
        {
            Ok(Some(code)) => (StepOutcome::Ok, Some(code)),
            Ok(None) => (StepOutcome::skipped("client not eligible"), None),
            Err(e) => {
                warn!(bill_id = %bill.id, client_id, error = %e, "Referral eligibility check failed");
                (StepOutcome::failed(e), None)
            }
        };

        self.audit_step(
            bill,
            actor,
            AuditAction::ReferralChecked,
            &outcome,
            json!({ "client_id": client_id, "code": code }),
        )
        .await;
        StepReport::new(StepKind::ReferralCheck, Some(client_id), outcome)
    }

    async fn audit_step(
        &self,
        bill: &Bill,
        actor: &Actor,
        action: AuditAction,
        outcome: &StepOutcome,
        mut details: serde_json::Value,
    ) {
        let outcome = match outcome {
            StepOutcome::Ok => AuditOutcome::Success,
            StepOutcome::Skipped { reason } => {
                details["skipped"] = json!(reason);
                AuditOutcome::Success
            }
            StepOutcome::Degraded { reason } => {
                details["warning"] = json!(reason);
                AuditOutcome::Degraded
            }
            StepOutcome::Failed { reason } => {
                details["error"] = json!(reason);
                AuditOutcome::Failed
            }
        };
        self.audit
            .record(AuditEvent {
                bill_id: Some(bill.id.as_str()),
                action,
                outcome,
                performed_by: &actor.id,
                branch_id: &bill.branch_id,
                details,
            })
            .await;
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_bill_by_id(&self, bill_id: &str) -> BillingResult<Bill> {
        self.bills
            .get_by_id(bill_id)
            .await?
            .ok_or_else(|| BillingError::BillNotFound(bill_id.to_string()))
    }

    /// A branch's bills, newest first.
    pub async fn get_bills_by_branch(
        &self,
        branch_id: &str,
        filter: &BillFilter,
    ) -> BillingResult<Vec<Bill>> {
        if let (Some(start), Some(end)) = (filter.start, filter.end) {
            if start > end {
                return Err(BillingError::Validation(
                    "start date is after end date".into(),
                ));
            }
        }
        Ok(self.bills.list_by_branch(branch_id, filter).await?)
    }

    // =========================================================================
    // Terminal Transitions
    // =========================================================================

    /// Marks a Paid bill Refunded. Stock and loyalty are left as they are.
    ///
    /// ## Errors
    /// `BillNotFound`, `AlreadyFinalized`, or `Validation` for a bad amount
    /// or reason.
    pub async fn refund_bill(
        &self,
        bill_id: &str,
        request: RefundRequest,
        actor: &Actor,
    ) -> BillingResult<Bill> {
        validate_required("actor.id", &actor.id)?;
        validate_reason(&request.reason)?;

        let transition = BillTransition::Refund {
            amount: request.amount_cents.map(Money::from_cents),
            reason: request.reason,
            approved_by: actor.id.clone(),
        };
        self.transition(bill_id, transition, AuditAction::BillRefunded, actor)
            .await
    }

    /// Marks a Paid bill Voided.
    ///
    /// The witness is checked first: without one the call fails with
    /// `WitnessRequired` whatever the bill's state.
    pub async fn void_bill(
        &self,
        bill_id: &str,
        reason: &str,
        actor: &Actor,
        witness: Option<Witness>,
    ) -> BillingResult<Bill> {
        validate_witness(witness.as_ref(), &actor.id)?;
        validate_required("actor.id", &actor.id)?;
        validate_reason(reason)?;

        let transition = BillTransition::Void {
            reason: reason.to_string(),
            approved_by: actor.id.clone(),
            witness,
        };
        self.transition(bill_id, transition, AuditAction::BillVoided, actor)
            .await
    }

    async fn transition(
        &self,
        bill_id: &str,
        transition: BillTransition,
        action: AuditAction,
        actor: &Actor,
    ) -> BillingResult<Bill> {
        let mut bill = self.get_bill_by_id(bill_id).await?;

        let next = match bill
            .state
            .apply(&bill.id, bill.total(), transition, Utc::now())
        {
            Ok(next) => next,
            Err(e) => {
                let err = BillingError::from(e);
                self.audit_transition(
                    &bill,
                    actor,
                    action,
                    AuditOutcome::Failed,
                    json!({ "error": err.to_string() }),
                )
                .await;
                return Err(err);
            }
        };

        let stored = match &next {
            BillState::Refunded(details) => self.bills.mark_refunded(&bill.id, details).await?,
            BillState::Voided(details) => self.bills.mark_voided(&bill.id, details).await?,
            BillState::Paid => false,
        };

        if !stored {
            // Another terminal transition landed between read and write
            let current = self.get_bill_by_id(bill_id).await?;
            let err = BillingError::AlreadyFinalized {
                bill_id: bill_id.to_string(),
                status: current.status(),
            };
            self.audit_transition(
                &current,
                actor,
                action,
                AuditOutcome::Failed,
                json!({ "error": err.to_string() }),
            )
            .await;
            return Err(err);
        }

        bill.state = next;
        info!(bill_id = %bill.id, status = %bill.status(), approved_by = %actor.id, "Bill finalized");
        self.audit_transition(
            &bill,
            actor,
            action,
            AuditOutcome::Success,
            json!({ "state": bill.state }),
        )
        .await;

        Ok(bill)
    }

    async fn audit_transition(
        &self,
        bill: &Bill,
        actor: &Actor,
        action: AuditAction,
        outcome: AuditOutcome,
        details: serde_json::Value,
    ) {
        self.audit
            .record(AuditEvent {
                bill_id: Some(bill.id.as_str()),
                action,
                outcome,
                performed_by: &actor.id,
                branch_id: &bill.branch_id,
                details,
            })
            .await;
    }
}
