//! # salon-billing: Transaction Ledger and Services
//!
//! The operations collaborators call: bill creation with its saga, the
//! terminal transitions, loyalty and referral entry points, and the audit
//! queries.
//!
//! ## Service Graph
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                             SalonCore                                   │
//! │                                                                         │
//! │   ┌────────────────────────────────────────────────────────────────┐   │
//! │   │                    TransactionLedger                           │   │
//! │   │  create_bill ─► FifoDeductionEngine ─► LoyaltyLedger ─►        │   │
//! │   │                 ReferralProgram                                │   │
//! │   │  refund_bill / void_bill                                       │   │
//! │   └───────────┬────────────────────┬───────────────────┬───────────┘   │
//! │               ▼                    ▼                   ▼               │
//! │        ┌────────────┐      ┌──────────────┐     ┌────────────┐        │
//! │        │ salon-db   │      │ salon-core   │     │  AuditLog  │        │
//! │        │ (SQLite)   │      │ (pure rules) │     │ (append)   │        │
//! │        └────────────┘      └──────────────┘     └────────────┘        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use salon_billing::{BillingConfig, SalonCore};
//!
//! let core = SalonCore::open(BillingConfig::load(None)?).await?;
//! let receipt = core.create_bill(input, &cashier).await?;
//! for warning in receipt.warnings() {
//!     tracing::warn!(%warning, "Side effect degraded");
//! }
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod inventory;
pub mod ledger;
pub mod loyalty;
pub mod referral;
pub mod retry;
pub mod saga;

pub use audit::{AuditEvent, AuditLog};
pub use config::BillingConfig;
pub use error::{BillingError, BillingResult};
pub use inventory::{BatchDeduction, DeductionContext, DeductionResult, FifoDeductionEngine};
pub use ledger::{CreateBillInput, LineItemInput, RefundRequest, TransactionLedger};
pub use loyalty::{LoyaltyLedger, Redemption};
pub use referral::{ReferralOutcome, ReferralProgram};
pub use saga::{CreateBillReceipt, StepKind, StepOutcome, StepReport};

use serde_json::json;
use tracing::info;

use salon_core::{
    Actor, AuditAction, AuditLogEntry, AuditOutcome, Bill, LoyaltyLogEntry, Money,
    ReferralRecord, ServiceProductUsage, StockBatch, StockMovement, UsageType, Witness,
};
use salon_db::{BillFilter, Database, MappingRepository, NewBatch};

/// Every operation of the transaction core behind one handle.
#[derive(Debug, Clone)]
pub struct SalonCore {
    db: Database,
    config: BillingConfig,
    ledger: TransactionLedger,
    stock: FifoDeductionEngine,
    loyalty: LoyaltyLedger,
    referrals: ReferralProgram,
    mappings: MappingRepository,
    audit: AuditLog,
}

impl SalonCore {
    /// Connects to the configured database and wires the services.
    pub async fn open(config: BillingConfig) -> BillingResult<Self> {
        config.validate()?;
        let db = Database::new(config.database.db_config()?).await?;
        info!("Salon core ready");
        Ok(Self::with_database(db, config))
    }

    /// Wires the services over an existing database.
    pub fn with_database(db: Database, config: BillingConfig) -> Self {
        let audit = AuditLog::new(&db);
        let stock = FifoDeductionEngine::new(&db, config.concurrency.clone());
        let loyalty = LoyaltyLedger::new(&db, config.concurrency.clone());
        let referrals = ReferralProgram::new(
            &db,
            loyalty.clone(),
            config.referral.clone(),
            audit.clone(),
        );
        let ledger = TransactionLedger::new(
            &db,
            &config,
            stock.clone(),
            loyalty.clone(),
            referrals.clone(),
            audit.clone(),
        );

        SalonCore {
            mappings: db.mappings(),
            db,
            config,
            ledger,
            stock,
            loyalty,
            referrals,
            audit,
        }
    }

    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Bills
    // =========================================================================

    pub async fn create_bill(
        &self,
        input: CreateBillInput,
        actor: &Actor,
    ) -> BillingResult<CreateBillReceipt> {
        self.ledger.create_bill(input, actor).await
    }

    pub async fn get_bill_by_id(&self, bill_id: &str) -> BillingResult<Bill> {
        self.ledger.get_bill_by_id(bill_id).await
    }

    pub async fn get_bills_by_branch(
        &self,
        branch_id: &str,
        filter: &BillFilter,
    ) -> BillingResult<Vec<Bill>> {
        self.ledger.get_bills_by_branch(branch_id, filter).await
    }

    pub async fn refund_bill(
        &self,
        bill_id: &str,
        request: RefundRequest,
        actor: &Actor,
    ) -> BillingResult<Bill> {
        self.ledger.refund_bill(bill_id, request, actor).await
    }

    pub async fn void_bill(
        &self,
        bill_id: &str,
        reason: &str,
        actor: &Actor,
        witness: Option<Witness>,
    ) -> BillingResult<Bill> {
        self.ledger.void_bill(bill_id, reason, actor, witness).await
    }

    // =========================================================================
    // Loyalty
    // =========================================================================

    pub async fn get_loyalty_points(&self, client_id: &str, branch_id: &str) -> BillingResult<i64> {
        self.loyalty.get_points(client_id, branch_id).await
    }

    pub async fn get_loyalty_history(
        &self,
        client_id: &str,
        branch_id: &str,
    ) -> BillingResult<Vec<LoyaltyLogEntry>> {
        self.loyalty.history(client_id, branch_id).await
    }

    /// Direct earn outside a sale, at the branch's configured rate.
    pub async fn earn_loyalty_points(
        &self,
        client_id: &str,
        branch_id: &str,
        amount: Money,
        bill_id: Option<&str>,
        actor: &Actor,
    ) -> BillingResult<Option<LoyaltyLogEntry>> {
        let rate = self.config.loyalty.earn_rate(branch_id);
        let result = self
            .loyalty
            .earn_points(client_id, branch_id, amount, bill_id, rate)
            .await;

        let audited = match &result {
            Ok(None) => None,
            Ok(Some(entry)) => Some((
                AuditOutcome::Success,
                json!({
                    "client_id": client_id,
                    "points": entry.points,
                    "rate_bps": rate.bps(),
                }),
            )),
            Err(e) => Some((
                AuditOutcome::Failed,
                json!({
                    "client_id": client_id,
                    "amount_cents": amount.cents(),
                    "error": e.to_string(),
                }),
            )),
        };
        if let Some((outcome, details)) = audited {
            self.audit
                .record(AuditEvent {
                    bill_id,
                    action: AuditAction::LoyaltyEarned,
                    outcome,
                    performed_by: &actor.id,
                    branch_id,
                    details,
                })
                .await;
        }
        result
    }

    /// Direct redemption outside a sale, at the branch's point value.
    pub async fn redeem_loyalty_points(
        &self,
        client_id: &str,
        branch_id: &str,
        points: i64,
        bill_id: Option<&str>,
        actor: &Actor,
    ) -> BillingResult<Redemption> {
        let point_value = self.config.loyalty.point_value(branch_id);
        let result = self
            .loyalty
            .redeem_points(client_id, branch_id, points, bill_id, point_value)
            .await;

        let (outcome, details) = match &result {
            Ok(redemption) => (
                AuditOutcome::Success,
                json!({
                    "client_id": client_id,
                    "points": points,
                    "discount_cents": redemption.discount_cents,
                }),
            ),
            Err(e) => (
                AuditOutcome::Failed,
                json!({
                    "client_id": client_id,
                    "points": points,
                    "error": e.to_string(),
                }),
            ),
        };
        self.audit
            .record(AuditEvent {
                bill_id,
                action: AuditAction::LoyaltyRedeemed,
                outcome,
                performed_by: &actor.id,
                branch_id,
                details,
            })
            .await;
        result
    }

    // =========================================================================
    // Referrals
    // =========================================================================

    pub async fn get_referral_code(
        &self,
        client_id: &str,
        branch_id: &str,
    ) -> BillingResult<Option<String>> {
        self.referrals.get_referral_code(client_id, branch_id).await
    }

    pub async fn has_visited_branch(
        &self,
        client_id: &str,
        branch_id: &str,
    ) -> BillingResult<bool> {
        self.referrals.has_visited_branch(client_id, branch_id).await
    }

    pub async fn process_referral(
        &self,
        new_client_id: &str,
        code: &str,
        branch_id: Option<&str>,
        actor: &Actor,
    ) -> BillingResult<ReferralOutcome> {
        self.referrals
            .process_referral(new_client_id, code, branch_id, &actor.id)
            .await
    }

    pub async fn get_referrals_by_referrer(
        &self,
        referrer_id: &str,
        branch_id: &str,
    ) -> BillingResult<Vec<ReferralRecord>> {
        self.referrals
            .get_referrals_by_referrer(referrer_id, branch_id)
            .await
    }

    // =========================================================================
    // Stock
    // =========================================================================

    pub async fn deduct_stock_fifo(
        &self,
        branch_id: &str,
        product_id: &str,
        usage_type: UsageType,
        quantity: i64,
        ctx: DeductionContext<'_>,
    ) -> BillingResult<DeductionResult> {
        self.stock
            .deduct_stock_fifo(branch_id, product_id, usage_type, quantity, ctx)
            .await
    }

    pub async fn receive_batch(&self, batch: &NewBatch) -> BillingResult<StockBatch> {
        self.stock.receive_batch(batch).await
    }

    pub async fn available_stock(
        &self,
        branch_id: &str,
        product_id: &str,
        usage_type: UsageType,
    ) -> BillingResult<i64> {
        self.stock
            .available_quantity(branch_id, product_id, usage_type)
            .await
    }

    pub async fn active_batches(
        &self,
        branch_id: &str,
        product_id: &str,
        usage_type: UsageType,
    ) -> BillingResult<Vec<StockBatch>> {
        self.stock
            .active_batches(branch_id, product_id, usage_type)
            .await
    }

    pub async fn stock_movements_for_bill(
        &self,
        bill_id: &str,
    ) -> BillingResult<Vec<StockMovement>> {
        self.stock.movements_for_bill(bill_id).await
    }

    pub async fn set_service_usage(&self, usage: &ServiceProductUsage) -> BillingResult<()> {
        if usage.quantity_per_service <= 0 {
            return Err(BillingError::Validation(
                "quantity_per_service must be positive".into(),
            ));
        }
        Ok(self.mappings.upsert(usage).await?)
    }

    pub async fn service_usage(&self, service_id: &str) -> BillingResult<Vec<ServiceProductUsage>> {
        Ok(self.mappings.for_service(service_id).await?)
    }

    // =========================================================================
    // Audit
    // =========================================================================

    pub async fn audit_for_bill(&self, bill_id: &str) -> BillingResult<Vec<AuditLogEntry>> {
        self.audit.for_bill(bill_id).await
    }

    pub async fn audit_for_branch(
        &self,
        branch_id: &str,
        limit: i64,
    ) -> BillingResult<Vec<AuditLogEntry>> {
        self.audit.for_branch(branch_id, limit).await
    }
}
