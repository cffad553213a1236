//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};

use salon_billing::config::ConcurrencySettings;
use salon_billing::{BillingConfig, CreateBillInput, LineItemInput, SalonCore};
use salon_core::{
    Actor, DiscountTerms, LineItemKind, PaymentMethod, ServiceProductUsage, StockBatch, UsageType,
    Witness,
};
use salon_db::{Database, DbConfig, NewBatch};

pub const BRANCH: &str = "branch-main";
pub const OTHER_BRANCH: &str = "branch-north";

pub async fn core() -> SalonCore {
    core_with(BillingConfig::default()).await
}

/// Installs a test subscriber once; output shows with `--nocapture`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("salon=debug,sqlx=warn")
        .with_test_writer()
        .try_init();
}

pub async fn core_with(mut config: BillingConfig) -> SalonCore {
    init_tracing();
    config.concurrency = ConcurrencySettings {
        max_conflict_retries: 8,
        initial_backoff_ms: 1,
        max_backoff_ms: 10,
    };
    let db = Database::new(DbConfig::in_memory())
        .await
        .expect("in-memory database");
    SalonCore::with_database(db, config)
}

pub fn cashier() -> Actor {
    Actor::new("staff-cashier", "Carla Cashier")
}

pub fn manager() -> Actor {
    Actor::new("staff-manager", "Mona Manager")
}

pub fn witness() -> Witness {
    Witness {
        id: "staff-supervisor".to_string(),
        email: "supervisor@salon.test".to_string(),
        name: "Sam Supervisor".to_string(),
    }
}

pub fn product_line(product_id: &str, unit_price_cents: i64, quantity: i64) -> LineItemInput {
    LineItemInput {
        kind: LineItemKind::Product,
        catalog_id: product_id.to_string(),
        name: format!("Product {product_id}"),
        unit_price_cents,
        quantity,
        staff_id: None,
    }
}

pub fn service_line(service_id: &str, unit_price_cents: i64, quantity: i64) -> LineItemInput {
    LineItemInput {
        kind: LineItemKind::Service,
        catalog_id: service_id.to_string(),
        name: format!("Service {service_id}"),
        unit_price_cents,
        quantity,
        staff_id: Some("staff-stylist".to_string()),
    }
}

pub fn bill_input(client_id: Option<&str>, items: Vec<LineItemInput>) -> CreateBillInput {
    CreateBillInput {
        client_id: client_id.map(str::to_string),
        branch_id: BRANCH.to_string(),
        items,
        payment_method: PaymentMethod::Cash,
        discount: DiscountTerms::None,
        loyalty_points_to_redeem: 0,
        promotion: None,
        notes: None,
        tax_rate_bps: 0,
    }
}

/// Receives a batch dated `day` days into March 2026.
pub async fn receive(
    core: &SalonCore,
    product_id: &str,
    usage_type: UsageType,
    day: u32,
    quantity: i64,
) -> StockBatch {
    core.receive_batch(&NewBatch {
        branch_id: BRANCH.to_string(),
        product_id: product_id.to_string(),
        usage_type,
        quantity,
        unit_cost_cents: 1_000,
        received_date: Utc.with_ymd_and_hms(2026, 3, day, 9, 0, 0).unwrap(),
    })
    .await
    .expect("receive batch")
}

pub async fn map_service(core: &SalonCore, service_id: &str, product_id: &str, per_service: i64) {
    core.set_service_usage(&ServiceProductUsage {
        service_id: service_id.to_string(),
        product_id: product_id.to_string(),
        quantity_per_service: per_service,
    })
    .await
    .expect("service mapping");
}

pub async fn remaining(core: &SalonCore, batch_id: &str) -> i64 {
    core.database()
        .stock()
        .get_batch(batch_id)
        .await
        .unwrap()
        .expect("batch exists")
        .remaining_quantity
}
