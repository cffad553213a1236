//! # Seed Data Generator
//!
//! Populates a database with a demo branch: stock batches in both usage
//! pools and the service consumption mappings that draw from them.
//!
//! ## Usage
//! ```bash
//! # Seed the default branch
//! cargo run -p salon-db --bin seed
//!
//! # Specify database path and branch
//! cargo run -p salon-db --bin seed -- --db ./data/salon.db --branch qc-main
//! ```
//!
//! Log output follows `RUST_LOG` (default `info,salon=debug,sqlx=warn`).

use chrono::{Duration, Utc};
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use salon_core::{ServiceProductUsage, UsageType};
use salon_db::{Database, DbConfig, NewBatch};

/// (product id, unit cost in cents, otc lots, salon-use lots)
const PRODUCTS: &[(&str, i64, &[i64], &[i64])] = &[
    ("prod-shampoo-500", 18_000, &[24, 12], &[6, 6]),
    ("prod-conditioner-500", 19_500, &[24], &[6]),
    ("prod-hair-serum", 32_000, &[12, 12], &[]),
    ("prod-dye-tube", 9_500, &[], &[40, 40, 20]),
    ("prod-developer-1l", 21_000, &[], &[10, 10]),
    ("prod-keratin-kit", 85_000, &[4], &[8]),
    ("prod-nail-polish", 6_500, &[30], &[30]),
    ("prod-cuticle-oil", 4_200, &[20], &[10]),
];

/// (service id, product id, quantity per service)
const MAPPINGS: &[(&str, &str, i64)] = &[
    ("svc-hair-color", "prod-dye-tube", 2),
    ("svc-hair-color", "prod-developer-1l", 1),
    ("svc-keratin", "prod-keratin-kit", 1),
    ("svc-shampoo-blowdry", "prod-shampoo-500", 1),
    ("svc-shampoo-blowdry", "prod-conditioner-500", 1),
    ("svc-manicure", "prod-nail-polish", 1),
    ("svc-manicure", "prod-cuticle-oil", 1),
];

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,salon=debug,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./salon_dev.db");
    let mut branch_id = String::from("branch-main");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--branch" | "-b" => {
                if i + 1 < args.len() {
                    branch_id = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Salon Core Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>       Database file path (default: ./salon_dev.db)");
                println!("  -b, --branch <ID>     Branch to stock (default: branch-main)");
                println!("  -h, --help            Show this help message");
                return Ok(());
            }
            other => warn!(argument = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    let db = Database::new(DbConfig::new(&db_path)).await?;
    info!(path = %db_path, branch_id = %branch_id, "Connected, migrations applied");

    let stock = db.stock();
    let existing = stock
        .available_quantity(&branch_id, PRODUCTS[0].0, UsageType::Otc)
        .await?;
    if existing > 0 {
        warn!(branch_id = %branch_id, "Branch already has stock, skipping seed");
        return Ok(());
    }

    let now = Utc::now();
    let mut batches = 0usize;

    for (product_id, unit_cost_cents, otc_lots, salon_lots) in PRODUCTS {
        let pools = [(UsageType::Otc, *otc_lots), (UsageType::SalonUse, *salon_lots)];
        for (usage_type, lots) in pools {
            for (age, quantity) in lots.iter().enumerate() {
                // Older lots first so FIFO has something to order
                let received_date = now - Duration::days(30 * (lots.len() - age) as i64);
                stock
                    .receive_batch(&NewBatch {
                        branch_id: branch_id.clone(),
                        product_id: product_id.to_string(),
                        usage_type,
                        quantity: *quantity,
                        unit_cost_cents: *unit_cost_cents,
                        received_date,
                    })
                    .await?;
                batches += 1;
            }
        }
    }

    let mappings = db.mappings();
    for (service_id, product_id, quantity_per_service) in MAPPINGS {
        mappings
            .upsert(&ServiceProductUsage {
                service_id: service_id.to_string(),
                product_id: product_id.to_string(),
                quantity_per_service: *quantity_per_service,
            })
            .await?;
    }

    info!(
        batches,
        mappings = MAPPINGS.len(),
        branch_id = %branch_id,
        "Seed complete"
    );

    Ok(())
}
