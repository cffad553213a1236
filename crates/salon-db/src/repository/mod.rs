//! # Repository Module
//!
//! Database repository implementations.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  salon-billing service                                                  │
//! │       │                                                                 │
//! │       │  db.stock().active_batches(branch, product, usage)              │
//! │       ▼                                                                 │
//! │  StockRepository                                                        │
//! │  ├── active_batches / available_quantity                                │
//! │  ├── apply_deduction (version-checked, one transaction)                 │
//! │  └── receive_batch / movements_for_bill                                 │
//! │       │                                                                 │
//! │       │  SQL                                                            │
//! │       ▼                                                                 │
//! │  SQLite                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`BillRepository`](bill::BillRepository) - Bills, lines, terminal transitions
//! - [`StockRepository`](stock::StockRepository) - Batches and movements
//! - [`MappingRepository`](mapping::MappingRepository) - Service consumption mappings
//! - [`LoyaltyRepository`](loyalty::LoyaltyRepository) - Accounts and log
//! - [`ReferralRepository`](referral::ReferralRepository) - Codes and records
//! - [`AuditRepository`](audit::AuditRepository) - Compliance log

pub mod audit;
pub mod bill;
pub mod loyalty;
pub mod mapping;
pub mod referral;
pub mod stock;
