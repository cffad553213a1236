//! # salon-db: Database Layer for the Salon Transaction Core
//!
//! SQLite storage through sqlx for every record the core owns.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Salon Core Data Flow                             │
//! │                                                                         │
//! │  salon-billing (TransactionLedger, LoyaltyLedger, ...)                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     salon-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ BillRepo      │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ StockRepo     │    │ 001_initial  │  │   │
//! │  │   │               │    │ LoyaltyRepo   │    │  _schema.sql │  │   │
//! │  │   │               │    │ ReferralRepo  │    │              │  │   │
//! │  │   │               │    │ AuditRepo     │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database (WAL)                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use salon_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("salon.db")).await?;
//! let bill = db.bills().get_by_id(&bill_id).await?;
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::audit::AuditRepository;
pub use repository::bill::{BillFilter, BillRepository};
pub use repository::loyalty::{LoyaltyChange, LoyaltyRepository};
pub use repository::mapping::MappingRepository;
pub use repository::referral::ReferralRepository;
pub use repository::stock::{MovementContext, NewBatch, StockRepository};
