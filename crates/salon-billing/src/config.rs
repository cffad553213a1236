//! # Billing Configuration
//!
//! Rates, referral rewards and retry budgets for the transaction core.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     SALON_EARN_RATE_BPS=200                                            │
//! │     SALON_DB_PATH=/var/lib/salon/salon.db                              │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/salon-pos/salon.toml (Linux)                             │
//! │     ~/Library/Application Support/com.salon.pos/salon.toml (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [loyalty]
//! enabled = true
//! earn_rate_bps = 100       # 0.01 points per currency unit
//! point_value_cents = 100   # one point takes 1.00 off a bill
//!
//! [loyalty.branches.makati-01]
//! earn_rate_bps = 200
//!
//! [referral]
//! referrer_points = 100
//! new_client_points = 50
//!
//! [concurrency]
//! max_conflict_retries = 5
//! initial_backoff_ms = 10
//! max_backoff_ms = 200
//!
//! [database]
//! path = "/var/lib/salon/salon.db"
//! ```

use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use salon_core::loyalty::EarnRate;
use salon_core::Money;
use salon_db::DbConfig;

use crate::error::{BillingError, BillingResult};

// =============================================================================
// Loyalty Settings
// =============================================================================

/// Per-branch override of the loyalty rates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchLoyaltyOverride {
    #[serde(default)]
    pub earn_rate_bps: Option<u32>,
    #[serde(default)]
    pub point_value_cents: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoyaltySettings {
    /// When false, bills neither earn nor redeem points.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Points per currency unit, in basis points (100 = 0.01).
    #[serde(default = "default_earn_rate_bps")]
    pub earn_rate_bps: u32,

    /// Discount granted per redeemed point.
    #[serde(default = "default_point_value_cents")]
    pub point_value_cents: i64,

    /// Keyed by branch id.
    #[serde(default)]
    pub branches: HashMap<String, BranchLoyaltyOverride>,
}

fn default_true() -> bool {
    true
}

fn default_earn_rate_bps() -> u32 {
    100
}

fn default_point_value_cents() -> i64 {
    100
}

impl Default for LoyaltySettings {
    fn default() -> Self {
        LoyaltySettings {
            enabled: true,
            earn_rate_bps: default_earn_rate_bps(),
            point_value_cents: default_point_value_cents(),
            branches: HashMap::new(),
        }
    }
}

impl LoyaltySettings {
    /// Earn rate in effect at a branch.
    pub fn earn_rate(&self, branch_id: &str) -> EarnRate {
        let bps = self
            .branches
            .get(branch_id)
            .and_then(|o| o.earn_rate_bps)
            .unwrap_or(self.earn_rate_bps);
        EarnRate::from_bps(bps)
    }

    /// Value of one point at a branch.
    pub fn point_value(&self, branch_id: &str) -> Money {
        let cents = self
            .branches
            .get(branch_id)
            .and_then(|o| o.point_value_cents)
            .unwrap_or(self.point_value_cents);
        Money::from_cents(cents)
    }
}

// =============================================================================
// Referral Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralSettings {
    /// Points credited to the client whose code was used.
    #[serde(default = "default_referrer_points")]
    pub referrer_points: i64,

    /// Points credited to the newly referred client.
    #[serde(default = "default_new_client_points")]
    pub new_client_points: i64,

    /// Random characters after the derived prefix.
    #[serde(default = "default_code_suffix_len")]
    pub code_suffix_len: usize,

    /// Regenerations allowed when a code collides.
    #[serde(default = "default_max_code_attempts")]
    pub max_code_attempts: u32,
}

fn default_referrer_points() -> i64 {
    100
}
fn default_new_client_points() -> i64 {
    50
}
fn default_code_suffix_len() -> usize {
    6
}
fn default_max_code_attempts() -> u32 {
    5
}

impl Default for ReferralSettings {
    fn default() -> Self {
        ReferralSettings {
            referrer_points: default_referrer_points(),
            new_client_points: default_new_client_points(),
            code_suffix_len: default_code_suffix_len(),
            max_code_attempts: default_max_code_attempts(),
        }
    }
}

// =============================================================================
// Concurrency Settings
// =============================================================================

/// Retry budget for version-checked writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencySettings {
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_conflict_retries() -> u32 {
    5
}
fn default_initial_backoff_ms() -> u64 {
    10
}
fn default_max_backoff_ms() -> u64 {
    200
}

impl Default for ConcurrencySettings {
    fn default() -> Self {
        ConcurrencySettings {
            max_conflict_retries: default_max_conflict_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl ConcurrencySettings {
    /// Fresh backoff schedule for one retried operation.
    ///
    /// No elapsed-time cap: the attempt count bounds the loop.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(self.initial_backoff_ms),
            max_interval: Duration::from_millis(self.max_backoff_ms),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to `salon.db` in the platform data dir.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseSettings {
    /// Connection settings for [`salon_db::Database::new`].
    pub fn db_config(&self) -> BillingResult<DbConfig> {
        let path = self
            .path
            .clone()
            .or_else(default_database_path)
            .ok_or_else(|| BillingError::Config("no database path available".into()))?;

        Ok(DbConfig::new(path).max_connections(self.max_connections))
    }
}

fn default_database_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "salon", "pos").map(|dirs| dirs.data_dir().join("salon.db"))
}

// =============================================================================
// Main Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillingConfig {
    #[serde(default)]
    pub loyalty: LoyaltySettings,

    #[serde(default)]
    pub referral: ReferralSettings,

    #[serde(default)]
    pub concurrency: ConcurrencySettings,

    #[serde(default)]
    pub database: DatabaseSettings,
}

impl BillingConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (salon.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> BillingResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading billing config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides_from(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load billing config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses and validates a TOML document. No environment overrides.
    pub fn from_toml_str(contents: &str) -> BillingResult<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BillingResult<()> {
        if self.loyalty.earn_rate_bps > 10_000 {
            return Err(BillingError::Config(
                "loyalty.earn_rate_bps must be at most 10000".into(),
            ));
        }
        if self.loyalty.point_value_cents <= 0 {
            return Err(BillingError::Config(
                "loyalty.point_value_cents must be positive".into(),
            ));
        }

        for (branch_id, over) in &self.loyalty.branches {
            if over.earn_rate_bps.is_some_and(|bps| bps > 10_000) {
                return Err(BillingError::Config(format!(
                    "loyalty.branches.{}.earn_rate_bps must be at most 10000",
                    branch_id
                )));
            }
            if over.point_value_cents.is_some_and(|cents| cents <= 0) {
                return Err(BillingError::Config(format!(
                    "loyalty.branches.{}.point_value_cents must be positive",
                    branch_id
                )));
            }
        }

        if self.referral.referrer_points < 0 || self.referral.new_client_points < 0 {
            return Err(BillingError::Config(
                "referral points must not be negative".into(),
            ));
        }
        if !(4..=16).contains(&self.referral.code_suffix_len) {
            return Err(BillingError::Config(
                "referral.code_suffix_len must be between 4 and 16".into(),
            ));
        }
        if self.referral.max_code_attempts == 0 {
            return Err(BillingError::Config(
                "referral.max_code_attempts must be greater than 0".into(),
            ));
        }

        if self.concurrency.max_conflict_retries == 0 {
            return Err(BillingError::Config(
                "concurrency.max_conflict_retries must be greater than 0".into(),
            ));
        }
        if self.concurrency.initial_backoff_ms > self.concurrency.max_backoff_ms {
            return Err(BillingError::Config(
                "concurrency.initial_backoff_ms exceeds max_backoff_ms".into(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(BillingError::Config(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies `SALON_*` overrides read through `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("SALON_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(enabled) = lookup("SALON_LOYALTY_ENABLED") {
            match enabled.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.loyalty.enabled = true,
                "0" | "false" | "no" | "off" => self.loyalty.enabled = false,
                _ => warn!(value = %enabled, "Unknown SALON_LOYALTY_ENABLED value"),
            }
        }

        override_parsed(&lookup, "SALON_EARN_RATE_BPS", &mut self.loyalty.earn_rate_bps);
        override_parsed(
            &lookup,
            "SALON_POINT_VALUE_CENTS",
            &mut self.loyalty.point_value_cents,
        );
        override_parsed(
            &lookup,
            "SALON_REFERRER_POINTS",
            &mut self.referral.referrer_points,
        );
        override_parsed(
            &lookup,
            "SALON_NEW_CLIENT_POINTS",
            &mut self.referral.new_client_points,
        );
        override_parsed(
            &lookup,
            "SALON_MAX_CONFLICT_RETRIES",
            &mut self.concurrency.max_conflict_retries,
        );
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "salon", "pos")
            .map(|dirs| dirs.config_dir().join("salon.toml"))
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.parse::<T>() {
        Ok(value) => {
            debug!(key, value = %value, "Overriding setting from environment");
            *target = value;
        }
        Err(_) => warn!(key, value = %raw, "Ignoring unparseable environment override"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BillingConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.loyalty.enabled);
        assert_eq!(config.loyalty.earn_rate("any").bps(), 100);
        assert_eq!(config.loyalty.point_value("any").cents(), 100);
        assert_eq!(config.referral.referrer_points, 100);
        assert_eq!(config.referral.new_client_points, 50);
        assert_eq!(config.concurrency.max_conflict_retries, 5);
    }

    #[test]
    fn test_branch_override() {
        let config = BillingConfig::from_toml_str(
            r#"
            [loyalty]
            earn_rate_bps = 150

            [loyalty.branches.makati-01]
            earn_rate_bps = 300
            "#,
        )
        .unwrap();

        assert_eq!(config.loyalty.earn_rate("makati-01").bps(), 300);
        assert_eq!(config.loyalty.earn_rate("qc-main").bps(), 150);
        // Point value falls back to the global setting
        assert_eq!(config.loyalty.point_value("makati-01").cents(), 100);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = BillingConfig::from_toml_str(
            r#"
            [referral]
            referrer_points = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.referral.referrer_points, 250);
        assert_eq!(config.referral.new_client_points, 50);
        assert_eq!(config.referral.code_suffix_len, 6);
    }

    #[test]
    fn test_config_validation() {
        let mut config = BillingConfig::default();

        config.loyalty.earn_rate_bps = 10_001;
        assert!(config.validate().is_err());
        config.loyalty.earn_rate_bps = 100;

        config.loyalty.point_value_cents = 0;
        assert!(config.validate().is_err());
        config.loyalty.point_value_cents = 100;

        config.referral.code_suffix_len = 3;
        assert!(config.validate().is_err());
        config.referral.code_suffix_len = 6;

        config.concurrency.max_conflict_retries = 0;
        assert!(config.validate().is_err());
        config.concurrency.max_conflict_retries = 1;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = BillingConfig::from_toml_str("[loyalty\nenabled = true").unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = BillingConfig::default();
        config.apply_overrides_from(|key| match key {
            "SALON_EARN_RATE_BPS" => Some("250".to_string()),
            "SALON_LOYALTY_ENABLED" => Some("off".to_string()),
            "SALON_DB_PATH" => Some("/tmp/salon-test.db".to_string()),
            "SALON_REFERRER_POINTS" => Some("not-a-number".to_string()),
            _ => None,
        });

        assert_eq!(config.loyalty.earn_rate_bps, 250);
        assert!(!config.loyalty.enabled);
        assert_eq!(config.database.path, Some(PathBuf::from("/tmp/salon-test.db")));
        // Unparseable values leave the setting alone
        assert_eq!(config.referral.referrer_points, 100);
    }

    #[test]
    fn test_db_config_uses_configured_path() {
        let settings = DatabaseSettings {
            path: Some(PathBuf::from("/tmp/salon.db")),
            max_connections: 3,
        };
        let db = settings.db_config().unwrap();
        assert_eq!(db.database_path, PathBuf::from("/tmp/salon.db"));
        assert_eq!(db.max_connections, 3);
    }

    #[test]
    fn test_backoff_schedule() {
        let backoff = ConcurrencySettings::default().backoff();
        assert_eq!(backoff.initial_interval, Duration::from_millis(10));
        assert_eq!(backoff.max_interval, Duration::from_millis(200));
        assert!(backoff.max_elapsed_time.is_none());
    }
}
