//! Engine configuration.
//!
//! Read from the environment once at startup; every engine operation takes its policy from the
//! resulting [`EngineConfig`].

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::warn;

pub const PAYMENT_TERMS_DAYS_VAR: &str = "ORDERCASH_PAYMENT_TERMS_DAYS";
pub const CREDIT_TOLERANCE_VAR: &str = "ORDERCASH_CREDIT_TOLERANCE";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";

const DEFAULT_PAYMENT_TERMS_DAYS: i64 = 30;
/// Ten years.
pub const MAX_PAYMENT_TERMS_DAYS: i64 = 3650;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be between 0 and 3650 days, got '{value}'")]
    PaymentTerms { var: &'static str, value: String },

    #[error("{var} must be a non-negative decimal, got '{value}'")]
    CreditTolerance { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Days between invoice date and due date.
    pub payment_terms_days: i64,
    /// How far a credit may exceed a line's remaining amount before it is an over-credit.
    /// Zero rejects any excess.
    pub credit_tolerance: Decimal,
    /// Connection string for the Postgres store; unused by the in-memory store.
    pub database_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            payment_terms_days: DEFAULT_PAYMENT_TERMS_DAYS,
            credit_tolerance: Decimal::ZERO,
            database_url: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; unset values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let payment_terms_days = match lookup(PAYMENT_TERMS_DAYS_VAR) {
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(days) if (0..=MAX_PAYMENT_TERMS_DAYS).contains(&days) => days,
                _ => {
                    return Err(ConfigError::PaymentTerms {
                        var: PAYMENT_TERMS_DAYS_VAR,
                        value: raw,
                    });
                }
            },
            None => {
                warn!(
                    var = PAYMENT_TERMS_DAYS_VAR,
                    default = defaults.payment_terms_days,
                    "payment terms not set, using default"
                );
                defaults.payment_terms_days
            }
        };

        let credit_tolerance = match lookup(CREDIT_TOLERANCE_VAR) {
            Some(raw) => match raw.trim().parse::<Decimal>() {
                Ok(tolerance) if tolerance >= Decimal::ZERO => tolerance,
                _ => {
                    return Err(ConfigError::CreditTolerance {
                        var: CREDIT_TOLERANCE_VAR,
                        value: raw,
                    });
                }
            },
            None => {
                warn!(
                    var = CREDIT_TOLERANCE_VAR,
                    "credit tolerance not set, rejecting any over-credit"
                );
                defaults.credit_tolerance
            }
        };

        let database_url = lookup(DATABASE_URL_VAR).filter(|url| !url.trim().is_empty());

        Ok(Self {
            payment_terms_days,
            credit_tolerance,
            database_url,
        })
    }
}
