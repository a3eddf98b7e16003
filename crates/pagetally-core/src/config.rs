// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.
//
// Ledger and cost settings are re-read for every operation, so the engine is
// handed a `ConfigSource` rather than a snapshot.

use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// Initial settings for a lazily created account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountTemplate {
    pub initial_balance: Decimal,
    pub restricted: bool,
    pub overdraft: Decimal,
    pub use_global_overdraft: bool,
}

impl Default for AccountTemplate {
    fn default() -> Self {
        Self {
            initial_balance: Decimal::ZERO,
            restricted: true,
            overdraft: Decimal::ZERO,
            use_global_overdraft: false,
        }
    }
}

impl AccountTemplate {
    /// Restricted template without overdraft.
    pub fn prepaid(initial_balance: Decimal) -> Self {
        Self {
            initial_balance,
            ..Self::default()
        }
    }
}

/// Persistent application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// ISO 4217 code used for new accounts and transactions.
    pub currency_code: String,
    /// Decimal places kept for balances and weighted shares.
    pub balance_scale: u32,
    /// Decimal places shown to users.
    pub display_scale: u32,
    /// Credit limit for accounts with `use_global_overdraft`.
    pub global_credit_limit: Decimal,
    /// Discount percentage applied to eco-print jobs (0-100).
    pub eco_print_discount_percent: Decimal,
    /// Defaults for user accounts without group settings.
    pub user_account_defaults: AccountTemplate,
    /// Minutes an outbox job is held before it expires.
    pub outbox_expiry_minutes: i64,
    /// Minutes a ticket waits for release before it expires.
    pub ticket_expiry_minutes: i64,
    /// Seconds between background outbox/ticket pruning runs.
    pub prune_interval_secs: u64,
    /// How long an entity lock request may wait before failing.
    pub lock_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            currency_code: "EUR".into(),
            balance_scale: 2,
            display_scale: 2,
            global_credit_limit: Decimal::ZERO,
            eco_print_discount_percent: Decimal::from(15),
            user_account_defaults: AccountTemplate::default(),
            outbox_expiry_minutes: 30,
            ticket_expiry_minutes: 7 * 24 * 60,
            prune_interval_secs: 60,
            lock_timeout_ms: 5_000,
        }
    }
}

impl AppConfig {
    /// Eco-print discount as a fraction in `[0, 1]`.
    pub fn eco_print_discount(&self) -> Decimal {
        (self.eco_print_discount_percent / Decimal::ONE_HUNDRED)
            .clamp(Decimal::ZERO, Decimal::ONE)
    }
}

/// Where the engine reads its settings from.
pub trait ConfigSource: Send + Sync {
    /// The settings in effect for the current operation.
    fn current(&self) -> AppConfig;
}

/// A fixed configuration (tests, embedded use).
#[derive(Debug, Clone, Default)]
pub struct StaticConfig(pub AppConfig);

impl ConfigSource for StaticConfig {
    fn current(&self) -> AppConfig {
        self.0.clone()
    }
}

/// Configuration backed by a JSON file, re-read on every call.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for FileConfigSource {
    fn current(&self) -> AppConfig {
        match load_config(&self.path) {
            Ok(Some(config)) => config,
            Ok(None) => AppConfig::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable config, using defaults");
                AppConfig::default()
            }
        }
    }
}

/// Load the config at `path`. `Ok(None)` when the file does not exist.
pub fn load_config(path: &Path) -> Result<Option<AppConfig>> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&data)?))
}

/// Persist `config` as pretty JSON at `path`.
pub fn persist_config(path: &Path, config: &AppConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn eco_discount_is_fraction() {
        let mut config = AppConfig::default();
        config.eco_print_discount_percent = dec!(20);
        assert_eq!(config.eco_print_discount(), dec!(0.2));
        config.eco_print_discount_percent = dec!(150);
        assert_eq!(config.eco_print_discount(), Decimal::ONE);
    }

    #[test]
    fn file_source_rereads_each_call() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let source = FileConfigSource::new(&path);

        assert_eq!(source.current().currency_code, "EUR");

        let mut config = AppConfig::default();
        config.currency_code = "CHF".into();
        persist_config(&path, &config).expect("persist");
        assert_eq!(source.current().currency_code, "CHF");

        config.global_credit_limit = dec!(25);
        persist_config(&path, &config).expect("persist");
        assert_eq!(source.current().global_credit_limit, dec!(25));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "currency_code": "USD" }"#).expect("write");

        let config = load_config(&path).expect("load").expect("present");
        assert_eq!(config.currency_code, "USD");
        assert_eq!(config.balance_scale, 2);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").expect("write");

        assert!(load_config(&path).is_err());
        assert_eq!(FileConfigSource::new(&path).current().currency_code, "EUR");
    }
}
