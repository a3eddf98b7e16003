// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Account provisioning: lazy creation from group templates, shared account
// hierarchy, and batch currency migration.

use pagetally_core::config::AccountTemplate;
use pagetally_core::error::{PageTallyError, Result};
use pagetally_core::types::{
    Account, AccountId, AccountType, GroupTemplate, NewAccount, NewAccountTrx, TrxState, TrxType,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::ledger::Ledger;
use crate::store::LedgerTx;

/// Outcome of a batch operation over many accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchReport {
    /// Accounts changed.
    pub accounts: usize,
    /// Transactions changed.
    pub trxs: usize,
    /// Accounts whose update failed and was rolled back.
    pub failed: usize,
}

/// Combine the templates of groups that pass on initial settings.
///
/// Credits are summed, the account is restricted if any contributing group
/// is, and the largest overdraft wins.  `None` when no group contributes.
pub fn aggregate_group_templates(groups: &[GroupTemplate]) -> Option<AccountTemplate> {
    groups
        .iter()
        .filter(|g| g.apply_initial_settings)
        .map(|g| &g.template)
        .fold(None, |acc: Option<AccountTemplate>, t| {
            Some(match acc {
                None => t.clone(),
                Some(acc) => AccountTemplate {
                    initial_balance: acc.initial_balance + t.initial_balance,
                    restricted: acc.restricted || t.restricted,
                    overdraft: acc.overdraft.max(t.overdraft),
                    use_global_overdraft: acc.use_global_overdraft || t.use_global_overdraft,
                },
            })
        })
}

impl Ledger {
    /// The owner's account of `account_type`, created on first use.
    ///
    /// A new account takes its initial settings from the owner's groups, or
    /// from the configured defaults when no group passes settings on.  A
    /// non-zero initial balance is booked as an `INITIAL` transaction.
    #[instrument(skip(self, tx, groups), fields(%owner, %account_type))]
    pub fn lazy_get_account(
        &self,
        tx: &mut dyn LedgerTx,
        owner: &str,
        account_type: AccountType,
        groups: &[GroupTemplate],
    ) -> Result<Account> {
        if owner.trim().is_empty() {
            return Err(PageTallyError::Validation("empty account owner".into()));
        }
        if let Some(account) = tx.find_account_by_name(owner, account_type)? {
            return Ok(account);
        }

        let config = self.config();
        let template = aggregate_group_templates(groups)
            .unwrap_or_else(|| config.user_account_defaults.clone());
        let account = tx.create_account(&NewAccount::from_template(
            owner,
            account_type,
            &template,
            config.currency_code.clone(),
        ))?;

        if !template.initial_balance.is_zero() {
            tx.create_trx(&NewAccountTrx {
                account_id: account.id,
                amount: template.initial_balance,
                balance_after: account.balance,
                trx_type: TrxType::Initial,
                weight: 1,
                weight_unit: 1,
                currency_code: account.currency_code.clone(),
                doc_log_id: None,
                comment: None,
                state: TrxState::Settled,
            })?;
        }

        info!(account = %account.id, balance = %account.balance, "account created");
        Ok(account)
    }

    /// Create a shared account, top-level or as child of `parent`.
    ///
    /// The hierarchy is one level deep: a parent must be a top-level SHARED
    /// account.  Live names are unique per parent.
    #[instrument(skip(self, tx, template), fields(%name, parent = ?parent))]
    pub fn create_shared_account(
        &self,
        tx: &mut dyn LedgerTx,
        name: &str,
        parent: Option<AccountId>,
        template: &AccountTemplate,
    ) -> Result<Account> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PageTallyError::Validation("empty shared account name".into()));
        }

        match parent {
            Some(parent_id) => {
                let parent = tx
                    .find_account(parent_id)?
                    .filter(|p| !p.deleted)
                    .ok_or_else(|| PageTallyError::UnknownAccount(parent_id.to_string()))?;
                if parent.account_type != AccountType::Shared {
                    return Err(PageTallyError::AccountTypeMismatch {
                        expected: AccountType::Shared.to_string(),
                        actual: parent.account_type.to_string(),
                    });
                }
                if !parent.is_top_level() {
                    return Err(PageTallyError::Validation(format!(
                        "shared account {} is itself a child account",
                        parent.name
                    )));
                }
            }
            None => {
                if tx.find_account_by_name(name, AccountType::Shared)?.is_some() {
                    return Err(PageTallyError::NameCollision(format!("shared account {name}")));
                }
            }
        }

        let mut account = NewAccount::from_template(
            name,
            AccountType::Shared,
            template,
            self.config().currency_code,
        );
        account.parent = parent;
        let account = tx.create_account(&account)?;
        info!(account = %account.id, "shared account created");
        Ok(account)
    }

    /// Move every live account (and its transactions) from currency `from`
    /// to `to`.
    ///
    /// Each account is migrated in its own transaction; failures are
    /// counted, not propagated.  Must not be called from a thread with an
    /// open ledger transaction.
    #[instrument(skip(self))]
    pub fn change_currency(&self, from: &str, to: &str) -> Result<BatchReport> {
        if to.len() != 3 || !to.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(PageTallyError::Validation(format!("invalid currency code {to}")));
        }

        let ids: Vec<AccountId> = self.in_transaction(|tx| {
            Ok(tx
                .list_accounts()?
                .into_iter()
                .filter(|a| a.currency_code == from)
                .map(|a| a.id)
                .collect())
        })?;

        let mut report = BatchReport::default();
        for id in ids {
            match self.in_transaction(|tx| migrate_account(tx, id, from, to)) {
                Ok(trxs) => {
                    report.accounts += 1;
                    report.trxs += trxs;
                }
                Err(e) => {
                    warn!(account = %id, error = %e, "currency migration failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            accounts = report.accounts,
            trxs = report.trxs,
            failed = report.failed,
            "currency changed"
        );
        Ok(report)
    }
}

fn migrate_account(tx: &mut dyn LedgerTx, id: AccountId, from: &str, to: &str) -> Result<usize> {
    let mut account = tx.lock_account(id)?;
    if account.currency_code != from {
        return Ok(0);
    }
    account.currency_code = to.to_string();
    tx.update_account(&account)?;

    let mut changed = 0;
    for mut trx in tx.trxs_for_account(id)? {
        if trx.currency_code == from {
            trx.currency_code = to.to_string();
            tx.update_trx(&trx)?;
            changed += 1;
        }
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteLedgerStore;
    use pagetally_core::config::{AppConfig, StaticConfig};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn ledger() -> (TempDir, Ledger) {
        let dir = TempDir::new().unwrap();
        let store = SqliteLedgerStore::open(dir.path().join("ledger.db")).unwrap();
        let mut config = AppConfig::default();
        config.user_account_defaults = AccountTemplate::prepaid(dec!(2.00));
        let ledger = Ledger::new(Arc::new(store), Arc::new(StaticConfig(config)));
        (dir, ledger)
    }

    fn group(name: &str, credit: Decimal, restricted: bool, overdraft: Decimal, apply: bool) -> GroupTemplate {
        GroupTemplate {
            group_name: name.into(),
            apply_initial_settings: apply,
            template: AccountTemplate {
                initial_balance: credit,
                restricted,
                overdraft,
                use_global_overdraft: false,
            },
        }
    }

    #[test]
    fn group_templates_sum_credit_and_restrict_if_any() {
        let groups = [
            group("staff", dec!(5.00), false, dec!(1.00), true),
            group("students", dec!(3.00), true, dec!(4.00), true),
            group("alumni", dec!(100.00), false, dec!(50.00), false),
        ];
        let merged = aggregate_group_templates(&groups).unwrap();
        assert_eq!(merged.initial_balance, dec!(8.00));
        assert!(merged.restricted);
        assert_eq!(merged.overdraft, dec!(4.00));

        assert!(aggregate_group_templates(&groups[2..]).is_none());
    }

    #[test]
    fn lazy_account_is_created_once_with_initial_trx() {
        let (_dir, ledger) = ledger();
        let groups = [group("staff", dec!(5.00), false, dec!(0), true)];
        let first = ledger
            .in_transaction(|tx| ledger.lazy_get_account(tx, "alice", AccountType::User, &groups))
            .unwrap();
        assert_eq!(first.balance, dec!(5.00));
        assert!(!first.restricted);

        let again = ledger
            .in_transaction(|tx| ledger.lazy_get_account(tx, "alice", AccountType::User, &[]))
            .unwrap();
        assert_eq!(again.id, first.id);

        let trxs = ledger
            .in_transaction(|tx| tx.trxs_for_account(first.id))
            .unwrap();
        assert_eq!(trxs.len(), 1);
        assert_eq!(trxs[0].trx_type, TrxType::Initial);
        assert_eq!(trxs[0].balance_after, dec!(5.00));
    }

    #[test]
    fn lazy_account_falls_back_to_configured_defaults() {
        let (_dir, ledger) = ledger();
        let account = ledger
            .in_transaction(|tx| ledger.lazy_get_account(tx, "bob", AccountType::User, &[]))
            .unwrap();
        assert_eq!(account.balance, dec!(2.00));
        assert!(account.restricted);
        assert_eq!(account.currency_code, "EUR");
    }

    #[test]
    fn shared_hierarchy_is_one_level_deep() {
        let (_dir, ledger) = ledger();
        let template = AccountTemplate::default();
        let top = ledger
            .in_transaction(|tx| ledger.create_shared_account(tx, "physics", None, &template))
            .unwrap();
        let child = ledger
            .in_transaction(|tx| ledger.create_shared_account(tx, "lab-1", Some(top.id), &template))
            .unwrap();
        assert_eq!(child.parent, Some(top.id));

        let err = ledger
            .in_transaction(|tx| ledger.create_shared_account(tx, "bench-3", Some(child.id), &template))
            .unwrap_err();
        assert!(matches!(err, PageTallyError::Validation(_)));

        let err = ledger
            .in_transaction(|tx| ledger.create_shared_account(tx, "physics", None, &template))
            .unwrap_err();
        assert!(matches!(err, PageTallyError::NameCollision(_)));

        let err = ledger
            .in_transaction(|tx| ledger.create_shared_account(tx, "lab-1", Some(top.id), &template))
            .unwrap_err();
        assert!(matches!(err, PageTallyError::NameCollision(_)));
    }

    #[test]
    fn shared_child_of_user_account_is_a_type_mismatch() {
        let (_dir, ledger) = ledger();
        let user = ledger
            .in_transaction(|tx| ledger.lazy_get_account(tx, "carol", AccountType::User, &[]))
            .unwrap();
        let err = ledger
            .in_transaction(|tx| {
                ledger.create_shared_account(tx, "carol-team", Some(user.id), &AccountTemplate::default())
            })
            .unwrap_err();
        assert!(matches!(err, PageTallyError::AccountTypeMismatch { .. }));
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn currency_change_reports_counts() {
        let (_dir, ledger) = ledger();
        for owner in ["dave", "erin", "frank"] {
            ledger
                .in_transaction(|tx| ledger.lazy_get_account(tx, owner, AccountType::User, &[]))
                .unwrap();
        }
        let report = ledger.change_currency("EUR", "CHF").unwrap();
        assert_eq!(
            report,
            BatchReport {
                accounts: 3,
                trxs: 3,
                failed: 0
            }
        );

        let accounts = ledger.in_transaction(|tx| tx.list_accounts()).unwrap();
        assert!(accounts.iter().all(|a| a.currency_code == "CHF"));
        assert_eq!(ledger.change_currency("EUR", "CHF").unwrap(), BatchReport::default());
        assert!(ledger.change_currency("CHF", "swiss").is_err());
    }
}
