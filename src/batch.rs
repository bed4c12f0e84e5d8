use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::{
    Account, AccountLifecycleManager, AccountNumber, AccountStore, Amount, LedgerEngine,
    LedgerError, Profile, Transaction, TransactionLog,
};

/// Possible errors to occur while running a batch operation
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("The operation is missing an amount")]
    AmountNotSpecified,
    #[error("The transfer is missing a counterparty")]
    CounterpartyNotSpecified,
    #[error("No account was opened under the label {0:?}")]
    UnknownLabel(String),
    #[error("An account was already opened under the label {0:?}")]
    DuplicateLabel(String),
}

/// The operations a batch file can contain
#[derive(Clone, Copy, Debug, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Open,
    Credit,
    Debit,
    Transfer,
    Deactivate,
}

/// One row of a batch file
///
/// Accounts are referred to by caller-chosen labels. `open` binds a label to
/// the freshly generated account number.
#[derive(Debug, serde::Deserialize)]
pub struct Operation {
    #[serde(rename = "type")]
    operation_type: OperationType,
    account: String,
    counterparty: Option<String>,
    amount: Option<Amount>,
}

/// The final state of a labelled account
#[derive(Debug, serde::Serialize)]
pub struct AccountSummary {
    pub label: String,
    pub account: AccountNumber,
    pub balance: Amount,
    pub active: bool,
}

/// Applies batch operations against a ledger
#[derive(Debug)]
pub struct Batch<'a, S, L> {
    engine: &'a LedgerEngine<S, L>,
    lifecycle: &'a AccountLifecycleManager<S>,
    labels: BTreeMap<String, AccountNumber>,
}

impl<'a, S: AccountStore, L: TransactionLog> Batch<'a, S, L> {
    pub fn new(engine: &'a LedgerEngine<S, L>, lifecycle: &'a AccountLifecycleManager<S>) -> Self {
        Self {
            engine,
            lifecycle,
            labels: BTreeMap::new(),
        }
    }

    /// Runs one operation
    pub fn handle(&mut self, operation: Operation) -> Result<(), BatchError> {
        match operation.operation_type {
            OperationType::Open => {
                let amount = operation.amount.ok_or(BatchError::AmountNotSpecified)?;
                let entry = match self.labels.entry(operation.account) {
                    Entry::Vacant(v) => v,
                    Entry::Occupied(o) => return Err(BatchError::DuplicateLabel(o.key().clone())),
                };
                let profile = Profile {
                    name: entry.key().clone(),
                    ..Profile::default()
                };
                let account = self.lifecycle.open(profile, String::new(), amount)?;
                entry.insert(account.number().clone());
            }
            OperationType::Credit => {
                let amount = operation.amount.ok_or(BatchError::AmountNotSpecified)?;
                self.engine.credit(self.resolve(&operation.account)?, amount)?;
            }
            OperationType::Debit => {
                let amount = operation.amount.ok_or(BatchError::AmountNotSpecified)?;
                self.engine.debit(self.resolve(&operation.account)?, amount)?;
            }
            OperationType::Transfer => {
                let amount = operation.amount.ok_or(BatchError::AmountNotSpecified)?;
                let counterparty = operation
                    .counterparty
                    .as_deref()
                    .ok_or(BatchError::CounterpartyNotSpecified)?;
                self.engine.transfer(
                    self.resolve(&operation.account)?,
                    self.resolve(counterparty)?,
                    amount,
                )?;
            }
            OperationType::Deactivate => {
                self.engine.deactivate(self.resolve(&operation.account)?)?;
            }
        }

        Ok(())
    }

    /// All labelled accounts, ordered by label
    pub fn accounts(&self) -> Result<Vec<AccountSummary>, LedgerError> {
        self.labels
            .iter()
            .map(|(label, number)| {
                let account: Account = self.engine.account(number)?;
                Ok(AccountSummary {
                    label: label.clone(),
                    account: number.clone(),
                    balance: account.balance(),
                    active: account.is_active(),
                })
            })
            .collect()
    }

    /// The history of every labelled account, in log order
    pub fn transactions(&self) -> Result<Vec<Transaction>, LedgerError> {
        let mut transactions = Vec::new();
        for number in self.labels.values() {
            transactions.extend(self.engine.transactions(number)?);
        }
        transactions.sort_by_key(Transaction::id);

        Ok(transactions)
    }

    fn resolve(&self, label: &str) -> Result<&AccountNumber, BatchError> {
        self.labels
            .get(label)
            .ok_or_else(|| BatchError::UnknownLabel(label.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{InMemoryAccountStore, InMemoryTransactionLog, LedgerConfig, TransactionType};

    #[derive(Debug, serde::Deserialize, PartialEq)]
    struct Expected {
        label: String,
        balance: Amount,
        active: bool,
    }

    fn run(operations: &str) -> (Vec<Expected>, Vec<Transaction>) {
        let store = Arc::new(InMemoryAccountStore::new());
        let engine = LedgerEngine::new(
            Arc::clone(&store),
            Arc::new(InMemoryTransactionLog::new()),
            LedgerConfig::default(),
        );
        let lifecycle = AccountLifecycleManager::new(store, LedgerConfig::default());
        let mut batch = Batch::new(&engine, &lifecycle);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(operations.as_bytes());
        for operation in reader.deserialize() {
            let _ = batch.handle(operation.unwrap());
        }

        let accounts = batch
            .accounts()
            .unwrap()
            .into_iter()
            .map(|summary| Expected {
                label: summary.label,
                balance: summary.balance,
                active: summary.active,
            })
            .collect();
        (accounts, batch.transactions().unwrap())
    }

    macro_rules! batch_test {
        (
            $name:ident
            $operations:literal
            $solution:literal
        ) => {
            #[test]
            fn $name() {
                let (accounts, _) = run($operations);

                let mut expected = csv::ReaderBuilder::new()
                    .has_headers(true)
                    .trim(csv::Trim::All)
                    .from_reader($solution.as_bytes());
                let expected = expected
                    .deserialize::<Expected>()
                    .map(Result::unwrap)
                    .collect::<Vec<_>>();
                assert_eq!(accounts, expected);
            }
        };
    }

    batch_test!(open
        r#"type, account, counterparty, amount
           open,    alice,           ,   2000
           open,    bob,             ,   1999"#
        r#"label,balance,active
           alice,   2000,  true"#
    );
    batch_test!(duplicate_label
        r#"type, account, counterparty, amount
           open,    alice,           ,   2000
           open,    alice,           ,   5000"#
        r#"label,balance,active
           alice,   2000,  true"#
    );
    batch_test!(credit
        r#"type, account, counterparty, amount
           open,    alice,           ,   2000
           credit,  alice,           ,    500"#
        r#"label,balance,active
           alice,   2500,  true"#
    );
    batch_test!(debit_overdraft
        r#"type, account, counterparty, amount
           open,    alice,           ,   2000
           credit,  alice,           ,    500
           debit,   alice,           ,   3000
           debit,   alice,           ,    0.5"#
        r#"label,balance,active
           alice, 2499.5,  true"#
    );
    batch_test!(transfer
        r#"type, account, counterparty, amount
           open,    alice,           ,   2500
           open,    bob,             ,   2000
           transfer,alice,        bob,   1000"#
        r#"label,balance,active
           alice,   1500,  true
           bob,     3000,  true"#
    );
    batch_test!(transfer_to_unknown_label
        r#"type, account, counterparty, amount
           open,    alice,           ,   2500
           transfer,alice,      carol,   1000
           transfer,alice,           ,   1000"#
        r#"label,balance,active
           alice,   2500,  true"#
    );
    batch_test!(deactivate
        r#"type, account, counterparty, amount
           open,      alice,         ,   2500
           open,      bob,           ,   2000
           deactivate,alice,         ,
           credit,    alice,         ,    100
           transfer,  bob,      alice,    100
           deactivate,alice,         ,"#
        r#"label,balance,active
           alice,   2500, false
           bob,     2000,  true"#
    );

    #[test]
    fn transfer_legs_in_log_order() {
        let (_, transactions) = run(r#"type, account, counterparty, amount
            open,    alice,           ,   2500
            open,    bob,             ,   2000
            credit,  bob,             ,     10
            transfer,alice,        bob,   1000"#);

        let types = transactions
            .iter()
            .map(Transaction::transaction_type)
            .collect::<Vec<_>>();
        assert_eq!(types, [TransactionType::Credit, TransactionType::TransferOut, TransactionType::TransferIn]);
        assert_eq!(transactions[1].amount(), transactions[2].amount());
    }

    #[test]
    fn missing_fields() {
        let store = Arc::new(InMemoryAccountStore::new());
        let engine = LedgerEngine::new(
            Arc::clone(&store),
            Arc::new(InMemoryTransactionLog::new()),
            LedgerConfig::default(),
        );
        let lifecycle = AccountLifecycleManager::new(store, LedgerConfig::default());
        let mut batch = Batch::new(&engine, &lifecycle);

        let operation = Operation {
            operation_type: OperationType::Credit,
            account: "alice".into(),
            counterparty: None,
            amount: None,
        };
        assert!(matches!(batch.handle(operation), Err(BatchError::AmountNotSpecified)));
    }
}
