use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, error, info};

use crate::{
    Account, AccountNumber, AccountStore, Amount, LedgerConfig, NewTransaction, StoreError,
    Transaction, TransactionLog, TransactionType,
};

/// Possible errors to occur during ledger operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Account {0} does not exist")]
    AccountNotFound(AccountNumber),
    #[error("The amount has to be greater than zero and representable")]
    InvalidAmount,
    #[error("The account does not hold enough funds")]
    InsufficientFunds,
    #[error("Account {0} is deactivated")]
    AccountInactive(AccountNumber),
    #[error("Source and destination are the same account")]
    SameAccount,
    #[error("The initial balance is below the minimum of {minimum}")]
    BelowMinimumBalance { minimum: Amount },
    #[error("No unused account number found after {attempts} attempts")]
    IdentifierSpaceExhausted { attempts: u32 },
    #[error("Account {0} was modified concurrently")]
    ConcurrentModification(AccountNumber),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl LedgerError {
    /// Whether repeating the whole operation from a fresh read may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::ConcurrentModification(_))
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(number) => LedgerError::AccountNotFound(number),
            StoreError::ConcurrentModification(number) => LedgerError::ConcurrentModification(number),
            StoreError::AlreadyExists(number) => {
                LedgerError::StorageUnavailable(format!("unexpected duplicate account {}", number))
            }
            StoreError::Unavailable(reason) => LedgerError::StorageUnavailable(reason),
        }
    }
}

/// Domain violations go back to the caller silently, storage faults get reported
pub(crate) fn report(err: LedgerError) -> LedgerError {
    if let LedgerError::StorageUnavailable(reason) = &err {
        error!(%reason, "storage fault");
    }
    err
}

/// A balance movement that can be applied and undone
#[derive(Clone, Copy, Debug)]
enum Change {
    Add(Amount),
    Sub(Amount),
}

impl Change {
    fn apply(self, balance: Amount) -> Result<Amount, LedgerError> {
        match self {
            Change::Add(amount) => balance
                .checked_add(amount)
                .ok_or(LedgerError::InvalidAmount),
            Change::Sub(amount) => balance
                .checked_sub(amount)
                .ok_or(LedgerError::InsufficientFunds),
        }
    }

    fn inverse(self) -> Self {
        match self {
            Change::Add(amount) => Change::Sub(amount),
            Change::Sub(amount) => Change::Add(amount),
        }
    }
}

/// Per-account mutation rights
///
/// Holding an account's lock exclusively is the right to change it through
/// this engine; reads share it, so they never see an operation half-applied.
/// Entries are created lazily and live as long as the engine; accounts are
/// never deleted, so the table only grows with the account set.
#[derive(Debug, Default)]
struct AccountLocks {
    locks: Mutex<HashMap<AccountNumber, Arc<RwLock<()>>>>,
}

impl AccountLocks {
    fn handle(&self, number: &AccountNumber) -> Arc<RwLock<()>> {
        // a panic elsewhere can't leave a map of plain handles inconsistent
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(number.clone()).or_default().clone()
    }
}

/// The central ledger engine used for all balance mutations
///
/// Every mutating operation first takes the mutation rights of the accounts
/// it touches, and every read waits for them to be released. Transfers take both in account-number order, whichever side
/// is the source, so two transfers can never wait on each other in a cycle.
/// While the rights are held, each balance write is a compare-and-set
/// against the store, re-read and retried a bounded number of times when
/// another writer sharing the store got there first.
#[derive(Debug)]
pub struct LedgerEngine<S, L> {
    store: Arc<S>,
    log: Arc<L>,
    locks: AccountLocks,
    config: LedgerConfig,
}

impl<S: AccountStore, L: TransactionLog> LedgerEngine<S, L> {
    /// Creates a new engine on top of the given storage handles
    pub fn new(store: Arc<S>, log: Arc<L>, config: LedgerConfig) -> Self {
        Self {
            store,
            log,
            locks: AccountLocks::default(),
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Pays `amount` into an active account
    pub fn credit(&self, number: &AccountNumber, amount: Amount) -> Result<Transaction, LedgerError> {
        check_amount(amount)?;
        let rights = self.locks.handle(number);
        let _rights = rights.write().unwrap_or_else(PoisonError::into_inner);

        self.apply_and_record(number, Change::Add(amount), TransactionType::Credit)
            .map_err(report)
    }

    /// Takes `amount` out of an active account, refusing to overdraw it
    pub fn debit(&self, number: &AccountNumber, amount: Amount) -> Result<Transaction, LedgerError> {
        check_amount(amount)?;
        let rights = self.locks.handle(number);
        let _rights = rights.write().unwrap_or_else(PoisonError::into_inner);

        self.apply_and_record(number, Change::Sub(amount), TransactionType::Debit)
            .map_err(report)
    }

    /// Moves `amount` from `source` to `destination`
    ///
    /// Returns the `TransferOut` and `TransferIn` legs. Either both balances
    /// change and both legs are logged, or nothing observable happens.
    pub fn transfer(
        &self,
        source: &AccountNumber,
        destination: &AccountNumber,
        amount: Amount,
    ) -> Result<(Transaction, Transaction), LedgerError> {
        check_amount(amount)?;
        if source == destination {
            return Err(LedgerError::SameAccount);
        }

        let (first, second) = match source < destination {
            true => (source, destination),
            false => (destination, source),
        };
        let first = self.locks.handle(first);
        let second = self.locks.handle(second);
        let _first = first.write().unwrap_or_else(PoisonError::into_inner);
        let _second = second.write().unwrap_or_else(PoisonError::into_inner);

        self.transfer_locked(source, destination, amount)
            .map_err(report)
    }

    /// Marks an account as inactive
    ///
    /// Deactivating an inactive account succeeds without doing anything.
    pub fn deactivate(&self, number: &AccountNumber) -> Result<(), LedgerError> {
        let rights = self.locks.handle(number);
        let _rights = rights.write().unwrap_or_else(PoisonError::into_inner);

        let account = self.store.get(number).map_err(LedgerError::from).map_err(report)?;
        if !account.is_active() {
            debug!(account = %number, "account already inactive");
            return Ok(());
        }
        self.store.set_active(number, false).map_err(LedgerError::from).map_err(report)?;
        info!(account = %number, "account deactivated");

        Ok(())
    }

    /// The current balance, as recorded by the store
    pub fn balance(&self, number: &AccountNumber) -> Result<Amount, LedgerError> {
        self.account(number).map(|account| account.balance())
    }

    /// The current state of an account, as recorded by the store
    pub fn account(&self, number: &AccountNumber) -> Result<Account, LedgerError> {
        let rights = self.locks.handle(number);
        let _rights = rights.read().unwrap_or_else(PoisonError::into_inner);

        self.store
            .get(number)
            .map_err(LedgerError::from)
            .map_err(report)
    }

    /// The history of an account, oldest first
    pub fn transactions(&self, number: &AccountNumber) -> Result<Vec<Transaction>, LedgerError> {
        let rights = self.locks.handle(number);
        let _rights = rights.read().unwrap_or_else(PoisonError::into_inner);

        self.store.get(number).map_err(LedgerError::from).map_err(report)?;
        self.log
            .list_by_account(number)
            .map_err(LedgerError::from)
            .map_err(report)
    }

    fn transfer_locked(
        &self,
        source: &AccountNumber,
        destination: &AccountNumber,
        amount: Amount,
    ) -> Result<(Transaction, Transaction), LedgerError> {
        // both sides have to be usable before any balance moves
        self.active_account(source)?;
        self.active_account(destination)?;

        let withdrawal = Change::Sub(amount);
        let deposit = Change::Add(amount);

        self.apply(source, withdrawal)?;
        if let Err(err) = self.apply(destination, deposit) {
            return Err(self.roll_back(err, &[(source, withdrawal)]));
        }

        let legs = vec![
            NewTransaction::new(source.clone(), TransactionType::TransferOut, amount),
            NewTransaction::new(destination.clone(), TransactionType::TransferIn, amount),
        ];
        let err = match self.log.append_all(legs) {
            Ok(appended) => match <[Transaction; 2]>::try_from(appended) {
                Ok([outgoing, incoming]) => {
                    debug!(
                        source = %source,
                        destination = %destination,
                        %amount,
                        "transfer applied"
                    );
                    return Ok((outgoing, incoming));
                }
                Err(appended) => LedgerError::StorageUnavailable(format!(
                    "log appended {} transfer legs instead of 2",
                    appended.len(),
                )),
            },
            Err(err) => err.into(),
        };

        Err(self.roll_back(err, &[(destination, deposit), (source, withdrawal)]))
    }

    fn apply_and_record(
        &self,
        number: &AccountNumber,
        change: Change,
        transaction_type: TransactionType,
    ) -> Result<Transaction, LedgerError> {
        self.apply(number, change)?;

        let amount = match change {
            Change::Add(amount) | Change::Sub(amount) => amount,
        };
        match self.log.append(NewTransaction::new(number.clone(), transaction_type, amount)) {
            Ok(transaction) => {
                debug!(account = %number, ?transaction_type, %amount, "balance updated");
                Ok(transaction)
            }
            Err(err) => Err(self.roll_back(err.into(), &[(number, change)])),
        }
    }

    /// Reads an account and makes sure it still accepts mutations
    fn active_account(&self, number: &AccountNumber) -> Result<Account, LedgerError> {
        let account = self.store.get(number)?;
        match account.is_active() {
            true => Ok(account),
            false => Err(LedgerError::AccountInactive(number.clone())),
        }
    }

    fn apply(&self, number: &AccountNumber, change: Change) -> Result<(), LedgerError> {
        self.with_retry(|| {
            let account = self.active_account(number)?;
            let balance = change.apply(account.balance())?;
            self.store.compare_and_set_balance(number, account.balance(), balance)?;
            Ok(())
        })
    }

    /// Undoes every applied change after `err` aborted an operation
    ///
    /// All undos are attempted even if one fails. When the rollback is
    /// incomplete the error says which accounts still need repair.
    fn roll_back(&self, err: LedgerError, applied: &[(&AccountNumber, Change)]) -> LedgerError {
        let failures = applied
            .iter()
            .filter_map(|&(number, change)| {
                self.compensate(number, change)
                    .err()
                    .map(|undo| format!("{}: {}", number, undo))
            })
            .collect::<Vec<_>>();

        match failures.is_empty() {
            true => err,
            false => LedgerError::StorageUnavailable(format!(
                "{}; rollback incomplete ({})",
                err,
                failures.join(", "),
            )),
        }
    }

    /// Undoes an applied change
    ///
    /// Works on a fresh read and ignores the active flag, so the inverse
    /// still lands if the balance was moved by someone else in between.
    fn compensate(&self, number: &AccountNumber, change: Change) -> Result<(), LedgerError> {
        let undo = change.inverse();
        self.with_retry(|| {
            let account = self.store.get(number)?;
            let balance = undo.apply(account.balance())?;
            self.store.compare_and_set_balance(number, account.balance(), balance)?;
            Ok(())
        })
    }

    fn with_retry<T, F>(&self, mut f: F) -> Result<T, LedgerError>
        where F: FnMut() -> Result<T, LedgerError>
    {
        let attempts = self.config.max_conflict_retries.max(1);
        let mut attempt = 1;

        loop {
            match f() {
                Err(LedgerError::ConcurrentModification(number)) if attempt < attempts => {
                    debug!(account = %number, attempt, "balance changed since read; retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

fn check_amount(amount: Amount) -> Result<(), LedgerError> {
    match amount > Amount::from_num(0) {
        true => Ok(()),
        false => Err(LedgerError::InvalidAmount),
    }
}
