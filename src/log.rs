use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::account::AccountNumber;
use crate::store::{StoreError, StoreResult};
use crate::transaction::{NewTransaction, Transaction, TransactionId};

/// Append-only storage of [`Transaction`] records
///
/// The log assigns ids and timestamps. Ids strictly increase and timestamps
/// never go backwards in append order. There is no way to change or remove
/// an entry once it has been appended.
pub trait TransactionLog: Send + Sync {
    /// Appends all entries as one unit
    ///
    /// Either every entry is appended, with consecutive ids and a shared
    /// timestamp, or none is. The only failure is the backend being
    /// unavailable.
    fn append_all(&self, entries: Vec<NewTransaction>) -> StoreResult<Vec<Transaction>>;

    /// The history of one account, oldest first
    fn list_by_account(&self, account: &AccountNumber) -> StoreResult<Vec<Transaction>>;

    /// Appends a single entry
    fn append(&self, entry: NewTransaction) -> StoreResult<Transaction> {
        self.append_all(vec![entry])?
            .pop()
            .ok_or_else(|| StoreError::Unavailable("log returned no entry".into()))
    }
}

#[derive(Debug, Default)]
struct LogState {
    entries: Vec<Transaction>,
    /// positions in `entries`, per account
    by_account: HashMap<AccountNumber, Vec<usize>>,
    last_timestamp: Option<DateTime<Utc>>,
}

/// In-memory transaction log
#[derive(Debug, Default)]
pub struct InMemoryTransactionLog {
    state: Mutex<LogState>,
}

impl InMemoryTransactionLog {
    /// Creates a new, empty log
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, LogState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("transaction log lock poisoned".into()))
    }
}

impl TransactionLog for InMemoryTransactionLog {
    fn append_all(&self, entries: Vec<NewTransaction>) -> StoreResult<Vec<Transaction>> {
        let mut state = self.lock()?;

        // the wall clock may step backwards; the log must not
        let now = Utc::now();
        let timestamp = match state.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        state.last_timestamp = Some(timestamp);

        let mut appended = Vec::with_capacity(entries.len());
        for entry in entries {
            let position = state.entries.len();
            let id = TransactionId::new(position as u64 + 1);
            let transaction = Transaction::stamp(entry, id, timestamp);

            state.by_account
                .entry(transaction.account().clone())
                .or_default()
                .push(position);
            state.entries.push(transaction.clone());
            appended.push(transaction);
        }

        Ok(appended)
    }

    fn list_by_account(&self, account: &AccountNumber) -> StoreResult<Vec<Transaction>> {
        let state = self.lock()?;
        let positions = match state.by_account.get(account) {
            Some(positions) => positions,
            None => return Ok(Vec::new()),
        };

        Ok(positions
            .iter()
            .map(|&position| state.entries[position].clone())
            .collect())
    }
}
