use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::account::{Account, AccountNumber, Amount, ProfileUpdate};

/// Possible errors to occur inside a storage backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("account {0} does not exist")]
    NotFound(AccountNumber),
    #[error("account {0} already exists")]
    AlreadyExists(AccountNumber),
    #[error("the balance of account {0} changed since it was read")]
    ConcurrentModification(AccountNumber),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Keyed storage of [`Account`] records
///
/// Implementations are plain maps: they enforce key uniqueness and make
/// single-record updates atomic, nothing more. Backends that talk to an
/// external engine report timeouts and I/O failures as
/// [`StoreError::Unavailable`] instead of blocking.
pub trait AccountStore: Send + Sync {
    /// Reads the current state of an account
    fn get(&self, number: &AccountNumber) -> StoreResult<Account>;

    /// Inserts a new account, failing if the number is already taken
    fn create(&self, account: Account) -> StoreResult<()>;

    /// Replaces the balance, provided it still equals `expected`
    fn compare_and_set_balance(
        &self,
        number: &AccountNumber,
        expected: Amount,
        new: Amount,
    ) -> StoreResult<()>;

    fn set_active(&self, number: &AccountNumber, active: bool) -> StoreResult<()>;

    fn update_profile(&self, number: &AccountNumber, update: ProfileUpdate) -> StoreResult<()>;

    fn set_credential(&self, number: &AccountNumber, credential: String) -> StoreResult<()>;

    /// All accounts, ordered by account number
    fn list(&self) -> StoreResult<Vec<Account>>;
}

/// In-memory account store
///
/// Intended for tests and embedding. Records live behind a `RwLock`, so
/// concurrent readers never block each other and every write is atomic.
#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    accounts: RwLock<BTreeMap<AccountNumber, Account>>,
}

impl InMemoryAccountStore {
    /// Creates a new, empty store
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(BTreeMap::new()),
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, BTreeMap<AccountNumber, Account>>> {
        self.accounts
            .read()
            .map_err(|_| StoreError::Unavailable("account map lock poisoned".into()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, BTreeMap<AccountNumber, Account>>> {
        self.accounts
            .write()
            .map_err(|_| StoreError::Unavailable("account map lock poisoned".into()))
    }

    fn modify<F>(&self, number: &AccountNumber, f: F) -> StoreResult<()>
        where F: FnOnce(&mut Account) -> StoreResult<()>
    {
        let mut accounts = self.write()?;
        let account = accounts
            .get_mut(number)
            .ok_or_else(|| StoreError::NotFound(number.clone()))?;
        f(account)
    }
}

impl AccountStore for InMemoryAccountStore {
    fn get(&self, number: &AccountNumber) -> StoreResult<Account> {
        self.read()?
            .get(number)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(number.clone()))
    }

    fn create(&self, account: Account) -> StoreResult<()> {
        use std::collections::btree_map::Entry;

        match self.write()?.entry(account.number().clone()) {
            Entry::Vacant(v) => {
                v.insert(account);
                Ok(())
            }
            Entry::Occupied(o) => Err(StoreError::AlreadyExists(o.key().clone())),
        }
    }

    fn compare_and_set_balance(
        &self,
        number: &AccountNumber,
        expected: Amount,
        new: Amount,
    ) -> StoreResult<()> {
        self.modify(number, |account| {
            if account.balance() != expected {
                return Err(StoreError::ConcurrentModification(number.clone()));
            }
            account.set_balance(new);
            Ok(())
        })
    }

    fn set_active(&self, number: &AccountNumber, active: bool) -> StoreResult<()> {
        self.modify(number, |account| {
            account.set_active(active);
            Ok(())
        })
    }

    fn update_profile(&self, number: &AccountNumber, update: ProfileUpdate) -> StoreResult<()> {
        self.modify(number, |account| {
            account.profile_mut().apply(update);
            Ok(())
        })
    }

    fn set_credential(&self, number: &AccountNumber, credential: String) -> StoreResult<()> {
        self.modify(number, |account| {
            account.set_credential(credential);
            Ok(())
        })
    }

    fn list(&self) -> StoreResult<Vec<Account>> {
        Ok(self.read()?.values().cloned().collect())
    }
}
