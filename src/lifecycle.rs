use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::{debug, info};

use crate::engine::report;
use crate::{Account, AccountNumber, AccountStore, Amount, LedgerConfig, LedgerError, Profile, ProfileUpdate, StoreError};

const ACCOUNT_NUMBERS: std::ops::RangeInclusive<u64> = 1_000_000_000..=9_999_999_999;

/// Opens accounts and maintains their non-monetary fields
///
/// Balances are none of its business after opening; those only change
/// through the [`LedgerEngine`](crate::LedgerEngine).
pub struct AccountLifecycleManager<S> {
    store: Arc<S>,
    rng: Mutex<Box<dyn RngCore + Send>>,
    config: LedgerConfig,
}

impl<S: AccountStore> AccountLifecycleManager<S> {
    /// Creates a manager drawing account numbers from an entropy-seeded rng
    pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
        Self::with_rng(store, config, StdRng::from_entropy())
    }

    /// Creates a manager drawing account numbers from `rng`
    pub fn with_rng(store: Arc<S>, config: LedgerConfig, rng: impl RngCore + Send + 'static) -> Self {
        Self {
            store,
            rng: Mutex::new(Box::new(rng)),
            config,
        }
    }

    /// Opens a new active account holding `initial_balance`
    ///
    /// Account numbers are drawn at random; a number that is already taken
    /// is re-rolled until `max_account_number_attempts` is reached.
    pub fn open(
        &self,
        profile: Profile,
        credential: String,
        initial_balance: Amount,
    ) -> Result<Account, LedgerError> {
        let minimum = self.config.minimum_opening_balance;
        if initial_balance < minimum {
            return Err(LedgerError::BelowMinimumBalance { minimum });
        }

        let attempts = self.config.max_account_number_attempts.max(1);
        for attempt in 1..=attempts {
            let number = self.next_number();
            let account = Account::new(number.clone(), profile.clone(), credential.clone(), initial_balance);

            match self.store.create(account) {
                Ok(()) => {
                    info!(account = %number, balance = %initial_balance, "account opened");
                    return self.store.get(&number).map_err(LedgerError::from).map_err(report);
                }
                Err(StoreError::AlreadyExists(_)) => {
                    debug!(account = %number, attempt, "account number taken; re-rolling");
                }
                Err(err) => return Err(report(err.into())),
            }
        }

        Err(LedgerError::IdentifierSpaceExhausted { attempts })
    }

    /// Overwrites city, contact number, email and address
    pub fn update_profile(&self, number: &AccountNumber, update: ProfileUpdate) -> Result<(), LedgerError> {
        self.store
            .update_profile(number, update)
            .map_err(LedgerError::from)
            .map_err(report)
    }

    pub fn change_credential(&self, number: &AccountNumber, credential: String) -> Result<(), LedgerError> {
        self.store
            .set_credential(number, credential)
            .map_err(LedgerError::from)
            .map_err(report)
    }

    /// The current state of an account
    pub fn account(&self, number: &AccountNumber) -> Result<Account, LedgerError> {
        self.store
            .get(number)
            .map_err(LedgerError::from)
            .map_err(report)
    }

    /// Every account, ordered by account number
    pub fn accounts(&self) -> Result<Vec<Account>, LedgerError> {
        self.store
            .list()
            .map_err(LedgerError::from)
            .map_err(report)
    }

    fn next_number(&self) -> AccountNumber {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        AccountNumber::new(rng.gen_range(ACCOUNT_NUMBERS).to_string())
    }
}

impl<S> std::fmt::Debug for AccountLifecycleManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountLifecycleManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryAccountStore;

    fn profile() -> Profile {
        Profile {
            name: "Ada Lovelace".into(),
            dob: "1990-12-10".into(),
            city: "London".into(),
            contact_number: "9876543210".into(),
            email: "ada@example.com".into(),
            address: "12 St James's Square".into(),
        }
    }

    fn manager(store: &Arc<InMemoryAccountStore>, seed: u64, attempts: u32) -> AccountLifecycleManager<InMemoryAccountStore> {
        let config = LedgerConfig {
            max_account_number_attempts: attempts,
            ..LedgerConfig::default()
        };
        AccountLifecycleManager::with_rng(Arc::clone(store), config, StdRng::seed_from_u64(seed))
    }

    #[test]
    fn open_with_minimum_balance() {
        let store = Arc::new(InMemoryAccountStore::new());
        let account = AccountLifecycleManager::new(Arc::clone(&store), LedgerConfig::default())
            .open(profile(), "s3cret!pw".into(), Amount::from_num(2000))
            .unwrap();

        assert_eq!(account.balance(), Amount::from_num(2000));
        assert!(account.is_active());
        assert_eq!(account.number().as_str().len(), 10);
        assert!(account.number().as_str().chars().all(|c| c.is_ascii_digit()));
        assert_eq!(store.get(account.number()).unwrap(), account);
    }

    #[test]
    fn open_below_minimum_balance() {
        let store = Arc::new(InMemoryAccountStore::new());
        let result = manager(&store, 1, 16).open(profile(), String::new(), Amount::from_num(1999));

        assert_eq!(
            result,
            Err(LedgerError::BelowMinimumBalance { minimum: Amount::from_num(2000) }),
        );
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn taken_numbers_are_rerolled() {
        let store = Arc::new(InMemoryAccountStore::new());
        let first = manager(&store, 7, 16)
            .open(profile(), String::new(), Amount::from_num(2000))
            .unwrap();
        // same seed, so the first draw collides
        let second = manager(&store, 7, 16)
            .open(profile(), String::new(), Amount::from_num(2000))
            .unwrap();

        assert_ne!(first.number(), second.number());
        let mut expected = vec![first, second];
        expected.sort_by(|a, b| a.number().cmp(b.number()));
        assert_eq!(manager(&store, 7, 16).accounts().unwrap(), expected);
    }

    #[test]
    fn exhausted_attempts() {
        let store = Arc::new(InMemoryAccountStore::new());
        manager(&store, 7, 1)
            .open(profile(), String::new(), Amount::from_num(2000))
            .unwrap();

        assert_eq!(
            manager(&store, 7, 1).open(profile(), String::new(), Amount::from_num(2000)),
            Err(LedgerError::IdentifierSpaceExhausted { attempts: 1 }),
        );
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn profile_and_credential_updates() {
        let store = Arc::new(InMemoryAccountStore::new());
        let manager = manager(&store, 3, 16);
        let account = manager.open(profile(), "old".into(), Amount::from_num(2500)).unwrap();

        manager
            .update_profile(account.number(), ProfileUpdate {
                city: "Paris".into(),
                contact_number: "9123456789".into(),
                email: "ada@example.fr".into(),
                address: "1 Rue de Rivoli".into(),
            })
            .unwrap();
        manager.change_credential(account.number(), "new".into()).unwrap();

        let updated = manager.account(account.number()).unwrap();
        assert_eq!(updated.profile().name, "Ada Lovelace");
        assert_eq!(updated.profile().city, "Paris");
        assert_eq!(updated.credential(), "new");
        assert_eq!(updated.balance(), Amount::from_num(2500));
    }

    #[test]
    fn updating_unknown_account() {
        let store = Arc::new(InMemoryAccountStore::new());
        let number = AccountNumber::new("1234567890");

        assert_eq!(
            manager(&store, 3, 16).change_credential(&number, "pw".into()),
            Err(LedgerError::AccountNotFound(number)),
        );
    }
}
