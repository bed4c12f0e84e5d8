pub use self::{
    account::{Account, AccountNumber, Amount, Profile, ProfileUpdate},
    batch::{AccountSummary, Batch, BatchError, Operation, OperationType},
    config::LedgerConfig,
    engine::{LedgerEngine, LedgerError},
    lifecycle::AccountLifecycleManager,
    log::{InMemoryTransactionLog, TransactionLog},
    store::{AccountStore, InMemoryAccountStore, StoreError, StoreResult},
    transaction::{NewTransaction, Transaction, TransactionId, TransactionType},
};

mod account;
mod batch;
mod config;
mod engine;
mod lifecycle;
mod log;
mod store;
mod transaction;
