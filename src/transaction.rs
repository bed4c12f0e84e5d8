use chrono::{DateTime, Utc};

use crate::account::{AccountNumber, Amount};

/// The unique identifier of a transaction
///
/// Ids are handed out by the transaction log in strictly increasing order.
#[derive(Clone, Copy, Debug, serde::Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct TransactionId(u64);

impl TransactionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

/// The different kinds of balance movements recorded by the ledger
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Funds paid into the account
    Credit,
    /// Funds taken out of the account
    Debit,
    /// The outgoing leg of a transfer
    TransferOut,
    /// The incoming leg of a transfer
    TransferIn,
}

/// A transaction that has not been appended to a log yet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTransaction {
    pub account: AccountNumber,
    pub transaction_type: TransactionType,
    pub amount: Amount,
}

impl NewTransaction {
    pub fn new(account: AccountNumber, transaction_type: TransactionType, amount: Amount) -> Self {
        Self { account, transaction_type, amount }
    }
}

/// A transaction
///
/// An immutable entry of the transaction log. The amount is always positive;
/// whether it added to or removed from the balance follows from the type.
#[derive(Clone, Debug, serde::Serialize, PartialEq, Eq)]
pub struct Transaction {
    id: TransactionId,
    account: AccountNumber,
    #[serde(rename = "type")]
    transaction_type: TransactionType,
    amount: Amount,
    timestamp: DateTime<Utc>,
}

impl Transaction {
    pub(crate) fn stamp(entry: NewTransaction, id: TransactionId, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            account: entry.account,
            transaction_type: entry.transaction_type,
            amount: entry.amount,
            timestamp,
        }
    }

    /// The unique id of a transaction
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// The account this transaction is for
    pub fn account(&self) -> &AccountNumber {
        &self.account
    }

    /// The type of the transaction
    pub fn transaction_type(&self) -> TransactionType {
        self.transaction_type
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// The time the transaction was appended to the log
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
