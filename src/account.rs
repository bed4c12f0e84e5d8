use fixed::types::U51F13;

/// A monetary amount
///
/// Amounts are unsigned: balances can never drop below zero, and the
/// direction of a transaction is carried by its type.
pub type Amount = U51F13;

/// The unique identifier of an account
///
/// Treated as an opaque key. Generated numbers happen to be ten decimal
/// digits, but nothing relies on that.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct AccountNumber(String);

impl AccountNumber {
    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Personal details of the account holder
///
/// The ledger never looks at these. Format checks belong to whoever
/// collects them.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub dob: String,
    pub city: String,
    pub contact_number: String,
    pub email: String,
    pub address: String,
}

/// The subset of [`Profile`] an account holder is allowed to change
#[derive(Clone, Debug, Default, serde::Deserialize, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub city: String,
    pub contact_number: String,
    pub email: String,
    pub address: String,
}

impl Profile {
    pub(crate) fn apply(&mut self, update: ProfileUpdate) {
        self.city = update.city;
        self.contact_number = update.contact_number;
        self.email = update.email;
        self.address = update.address;
    }
}

/// A customer account
///
/// Accounts are only ever deactivated, never removed. Once inactive, an
/// account rejects every balance mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    number: AccountNumber,
    balance: Amount,
    active: bool,
    profile: Profile,
    credential: String,
}

impl Account {
    /// Creates a new active account holding `balance`
    pub fn new(number: AccountNumber, profile: Profile, credential: String, balance: Amount) -> Self {
        Self {
            number,
            balance,
            active: true,
            profile,
            credential,
        }
    }

    /// The identifier of the account
    pub fn number(&self) -> &AccountNumber {
        &self.number
    }

    /// The funds currently held by the account
    pub fn balance(&self) -> Amount {
        self.balance
    }

    /// Whether the account still accepts mutations
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// The opaque credential handed over at opening
    ///
    /// Verifying it is up to the caller.
    pub fn credential(&self) -> &str {
        &self.credential
    }

    pub(crate) fn set_balance(&mut self, balance: Amount) {
        self.balance = balance;
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub(crate) fn profile_mut(&mut self) -> &mut Profile {
        &mut self.profile
    }

    pub(crate) fn set_credential(&mut self, credential: String) {
        self.credential = credential;
    }
}
