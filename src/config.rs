use crate::account::Amount;

/// Tunables of the ledger
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LedgerConfig {
    /// The smallest balance an account can be opened with
    pub minimum_opening_balance: Amount,
    /// How often a conflicting balance write is retried before giving up
    pub max_conflict_retries: u32,
    /// How many random account numbers are tried before giving up
    pub max_account_number_attempts: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            minimum_opening_balance: Amount::from_num(2000),
            max_conflict_retries: 8,
            max_account_number_attempts: 16,
        }
    }
}

impl LedgerConfig {
    /// Parses a TOML document; missing keys keep their defaults
    pub fn from_toml(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(LedgerConfig::from_toml("").unwrap(), LedgerConfig::default());
    }

    #[test]
    fn partial_document_overrides_keys() {
        let config = LedgerConfig::from_toml(r#"
            minimum_opening_balance = "500"
            max_conflict_retries = 3
        "#).unwrap();

        assert_eq!(config.minimum_opening_balance, Amount::from_num(500));
        assert_eq!(config.max_conflict_retries, 3);
        assert_eq!(config.max_account_number_attempts, 16);
    }
}
