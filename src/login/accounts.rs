use std::collections::HashMap;

use crate::config::AccountConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Ok,
    WrongPassword,
    UnknownAccount,
    Banned,
}

/// Where the login server checks credentials.
pub trait AccountStore: Send + Sync {
    fn authenticate(&self, name: &str, password: &str) -> AuthOutcome;
}

/// Accounts listed in the config file. Passwords are compared in plain text,
/// anything public should implement `AccountStore` on top of a real database.
#[derive(Debug, Default)]
pub struct ConfigAccountStore {
    accounts: HashMap<String, AccountConfig>,
}

impl ConfigAccountStore {
    pub fn new(accounts: &[AccountConfig]) -> Self {
        Self {
            accounts: accounts
                .iter()
                .map(|account| (account.name.to_lowercase(), account.clone()))
                .collect(),
        }
    }
}

impl AccountStore for ConfigAccountStore {
    fn authenticate(&self, name: &str, password: &str) -> AuthOutcome {
        let Some(account) = self.accounts.get(&name.to_lowercase()) else {
            return AuthOutcome::UnknownAccount;
        };

        if account.password != password {
            return AuthOutcome::WrongPassword;
        }

        if account.banned {
            return AuthOutcome::Banned;
        }

        AuthOutcome::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ConfigAccountStore {
        ConfigAccountStore::new(&[
            AccountConfig {
                name: "Alice".to_string(),
                password: "wonderland".to_string(),
                banned: false,
            },
            AccountConfig {
                name: "mallory".to_string(),
                password: "evil".to_string(),
                banned: true,
            },
        ])
    }

    #[test]
    fn outcomes() {
        let store = store();
        assert_eq!(store.authenticate("alice", "wonderland"), AuthOutcome::Ok);
        assert_eq!(store.authenticate("ALICE", "wonderland"), AuthOutcome::Ok);
        assert_eq!(
            store.authenticate("alice", "Wonderland"),
            AuthOutcome::WrongPassword
        );
        assert_eq!(store.authenticate("bob", "x"), AuthOutcome::UnknownAccount);
        assert_eq!(store.authenticate("mallory", "evil"), AuthOutcome::Banned);
        // a wrong password doesn't reveal the ban
        assert_eq!(
            store.authenticate("mallory", "good"),
            AuthOutcome::WrongPassword
        );
    }
}
