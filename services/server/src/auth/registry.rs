//! 账户索引：`(公钥摘要, 用户名)` -> `(账户组, 公钥)`。
//!
//! 只在加载设置时构建一次，之后只读；重载时整体替换。

use std::collections::{BTreeMap, HashMap};

use ed25519_dalek::VerifyingKey;

use crate::{
    auth::signature::{parse_public_key, public_key_hash},
    config::{AuthAccountConfig, ConfigError},
};

/// 索引键。
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub(crate) struct KeyLookup {
    pub(crate) key_hash: String,
    pub(crate) username: String,
}

impl KeyLookup {
    pub(crate) fn new(key_hash: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            key_hash: key_hash.into(),
            username: username.into(),
        }
    }
}

/// 命中项。
#[derive(Debug, Clone)]
pub(crate) struct RegisteredKey {
    pub(crate) account: String,
    pub(crate) public_key: VerifyingKey,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct AccountRegistry {
    keys: HashMap<KeyLookup, RegisteredKey>,
}

impl AccountRegistry {
    /// 遍历全部账户组构建索引；公钥无法解析或同一对出现两次都是致命错误。
    pub(crate) fn load(accounts: &BTreeMap<String, AuthAccountConfig>) -> Result<Self, ConfigError> {
        let mut keys: HashMap<KeyLookup, RegisteredKey> = HashMap::new();
        for (account, entry) in accounts {
            for (username, encoded) in &entry.client_keys {
                let public_key =
                    parse_public_key(encoded).ok_or_else(|| ConfigError::InvalidPublicKey {
                        account: account.clone(),
                        username: username.clone(),
                    })?;
                let lookup = KeyLookup::new(public_key_hash(&public_key), username.clone());
                if let Some(existing) = keys.get(&lookup) {
                    return Err(ConfigError::DuplicateKeyUser {
                        account: account.clone(),
                        username: username.clone(),
                        existing: existing.account.clone(),
                    });
                }
                keys.insert(
                    lookup,
                    RegisteredKey {
                        account: account.clone(),
                        public_key,
                    },
                );
            }
        }
        Ok(Self { keys })
    }

    pub(crate) fn lookup(&self, key_hash: &str, username: &str) -> Option<&RegisteredKey> {
        self.keys.get(&KeyLookup::new(key_hash, username))
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
    use ed25519_dalek::SigningKey;

    use super::AccountRegistry;
    use crate::{
        auth::signature::public_key_hash,
        config::{AuthAccountConfig, ConfigError},
    };

    fn encoded(seed: u8) -> String {
        URL_SAFE_NO_PAD.encode(SigningKey::from_bytes(&[seed; 32]).verifying_key().as_bytes())
    }

    fn account(users: &[(&str, String)]) -> AuthAccountConfig {
        AuthAccountConfig {
            client_keys: users
                .iter()
                .map(|(name, key)| (name.to_string(), key.clone()))
                .collect(),
            passwords: BTreeMap::new(),
        }
    }

    #[test]
    fn lookup_by_hash_and_username() {
        let accounts = BTreeMap::from([
            ("admins".to_string(), account(&[("alice", encoded(1))])),
            ("guests".to_string(), account(&[("bob", encoded(2))])),
        ]);
        let registry = AccountRegistry::load(&accounts).expect("load");
        assert_eq!(registry.len(), 2);

        let alice = SigningKey::from_bytes(&[1; 32]).verifying_key();
        let hash = public_key_hash(&alice);
        let hit = registry.lookup(&hash, "alice").expect("alice");
        assert_eq!(hit.account, "admins");
        assert_eq!(hit.public_key, alice);
        assert!(registry.lookup(&hash, "bob").is_none());
    }

    #[test]
    fn same_key_for_different_usernames_is_allowed() {
        let accounts = BTreeMap::from([
            ("admins".to_string(), account(&[("alice", encoded(1))])),
            ("guests".to_string(), account(&[("alice2", encoded(1))])),
        ]);
        assert!(AccountRegistry::load(&accounts).is_ok());
    }

    #[test]
    fn duplicate_pair_across_groups_is_fatal() {
        let accounts = BTreeMap::from([
            ("admins".to_string(), account(&[("alice", encoded(1))])),
            ("guests".to_string(), account(&[("alice", encoded(1))])),
        ]);
        let err = AccountRegistry::load(&accounts).expect_err("duplicate");
        assert!(matches!(
            err,
            ConfigError::DuplicateKeyUser { ref account, ref existing, .. }
                if account == "guests" && existing == "admins"
        ));
        assert!(err.to_string().contains("duplicate key/username pair"));
    }

    #[test]
    fn undecodable_key_is_fatal() {
        let accounts = BTreeMap::from([(
            "admins".to_string(),
            account(&[("alice", "%%%".to_string())]),
        )]);
        assert!(matches!(
            AccountRegistry::load(&accounts),
            Err(ConfigError::InvalidPublicKey { .. })
        ));
    }
}
