//! Credential checks for `POST /auth/login`.
//!
//! Accounts live in the node config. Passwords are stored as
//! `hex(salt):hex(digest)` where the digest is a BLAKE3 keyed hash of the
//! password under a key derived from the salt.

use async_trait::async_trait;
use rand::RngCore;
use std::collections::BTreeMap;

use crate::config::NodeConfigAccount;

const PASSWORD_KEY_CONTEXT: &str = "stash account password v1";
const SALT_LEN: usize = 16;

/// Maps credentials to the namespace of the account they belong to.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Returns the account's namespace id if the password matches.
    async fn authenticate(&self, username: &str, password: &str) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
pub struct ConfigIdentityStore {
    accounts: BTreeMap<String, NodeConfigAccount>,
}

impl ConfigIdentityStore {
    pub fn new(accounts: BTreeMap<String, NodeConfigAccount>) -> Self {
        Self { accounts }
    }
}

#[async_trait]
impl IdentityStore for ConfigIdentityStore {
    async fn authenticate(&self, username: &str, password: &str) -> Option<String> {
        let Some(account) = self.accounts.get(username) else {
            // Same amount of hashing as a real check.
            let _ = digest(&[0; SALT_LEN], password);
            tracing::debug!(username, "login for unknown account");
            return None;
        };
        if verify_password(password, &account.password_hash) {
            Some(account.namespace.clone())
        } else {
            tracing::debug!(username, "login with wrong password");
            None
        }
    }
}

pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    format!(
        "{}:{}",
        hex::encode(salt),
        hex::encode(digest(&salt, password).as_bytes())
    )
}

pub fn verify_password(password: &str, encoded: &str) -> bool {
    let Some((salt_hex, digest_hex)) = encoded.split_once(':') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    let Some(expected) = hex::decode(digest_hex)
        .ok()
        .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
    else {
        return false;
    };
    // blake3::Hash equality is constant time.
    digest(&salt, password) == blake3::Hash::from(expected)
}

fn digest(salt: &[u8], password: &str) -> blake3::Hash {
    let key = blake3::derive_key(PASSWORD_KEY_CONTEXT, salt);
    blake3::keyed_hash(&key, password.as_bytes())
}
