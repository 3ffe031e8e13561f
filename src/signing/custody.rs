//! Key custody: account lookup and raw signing.
//!
//! The pipeline only needs "find the account for this public key" and "sign
//! these 32 bytes with that account". [`LocalKeyCustody`] implements both
//! over ed25519 keys loaded from a JSON keystore at startup.

use std::collections::HashMap;
use std::path::Path;

use ed25519_dalek::{Signer, SigningKey};
use serde::Deserialize;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::error::{SignerError, SignerResult};
use crate::signing::types::{Account, Root};

/// Owner of validator private keys.
pub trait KeyCustody: Send + Sync {
    /// Resolve an account by its raw public key. `Ok(None)` means unknown.
    fn account_by_public_key(&self, public_key: &[u8]) -> SignerResult<Option<Account>>;

    /// Sign `signing_root` with the account's key.
    fn sign(&self, account: &Account, signing_root: &Root) -> SignerResult<Vec<u8>>;
}

/// Keystore file layout.
#[derive(Deserialize)]
struct KeystoreFile {
    accounts: Vec<KeystoreEntry>,
}

#[derive(Deserialize)]
struct KeystoreEntry {
    id: Uuid,
    secret_key: String,
}

struct CustodiedKey {
    account: Account,
    signing_key: SigningKey,
}

/// In-process ed25519 key custody.
pub struct LocalKeyCustody {
    keys: HashMap<Vec<u8>, CustodiedKey>,
}

impl LocalKeyCustody {
    /// Build from `(account id, signing key)` pairs.
    pub fn from_keys(keys: impl IntoIterator<Item = (Uuid, SigningKey)>) -> Self {
        let keys = keys
            .into_iter()
            .map(|(id, signing_key)| {
                let public_key = signing_key.verifying_key().to_bytes().to_vec();
                let account = Account::new(id, public_key.clone());
                (
                    public_key,
                    CustodiedKey {
                        account,
                        signing_key,
                    },
                )
            })
            .collect();

        Self { keys }
    }

    /// Load a JSON keystore: `{"accounts":[{"id":"<uuid>","secret_key":"<hex>"}]}`.
    pub fn load(path: &Path) -> SignerResult<Self> {
        let raw = Zeroizing::new(std::fs::read(path).map_err(|e| {
            SignerError::Keystore(format!("Failed to read keystore {}: {e}", path.display()))
        })?);
        let file: KeystoreFile = serde_json::from_slice(&raw).map_err(|e| {
            SignerError::Keystore(format!("Failed to parse keystore {}: {e}", path.display()))
        })?;

        let mut keys = Vec::with_capacity(file.accounts.len());
        for entry in file.accounts {
            let secret_hex = Zeroizing::new(entry.secret_key);
            let secret = Zeroizing::new(hex::decode(secret_hex.as_str()).map_err(|e| {
                SignerError::Keystore(format!(
                    "Invalid secret key hex for account {}: {e}",
                    entry.id
                ))
            })?);
            let secret: &[u8; 32] = secret.as_slice().try_into().map_err(|_| {
                SignerError::Keystore(format!(
                    "Invalid secret key length for account {}: expected 32 bytes",
                    entry.id
                ))
            })?;
            keys.push((entry.id, SigningKey::from_bytes(secret)));
        }

        let custody = Self::from_keys(keys);
        tracing::info!(
            path = %path.display(),
            accounts = custody.len(),
            "Loaded validator keystore"
        );
        Ok(custody)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Accounts held by this custody.
    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.keys.values().map(|key| &key.account)
    }
}

impl KeyCustody for LocalKeyCustody {
    fn account_by_public_key(&self, public_key: &[u8]) -> SignerResult<Option<Account>> {
        Ok(self.keys.get(public_key).map(|key| key.account.clone()))
    }

    fn sign(&self, account: &Account, signing_root: &Root) -> SignerResult<Vec<u8>> {
        let key = self.keys.get(account.public_key()).ok_or_else(|| {
            SignerError::SigningFailed(format!("No key held for account {}", account.id()))
        })?;
        if key.account.id() != account.id() {
            return Err(SignerError::SigningFailed(format!(
                "Account {} does not own public key {}",
                account.id(),
                account.public_key_hex()
            )));
        }

        Ok(key.signing_key.sign(signing_root).to_bytes().to_vec())
    }
}
