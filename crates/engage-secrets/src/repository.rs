//! Encrypted key/value password repository
//!
//! On disk:
//! - `cipher_file`: `ENGPW1` magic, 12-byte nonce, ChaCha20-Poly1305
//!   ciphertext of the JSON-serialized key/value map
//! - `salt_file`: 16 random bytes, generated once per repository
//!
//! Both files are written with mode 0600. The encryption key is derived
//! from the master password and the salt with Argon2; a wrong master
//! password fails authentication and surfaces as
//! [`SecretsError::WrongMasterPassword`].

use argon2::Argon2;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use engage_core::utils::write_atomic;
use rand::RngCore;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{SecretsError, SecretsResult};
use crate::security::{audit, RepositoryAccess, SecureString};

const MAGIC: &[u8] = b"ENGPW1";
const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;
const SALT_SIZE: usize = 16;
const FILE_MODE: u32 = 0o600;

/// Repository key under which a user's sudo password is stored
pub fn sudo_password_key(user: &str) -> String {
    format!("Engage/{}/sudo_password", user)
}

/// In-memory password repository, unlocked by a master password
pub struct PasswordRepository {
    entries: BTreeMap<String, SecureString>,
    key: Zeroizing<[u8; KEY_SIZE]>,
    salt: Vec<u8>,
}

impl std::fmt::Debug for PasswordRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordRepository")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

fn derive_key(master_password: &SecureString, salt: &[u8]) -> SecretsResult<Zeroizing<[u8; KEY_SIZE]>> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    Argon2::default()
        .hash_password_into(master_password.as_bytes(), salt, key.as_mut())
        .map_err(|e| SecretsError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

impl PasswordRepository {
    /// Create an empty repository with a fresh random salt
    pub fn new(master_password: &SecureString) -> SecretsResult<Self> {
        let mut salt = vec![0u8; SALT_SIZE];
        rand::rng().fill_bytes(&mut salt);
        let key = derive_key(master_password, &salt)?;

        Ok(Self {
            entries: BTreeMap::new(),
            key,
            salt,
        })
    }

    /// Decrypt a repository from disk
    pub fn load_from_file(
        cipher_file: &Path,
        salt_file: &Path,
        master_password: &SecureString,
    ) -> SecretsResult<Self> {
        let location = cipher_file.display().to_string();
        let result = Self::load_inner(cipher_file, salt_file, master_password);
        match &result {
            Ok(repo) => {
                audit(RepositoryAccess::Unlock, &location, None, None);
                debug!("Unlocked password repository with {} entries", repo.len());
            }
            Err(e) => audit(RepositoryAccess::Unlock, &location, None, Some(e)),
        }
        result
    }

    fn load_inner(
        cipher_file: &Path,
        salt_file: &Path,
        master_password: &SecureString,
    ) -> SecretsResult<Self> {
        let location = cipher_file.display().to_string();
        let salt = fs::read(salt_file)?;
        if salt.len() < 8 {
            return Err(SecretsError::corrupt(
                salt_file.display().to_string(),
                format!("salt is {} bytes", salt.len()),
            ));
        }

        let data = fs::read(cipher_file)?;
        if data.len() < MAGIC.len() + NONCE_SIZE || !data.starts_with(MAGIC) {
            return Err(SecretsError::corrupt(&location, "missing repository header"));
        }

        let key = derive_key(master_password, &salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_ref()));
        let (nonce_bytes, ciphertext) = data[MAGIC.len()..].split_at(NONCE_SIZE);

        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| SecretsError::WrongMasterPassword {
                path: location.clone(),
            })?;

        let map: BTreeMap<String, String> = serde_json::from_slice(&plaintext)
            .map_err(|e| SecretsError::corrupt(&location, e.to_string()))?;

        Ok(Self {
            entries: map.into_iter().map(|(k, v)| (k, SecureString::new(v))).collect(),
            key,
            salt,
        })
    }

    /// Look up a secret
    pub fn get_value(&self, key: &str) -> SecretsResult<&SecureString> {
        self.entries.get(key).ok_or_else(|| SecretsError::KeyNotFound {
            key: key.to_string(),
        })
    }

    /// Whether `key` holds a value; `password set` reports added or updated from it
    pub fn has_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace a secret
    pub fn update_key(&mut self, key: &str, value: impl Into<SecureString>) {
        self.entries.insert(key.to_string(), value.into());
        audit(RepositoryAccess::Store, "memory", Some(key), None);
    }

    /// Key names in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encrypt and write the repository and its salt
    pub fn save_to_file(&self, cipher_file: &Path, salt_file: &Path) -> SecretsResult<()> {
        let plain: BTreeMap<&str, &str> = self
            .entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let plaintext = Zeroizing::new(serde_json::to_vec(&plain)?);

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(self.key.as_ref()));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
            .map_err(|e| SecretsError::Encryption(e.to_string()))?;

        let mut blob = Vec::with_capacity(MAGIC.len() + NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(MAGIC);
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);

        write_atomic(salt_file, &self.salt, Some(FILE_MODE))?;
        write_atomic(cipher_file, &blob, Some(FILE_MODE))?;

        audit(RepositoryAccess::Save, &cipher_file.display().to_string(), None, None);
        Ok(())
    }
}
