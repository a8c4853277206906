//! Opaque key-value persistence for wallet identity.
//!
//! The session stores two entries, [`MNEMONIC_KEY`] and [`ADDRESS_KEY`].
//! [`EncryptedFileStore`] keeps one encrypted file per key under a data
//! directory; [`MemoryStore`] keeps everything in memory for tests and
//! ephemeral sessions.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::encryption;
use crate::error::WalletError;

/// Store key holding the mnemonic phrase.
pub const MNEMONIC_KEY: &str = "mnemonic";

/// Store key holding the wallet address.
pub const ADDRESS_KEY: &str = "address";

/// Magic bytes identifying a satchel store file.
pub const STORE_MAGIC: &[u8; 4] = b"STCH";

/// Current store file format version.
pub const STORE_VERSION: u32 = 1;

/// File extension for store entries.
const ENTRY_EXTENSION: &str = "satchel";

/// Byte-oriented key-value persistence.
pub trait KeyValueStore: Send + Sync {
    /// Read an entry; `None` if absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, WalletError>;

    /// Create or replace an entry.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), WalletError>;

    /// Remove an entry. Removing an absent entry is not an error.
    fn delete(&self, key: &str) -> Result<(), WalletError>;
}

/// In-memory store.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Zeroizing<Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, WalletError> {
        Ok(self.entries.lock().get(key).map(|v| v.to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), WalletError> {
        self.entries
            .lock()
            .insert(key.to_string(), Zeroizing::new(value.to_vec()));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), WalletError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entries", &self.len())
            .finish()
    }
}

/// Entry file header serialized as JSON.
#[derive(Serialize, Deserialize)]
struct EntryHeader {
    magic: String,
    version: u32,
    key: String,
}

/// One AES-256-GCM encrypted file per key.
///
/// # File format
/// ```text
/// header_len (4 bytes LE) || header_json || encrypted_payload
/// ```
/// The header is unencrypted JSON containing magic, version and the entry
/// key. The payload is the value encrypted with [`encryption::encrypt`].
pub struct EncryptedFileStore {
    dir: PathBuf,
    password: Zeroizing<Vec<u8>>,
}

impl EncryptedFileStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>, password: &[u8]) -> Result<Self, WalletError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            WalletError::StorageFailure(format!("create {}: {e}", dir.display()))
        })?;
        Ok(Self {
            dir,
            password: Zeroizing::new(password.to_vec()),
        })
    }

    /// Directory holding the entry files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf, WalletError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(WalletError::StorageFailure(format!(
                "invalid store key: {key:?}"
            )));
        }
        Ok(self.dir.join(format!("{key}.{ENTRY_EXTENSION}")))
    }
}

impl KeyValueStore for EncryptedFileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, WalletError> {
        let path = self.entry_path(key)?;
        let file_data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(WalletError::StorageFailure(format!(
                    "read {}: {e}",
                    path.display()
                )));
            }
        };

        if file_data.len() < 4 {
            return Err(WalletError::CorruptedData("file too short".into()));
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&file_data[..4]);
        let header_len = u32::from_le_bytes(len_bytes) as usize;
        if file_data.len() < 4 + header_len {
            return Err(WalletError::CorruptedData("header truncated".into()));
        }

        let header: EntryHeader = serde_json::from_slice(&file_data[4..4 + header_len])
            .map_err(|e| WalletError::CorruptedData(format!("invalid header: {e}")))?;
        if header.magic.as_bytes() != STORE_MAGIC {
            return Err(WalletError::CorruptedData("invalid magic bytes".into()));
        }
        if header.version != STORE_VERSION {
            return Err(WalletError::CorruptedData(format!(
                "unsupported version: {}",
                header.version
            )));
        }
        if header.key != key {
            return Err(WalletError::CorruptedData(format!(
                "entry holds {:?}, expected {key:?}",
                header.key
            )));
        }

        let value = encryption::decrypt(&file_data[4 + header_len..], &self.password)?;
        Ok(Some(value))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), WalletError> {
        let path = self.entry_path(key)?;
        let header = EntryHeader {
            magic: String::from_utf8_lossy(STORE_MAGIC).to_string(),
            version: STORE_VERSION,
            key: key.to_string(),
        };
        let header_json = serde_json::to_vec(&header)
            .map_err(|e| WalletError::StorageFailure(e.to_string()))?;
        let encrypted = encryption::encrypt(value, &self.password)?;

        let header_len = header_json.len() as u32;
        let mut file_data = Vec::with_capacity(4 + header_json.len() + encrypted.len());
        file_data.extend_from_slice(&header_len.to_le_bytes());
        file_data.extend_from_slice(&header_json);
        file_data.extend_from_slice(&encrypted);

        // Write-then-rename so a crash never leaves a half-written entry.
        let tmp = path.with_extension(format!("{ENTRY_EXTENSION}.tmp"));
        fs::write(&tmp, &file_data)
            .map_err(|e| WalletError::StorageFailure(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &path)
            .map_err(|e| WalletError::StorageFailure(format!("rename {}: {e}", path.display())))
    }

    fn delete(&self, key: &str) -> Result<(), WalletError> {
        let path = self.entry_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WalletError::StorageFailure(format!(
                "remove {}: {e}",
                path.display()
            ))),
        }
    }
}

impl std::fmt::Debug for EncryptedFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedFileStore")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_crud() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get(ADDRESS_KEY).unwrap(), None);

        store.set(ADDRESS_KEY, b"tb1qexample").unwrap();
        assert_eq!(store.get(ADDRESS_KEY).unwrap(), Some(b"tb1qexample".to_vec()));

        store.set(ADDRESS_KEY, b"replaced").unwrap();
        assert_eq!(store.get(ADDRESS_KEY).unwrap(), Some(b"replaced".to_vec()));
        assert_eq!(store.len(), 1);

        store.delete(ADDRESS_KEY).unwrap();
        assert_eq!(store.get(ADDRESS_KEY).unwrap(), None);
        store.delete(ADDRESS_KEY).unwrap();
    }

    #[test]
    fn file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncryptedFileStore::open(dir.path(), b"password").unwrap();

        assert_eq!(store.get(MNEMONIC_KEY).unwrap(), None);
        store.set(MNEMONIC_KEY, b"abandon abandon about").unwrap();
        assert_eq!(
            store.get(MNEMONIC_KEY).unwrap(),
            Some(b"abandon abandon about".to_vec())
        );

        let raw = fs::read(dir.path().join("mnemonic.satchel")).unwrap();
        assert!(!raw.windows(7).any(|w| w == b"abandon"));

        store.delete(MNEMONIC_KEY).unwrap();
        assert_eq!(store.get(MNEMONIC_KEY).unwrap(), None);
    }

    #[test]
    fn file_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        EncryptedFileStore::open(dir.path(), b"pw")
            .unwrap()
            .set(ADDRESS_KEY, b"tb1q")
            .unwrap();
        let reopened = EncryptedFileStore::open(dir.path(), b"pw").unwrap();
        assert_eq!(reopened.get(ADDRESS_KEY).unwrap(), Some(b"tb1q".to_vec()));
    }

    #[test]
    fn file_store_wrong_password() {
        let dir = tempfile::tempdir().unwrap();
        EncryptedFileStore::open(dir.path(), b"right")
            .unwrap()
            .set(MNEMONIC_KEY, b"secret")
            .unwrap();
        let wrong = EncryptedFileStore::open(dir.path(), b"wrong").unwrap();
        assert_eq!(wrong.get(MNEMONIC_KEY).unwrap_err(), WalletError::InvalidPassword);
    }

    #[test]
    fn file_store_rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncryptedFileStore::open(dir.path(), b"pw").unwrap();
        store.set(ADDRESS_KEY, b"x").unwrap();

        let path = dir.path().join("address.satchel");
        let mut raw = fs::read(&path).unwrap();
        let pos = raw.windows(4).position(|w| w == STORE_MAGIC).unwrap();
        raw[pos] = b'X';
        fs::write(&path, raw).unwrap();

        let err = store.get(ADDRESS_KEY).unwrap_err();
        assert!(matches!(err, WalletError::CorruptedData(_)));
    }

    #[test]
    fn file_store_rejects_swapped_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncryptedFileStore::open(dir.path(), b"pw").unwrap();
        store.set(ADDRESS_KEY, b"x").unwrap();
        fs::copy(
            dir.path().join("address.satchel"),
            dir.path().join("mnemonic.satchel"),
        )
        .unwrap();
        let err = store.get(MNEMONIC_KEY).unwrap_err();
        assert!(matches!(err, WalletError::CorruptedData(_)));
    }

    #[test]
    fn file_store_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncryptedFileStore::open(dir.path(), b"pw").unwrap();
        fs::write(dir.path().join("address.satchel"), [1u8, 0]).unwrap();
        let err = store.get(ADDRESS_KEY).unwrap_err();
        assert!(matches!(err, WalletError::CorruptedData(_)));
    }

    #[test]
    fn file_store_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncryptedFileStore::open(dir.path(), b"pw").unwrap();
        assert!(store.set("../escape", b"x").is_err());
        assert!(store.get("").is_err());
    }
}
