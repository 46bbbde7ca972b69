//! Wallet persistence layer
//!
//! Two append/delete stores back the escrow wallet: the watched-script log
//! (append-only) and the pending-transaction table (keyed by tx hash). Both
//! have an in-memory implementation and a JSON-file implementation.

use crate::core::{PendingTxn, TxHash};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Append-only log of watched-script entries
pub trait WatchedScriptStore: Send + Sync {
    /// Append one raw entry
    fn put_script(&self, entry: &[u8]) -> Result<(), StorageError>;

    /// Every entry in append order
    fn scripts(&self) -> Result<Vec<Vec<u8>>, StorageError>;

    /// Number of entries appended so far
    fn script_count(&self) -> Result<usize, StorageError>;
}

/// Pending escrow transactions awaiting a successful receipt
pub trait PendingTxnStore: Send + Sync {
    /// Insert or replace the record for `txn.tx_id`
    fn put_pending(&self, txn: &PendingTxn) -> Result<(), StorageError>;

    fn pending(&self) -> Result<Vec<PendingTxn>, StorageError>;

    /// Remove a record; returns whether anything was removed
    fn delete_pending(&self, tx_id: &TxHash) -> Result<bool, StorageError>;
}

/// Full wallet datastore
pub trait Datastore: WatchedScriptStore + PendingTxnStore {}

impl<T: WatchedScriptStore + PendingTxnStore> Datastore for T {}

// =============================================================================
// In-memory store
// =============================================================================

/// Process-local store, used by tests and offline tooling
#[derive(Debug, Default)]
pub struct MemoryStore {
    scripts: Mutex<Vec<Vec<u8>>>,
    pending: Mutex<BTreeMap<TxHash, PendingTxn>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WatchedScriptStore for MemoryStore {
    fn put_script(&self, entry: &[u8]) -> Result<(), StorageError> {
        let mut scripts = self.scripts.lock().map_err(|_| StorageError::Poisoned)?;
        scripts.push(entry.to_vec());
        Ok(())
    }

    fn scripts(&self) -> Result<Vec<Vec<u8>>, StorageError> {
        let scripts = self.scripts.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(scripts.clone())
    }

    fn script_count(&self) -> Result<usize, StorageError> {
        let scripts = self.scripts.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(scripts.len())
    }
}

impl PendingTxnStore for MemoryStore {
    fn put_pending(&self, txn: &PendingTxn) -> Result<(), StorageError> {
        let mut pending = self.pending.lock().map_err(|_| StorageError::Poisoned)?;
        pending.insert(txn.tx_id, txn.clone());
        Ok(())
    }

    fn pending(&self) -> Result<Vec<PendingTxn>, StorageError> {
        let pending = self.pending.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(pending.values().cloned().collect())
    }

    fn delete_pending(&self, tx_id: &TxHash) -> Result<bool, StorageError> {
        let mut pending = self.pending.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(pending.remove(tx_id).is_some())
    }
}

// =============================================================================
// JSON file store
// =============================================================================

/// Watched scripts file (JSON array of hex entries)
pub const WATCHED_SCRIPTS_FILE: &str = "watched_scripts.json";

/// Pending transactions file (JSON object keyed by tx hash)
pub const PENDING_TXNS_FILE: &str = "pending_txns.json";

/// JSON-file store rooted at a data directory
///
/// Every mutation rewrites the whole file through a temporary file and an
/// atomic rename.
#[derive(Debug)]
pub struct JsonFileStore {
    data_dir: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (creating if needed) a store in `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        Ok(Self {
            data_dir,
            lock: Mutex::new(()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn scripts_path(&self) -> PathBuf {
        self.data_dir.join(WATCHED_SCRIPTS_FILE)
    }

    fn pending_path(&self) -> PathBuf {
        self.data_dir.join(PENDING_TXNS_FILE)
    }

    fn read_scripts(&self) -> Result<Vec<String>, StorageError> {
        read_json_or_default(&self.scripts_path())
    }

    fn read_pending(&self) -> Result<BTreeMap<String, PendingTxn>, StorageError> {
        read_json_or_default(&self.pending_path())
    }
}

fn read_json_or_default<T>(path: &Path) -> Result<T, StorageError>
where
    T: serde::de::DeserializeOwned + Default,
{
    if !path.exists() {
        return Ok(T::default());
    }
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let temp_path = path.with_extension("tmp");
    {
        let file = fs::File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}

impl WatchedScriptStore for JsonFileStore {
    fn put_script(&self, entry: &[u8]) -> Result<(), StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut scripts = self.read_scripts()?;
        scripts.push(hex::encode(entry));
        write_json_atomic(&self.scripts_path(), &scripts)
    }

    fn scripts(&self) -> Result<Vec<Vec<u8>>, StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        self.read_scripts()?
            .iter()
            .map(|s| {
                hex::decode(s).map_err(|e| {
                    StorageError::InvalidData(format!("watched script entry: {}", e))
                })
            })
            .collect()
    }

    fn script_count(&self) -> Result<usize, StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(self.read_scripts()?.len())
    }
}

impl PendingTxnStore for JsonFileStore {
    fn put_pending(&self, txn: &PendingTxn) -> Result<(), StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut pending = self.read_pending()?;
        pending.insert(txn.tx_id.to_hex(), txn.clone());
        write_json_atomic(&self.pending_path(), &pending)
    }

    fn pending(&self) -> Result<Vec<PendingTxn>, StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(self.read_pending()?.into_values().collect())
    }

    fn delete_pending(&self, tx_id: &TxHash) -> Result<bool, StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut pending = self.read_pending()?;
        if pending.remove(&tx_id.to_hex()).is_none() {
            return Ok(false);
        }
        write_json_atomic(&self.pending_path(), &pending)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Address;
    use chrono::Utc;

    fn pending(byte: u8) -> PendingTxn {
        PendingTxn {
            tx_id: TxHash::new([byte; 32]),
            order_id: format!("order-{}", byte),
            amount: 1_000 + byte as u64,
            nonce: byte as u64,
            from: Address::new([0x01; 20]),
            to: Address::new([0x02; 20]),
            created_at: Utc::now(),
        }
    }

    fn exercise_pending(store: &dyn PendingTxnStore) {
        assert!(store.pending().unwrap().is_empty());

        store.put_pending(&pending(1)).unwrap();
        store.put_pending(&pending(2)).unwrap();
        // Same key replaces
        store.put_pending(&pending(2)).unwrap();
        assert_eq!(store.pending().unwrap().len(), 2);

        assert!(store.delete_pending(&TxHash::new([1; 32])).unwrap());
        assert!(!store.delete_pending(&TxHash::new([1; 32])).unwrap());

        let remaining = store.pending().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].order_id, "order-2");
    }

    #[test]
    fn test_memory_store_scripts() {
        let store = MemoryStore::new();
        store.put_script(&[1, 2, 3]).unwrap();
        store.put_script(&[1, 2, 3]).unwrap();
        assert_eq!(store.scripts().unwrap(), vec![vec![1, 2, 3], vec![1, 2, 3]]);
        assert_eq!(store.script_count().unwrap(), 2);
    }

    #[test]
    fn test_memory_store_pending() {
        exercise_pending(&MemoryStore::new());
    }

    #[test]
    fn test_file_store_pending() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(temp_dir.path()).unwrap();
        exercise_pending(&store);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let record = pending(7);
        {
            let store = JsonFileStore::new(temp_dir.path()).unwrap();
            store.put_script(&[0xab; 8]).unwrap();
            store.put_pending(&record).unwrap();
        }

        let reopened = JsonFileStore::new(temp_dir.path()).unwrap();
        assert_eq!(reopened.scripts().unwrap(), vec![vec![0xab; 8]]);
        assert_eq!(reopened.script_count().unwrap(), 1);
        let records = reopened.pending().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], record);
        assert!(temp_dir.path().join(PENDING_TXNS_FILE).exists());
    }

    #[test]
    fn test_atomic_write_leaves_complete_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("records.json");
        let records: Vec<String> = (0..2000).map(|i| format!("entry-{:05}", i)).collect();

        write_json_atomic(&path, &records).unwrap();

        assert!(!path.with_extension("tmp").exists());
        let read: Vec<String> = read_json_or_default(&path).unwrap();
        assert_eq!(read, records);
    }

    #[test]
    fn test_file_store_rejects_corrupt_entries() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join(WATCHED_SCRIPTS_FILE), r#"["zz"]"#).unwrap();
        let store = JsonFileStore::new(temp_dir.path()).unwrap();
        assert!(matches!(
            store.scripts(),
            Err(StorageError::InvalidData(_))
        ));
    }
}
