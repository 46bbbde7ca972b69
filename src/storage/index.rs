//! Watched-script index
//!
//! Maps escrow addresses to the serialized redeem script that produced them.
//! The backing store is an append-only log of `address || script` entries;
//! the index keeps a `HashMap` view of it. A lookup miss rescans the log only
//! when its entry count differs from what was indexed, so entries appended
//! through another handle are found without rereading an unchanged log.

use crate::core::{Address, ADDRESS_LENGTH};
use crate::storage::persistence::{StorageError, WatchedScriptStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// Encode a watched-script log entry
pub fn encode_entry(address: &Address, script: &[u8]) -> Vec<u8> {
    let mut entry = Vec::with_capacity(ADDRESS_LENGTH + script.len());
    entry.extend_from_slice(address.as_bytes());
    entry.extend_from_slice(script);
    entry
}

/// Split a log entry into its address and script; `None` when too short
pub fn split_entry(entry: &[u8]) -> Option<(Address, &[u8])> {
    if entry.len() < ADDRESS_LENGTH {
        return None;
    }
    let address = Address::from_slice(&entry[..ADDRESS_LENGTH]).ok()?;
    Some((address, &entry[ADDRESS_LENGTH..]))
}

/// Indexed view over a watched-script store
pub struct WatchedScriptIndex {
    store: Arc<dyn WatchedScriptStore>,
    by_address: RwLock<HashMap<Address, Vec<u8>>>,
    /// Log entries covered by `by_address`
    indexed: AtomicUsize,
}

impl WatchedScriptIndex {
    /// Build the index from everything currently in `store`
    pub fn load(store: Arc<dyn WatchedScriptStore>) -> Result<Self, StorageError> {
        let index = Self {
            store,
            by_address: RwLock::new(HashMap::new()),
            indexed: AtomicUsize::new(0),
        };
        index.rebuild()?;
        Ok(index)
    }

    /// Rescan the backing log, keeping the first entry per address
    pub fn rebuild(&self) -> Result<(), StorageError> {
        let entries = self.store.scripts()?;

        let mut map = HashMap::with_capacity(entries.len());
        let mut skipped = 0usize;
        for entry in &entries {
            match split_entry(entry) {
                Some((address, script)) => {
                    map.entry(address).or_insert_with(|| script.to_vec());
                }
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            log::warn!("Skipped {} truncated watched-script entries", skipped);
        }

        let mut by_address = self.by_address.write().map_err(|_| StorageError::Poisoned)?;
        *by_address = map;
        self.indexed.store(entries.len(), Ordering::SeqCst);
        Ok(())
    }

    /// Append a script to the store and index it
    ///
    /// No dedup check is made; for a repeated address the first entry keeps
    /// winning lookups.
    pub fn put(&self, address: Address, script: &[u8]) -> Result<(), StorageError> {
        self.store.put_script(&encode_entry(&address, script))?;
        let mut by_address = self.by_address.write().map_err(|_| StorageError::Poisoned)?;
        by_address.entry(address).or_insert_with(|| script.to_vec());
        self.indexed.fetch_add(1, Ordering::SeqCst);
        log::debug!("Watching escrow address {}", address);
        Ok(())
    }

    /// Serialized script for `candidate`, if it is a watched escrow address
    pub fn resolve(&self, candidate: &Address) -> Result<Option<Vec<u8>>, StorageError> {
        if let Some(script) = self.lookup(candidate)? {
            return Ok(Some(script));
        }
        if self.store.script_count()? == self.indexed.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.rebuild()?;
        self.lookup(candidate)
    }

    fn lookup(&self, candidate: &Address) -> Result<Option<Vec<u8>>, StorageError> {
        let by_address = self.by_address.read().map_err(|_| StorageError::Poisoned)?;
        Ok(by_address.get(candidate).cloned())
    }

    /// Number of distinct watched addresses
    pub fn len(&self) -> Result<usize, StorageError> {
        let by_address = self.by_address.read().map_err(|_| StorageError::Poisoned)?;
        Ok(by_address.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::persistence::MemoryStore;

    fn addr(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    #[test]
    fn test_entry_encoding() {
        let entry = encode_entry(&addr(0xaa), &[1, 2, 3]);
        assert_eq!(entry.len(), 23);
        let (address, script) = split_entry(&entry).unwrap();
        assert_eq!(address, addr(0xaa));
        assert_eq!(script, &[1, 2, 3]);
        assert!(split_entry(&[0u8; 5]).is_none());
    }

    #[test]
    fn test_put_and_resolve() {
        let index = WatchedScriptIndex::load(Arc::new(MemoryStore::new())).unwrap();
        assert!(index.is_empty().unwrap());

        index.put(addr(1), &[0x10; 4]).unwrap();
        assert_eq!(index.resolve(&addr(1)).unwrap(), Some(vec![0x10; 4]));
        assert_eq!(index.resolve(&addr(2)).unwrap(), None);
    }

    #[test]
    fn test_first_entry_wins() {
        let store = Arc::new(MemoryStore::new());
        let index = WatchedScriptIndex::load(store.clone()).unwrap();
        index.put(addr(1), &[0x01]).unwrap();
        index.put(addr(1), &[0x02]).unwrap();

        assert_eq!(store.scripts().unwrap().len(), 2);
        assert_eq!(index.len().unwrap(), 1);
        assert_eq!(index.resolve(&addr(1)).unwrap(), Some(vec![0x01]));

        let reloaded = WatchedScriptIndex::load(store).unwrap();
        assert_eq!(reloaded.resolve(&addr(1)).unwrap(), Some(vec![0x01]));
    }

    #[test]
    fn test_miss_rescans_store() {
        let store = Arc::new(MemoryStore::new());
        let index = WatchedScriptIndex::load(store.clone()).unwrap();

        // Appended by another handle after the index was built
        store.put_script(&encode_entry(&addr(9), &[0x99; 3])).unwrap();
        assert_eq!(index.resolve(&addr(9)).unwrap(), Some(vec![0x99; 3]));
    }

    /// Memory store that counts full scans
    #[derive(Default)]
    struct ScanCountingStore {
        inner: MemoryStore,
        scans: AtomicUsize,
    }

    impl WatchedScriptStore for ScanCountingStore {
        fn put_script(&self, entry: &[u8]) -> Result<(), StorageError> {
            self.inner.put_script(entry)
        }

        fn scripts(&self) -> Result<Vec<Vec<u8>>, StorageError> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            self.inner.scripts()
        }

        fn script_count(&self) -> Result<usize, StorageError> {
            self.inner.script_count()
        }
    }

    #[test]
    fn test_miss_on_unchanged_store_skips_rescan() {
        let store = Arc::new(ScanCountingStore::default());
        let index = WatchedScriptIndex::load(store.clone()).unwrap();
        index.put(addr(1), &[0x01]).unwrap();
        assert_eq!(store.scans.load(Ordering::SeqCst), 1);

        for _ in 0..10 {
            assert_eq!(index.resolve(&addr(2)).unwrap(), None);
        }
        assert_eq!(store.scans.load(Ordering::SeqCst), 1);

        store.inner.put_script(&encode_entry(&addr(2), &[0x02])).unwrap();
        assert_eq!(index.resolve(&addr(2)).unwrap(), Some(vec![0x02]));
        assert_eq!(store.scans.load(Ordering::SeqCst), 2);
    }
}
