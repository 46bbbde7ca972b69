//! Storage module for wallet persistence

pub mod index;
pub mod persistence;

pub use index::WatchedScriptIndex;
pub use persistence::{
    Datastore, JsonFileStore, MemoryStore, PendingTxnStore, StorageError, WatchedScriptStore,
    PENDING_TXNS_FILE, WATCHED_SCRIPTS_FILE,
};
