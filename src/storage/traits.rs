//! Storage traits and error types
//!
//! This module defines the trait interface for item stores and the error type
//! shared by the snapshot store and the run ledger.

use crate::storage::{HarvestedItem, ItemIdentity};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to persist {path}: {message}")]
    Persist { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result of merging one item into a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The identity was new and the item was added
    Inserted,
    /// The identity already existed; the stored item was left untouched
    Skipped,
    /// The identity already existed and the item was overwritten (forced merge)
    Replaced,
}

/// Identity-indexed, insertion-ordered store of harvested items
///
/// A store has a single writer: the orchestrator of one source run owns it.
pub trait ItemStore: Send {
    /// Returns true if an item with this identity is stored
    fn exists(&self, identity: &ItemIdentity) -> bool;

    /// Adds the item unless its identity is already present
    fn merge(&mut self, item: HarvestedItem) -> MergeOutcome;

    /// Adds or overwrites the item
    ///
    /// An overwritten item keeps its original position and `scraped_at`.
    fn merge_forced(&mut self, item: HarvestedItem) -> MergeOutcome;

    /// Removes items whose body text is shorter than `min_chars` and that have
    /// no searchable attachment text
    ///
    /// # Returns
    ///
    /// The number of removed items
    fn clean(&mut self, min_chars: usize) -> usize;

    /// Looks up a stored item
    fn get(&self, identity: &ItemIdentity) -> Option<&HarvestedItem>;

    /// Stored items in insertion order
    fn items(&self) -> Vec<&HarvestedItem>;

    /// Number of stored items
    fn len(&self) -> usize;

    /// Returns true if the store holds no items
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persists the store; readers never observe a partially written snapshot
    fn save(&mut self) -> StorageResult<()>;
}
