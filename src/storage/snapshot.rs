//! JSON snapshot store
//!
//! The snapshot is an ordered JSON array of harvested items, loaded fully at run
//! start and rewritten atomically (temp file in the same directory, then rename).

use crate::storage::traits::{ItemStore, MergeOutcome, StorageError, StorageResult};
use crate::storage::{HarvestedItem, ItemIdentity};
use chrono::Utc;
use indexmap::IndexMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Item store backed by a JSON snapshot file
#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    items: IndexMap<ItemIdentity, HarvestedItem>,
    quarantined: Option<PathBuf>,
}

impl SnapshotStore {
    /// Opens the snapshot at `path`, starting empty when it does not exist
    ///
    /// A snapshot that cannot be parsed is renamed to
    /// `<file name>.corrupt-<timestamp>` and the store starts empty.
    ///
    /// # Arguments
    ///
    /// * `path` - Snapshot file location
    ///
    /// # Returns
    ///
    /// * `Ok(SnapshotStore)` - Loaded (or fresh) store
    /// * `Err(StorageError)` - The file exists but could not be read or moved aside
    pub fn open(path: &Path) -> StorageResult<Self> {
        let mut store = Self {
            path: path.to_path_buf(),
            items: IndexMap::new(),
            quarantined: None,
        };

        if !path.exists() {
            debug!("No snapshot at {}, starting empty", path.display());
            return Ok(store);
        }

        let bytes = fs::read(path)?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(store);
        }

        match serde_json::from_slice::<Vec<HarvestedItem>>(&bytes) {
            Ok(items) => {
                for item in items {
                    store.items.entry(item.identity.clone()).or_insert(item);
                }
                info!(
                    "Loaded {} items from {}",
                    store.items.len(),
                    path.display()
                );
            }
            Err(e) => {
                let aside = quarantine(path)?;
                warn!(
                    "Snapshot {} is corrupt ({}); moved to {} and starting empty",
                    path.display(),
                    e,
                    aside.display()
                );
                store.quarantined = Some(aside);
            }
        }

        Ok(store)
    }

    /// Location of the snapshot file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where a corrupt snapshot was moved to when this store was opened
    pub fn quarantined(&self) -> Option<&Path> {
        self.quarantined.as_deref()
    }
}

impl ItemStore for SnapshotStore {
    fn exists(&self, identity: &ItemIdentity) -> bool {
        self.items.contains_key(identity)
    }

    fn merge(&mut self, item: HarvestedItem) -> MergeOutcome {
        if self.items.contains_key(&item.identity) {
            return MergeOutcome::Skipped;
        }
        self.items.insert(item.identity.clone(), item);
        MergeOutcome::Inserted
    }

    fn merge_forced(&mut self, mut item: HarvestedItem) -> MergeOutcome {
        match self.items.get_mut(&item.identity) {
            Some(existing) => {
                item.scraped_at = existing.scraped_at;
                *existing = item;
                MergeOutcome::Replaced
            }
            None => {
                self.items.insert(item.identity.clone(), item);
                MergeOutcome::Inserted
            }
        }
    }

    fn clean(&mut self, min_chars: usize) -> usize {
        let before = self.items.len();
        self.items.retain(|_, item| {
            item.content_length() >= min_chars || item.has_searchable_attachment()
        });
        before - self.items.len()
    }

    fn get(&self, identity: &ItemIdentity) -> Option<&HarvestedItem> {
        self.items.get(identity)
    }

    fn items(&self) -> Vec<&HarvestedItem> {
        self.items.values().collect()
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn save(&mut self) -> StorageResult<()> {
        let items: Vec<&HarvestedItem> = self.items.values().collect();
        let json = serde_json::to_vec_pretty(&items)?;
        write_atomic(&self.path, &json)?;
        debug!("Saved {} items to {}", items.len(), self.path.display());
        Ok(())
    }
}

/// Atomically replaces `path` with `content`
///
/// The content is written to a temporary file in the same directory, synced,
/// and renamed over the target, so readers see either the old or the new file.
pub fn write_atomic(path: &Path, content: &[u8]) -> StorageResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;

    tmp.persist(path).map_err(|e| StorageError::Persist {
        path: path.display().to_string(),
        message: e.error.to_string(),
    })?;
    Ok(())
}

/// Moves an unreadable snapshot out of the way
fn quarantine(path: &Path) -> StorageResult<PathBuf> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot".to_string());
    let aside = path.with_file_name(format!(
        "{}.corrupt-{}",
        file_name,
        Utc::now().format("%Y%m%dT%H%M%S")
    ));
    fs::rename(path, &aside)?;
    Ok(aside)
}
