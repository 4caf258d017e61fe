//! Storage module for persisting harvest results
//!
//! This module handles:
//! - The per-source JSON snapshot of harvested items (authoritative output)
//! - Item identities and the dedup interface used during a run
//! - The SQLite run ledger recording one row per source run

mod identity;
mod schema;
mod snapshot;
mod sqlite;
mod traits;

pub use identity::ItemIdentity;
pub use snapshot::{write_atomic, SnapshotStore};
pub use sqlite::RunLedger;
pub use traits::{ItemStore, MergeOutcome, StorageError, StorageResult};

use crate::extract::{ExtractionError, MediaKind, Table};
use crate::state::StopReason;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One harvested publication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestedItem {
    pub identity: ItemIdentity,
    pub title: String,
    #[serde(default)]
    pub published_date: Option<NaiveDate>,
    /// Set when the item is first harvested; never changes afterwards
    pub scraped_at: DateTime<Utc>,
    pub body_text: String,
    #[serde(default)]
    pub related_links: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentExtract>,
    /// URL of the item page the content was extracted from
    pub source_page: String,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl HarvestedItem {
    /// Body text length in characters
    pub fn content_length(&self) -> usize {
        self.body_text.chars().count()
    }

    /// Returns true if at least one attachment produced text
    pub fn has_searchable_attachment(&self) -> bool {
        self.attachments.iter().any(AttachmentExtract::is_searchable)
    }
}

/// Text and tables extracted from one attached document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentExtract {
    pub source_url: String,
    pub media_kind: MediaKind,
    pub text: String,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub extraction_error: Option<ExtractionError>,
}

impl AttachmentExtract {
    /// Record of an attachment that could not be turned into text
    pub fn failed(source_url: &str, media_kind: MediaKind, error: ExtractionError) -> Self {
        Self {
            source_url: source_url.to_string(),
            media_kind,
            text: String::new(),
            tables: Vec::new(),
            extraction_error: Some(error),
        }
    }

    pub fn is_searchable(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Represents one source run in the ledger
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub source: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub mode: String,
    pub status: RunStatus,
    pub pages_fetched: u64,
    pub items_discovered: u64,
    pub items_new: u64,
    pub items_skipped_duplicate: u64,
    pub items_failed: u64,
    pub attachments_failed: u64,
    pub warnings: u64,
    pub stop_reason: Option<StopReason>,
}

/// Status of a source run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
