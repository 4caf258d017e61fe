//! Flattened CSV view of a snapshot
//!
//! The JSON snapshot stays authoritative; the CSV is regenerated from it after
//! every run for spreadsheet users.

use crate::storage::{write_atomic, HarvestedItem, StorageError, StorageResult};
use std::path::Path;

/// Column order of the export
pub const CSV_COLUMNS: [&str; 11] = [
    "identity",
    "title",
    "published_date",
    "scraped_at",
    "source_page",
    "content_length",
    "body_text",
    "related_links",
    "images",
    "attachments",
    "extra",
];

/// Separator for list-valued columns
const LIST_SEPARATOR: &str = "; ";

/// Writes `items` to `path` as CSV, replacing any previous export atomically
pub fn export_csv(items: &[&HarvestedItem], path: &Path) -> StorageResult<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let csv_error = |e: csv::Error| StorageError::Persist {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    writer.write_record(CSV_COLUMNS).map_err(csv_error)?;
    for item in items {
        writer.write_record(row(item)?).map_err(csv_error)?;
    }

    let content = writer.into_inner().map_err(|e| StorageError::Persist {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    write_atomic(path, &content)
}

fn row(item: &HarvestedItem) -> StorageResult<[String; 11]> {
    let attachments = item
        .attachments
        .iter()
        .map(|attachment| match &attachment.extraction_error {
            Some(error) => format!("{} ({})", attachment.source_url, error),
            None => attachment.source_url.clone(),
        })
        .collect::<Vec<_>>()
        .join(LIST_SEPARATOR);

    let extra = if item.extra.is_empty() {
        String::new()
    } else {
        serde_json::to_string(&item.extra)?
    };

    Ok([
        item.identity.to_string(),
        item.title.clone(),
        item.published_date
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        item.scraped_at.to_rfc3339(),
        item.source_page.clone(),
        item.content_length().to_string(),
        item.body_text.clone(),
        item.related_links.join(LIST_SEPARATOR),
        item.images.join(LIST_SEPARATOR),
        attachments,
        extra,
    ])
}
