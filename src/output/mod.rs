//! Output module for run summaries and snapshot exports
//!
//! This module handles:
//! - The per-run summary printed after each source
//! - CSV export of a snapshot
//! - The data quality report
//! - Run history statistics from the ledger

mod csv_export;
mod quality;
pub mod stats;
mod summary;

pub use csv_export::{export_csv, CSV_COLUMNS};
pub use quality::QualityReport;
pub use stats::{load_statistics, print_statistics, HarvestStatistics, SourceStatistics};
pub use summary::RunSummary;
