//! Per-run summary of one source

use crate::state::StopReason;
use serde::Serialize;
use tracing::warn;

/// Counters and warnings collected while harvesting one source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub source: String,
    /// `full` or `incremental`
    pub mode: String,
    pub pages_fetched: u64,
    /// Item cards found on the listing pages
    pub items_discovered: u64,
    pub items_new: u64,
    pub items_skipped_duplicate: u64,
    /// Fresh items that could not be fetched or extracted
    pub items_failed: u64,
    pub attachments_failed: u64,
    pub stop_reason: Option<StopReason>,
    pub warnings: Vec<String>,
}

impl RunSummary {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Self::default()
        }
    }

    /// Logs a warning and keeps it for the summary
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(source = %self.source, "{}", message);
        self.warnings.push(message);
    }

    /// Prints the summary to stdout
    pub fn print_summary(&self) {
        println!("=== {} ({}) ===", self.source, self.mode);
        println!("  Pages fetched:        {}", self.pages_fetched);
        println!("  Items discovered:     {}", self.items_discovered);
        println!("  New items:            {}", self.items_new);
        println!("  Duplicates skipped:   {}", self.items_skipped_duplicate);
        println!("  Failed items:         {}", self.items_failed);
        println!("  Failed attachments:   {}", self.attachments_failed);
        match self.stop_reason {
            Some(reason) => println!("  Stopped because:      {}", reason),
            None => println!("  Stopped because:      -"),
        }

        if !self.warnings.is_empty() {
            println!("  Warnings ({}):", self.warnings.len());
            for warning in &self.warnings {
                println!("    - {}", warning);
            }
        }
        println!();
    }
}
