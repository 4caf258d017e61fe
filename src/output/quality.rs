//! Data quality report for a snapshot

use crate::extract::text::is_llm_ready;
use crate::storage::{write_atomic, HarvestedItem, StorageResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// How complete the harvested items of one source are
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub source: String,
    pub generated_at: DateTime<Utc>,
    pub total_items: usize,
    pub items_with_content: usize,
    pub items_with_titles: usize,
    pub items_with_dates: usize,
    pub items_with_related_links: usize,
    pub items_with_attachments: usize,
    pub attachments_failed: usize,
    pub average_content_length: f64,
    /// Items whose body text is long and wordy enough to feed a language model
    pub llm_ready_items: usize,
    /// 0 to 100; the mean of the content, title, date and LLM-readiness ratios
    pub quality_score: f64,
}

impl QualityReport {
    pub fn from_items(source: &str, items: &[&HarvestedItem], min_content_chars: usize) -> Self {
        let total_items = items.len();
        let count = |predicate: &dyn Fn(&HarvestedItem) -> bool| {
            items.iter().filter(|item| predicate(**item)).count()
        };

        let items_with_content = count(&|item| item.content_length() >= min_content_chars);
        let items_with_titles = count(&|item| !item.title.trim().is_empty());
        let items_with_dates = count(&|item| item.published_date.is_some());
        let items_with_related_links = count(&|item| !item.related_links.is_empty());
        let items_with_attachments = count(&|item| !item.attachments.is_empty());
        let llm_ready_items = count(&|item| is_llm_ready(&item.body_text));
        let attachments_failed = items
            .iter()
            .flat_map(|item| &item.attachments)
            .filter(|attachment| attachment.extraction_error.is_some())
            .count();

        let (average_content_length, quality_score) = if total_items == 0 {
            (0.0, 0.0)
        } else {
            let total = total_items as f64;
            let content_chars: usize = items.iter().map(|item| item.content_length()).sum();
            let ratios = [
                items_with_content,
                items_with_titles,
                items_with_dates,
                llm_ready_items,
            ];
            let score = ratios.iter().map(|n| *n as f64 / total).sum::<f64>() / ratios.len() as f64;
            (content_chars as f64 / total, round1(score * 100.0))
        };

        Self {
            source: source.to_string(),
            generated_at: Utc::now(),
            total_items,
            items_with_content,
            items_with_titles,
            items_with_dates,
            items_with_related_links,
            items_with_attachments,
            attachments_failed,
            average_content_length: round1(average_content_length),
            llm_ready_items,
            quality_score,
        }
    }

    pub fn write(&self, path: &Path) -> StorageResult<()> {
        let content = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &content)
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ItemIdentity;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn item(id: &str, title: &str, body: &str, dated: bool) -> HarvestedItem {
        HarvestedItem {
            identity: ItemIdentity::from(id),
            title: title.to_string(),
            published_date: dated.then(|| NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()),
            scraped_at: Utc::now(),
            body_text: body.to_string(),
            related_links: Vec::new(),
            images: Vec::new(),
            attachments: Vec::new(),
            source_page: format!("https://example.com/{}", id),
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn test_empty_snapshot() {
        let report = QualityReport::from_items("atsb", &[], 100);
        assert_eq!(report.total_items, 0);
        assert_eq!(report.quality_score, 0.0);
    }

    #[test]
    fn test_scores() {
        let long = "Prudential standards require authorised deposit institutions to maintain capital ".repeat(3);
        let complete = item("a", "Complete", &long, true);
        let bare = item("b", "", "short", false);
        let report = QualityReport::from_items("atsb", &[&complete, &bare], 100);

        assert_eq!(report.items_with_content, 1);
        assert_eq!(report.items_with_titles, 1);
        assert_eq!(report.items_with_dates, 1);
        assert_eq!(report.llm_ready_items, 1);
        assert_eq!(report.quality_score, 50.0);
    }

    #[test]
    fn test_write_report() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("atsb_quality_report.json");
        let complete = item("a", "Complete", "text", true);
        QualityReport::from_items("atsb", &[&complete], 100)
            .write(&path)
            .unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["total_items"], 1);
        assert_eq!(json["items_with_dates"], 1);
    }
}
