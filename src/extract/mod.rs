//! Document extraction module
//!
//! Turns fetched bytes into normalized text, links, images and tables:
//! - `html`: content-region block walk for item pages
//! - `pdf`: text layer per page, OCR over embedded images for scans
//! - `spreadsheet`: `.xlsx` workbooks and CSV files as `[SHEET]` blocks
//!
//! Extraction is synchronous and CPU-bound; the orchestrator runs it on the
//! blocking thread pool.

mod html;
mod ocr;
mod pdf;
mod spreadsheet;
mod table;
pub mod text;

pub use html::{extract_html, HtmlExtraction, PageSelectors};
pub use ocr::{CommandRecognizer, EmbeddedImage, TextRecognizer};
pub use pdf::{embedded_images, extract_pdf, PDF_SIGNATURE};
pub use spreadsheet::{extract_csv, extract_xlsx, OLE2_SIGNATURE};
pub use table::{Table, CELL_SEPARATOR};

use crate::config::{ExtractConfig, SourceConfig};
use crate::storage::AttachmentExtract;
use crate::url::path_extension;
use crate::ConfigError;
use regex::Regex;
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors local to one document
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ExtractionError {
    #[error("Unsupported media kind: {0}")]
    UnsupportedMediaKind(String),

    #[error("Parse failure: {0}")]
    ParseFailure(String),

    #[error("OCR failure: {0}")]
    OcrFailure(String),

    /// The attachment could not be downloaded
    #[error("Fetch failure: {0}")]
    FetchFailure(String),
}

/// Kind of document behind a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Html,
    Pdf,
    Spreadsheet,
    Unknown,
}

impl MediaKind {
    /// Detects the media kind from magic bytes, Content-Type and URL extension
    ///
    /// Magic bytes win over the declared type, which wins over the extension.
    pub fn detect(content_type: Option<&str>, url: &Url, bytes: &[u8]) -> Self {
        if bytes.starts_with(PDF_SIGNATURE) {
            return Self::Pdf;
        }

        let extension = path_extension(url);
        let is_zip = bytes.starts_with(b"PK\x03\x04");
        if is_zip && extension.as_deref() == Some("xlsx") {
            return Self::Spreadsheet;
        }

        let mime = content_type
            .and_then(|value| value.split(';').next())
            .map(|value| value.trim().to_ascii_lowercase());
        if let Some(mime) = mime.as_deref() {
            match mime {
                "application/pdf" => return Self::Pdf,
                "text/html" | "application/xhtml+xml" => return Self::Html,
                "text/csv"
                | "application/csv"
                | "application/vnd.ms-excel"
                | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
                    return Self::Spreadsheet
                }
                _ => {}
            }
        }

        match extension.as_deref() {
            Some("pdf") => Self::Pdf,
            Some("xlsx") | Some("xls") | Some("csv") => Self::Spreadsheet,
            Some("html") | Some("htm") | Some("aspx") | Some("php") => Self::Html,
            _ if looks_like_html(bytes) => Self::Html,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Html => "html",
            Self::Pdf => "pdf",
            Self::Spreadsheet => "spreadsheet",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

fn looks_like_html(bytes: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]).to_ascii_lowercase();
    let head = head.trim_start();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

/// Text and structure extracted from one document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedDocument {
    pub text: String,
    /// Absolute, fragment-free, deduplicated and sorted
    pub links: Vec<String>,
    pub images: Vec<String>,
    pub tables: Vec<Table>,
}

/// Result of extracting an item page
#[derive(Debug, Clone, Default)]
pub struct ItemPage {
    pub document: ExtractedDocument,
    pub title: Option<String>,
    pub date_text: Option<String>,
}

/// Per-source extraction settings with compiled selectors and patterns
pub struct Extractor {
    content: Vec<Selector>,
    item_title: Selector,
    item_date: Option<Selector>,
    boilerplate: Vec<Regex>,
    min_text_chars: usize,
    recognizer: Option<Arc<dyn TextRecognizer>>,
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extractor")
            .field("content_selectors", &self.content.len())
            .field("boilerplate", &self.boilerplate.len())
            .field("min_text_chars", &self.min_text_chars)
            .field("ocr", &self.recognizer.is_some())
            .finish()
    }
}

impl Extractor {
    /// Builds the extractor for one source
    ///
    /// # Arguments
    ///
    /// * `source` - Source configuration (selectors and boilerplate patterns)
    /// * `settings` - Extraction settings (OCR threshold and command)
    ///
    /// # Returns
    ///
    /// * `Ok(Extractor)` - Ready to use
    /// * `Err(ConfigError)` - A selector or pattern failed to compile
    pub fn for_source(source: &SourceConfig, settings: &ExtractConfig) -> Result<Self, ConfigError> {
        let content = source
            .selectors
            .content
            .iter()
            .map(|selector| compile_selector(selector))
            .collect::<Result<Vec<_>, _>>()?;
        let item_title = compile_selector(&source.selectors.item_title)?;
        let item_date = source
            .selectors
            .item_date
            .as_deref()
            .map(compile_selector)
            .transpose()?;
        let boilerplate = source
            .boilerplate
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let recognizer = settings
            .ocr_command
            .as_deref()
            .and_then(|command| {
                CommandRecognizer::from_command_line(
                    command,
                    Duration::from_secs(settings.ocr_timeout_secs),
                )
            })
            .map(|recognizer| Arc::new(recognizer) as Arc<dyn TextRecognizer>);

        Ok(Self {
            content,
            item_title,
            item_date,
            boilerplate,
            min_text_chars: settings.min_text_chars,
            recognizer,
        })
    }

    /// Replaces the OCR backend
    pub fn with_recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    /// Extracts a document of a known media kind
    ///
    /// # Arguments
    ///
    /// * `bytes` - Document content
    /// * `kind` - Detected media kind
    /// * `base_url` - Location of the document, used to resolve links and name sheets
    pub fn extract(
        &self,
        bytes: &[u8],
        kind: MediaKind,
        base_url: &Url,
    ) -> Result<ExtractedDocument, ExtractionError> {
        Ok(self.extract_item(bytes, kind, base_url)?.document)
    }

    /// Extracts an item page, including its title and date text when it is HTML
    pub fn extract_item(
        &self,
        bytes: &[u8],
        kind: MediaKind,
        url: &Url,
    ) -> Result<ItemPage, ExtractionError> {
        match kind {
            MediaKind::Html => {
                let html = String::from_utf8_lossy(bytes);
                let extraction = extract_html(
                    &html,
                    url,
                    &PageSelectors {
                        content: &self.content,
                        title: Some(&self.item_title),
                        date: self.item_date.as_ref(),
                    },
                );
                let mut document = extraction.document;
                document.text = text::strip_boilerplate(&document.text, &self.boilerplate);
                Ok(ItemPage {
                    document,
                    title: extraction.title,
                    date_text: extraction.date_text,
                })
            }
            MediaKind::Pdf => {
                let text = extract_pdf(bytes, self.min_text_chars, self.recognizer.as_deref())?;
                Ok(ItemPage {
                    document: ExtractedDocument {
                        text,
                        ..ExtractedDocument::default()
                    },
                    ..ItemPage::default()
                })
            }
            MediaKind::Spreadsheet => {
                let extension = path_extension(url);
                if bytes.starts_with(OLE2_SIGNATURE) || extension.as_deref() == Some("xls") {
                    return Err(ExtractionError::UnsupportedMediaKind(
                        "legacy .xls workbook".to_string(),
                    ));
                }
                let (text, tables) = match extension.as_deref() {
                    Some("csv") => extract_csv(bytes, &sheet_name(url))?,
                    _ if bytes.starts_with(b"PK\x03\x04") => extract_xlsx(bytes)?,
                    _ => extract_csv(bytes, &sheet_name(url))?,
                };
                Ok(ItemPage {
                    document: ExtractedDocument {
                        text,
                        tables,
                        ..ExtractedDocument::default()
                    },
                    ..ItemPage::default()
                })
            }
            MediaKind::Unknown => Err(ExtractionError::UnsupportedMediaKind(format!(
                "no extractor for {}",
                url
            ))),
        }
    }

    /// Extracts an attachment; failures are recorded on the result, never raised
    pub fn extract_attachment(&self, url: &Url, content_type: Option<&str>, bytes: &[u8]) -> AttachmentExtract {
        let kind = MediaKind::detect(content_type, url, bytes);
        match self.extract(bytes, kind, url) {
            Ok(document) => AttachmentExtract {
                source_url: url.to_string(),
                media_kind: kind,
                text: document.text,
                tables: document.tables,
                extraction_error: None,
            },
            Err(error) => AttachmentExtract::failed(url.as_str(), kind, error),
        }
    }
}

fn compile_selector(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

/// Sheet name for single-sheet formats: the file stem of the URL
fn sheet_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|segment| segment.rsplit_once('.').map(|(stem, _)| stem.to_string()))
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "Sheet1".to_string())
}
