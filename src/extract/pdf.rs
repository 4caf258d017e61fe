//! PDF text extraction with an OCR fallback for scanned documents

use crate::extract::ocr::{EmbeddedImage, TextRecognizer};
use crate::extract::text::{collapse_whitespace, readable_ratio};
use crate::extract::ExtractionError;
use lopdf::{Dictionary, Document, Object};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

/// Magic bytes every PDF starts with
pub const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// Text layers with a smaller share of readable characters count as garbled
const MIN_READABLE_RATIO: f64 = 0.7;

/// Extracts the text of a PDF, page by page
///
/// The text layer is used when it is long enough and readable. Otherwise every
/// embedded raster image is run through the recognizer and the results are
/// appended under `[IMAGE TEXT n]` markers.
///
/// # Arguments
///
/// * `bytes` - The PDF file
/// * `min_text_chars` - Text layers shorter than this trigger OCR
/// * `recognizer` - OCR backend, if one is configured
///
/// # Returns
///
/// * `Ok(String)` - Extracted text (may be a short text layer when OCR found nothing)
/// * `Err(ExtractionError::ParseFailure)` - Not a PDF
/// * `Err(ExtractionError::OcrFailure)` - No text layer and OCR produced nothing
pub fn extract_pdf(
    bytes: &[u8],
    min_text_chars: usize,
    recognizer: Option<&dyn TextRecognizer>,
) -> Result<String, ExtractionError> {
    if !bytes.starts_with(PDF_SIGNATURE) {
        return Err(ExtractionError::ParseFailure(
            "missing %PDF- signature".to_string(),
        ));
    }

    let text_layer = extract_text_layer(bytes);
    let layer_chars = text_layer.chars();
    let garbled = text_layer.is_garbled();
    if layer_chars >= min_text_chars && !garbled {
        return Ok(text_layer.render());
    }

    debug!(
        "PDF text layer has {} characters (garbled: {}), trying OCR",
        layer_chars, garbled
    );

    let usable_layer = if garbled {
        String::new()
    } else {
        text_layer.render()
    };

    let Some(recognizer) = recognizer else {
        return if usable_layer.trim().is_empty() {
            Err(ExtractionError::OcrFailure(
                "no text layer and no OCR recognizer configured".to_string(),
            ))
        } else {
            Ok(usable_layer)
        };
    };

    let images = embedded_images(bytes)?;
    let mut recognized = Vec::new();
    let mut failures = 0usize;

    for (index, image) in images.iter().enumerate() {
        match recognizer.recognize(image) {
            Ok(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    recognized.push(format!("[IMAGE TEXT {}]\n{}", index + 1, text));
                }
            }
            Err(e) => {
                failures += 1;
                warn!("OCR failed for image {}: {}", index + 1, e);
            }
        }
    }

    if recognized.is_empty() && usable_layer.trim().is_empty() {
        return Err(ExtractionError::OcrFailure(format!(
            "no text recovered from {} images ({} failed)",
            images.len(),
            failures
        )));
    }

    let mut parts = Vec::new();
    if !usable_layer.trim().is_empty() {
        parts.push(usable_layer);
    }
    parts.extend(recognized);
    Ok(parts.join("\n\n"))
}

/// Non-empty pages of a PDF text layer, numbered from 1
#[derive(Debug, Default)]
struct TextLayer {
    pages: Vec<(usize, String)>,
}

impl TextLayer {
    /// Non-whitespace characters of the page text, markers excluded
    fn chars(&self) -> usize {
        self.pages
            .iter()
            .map(|(_, text)| text.chars().filter(|c| !c.is_whitespace()).count())
            .sum()
    }

    fn is_garbled(&self) -> bool {
        if self.chars() == 0 {
            return false;
        }
        let text: Vec<&str> = self.pages.iter().map(|(_, text)| text.as_str()).collect();
        readable_ratio(&text.join("\n")) < MIN_READABLE_RATIO
    }

    /// One `[PAGE n]` section per page
    fn render(&self) -> String {
        self.pages
            .iter()
            .map(|(number, text)| format!("[PAGE {}]\n{}", number, text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Reads the text layer page by page
///
/// A PDF whose text layer cannot be decoded is treated as having none, so that
/// scanned documents with odd font programs still reach OCR.
fn extract_text_layer(bytes: &[u8]) -> TextLayer {
    let pages = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }));

    let pages = match pages {
        Ok(Ok(pages)) => pages,
        Ok(Err(e)) => {
            debug!("PDF text layer unavailable: {}", e);
            return TextLayer::default();
        }
        Err(_) => {
            warn!("PDF text extraction panicked; treating text layer as empty");
            return TextLayer::default();
        }
    };

    let pages = pages
        .iter()
        .enumerate()
        .filter_map(|(index, page)| {
            let lines: Vec<String> = page
                .lines()
                .map(collapse_whitespace)
                .filter(|line| !line.is_empty())
                .collect();
            if lines.is_empty() {
                None
            } else {
                Some((index + 1, lines.join("\n")))
            }
        })
        .collect();
    TextLayer { pages }
}

/// Collects every image XObject in the document, in object order
pub fn embedded_images(bytes: &[u8]) -> Result<Vec<EmbeddedImage>, ExtractionError> {
    let document =
        Document::load_mem(bytes).map_err(|e| ExtractionError::ParseFailure(e.to_string()))?;

    let mut images = Vec::new();
    for object in document.objects.values() {
        let Object::Stream(stream) = object else {
            continue;
        };
        if !has_name(&stream.dict, b"Subtype", b"Image") {
            continue;
        }

        let width = dict_u32(&stream.dict, b"Width");
        let height = dict_u32(&stream.dict, b"Height");
        let filters = filter_names(&stream.dict);

        let encoded_format = if filters.iter().any(|f| f.as_slice() == b"DCTDecode") {
            Some("jpeg")
        } else if filters.iter().any(|f| f.as_slice() == b"JPXDecode") {
            Some("jpeg2000")
        } else {
            None
        };

        let data = if encoded_format.is_some() || filters.is_empty() {
            stream.content.clone()
        } else {
            match stream.decompressed_content() {
                Ok(data) => data,
                Err(e) => {
                    debug!("Skipping undecodable image stream: {}", e);
                    continue;
                }
            }
        };

        let components = if has_name(&stream.dict, b"ColorSpace", b"DeviceGray") {
            1
        } else if has_name(&stream.dict, b"ColorSpace", b"DeviceCMYK") {
            4
        } else {
            3
        };

        images.push(EmbeddedImage {
            width,
            height,
            encoded_format,
            data,
            components,
        });
    }

    Ok(images)
}

fn has_name(dict: &Dictionary, key: &[u8], expected: &[u8]) -> bool {
    dict.get(key)
        .and_then(Object::as_name)
        .map(|name| name == expected)
        .unwrap_or(false)
}

fn dict_u32(dict: &Dictionary, key: &[u8]) -> u32 {
    dict.get(key)
        .and_then(Object::as_i64)
        .ok()
        .and_then(|value| u32::try_from(value).ok())
        .unwrap_or(0)
}

fn filter_names(dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(filters)) => filters
            .iter()
            .filter_map(|filter| filter.as_name().ok().map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}
