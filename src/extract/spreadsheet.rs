//! Spreadsheet extraction: `.xlsx` workbooks and CSV files
//!
//! Every non-empty sheet becomes a `[SHEET name]` block using the same row and
//! cell separators as HTML tables.

use crate::extract::table::Table;
use crate::extract::text::normalize_text;
use crate::extract::ExtractionError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use zip::ZipArchive;

/// Maximum sheets to process in one workbook
const MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet
const MAX_CELLS_PER_SHEET: usize = 200_000;
/// Maximum decompressed bytes to read from a single ZIP entry
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Widest sheet Excel can produce (column `XFD`)
const MAX_COLUMNS: usize = 16_384;

/// Magic bytes of the OLE2 compound files used by legacy `.xls` workbooks
pub const OLE2_SIGNATURE: &[u8] = b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1";

type Archive<'a> = ZipArchive<Cursor<&'a [u8]>>;

/// Extracts every non-empty sheet of an `.xlsx` workbook
///
/// # Returns
///
/// * `Ok((text, tables))` - Sheet blocks joined by blank lines, one table per sheet
/// * `Err(ExtractionError::ParseFailure)` - Not a readable workbook
pub fn extract_xlsx(bytes: &[u8]) -> Result<(String, Vec<Table>), ExtractionError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(parse_failure)?;

    let shared_strings = if archive.file_names().any(|name| name == "xl/sharedStrings.xml") {
        read_shared_strings(&read_entry(&mut archive, "xl/sharedStrings.xml")?)?
    } else {
        Vec::new()
    };

    let sheets = list_sheets(&mut archive)?;
    if sheets.is_empty() {
        return Err(ExtractionError::ParseFailure(
            "workbook contains no worksheets".to_string(),
        ));
    }

    let mut tables = Vec::new();
    for (name, path) in sheets.into_iter().take(MAX_SHEETS) {
        let xml = read_entry(&mut archive, &path)?;
        let mut table = Table::new(Some(name), read_sheet_rows(&xml, &shared_strings)?);
        table.pad_rows();
        if !table.is_empty() {
            tables.push(table);
        }
    }

    Ok((render_sheets(&tables), tables))
}

/// Extracts a CSV file as a single sheet named after the file
pub fn extract_csv(bytes: &[u8], sheet_name: &str) -> Result<(String, Vec<Table>), ExtractionError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record.map_err(parse_failure)?;
        let row: Vec<String> = record
            .iter()
            .map(|field| clean_cell(&String::from_utf8_lossy(field)))
            .collect();
        if row.iter().any(|cell| !cell.is_empty()) {
            rows.push(row);
        }
    }

    let mut table = Table::new(Some(sheet_name.to_string()), rows);
    table.pad_rows();

    let tables = if table.is_empty() { Vec::new() } else { vec![table] };
    Ok((render_sheets(&tables), tables))
}

fn render_sheets(tables: &[Table]) -> String {
    tables
        .iter()
        .map(|table| table.render_sheet(table.caption.as_deref().unwrap_or("Sheet")))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Normalizes a cell value; placeholder values for missing data become empty
fn clean_cell(value: &str) -> String {
    let value = normalize_text(value);
    match value.as_str() {
        "nan" | "NaN" | "None" | "null" => String::new(),
        _ => value,
    }
}

fn parse_failure(e: impl std::fmt::Display) -> ExtractionError {
    ExtractionError::ParseFailure(e.to_string())
}

fn read_entry(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ExtractionError> {
    let entry = archive.by_name(name).map_err(parse_failure)?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(parse_failure)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractionError::ParseFailure(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key || attr.key.local_name().as_ref() == key)
        .and_then(|attr| attr.unescape_value().ok().map(|value| value.into_owned()))
}

/// Reads the shared string table, concatenating rich-text runs
fn read_shared_strings(xml: &[u8]) -> Result<Vec<String>, ExtractionError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Ok(Event::Text(text)) if in_text => {
                if let Some(current) = current.as_mut() {
                    current.push_str(&text.unescape().map_err(parse_failure)?);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"si" => strings.push(current.take().unwrap_or_default()),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_failure(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(strings)
}

/// Lists `(sheet name, entry path)` in workbook order
///
/// Names come from `xl/workbook.xml` and paths from its relationships; when
/// either is missing, worksheet entries are used in numeric order.
fn list_sheets(archive: &mut Archive<'_>) -> Result<Vec<(String, String)>, ExtractionError> {
    let from_workbook = read_entry(archive, "xl/workbook.xml")
        .ok()
        .zip(read_entry(archive, "xl/_rels/workbook.xml.rels").ok())
        .map(|(workbook, rels)| -> Result<Vec<(String, String)>, ExtractionError> {
            let targets = read_relationships(&rels)?;
            Ok(read_workbook_sheets(&workbook)?
                .into_iter()
                .filter_map(|(name, rel_id)| {
                    targets.get(&rel_id).map(|target| (name, resolve_target(target)))
                })
                .collect())
        })
        .transpose()?
        .unwrap_or_default();

    let available: Vec<String> = archive.file_names().map(str::to_string).collect();
    let sheets: Vec<(String, String)> = from_workbook
        .into_iter()
        .filter(|(_, path)| available.contains(path))
        .collect();
    if !sheets.is_empty() {
        return Ok(sheets);
    }

    let mut paths: Vec<String> = available
        .into_iter()
        .filter(|name| name.starts_with("xl/worksheets/sheet") && name.ends_with(".xml"))
        .collect();
    paths.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    Ok(paths
        .into_iter()
        .enumerate()
        .map(|(index, path)| (format!("Sheet{}", index + 1), path))
        .collect())
}

fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

fn read_workbook_sheets(xml: &[u8]) -> Result<Vec<(String, String)>, ExtractionError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sheet" => {
                if let (Some(name), Some(rel_id)) = (attribute(&e, b"name"), attribute(&e, b"id")) {
                    sheets.push((name, rel_id));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_failure(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(sheets)
}

fn read_relationships(xml: &[u8]) -> Result<HashMap<String, String>, ExtractionError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut targets = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) = (attribute(&e, b"Id"), attribute(&e, b"Target")) {
                    targets.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_failure(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(targets)
}

/// Converts a cell reference such as `AB12` into a zero-based column index
///
/// Returns `Ok(None)` when the reference has no column letters and
/// `ParseFailure` for columns beyond `XFD`.
fn column_index(reference: &str) -> Result<Option<usize>, ExtractionError> {
    let too_wide = || {
        ExtractionError::ParseFailure(format!(
            "cell reference {} is beyond column {}",
            reference, MAX_COLUMNS
        ))
    };

    let mut index = 0usize;
    let mut letters = 0usize;
    for c in reference.chars().take_while(|c| c.is_ascii_alphabetic()) {
        let digit = c.to_ascii_uppercase() as usize - 'A' as usize + 1;
        index = index
            .checked_mul(26)
            .and_then(|index| index.checked_add(digit))
            .filter(|index| *index <= MAX_COLUMNS)
            .ok_or_else(too_wide)?;
        letters += 1;
    }

    if letters == 0 {
        Ok(None)
    } else {
        Ok(Some(index - 1))
    }
}

/// The type and position of the cell being read
struct CellState {
    column: usize,
    kind: Option<String>,
    value: String,
}

fn read_sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<Vec<Vec<String>>, ExtractionError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell: Option<CellState> = None;
    let mut in_value = false;
    let mut cell_count = 0usize;

    loop {
        if cell_count >= MAX_CELLS_PER_SHEET {
            break;
        }

        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => row = Vec::new(),
                b"c" => {
                    let column = match attribute(&e, b"r") {
                        Some(reference) => column_index(&reference)?,
                        None => None,
                    }
                    .unwrap_or(row.len());
                    if column >= MAX_COLUMNS {
                        return Err(parse_failure(format!(
                            "row is wider than {} columns",
                            MAX_COLUMNS
                        )));
                    }
                    cell = Some(CellState {
                        column,
                        kind: attribute(&e, b"t"),
                        value: String::new(),
                    });
                }
                b"v" | b"t" => in_value = cell.is_some(),
                _ => {}
            },
            Ok(Event::Text(text)) if in_value => {
                if let Some(cell) = cell.as_mut() {
                    cell.value.push_str(&text.unescape().map_err(parse_failure)?);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let Some(finished) = cell.take() {
                        let value = cell_value(&finished, shared_strings);
                        if row.len() <= finished.column {
                            row.resize(finished.column + 1, String::new());
                        }
                        row[finished.column] = value;
                        cell_count += 1;
                    }
                }
                b"row" => {
                    if row.iter().any(|value| !value.is_empty()) {
                        rows.push(std::mem::take(&mut row));
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_failure(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(rows)
}

fn cell_value(cell: &CellState, shared_strings: &[String]) -> String {
    let raw = cell.value.trim();
    let value = match cell.kind.as_deref() {
        Some("s") => raw
            .parse::<usize>()
            .ok()
            .and_then(|index| shared_strings.get(index))
            .cloned()
            .unwrap_or_default(),
        Some("b") => match raw {
            "1" => "TRUE".to_string(),
            "0" => "FALSE".to_string(),
            _ => raw.to_string(),
        },
        _ => raw.to_string(),
    };
    clean_cell(&value)
}
