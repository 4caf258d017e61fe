//! HTML item page extraction
//!
//! Text is produced by walking the content region in document order: every
//! block-level element ends a paragraph, paragraphs are joined with blank lines,
//! and tables are emitted in place as `[TABLE]` blocks.

use crate::extract::table::Table;
use crate::extract::text::normalize_text;
use crate::extract::ExtractedDocument;
use crate::url::resolve_link;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::BTreeSet;
use tracing::warn;
use url::Url;

/// Elements whose content is never part of the readable text
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg", "head"];

/// Elements that start and end a paragraph
const BLOCK_TAGS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "dd",
    "details",
    "div",
    "dl",
    "dt",
    "figcaption",
    "figure",
    "footer",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "li",
    "main",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "summary",
    "ul",
];

/// Selectors used to read one item page
pub struct PageSelectors<'a> {
    pub content: &'a [Selector],
    pub title: Option<&'a Selector>,
    pub date: Option<&'a Selector>,
}

/// Result of reading an item page
#[derive(Debug, Clone, Default)]
pub struct HtmlExtraction {
    pub document: ExtractedDocument,
    pub title: Option<String>,
    pub date_text: Option<String>,
    /// False when no content selector matched and the whole body was used
    pub content_region_found: bool,
}

/// Extracts text, links, images and tables from an HTML page
///
/// # Arguments
///
/// * `html` - Page markup
/// * `base_url` - URL the page was fetched from, for resolving links
/// * `selectors` - Content region candidates (first match wins) and title/date selectors
pub fn extract_html(html: &str, base_url: &Url, selectors: &PageSelectors<'_>) -> HtmlExtraction {
    let document = Html::parse_document(html);

    let region = selectors
        .content
        .iter()
        .find_map(|selector| document.select(selector).next());
    let content_region_found = region.is_some();

    let region = match region {
        Some(region) => Some(region),
        None => {
            if !selectors.content.is_empty() {
                warn!("No content region matched on {}, falling back to <body>", base_url);
            }
            Selector::parse("body")
                .ok()
                .and_then(|body| document.select(&body).next())
        }
    };

    let mut writer = BlockWriter::default();
    let mut links = BTreeSet::new();
    let mut images = BTreeSet::new();

    if let Some(region) = region {
        walk(region, &mut writer);
        collect_urls(region, "a[href]", "href", base_url, &mut links);
        collect_urls(region, "img[src]", "src", base_url, &mut images);
    }

    let (text, tables) = writer.finish();

    HtmlExtraction {
        document: ExtractedDocument {
            text,
            links: links.into_iter().collect(),
            images: images.into_iter().collect(),
            tables,
        },
        title: extract_title(&document, selectors.title),
        date_text: extract_date_text(&document, selectors.date),
        content_region_found,
    }
}

/// Accumulates inline text into paragraphs
#[derive(Default)]
struct BlockWriter {
    blocks: Vec<String>,
    current: String,
    tables: Vec<Table>,
}

impl BlockWriter {
    /// Source line breaks are plain whitespace; only `<br>` breaks a line
    fn push_inline(&mut self, text: &str) {
        self.current
            .extend(text.chars().map(|c| if c == '\n' || c == '\r' { ' ' } else { c }));
    }

    fn line_break(&mut self) {
        self.current.push('\n');
    }

    fn flush(&mut self) {
        let lines: Vec<String> = self
            .current
            .split('\n')
            .map(normalize_text)
            .filter(|line| !line.is_empty())
            .collect();
        if !lines.is_empty() {
            self.blocks.push(lines.join("\n"));
        }
        self.current.clear();
    }

    fn push_table(&mut self, table: Table) {
        self.flush();
        self.blocks.push(table.render_block());
        self.tables.push(table);
    }

    fn finish(mut self) -> (String, Vec<Table>) {
        self.flush();
        (self.blocks.join("\n\n"), self.tables)
    }
}

fn walk(element: ElementRef<'_>, writer: &mut BlockWriter) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => writer.push_inline(text),
            Node::Element(el) => {
                let Some(child_ref) = ElementRef::wrap(child) else {
                    continue;
                };
                let name = el.name();

                if SKIPPED_TAGS.contains(&name) {
                    continue;
                }

                match name {
                    "table" => {
                        let table = parse_table(child_ref);
                        if !table.is_empty() {
                            writer.push_table(table);
                        }
                    }
                    "br" => writer.line_break(),
                    _ if BLOCK_TAGS.contains(&name) => {
                        writer.flush();
                        walk(child_ref, writer);
                        writer.flush();
                    }
                    _ => walk(child_ref, writer),
                }
            }
            _ => {}
        }
    }
}

/// Reads a `<table>` into rows of normalized cell text
fn parse_table(table: ElementRef<'_>) -> Table {
    let mut rows = Vec::new();

    if let (Ok(row_selector), Ok(cell_selector)) = (Selector::parse("tr"), Selector::parse("th, td")) {
        for row in table.select(&row_selector) {
            let cells: Vec<String> = row
                .select(&cell_selector)
                .map(|cell| normalize_text(&cell.text().collect::<Vec<_>>().join(" ")))
                .collect();
            if !cells.is_empty() {
                rows.push(cells);
            }
        }
    }

    let caption = Selector::parse("caption").ok().and_then(|selector| {
        table
            .select(&selector)
            .next()
            .map(|caption| normalize_text(&caption.text().collect::<String>()))
            .filter(|caption| !caption.is_empty())
    });

    let mut table = Table::new(caption, rows);
    table.pad_rows();
    table
}

fn collect_urls(
    region: ElementRef<'_>,
    selector: &str,
    attribute: &str,
    base_url: &Url,
    out: &mut BTreeSet<String>,
) {
    if let Ok(selector) = Selector::parse(selector) {
        for element in region.select(&selector) {
            if let Some(url) = element
                .value()
                .attr(attribute)
                .and_then(|value| resolve_link(value, base_url))
            {
                out.insert(url.to_string());
            }
        }
    }
}

/// Item title: configured selector, then `og:title`, then `<title>`
fn extract_title(document: &Html, selector: Option<&Selector>) -> Option<String> {
    if let Some(title) = selector.and_then(|selector| first_text(document, selector)) {
        return Some(title);
    }

    if let Ok(og) = Selector::parse("meta[property='og:title'][content]") {
        if let Some(content) = document
            .select(&og)
            .next()
            .and_then(|meta| meta.value().attr("content"))
            .map(normalize_text)
            .filter(|content| !content.is_empty())
        {
            return Some(content);
        }
    }

    Selector::parse("title")
        .ok()
        .and_then(|selector| first_text(document, &selector))
}

/// Item date text: configured selector, then `time[datetime]`, then article metadata
fn extract_date_text(document: &Html, selector: Option<&Selector>) -> Option<String> {
    if let Some(element) = selector.and_then(|selector| document.select(selector).next()) {
        if let Some(datetime) = element.value().attr("datetime") {
            return Some(datetime.trim().to_string());
        }
        let text = normalize_text(&element.text().collect::<String>());
        if !text.is_empty() {
            return Some(text);
        }
    }

    for (fallback, attribute) in [
        ("time[datetime]", "datetime"),
        ("meta[property='article:published_time'][content]", "content"),
    ] {
        if let Ok(selector) = Selector::parse(fallback) {
            if let Some(value) = document
                .select(&selector)
                .next()
                .and_then(|element| element.value().attr(attribute))
            {
                return Some(value.trim().to_string());
            }
        }
    }

    None
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(|element| normalize_text(&element.text().collect::<String>()))
        .filter(|text| !text.is_empty())
}
