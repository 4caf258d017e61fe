use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration structure for the harvester
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default, rename = "source")]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Looks up a source by its configured name
    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|source| source.name == name)
    }
}

/// Network behavior shared by every source
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// User-agent strings; one is picked at random per request when several are given
    #[serde(rename = "user-agents")]
    pub user_agents: Vec<String>,

    /// Default headers sent with every request
    pub headers: BTreeMap<String, String>,

    /// Lower bound of the randomized pre-request delay (milliseconds)
    #[serde(rename = "min-delay-ms")]
    pub min_delay_ms: u64,

    /// Upper bound of the randomized pre-request delay (milliseconds)
    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    /// Total timeout per request attempt (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    #[serde(rename = "connect-timeout-secs")]
    pub connect_timeout_secs: u64,

    /// Attempts per fetch, including the first one
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    #[serde(rename = "backoff-base-ms")]
    pub backoff_base_ms: u64,

    #[serde(rename = "backoff-max-ms")]
    pub backoff_max_ms: u64,

    /// Randomize each backoff delay between half and the full computed value
    pub jitter: bool,

    /// Responses larger than this are rejected
    #[serde(rename = "max-bytes")]
    pub max_bytes: u64,

    /// Rendered fetches allowed per source run
    #[serde(rename = "max-render-escalations")]
    pub max_render_escalations: u32,

    /// Headless browser command printing the final DOM; `{url}` is substituted
    #[serde(rename = "render-command")]
    pub render_command: Option<String>,

    #[serde(rename = "render-timeout-secs")]
    pub render_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let headers = [
            (
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
            ("Accept-Language", "en-US,en;q=0.5"),
            ("Upgrade-Insecure-Requests", "1"),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();

        Self {
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0".to_string(),
            ],
            headers,
            min_delay_ms: 2_000,
            max_delay_ms: 5_000,
            timeout_secs: 30,
            connect_timeout_secs: 10,
            max_attempts: 3,
            backoff_base_ms: 2_000,
            backoff_max_ms: 60_000,
            jitter: true,
            max_bytes: 50 * 1024 * 1024,
            max_render_escalations: 3,
            render_command: None,
            render_timeout_secs: 60,
        }
    }
}

/// Document extraction settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// PDF text layers shorter than this trigger OCR
    #[serde(rename = "min-text-chars")]
    pub min_text_chars: usize,

    /// OCR command reading an image on stdin and printing text; e.g. `tesseract stdin stdout`
    #[serde(rename = "ocr-command")]
    pub ocr_command: Option<String>,

    /// The OCR process is killed after this long (seconds, per image)
    #[serde(rename = "ocr-timeout-secs")]
    pub ocr_timeout_secs: u64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            min_text_chars: 100,
            ocr_command: None,
            ocr_timeout_secs: 120,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory holding one snapshot (and exports) per source
    #[serde(rename = "data-dir")]
    pub data_dir: PathBuf,

    /// Path to the SQLite run ledger
    #[serde(rename = "ledger-path")]
    pub ledger_path: PathBuf,

    /// Persist the snapshot after this many newly inserted items
    #[serde(rename = "save-every")]
    pub save_every: usize,

    #[serde(rename = "export-csv")]
    pub export_csv: bool,

    #[serde(rename = "quality-report")]
    pub quality_report: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            ledger_path: PathBuf::from("./data/runs.db"),
            save_every: 10,
            export_csv: true,
            quality_report: true,
        }
    }
}

impl OutputConfig {
    pub fn snapshot_path(&self, source: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", source))
    }

    pub fn csv_path(&self, source: &str) -> PathBuf {
        self.data_dir.join(format!("{}.csv", source))
    }

    pub fn quality_report_path(&self, source: &str) -> PathBuf {
        self.data_dir.join(format!("{}_quality_report.json", source))
    }
}

/// Run orchestration settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    #[serde(rename = "max-concurrent-sources")]
    pub max_concurrent_sources: usize,

    /// Consecutive pages without a new item before the crawl stops
    #[serde(rename = "stale-page-limit")]
    pub stale_page_limit: u32,

    #[serde(rename = "structural-policy")]
    pub structural_policy: StructuralPolicy,

    /// Items with less body text than this are dropped by `--clean`
    #[serde(rename = "clean-min-chars")]
    pub clean_min_chars: usize,

    /// Page limit for incremental runs when a source sets none
    #[serde(rename = "default-max-pages")]
    pub default_max_pages: u32,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sources: 1,
            stale_page_limit: 3,
            structural_policy: StructuralPolicy::TreatAsEmpty,
            clean_min_chars: 100,
            default_max_pages: 3,
        }
    }
}

/// What to do with a listing page that has no recognizable item cards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StructuralPolicy {
    /// Count the page as empty; only a first-page failure stops the crawl
    #[default]
    TreatAsEmpty,
    /// Stop paginating on the first structural failure
    Abort,
}

/// How an item's identity is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityMode {
    #[default]
    Url,
    UrlAndTitle,
}

/// How listing page `n` is addressed
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "scheme", rename_all = "kebab-case")]
pub enum PaginationScheme {
    /// `?param=<start + n * step>`
    Query {
        #[serde(default = "default_page_param")]
        param: String,
        #[serde(default)]
        start: u32,
        #[serde(default = "default_step")]
        step: u32,
    },
    /// `#<template>` with `{offset}` replaced by `start + n * step`
    Fragment {
        template: String,
        #[serde(default)]
        start: u32,
        #[serde(default = "default_step")]
        step: u32,
    },
    /// Follow the `href` of the element matched by `next-selector`
    NextLink {
        #[serde(rename = "next-selector")]
        next_selector: String,
    },
}

impl Default for PaginationScheme {
    fn default() -> Self {
        PaginationScheme::Query {
            param: default_page_param(),
            start: 0,
            step: default_step(),
        }
    }
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_step() -> u32 {
    1
}

/// CSS selectors describing a source's markup
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    /// One element per item card on a listing page
    pub item: String,

    /// Anchor inside the card; the card itself when omitted
    #[serde(default)]
    pub link: Option<String>,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub date: Option<String>,

    /// Candidate content regions on the item page, first match wins
    #[serde(default = "default_content_selectors")]
    pub content: Vec<String>,

    #[serde(default = "default_item_title", rename = "item-title")]
    pub item_title: String,

    #[serde(default, rename = "item-date")]
    pub item_date: Option<String>,

    /// Additional listing fields copied into the item's `extra` map
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

fn default_content_selectors() -> Vec<String> {
    vec!["main".to_string(), "article".to_string()]
}

fn default_item_title() -> String {
    "h1".to_string()
}

/// One harvested publication listing
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Short identifier used for file names and logs
    pub name: String,

    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Listing page 0
    #[serde(rename = "listing-url")]
    pub listing_url: String,

    /// Entry page fetched once before the first listing page to establish cookies
    #[serde(default, rename = "warm-up-url")]
    pub warm_up_url: Option<String>,

    #[serde(default)]
    pub pagination: PaginationScheme,

    pub selectors: SelectorConfig,

    /// Page limit for incremental runs
    #[serde(default, rename = "max-pages")]
    pub max_pages: Option<u32>,

    #[serde(default)]
    pub identity: IdentityMode,

    /// Drop the whole query string before hashing the identity
    #[serde(default, rename = "strip-query")]
    pub strip_query: bool,

    /// chrono format strings tried in order when parsing date text
    #[serde(default = "default_date_formats", rename = "date-formats")]
    pub date_formats: Vec<String>,

    /// Regexes removed from extracted body text
    #[serde(default)]
    pub boilerplate: Vec<String>,

    #[serde(default = "default_attachment_extensions", rename = "attachment-extensions")]
    pub attachment_extensions: Vec<String>,

    #[serde(default, rename = "max-related-links")]
    pub max_related_links: Option<usize>,

    /// Retry an empty listing page through the renderer
    #[serde(default, rename = "render-fallback")]
    pub render_fallback: bool,
}

pub fn default_date_formats() -> Vec<String> {
    [
        "%Y-%m-%d",
        "%d %B %Y",
        "%d %b %Y",
        "%B %d, %Y",
        "%b %d, %Y",
        "%d/%m/%Y",
        "%A, %d %B %Y",
        "%A %d %B %Y",
    ]
    .iter()
    .map(|format| format.to_string())
    .collect()
}

fn default_attachment_extensions() -> Vec<String> {
    ["pdf", "xlsx", "xls", "csv"]
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}
