//! Harvest coordinator - main harvest orchestration logic
//!
//! This module contains the per-source harvest loop that coordinates:
//! - Walking the listing pages through the paginator
//! - Fetching and extracting each new item and its attachments
//! - Merging items into the snapshot and saving it periodically
//! - Cancellation between pages and between items
//! - Running several sources under a concurrency limit

use crate::config::{Config, HarvestConfig, PaginationScheme, SourceConfig};
use crate::crawler::paginator::{PaginationLimits, Paginator};
use crate::crawler::parser::{ItemReference, ListingParser, PageHarvest};
use crate::crawler::{FetchKind, Fetcher, HttpFetcher, RawResponse, RenderPurpose};
use crate::extract::text::parse_date;
use crate::extract::{ExtractionError, Extractor, MediaKind};
use crate::output::{export_csv, QualityReport, RunSummary};
use crate::state::StopReason;
use crate::storage::{
    AttachmentExtract, HarvestedItem, ItemIdentity, ItemStore, MergeOutcome, RunLedger,
    RunStatus, SnapshotStore, StorageError,
};
use crate::url::has_extension;
use crate::HarvestError;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};
use url::Url;

/// How many listing pages a run may fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// No page limit; stops on the other termination conditions only
    Full,
    /// Page limit from the option, else the source, else `[harvest] default-max-pages`
    Incremental { max_pages: Option<u32> },
}

impl RunMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental { .. } => "incremental",
        }
    }

    /// Page limit for one source
    pub fn max_pages(&self, source: &SourceConfig, harvest: &HarvestConfig) -> Option<u32> {
        match self {
            Self::Full => None,
            Self::Incremental { max_pages } => Some(
                max_pages
                    .or(source.max_pages)
                    .unwrap_or(harvest.default_max_pages),
            ),
        }
    }
}

/// Options of one harvest invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub mode: RunMode,
    /// First listing page to fetch
    pub start_page: u32,
    /// Harvest stored items again, replacing their content
    pub force: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: RunMode::Incremental { max_pages: None },
            start_page: 0,
            force: false,
        }
    }
}

/// Harvests one source into an item store
pub struct Harvester<S: ItemStore = SnapshotStore> {
    source: SourceConfig,
    harvest: HarvestConfig,
    fetcher: Arc<dyn Fetcher>,
    store: S,
    extractor: Arc<Extractor>,
    listing: ListingParser,
    options: RunOptions,
    save_every: usize,
    cancel: CancellationToken,
    summary: RunSummary,
    unsaved: usize,
}

impl<S: ItemStore> Harvester<S> {
    /// Creates a harvester for one source
    ///
    /// # Arguments
    ///
    /// * `config` - The full configuration (fetch, extract, output and harvest settings)
    /// * `source` - The source to harvest
    /// * `fetcher` - Network access for this run
    /// * `store` - Items harvested by earlier runs
    /// * `options` - Run mode, start page and force flag
    /// * `cancel` - Checked between pages and between items
    ///
    /// # Returns
    ///
    /// * `Ok(Harvester)` - Ready to run
    /// * `Err(HarvestError)` - A selector or pattern of the source is invalid
    pub fn new(
        config: &Config,
        source: &SourceConfig,
        fetcher: Arc<dyn Fetcher>,
        store: S,
        options: RunOptions,
        cancel: CancellationToken,
    ) -> Result<Self, HarvestError> {
        let extractor = Extractor::for_source(source, &config.extract)?;
        let listing = ListingParser::for_source(source)?;
        let mut summary = RunSummary::new(&source.name);
        summary.mode = options.mode.name().to_string();

        Ok(Self {
            source: source.clone(),
            harvest: config.harvest.clone(),
            fetcher,
            store,
            extractor: Arc::new(extractor),
            listing,
            options,
            save_every: config.output.save_every.max(1),
            cancel,
            summary,
            unsaved: 0,
        })
    }

    /// Replaces the extractor, e.g. to plug in another OCR backend
    pub fn with_extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    /// Runs the harvest until pagination stops or cancellation is requested
    ///
    /// The store is saved every `save-every` new items and once more before
    /// returning, also after cancellation.
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - The run finished (possibly with warnings)
    /// * `Err(HarvestError)` - The listing URL is unusable or the snapshot could not be saved
    pub async fn run(&mut self) -> Result<RunSummary, HarvestError> {
        let listing_url = Url::parse(&self.source.listing_url)?;
        let max_pages = self.options.mode.max_pages(&self.source, &self.harvest);
        info!(
            "Harvesting {} ({} mode, max pages: {}, start page: {})",
            self.source.name,
            self.options.mode.name(),
            max_pages.map_or_else(|| "unbounded".to_string(), |n| n.to_string()),
            self.options.start_page
        );

        if let Some(warm_up) = &self.source.warm_up_url {
            let url = Url::parse(warm_up)?;
            if let Err(e) = self.fetcher.warm_up(&url).await {
                self.summary.warn(format!("Warm-up fetch failed: {}", e));
            }
        }

        let mut paginator = Paginator::new(
            listing_url,
            self.source.pagination.clone(),
            PaginationLimits {
                start_page: self.options.start_page,
                max_pages,
                stale_page_limit: self.harvest.stale_page_limit,
                structural_policy: self.harvest.structural_policy,
            },
        )?;
        let mut seen = HashSet::new();

        while let Some((page, page_url)) = paginator.next_page() {
            if self.cancel.is_cancelled() {
                paginator.stop(StopReason::Cancelled);
                break;
            }

            let harvest = match self.harvest_listing(page, &page_url, &mut seen).await {
                Ok(harvest) => harvest,
                Err(e) => {
                    self.summary
                        .warn(format!("Listing page {} could not be fetched: {}", page, e));
                    paginator.stop(StopReason::FetchFailed);
                    break;
                }
            };

            self.summary.pages_fetched += 1;
            self.summary.items_discovered += harvest.found as u64;
            self.summary.items_skipped_duplicate += harvest.duplicates as u64;
            info!(
                "Listing page {}: {} item(s), {} new, {} duplicate(s)",
                page,
                harvest.found,
                harvest.fresh.len(),
                harvest.duplicates
            );
            paginator.record_page(harvest.found, harvest.fresh.len(), harvest.next_link);

            for reference in harvest.fresh {
                if self.cancel.is_cancelled() {
                    paginator.stop(StopReason::Cancelled);
                    break;
                }
                self.process_item(reference).await;
            }
        }

        self.summary.stop_reason = paginator.stop_reason();
        if let Err(e) = self.store.save() {
            error!("Failed to save snapshot for {}: {}", self.source.name, e);
            return Err(e.into());
        }
        self.unsaved = 0;

        info!(
            "Finished {}: {} new, {} duplicate(s), {} failed, stop reason: {}",
            self.source.name,
            self.summary.items_new,
            self.summary.items_skipped_duplicate,
            self.summary.items_failed,
            self.summary
                .stop_reason
                .map_or_else(|| "-".to_string(), |reason| reason.to_string())
        );
        Ok(self.summary.clone())
    }

    /// Fetches a listing page and turns it into item references
    ///
    /// Fragment-paginated listings are always rendered, since the offset
    /// never leaves the browser. Other pages without item cards are retried
    /// through the renderer when the source allows it.
    async fn harvest_listing(
        &mut self,
        page: u32,
        page_url: &Url,
        seen: &mut HashSet<ItemIdentity>,
    ) -> Result<PageHarvest, HarvestError> {
        let fragment_paged = matches!(self.source.pagination, PaginationScheme::Fragment { .. });
        let response = if fragment_paged {
            self.fetcher
                .fetch_rendered(page_url, RenderPurpose::Pagination)
                .await?
        } else {
            self.fetcher.fetch(page_url, FetchKind::Listing).await?
        };
        let mut harvest = self.listing.harvest_page(
            &response.text(),
            page_url,
            &self.store,
            seen,
            self.options.force,
        );

        if harvest.found == 0 && self.source.render_fallback && !response.rendered {
            debug!("Listing page {} has no item cards, escalating to rendered fetch", page);
            match self
                .fetcher
                .fetch_rendered(page_url, RenderPurpose::Escalation)
                .await
            {
                Ok(rendered) => {
                    harvest = self.listing.harvest_page(
                        &rendered.text(),
                        page_url,
                        &self.store,
                        seen,
                        self.options.force,
                    );
                }
                Err(e) => self.summary.warn(e.to_string()),
            }
        }

        if harvest.found == 0 {
            self.summary.warn(format!(
                "Listing page {} ({}) has no recognizable item cards",
                page, page_url
            ));
        }
        Ok(harvest)
    }

    async fn process_item(&mut self, reference: ItemReference) {
        let url = reference.url.clone();
        let item = match self.harvest_item(reference).await {
            Ok(item) => item,
            Err(e) => {
                self.summary.items_failed += 1;
                self.summary.warn(format!("Item {} failed: {}", url, e));
                return;
            }
        };

        let outcome = if self.options.force {
            self.store.merge_forced(item)
        } else {
            self.store.merge(item)
        };
        match outcome {
            MergeOutcome::Inserted | MergeOutcome::Replaced => {
                debug!("{:?} {}", outcome, url);
                self.summary.items_new += 1;
                self.unsaved += 1;
            }
            MergeOutcome::Skipped => self.summary.items_skipped_duplicate += 1,
        }

        if self.unsaved >= self.save_every {
            match self.store.save() {
                Ok(()) => {
                    debug!("Checkpoint: snapshot saved with {} item(s)", self.store.len());
                    self.unsaved = 0;
                }
                Err(e) => {
                    error!("Checkpoint save failed: {}", e);
                    self.summary
                        .warnings
                        .push(format!("Checkpoint save failed: {}", e));
                }
            }
        }
    }

    /// Fetches, extracts and assembles one item
    async fn harvest_item(&mut self, reference: ItemReference) -> Result<HarvestedItem, HarvestError> {
        let response = self.fetcher.fetch(&reference.url, FetchKind::Item).await?;
        let kind = MediaKind::detect(response.content_type.as_deref(), &response.url, &response.body);

        let extractor = Arc::clone(&self.extractor);
        let page_url = response.url.clone();
        let page = tokio::task::spawn_blocking(move || {
            extractor.extract_item(&response.body, kind, &page_url)
        })
        .await
        .map_err(|e| HarvestError::Task(e.to_string()))??;

        let mut attachments = Vec::new();
        let mut related_links = Vec::new();
        for link in &page.document.links {
            let Ok(link_url) = Url::parse(link) else {
                continue;
            };
            if has_extension(&link_url, &self.source.attachment_extensions) {
                attachments.push(self.harvest_attachment(&link_url).await);
            } else if link_url != reference.url {
                related_links.push(link.clone());
            }
        }
        if let Some(limit) = self.source.max_related_links {
            related_links.truncate(limit);
        }

        let published_date = reference
            .listing_date
            .as_deref()
            .and_then(|text| parse_date(text, &self.source.date_formats))
            .or_else(|| {
                page.date_text
                    .as_deref()
                    .and_then(|text| parse_date(text, &self.source.date_formats))
            });

        let title = page
            .title
            .or(reference.listing_title)
            .unwrap_or_default();

        debug!(
            "Harvested {} ({} chars, {} attachment(s))",
            reference.url,
            page.document.text.chars().count(),
            attachments.len()
        );

        Ok(HarvestedItem {
            identity: reference.identity,
            title,
            published_date,
            scraped_at: Utc::now(),
            body_text: page.document.text,
            related_links,
            images: page.document.images,
            attachments,
            source_page: reference.url.to_string(),
            extra: reference.extra,
        })
    }

    /// Fetches and extracts one attachment; failures are recorded, not raised
    async fn harvest_attachment(&mut self, url: &Url) -> AttachmentExtract {
        let attachment = match self.fetcher.fetch(url, FetchKind::Asset).await {
            Ok(response) => self.extract_attachment(response).await,
            Err(e) => AttachmentExtract::failed(
                url.as_str(),
                MediaKind::detect(None, url, &[]),
                ExtractionError::FetchFailure(e.to_string()),
            ),
        };

        if let Some(e) = &attachment.extraction_error {
            self.summary.attachments_failed += 1;
            self.summary
                .warn(format!("Attachment {} failed: {}", attachment.source_url, e));
        }
        attachment
    }

    async fn extract_attachment(&self, response: RawResponse) -> AttachmentExtract {
        let extractor = Arc::clone(&self.extractor);
        let url = response.url.clone();
        let result = tokio::task::spawn_blocking(move || {
            extractor.extract_attachment(&response.url, response.content_type.as_deref(), &response.body)
        })
        .await;

        match result {
            Ok(attachment) => attachment,
            Err(e) => AttachmentExtract::failed(
                url.as_str(),
                MediaKind::Unknown,
                ExtractionError::ParseFailure(format!("extraction task failed: {}", e)),
            ),
        }
    }

    /// Summary of the run so far
    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

/// Harvests one source with its own client and snapshot
///
/// Records the run in the ledger and writes the CSV export and quality report
/// when they are enabled.
///
/// # Arguments
///
/// * `config` - The full configuration
/// * `source` - The source to harvest
/// * `options` - Run mode, start page and force flag
/// * `cancel` - Cancellation token shared by all sources
/// * `ledger` - Run ledger, if one is kept
/// * `config_hash` - Hash of the configuration file, stored with the run
pub async fn run_source(
    config: Arc<Config>,
    source: SourceConfig,
    options: RunOptions,
    cancel: CancellationToken,
    ledger: Option<Arc<Mutex<RunLedger>>>,
    config_hash: String,
) -> Result<RunSummary, HarvestError> {
    let snapshot_path = config.output.snapshot_path(&source.name);
    let store = SnapshotStore::open(&snapshot_path)?;
    if let Some(quarantined) = store.quarantined() {
        warn!(
            "Corrupt snapshot for {} moved to {}; starting from an empty store",
            source.name,
            quarantined.display()
        );
    }

    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(&config.fetch)?);
    let mut harvester = Harvester::new(&config, &source, fetcher, store, options, cancel)?;

    let run_id = match &ledger {
        Some(ledger) => Some(with_ledger(ledger, |ledger| {
            ledger.start_run(&source.name, &config_hash, options.mode.name())
        })?),
        None => None,
    };

    let result = harvester.run().await;

    if let (Some(ledger), Some(run_id)) = (&ledger, run_id) {
        let status = match &result {
            Ok(summary) if summary.stop_reason == Some(StopReason::Cancelled) => {
                RunStatus::Interrupted
            }
            Ok(_) => RunStatus::Completed,
            Err(_) => RunStatus::Failed,
        };
        let summary = harvester.summary().clone();
        if let Err(e) = with_ledger(ledger, |ledger| ledger.finish_run(run_id, status, &summary)) {
            warn!("Failed to record run {} in the ledger: {}", run_id, e);
        }
    }

    let summary = result?;
    let items = harvester.store().items();

    if config.output.export_csv {
        let path = config.output.csv_path(&source.name);
        match export_csv(&items, &path) {
            Ok(()) => debug!("CSV export written to {}", path.display()),
            Err(e) => warn!("CSV export for {} failed: {}", source.name, e),
        }
    }

    if config.output.quality_report {
        let path = config.output.quality_report_path(&source.name);
        let report = QualityReport::from_items(&source.name, &items, config.harvest.clean_min_chars);
        match report.write(&path) {
            Ok(()) => info!(
                "Quality score for {}: {:.1} ({} item(s))",
                source.name, report.quality_score, report.total_items
            ),
            Err(e) => warn!("Quality report for {} failed: {}", source.name, e),
        }
    }

    Ok(summary)
}

/// Harvests several sources, at most `max-concurrent-sources` at a time
///
/// # Returns
///
/// One result per source, in the order given
pub async fn harvest_sources(
    config: Arc<Config>,
    sources: Vec<SourceConfig>,
    options: RunOptions,
    cancel: CancellationToken,
    ledger: Option<Arc<Mutex<RunLedger>>>,
    config_hash: String,
) -> Vec<(String, Result<RunSummary, HarvestError>)> {
    let semaphore = Arc::new(Semaphore::new(config.harvest.max_concurrent_sources.max(1)));

    let handles: Vec<_> = sources
        .into_iter()
        .map(|source| {
            let name = source.name.clone();
            let span = tracing::info_span!("source", name = %source.name);
            let task = {
                let config = Arc::clone(&config);
                let semaphore = Arc::clone(&semaphore);
                let cancel = cancel.clone();
                let ledger = ledger.clone();
                let config_hash = config_hash.clone();
                async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| HarvestError::Task(e.to_string()))?;
                    run_source(config, source, options, cancel, ledger, config_hash).await
                }
            };
            (name, tokio::spawn(task.instrument(span)))
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (name, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(HarvestError::Task(e.to_string())),
        };
        if let Err(e) = &result {
            error!("Harvest of {} failed: {}", name, e);
        }
        results.push((name, result));
    }
    results
}

fn with_ledger<T>(
    ledger: &Mutex<RunLedger>,
    f: impl FnOnce(&mut RunLedger) -> Result<T, StorageError>,
) -> Result<T, StorageError> {
    let mut guard = ledger
        .lock()
        .map_err(|_| StorageError::Database("run ledger lock poisoned".to_string()))?;
    f(&mut guard)
}
