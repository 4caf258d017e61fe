//! Integration tests for the harvester
//!
//! These tests use wiremock to serve listing pages, item pages and attachments
//! and run the full harvest cycle end-to-end.

mod common;

use async_trait::async_trait;
use common::*;
use notice_harvester::crawler::{
    run_source, FetchError, FetchKind, Fetcher, Harvester, HttpFetcher, RawResponse,
    RecordingSleeper, RenderPurpose, Renderer, RunMode, RunOptions,
};
use notice_harvester::extract::{ExtractionError, MediaKind};
use notice_harvester::state::StopReason;
use notice_harvester::storage::{ItemStore, RunLedger, RunStatus, SnapshotStore};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn one_page() -> RunOptions {
    RunOptions {
        mode: RunMode::Incremental { max_pages: Some(1) },
        ..RunOptions::default()
    }
}

#[tokio::test]
async fn test_known_items_are_never_fetched() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let config = test_config(&server.uri(), temp.path(), "");
    let source = &config.sources[0];

    let ids: Vec<u32> = (1..=10).collect();
    mount_listing(&server, 0, &ids).await;
    let known = [2, 5, 9];
    for id in &ids {
        let calls = if known.contains(id) { 0 } else { 1 };
        mount_item(&server, *id, "", calls).await;
    }

    let mut store = SnapshotStore::open(&config.output.snapshot_path("test")).unwrap();
    for id in known {
        store.merge(known_item(&server.uri(), id));
    }

    let sleeper = RecordingSleeper::new();
    let fetcher = Arc::new(test_fetcher(&config, &sleeper));
    let mut harvester = Harvester::new(
        &config,
        source,
        fetcher,
        store,
        one_page(),
        CancellationToken::new(),
    )
    .unwrap();

    let summary = harvester.run().await.unwrap();
    assert_eq!(summary.pages_fetched, 1);
    assert_eq!(summary.items_discovered, 10);
    assert_eq!(summary.items_new, 7);
    assert_eq!(summary.items_skipped_duplicate, 3);
    assert_eq!(summary.items_failed, 0);
    assert_eq!(summary.stop_reason, Some(StopReason::MaxPages));
    assert_eq!(harvester.store().len(), 10);

    let item = harvester
        .store()
        .items()
        .into_iter()
        .find(|item| item.source_page.ends_with("/news/item-1"))
        .cloned()
        .unwrap();
    assert_eq!(item.title, "Notice 1 in full");
    assert_eq!(
        item.published_date,
        chrono::NaiveDate::from_ymd_opt(2024, 6, 2)
    );
    assert!(item.body_text.contains("prudential requirements"));
    assert!(!item.body_text.contains("Copyright"));
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let config = test_config(&server.uri(), temp.path(), "");
    let source = &config.sources[0];
    let snapshot = config.output.snapshot_path("test");

    mount_listing(&server, 0, &[1, 2, 3]).await;
    for id in 1..=3 {
        mount_item(&server, id, "", 1).await;
    }

    let sleeper = RecordingSleeper::new();
    let mut first_bytes = Vec::new();
    for run in 0..2 {
        let store = SnapshotStore::open(&snapshot).unwrap();
        let fetcher = Arc::new(test_fetcher(&config, &sleeper));
        let mut harvester = Harvester::new(
            &config,
            source,
            fetcher,
            store,
            one_page(),
            CancellationToken::new(),
        )
        .unwrap();
        let summary = harvester.run().await.unwrap();

        if run == 0 {
            assert_eq!(summary.items_new, 3);
            first_bytes = std::fs::read(&snapshot).unwrap();
        } else {
            assert_eq!(summary.items_new, 0);
            assert_eq!(summary.items_skipped_duplicate, 3);
            assert_eq!(std::fs::read(&snapshot).unwrap(), first_bytes);
        }
    }
}

#[tokio::test]
async fn test_blocked_listing_is_a_warning() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let config = test_config(&server.uri(), temp.path(), "");
    let source = &config.sources[0];

    Mock::given(method("GET"))
        .and(path("/news"))
        .respond_with(ResponseTemplate::new(403))
        .expect(3)
        .mount(&server)
        .await;

    let snapshot = config.output.snapshot_path("test");
    let store = SnapshotStore::open(&snapshot).unwrap();
    let sleeper = RecordingSleeper::new();
    let fetcher = Arc::new(test_fetcher(&config, &sleeper));
    let mut harvester = Harvester::new(
        &config,
        source,
        fetcher,
        store,
        RunOptions::default(),
        CancellationToken::new(),
    )
    .unwrap();

    let summary = harvester.run().await.unwrap();
    assert_eq!(summary.stop_reason, Some(StopReason::FetchFailed));
    assert_eq!(summary.pages_fetched, 0);
    assert!(summary.warnings.iter().any(|w| w.contains("Blocked")));
    assert!(snapshot.exists());
    assert_eq!(
        sleeper.delays(),
        vec![
            Duration::ZERO,
            Duration::from_millis(1),
            Duration::from_millis(2)
        ]
    );
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let config = test_config(&server.uri(), temp.path(), "");
    let source = &config.sources[0];

    Mock::given(method("GET"))
        .and(path("/news"))
        .and(query_param("page", "0"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_listing(&server, 0, &[1]).await;
    mount_item(&server, 1, "", 1).await;

    let store = SnapshotStore::open(&config.output.snapshot_path("test")).unwrap();
    let sleeper = RecordingSleeper::new();
    let fetcher = Arc::new(test_fetcher(&config, &sleeper));
    let mut harvester = Harvester::new(
        &config,
        source,
        fetcher,
        store,
        one_page(),
        CancellationToken::new(),
    )
    .unwrap();

    let summary = harvester.run().await.unwrap();
    assert_eq!(summary.items_new, 1);
    assert!(summary.warnings.is_empty());
    assert!(sleeper.delays().contains(&Duration::from_millis(1)));
}

#[tokio::test]
async fn test_missing_item_fails_without_retry() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let config = test_config(&server.uri(), temp.path(), "");
    let source = &config.sources[0];

    mount_listing(&server, 0, &[1, 2]).await;
    Mock::given(method("GET"))
        .and(path("/news/item-1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    mount_item(&server, 2, "", 1).await;

    let store = SnapshotStore::open(&config.output.snapshot_path("test")).unwrap();
    let sleeper = RecordingSleeper::new();
    let fetcher = Arc::new(test_fetcher(&config, &sleeper));
    let mut harvester = Harvester::new(
        &config,
        source,
        fetcher,
        store,
        one_page(),
        CancellationToken::new(),
    )
    .unwrap();

    let summary = harvester.run().await.unwrap();
    assert_eq!(summary.items_failed, 1);
    assert_eq!(summary.items_new, 1);
    assert_eq!(harvester.store().len(), 1);
}

#[tokio::test]
async fn test_attachment_failure_keeps_the_item() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let config = test_config(&server.uri(), temp.path(), "max-related-links = 1");
    let source = &config.sources[0];

    mount_listing(&server, 0, &[1]).await;
    mount_item(
        &server,
        1,
        r#"<p>See <a href="/files/broken.pdf">the notice</a>,
           <a href="/files/rates.csv">the rates</a>,
           <a href="/files/missing.xlsx">the workbook</a>,
           <a href="/about">about us</a> and <a href="/contact">contact</a>.</p>"#,
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/files/broken.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf")
                .set_body_bytes(b"<html>not a pdf</html>".to_vec()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/rates.csv"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/csv")
                .set_body_string("Quarter,Rate\nQ1,5.50\n"),
        )
        .mount(&server)
        .await;

    let store = SnapshotStore::open(&config.output.snapshot_path("test")).unwrap();
    let sleeper = RecordingSleeper::new();
    let fetcher = Arc::new(test_fetcher(&config, &sleeper));
    let mut harvester = Harvester::new(
        &config,
        source,
        fetcher,
        store,
        one_page(),
        CancellationToken::new(),
    )
    .unwrap();

    let summary = harvester.run().await.unwrap();
    assert_eq!(summary.items_new, 1);
    assert_eq!(summary.attachments_failed, 2);

    let item = harvester.store().items()[0].clone();
    assert_eq!(item.attachments.len(), 3);
    assert_eq!(item.related_links.len(), 1);

    let broken = item
        .attachments
        .iter()
        .find(|a| a.source_url.ends_with("broken.pdf"))
        .unwrap();
    assert_eq!(broken.media_kind, MediaKind::Pdf);
    assert!(broken.text.is_empty());
    assert!(matches!(
        broken.extraction_error,
        Some(ExtractionError::ParseFailure(_))
    ));

    let missing = item
        .attachments
        .iter()
        .find(|a| a.source_url.ends_with("missing.xlsx"))
        .unwrap();
    assert!(matches!(
        missing.extraction_error,
        Some(ExtractionError::FetchFailure(_))
    ));

    let rates = item
        .attachments
        .iter()
        .find(|a| a.source_url.ends_with("rates.csv"))
        .unwrap();
    assert!(rates.extraction_error.is_none());
    assert_eq!(rates.text, "[SHEET rates]\nQuarter | Rate\nQ1 | 5.50\n[/SHEET]");
}

struct FixedRenderer {
    html: String,
}

#[async_trait]
impl Renderer for FixedRenderer {
    async fn render(&self, _url: &Url) -> Result<String, FetchError> {
        Ok(self.html.clone())
    }
}

#[tokio::test]
async fn test_empty_listing_escalates_to_renderer() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let config = test_config(&server.uri(), temp.path(), "render-fallback = true");
    let source = &config.sources[0];

    Mock::given(method("GET"))
        .and(path("/news"))
        .respond_with(html_response(
            "<html><body><div id=\"app\">Loading...</div></body></html>",
        ))
        .mount(&server)
        .await;
    mount_item(&server, 1, "", 1).await;
    mount_item(&server, 2, "", 1).await;

    let store = SnapshotStore::open(&config.output.snapshot_path("test")).unwrap();
    let sleeper = RecordingSleeper::new();
    let fetcher = test_fetcher(&config, &sleeper).with_renderer(Arc::new(FixedRenderer {
        html: listing_html(&[1, 2]),
    }));
    let mut harvester = Harvester::new(
        &config,
        source,
        Arc::new(fetcher),
        store,
        one_page(),
        CancellationToken::new(),
    )
    .unwrap();

    let summary = harvester.run().await.unwrap();
    assert_eq!(summary.items_discovered, 2);
    assert_eq!(summary.items_new, 2);
    assert!(summary.warnings.is_empty());
}

#[tokio::test]
async fn test_first_page_empty_stops_the_run() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let config = test_config(&server.uri(), temp.path(), "");
    let source = &config.sources[0];

    mount_listing(&server, 0, &[]).await;
    Mock::given(method("GET"))
        .and(path("/news"))
        .and(query_param("page", "1"))
        .respond_with(html_response(&listing_html(&[1])))
        .expect(0)
        .mount(&server)
        .await;

    let store = SnapshotStore::open(&config.output.snapshot_path("test")).unwrap();
    let sleeper = RecordingSleeper::new();
    let fetcher = Arc::new(test_fetcher(&config, &sleeper));
    let mut harvester = Harvester::new(
        &config,
        source,
        fetcher,
        store,
        RunOptions::default(),
        CancellationToken::new(),
    )
    .unwrap();

    let summary = harvester.run().await.unwrap();
    assert_eq!(summary.stop_reason, Some(StopReason::FirstPageEmpty));
    assert_eq!(summary.warnings.len(), 1);
}

#[tokio::test]
async fn test_stale_pages_end_a_full_run() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let config = test_config(&server.uri(), temp.path(), "");
    let source = &config.sources[0];

    mount_listing(&server, 0, &[1]).await;
    for page in 1..=3 {
        mount_listing(&server, page, &[1]).await;
    }
    mount_item(&server, 1, "", 1).await;

    let store = SnapshotStore::open(&config.output.snapshot_path("test")).unwrap();
    let sleeper = RecordingSleeper::new();
    let fetcher = Arc::new(test_fetcher(&config, &sleeper));
    let mut harvester = Harvester::new(
        &config,
        source,
        fetcher,
        store,
        RunOptions {
            mode: RunMode::Full,
            ..RunOptions::default()
        },
        CancellationToken::new(),
    )
    .unwrap();

    let summary = harvester.run().await.unwrap();
    assert_eq!(summary.pages_fetched, 4);
    assert_eq!(summary.items_new, 1);
    assert_eq!(summary.items_skipped_duplicate, 3);
    assert_eq!(summary.stop_reason, Some(StopReason::NoNewItems));
}

#[tokio::test]
async fn test_next_link_pagination() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let config = test_config(
        &server.uri(),
        temp.path(),
        "[source.pagination]\nscheme = \"next-link\"\nnext-selector = \"a.next\"",
    );
    let source = &config.sources[0];

    let first = listing_html(&[1, 2]).replace(
        "</main>",
        "</main><a class=\"next\" href=\"/news/archive\">Older</a>",
    );
    Mock::given(method("GET"))
        .and(path("/news"))
        .respond_with(html_response(&first))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/news/archive"))
        .respond_with(html_response(&listing_html(&[3])))
        .expect(1)
        .mount(&server)
        .await;
    for id in 1..=3 {
        mount_item(&server, id, "", 1).await;
    }

    let store = SnapshotStore::open(&config.output.snapshot_path("test")).unwrap();
    let sleeper = RecordingSleeper::new();
    let fetcher = Arc::new(test_fetcher(&config, &sleeper));
    let mut harvester = Harvester::new(
        &config,
        source,
        fetcher,
        store,
        RunOptions {
            mode: RunMode::Full,
            ..RunOptions::default()
        },
        CancellationToken::new(),
    )
    .unwrap();

    let summary = harvester.run().await.unwrap();
    assert_eq!(summary.pages_fetched, 2);
    assert_eq!(summary.items_new, 3);
    assert_eq!(summary.stop_reason, Some(StopReason::NoNextPage));

    let order: Vec<String> = harvester
        .store()
        .items()
        .iter()
        .map(|item| item.title.clone())
        .collect();
    assert_eq!(
        order,
        vec!["Notice 1 in full", "Notice 2 in full", "Notice 3 in full"]
    );
}

#[tokio::test]
async fn test_cancelled_run_fetches_nothing() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let config = test_config(&server.uri(), temp.path(), "");
    let source = &config.sources[0];

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let snapshot = config.output.snapshot_path("test");
    let store = SnapshotStore::open(&snapshot).unwrap();
    let sleeper = RecordingSleeper::new();
    let fetcher = Arc::new(test_fetcher(&config, &sleeper));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut harvester =
        Harvester::new(&config, source, fetcher, store, RunOptions::default(), cancel).unwrap();

    let summary = harvester.run().await.unwrap();
    assert_eq!(summary.stop_reason, Some(StopReason::Cancelled));
    assert!(snapshot.exists());
}

#[tokio::test]
async fn test_run_source_records_ledger_and_exports() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let config = Arc::new(test_config(&server.uri(), temp.path(), "max-pages = 1"));
    let source = config.sources[0].clone();

    mount_listing(&server, 0, &[1, 2, 3]).await;
    for id in 1..=3 {
        mount_item(&server, id, "", 1).await;
    }

    let ledger = Arc::new(Mutex::new(RunLedger::new(&config.output.ledger_path).unwrap()));
    let summary = run_source(
        Arc::clone(&config),
        source,
        RunOptions::default(),
        CancellationToken::new(),
        Some(Arc::clone(&ledger)),
        "cafebabe".to_string(),
    )
    .await
    .unwrap();
    assert_eq!(summary.items_new, 3);
    assert_eq!(summary.mode, "incremental");

    let runs = ledger.lock().unwrap().recent_runs(Some("test"), 5).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Completed);
    assert_eq!(runs[0].items_new, 3);
    assert_eq!(runs[0].config_hash, "cafebabe");
    assert_eq!(runs[0].stop_reason, Some(StopReason::MaxPages));

    let csv = std::fs::read_to_string(config.output.csv_path("test")).unwrap();
    assert_eq!(csv.lines().filter(|line| line.contains("/news/item-")).count(), 3);

    let report: serde_json::Value = serde_json::from_slice(
        &std::fs::read(config.output.quality_report_path("test")).unwrap(),
    )
    .unwrap();
    assert_eq!(report["total_items"], 3);
    assert_eq!(report["items_with_dates"], 3);
}

/// Renderer standing in for a browser running a fragment-driven listing script
struct FragmentListingRenderer {
    pages: Vec<(&'static str, Vec<u32>)>,
    rendered: Mutex<Vec<Url>>,
}

#[async_trait]
impl Renderer for FragmentListingRenderer {
    async fn render(&self, url: &Url) -> Result<String, FetchError> {
        self.rendered.lock().unwrap().push(url.clone());
        let ids = self
            .pages
            .iter()
            .find(|(fragment, _)| url.fragment() == Some(*fragment))
            .map(|(_, ids)| ids.clone())
            .unwrap_or_default();
        Ok(listing_html(&ids))
    }
}

#[tokio::test]
async fn test_fragment_pages_are_rendered() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let config = test_config_with(
        &server.uri(),
        temp.path(),
        "render-command = \"browser --dump-dom\"\nmax-render-escalations = 0",
        "[source.pagination]\nscheme = \"fragment\"\ntemplate = \"first={offset}\"\nstep = 10",
    );
    let source = &config.sources[0];

    Mock::given(method("GET"))
        .and(path("/news"))
        .respond_with(html_response(&listing_html(&[1, 2])))
        .expect(0)
        .mount(&server)
        .await;
    for id in 1..=3 {
        mount_item(&server, id, "", 1).await;
    }

    let renderer = Arc::new(FragmentListingRenderer {
        pages: vec![("first=0", vec![1, 2]), ("first=10", vec![3])],
        rendered: Mutex::new(Vec::new()),
    });
    let store = SnapshotStore::open(&config.output.snapshot_path("test")).unwrap();
    let sleeper = RecordingSleeper::new();
    let fetcher = test_fetcher(&config, &sleeper).with_renderer(renderer.clone());
    let mut harvester = Harvester::new(
        &config,
        source,
        Arc::new(fetcher),
        store,
        RunOptions {
            mode: RunMode::Incremental { max_pages: Some(2) },
            ..RunOptions::default()
        },
        CancellationToken::new(),
    )
    .unwrap();

    let summary = harvester.run().await.unwrap();
    assert_eq!(summary.pages_fetched, 2);
    assert_eq!(summary.items_discovered, 3);
    assert_eq!(summary.items_new, 3);
    assert_eq!(summary.stop_reason, Some(StopReason::MaxPages));
    assert!(summary.warnings.is_empty());

    let fragments: Vec<Option<String>> = renderer
        .rendered
        .lock()
        .unwrap()
        .iter()
        .map(|url| url.fragment().map(str::to_string))
        .collect();
    assert_eq!(
        fragments,
        vec![Some("first=0".to_string()), Some("first=10".to_string())]
    );
}

/// Fetcher that notes how many items the snapshot file held before each item fetch
struct SnapshotWatcher {
    inner: HttpFetcher,
    snapshot: PathBuf,
    counts: Mutex<Vec<usize>>,
}

impl SnapshotWatcher {
    fn saved_items(&self) -> usize {
        std::fs::read(&self.snapshot)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<Vec<serde_json::Value>>(&bytes).ok())
            .map_or(0, |items| items.len())
    }
}

#[async_trait]
impl Fetcher for SnapshotWatcher {
    async fn fetch(&self, url: &Url, kind: FetchKind) -> Result<RawResponse, FetchError> {
        if kind == FetchKind::Item {
            let saved = self.saved_items();
            self.counts.lock().unwrap().push(saved);
        }
        self.inner.fetch(url, kind).await
    }

    async fn fetch_rendered(
        &self,
        url: &Url,
        purpose: RenderPurpose,
    ) -> Result<RawResponse, FetchError> {
        self.inner.fetch_rendered(url, purpose).await
    }
}

#[tokio::test]
async fn test_snapshot_is_checkpointed_during_the_run() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let config = test_config(&server.uri(), temp.path(), "");
    let source = &config.sources[0];
    let snapshot = config.output.snapshot_path("test");
    assert_eq!(config.output.save_every, 2);

    mount_listing(&server, 0, &[1, 2, 3, 4, 5]).await;
    for id in 1..=5 {
        mount_item(&server, id, "", 1).await;
    }

    let sleeper = RecordingSleeper::new();
    let watcher = Arc::new(SnapshotWatcher {
        inner: test_fetcher(&config, &sleeper),
        snapshot: snapshot.clone(),
        counts: Mutex::new(Vec::new()),
    });
    let store = SnapshotStore::open(&snapshot).unwrap();
    let mut harvester = Harvester::new(
        &config,
        source,
        watcher.clone(),
        store,
        one_page(),
        CancellationToken::new(),
    )
    .unwrap();

    let summary = harvester.run().await.unwrap();
    assert_eq!(summary.items_new, 5);
    assert_eq!(*watcher.counts.lock().unwrap(), vec![0, 0, 2, 2, 4]);
    assert_eq!(watcher.saved_items(), 5);
}

#[tokio::test]
async fn test_warm_up_precedes_the_listing() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let config = test_config(
        &server.uri(),
        temp.path(),
        &format!("warm-up-url = \"{}/start\"", server.uri()),
    );
    let source = &config.sources[0];

    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(
            html_response("<html><body>Welcome</body></html>")
                .insert_header("set-cookie", "session=abc123; Path=/"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/news"))
        .and(header("cookie", "session=abc123"))
        .respond_with(html_response(&listing_html(&[1])))
        .expect(1)
        .mount(&server)
        .await;
    mount_item(&server, 1, "", 1).await;

    let store = SnapshotStore::open(&config.output.snapshot_path("test")).unwrap();
    let sleeper = RecordingSleeper::new();
    let fetcher = Arc::new(test_fetcher(&config, &sleeper));
    let mut harvester = Harvester::new(
        &config,
        source,
        fetcher,
        store,
        one_page(),
        CancellationToken::new(),
    )
    .unwrap();

    let summary = harvester.run().await.unwrap();
    assert_eq!(summary.items_new, 1);
    assert!(summary.warnings.is_empty());

    let requests = server.received_requests().await.unwrap();
    let paths: Vec<&str> = requests.iter().map(|request| request.url.path()).collect();
    assert_eq!(paths, vec!["/start", "/news", "/news/item-1"]);
}

#[tokio::test]
async fn test_failed_warm_up_is_a_warning() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let config = test_config(
        &server.uri(),
        temp.path(),
        &format!("warm-up-url = \"{}/start\"", server.uri()),
    );
    let source = &config.sources[0];

    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    mount_listing(&server, 0, &[1]).await;
    mount_item(&server, 1, "", 1).await;

    let store = SnapshotStore::open(&config.output.snapshot_path("test")).unwrap();
    let sleeper = RecordingSleeper::new();
    let fetcher = Arc::new(test_fetcher(&config, &sleeper));
    let mut harvester = Harvester::new(
        &config,
        source,
        fetcher,
        store,
        one_page(),
        CancellationToken::new(),
    )
    .unwrap();

    let summary = harvester.run().await.unwrap();
    assert_eq!(summary.items_new, 1);
    assert_eq!(summary.warnings.len(), 1);
    assert!(summary.warnings[0].starts_with("Warm-up fetch failed"));
}

#[tokio::test]
async fn test_run_resumes_from_start_page() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let config = test_config(&server.uri(), temp.path(), "");
    let source = &config.sources[0];

    Mock::given(method("GET"))
        .and(path("/news"))
        .and(query_param("page", "0"))
        .respond_with(html_response(&listing_html(&[1])))
        .expect(0)
        .mount(&server)
        .await;
    mount_listing(&server, 2, &[7, 8]).await;
    mount_item(&server, 7, "", 1).await;
    mount_item(&server, 8, "", 1).await;

    let store = SnapshotStore::open(&config.output.snapshot_path("test")).unwrap();
    let sleeper = RecordingSleeper::new();
    let fetcher = Arc::new(test_fetcher(&config, &sleeper));
    let mut harvester = Harvester::new(
        &config,
        source,
        fetcher,
        store,
        RunOptions {
            start_page: 2,
            ..one_page()
        },
        CancellationToken::new(),
    )
    .unwrap();

    let summary = harvester.run().await.unwrap();
    assert_eq!(summary.pages_fetched, 1);
    assert_eq!(summary.items_new, 2);
    assert_eq!(summary.stop_reason, Some(StopReason::MaxPages));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests[0].url.query(), Some("page=2"));
}
