//! Shared helpers for the integration tests

#![allow(dead_code)]

use notice_harvester::config::{parse_config, Config, IdentityMode};
use notice_harvester::crawler::{BackoffPolicy, HttpFetcher, RecordingSleeper};
use notice_harvester::storage::{HarvestedItem, ItemIdentity};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Configuration with one source named `test` served by `server`
///
/// `source_extra` is inserted into the `[[source]]` table before its selectors.
pub fn test_config(server: &str, data_dir: &Path, source_extra: &str) -> Config {
    test_config_with(server, data_dir, "", source_extra)
}

/// Like [`test_config`], with `fetch_extra` appended to the `[fetch]` table
pub fn test_config_with(
    server: &str,
    data_dir: &Path,
    fetch_extra: &str,
    source_extra: &str,
) -> Config {
    let toml = format!(
        r#"
[fetch]
min-delay-ms = 0
max-delay-ms = 0
backoff-base-ms = 1
backoff-max-ms = 4
jitter = false
{fetch_extra}

[output]
data-dir = '{data}'
ledger-path = '{data}/runs.db'
save-every = 2

[[source]]
name = "test"
base-url = "{server}"
listing-url = "{server}/news"
{extra}

[source.selectors]
item = "div.card"
link = "a"
title = "h3"
date = "time"
content = ["main"]
"#,
        data = data_dir.display(),
        server = server,
        extra = source_extra,
        fetch_extra = fetch_extra,
    );
    parse_config(&toml).expect("test config should be valid")
}

/// Fetcher that records delays instead of sleeping
pub fn test_fetcher(config: &Config, sleeper: &RecordingSleeper) -> HttpFetcher {
    HttpFetcher::new(&config.fetch)
        .expect("fetcher should build")
        .with_sleeper(Arc::new(sleeper.clone()))
        .with_policy(BackoffPolicy {
            max_attempts: 3,
            base: Duration::from_millis(1),
            max: Duration::from_millis(4),
            jitter: false,
        })
}

/// A listing page with one card per item id
pub fn listing_html(ids: &[u32]) -> String {
    let cards: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<div class="card">
                     <h3>Notice {id}</h3>
                     <time datetime="2024-06-{day:02}">{day} June 2024</time>
                     <a href="/news/item-{id}">Read more</a>
                   </div>"#,
                id = id,
                day = (id % 28) + 1
            )
        })
        .collect();
    format!(
        "<html><body><main><h1>News</h1>{}</main></body></html>",
        cards
    )
}

/// An item page with a heading, two paragraphs and optional extra markup
pub fn item_html(id: u32, extra: &str) -> String {
    format!(
        r#"<html><head><title>Item {id}</title></head><body>
           <nav><a href="/">Home</a></nav>
           <main>
             <h1>Notice {id} in full</h1>
             <p>The Reserve Bank today published notice {id} on prudential requirements.</p>
             <p>Supervised entities should review the attached material carefully.</p>
             {extra}
           </main>
           <footer>Copyright</footer>
         </body></html>"#,
        id = id,
        extra = extra
    )
}

pub async fn mount_listing(server: &MockServer, page: u32, ids: &[u32]) {
    Mock::given(method("GET"))
        .and(path("/news"))
        .and(query_param("page", page.to_string()))
        .respond_with(html_response(&listing_html(ids)))
        .mount(server)
        .await;
}

pub async fn mount_item(server: &MockServer, id: u32, extra: &str, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/news/item-{}", id)))
        .respond_with(html_response(&item_html(id, extra)))
        .expect(expected_calls)
        .mount(server)
        .await;
}

pub fn html_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(body)
}

/// A stored item as an earlier run would have left it
pub fn known_item(server: &str, id: u32) -> HarvestedItem {
    let url = Url::parse(&format!("{}/news/item-{}", server, id)).expect("valid item URL");
    HarvestedItem {
        identity: ItemIdentity::derive(&url, None, IdentityMode::Url, false)
            .expect("identity should derive"),
        title: format!("Notice {}", id),
        published_date: None,
        scraped_at: chrono::Utc::now(),
        body_text: "Stored earlier".to_string(),
        related_links: Vec::new(),
        images: Vec::new(),
        attachments: Vec::new(),
        source_page: url.to_string(),
        extra: BTreeMap::new(),
    }
}
