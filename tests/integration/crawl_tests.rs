//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for an issue tracker and run the full
//! crawl cycle end-to-end: listing, fetching, JSONL output and saved progress.

use crawl_ledger::config::Config;
use crawl_ledger::crawler::{open_store, run_crawl, run_crawl_with_store, ProducerState};
use crawl_ledger::output::output_file_stats;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration for project `TEST` against `base_url`
fn create_test_config(base_url: &str, dir: &Path, backend: &str) -> Config {
    let content = format!(
        r#"
partitions = ["TEST"]

[crawler]
worker-count = 2
queue-capacity = 10
poll-timeout-ms = 50
backpressure-pause-ms = 10
listing-retry-pause-ms = 10
max-listing-failures = 2
monitor-interval-ms = 10
shutdown-timeout-secs = 5

[rate-limit]
min-interval-ms = 1
max-interval-ms = 10

[source]
base-url = "{}"
page-size = 2
max-retries = 1
request-timeout-secs = 5
user-agent = "crawl-ledger-test/0.1"

[state]
directory = '{}'
backend = "{}"

[output]
directory = '{}'
"#,
        base_url,
        dir.join("state").display(),
        backend,
        dir.join("output").display()
    );
    toml::from_str(&content).expect("Failed to parse test config")
}

fn issue_page(key: &str, summary: &str) -> String {
    format!(
        r#"<html><body>
        <h1 id="summary-val">{summary}</h1>
        <div id="description-val">Details for {key}</div>
        <span id="status-val">Open</span>
        <span id="priority-val">Minor</span>
        </body></html>"#
    )
}

fn listing_page(keys: &[&str]) -> String {
    let rows: String = keys
        .iter()
        .map(|key| format!(r#"<tr><td><a href="/browse/{key}">{key}</a></td></tr>"#))
        .collect();
    format!("<html><body><table>{}</table></body></html>", rows)
}

/// Mounts listing pages `[TEST-1, TEST-2]`, `[TEST-3]`, an empty page at 3 and issue pages for all three
///
/// `expected_fetches` gives how often each issue page must be requested.
async fn mount_tracker(server: &MockServer, expected_fetches: [u64; 3]) {
    Mock::given(method("GET"))
        .and(path("/issues/"))
        .and(query_param("jql", "project=TEST"))
        .and(query_param("startIndex", "0"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(listing_page(&["TEST-1", "TEST-2"])),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/issues/"))
        .and(query_param("startIndex", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&["TEST-3"])))
        .mount(server)
        .await;

    // A resumed crawl lists from the cursor after the short page
    Mock::given(method("GET"))
        .and(path("/issues/"))
        .and(query_param("startIndex", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&[])))
        .mount(server)
        .await;

    for (i, expected) in expected_fetches.iter().enumerate() {
        let key = format!("TEST-{}", i + 1);
        Mock::given(method("GET"))
            .and(path(format!("/browse/{}", key)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(issue_page(&key, &format!("Problem number {}", i + 1))),
            )
            .expect(*expected)
            .mount(server)
            .await;
    }
}

fn output_lines(dir: &Path) -> u64 {
    output_file_stats(&dir.join("output"))
        .expect("Failed to read output directory")
        .iter()
        .map(|file| file.lines)
        .sum()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_crawl_single_partition() {
    let mock_server = MockServer::start().await;
    mount_tracker(&mock_server, [1, 1, 1]).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), dir.path(), "files");

    let report = run_crawl(&config, std::future::pending())
        .await
        .expect("Crawl failed");

    assert!(report.is_complete());
    assert_eq!(report.items_processed, 3);
    assert_eq!(report.items_failed, 0);
    assert_eq!(
        report.partitions,
        vec![("TEST".to_string(), ProducerState::Exhausted)]
    );

    // Three tasks per issue without comments
    assert_eq!(output_lines(dir.path()), 9);

    let store = open_store(&config).unwrap();
    let state = store.state("TEST").await.unwrap();
    assert_eq!(state.cursor, 3);
    assert_eq!(state.processed_count, 3);
    assert!(store.is_processed("TEST", "TEST-2").await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_second_run_does_not_refetch() {
    let mock_server = MockServer::start().await;
    mount_tracker(&mock_server, [1, 1, 1]).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), dir.path(), "sqlite");

    let first = run_crawl(&config, std::future::pending()).await.unwrap();
    assert_eq!(first.items_processed, 3);

    // Resumes at cursor 3, where the listing is empty
    let second = run_crawl(&config, std::future::pending()).await.unwrap();
    assert!(second.is_complete());
    assert_eq!(
        second.partitions,
        vec![("TEST".to_string(), ProducerState::Exhausted)]
    );
    assert_eq!(second.items_processed, 0);

    let store = open_store(&config).unwrap();
    assert_eq!(store.processed_count("TEST").await.unwrap(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_resume_after_interruption_skips_committed_items() {
    let mock_server = MockServer::start().await;
    // TEST-1 was committed before the interruption and must not be fetched again
    mount_tracker(&mock_server, [0, 1, 1]).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), dir.path(), "files");

    {
        // Interrupted after committing TEST-1 but before the cursor moved
        let store = open_store(&config).unwrap();
        assert!(store.try_commit("TEST", "TEST-1").await.unwrap());
    }

    let store = Arc::new(open_store(&config).unwrap());
    let report = run_crawl_with_store(&config, Arc::clone(&store), std::future::pending())
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.items_processed, 2);
    assert_eq!(store.processed_count("TEST").await.unwrap(), 3);
    assert_eq!(store.get_cursor("TEST").await.unwrap(), 3);
    assert_eq!(output_lines(dir.path()), 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reset_then_recrawl() {
    let mock_server = MockServer::start().await;
    mount_tracker(&mock_server, [2, 2, 2]).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), dir.path(), "files");

    run_crawl(&config, std::future::pending()).await.unwrap();

    let store = open_store(&config).unwrap();
    store.reset("TEST").await.unwrap();
    let state = store.state("TEST").await.unwrap();
    assert!(state.is_fresh());
    drop(store);

    let report = run_crawl(&config, std::future::pending()).await.unwrap();
    assert_eq!(report.items_processed, 3);

    let store = open_store(&config).unwrap();
    assert_eq!(store.processed_count("TEST").await.unwrap(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_broken_item_is_abandoned_and_crawl_completes() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/issues/"))
        .and(query_param("startIndex", "0"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(listing_page(&["TEST-1", "TEST-2"])),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/issues/"))
        .and(query_param("startIndex", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&[])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/browse/TEST-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(issue_page("TEST-1", "Fine")))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/browse/TEST-2"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), dir.path(), "files");

    let report = run_crawl(&config, std::future::pending()).await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.items_processed, 1);
    assert_eq!(report.items_failed, 1);

    let store = open_store(&config).unwrap();
    assert!(store.is_processed("TEST", "TEST-1").await.unwrap());
    assert!(!store.is_processed("TEST", "TEST-2").await.unwrap());
}
