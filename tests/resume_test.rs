//! Interrupt and resume behavior: the checkpoint written after the last
//! completed item must let a second process finish the crawl with the
//! same final result as an uninterrupted run.

use apteka::config::Config;
use apteka::crawler::CrawlOrchestrator;
use apteka::error::{CrawlerError, StorageError};
use apteka::models::RunState;
use apteka::storage::SqliteStore;
use std::collections::BTreeSet;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PRODUCTS_PER_CATEGORY: usize = 5;

fn html(body: String, delay_ms: u64) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .set_delay(Duration::from_millis(delay_ms))
}

/// Two categories with five products each, every page answering slowly
/// enough that a pause lands mid-run.
async fn mount_slow_site(server: &MockServer, delay_ms: u64) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<a href="/cat/a">A</a> <a href="/cat/b">B</a>"#.to_string(),
            delay_ms,
        ))
        .mount(server)
        .await;

    for cat in ["a", "b"] {
        let cards: String = (0..PRODUCTS_PER_CATEGORY)
            .map(|i| format!(r#"<div><a href="/p/{cat}{i}">Item {cat}{i}</a> <span>Rs. 1{i}0</span></div>"#))
            .collect();
        Mock::given(method("GET"))
            .and(path(format!("/cat/{cat}")))
            .respond_with(html(cards, delay_ms))
            .mount(server)
            .await;

        for i in 0..PRODUCTS_PER_CATEGORY {
            Mock::given(method("GET"))
                .and(path(format!("/p/{cat}{i}")))
                .respond_with(html(
                    format!(r#"<h1>Item {cat}{i}</h1> <p>SKU: {cat}{i}</p> <p>Rs. 1{i}0</p>"#),
                    delay_ms,
                ))
                .mount(server)
                .await;
        }
    }
}

fn config_for(server: &MockServer, dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.crawler.base_url = server.uri();
    config.crawler.delay_secs = 0.0;
    config.crawler.workers = 1;
    config.output.output_dir = dir.path().to_path_buf();
    config
}

fn product_skus(config: &Config) -> BTreeSet<String> {
    let store = SqliteStore::open(config.database_path()).unwrap();
    store
        .products()
        .unwrap()
        .into_iter()
        .filter_map(|p| p.sku)
        .collect()
}

#[tokio::test]
async fn paused_run_resumes_to_the_same_result() {
    let server = MockServer::start().await;
    mount_slow_site(&server, 40).await;

    // reference: one uninterrupted run
    let reference_dir = TempDir::new().unwrap();
    let reference_config = config_for(&server, &reference_dir);
    let summary = CrawlOrchestrator::new(reference_config.clone(), false)
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(
        summary.products_extracted,
        (2 * PRODUCTS_PER_CATEGORY) as u64
    );
    let reference_skus = product_skus(&reference_config);

    // interrupted run: pause mid-flight, then resume from the checkpoint
    let dir = TempDir::new().unwrap();
    let config = config_for(&server, &dir);
    let orchestrator = CrawlOrchestrator::new(config.clone(), false).unwrap();
    let pause = orchestrator.pause_handle();
    let run = tokio::spawn(orchestrator.run());
    tokio::time::sleep(Duration::from_millis(150)).await;
    pause.pause();
    let paused_summary = run.await.unwrap().unwrap();

    if paused_summary.state == RunState::Paused {
        assert!(config.checkpoint_path().exists());
        assert!(paused_summary.products_extracted < (2 * PRODUCTS_PER_CATEGORY) as u64);

        let resumed_summary = CrawlOrchestrator::new(config.clone(), true)
            .unwrap()
            .run()
            .await
            .unwrap();
        assert_eq!(resumed_summary.state, RunState::Completed);
    }

    // pause point must not change what ends up in the catalogue
    assert_eq!(product_skus(&config), reference_skus);
    assert!(!config.checkpoint_path().exists());
}

#[tokio::test]
async fn resume_without_checkpoint_starts_fresh() {
    let server = MockServer::start().await;
    mount_slow_site(&server, 0).await;

    let dir = TempDir::new().unwrap();
    let config = config_for(&server, &dir);
    let summary = CrawlOrchestrator::new(config, true)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(
        summary.products_extracted,
        (2 * PRODUCTS_PER_CATEGORY) as u64
    );
}

#[tokio::test]
async fn incompatible_checkpoint_version_refuses_to_resume() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = config_for(&server, &dir);

    std::fs::create_dir_all(dir.path()).unwrap();
    std::fs::write(
        config.checkpoint_path(),
        r#"{"schema_version": 99, "state": {}}"#,
    )
    .unwrap();

    match CrawlOrchestrator::new(config, true) {
        Err(CrawlerError::Storage(StorageError::SchemaVersion { found: 99, .. })) => {}
        other => panic!("expected schema version failure, got {:?}", other.err()),
    }
}

#[tokio::test]
async fn repeated_runs_do_not_duplicate_rows() {
    let server = MockServer::start().await;
    mount_slow_site(&server, 0).await;

    let dir = TempDir::new().unwrap();
    let config = config_for(&server, &dir);

    CrawlOrchestrator::new(config.clone(), false)
        .unwrap()
        .run()
        .await
        .unwrap();
    CrawlOrchestrator::new(config.clone(), false)
        .unwrap()
        .run()
        .await
        .unwrap();

    let store = SqliteStore::open(config.database_path()).unwrap();
    assert_eq!(
        store.product_count().unwrap(),
        (2 * PRODUCTS_PER_CATEGORY) as u64
    );
    // one row per category URL as well: root + two categories
    assert_eq!(store.category_count().unwrap(), 3);
}
