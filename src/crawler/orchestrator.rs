//! Crawl orchestration: worker pool, dispatch and the run state machine.
//!
//! A run moves `Idle -> Running -> {Completed, Paused, Aborted}`. Workers
//! share one FIFO frontier; the session mutex guards every frontier and
//! visited-set mutation, and a checkpoint is written after each completed
//! item so the resume point is always the last durable state. Items popped
//! but not yet finished are tracked per worker and folded back into every
//! snapshot, so a crash costs at most the re-work of what was in flight.
//! Ctrl-C stops dispatch (in-flight fetches finish first) and leaves the
//! run Paused; a failed checkpoint write or an excessive error rate aborts.

use crate::config::Config;
use crate::crawler::discover::CategoryDiscoverer;
use crate::crawler::fetcher::{PageFetcher, RateLimitedFetcher};
use crate::crawler::url::{canonicalize, with_page};
use crate::error::{CrawlerError, StorageError};
use crate::models::{CategoryNode, CrawlSummary, FrontierItem, ProductRecord, RunState};
use crate::parser::product::ProductExtractor;
use crate::session::{CheckpointStore, SessionState};
use crate::storage::SqliteStore;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{error, info, warn};

const IDLE_POLL: Duration = Duration::from_millis(50);

struct Shared {
    session: Mutex<SessionState>,
    store: Mutex<SqliteStore>,
    checkpoints: CheckpointStore,
    /// Serializes checkpoint writers without holding the session lock.
    checkpoint_write: Mutex<()>,
    last_checkpointed: AtomicU64,
    /// Pause requested (Ctrl-C): stop dispatching, keep the checkpoint.
    pause: AtomicBool,
    /// Fatal condition: storage failure or error rate over the threshold.
    abort: AtomicBool,
    abort_reason: Mutex<Option<String>>,
    /// Items popped from the frontier but not yet finished, one slot per
    /// worker. Locked after the session mutex, never before it.
    in_flight: Mutex<HashMap<usize, FrontierItem>>,
}

impl Shared {
    fn session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().expect("session mutex poisoned")
    }

    fn store(&self) -> MutexGuard<'_, SqliteStore> {
        self.store.lock().expect("store mutex poisoned")
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<usize, FrontierItem>> {
        self.in_flight.lock().expect("in-flight mutex poisoned")
    }

    fn request_abort(&self, reason: impl Into<String>) {
        let reason = reason.into();
        error!(reason, "aborting run");
        self.abort.store(true, Ordering::SeqCst);
        let mut slot = self.abort_reason.lock().expect("abort reason mutex poisoned");
        slot.get_or_insert(reason);
    }

    /// Persist the session after a completed item. The snapshot is taken
    /// under the session lock, the file write happens outside it so other
    /// workers keep dequeuing. Items other workers hold in flight are
    /// pushed back onto the snapshot's frontier: they are already in the
    /// visited set, so a snapshot without them could never re-queue them
    /// after a crash. Failure to write is fatal.
    fn checkpoint(&self) -> Result<(), StorageError> {
        let snapshot = {
            let mut session = self.session();
            session.checkpoint_seq += 1;
            session.updated_at = chrono::Utc::now();
            let mut snapshot = session.clone();
            for item in self.in_flight().values() {
                snapshot.frontier.push_front(item.clone());
            }
            snapshot
        };

        let _writer = self
            .checkpoint_write
            .lock()
            .expect("checkpoint mutex poisoned");
        // a later snapshot already on disk supersedes this one
        if snapshot.checkpoint_seq <= self.last_checkpointed.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.checkpoints.write(&snapshot)?;
        self.last_checkpointed
            .store(snapshot.checkpoint_seq, Ordering::SeqCst);
        Ok(())
    }
}

/// Requests a graceful pause: dispatch stops, in-flight items finish and
/// the last checkpoint becomes the resume point.
#[derive(Clone)]
pub struct PauseHandle {
    shared: Arc<Shared>,
}

impl PauseHandle {
    pub fn pause(&self) {
        self.shared.pause.store(true, Ordering::SeqCst);
    }
}

pub struct CrawlOrchestrator {
    config: Config,
    fetcher: Arc<dyn PageFetcher>,
    discoverer: Arc<CategoryDiscoverer>,
    extractor: Arc<ProductExtractor>,
    shared: Arc<Shared>,
    state: RunState,
}

impl CrawlOrchestrator {
    /// Build an orchestrator with the production HTTP fetcher.
    pub fn new(config: Config, resume: bool) -> Result<Self, CrawlerError> {
        let fetcher = Arc::new(RateLimitedFetcher::new(
            config.delay(),
            config.request_timeout(),
            config.crawler.max_retries,
        )?);
        Self::with_fetcher(config, resume, fetcher)
    }

    /// Build an orchestrator around any fetch capability.
    pub fn with_fetcher(
        config: Config,
        resume: bool,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Result<Self, CrawlerError> {
        config.validate()?;
        let base = config.base_url()?;

        std::fs::create_dir_all(&config.output.output_dir)
            .map_err(|e| CrawlerError::Storage(StorageError::Io(e)))?;
        let store = SqliteStore::open(config.database_path())?;
        let checkpoints = CheckpointStore::new(config.checkpoint_path());

        let session = if resume {
            match checkpoints.load()? {
                Some(state) => {
                    info!(
                        pending = state.pending(),
                        visited = state.visited.len(),
                        seq = state.checkpoint_seq,
                        "resuming from checkpoint"
                    );
                    state
                }
                None => {
                    info!("no checkpoint found, starting a fresh session");
                    Self::fresh_session(&base)
                }
            }
        } else {
            Self::fresh_session(&base)
        };

        Ok(Self {
            discoverer: Arc::new(CategoryDiscoverer::new(base.clone())),
            extractor: Arc::new(ProductExtractor::new(base)),
            fetcher,
            shared: Arc::new(Shared {
                last_checkpointed: AtomicU64::new(session.checkpoint_seq),
                session: Mutex::new(session),
                store: Mutex::new(store),
                checkpoints,
                checkpoint_write: Mutex::new(()),
                pause: AtomicBool::new(false),
                abort: AtomicBool::new(false),
                abort_reason: Mutex::new(None),
                in_flight: Mutex::new(HashMap::new()),
            }),
            config,
            state: RunState::Idle,
        })
    }

    fn fresh_session(base: &url::Url) -> SessionState {
        let root_url = canonicalize(base.as_str(), base).unwrap_or_else(|| base.to_string());
        SessionState::seeded(CategoryNode::root(root_url))
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Handle for requesting a pause from outside the run loop.
    pub fn pause_handle(&self) -> PauseHandle {
        PauseHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Run until the frontier drains, a pause is requested or the run
    /// aborts. Always returns the real counts.
    pub async fn run(mut self) -> Result<CrawlSummary, CrawlerError> {
        let started_at = Utc::now();
        self.state = RunState::Running;
        info!(
            base_url = %self.config.crawler.base_url,
            workers = self.config.crawler.workers,
            delay_secs = self.config.crawler.delay_secs,
            detailed = self.config.crawler.detailed,
            "crawl started"
        );

        let signal_shared = Arc::clone(&self.shared);
        let signal_task = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, pausing after in-flight items");
                signal_shared.pause.store(true, Ordering::SeqCst);
            }
        });

        let mut handles = Vec::new();
        for worker_id in 0..self.config.crawler.workers {
            let worker = Worker {
                id: worker_id,
                shared: Arc::clone(&self.shared),
                fetcher: Arc::clone(&self.fetcher),
                discoverer: Arc::clone(&self.discoverer),
                extractor: Arc::clone(&self.extractor),
                detailed: self.config.crawler.detailed,
                max_products: self.config.crawler.max_products,
                error_rate_threshold: self.config.crawler.error_rate_threshold,
                min_items_for_abort: self.config.crawler.min_items_for_abort,
            };
            handles.push(tokio::spawn(worker.run()));
        }

        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => self.shared.request_abort(e.to_string()),
                Err(e) => self.shared.request_abort(format!("worker panicked: {e}")),
            }
        }
        signal_task.abort();

        self.state = self.final_state();
        let summary = self.summarize(started_at);
        self.finish(&summary)?;
        Ok(summary)
    }

    fn final_state(&self) -> RunState {
        if self.shared.abort.load(Ordering::SeqCst) {
            RunState::Aborted
        } else if self.shared.pause.load(Ordering::SeqCst)
            && self.shared.session().pending() > 0
        {
            RunState::Paused
        } else {
            RunState::Completed
        }
    }

    fn summarize(&self, started_at: chrono::DateTime<Utc>) -> CrawlSummary {
        let session = self.shared.session();
        let finished_at = Utc::now();
        CrawlSummary {
            state: self.state,
            started_at,
            finished_at,
            duration_secs: (finished_at - started_at).num_milliseconds() as f64 / 1000.0,
            categories_processed: session.categories_processed,
            products_extracted: session.products_extracted,
            pages_fetched: session.pages_fetched,
            failed: session.failed,
            skipped: session.skipped,
        }
    }

    fn finish(&self, summary: &CrawlSummary) -> Result<(), CrawlerError> {
        let dir = &self.config.output.output_dir;
        if summary.state == RunState::Completed {
            let store = self.shared.store();
            crate::export::export_all(&store, dir)?;
            // a finished catalogue needs no resume point
            self.shared.checkpoints.remove()?;
        }
        crate::export::write_report(summary, dir)?;

        if let Some(reason) = self
            .shared
            .abort_reason
            .lock()
            .expect("abort reason mutex poisoned")
            .as_deref()
        {
            warn!(reason, "run aborted");
        }
        info!(
            state = %summary.state,
            categories = summary.categories_processed,
            products = summary.products_extracted,
            pages = summary.pages_fetched,
            failed = summary.failed,
            duration_secs = summary.duration_secs,
            "crawl finished"
        );
        Ok(())
    }
}

struct Worker {
    id: usize,
    shared: Arc<Shared>,
    fetcher: Arc<dyn PageFetcher>,
    discoverer: Arc<CategoryDiscoverer>,
    extractor: Arc<ProductExtractor>,
    detailed: bool,
    max_products: Option<u64>,
    error_rate_threshold: f64,
    min_items_for_abort: u64,
}

impl Worker {
    async fn run(self) -> Result<(), CrawlerError> {
        loop {
            if self.shared.abort.load(Ordering::SeqCst) || self.shared.pause.load(Ordering::SeqCst)
            {
                break;
            }

            let item = {
                let mut session = self.shared.session();
                let item = session.pop();
                if let Some(item) = &item {
                    self.shared.in_flight().insert(self.id, item.clone());
                }
                item
            };

            match item {
                Some(item) => self.process(item).await?,
                None => {
                    if self.shared.in_flight().is_empty() {
                        break;
                    }
                    // another worker may still enqueue discoveries
                    tokio::time::sleep(IDLE_POLL).await;
                }
            }
        }
        tracing::debug!(worker = self.id, "worker drained");
        Ok(())
    }

    async fn process(&self, item: FrontierItem) -> Result<(), CrawlerError> {
        let outcome = match item {
            FrontierItem::ExpandCategory { node, page } => self.expand(node, page).await,
            FrontierItem::ExtractProduct { record } => self.extract(record).await,
        };
        match outcome {
            Ok(()) => {}
            Err(e) => {
                self.record_failure(&e);
            }
        }
        // the item reached a terminal outcome, release its in-flight slot
        // before snapshotting so our own checkpoint does not re-queue it
        self.shared.in_flight().remove(&self.id);
        self.shared.checkpoint().map_err(|e| {
            self.shared.request_abort(format!("checkpoint write failed: {e}"));
            CrawlerError::Storage(e)
        })
    }

    async fn expand(&self, node: CategoryNode, page: u32) -> Result<(), CrawlerError> {
        let url = with_page(&node.url, page);
        let content = match self.fetcher.fetch(&url).await {
            Ok(content) => content,
            Err(e) => return Err(CrawlerError::Fetch(e)),
        };

        let expansion = self.discoverer.expand(&content.body, &node, page);

        if page == 1 {
            self.shared.store().upsert_category(&node)?;
        }

        // merge discoveries and counts in one critical section
        let mut emitted = Vec::new();
        {
            let mut session = self.shared.session();
            session.pages_fetched += 1;
            if page == 1 {
                session.categories_processed += 1;
            }

            for child in expansion.children {
                session.enqueue(FrontierItem::ExpandCategory { node: child, page: 1 });
            }

            let mut taken = session
                .products_per_category
                .get(&node.url)
                .copied()
                .unwrap_or(0);
            for record in expansion.products {
                if self.max_products.is_some_and(|max| taken >= max) {
                    session.skipped += 1;
                    continue;
                }
                if self.detailed {
                    if session.enqueue(FrontierItem::ExtractProduct { record }) {
                        taken += 1;
                    }
                } else if session.is_visited(&record.url) {
                    session.skipped += 1;
                } else {
                    session.visited.insert(record.url.clone());
                    session.products_extracted += 1;
                    taken += 1;
                    emitted.push(record);
                }
            }
            session.products_per_category.insert(node.url.clone(), taken);

            let capped = self.max_products.is_some_and(|max| taken >= max);
            if expansion.has_next_page && !capped {
                session.enqueue(FrontierItem::ExpandCategory { node, page: page + 1 });
            }
        }

        if !emitted.is_empty() {
            let store = self.shared.store();
            for record in &emitted {
                store.upsert_product(record)?;
            }
        }
        Ok(())
    }

    async fn extract(&self, mut record: ProductRecord) -> Result<(), CrawlerError> {
        let content = match self.fetcher.fetch(&record.url).await {
            Ok(content) => content,
            Err(e) => return Err(CrawlerError::Fetch(e)),
        };
        self.extractor.enrich(&content.body, &mut record)?;
        self.shared.store().upsert_product(&record)?;

        let mut session = self.shared.session();
        session.pages_fetched += 1;
        session.products_extracted += 1;
        Ok(())
    }

    /// Storage failures are fatal; fetch and extraction failures mark the
    /// item failed and feed the abort threshold.
    fn record_failure(&self, error: &CrawlerError) {
        match error {
            CrawlerError::Storage(e) => {
                self.shared.request_abort(format!("storage failure: {e}"));
            }
            _ => {
                warn!(worker = self.id, error = %error, "frontier item failed");
                let mut session = self.shared.session();
                session.failed += 1;
                if session.processed() >= self.min_items_for_abort
                    && session.error_rate() > self.error_rate_threshold
                {
                    self.shared.request_abort(format!(
                        "error rate {:.2} exceeded threshold {:.2}",
                        session.error_rate(),
                        self.error_rate_threshold
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::crawler::fetcher::PageContent;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct CannedFetcher {
        pages: HashMap<String, String>,
    }

    #[async_trait]
    impl PageFetcher for CannedFetcher {
        async fn fetch(&self, url: &str) -> Result<PageContent, FetchError> {
            match self.pages.get(url) {
                Some(body) => Ok(PageContent {
                    url: url.to_string(),
                    status: 200,
                    body: body.clone(),
                }),
                None => Err(FetchError::Status(404)),
            }
        }
    }

    fn test_config(dir: &TempDir, base: &str) -> Config {
        let mut config = Config::default();
        config.crawler.base_url = base.to_string();
        config.crawler.delay_secs = 0.0;
        config.crawler.workers = 2;
        config.output.output_dir = dir.path().to_path_buf();
        config
    }

    fn site() -> CannedFetcher {
        let mut pages = HashMap::new();
        pages.insert(
            "https://shop.test/".to_string(),
            r#"<a href="/cat/a">A</a> <a href="/cat/b">B</a>"#.to_string(),
        );
        pages.insert(
            "https://shop.test/cat/a".to_string(),
            r#"<div><a href="/p/x1">Product X1</a> <span>Rs. 80</span> <span>Rs. 100</span></div>"#
                .to_string(),
        );
        pages.insert("https://shop.test/cat/b".to_string(), "<p>empty</p>".to_string());
        pages.insert(
            "https://shop.test/p/x1".to_string(),
            r#"<h1>Product X1</h1> <p>SKU: X1</p> <div>Rs. 80 Rs. 100</div>"#.to_string(),
        );
        CannedFetcher { pages }
    }

    #[tokio::test]
    async fn crawl_completes_and_counts_are_real() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, "https://shop.test");
        let orchestrator =
            CrawlOrchestrator::with_fetcher(config, false, Arc::new(site())).unwrap();
        let summary = orchestrator.run().await.unwrap();

        assert_eq!(summary.state, RunState::Completed);
        // root + A + B
        assert_eq!(summary.categories_processed, 3);
        assert_eq!(summary.products_extracted, 1);
        assert_eq!(summary.failed, 0);
        // root, A, B, product page
        assert_eq!(summary.pages_fetched, 4);
    }

    #[tokio::test]
    async fn permanent_failures_are_tallied_not_fatal() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, "https://shop.test");
        let mut fetcher = site();
        fetcher.pages.remove("https://shop.test/p/x1");

        let orchestrator =
            CrawlOrchestrator::with_fetcher(config, false, Arc::new(fetcher)).unwrap();
        let summary = orchestrator.run().await.unwrap();

        assert_eq!(summary.state, RunState::Completed);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.products_extracted, 0);
    }

    #[tokio::test]
    async fn per_category_cap_skips_surplus_products() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir, "https://shop.test");
        config.crawler.max_products = Some(1);
        config.crawler.workers = 1;

        let mut fetcher = site();
        fetcher.pages.insert(
            "https://shop.test/cat/a".to_string(),
            r#"<div><a href="/p/x1">Product X1</a> <span>Rs. 80</span></div>
               <div><a href="/p/x2">Product X2</a> <span>Rs. 90</span></div>"#
                .to_string(),
        );
        fetcher.pages.insert(
            "https://shop.test/p/x2".to_string(),
            "<h1>Product X2</h1>".to_string(),
        );

        let orchestrator =
            CrawlOrchestrator::with_fetcher(config, false, Arc::new(fetcher)).unwrap();
        let summary = orchestrator.run().await.unwrap();
        assert_eq!(summary.state, RunState::Completed);
        assert_eq!(summary.products_extracted, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[tokio::test]
    async fn summary_extraction_skips_detail_fetches() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir, "https://shop.test");
        config.crawler.detailed = false;

        let orchestrator =
            CrawlOrchestrator::with_fetcher(config.clone(), false, Arc::new(site())).unwrap();
        let summary = orchestrator.run().await.unwrap();

        assert_eq!(summary.state, RunState::Completed);
        assert_eq!(summary.products_extracted, 1);
        // product detail page never fetched
        assert_eq!(summary.pages_fetched, 3);

        let store = SqliteStore::open(config.database_path()).unwrap();
        let products = store.products().unwrap();
        assert_eq!(products.len(), 1);
        // listing card data present, detail-only data absent
        assert_eq!(products[0].price_current, Some(80.0));
        assert_eq!(products[0].sku, None);
    }

    /// A popped item is already in the visited set, so a checkpoint taken
    /// while another worker holds it must carry it in the frontier or a
    /// crash would drop it from the crawl entirely.
    #[tokio::test]
    async fn checkpoint_keeps_items_other_workers_hold_in_flight() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, "https://shop.test");
        let orchestrator =
            CrawlOrchestrator::with_fetcher(config.clone(), false, Arc::new(site())).unwrap();
        let shared = Arc::clone(&orchestrator.shared);

        let popped = {
            let mut session = shared.session();
            session.enqueue(FrontierItem::ExpandCategory {
                node: CategoryNode::root("https://shop.test/cat/a"),
                page: 1,
            });
            let item = session.pop().expect("seeded frontier is non-empty");
            shared.in_flight().insert(0, item.clone());
            item
        };
        shared.checkpoint().unwrap();

        let saved = CheckpointStore::new(config.checkpoint_path())
            .load()
            .unwrap()
            .expect("checkpoint written");
        assert!(
            saved.frontier.iter().any(|queued| queued.url() == popped.url()),
            "in-flight item missing from the persisted frontier"
        );
        // both the queued and the in-flight item survive
        assert_eq!(saved.pending(), 2);
        assert!(saved.is_visited(&popped.url()));
    }
}
