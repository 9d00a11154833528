//! apteka - Resumable pharmacy e-commerce catalogue crawler
//!
//! Crawls a pharmacy storefront, discovers the category tree, enumerates
//! products per category and extracts typed product records. Everything is
//! persisted to SQLite plus flat-file exports, and session state is
//! checkpointed after every completed work item so an interrupted run
//! resumes exactly where it stopped.
//!
//! # Architecture
//!
//! - [`config`] - Configuration management (env, file, CLI merge)
//! - [`crawler`] - Fetching, category discovery and crawl orchestration
//! - [`parser`] - Product extraction from listing cards and detail pages
//! - [`models`] - Core data structures
//! - [`session`] - Session state and atomic checkpointing
//! - [`storage`] - SQLite persistence
//! - [`export`] - CSV/JSON/XML exports and the final report
//!
//! # Example
//!
//! ```no_run
//! use apteka::config::Config;
//! use apteka::crawler::CrawlOrchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let orchestrator = CrawlOrchestrator::new(config, false)?;
//!     let summary = orchestrator.run().await?;
//!     println!("{} products extracted", summary.products_extracted);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crawler;
pub mod error;
pub mod export;
pub mod models;
pub mod parser;
pub mod session;
pub mod storage;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawler::{CrawlOrchestrator, PageFetcher, RateLimitedFetcher};
    pub use crate::error::{CrawlerError, ExtractionError, FetchError, StorageError};
    pub use crate::models::{CategoryNode, CrawlSummary, FrontierItem, ProductRecord, RunState};
    pub use crate::session::{CheckpointStore, SessionState};
    pub use crate::storage::SqliteStore;
}

pub use models::{CategoryNode, CrawlSummary, FrontierItem, ProductRecord, RunState};
pub use session::SessionState;
