//! Fetching, discovery and orchestration.

pub mod discover;
pub mod fetcher;
pub mod orchestrator;
pub mod url;

pub use discover::{CategoryDiscoverer, Expansion};
pub use fetcher::{PageContent, PageFetcher, RateLimitedFetcher};
pub use orchestrator::{CrawlOrchestrator, PauseHandle};
