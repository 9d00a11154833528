//! Flat-file exports of the crawled catalogue.
//!
//! After a run finishes, the category and product tables are dumped to
//! CSV, JSON and XML under the output directory, together with a
//! `report.json` summarizing the run.

pub mod csv;
pub mod json;
pub mod xml;

use crate::error::StorageError;
use crate::models::CrawlSummary;
use crate::storage::SqliteStore;
use std::path::{Path, PathBuf};
use tracing::info;

/// Write every export format. Returns the paths written.
pub fn export_all(store: &SqliteStore, dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    std::fs::create_dir_all(dir)?;
    let categories = store.categories()?;
    let products = store.products()?;

    let mut written = Vec::new();

    let path = dir.join("categories.csv");
    csv::write_categories(&path, &categories)?;
    written.push(path);

    let path = dir.join("products.csv");
    csv::write_products(&path, &products)?;
    written.push(path);

    let path = dir.join("categories.json");
    json::write(&path, &categories)?;
    written.push(path);

    let path = dir.join("products.json");
    json::write(&path, &products)?;
    written.push(path);

    let path = dir.join("products.xml");
    xml::write_products(&path, &products)?;
    written.push(path);

    info!(
        categories = categories.len(),
        products = products.len(),
        files = written.len(),
        "exports written"
    );
    Ok(written)
}

/// Write the final run report next to the exports.
pub fn write_report(summary: &CrawlSummary, dir: &Path) -> Result<PathBuf, StorageError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join("report.json");
    json::write(&path, summary)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoryNode, ProductRecord, RunState};
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn export_all_writes_every_format() {
        let store = SqliteStore::in_memory().unwrap();
        let root = CategoryNode::root("https://x/");
        store.upsert_category(&root).unwrap();
        let mut p = ProductRecord::summary("https://x/p/a", "A", "a", "https://x/");
        p.price_current = Some(10.0);
        store.upsert_product(&p).unwrap();

        let dir = TempDir::new().unwrap();
        let written = export_all(&store, dir.path()).unwrap();
        assert_eq!(written.len(), 5);
        for path in &written {
            assert!(path.exists(), "missing export {path:?}");
            assert!(std::fs::metadata(path).unwrap().len() > 0);
        }
    }

    #[test]
    fn report_carries_the_counts() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let summary = CrawlSummary {
            state: RunState::Completed,
            started_at: now,
            finished_at: now,
            duration_secs: 1.5,
            categories_processed: 3,
            products_extracted: 7,
            pages_fetched: 11,
            failed: 1,
            skipped: 0,
        };
        let path = write_report(&summary, dir.path()).unwrap();
        let raw = std::fs::read_to_string(path).unwrap();
        let back: CrawlSummary = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.products_extracted, 7);
        assert_eq!(back.state, RunState::Completed);
    }
}
