//! Core data structures shared across the crawler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A node in the discovered category graph.
///
/// Categories are identified by their canonical URL; `parent_url` points at
/// the canonical URL of the category whose page the link was found on, and
/// `depth` records how many hops from the root the node was first seen at
/// (informational, not a traversal limit).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryNode {
    pub url: String,
    pub name: String,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_url: Option<String>,
    pub depth: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub discovered_at: DateTime<Utc>,
}

impl CategoryNode {
    pub fn root(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: "root".to_string(),
            slug: "root".to_string(),
            parent_url: None,
            depth: 0,
            image_url: None,
            discovered_at: Utc::now(),
        }
    }

    pub fn child(&self, url: impl Into<String>, name: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            slug: slug.into(),
            parent_url: Some(self.url.clone()),
            depth: self.depth + 1,
            image_url: None,
            discovered_at: Utc::now(),
        }
    }
}

/// A fully typed product record.
///
/// Only `name` and `url` are identity fields; everything else is optional
/// and degrades to absent when a page does not carry it. Listing cards
/// populate the summary fields; detail-page enrichment fills in the rest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductRecord {
    pub url: String,
    pub name: String,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_current: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_original: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingredients: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dosage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    pub category_url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_urls: Vec<String>,
    pub in_stock: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_quantity: Option<u32>,
    pub prescription_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviews_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_keywords: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

impl ProductRecord {
    /// A summary record as built from a listing card, before any
    /// detail-page enrichment.
    pub fn summary(
        url: impl Into<String>,
        name: impl Into<String>,
        slug: impl Into<String>,
        category_url: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            slug: slug.into(),
            sku: None,
            price_current: None,
            price_original: None,
            discount_percentage: None,
            description: None,
            ingredients: None,
            dosage: None,
            form: None,
            manufacturer: None,
            brand: None,
            category_url: category_url.into(),
            image_urls: Vec::new(),
            in_stock: true,
            stock_quantity: None,
            prescription_required: false,
            rating: None,
            reviews_count: None,
            related_urls: Vec::new(),
            meta_description: None,
            meta_keywords: None,
            scraped_at: Utc::now(),
        }
    }

    /// Stable identity: SKU when present, canonical URL otherwise.
    pub fn identity(&self) -> &str {
        self.sku.as_deref().unwrap_or(&self.url)
    }

    /// Recompute the discount from the current price pair. Derived only
    /// when the original price is positive and strictly above the current.
    pub fn update_discount(&mut self) {
        self.discount_percentage = match (self.price_current, self.price_original) {
            (Some(current), Some(original)) if original > 0.0 && original > current => {
                Some(((original - current) / original * 10000.0).round() / 100.0)
            }
            _ => None,
        };
    }
}

/// A unit of work on the shared frontier.
///
/// `ExpandCategory` covers both the first page of a category and its
/// paginated listing pages (`page` >= 2); `ExtractProduct` carries the
/// summary record built from the listing card so enrichment merges into it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrontierItem {
    ExpandCategory { node: CategoryNode, page: u32 },
    ExtractProduct { record: ProductRecord },
}

impl FrontierItem {
    /// The canonical URL this item will fetch (used for dedup).
    pub fn url(&self) -> String {
        match self {
            FrontierItem::ExpandCategory { node, page } => {
                crate::crawler::url::with_page(&node.url, *page)
            }
            FrontierItem::ExtractProduct { record } => record.url.clone(),
        }
    }
}

/// Terminal and intermediate states of a crawl run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Paused,
    Aborted,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Paused => "paused",
            RunState::Aborted => "aborted",
        };
        write!(f, "{s}")
    }
}

/// Final per-run summary, always reporting the real counts even for
/// paused and aborted runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSummary {
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub categories_processed: u64,
    pub products_extracted: u64,
    pub pages_fetched: u64,
    pub failed: u64,
    pub skipped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discount_requires_original_above_current() {
        let mut p = ProductRecord::summary("https://x/p/a", "A", "a", "https://x/cat/c");
        p.price_current = Some(80.0);
        p.price_original = Some(100.0);
        p.update_discount();
        assert_eq!(p.discount_percentage, Some(20.0));

        p.price_original = Some(80.0);
        p.update_discount();
        assert_eq!(p.discount_percentage, None);

        p.price_original = Some(0.0);
        p.update_discount();
        assert_eq!(p.discount_percentage, None);

        p.price_original = None;
        p.update_discount();
        assert_eq!(p.discount_percentage, None);
    }

    #[test]
    fn discount_rounds_to_two_decimals() {
        let mut p = ProductRecord::summary("https://x/p/a", "A", "a", "https://x/cat/c");
        p.price_current = Some(2.0);
        p.price_original = Some(3.0);
        p.update_discount();
        assert_eq!(p.discount_percentage, Some(33.33));
    }

    #[test]
    fn identity_prefers_sku() {
        let mut p = ProductRecord::summary("https://x/p/a", "A", "a", "https://x/cat/c");
        assert_eq!(p.identity(), "https://x/p/a");
        p.sku = Some("X1".to_string());
        assert_eq!(p.identity(), "X1");
    }

    #[test]
    fn child_node_links_parent_and_depth() {
        let root = CategoryNode::root("https://x");
        let child = root.child("https://x/cat/a", "A", "a");
        assert_eq!(child.parent_url.as_deref(), Some("https://x"));
        assert_eq!(child.depth, 1);
    }

    #[test]
    fn frontier_item_roundtrips_through_json() {
        let item = FrontierItem::ExpandCategory {
            node: CategoryNode::root("https://x"),
            page: 2,
        };
        let json = serde_json::to_string(&item).unwrap();
        let back: FrontierItem = serde_json::from_str(&json).unwrap();
        assert_eq!(item, back);
    }
}
