//! Crawl session state: the shared FIFO frontier and the visited set.
//!
//! URLs are inserted into the visited set at enqueue time, so a page can
//! never be queued twice even when two workers discover it concurrently.
//! The whole state serializes into the checkpoint file; resuming restores
//! the frontier and visited set exactly as they were after the last
//! durably completed item.

pub mod checkpoint;

pub use checkpoint::{CheckpointStore, SCHEMA_VERSION};

use crate::models::{CategoryNode, FrontierItem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub visited: HashSet<String>,
    pub frontier: VecDeque<FrontierItem>,
    /// Products taken per category URL, for the per-category cap.
    #[serde(default)]
    pub products_per_category: HashMap<String, u64>,
    pub categories_processed: u64,
    pub products_extracted: u64,
    pub pages_fetched: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Monotonically increasing checkpoint sequence, bumped on every save.
    pub checkpoint_seq: u64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            visited: HashSet::new(),
            frontier: VecDeque::new(),
            products_per_category: HashMap::new(),
            categories_processed: 0,
            products_extracted: 0,
            pages_fetched: 0,
            failed: 0,
            skipped: 0,
            checkpoint_seq: 0,
            started_at: now,
            updated_at: now,
        }
    }

    /// Fresh session seeded with the root category.
    pub fn seeded(root: CategoryNode) -> Self {
        let mut state = Self::new();
        state.enqueue(FrontierItem::ExpandCategory { node: root, page: 1 });
        state
    }

    /// Queue a work item unless its URL was already seen. Returns whether
    /// the item was accepted.
    pub fn enqueue(&mut self, item: FrontierItem) -> bool {
        let url = item.url();
        if !self.visited.insert(url) {
            return false;
        }
        self.frontier.push_back(item);
        true
    }

    pub fn pop(&mut self) -> Option<FrontierItem> {
        self.frontier.pop_front()
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(url)
    }

    pub fn pending(&self) -> usize {
        self.frontier.len()
    }

    /// Items that reached a terminal outcome, successful or not.
    pub fn processed(&self) -> u64 {
        self.categories_processed + self.products_extracted + self.failed + self.skipped
    }

    /// Ratio of permanently failed items among all processed ones.
    pub fn error_rate(&self) -> f64 {
        let processed = self.processed();
        if processed == 0 {
            0.0
        } else {
            self.failed as f64 / processed as f64
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category_item(url: &str) -> FrontierItem {
        let mut node = CategoryNode::root(url);
        node.name = "test".into();
        FrontierItem::ExpandCategory { node, page: 1 }
    }

    #[test]
    fn enqueue_rejects_already_seen_urls() {
        let mut state = SessionState::new();
        assert!(state.enqueue(category_item("https://x/cat/a")));
        assert!(!state.enqueue(category_item("https://x/cat/a")));
        assert_eq!(state.pending(), 1);
        assert!(state.is_visited("https://x/cat/a"));
    }

    #[test]
    fn frontier_is_fifo() {
        let mut state = SessionState::new();
        state.enqueue(category_item("https://x/cat/a"));
        state.enqueue(category_item("https://x/cat/b"));
        assert_eq!(state.pop().unwrap().url(), "https://x/cat/a");
        assert_eq!(state.pop().unwrap().url(), "https://x/cat/b");
        assert_eq!(state.pop(), None);
    }

    #[test]
    fn seeded_session_holds_the_root() {
        let state = SessionState::seeded(CategoryNode::root("https://x/"));
        assert_eq!(state.pending(), 1);
        assert!(state.is_visited("https://x/"));
    }

    #[test]
    fn paginated_urls_dedup_independently() {
        let mut state = SessionState::new();
        let node = CategoryNode::root("https://x/cat/a");
        assert!(state.enqueue(FrontierItem::ExpandCategory { node: node.clone(), page: 1 }));
        assert!(state.enqueue(FrontierItem::ExpandCategory { node: node.clone(), page: 2 }));
        assert!(!state.enqueue(FrontierItem::ExpandCategory { node, page: 2 }));
    }

    #[test]
    fn error_rate_counts_all_outcomes() {
        let mut state = SessionState::new();
        assert_eq!(state.error_rate(), 0.0);
        state.categories_processed = 3;
        state.failed = 1;
        assert_eq!(state.error_rate(), 0.25);
    }

    #[test]
    fn state_roundtrips_through_json() {
        let mut state = SessionState::seeded(CategoryNode::root("https://x/"));
        state.products_extracted = 7;
        let json = serde_json::to_string(&state).unwrap();
        let back: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.products_extracted, 7);
        assert_eq!(back.pending(), 1);
        assert!(back.is_visited("https://x/"));
    }
}
