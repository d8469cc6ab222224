//! History
//!
//! A bounded snapshot cache keyed by URL plus a navigation stack for
//! back/forward.

use std::collections::VecDeque;
use std::time::Instant;

/// Cached page state
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub url: String,
    /// Serialized content of the history element
    pub snapshot: String,
    pub title: String,
    pub scroll_y: f64,
    pub created: Instant,
}

/// Snapshot cache, newest first. Inserting past capacity evicts the oldest
/// entry.
#[derive(Debug, Clone)]
pub struct HistoryCache {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl HistoryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(64)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert at the head, replacing any entry for the same URL
    pub fn record_entry(&mut self, url: &str, snapshot: String, title: &str, scroll_y: f64) {
        if self.capacity == 0 {
            return;
        }
        self.entries.retain(|e| e.url != url);
        self.entries.push_front(HistoryEntry {
            url: url.to_string(),
            snapshot,
            title: title.to_string(),
            scroll_y,
            created: Instant::now(),
        });
        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_back() {
                tracing::debug!("History cache evicted {}", evicted.url);
            }
        }
    }

    /// Look up the entry for `url`
    pub fn get(&self, url: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.url == url)
    }

    /// Entries newest first
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Back/forward stack of visited URLs
#[derive(Debug, Clone)]
pub struct NavigationStack {
    entries: Vec<String>,
    current: usize,
}

impl NavigationStack {
    pub fn new(initial_url: &str) -> Self {
        Self {
            entries: vec![initial_url.to_string()],
            current: 0,
        }
    }

    /// Push a new entry, dropping forward history
    pub fn push(&mut self, url: &str) {
        self.entries.truncate(self.current + 1);
        self.entries.push(url.to_string());
        self.current = self.entries.len() - 1;
    }

    /// Replace the current entry
    pub fn replace(&mut self, url: &str) {
        if let Some(entry) = self.entries.get_mut(self.current) {
            *entry = url.to_string();
        }
    }

    pub fn back(&mut self) -> Option<&str> {
        if self.current == 0 {
            return None;
        }
        self.current -= 1;
        Some(&self.entries[self.current])
    }

    pub fn forward(&mut self) -> Option<&str> {
        if self.current + 1 >= self.entries.len() {
            return None;
        }
        self.current += 1;
        Some(&self.entries[self.current])
    }

    pub fn current(&self) -> &str {
        &self.entries[self.current]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_and_eviction_order() {
        let mut cache = HistoryCache::new(3);
        for i in 0..4 {
            cache.record_entry(&format!("/p{}", i), format!("<p>{}</p>", i), "", 0.0);
        }
        assert_eq!(cache.len(), 3);
        assert!(cache.get("/p0").is_none());
        let urls: Vec<&str> = cache.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, ["/p3", "/p2", "/p1"]);
    }

    #[test]
    fn test_same_url_moves_to_head() {
        let mut cache = HistoryCache::new(2);
        cache.record_entry("/a", "1".into(), "", 0.0);
        cache.record_entry("/b", "2".into(), "", 0.0);
        cache.record_entry("/a", "3".into(), "A", 10.0);
        cache.record_entry("/c", "4".into(), "", 0.0);

        assert!(cache.get("/b").is_none());
        let a = cache.get("/a").unwrap();
        assert_eq!(a.snapshot, "3");
        assert_eq!(a.scroll_y, 10.0);
    }

    #[test]
    fn test_zero_capacity_disables() {
        let mut cache = HistoryCache::new(0);
        cache.record_entry("/a", "x".into(), "", 0.0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_navigation_stack() {
        let mut nav = NavigationStack::new("/");
        nav.push("/a");
        nav.push("/b");
        assert_eq!(nav.back(), Some("/a"));
        assert_eq!(nav.back(), Some("/"));
        assert_eq!(nav.back(), None);
        assert_eq!(nav.forward(), Some("/a"));

        nav.push("/c");
        assert_eq!(nav.forward(), None);
        assert_eq!(nav.len(), 3);

        nav.replace("/c2");
        assert_eq!(nav.current(), "/c2");
    }
}
