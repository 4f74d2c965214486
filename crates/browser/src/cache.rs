//! Bounded LRU of (URL → PageMap) plus an `active` slot for the most
//! recently built map in a session.

use pagemap_domain::model::PageMap;
use std::collections::HashMap;

pub struct PageMapCache {
    capacity: usize,
    lru: Vec<String>, // front = least recently used
    entries: HashMap<String, PageMap>,
    active_url: Option<String>,
}

impl PageMapCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            lru: Vec::new(),
            entries: HashMap::new(),
            active_url: None,
        }
    }

    /// Store `map` under its URL and set it as `active`.
    pub fn store(&mut self, map: PageMap) {
        let url = map.url.clone();
        self.store_in_lru_only(map);
        self.active_url = Some(url);
    }

    /// Store `map` in the LRU without touching `active` — used by batch
    /// page-map building, whose results never become the session's
    /// current map.
    pub fn store_in_lru_only(&mut self, map: PageMap) {
        let url = map.url.clone();
        self.touch(&url);
        self.entries.insert(url, map);
        if self.entries.len() > self.capacity {
            self.evict_one();
        }
    }

    pub fn get(&self, url: &str) -> Option<&PageMap> {
        self.entries.get(url)
    }

    pub fn active(&self) -> Option<&PageMap> {
        self.active_url.as_ref().and_then(|u| self.entries.get(u))
    }

    /// Invalidate the `active` slot (navigation or action changed the
    /// URL) without evicting anything from the LRU.
    pub fn invalidate_active(&mut self) {
        self.active_url = None;
    }

    /// Clear everything — used on session recycle.
    pub fn clear(&mut self) {
        self.lru.clear();
        self.entries.clear();
        self.active_url = None;
    }

    fn touch(&mut self, url: &str) {
        self.lru.retain(|u| u != url);
        self.lru.push(url.to_string());
    }

    fn evict_one(&mut self) {
        if !self.lru.is_empty() {
            let victim = self.lru.remove(0);
            if self.active_url.as_deref() != Some(victim.as_str()) {
                self.entries.remove(&victim);
            } else {
                // Never evict the active entry; evict the next-LRU one.
                if let Some(next) = self.lru.first().cloned() {
                    self.lru.remove(0);
                    self.entries.remove(&next);
                }
                self.lru.insert(0, victim);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagemap_domain::model::PageType;
    use std::collections::HashMap as Map;

    fn map(url: &str) -> PageMap {
        PageMap {
            url: url.to_string(),
            title: "t".into(),
            page_type: PageType::Unknown,
            interactables: vec![],
            pruned_context: String::new(),
            pruned_tokens: 0,
            generation_ms: 0.0,
            images: vec![],
            metadata: Map::new(),
            warnings: vec![],
        }
    }

    #[test]
    fn store_sets_active() {
        let mut cache = PageMapCache::new(4);
        cache.store(map("https://a.com"));
        assert_eq!(cache.active().unwrap().url, "https://a.com");
    }

    #[test]
    fn store_in_lru_only_does_not_touch_active() {
        let mut cache = PageMapCache::new(4);
        cache.store(map("https://a.com"));
        cache.store_in_lru_only(map("https://b.com"));
        assert_eq!(cache.active().unwrap().url, "https://a.com");
        assert!(cache.get("https://b.com").is_some());
    }

    #[test]
    fn invalidate_clears_only_active() {
        let mut cache = PageMapCache::new(4);
        cache.store(map("https://a.com"));
        cache.invalidate_active();
        assert!(cache.active().is_none());
        assert!(cache.get("https://a.com").is_some());
    }

    #[test]
    fn evicts_least_recently_used_when_over_capacity() {
        let mut cache = PageMapCache::new(2);
        cache.store_in_lru_only(map("https://a.com"));
        cache.store_in_lru_only(map("https://b.com"));
        cache.store_in_lru_only(map("https://c.com"));
        assert!(cache.get("https://a.com").is_none());
        assert!(cache.get("https://b.com").is_some());
        assert!(cache.get("https://c.com").is_some());
    }
}
