//! Combines exact lookup, prefix lookup, and fuzzy matching over a set of
//! indexed [`Resource`]s, plus the `search_smart` composite scorer.

mod fuzzy;
mod trie;

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use resource_manager_schema::Resource;

use self::trie::PrefixTrie;
use crate::cache::LruCache;
use crate::config::Config;

/// Default fields concatenated into a document's searchable text.
const DEFAULT_INDEX_FIELDS: [&str; 3] = ["id", "name", "description"];

/// A search result carrying `search_smart`'s `[0, 100]` relevance score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredResource {
    /// The matched resource.
    pub resource: Resource,
    /// Its relevance score for this query.
    pub score: u32,
}

/// Equality filters applied after exact/prefix/fuzzy matching, e.g.
/// `{"type": "agent"}`.
pub type Filters = BTreeMap<String, String>;

/// An in-memory search index over a set of resources. Indexing and removal
/// must come from a single task at a time; read operations (`search_*`) may
/// run concurrently with each other but not with a mutation.
pub struct SearchIndex {
    index_fields: Vec<String>,
    resources: HashMap<String, Resource>,
    searchable_text: HashMap<String, String>,
    trie: PrefixTrie,
    fuzzy_cutoff_default: u32,
    fuzzy_cutoff_noisy: u32,
    result_cache: Option<Mutex<LruCache<String, Vec<ScoredResource>>>>,
}

impl SearchIndex {
    /// A new, empty index using the default indexed fields (`id`, `name`,
    /// `description`) and no result caching.
    pub fn new(config: &Config) -> Self {
        SearchIndex {
            index_fields: DEFAULT_INDEX_FIELDS.iter().map(|s| s.to_string()).collect(),
            resources: HashMap::new(),
            searchable_text: HashMap::new(),
            trie: PrefixTrie::new(),
            fuzzy_cutoff_default: config.fuzzy_score_cutoff_default,
            fuzzy_cutoff_noisy: config.fuzzy_score_cutoff_noisy,
            result_cache: None,
        }
    }

    /// Enable an LRU cache over `search`/`search_smart` results, cleared on
    /// every index mutation.
    pub fn with_result_cache(mut self, max_items: usize) -> Self {
        self.result_cache = Some(Mutex::new(LruCache::new(max_items, 0)));
        self
    }

    fn field_value(resource: &Resource, field: &str) -> Option<String> {
        match field {
            "id" => Some(resource.id.clone()),
            "name" => Some(resource.name.clone()),
            "description" => Some(resource.description.clone()),
            "summary" => Some(resource.summary.clone()),
            "type" => Some(resource.type_.as_str().to_owned()),
            "version" => Some(resource.version.clone()),
            "author" => resource.author.clone(),
            other => resource
                .metadata
                .get(other)
                .map(|v| v.as_str().map(str::to_owned).unwrap_or_else(|| v.to_string())),
        }
    }

    fn build_searchable_text(&self, resource: &Resource) -> String {
        self.index_fields
            .iter()
            .filter_map(|field| Self::field_value(resource, field))
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    /// Idempotent upsert by `id`: rebuilds this resource's trie entries and
    /// searchable text, and invalidates the result cache.
    pub fn index_resource(&mut self, resource: Resource) {
        let id = resource.id.clone();
        if self.resources.contains_key(&id) {
            self.remove_resource(&id);
        }
        let text = self.build_searchable_text(&resource);
        self.trie.insert_text(&id, &text);
        self.searchable_text.insert(id.clone(), text);
        self.resources.insert(id, resource);
        self.clear_cache();
    }

    /// Remove `id` from the index, rebuilding the trie from the remaining
    /// resources and invalidating the result cache.
    pub fn remove_resource(&mut self, id: &str) {
        if self.resources.remove(id).is_none() {
            return;
        }
        self.searchable_text.remove(id);
        self.trie = PrefixTrie::new();
        for (rid, text) in &self.searchable_text {
            self.trie.insert_text(rid, text);
        }
        self.clear_cache();
    }

    fn clear_cache(&self) {
        if let Some(cache) = &self.result_cache {
            cache.lock().expect("lock poisoned").clear();
        }
    }

    /// The resource whose `id` equals `q` case-insensitively, if any.
    pub fn search_exact(&self, q: &str) -> Vec<Resource> {
        if q.is_empty() {
            return Vec::new();
        }
        self.resources
            .get(&q.to_lowercase())
            .cloned()
            .into_iter()
            .collect()
    }

    /// Every resource whose indexed text contains a word starting with `p`.
    pub fn search_prefix(&self, p: &str) -> Vec<Resource> {
        if p.is_empty() {
            return Vec::new();
        }
        let mut ids: Vec<String> = self.trie.search_prefix(&p.to_lowercase()).into_iter().collect();
        ids.sort();
        ids.into_iter().filter_map(|id| self.resources.get(&id).cloned()).collect()
    }

    /// Up to `limit` resources ranked by descending fuzzy score, using the
    /// noise-aware cutoff.
    pub fn search_fuzzy(&self, q: &str, limit: usize) -> Vec<Resource> {
        if q.is_empty() {
            return Vec::new();
        }
        let query = q.to_lowercase();
        let cutoff = if fuzzy::is_likely_noise(&query) {
            self.fuzzy_cutoff_noisy
        } else {
            self.fuzzy_cutoff_default
        };

        let mut scored: Vec<(String, u32)> = self
            .searchable_text
            .iter()
            .map(|(id, text)| (id.clone(), fuzzy::score(&query, text)))
            .filter(|(_, s)| *s >= cutoff)
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored
            .into_iter()
            .take(limit)
            .filter_map(|(id, _)| self.resources.get(&id).cloned())
            .collect()
    }

    fn matches_filters(&self, resource: &Resource, filters: &Filters) -> bool {
        filters
            .iter()
            .all(|(k, v)| Self::field_value(resource, k).as_deref() == Some(v.as_str()))
    }

    /// The composite strategy: exact match if any, else prefix ∪ fuzzy
    /// (de-duplicated by id), filtered, then truncated to `limit`.
    pub fn search(&self, q: &str, limit: usize, filters: &Filters) -> Vec<Resource> {
        if q.is_empty() {
            return Vec::new();
        }
        let exact = self.search_exact(q);
        if !exact.is_empty() {
            return exact.into_iter().filter(|r| self.matches_filters(r, filters)).collect();
        }

        let mut seen = std::collections::HashSet::new();
        let mut combined = Vec::new();
        for r in self.search_prefix(q) {
            if seen.insert(r.id.clone()) {
                combined.push(r);
            }
        }
        for r in self.search_fuzzy(q, limit.saturating_mul(2)) {
            if seen.insert(r.id.clone()) {
                combined.push(r);
            }
        }

        combined
            .into_iter()
            .filter(|r| self.matches_filters(r, filters))
            .take(limit)
            .collect()
    }

    fn id_or_name_boost(&self, query_lower: &str, resource: &Resource) -> bool {
        resource.id.to_lowercase().contains(query_lower) || resource.name.to_lowercase().contains(query_lower)
    }

    /// `search`'s union, each result attaching a `[0, 100]` relevance score:
    /// exact id match scores 100; otherwise the fuzzy base score, boosted
    /// by 20 (capped at 99) when `q` is a substring of the id or name.
    /// Results are sorted by descending score, stable on ties.
    pub fn search_smart(&self, q: &str, limit: usize) -> Vec<ScoredResource> {
        if q.is_empty() {
            return Vec::new();
        }
        let cache_key = format!("smart|{}|{}", q.to_lowercase(), limit);
        if let Some(cache) = &self.result_cache {
            if let Some(hit) = cache.lock().expect("lock poisoned").get(&cache_key) {
                return hit;
            }
        }

        let query_lower = q.to_lowercase();
        let mut seen = std::collections::HashSet::new();
        let mut results = Vec::new();

        for r in self.search_exact(q) {
            seen.insert(r.id.clone());
            results.push(ScoredResource { resource: r, score: 100 });
        }

        let candidates = self
            .search_prefix(q)
            .into_iter()
            .chain(self.search_fuzzy(q, limit.saturating_mul(2)));
        for r in candidates {
            if !seen.insert(r.id.clone()) {
                continue;
            }
            let text = self.searchable_text.get(&r.id).cloned().unwrap_or_default();
            let base = fuzzy::score(&query_lower, &text);
            let score = if self.id_or_name_boost(&query_lower, &r) {
                (base + 20).min(99)
            } else {
                base
            };
            results.push(ScoredResource { resource: r, score });
        }

        results.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.resource.id.cmp(&b.resource.id)));
        results.truncate(limit);

        if let Some(cache) = &self.result_cache {
            cache
                .lock()
                .expect("lock poisoned")
                .put(cache_key, results.clone(), results.len() as u64);
        }
        results
    }

    /// `search_smart`, dispatched onto a blocking worker so the caller can
    /// await it concurrently with other work. Result ordering matches the
    /// synchronous version exactly (the work itself is unchanged).
    pub async fn search_smart_async(self: std::sync::Arc<Self>, q: String, limit: usize) -> Vec<ScoredResource> {
        tokio::task::spawn_blocking(move || self.search_smart(&q, limit))
            .await
            .unwrap_or_default()
    }

    /// `search`, dispatched onto a blocking worker; see
    /// [`SearchIndex::search_smart_async`].
    pub async fn search_async(self: std::sync::Arc<Self>, q: String, limit: usize, filters: Filters) -> Vec<Resource> {
        tokio::task::spawn_blocking(move || self.search(&q, limit, &filters))
            .await
            .unwrap_or_default()
    }
}
