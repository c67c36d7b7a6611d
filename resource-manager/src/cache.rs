//! Hand-rolled bounded caches: an in-memory LRU and a disk-backed
//! persistent cache with TTL. Neither wraps a third-party cache crate --
//! the ordering is an explicit intrusive doubly-linked list over a slab,
//! giving O(1) get/put/evict without relying on a language-provided
//! weak-reference table.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use camino::Utf8PathBuf;
use sha2::{Digest, Sha256};

const NIL: usize = usize::MAX;

struct Slot<K, V> {
    key: K,
    value: V,
    size: u64,
    prev: usize,
    next: usize,
}

/// A bounded least-recently-used cache with independent item-count and
/// byte-size caps. `get` and `put` are O(1) amortized.
pub struct LruCache<K, V> {
    max_items: usize,
    max_bytes: u64,
    used_bytes: u64,
    slots: Vec<Option<Slot<K, V>>>,
    index: HashMap<K, usize>,
    head: usize,
    tail: usize,
    free: Vec<usize>,
    hits: u64,
    misses: u64,
}

impl<K: Eq + Hash + Clone, V: Clone> LruCache<K, V> {
    /// A cache that evicts once either `max_items` entries or `max_bytes`
    /// of size-estimated content is exceeded.
    pub fn new(max_items: usize, max_bytes: u64) -> Self {
        LruCache {
            max_items,
            max_bytes,
            used_bytes: 0,
            slots: Vec::new(),
            index: HashMap::new(),
            head: NIL,
            tail: NIL,
            free: Vec::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Current byte-size estimate of cached content.
    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    /// `(hits, misses)` observed so far.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    /// Look up `key`, promoting it to most-recently-used on a hit.
    pub fn get(&mut self, key: &K) -> Option<V> {
        match self.index.get(key).copied() {
            Some(idx) => {
                self.hits += 1;
                self.detach(idx);
                self.push_front(idx);
                self.slots[idx].as_ref().map(|s| s.value.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Insert or update `key`, evicting least-recently-used entries as
    /// needed to respect both caps. `size` is the caller's own estimate of
    /// `value`'s cost, e.g. serialized byte length.
    pub fn put(&mut self, key: K, value: V, size: u64) {
        if let Some(&idx) = self.index.get(&key) {
            self.used_bytes -= self.slots[idx].as_ref().expect("slot present").size;
            self.used_bytes += size;
            let slot = self.slots[idx].as_mut().expect("slot present");
            slot.value = value;
            slot.size = size;
            self.detach(idx);
            self.push_front(idx);
        } else {
            let idx = self.alloc(Slot {
                key: key.clone(),
                value,
                size,
                prev: NIL,
                next: NIL,
            });
            self.index.insert(key, idx);
            self.push_front(idx);
            self.used_bytes += size;
        }
        self.evict_overflow();
    }

    /// Remove `key` if present.
    pub fn invalidate(&mut self, key: &K) {
        if let Some(idx) = self.index.remove(key) {
            self.used_bytes -= self.slots[idx].as_ref().expect("slot present").size;
            self.detach(idx);
            self.slots[idx] = None;
            self.free.push(idx);
        }
    }

    /// Drop every entry, keeping hit/miss counters.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.free.clear();
        self.head = NIL;
        self.tail = NIL;
        self.used_bytes = 0;
    }

    fn alloc(&mut self, slot: Slot<K, V>) -> usize {
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(slot);
            idx
        } else {
            self.slots.push(Some(slot));
            self.slots.len() - 1
        }
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = {
            let slot = self.slots[idx].as_ref().expect("slot present");
            (slot.prev, slot.next)
        };
        match prev {
            NIL => self.head = next,
            p => self.slots[p].as_mut().expect("slot present").next = next,
        }
        match next {
            NIL => self.tail = prev,
            n => self.slots[n].as_mut().expect("slot present").prev = prev,
        }
    }

    fn push_front(&mut self, idx: usize) {
        let slot = self.slots[idx].as_mut().expect("slot present");
        slot.prev = NIL;
        slot.next = self.head;
        if self.head != NIL {
            self.slots[self.head].as_mut().expect("slot present").prev = idx;
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
    }

    fn evict_overflow(&mut self) {
        while (self.max_items > 0 && self.index.len() > self.max_items)
            || (self.max_bytes > 0 && self.used_bytes > self.max_bytes)
        {
            let tail = self.tail;
            if tail == NIL {
                break;
            }
            let key = self.slots[tail].as_ref().expect("slot present").key.clone();
            self.invalidate(&key);
        }
    }
}

/// Metadata stored alongside each [`PersistentCache`] entry.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct PersistentEntry {
    payload: Vec<u8>,
    created_at: u64,
    expires_at: u64,
}

/// A directory of files named by hashed key, each holding a payload plus a
/// `{created_at, expires_at}` envelope. Reads of an expired or corrupt
/// entry delete it and report a miss; writes are atomic (temp file then
/// rename).
pub struct PersistentCache {
    dir: Utf8PathBuf,
    default_ttl: Duration,
}

impl PersistentCache {
    /// A cache rooted at `dir` (created on first write) with `default_ttl`
    /// applied to entries written via [`PersistentCache::set`].
    pub fn new(dir: impl Into<Utf8PathBuf>, default_ttl: Duration) -> Self {
        PersistentCache {
            dir: dir.into(),
            default_ttl,
        }
    }

    fn path_for(&self, key: &str) -> Utf8PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let digest = hex::encode(hasher.finalize());
        self.dir.join(format!("{digest}.cache"))
    }

    /// Read `key`'s payload if present and not expired. Deletes and misses
    /// on an expired or corrupt entry.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.path_for(key);
        let bytes = std::fs::read(&path).ok()?;
        let entry: PersistentEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(_) => {
                let _ = std::fs::remove_file(&path);
                return None;
            }
        };
        if now_secs() >= entry.expires_at {
            let _ = std::fs::remove_file(&path);
            return None;
        }
        Some(entry.payload)
    }

    /// Write `payload` for `key` with the default TTL, atomically.
    pub fn set(&self, key: &str, payload: &[u8]) -> std::io::Result<()> {
        self.set_with_ttl(key, payload, self.default_ttl)
    }

    /// Write `payload` for `key` with an explicit TTL, atomically.
    pub fn set_with_ttl(&self, key: &str, payload: &[u8], ttl: Duration) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let entry = PersistentEntry {
            payload: payload.to_vec(),
            created_at: now_secs(),
            expires_at: now_secs() + ttl.as_secs(),
        };
        let bytes = serde_json::to_vec(&entry).expect("envelope always serializes");

        let mut tmp = tempfile::Builder::new()
            .prefix(".tmp_")
            .suffix(".cache")
            .tempfile_in(&self.dir)?;
        std::io::Write::write_all(&mut tmp, &bytes)?;
        tmp.persist(self.path_for(key)).map_err(|e| e.error)?;
        Ok(())
    }

    /// Delete `key`'s entry if present; a no-op if absent.
    pub fn invalidate(&self, key: &str) {
        let _ = std::fs::remove_file(self.path_for(key));
    }

    /// Delete every entry in the cache directory.
    pub fn clear(&self) {
        if let Ok(entries) = std::fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                let _ = std::fs::remove_file(entry.path());
            }
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the epoch")
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn evicts_least_recently_used_on_item_overflow() {
        let mut cache: LruCache<&str, i32> = LruCache::new(2, 0);
        cache.put("a", 1, 1);
        cache.put("b", 2, 1);
        cache.get(&"a");
        cache.put("c", 3, 1);
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn evicts_on_byte_overflow() {
        let mut cache: LruCache<&str, i32> = LruCache::new(0, 10);
        cache.put("a", 1, 6);
        cache.put("b", 2, 6);
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(2));
        assert!(cache.used_bytes() <= 10);
    }

    #[test]
    fn tracks_hit_and_miss_counts() {
        let mut cache: LruCache<&str, i32> = LruCache::new(10, 0);
        cache.put("a", 1, 1);
        cache.get(&"a");
        cache.get(&"missing");
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn invalidate_and_clear_remove_entries() {
        let mut cache: LruCache<&str, i32> = LruCache::new(10, 0);
        cache.put("a", 1, 1);
        cache.invalidate(&"a");
        assert_eq!(cache.get(&"a"), None);
        cache.put("b", 2, 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn persistent_cache_round_trips_and_expires() {
        let dir = TempDir::new().unwrap();
        let base = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let cache = PersistentCache::new(base, Duration::from_secs(60));
        cache.set("key", b"hello").unwrap();
        assert_eq!(cache.get("key"), Some(b"hello".to_vec()));

        cache.set_with_ttl("expired", b"bye", Duration::from_secs(0)).unwrap();
        assert_eq!(cache.get("expired"), None);
    }

    #[test]
    fn persistent_cache_invalidate_and_clear() {
        let dir = TempDir::new().unwrap();
        let base = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let cache = PersistentCache::new(base, Duration::from_secs(60));
        cache.set("a", b"1").unwrap();
        cache.set("b", b"2").unwrap();
        cache.invalidate("a");
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(b"2".to_vec()));
        cache.clear();
        assert_eq!(cache.get("b"), None);
    }
}
