//! Hot block cache.
//!
//! Keeps decoded blocks in memory under a byte budget with LRU
//! eviction. A single mutex serializes lookup-and-possibly-evict; the
//! blocks themselves are shared out as `Arc`s so evicting a block never
//! invalidates a reader that already holds it.

use std::sync::{Arc, Mutex};

use lru::LruCache;
use tracing::debug;

use crate::block::{Block, BlockError, BlockStore};

/// Cache sizing.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Ceiling on decoded block bytes held hot.
    pub hot_bytes_max: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            hot_bytes_max: 1024 * 1024 * 1024,
        }
    }
}

impl CacheConfig {
    /// Loads configuration from the `QUIVER_CACHE_BYTES` environment
    /// variable, falling back to the 1 GiB default.
    pub fn from_env() -> Self {
        Self {
            hot_bytes_max: std::env::var("QUIVER_CACHE_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Self::default().hot_bytes_max),
        }
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of blocks evicted.
    pub evictions: u64,
}

impl CacheStats {
    /// Returns the hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

struct CacheInner {
    blocks: LruCache<u32, Arc<Block>>,
    hot_bytes: u64,
    stats: CacheStats,
}

impl CacheInner {
    fn evict_until(&mut self, target_bytes: u64) {
        while self.hot_bytes > target_bytes {
            let Some((block_id, victim)) = self.blocks.pop_lru() else {
                break;
            };
            self.hot_bytes -= victim.heap_bytes() as u64;
            self.stats.evictions += 1;
            debug!(block_id, hot_bytes = self.hot_bytes, "evicted block");
        }
    }
}

/// LRU cache of decoded blocks under a hot-byte budget.
pub struct BlockCache {
    inner: Mutex<CacheInner>,
    config: CacheConfig,
}

impl BlockCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                // Eviction is driven by the byte budget, not an entry count.
                blocks: LruCache::unbounded(),
                hot_bytes: 0,
                stats: CacheStats::default(),
            }),
            config,
        }
    }

    /// Returns the block, loading and decompressing it on a miss.
    ///
    /// On a miss the incoming block is admitted after evicting LRU
    /// victims until it fits the budget. `None` means no cold file
    /// exists for this block id (a block without edges).
    pub fn get_or_load(
        &self,
        block_id: u32,
        store: &BlockStore,
    ) -> Result<Option<Arc<Block>>, BlockError> {
        let mut guard = self.inner.lock().expect("block cache poisoned");
        let inner = &mut *guard;

        if let Some(block) = inner.blocks.get(&block_id) {
            inner.stats.hits += 1;
            return Ok(Some(Arc::clone(block)));
        }
        inner.stats.misses += 1;

        let Some(block) = store.load(block_id)? else {
            return Ok(None);
        };
        let block = Arc::new(block);
        let bytes = block.heap_bytes() as u64;

        let target = self.config.hot_bytes_max.saturating_sub(bytes);
        inner.evict_until(target);
        inner.hot_bytes += bytes;
        inner.blocks.put(block_id, Arc::clone(&block));
        Ok(Some(block))
    }

    /// Evicts until hot bytes drop to `ratio * hot_bytes_max`.
    pub fn shrink(&self, ratio: f64) {
        let target = (self.config.hot_bytes_max as f64 * ratio.clamp(0.0, 1.0)) as u64;
        let mut inner = self.inner.lock().expect("block cache poisoned");
        inner.evict_until(target);
    }

    /// Decoded bytes currently held hot.
    pub fn hot_bytes(&self) -> u64 {
        self.inner.lock().expect("block cache poisoned").hot_bytes
    }

    /// A snapshot of hit/miss/eviction counters.
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().expect("block cache poisoned").stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockedGraphBuilder;
    use crate::memory::MemoryTracker;
    use tempfile::tempdir;

    fn store_with_blocks(dir: &std::path::Path, block_count: u32) -> BlockStore {
        let mut builder = BlockedGraphBuilder::create(dir, MemoryTracker::unlimited()).unwrap();
        for b in 0..block_count {
            let base = b * crate::block::BLOCK_SIZE;
            builder.add_edge(base, base + 1, 0).unwrap();
        }
        builder.finish().unwrap();
        BlockStore::new(dir)
    }

    #[test]
    fn test_hit_and_miss_accounting() {
        let dir = tempdir().unwrap();
        let store = store_with_blocks(dir.path(), 1);
        let cache = BlockCache::new(CacheConfig::default());

        assert!(cache.get_or_load(0, &store).unwrap().is_some());
        assert!(cache.get_or_load(0, &store).unwrap().is_some());

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.hit_rate(), 50.0);
        assert!(cache.hot_bytes() > 0);
    }

    #[test]
    fn test_absent_block_is_none_and_not_cached() {
        let dir = tempdir().unwrap();
        let store = BlockStore::new(dir.path());
        let cache = BlockCache::new(CacheConfig::default());

        assert!(cache.get_or_load(9, &store).unwrap().is_none());
        assert!(cache.get_or_load(9, &store).unwrap().is_none());
        assert_eq!(cache.stats().misses, 2);
        assert_eq!(cache.hot_bytes(), 0);
    }

    #[test]
    fn test_budget_evicts_lru() {
        let dir = tempdir().unwrap();
        let store = store_with_blocks(dir.path(), 3);

        // Budget fits roughly one decoded block (each carries two
        // offset arrays of BLOCK_SIZE+1 u32s).
        let one_block = 2 * (crate::block::BLOCK_SIZE as u64 + 1) * 4 + 64;
        let cache = BlockCache::new(CacheConfig {
            hot_bytes_max: one_block,
        });

        cache.get_or_load(0, &store).unwrap();
        cache.get_or_load(1, &store).unwrap();
        cache.get_or_load(2, &store).unwrap();

        let stats = cache.stats();
        assert_eq!(stats.misses, 3);
        assert!(stats.evictions >= 2);
        assert!(cache.hot_bytes() <= one_block);

        // Block 0 was evicted, so this is a miss again.
        cache.get_or_load(0, &store).unwrap();
        assert_eq!(cache.stats().misses, 4);
    }

    #[test]
    fn test_shrink() {
        let dir = tempdir().unwrap();
        let store = store_with_blocks(dir.path(), 2);
        let cache = BlockCache::new(CacheConfig::default());

        cache.get_or_load(0, &store).unwrap();
        cache.get_or_load(1, &store).unwrap();
        assert!(cache.hot_bytes() > 0);

        cache.shrink(0.0);
        assert_eq!(cache.hot_bytes(), 0);
        assert_eq!(cache.stats().evictions, 2);
    }
}
