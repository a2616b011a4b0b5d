//! Lightweight global metrics for a cleanup run.
//!
//! Потокобезопасные атомарные счётчики для подсистем:
//! - Registry I/O (cache, saves)
//! - Snapshots (created, pruned)
//! - Mutations (entities removed / restored / renamed)
//!
//! Печатаются в сводке `run` и `snapshots`.

use std::sync::atomic::{AtomicU64, Ordering};

// ----- Registry I/O -----
static REGISTRY_CACHE_HITS: AtomicU64 = AtomicU64::new(0);
static REGISTRY_CACHE_MISSES: AtomicU64 = AtomicU64::new(0);
static REGISTRY_SAVES: AtomicU64 = AtomicU64::new(0);

// ----- Snapshots -----
static SNAPSHOTS_CREATED: AtomicU64 = AtomicU64::new(0);
static SNAPSHOTS_PRUNED: AtomicU64 = AtomicU64::new(0);

// ----- Mutations -----
static ENTITIES_REMOVED: AtomicU64 = AtomicU64::new(0);
static ENTITIES_RESTORED: AtomicU64 = AtomicU64::new(0);
static ENTITIES_RENAMED: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub registry_cache_hits: u64,
    pub registry_cache_misses: u64,
    pub registry_saves: u64,

    pub snapshots_created: u64,
    pub snapshots_pruned: u64,

    pub entities_removed: u64,
    pub entities_restored: u64,
    pub entities_renamed: u64,
}

pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        registry_cache_hits: REGISTRY_CACHE_HITS.load(Ordering::Relaxed),
        registry_cache_misses: REGISTRY_CACHE_MISSES.load(Ordering::Relaxed),
        registry_saves: REGISTRY_SAVES.load(Ordering::Relaxed),
        snapshots_created: SNAPSHOTS_CREATED.load(Ordering::Relaxed),
        snapshots_pruned: SNAPSHOTS_PRUNED.load(Ordering::Relaxed),
        entities_removed: ENTITIES_REMOVED.load(Ordering::Relaxed),
        entities_restored: ENTITIES_RESTORED.load(Ordering::Relaxed),
        entities_renamed: ENTITIES_RENAMED.load(Ordering::Relaxed),
    }
}

#[inline]
pub fn record_cache_hit() {
    REGISTRY_CACHE_HITS.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub fn record_cache_miss() {
    REGISTRY_CACHE_MISSES.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub fn record_registry_save() {
    REGISTRY_SAVES.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub fn record_snapshot_created() {
    SNAPSHOTS_CREATED.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub fn record_snapshots_pruned(n: u64) {
    SNAPSHOTS_PRUNED.fetch_add(n, Ordering::Relaxed);
}

#[inline]
pub fn record_entities_removed(n: u64) {
    ENTITIES_REMOVED.fetch_add(n, Ordering::Relaxed);
}

#[inline]
pub fn record_entities_restored(n: u64) {
    ENTITIES_RESTORED.fetch_add(n, Ordering::Relaxed);
}

#[inline]
pub fn record_entities_renamed(n: u64) {
    ENTITIES_RENAMED.fetch_add(n, Ordering::Relaxed);
}

impl MetricsSnapshot {
    /// One line per counter group, for the run summary.
    pub fn summary_lines(&self) -> Vec<String> {
        vec![
            format!(
                "registry: saves={}, cache hits={}, misses={}",
                self.registry_saves, self.registry_cache_hits, self.registry_cache_misses
            ),
            format!(
                "snapshots: created={}, pruned={}",
                self.snapshots_created, self.snapshots_pruned
            ),
            format!(
                "entities: removed={}, restored={}, renamed={}",
                self.entities_removed, self.entities_restored, self.entities_renamed
            ),
        ]
    }
}
