//! Evaluation cache
//!
//! Memoizes output descriptions by (lock identity, platform, output key).
//! A new lock has a new identity, so entries for an old lock simply stop
//! being reachable; nothing is invalidated explicitly.

use crate::eval::OutputDescription;
use crate::lock::LockIdentity;
use crate::platform::PlatformId;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cache key: everything an evaluation may depend on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub lock: LockIdentity,
    pub platform: PlatformId,
    pub output: String,
}

impl CacheKey {
    pub fn new(lock: &LockIdentity, platform: &PlatformId, output: &str) -> Self {
        Self {
            lock: lock.clone(),
            platform: platform.clone(),
            output: output.to_string(),
        }
    }
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Concurrent memo table shared by every evaluation task
#[derive(Debug, Default)]
pub struct EvalCache {
    entries: DashMap<CacheKey, OutputDescription>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EvalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a stored description, counting the hit or miss
    pub fn get(&self, key: &CacheKey) -> Option<OutputDescription> {
        let found = self.entries.get(key).map(|entry| entry.value().clone());
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Store a description; a later `put` for the same key replaces it
    pub fn put(&self, key: CacheKey, value: OutputDescription) {
        self.entries.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}
