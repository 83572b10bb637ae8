// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LRU cache for proxy nonce lookups.
//!
//! Serves `GET /proxy/{proxy}/nonce` without a ledger round trip. Entries are
//! dropped whenever the relayer broadcasts to the proxy, so a cached nonce is
//! never older than the relayer's last write.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use alloy::primitives::{Address, U256};
use lru::LruCache;

/// Proxy state as last read from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyState {
    pub owner: Address,
    pub nonce: U256,
}

struct CacheEntry {
    state: ProxyState,
    inserted_at: Instant,
}

/// In-process LRU cache of proxy nonces.
pub struct NonceCache {
    cache: Mutex<LruCache<Address, CacheEntry>>,
    ttl: Duration,
}

impl NonceCache {
    /// Create a new cache with the given capacity and TTL.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl,
        }
    }

    /// Cached state for a proxy, or `None` if absent or expired.
    pub fn get(&self, proxy: &Address) -> Option<ProxyState> {
        let mut cache = self.cache.lock().ok()?;
        if let Some(entry) = cache.get(proxy) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.state);
            }
            cache.pop(proxy);
        }
        None
    }

    pub fn put(&self, proxy: Address, state: ProxyState) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(
                proxy,
                CacheEntry {
                    state,
                    inserted_at: Instant::now(),
                },
            );
        }
    }

    pub fn invalidate(&self, proxy: &Address) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.pop(proxy);
        }
    }
}
