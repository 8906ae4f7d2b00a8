//! Read-through caching proxy over a source store.
//!
//! Manifest bodies are small and read twice during a copy (once for
//! successor discovery, once for the transfer), so the proxy keeps them in
//! memory. The byte budget bounds what adversarially nested manifests can
//! pin: once an admission would exceed it, the cache latches shut and all
//! further reads pass through uncached. Cached entries stay valid.

use crate::memory::MemoryStore;
use crate::traits::{ByteStream, Fetcher, ReadOnlyStore, Store, bytes_stream, read_all};
use async_trait::async_trait;
use bytes::Bytes;
use ferry_core::{Descriptor, Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

/// A caching front for a read-only source store.
pub struct CachingProxy<S: ?Sized> {
    cache: MemoryStore,
    max_bytes: u64,
    used: AtomicU64,
    full: AtomicBool,
    stop_caching: AtomicBool,
    source: Arc<S>,
}

impl<S: ReadOnlyStore + ?Sized> CachingProxy<S> {
    /// Create a proxy over `source` that caches at most `max_bytes` of
    /// content.
    pub fn new(source: Arc<S>, max_bytes: u64) -> Self {
        Self {
            cache: MemoryStore::new(),
            max_bytes,
            used: AtomicU64::new(0),
            full: AtomicBool::new(false),
            stop_caching: AtomicBool::new(false),
            source,
        }
    }

    /// The wrapped source store.
    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Toggle pass-through mode. While set, fetches go straight to the
    /// source and nothing new is cached.
    pub fn set_stop_caching(&self, stop: bool) {
        self.stop_caching.store(stop, Ordering::Release);
    }

    /// Fetch from the cache only; *not-found* when the descriptor was never
    /// cached.
    pub async fn fetch_cached(&self, desc: &Descriptor) -> Result<ByteStream> {
        self.cache.fetch(desc).await
    }

    /// Whether the descriptor's body is in the cache.
    pub async fn is_cached(&self, desc: &Descriptor) -> Result<bool> {
        self.cache.exists(desc).await
    }

    /// Admit an already-fetched body into the cache, subject to the budget.
    pub async fn prime(&self, desc: &Descriptor, data: Bytes) {
        self.admit(desc, data).await;
    }

    async fn admit(&self, desc: &Descriptor, data: Bytes) -> bool {
        let len = data.len() as u64;
        if !self.try_reserve(len) {
            debug!(digest = %desc.digest, size = len, "cache budget reached, passing through");
            return false;
        }
        match self.cache.push(desc, bytes_stream(data)).await {
            Ok(()) => true,
            // A concurrent fetch of the same descriptor won the insert; the
            // bytes are identical, so return the reservation and move on.
            Err(Error::AlreadyExists(_)) => {
                self.release(len);
                true
            }
            Err(_) => {
                self.release(len);
                false
            }
        }
    }

    fn try_reserve(&self, len: u64) -> bool {
        if self.full.load(Ordering::Acquire) {
            return false;
        }
        let reserved = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(len).filter(|next| *next <= self.max_bytes)
            })
            .is_ok();
        if !reserved {
            self.full.store(true, Ordering::Release);
        }
        reserved
    }

    fn release(&self, len: u64) {
        self.used.fetch_sub(len, Ordering::AcqRel);
    }
}

#[async_trait]
impl<S: ReadOnlyStore + ?Sized> Fetcher for CachingProxy<S> {
    async fn fetch(&self, desc: &Descriptor) -> Result<ByteStream> {
        // While caching is paused, reads still hit the cache but misses pass
        // through without a cache write.
        if self.stop_caching.load(Ordering::Acquire) {
            return match self.cache.fetch(desc).await {
                Ok(stream) => Ok(stream),
                Err(Error::NotFound(_)) => self.source.fetch(desc).await,
                Err(err) => Err(err),
            };
        }
        match self.cache.fetch(desc).await {
            Ok(stream) => return Ok(stream),
            Err(Error::NotFound(_)) => {}
            Err(err) => return Err(err),
        }
        let data = read_all(self.source.fetch(desc).await?).await?;
        self.admit(desc, data.clone()).await;
        Ok(bytes_stream(data))
    }
}

#[async_trait]
impl<S: ReadOnlyStore + ?Sized> ReadOnlyStore for CachingProxy<S> {
    async fn exists(&self, desc: &Descriptor) -> Result<bool> {
        if self.cache.exists(desc).await? {
            return Ok(true);
        }
        self.source.exists(desc).await
    }
}
