//! Instrumented store wrappers for copy tests.

// Not every test binary touches every wrapper.
#![allow(dead_code)]

use async_trait::async_trait;
use dashmap::DashMap;
use ferry_core::{Descriptor, Digest, Error, Result};
use ferry_storage::{
    ByteStream, Fetcher, MemoryStore, Mounter, Namer, ReadOnlyStore, ReferenceFetcher,
    ReferencePusher, RepoName, Resolver, Store, Tagger, bytes_stream, read_all,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A memory store that records pushes and fetches.
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryStore,
    push_delay: Option<Duration>,
    pushes: DashMap<Digest, usize>,
    fetches: DashMap<Digest, usize>,
    push_order: Mutex<Vec<Digest>>,
    in_flight_pushes: AtomicUsize,
    peak_pushes: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slow down pushes so concurrent ones overlap observably.
    pub fn with_push_delay(delay: Duration) -> Self {
        Self {
            push_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn push_count(&self, digest: &Digest) -> usize {
        self.pushes.get(digest).map(|c| *c).unwrap_or(0)
    }

    pub fn total_pushes(&self) -> usize {
        self.pushes.iter().map(|entry| *entry.value()).sum()
    }

    pub fn fetch_count(&self, digest: &Digest) -> usize {
        self.fetches.get(digest).map(|c| *c).unwrap_or(0)
    }

    pub fn push_order(&self) -> Vec<Digest> {
        self.push_order.lock().unwrap().clone()
    }

    /// Index of a digest in the successful push sequence.
    pub fn push_position(&self, digest: &Digest) -> Option<usize> {
        self.push_order().iter().position(|d| d == digest)
    }

    pub fn peak_concurrent_pushes(&self) -> usize {
        self.peak_pushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for CountingStore {
    async fn fetch(&self, desc: &Descriptor) -> Result<ByteStream> {
        *self.fetches.entry(desc.digest.clone()).or_insert(0) += 1;
        self.inner.fetch(desc).await
    }
}

#[async_trait]
impl ReadOnlyStore for CountingStore {
    async fn exists(&self, desc: &Descriptor) -> Result<bool> {
        self.inner.exists(desc).await
    }
}

#[async_trait]
impl Store for CountingStore {
    async fn push(&self, desc: &Descriptor, content: ByteStream) -> Result<()> {
        *self.pushes.entry(desc.digest.clone()).or_insert(0) += 1;
        let now = self.in_flight_pushes.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_pushes.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.push_delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.inner.push(desc, content).await;
        self.in_flight_pushes.fetch_sub(1, Ordering::SeqCst);
        if result.is_ok() {
            self.push_order.lock().unwrap().push(desc.digest.clone());
        }
        result
    }
}

#[async_trait]
impl Resolver for CountingStore {
    async fn resolve(&self, reference: &str) -> Result<Descriptor> {
        self.inner.resolve(reference).await
    }
}

#[async_trait]
impl Tagger for CountingStore {
    async fn tag(&self, desc: &Descriptor, reference: &str) -> Result<()> {
        self.inner.tag(desc, reference).await
    }
}

/// A read-only source with a registry identity and fetch counters.
pub struct NamedStore {
    pub inner: MemoryStore,
    name: RepoName,
    fetches: DashMap<Digest, usize>,
}

impl NamedStore {
    pub fn new(registry: &str, repository: &str) -> Self {
        Self {
            inner: MemoryStore::new(),
            name: RepoName {
                registry: registry.to_string(),
                repository: repository.to_string(),
            },
            fetches: DashMap::new(),
        }
    }

    pub fn fetch_count(&self, digest: &Digest) -> usize {
        self.fetches.get(digest).map(|c| *c).unwrap_or(0)
    }
}

impl Namer for NamedStore {
    fn name(&self) -> RepoName {
        self.name.clone()
    }
}

#[async_trait]
impl Fetcher for NamedStore {
    async fn fetch(&self, desc: &Descriptor) -> Result<ByteStream> {
        *self.fetches.entry(desc.digest.clone()).or_insert(0) += 1;
        self.inner.fetch(desc).await
    }
}

#[async_trait]
impl ReadOnlyStore for NamedStore {
    async fn exists(&self, desc: &Descriptor) -> Result<bool> {
        self.inner.exists(desc).await
    }

    fn as_namer(&self) -> Option<&dyn Namer> {
        Some(self)
    }
}

/// A destination that can mount content from a sibling repository in the
/// same registry.
pub struct MountingStore {
    inner: MemoryStore,
    name: RepoName,
    sibling: Arc<MemoryStore>,
    mounted: Mutex<Vec<Digest>>,
    pushes: DashMap<Digest, usize>,
}

impl MountingStore {
    pub fn new(registry: &str, repository: &str, sibling: Arc<MemoryStore>) -> Self {
        Self {
            inner: MemoryStore::new(),
            name: RepoName {
                registry: registry.to_string(),
                repository: repository.to_string(),
            },
            sibling,
            mounted: Mutex::new(Vec::new()),
            pushes: DashMap::new(),
        }
    }

    pub fn mounted(&self) -> Vec<Digest> {
        self.mounted.lock().unwrap().clone()
    }

    pub fn push_count(&self, digest: &Digest) -> usize {
        self.pushes.get(digest).map(|c| *c).unwrap_or(0)
    }
}

impl Namer for MountingStore {
    fn name(&self) -> RepoName {
        self.name.clone()
    }
}

#[async_trait]
impl Mounter for MountingStore {
    async fn mount(&self, desc: &Descriptor, _from_repository: &str) -> Result<()> {
        // Registry-side copy: the bytes come from the sibling repository,
        // never from the client.
        let data = read_all(self.sibling.fetch(desc).await?).await?;
        match self.inner.push(desc, bytes_stream(data)).await {
            Ok(()) | Err(Error::AlreadyExists(_)) => {}
            Err(err) => return Err(err),
        }
        self.mounted.lock().unwrap().push(desc.digest.clone());
        Ok(())
    }
}

#[async_trait]
impl Fetcher for MountingStore {
    async fn fetch(&self, desc: &Descriptor) -> Result<ByteStream> {
        self.inner.fetch(desc).await
    }
}

#[async_trait]
impl ReadOnlyStore for MountingStore {
    async fn exists(&self, desc: &Descriptor) -> Result<bool> {
        self.inner.exists(desc).await
    }

    fn as_namer(&self) -> Option<&dyn Namer> {
        Some(self)
    }
}

#[async_trait]
impl Store for MountingStore {
    async fn push(&self, desc: &Descriptor, content: ByteStream) -> Result<()> {
        *self.pushes.entry(desc.digest.clone()).or_insert(0) += 1;
        self.inner.push(desc, content).await
    }

    fn as_mounter(&self) -> Option<&dyn Mounter> {
        Some(self)
    }
}

/// A destination that supports atomic push-with-reference.
#[derive(Default)]
pub struct RefTarget {
    pub inner: MemoryStore,
    pushes: DashMap<Digest, usize>,
    reference_pushes: Mutex<Vec<(Digest, String)>>,
}

impl RefTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_count(&self, digest: &Digest) -> usize {
        self.pushes.get(digest).map(|c| *c).unwrap_or(0)
    }

    pub fn reference_pushes(&self) -> Vec<(Digest, String)> {
        self.reference_pushes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReferencePusher for RefTarget {
    async fn push_reference(
        &self,
        desc: &Descriptor,
        content: ByteStream,
        reference: &str,
    ) -> Result<()> {
        match self.inner.push(desc, content).await {
            Ok(()) | Err(Error::AlreadyExists(_)) => {}
            Err(err) => return Err(err),
        }
        self.inner.tag(desc, reference).await?;
        self.reference_pushes
            .lock()
            .unwrap()
            .push((desc.digest.clone(), reference.to_string()));
        Ok(())
    }
}

#[async_trait]
impl Fetcher for RefTarget {
    async fn fetch(&self, desc: &Descriptor) -> Result<ByteStream> {
        self.inner.fetch(desc).await
    }
}

#[async_trait]
impl ReadOnlyStore for RefTarget {
    async fn exists(&self, desc: &Descriptor) -> Result<bool> {
        self.inner.exists(desc).await
    }
}

#[async_trait]
impl Store for RefTarget {
    async fn push(&self, desc: &Descriptor, content: ByteStream) -> Result<()> {
        *self.pushes.entry(desc.digest.clone()).or_insert(0) += 1;
        self.inner.push(desc, content).await
    }

    fn as_reference_pusher(&self) -> Option<&dyn ReferencePusher> {
        Some(self)
    }
}

#[async_trait]
impl Resolver for RefTarget {
    async fn resolve(&self, reference: &str) -> Result<Descriptor> {
        self.inner.resolve(reference).await
    }
}

#[async_trait]
impl Tagger for RefTarget {
    async fn tag(&self, desc: &Descriptor, reference: &str) -> Result<()> {
        self.inner.tag(desc, reference).await
    }
}

/// A source that resolves and fetches a reference in one call.
#[derive(Default)]
pub struct RefSource {
    pub inner: MemoryStore,
    fetches: DashMap<Digest, usize>,
    reference_fetches: AtomicUsize,
}

impl RefSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetch_count(&self, digest: &Digest) -> usize {
        self.fetches.get(digest).map(|c| *c).unwrap_or(0)
    }

    pub fn reference_fetches(&self) -> usize {
        self.reference_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReferenceFetcher for RefSource {
    async fn fetch_reference(&self, reference: &str) -> Result<(Descriptor, ByteStream)> {
        self.reference_fetches.fetch_add(1, Ordering::SeqCst);
        let desc = self.inner.resolve(reference).await?;
        let content = self.inner.fetch(&desc).await?;
        Ok((desc, content))
    }
}

#[async_trait]
impl Fetcher for RefSource {
    async fn fetch(&self, desc: &Descriptor) -> Result<ByteStream> {
        *self.fetches.entry(desc.digest.clone()).or_insert(0) += 1;
        self.inner.fetch(desc).await
    }
}

#[async_trait]
impl ReadOnlyStore for RefSource {
    async fn exists(&self, desc: &Descriptor) -> Result<bool> {
        self.inner.exists(desc).await
    }

    fn as_reference_fetcher(&self) -> Option<&dyn ReferenceFetcher> {
        Some(self)
    }
}

#[async_trait]
impl Resolver for RefSource {
    async fn resolve(&self, reference: &str) -> Result<Descriptor> {
        self.inner.resolve(reference).await
    }
}

/// A destination whose push fails for one chosen digest.
pub struct FailingStore {
    pub inner: MemoryStore,
    fail_digest: Digest,
}

impl FailingStore {
    pub fn failing_on(fail_digest: Digest) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_digest,
        }
    }
}

#[async_trait]
impl Fetcher for FailingStore {
    async fn fetch(&self, desc: &Descriptor) -> Result<ByteStream> {
        self.inner.fetch(desc).await
    }
}

#[async_trait]
impl ReadOnlyStore for FailingStore {
    async fn exists(&self, desc: &Descriptor) -> Result<bool> {
        self.inner.exists(desc).await
    }
}

#[async_trait]
impl Store for FailingStore {
    async fn push(&self, desc: &Descriptor, content: ByteStream) -> Result<()> {
        if desc.digest == self.fail_digest {
            return Err(Error::Other("injected push failure".to_string()));
        }
        self.inner.push(desc, content).await
    }
}

/// A source whose fetches stall, for cancellation tests.
pub struct SlowStore {
    pub inner: MemoryStore,
    delay: Duration,
}

impl SlowStore {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            inner: MemoryStore::new(),
            delay,
        }
    }
}

#[async_trait]
impl Fetcher for SlowStore {
    async fn fetch(&self, desc: &Descriptor) -> Result<ByteStream> {
        tokio::time::sleep(self.delay).await;
        self.inner.fetch(desc).await
    }
}

#[async_trait]
impl ReadOnlyStore for SlowStore {
    async fn exists(&self, desc: &Descriptor) -> Result<bool> {
        self.inner.exists(desc).await
    }
}
