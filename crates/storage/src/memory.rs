//! In-memory content store.

use crate::traits::{ByteStream, Fetcher, ReadOnlyStore, Resolver, Store, Tagger, bytes_stream, read_all};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::{DashMap, mapref::entry::Entry};
use ferry_core::{Descriptor, Digest, Error, Result};
use tracing::instrument;

/// A content store backed by process memory.
///
/// Holds content keyed by digest plus a reference map, so it serves both as
/// a full copy target in tests and as the cache inside the caching proxy.
#[derive(Default)]
pub struct MemoryStore {
    content: DashMap<Digest, Bytes>,
    tags: DashMap<String, Descriptor>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored content entries.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Whether the store holds no content.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

#[async_trait]
impl Fetcher for MemoryStore {
    async fn fetch(&self, desc: &Descriptor) -> Result<ByteStream> {
        match self.content.get(&desc.digest) {
            Some(data) => Ok(bytes_stream(data.clone())),
            None => Err(Error::NotFound(desc.digest.to_string())),
        }
    }
}

#[async_trait]
impl ReadOnlyStore for MemoryStore {
    async fn exists(&self, desc: &Descriptor) -> Result<bool> {
        Ok(self.content.contains_key(&desc.digest))
    }
}

#[async_trait]
impl Store for MemoryStore {
    #[instrument(skip(self, content), fields(store = "memory", digest = %desc.digest))]
    async fn push(&self, desc: &Descriptor, content: ByteStream) -> Result<()> {
        let data = read_all(content).await?;
        if data.len() as u64 != desc.size {
            return Err(Error::SizeMismatch {
                digest: desc.digest.to_string(),
                declared: desc.size,
                actual: data.len() as u64,
            });
        }
        match self.content.entry(desc.digest.clone()) {
            Entry::Occupied(_) => Err(Error::AlreadyExists(desc.digest.to_string())),
            Entry::Vacant(entry) => {
                entry.insert(data);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Resolver for MemoryStore {
    async fn resolve(&self, reference: &str) -> Result<Descriptor> {
        if reference.is_empty() {
            return Err(Error::InvalidReference("empty reference".to_string()));
        }
        self.tags
            .get(reference)
            .map(|desc| desc.clone())
            .ok_or_else(|| Error::NotFound(reference.to_string()))
    }
}

#[async_trait]
impl Tagger for MemoryStore {
    async fn tag(&self, desc: &Descriptor, reference: &str) -> Result<()> {
        if reference.is_empty() {
            return Err(Error::InvalidReference("empty reference".to_string()));
        }
        if !self.content.contains_key(&desc.digest) {
            return Err(Error::NotFound(desc.digest.to_string()));
        }
        self.tags.insert(reference.to_string(), desc.clone());
        Ok(())
    }
}
