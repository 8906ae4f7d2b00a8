//! Store trait definitions.
//!
//! A content store maps descriptors to opaque byte streams. The copy engine
//! consumes stores through the narrow traits below; optional capabilities
//! (naming, cross-repository mounts, combined reference operations) are
//! discovered at runtime through accessor methods that default to `None`.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use ferry_core::{Descriptor, Result};
use futures::{Stream, StreamExt};
use std::pin::Pin;

/// A boxed stream of bytes for streaming content reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Wrap an in-memory buffer as a one-shot [`ByteStream`].
pub fn bytes_stream(data: Bytes) -> ByteStream {
    Box::pin(futures::stream::once(async move { Ok(data) }))
}

/// Collect a [`ByteStream`] into a single buffer.
pub async fn read_all(mut stream: ByteStream) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

/// Read access to content by descriptor.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    /// Fetch the content identified by the descriptor.
    async fn fetch(&self, desc: &Descriptor) -> Result<ByteStream>;
}

/// A readable content store.
#[async_trait]
pub trait ReadOnlyStore: Fetcher {
    /// Check whether the described content is present.
    async fn exists(&self, desc: &Descriptor) -> Result<bool>;

    /// The store's registry/repository identity, if it has one.
    fn as_namer(&self) -> Option<&dyn Namer> {
        None
    }

    /// Combined resolve-and-fetch capability, if supported.
    fn as_reference_fetcher(&self) -> Option<&dyn ReferenceFetcher> {
        None
    }
}

/// A writable content store.
#[async_trait]
pub trait Store: ReadOnlyStore {
    /// Ingest content for the descriptor. Returns *already-exists* when the
    /// content is present; callers treat that as success.
    async fn push(&self, desc: &Descriptor, content: ByteStream) -> Result<()>;

    /// Cross-repository mount capability, if supported.
    fn as_mounter(&self) -> Option<&dyn Mounter> {
        None
    }

    /// Atomic push-with-reference capability, if supported.
    fn as_reference_pusher(&self) -> Option<&dyn ReferencePusher> {
        None
    }
}

/// Resolution of human-readable references to descriptors.
#[async_trait]
pub trait Resolver: Send + Sync + 'static {
    /// Resolve a reference to the descriptor it points at.
    async fn resolve(&self, reference: &str) -> Result<Descriptor>;
}

/// Tagging of descriptors with human-readable references.
#[async_trait]
pub trait Tagger: Send + Sync + 'static {
    /// Point the reference at the described content.
    async fn tag(&self, desc: &Descriptor, reference: &str) -> Result<()>;
}

/// A readable store with reference resolution: a copy source.
pub trait ReadOnlyTarget: ReadOnlyStore + Resolver {}

impl<T: ReadOnlyStore + Resolver + ?Sized> ReadOnlyTarget for T {}

/// A writable store with reference resolution and tagging: a copy
/// destination.
pub trait Target: Store + Resolver + Tagger {}

impl<T: Store + Resolver + Tagger + ?Sized> Target for T {}

/// The registry/repository identity of a store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepoName {
    /// Registry host, e.g. `registry.example.com`.
    pub registry: String,
    /// Repository path within the registry, e.g. `library/app`.
    pub repository: String,
}

/// Reports the registry and repository a store serves.
pub trait Namer: Send + Sync {
    fn name(&self) -> RepoName;
}

/// Mounts content from a sibling repository in the same registry, avoiding
/// a byte transfer.
#[async_trait]
pub trait Mounter: Send + Sync {
    async fn mount(&self, desc: &Descriptor, from_repository: &str) -> Result<()>;
}

/// Pushes content and tags it in a single operation.
#[async_trait]
pub trait ReferencePusher: Send + Sync {
    async fn push_reference(
        &self,
        desc: &Descriptor,
        content: ByteStream,
        reference: &str,
    ) -> Result<()>;
}

/// Resolves a reference and fetches its content in a single operation.
#[async_trait]
pub trait ReferenceFetcher: Send + Sync {
    async fn fetch_reference(&self, reference: &str) -> Result<(Descriptor, ByteStream)>;
}
