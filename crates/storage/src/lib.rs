//! Content store abstraction for ferry.
//!
//! This crate provides:
//! - The store trait family: fetch, existence, push, resolve and tag,
//!   plus optional capabilities discovered at runtime
//! - An in-memory store usable as a copy target and as a cache
//! - A read-through caching proxy with a byte budget
//! - Successor discovery for manifest bodies

pub mod graph;
pub mod memory;
pub mod proxy;
pub mod traits;

pub use graph::{parse_successors, successors};
pub use memory::MemoryStore;
pub use proxy::CachingProxy;
pub use traits::{
    ByteStream, Fetcher, Mounter, Namer, ReadOnlyStore, ReadOnlyTarget, ReferenceFetcher,
    ReferencePusher, RepoName, Resolver, Store, Tagger, Target, bytes_stream, read_all,
};
