//! Copy options and hooks.

use ferry_core::{Descriptor, Platform, Result};
use ferry_storage::{Fetcher, ReadOnlyStore};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Default maximum number of concurrent copy tasks.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Default budget for in-memory caching of manifest bodies (4 MiB).
pub const DEFAULT_MAX_METADATA_BYTES: u64 = 4 * 1024 * 1024;

/// An async hook invoked with a descriptor.
pub type Hook = Arc<dyn Fn(Descriptor) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A mount attempt. `true` means the descriptor was mounted and needs no
/// transfer; an error counts as a failed attempt and falls back to copying.
pub type MountHook = Arc<dyn Fn(Descriptor) -> BoxFuture<'static, Result<bool>> + Send + Sync>;

/// Custom successor discovery. The fetcher caches what it reads, so it
/// suits manifest bodies; fetch large blobs from the source store instead.
pub type SuccessorsFn = Arc<
    dyn Fn(Arc<dyn Fetcher>, Descriptor) -> BoxFuture<'static, Result<Vec<Descriptor>>>
        + Send
        + Sync,
>;

/// Maps the resolved root to the effective root of the walk.
pub type MapRootFn = Arc<
    dyn Fn(Arc<dyn ReadOnlyStore>, Descriptor) -> BoxFuture<'static, Result<Descriptor>>
        + Send
        + Sync,
>;

/// Options for [`copy_graph`](crate::copy_graph).
#[derive(Clone, Default)]
pub struct CopyGraphOptions {
    /// Maximum number of concurrent copy tasks. 0 means the default (3).
    pub concurrency: usize,

    /// Byte budget for the manifest body cache. 0 means the default (4 MiB).
    pub max_metadata_bytes: u64,

    /// Cancels the walk when triggered.
    pub cancel: CancellationToken,

    /// Runs before a node's transfer. Returning
    /// [`Error::SkipDescriptor`](ferry_core::Error::SkipDescriptor)
    /// suppresses the transfer.
    pub pre_copy: Option<Hook>,

    /// Runs after a node's successful transfer.
    pub post_copy: Option<Hook>,

    /// Runs when the sub-DAG rooted at a node already exists at the
    /// destination.
    pub on_copy_skipped: Option<Hook>,

    /// Tries to mount a node at the destination instead of copying it.
    /// When unset, the copier attempts a capability-based mount on its own.
    pub attempt_mount: Option<MountHook>,

    /// Runs when a mount succeeded.
    pub on_mounted: Option<Hook>,

    /// Overrides successor discovery.
    pub find_successors: Option<SuccessorsFn>,
}

impl CopyGraphOptions {
    pub(crate) fn concurrency(&self) -> usize {
        if self.concurrency == 0 {
            DEFAULT_CONCURRENCY
        } else {
            self.concurrency
        }
    }

    pub(crate) fn max_metadata_bytes(&self) -> u64 {
        if self.max_metadata_bytes == 0 {
            DEFAULT_MAX_METADATA_BYTES
        } else {
            self.max_metadata_bytes
        }
    }
}

/// Options for [`copy`](crate::copy).
#[derive(Clone, Default)]
pub struct CopyOptions {
    /// Options for the underlying graph walk.
    pub graph: CopyGraphOptions,

    /// Maps the resolved root to the effective root of the walk, e.g. for
    /// platform selection. Its fetches bypass the body cache.
    pub map_root: Option<MapRootFn>,
}

impl CopyOptions {
    /// Select the manifest matching `platform` as the effective root,
    /// chaining after any previously configured root mapping.
    pub fn with_target_platform(&mut self, platform: Platform) {
        let previous = self.map_root.take();
        self.map_root = Some(Arc::new(move |store, root| {
            let previous = previous.clone();
            let platform = platform.clone();
            Box::pin(async move {
                let root = match previous {
                    Some(map) => map(store.clone(), root).await?,
                    None => root,
                };
                crate::platform::select_manifest(store, root, &platform).await
            })
        }));
    }
}
