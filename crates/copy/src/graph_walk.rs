//! The concurrent DAG walk.

use crate::limit::{LimitedRegion, TaskFn, go};
use crate::options::CopyGraphOptions;
use crate::status::StatusTracker;
use ferry_core::{Descriptor, Error, Result};
use ferry_storage::{CachingProxy, Fetcher, Mounter, Namer, ReadOnlyStore, Store, successors};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Copy the DAG rooted at `root` from `src` to `dst`.
///
/// Every reachable, non-foreign descriptor ends up at the destination, each
/// pushed at most once, children strictly before their parents. Work on
/// shared sub-graphs is deduplicated; the first error cancels everything
/// in flight.
pub async fn copy_graph<S, D>(
    src: Arc<S>,
    dst: Arc<D>,
    root: Descriptor,
    opts: CopyGraphOptions,
) -> Result<()>
where
    S: ReadOnlyStore + ?Sized,
    D: Store + ?Sized,
{
    let proxy = Arc::new(CachingProxy::new(src, opts.max_metadata_bytes()));
    copy_graph_with(dst, proxy, root, opts).await
}

/// As [`copy_graph`], reusing a caching proxy that may already hold the
/// root body.
pub(crate) async fn copy_graph_with<S, D>(
    dst: Arc<D>,
    proxy: Arc<CachingProxy<S>>,
    root: Descriptor,
    opts: CopyGraphOptions,
) -> Result<()>
where
    S: ReadOnlyStore + ?Sized,
    D: Store + ?Sized,
{
    let cancel = opts.cancel.clone();
    let limiter = Arc::new(Semaphore::new(opts.concurrency()));
    let walk = Arc::new(GraphWalk {
        tracker: StatusTracker::new(),
        limiter: limiter.clone(),
        proxy,
        dst,
        opts,
    });
    go(&cancel, &limiter, GraphWalk::task_fn(&walk), vec![root]).await
}

/// Race an operation against cancellation. Dropping the in-flight future
/// aborts whatever I/O it was doing.
async fn with_cancel<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        result = fut => result,
        _ = cancel.cancelled() => Err(Error::Cancelled),
    }
}

struct GraphWalk<S: ?Sized, D: ?Sized> {
    tracker: StatusTracker,
    limiter: Arc<Semaphore>,
    proxy: Arc<CachingProxy<S>>,
    dst: Arc<D>,
    opts: CopyGraphOptions,
}

impl<S, D> GraphWalk<S, D>
where
    S: ReadOnlyStore + ?Sized,
    D: Store + ?Sized,
{
    fn task_fn(walk: &Arc<Self>) -> TaskFn<Descriptor> {
        let walk = walk.clone();
        Arc::new(move |cancel, region, desc| walk.clone().visit(cancel, region, desc))
    }

    fn visit(
        self: Arc<Self>,
        cancel: CancellationToken,
        mut region: LimitedRegion,
        desc: Descriptor,
    ) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move {
            // Single-flight gate: a duplicate schedule returns immediately;
            // whoever scheduled it also waits on the owner's token.
            let (token, committed) = self.tracker.try_commit(&desc);
            if !committed {
                return Ok(());
            }

            match Self::process(&self, &cancel, &mut region, &desc).await {
                Ok(()) => {
                    token.close();
                    Ok(())
                }
                Err(err) => {
                    // Leave no claim behind; a rescheduled walk may commit
                    // again if the run survives.
                    self.tracker.abandon(&desc, &token);
                    Err(err)
                }
            }
        })
    }

    async fn process(
        walk: &Arc<Self>,
        cancel: &CancellationToken,
        region: &mut LimitedRegion,
        desc: &Descriptor,
    ) -> Result<()> {
        // Content addressing: a present node implies its whole sub-DAG is
        // present.
        if with_cancel(cancel, walk.dst.exists(desc)).await? {
            trace!(digest = %desc.digest, "sub-graph already present");
            if let Some(hook) = &walk.opts.on_copy_skipped {
                hook(desc.clone()).await?;
            }
            return Ok(());
        }

        let successors: Vec<Descriptor> = with_cancel(cancel, walk.find_successors(desc))
            .await?
            .into_iter()
            .filter(|node| !node.is_foreign_layer())
            .collect();

        if !successors.is_empty() {
            // Hand the permit back while the children run and we wait on
            // them; a DAG deeper than the cap would deadlock otherwise.
            region.end();
            go(cancel, &walk.limiter, Self::task_fn(walk), successors.clone()).await?;
            for node in &successors {
                let (done, committed) = walk.tracker.try_commit(node);
                if committed {
                    // Every successor was scheduled above, so a free slot
                    // means its owner failed and released it; the claim we
                    // just made is not work we intend to do.
                    walk.tracker.abandon(node, &done);
                    return Err(Error::Other(format!(
                        "{}: {}: successor not committed",
                        desc.digest, node.digest
                    )));
                }
                tokio::select! {
                    _ = done.closed() => {}
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                }
            }
            region.start().await?;
        }

        // Non-leaf bodies were cached during successor discovery; leaves
        // stream straight from the source.
        let cached = walk.proxy.is_cached(desc).await?;
        with_cancel(cancel, walk.mount_or_copy_node(desc, cached)).await
    }

    async fn find_successors(&self, desc: &Descriptor) -> Result<Vec<Descriptor>> {
        match &self.opts.find_successors {
            Some(find) => {
                let fetcher: Arc<dyn Fetcher> = self.proxy.clone();
                find(fetcher, desc.clone()).await
            }
            None => successors(self.proxy.as_ref(), desc).await,
        }
    }

    async fn mount_or_copy_node(&self, desc: &Descriptor, cached: bool) -> Result<()> {
        // Manifests are never mounted, whatever a hook claims.
        if !desc.is_manifest() {
            let mounted = match &self.opts.attempt_mount {
                Some(hook) => hook(desc.clone()).await.unwrap_or(false),
                None => self.try_mount(desc).await,
            };
            if mounted {
                debug!(digest = %desc.digest, "mounted");
                if let Some(hook) = &self.opts.on_mounted {
                    hook(desc.clone()).await?;
                }
                return Ok(());
            }
        }
        self.copy_node(desc, cached).await
    }

    /// Capability-based mount: both ends named with non-empty repositories,
    /// same registry, destination able to mount. Any mount error is a
    /// negative attempt.
    async fn try_mount(&self, desc: &Descriptor) -> bool {
        let Some(mounter) = self.dst.as_mounter() else {
            return false;
        };
        let Some(src_name) = self.proxy.source().as_namer().map(|n| n.name()) else {
            return false;
        };
        let Some(dst_name) = self.dst.as_namer().map(|n| n.name()) else {
            return false;
        };
        if src_name.repository.is_empty() || dst_name.repository.is_empty() {
            return false;
        }
        if src_name.registry != dst_name.registry {
            return false;
        }
        mounter.mount(desc, &src_name.repository).await.is_ok()
    }

    async fn copy_node(&self, desc: &Descriptor, cached: bool) -> Result<()> {
        if let Some(hook) = &self.opts.pre_copy {
            match hook(desc.clone()).await {
                Ok(()) => {}
                Err(Error::SkipDescriptor) => return Ok(()),
                Err(err) => return Err(err),
            }
        }

        let content = if cached {
            self.proxy.fetch_cached(desc).await?
        } else {
            self.proxy.source().fetch(desc).await?
        };
        match self.dst.push(desc, content).await {
            Ok(()) | Err(Error::AlreadyExists(_)) => {}
            Err(err) => return Err(err),
        }
        debug!(digest = %desc.digest, size = desc.size, "copied");

        if let Some(hook) = &self.opts.post_copy {
            hook(desc.clone()).await?;
        }
        Ok(())
    }
}
