//! Reference-level copy: resolve the root, remap it, arrange tagging.

use crate::graph_walk::copy_graph_with;
use crate::options::{CopyGraphOptions, CopyOptions};
use ferry_core::{Descriptor, Error, Result};
use ferry_storage::{
    CachingProxy, Fetcher, ReadOnlyStore, ReadOnlyTarget, ReferenceFetcher, ReferencePusher,
    Resolver, Store, Tagger, Target, parse_successors, read_all,
};
use std::sync::Arc;
use tracing::debug;

/// Copy the DAG rooted at `src_ref` from `src` to `dst` and point `dst_ref`
/// at its root. An empty `dst_ref` defaults to `src_ref`.
///
/// Returns the effective root descriptor (after any root mapping).
pub async fn copy<S, D>(
    src: Arc<S>,
    src_ref: &str,
    dst: Arc<D>,
    dst_ref: &str,
    opts: CopyOptions,
) -> Result<Descriptor>
where
    S: ReadOnlyTarget + ?Sized,
    D: Target + ?Sized,
{
    if src_ref.is_empty() {
        return Err(Error::InvalidReference(
            "empty source reference".to_string(),
        ));
    }
    let dst_ref = if dst_ref.is_empty() { src_ref } else { dst_ref };

    let proxy = Arc::new(CachingProxy::new(src, opts.graph.max_metadata_bytes()));
    let root = resolve_root(src_ref, &proxy).await?;
    debug!(reference = src_ref, digest = %root.digest, "resolved root");

    let root = match &opts.map_root {
        Some(map) => {
            // The mapper's own fetches must not spend the cache budget.
            proxy.set_stop_caching(true);
            let store: Arc<dyn ReadOnlyStore> = proxy.clone();
            let mapped = map(store, root).await;
            proxy.set_stop_caching(false);
            mapped?
        }
        None => root,
    };

    let graph_opts = prepare_copy(&dst, dst_ref, &proxy, &root, opts.graph);
    copy_graph_with(dst, proxy, root.clone(), graph_opts).await?;
    Ok(root)
}

/// Resolve the source reference to the root descriptor, priming the proxy
/// cache with the root body when the source can fetch by reference.
async fn resolve_root<S>(reference: &str, proxy: &Arc<CachingProxy<S>>) -> Result<Descriptor>
where
    S: ReadOnlyTarget + ?Sized,
{
    let src = proxy.source();
    let Some(ref_fetcher) = src.as_reference_fetcher() else {
        return src.resolve(reference).await;
    };

    let (root, content) = ref_fetcher.fetch_reference(reference).await?;
    if root.is_manifest() {
        // The body gets read for successor discovery anyway; keep it, and
        // reject one that does not parse before any transfer starts.
        let body = read_all(content).await?;
        parse_successors(&root, &body)?;
        proxy.prime(&root, body).await;
    }
    Ok(root)
}

/// Wrap the hooks so a successful copy leaves `dst_ref` pointing at the
/// root: destinations that push with a reference get a pre-copy fast path,
/// everything else gets tagged after the root's transfer. An already-present
/// root is tagged through the skip hook.
fn prepare_copy<S, D>(
    dst: &Arc<D>,
    dst_ref: &str,
    proxy: &Arc<CachingProxy<S>>,
    root: &Descriptor,
    mut opts: CopyGraphOptions,
) -> CopyGraphOptions
where
    S: ReadOnlyStore + ?Sized,
    D: Target + ?Sized,
{
    if dst.as_reference_pusher().is_some() {
        let pre_copy = opts.pre_copy.take();
        let post_copy = opts.post_copy.clone();
        let dst = dst.clone();
        let proxy = proxy.clone();
        let root = root.clone();
        let reference = dst_ref.to_string();
        opts.pre_copy = Some(Arc::new(move |desc| {
            let pre_copy = pre_copy.clone();
            let post_copy = post_copy.clone();
            let dst = dst.clone();
            let proxy = proxy.clone();
            let root = root.clone();
            let reference = reference.clone();
            Box::pin(async move {
                if let Some(hook) = pre_copy {
                    hook(desc.clone()).await?;
                }
                if desc != root {
                    return Ok(());
                }
                push_root_with_reference(&dst, &proxy, &desc, &reference).await?;
                if let Some(hook) = post_copy {
                    hook(desc).await?;
                }
                // The root is fully handled; suppress the default transfer.
                Err(Error::SkipDescriptor)
            })
        }));
    } else {
        let post_copy = opts.post_copy.take();
        let dst = dst.clone();
        let root = root.clone();
        let reference = dst_ref.to_string();
        opts.post_copy = Some(Arc::new(move |desc| {
            let post_copy = post_copy.clone();
            let dst = dst.clone();
            let root = root.clone();
            let reference = reference.clone();
            Box::pin(async move {
                if desc == root {
                    dst.tag(&root, &reference).await?;
                }
                if let Some(hook) = post_copy {
                    hook(desc).await?;
                }
                Ok(())
            })
        }));
    }

    let on_copy_skipped = opts.on_copy_skipped.take();
    let dst = dst.clone();
    let proxy = proxy.clone();
    let root = root.clone();
    let reference = dst_ref.to_string();
    opts.on_copy_skipped = Some(Arc::new(move |desc| {
        let on_copy_skipped = on_copy_skipped.clone();
        let dst = dst.clone();
        let proxy = proxy.clone();
        let root = root.clone();
        let reference = reference.clone();
        Box::pin(async move {
            if desc != root {
                if let Some(hook) = on_copy_skipped {
                    return hook(desc).await;
                }
                return Ok(());
            }

            // An already-present root still has to end up tagged.
            if dst.as_reference_pusher().is_some() {
                // The reference push tags by re-pushing the content, so the
                // user hook is not invoked in this flavor.
                return push_root_with_reference(&dst, &proxy, &desc, &reference).await;
            }
            if let Some(hook) = on_copy_skipped {
                hook(desc).await?;
            }
            dst.tag(&root, &reference).await
        })
    }));

    opts
}

/// Push the root together with its reference, preferring the cached body
/// and falling back to a source fetch when it was never cached (a blob
/// root never passes through the body cache).
async fn push_root_with_reference<S, D>(
    dst: &Arc<D>,
    proxy: &Arc<CachingProxy<S>>,
    desc: &Descriptor,
    reference: &str,
) -> Result<()>
where
    S: ReadOnlyStore + ?Sized,
    D: Target + ?Sized,
{
    let Some(pusher) = dst.as_reference_pusher() else {
        return Err(Error::Unsupported(
            "destination does not push references".to_string(),
        ));
    };
    let content = match proxy.fetch_cached(desc).await {
        Ok(stream) => stream,
        Err(Error::NotFound(_)) => proxy.source().fetch(desc).await?,
        Err(err) => return Err(err),
    };
    match pusher.push_reference(desc, content, reference).await {
        Ok(()) | Err(Error::AlreadyExists(_)) => Ok(()),
        Err(err) => Err(err),
    }
}
