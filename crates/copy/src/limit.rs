//! Bounded concurrency for the graph walk.

use ferry_core::{Error, Result};
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Holding one permit from the shared concurrency limiter.
///
/// A task holds exactly one permit while it works and hands it back before
/// waiting on its children; otherwise a DAG with more fan-out than the
/// concurrency cap deadlocks. The permit is released on drop on every exit
/// path.
pub(crate) struct LimitedRegion {
    cancel: CancellationToken,
    limiter: Arc<Semaphore>,
    permit: Option<OwnedSemaphorePermit>,
}

impl LimitedRegion {
    fn held(
        cancel: CancellationToken,
        limiter: Arc<Semaphore>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            cancel,
            limiter,
            permit: Some(permit),
        }
    }

    /// Re-acquire a permit when not holding one. No-op while held.
    pub(crate) async fn start(&mut self) -> Result<()> {
        if self.permit.is_some() {
            return Ok(());
        }
        let permit = tokio::select! {
            permit = self.limiter.clone().acquire_owned() => {
                permit.map_err(|_| Error::Cancelled)?
            }
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
        };
        self.permit = Some(permit);
        Ok(())
    }

    /// Release the held permit. No-op while not holding one.
    pub(crate) fn end(&mut self) {
        self.permit.take();
    }
}

/// A unit of work scheduled by [`go`].
pub(crate) type TaskFn<T> =
    Arc<dyn Fn(CancellationToken, LimitedRegion, T) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Invoke `f` over the items concurrently under the limiter.
///
/// A fresh cancellation scope wraps `cancel`. One permit is acquired per
/// item before its task is spawned; when acquisition is interrupted the loop
/// stops and the already-spawned tasks drain. A task that finds its scope
/// cancelled skips as success. The first failure is recorded as the cause
/// and cancels the siblings; the call returns once every spawned task has
/// finished.
pub(crate) async fn go<T>(
    cancel: &CancellationToken,
    limiter: &Arc<Semaphore>,
    f: TaskFn<T>,
    items: Vec<T>,
) -> Result<()>
where
    T: Send + 'static,
{
    let scope = cancel.child_token();
    let cause: Arc<Mutex<Option<Error>>> = Arc::new(Mutex::new(None));
    let mut tasks = JoinSet::new();

    for item in items {
        let permit = tokio::select! {
            permit = limiter.clone().acquire_owned() => {
                match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                }
            }
            _ = scope.cancelled() => break,
        };
        let region = LimitedRegion::held(scope.clone(), limiter.clone(), permit);
        let scope = scope.clone();
        let cause = cause.clone();
        let f = f.clone();
        tasks.spawn(async move {
            if scope.is_cancelled() {
                drop(region);
                return;
            }
            if let Err(err) = f(scope.clone(), region, item).await {
                record(&cause, err);
                scope.cancel();
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            record(&cause, Error::Other(format!("copy task aborted: {err}")));
            scope.cancel();
        }
    }

    let recorded = lock(&cause).take();
    match recorded {
        Some(err) => Err(err),
        None if cancel.is_cancelled() => Err(Error::Cancelled),
        None => Ok(()),
    }
}

fn record(cause: &Mutex<Option<Error>>, err: Error) {
    let mut slot = lock(cause);
    if slot.is_none() {
        *slot = Some(err);
    }
}

fn lock(cause: &Mutex<Option<Error>>) -> std::sync::MutexGuard<'_, Option<Error>> {
    cause.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
