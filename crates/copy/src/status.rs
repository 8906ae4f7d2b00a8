//! Single-flight tracking of per-descriptor work.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use ferry_core::{Descriptor, Digest};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// A one-shot broadcast closed by the actor that committed to a
/// descriptor's work. Closed exactly once, on success; a failed owner
/// abandons the token and waiters unblock through scope cancellation.
#[derive(Clone, Default)]
pub(crate) struct CommitToken {
    inner: Arc<TokenInner>,
}

#[derive(Default)]
struct TokenInner {
    done: AtomicBool,
    notify: Notify,
}

impl CommitToken {
    /// Broadcast completion.
    pub(crate) fn close(&self) {
        self.inner.done.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Wait until the token is closed.
    pub(crate) async fn closed(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a close between the check
            // and the await still wakes us.
            notified.as_mut().enable();
            if self.inner.done.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }

    fn is(&self, other: &CommitToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    #[cfg(test)]
    fn is_closed(&self) -> bool {
        self.inner.done.load(Ordering::Acquire)
    }
}

/// Tracks which descriptors have an actor committed to them.
#[derive(Default)]
pub(crate) struct StatusTracker {
    statuses: DashMap<Digest, CommitToken>,
}

impl StatusTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Claim the work for a descriptor. Returns `(token, true)` when the
    /// caller now owns the work; `(token, false)` when another actor holds
    /// it and the caller should wait on the token instead.
    pub(crate) fn try_commit(&self, desc: &Descriptor) -> (CommitToken, bool) {
        match self.statuses.entry(desc.digest.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let token = CommitToken::default();
                entry.insert(token.clone());
                (token, true)
            }
        }
    }

    /// Release a failed owner's claim so a later schedule may commit again.
    /// The token stays unclosed; its waiters unblock through cancellation.
    pub(crate) fn abandon(&self, desc: &Descriptor, token: &CommitToken) {
        self.statuses
            .remove_if(&desc.digest, |_, current| current.is(token));
    }
}
