//! Request/response correlation over the shared message stream.
//!
//! Outbound commands get their answers on the same channel that carries
//! unsolicited log traffic, so "send a command, await its reply" is a
//! predicate registered against the stream: the read loop offers every
//! inbound line to every pending probe, and the first line a predicate
//! accepts resolves that probe's oneshot. Exactly one of {matching line,
//! timeout} delivers: the sender is consumed at most once and
//! deregistration is idempotent, so a late reply after a timeout resolves
//! nothing.

use std::sync::Mutex;

use tokio::sync::oneshot;
use tracing::trace;

/// A registered probe, type-erased so heterogeneous results can share one
/// registry. Returns `true` when the probe is finished and should be
/// removed.
type Matcher = Box<dyn FnMut(&str) -> bool + Send>;

struct PendingEntry {
    id: u64,
    matcher: Matcher,
}

/// Registry of outstanding response probes for one connection.
#[derive(Default)]
pub(crate) struct PendingSet {
    inner: Mutex<PendingInner>,
}

#[derive(Default)]
struct PendingInner {
    next_id: u64,
    entries: Vec<PendingEntry>,
}

impl PendingSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a one-shot probe. The caller awaits the returned receiver
    /// (usually under a timeout) and must call [`PendingSet::remove`] with
    /// the returned id afterwards, whichever way the wait ended.
    pub(crate) fn register<R, F>(&self, predicate: F) -> (u64, oneshot::Receiver<R>)
    where
        R: Send + 'static,
        F: Fn(&str) -> Option<R> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        let matcher: Matcher = Box::new(move |line| {
            let Some(sender) = tx.take() else {
                return true; // already resolved; drop the entry
            };
            match predicate(line) {
                Some(result) => {
                    // The caller may have given up (timeout); a failed send
                    // is fine, the probe is finished either way.
                    let _ = sender.send(result);
                    true
                }
                None => {
                    tx = Some(sender);
                    false
                }
            }
        });

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let id = inner.next_id;
        inner.next_id += 1;
        inner.entries.push(PendingEntry { id, matcher });
        trace!(id, "registered response probe");
        (id, rx)
    }

    /// Offer a line to every pending probe, removing the ones it resolves.
    pub(crate) fn offer(&self, line: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.retain_mut(|entry| !(entry.matcher)(line));
    }

    /// Deregister a probe. Idempotent: removing an id twice, or after the
    /// probe already resolved, is a no-op.
    pub(crate) fn remove(&self, id: u64) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.retain(|entry| entry.id != id);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).entries.len()
    }
}
