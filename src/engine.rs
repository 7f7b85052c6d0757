//! Engine task: the single consumer of one connection's log-line stream.
//!
//! Ordering is the contract here. The transport delivers lines in arrival
//! order and this loop processes one line *to completion* (every rule
//! evaluation, every side effect) before taking the next. A suspension
//! point inside a handler would let a later line's effects interleave with
//! an earlier line's (flag captures landing before the kill that enabled
//! them), so handlers that need a correlated server reply run detached and
//! re-enter through the internal queue instead.
//!
//! Callers awaiting a correlated response suspend only themselves; the
//! transport's read loop keeps running, so the awaited reply can still
//! arrive while this loop is mid-line.

use futures::StreamExt;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::events::{self, Dispatcher};
use crate::gather::Gather;

/// Spawns the per-connection engine task.
pub struct Engine;

impl Engine {
    /// Consume `lines` until the transport closes the stream, applying every
    /// event to `gather`. Returns the gather when the stream ends so callers
    /// can inspect or rewire it.
    pub fn spawn(
        mut gather: Gather,
        mut dispatcher: Dispatcher,
        lines: UnboundedReceiver<String>,
    ) -> JoinHandle<Gather> {
        let (tx, mut msgs) = mpsc::unbounded_channel();
        gather.attach_engine(tx);
        let mut lines = UnboundedReceiverStream::new(lines);

        tokio::spawn(async move {
            info!("engine task started");
            let mut processed = 0u64;
            loop {
                tokio::select! {
                    line = lines.next() => match line {
                        Some(line) => {
                            events::process_line(&mut dispatcher, &mut gather, &line).await;
                            processed += 1;
                        }
                        None => {
                            debug!("log-line stream closed");
                            break;
                        }
                    },
                    Some(msg) = msgs.recv() => {
                        if let Err(error) = gather.handle_msg(msg).await {
                            warn!(%error, "engine message failed");
                        }
                    }
                }
            }
            info!(processed, "engine task ended");
            gather
        })
    }
}
