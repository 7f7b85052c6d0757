//! Replay suppression for log lines.
//!
//! Some transports echo the same physical event twice, re-logged with a
//! timestamp one second apart. The cache keys on the line with its leading
//! timestamp token stripped, so those re-logs collide, and holds each key
//! for a fixed window. The cache is owned by one engine: never shared
//! across connections, so one server's chatter cannot suppress another's.

use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::Clock;

/// Suppression window in milliseconds.
pub const DEDUP_WINDOW_MS: u64 = 1000;

/// Bounded-lifetime set of recently seen lines.
pub struct DedupCache {
    entries: HashMap<String, u64>,
    window_ms: u64,
    clock: Arc<dyn Clock>,
}

impl DedupCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { entries: HashMap::new(), window_ms: DEDUP_WINDOW_MS, clock }
    }

    /// Admit a line, returning `false` if its normalized form was already
    /// seen inside the window. Expired entries are purged on the way in;
    /// no timers are scheduled.
    pub fn admit(&mut self, line: &str) -> bool {
        let now = self.clock.now_ms();
        self.entries.retain(|_, expires_at| *expires_at > now);

        let key = strip_timestamp(line);
        if self.entries.contains_key(key) {
            return false;
        }
        self.entries.insert(key.to_string(), now + self.window_ms);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Drop a leading `[..]` timestamp token, if present.
fn strip_timestamp(line: &str) -> &str {
    if let Some(rest) = line.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return rest[end + 1..].trim_start();
        }
    }
    line
}
