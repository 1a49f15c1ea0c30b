//! Envelope timestamps and chat message ids.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

/// Current wall-clock time as an RFC 3339 (ISO-8601) UTC string.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339()
}

/// Current wall-clock time in milliseconds since the Unix epoch.
fn now_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Strictly increasing chat message ids seeded by the millisecond clock.
///
/// Each id is `max(now_ms, previous + 1)`: ids track wall-clock time while
/// the clock is ahead, and never repeat when many messages land in the same
/// millisecond.
#[derive(Debug, Default)]
pub struct MessageIdGenerator {
    last: AtomicU64,
}

impl MessageIdGenerator {
    /// Create a generator with no ids issued yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next id.
    pub fn next_id(&self) -> u64 {
        self.next_with_clock(now_millis())
    }

    fn next_with_clock(&self, now_ms: u64) -> u64 {
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now_ms.max(prev.saturating_add(1));
            match self
                .last
                .compare_exchange_weak(prev, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }
}
