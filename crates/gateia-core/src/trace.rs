//! Trace identifiers.
//!
//! Every call gets one id, used in the policy context, logs, results and
//! errors. The generator is injected so tests can pin ids.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Produces opaque, unique trace ids.
pub trait TraceIdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

impl<F> TraceIdGenerator for F
where
    F: Fn() -> String + Send + Sync,
{
    fn next_id(&self) -> String {
        self()
    }
}

/// Default generator: UTC timestamp, process id and a per-generator counter.
///
/// Unique within a process for the generator's lifetime; the process id keeps
/// concurrent processes apart.
#[derive(Debug, Default)]
pub struct TimestampTraceIds {
    counter: AtomicU64,
}

impl TimestampTraceIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TraceIdGenerator for TimestampTraceIds {
    fn next_id(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format!(
            "gt-{}-{:x}-{:06x}",
            Utc::now().format("%Y%m%dT%H%M%S%3fZ"),
            std::process::id(),
            seq
        )
    }
}
