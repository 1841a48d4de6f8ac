// Copyright 2026 Joyent, Inc.

//! Per-method counters, updated with atomic additions so handler objects
//! can be shared across concurrent invocations.

use std::convert::TryFrom;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters kept by both the client-side method handler and the
/// server-side method processor.
#[derive(Debug, Default)]
pub struct MethodStats {
    invocations: AtomicU64,
    successes: AtomicU64,
    errors: AtomicU64,
    read_nanos: AtomicU64,
    invoke_nanos: AtomicU64,
    write_nanos: AtomicU64,
}

fn saturating_nanos(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_nanos()).unwrap_or(u64::max_value())
}

impl MethodStats {
    pub fn new() -> Self {
        MethodStats::default()
    }

    pub fn add_invocation(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_read_time(&self, elapsed: Duration) {
        self.read_nanos
            .fetch_add(saturating_nanos(elapsed), Ordering::Relaxed);
    }

    pub fn add_invoke_time(&self, elapsed: Duration) {
        self.invoke_nanos
            .fetch_add(saturating_nanos(elapsed), Ordering::Relaxed);
    }

    pub fn add_write_time(&self, elapsed: Duration) {
        self.write_nanos
            .fetch_add(saturating_nanos(elapsed), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MethodStatsSnapshot {
        MethodStatsSnapshot {
            invocations: self.invocations.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            read_nanos: self.read_nanos.load(Ordering::Relaxed),
            invoke_nanos: self.invoke_nanos.load(Ordering::Relaxed),
            write_nanos: self.write_nanos.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of one method's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodStatsSnapshot {
    pub invocations: u64,
    pub successes: u64,
    pub errors: u64,
    pub read_nanos: u64,
    pub invoke_nanos: u64,
    pub write_nanos: u64,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = MethodStats::new();
        stats.add_invocation();
        stats.add_invocation();
        stats.add_success();
        stats.add_error();
        stats.add_read_time(Duration::from_nanos(25));
        stats.add_read_time(Duration::from_nanos(75));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.invocations, 2);
        assert_eq!(snapshot.successes, 1);
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.read_nanos, 100);
        assert_eq!(snapshot.write_nanos, 0);
    }
}
