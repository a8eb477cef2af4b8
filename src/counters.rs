//! Lightweight operation counters, logged once at a convenient checkpoint
//! (tests, or whoever embeds this crate, can call [`log_counts`] at
//! shutdown). Not a metrics system -- just enough to see what a run did
//! without reaching for a crate for it.

use std::sync::atomic::{AtomicUsize, Ordering, fence};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Op {
    DbRetry,
    DedupCacheHit,
    DedupCacheMiss,
    ThumbnailLockWait,
    ThumbnailCacheHit,
    ThumbnailCacheMiss,
    ThumbnailGenerated,
    ContentProcessed,
    ReindexFile,
    MountCacheHit,
    MountCacheMiss,
}

const OPS: &[Op] = &[
    Op::DbRetry,
    Op::DedupCacheHit,
    Op::DedupCacheMiss,
    Op::ThumbnailLockWait,
    Op::ThumbnailCacheHit,
    Op::ThumbnailCacheMiss,
    Op::ThumbnailGenerated,
    Op::ContentProcessed,
    Op::ReindexFile,
    Op::MountCacheHit,
    Op::MountCacheMiss,
];

fn index(op: Op) -> usize {
    OPS.iter().position(|o| *o == op).expect("Op missing from OPS table")
}

fn opname(op: Op) -> &'static str {
    match op {
        Op::DbRetry => "database retries",
        Op::DedupCacheHit => "dedup candidate cache hits",
        Op::DedupCacheMiss => "dedup candidate cache misses",
        Op::ThumbnailLockWait => "thumbnail lock waits",
        Op::ThumbnailCacheHit => "thumbnails served from storage",
        Op::ThumbnailCacheMiss => "thumbnails regenerated",
        Op::ThumbnailGenerated => "thumbnails generated",
        Op::ContentProcessed => "files content-processed",
        Op::ReindexFile => "files reindexed",
        Op::MountCacheHit => "mount resolver cache hits",
        Op::MountCacheMiss => "mount resolver cache misses",
    }
}

struct CounterMap([AtomicUsize; OPS.len()]);

static COUNTERS: CounterMap = CounterMap([
    AtomicUsize::new(0),
    AtomicUsize::new(0),
    AtomicUsize::new(0),
    AtomicUsize::new(0),
    AtomicUsize::new(0),
    AtomicUsize::new(0),
    AtomicUsize::new(0),
    AtomicUsize::new(0),
    AtomicUsize::new(0),
    AtomicUsize::new(0),
    AtomicUsize::new(0),
]);

#[inline]
pub fn bump(which: Op) {
    add(which, 1);
}

pub fn add(to: Op, amount: usize) {
    COUNTERS.0[index(to)].fetch_add(amount, Ordering::Relaxed);
}

/// Log every non-zero counter at `debug`, then reset nothing -- counters
/// live for the process lifetime.
pub fn log_counts() {
    fence(Ordering::SeqCst);

    let counts: Vec<(Op, usize)> = OPS
        .iter()
        .map(|op| (*op, COUNTERS.0[index(*op)].load(Ordering::Relaxed)))
        .filter(|(_, v)| *v > 0)
        .collect();

    if counts.is_empty() {
        return;
    }

    tracing::debug!("Counters:");
    for (op, count) in &counts {
        tracing::debug!("{:6} {}", count, opname(*op));
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bump_and_add_accumulate() {
        let before = COUNTERS.0[index(Op::DbRetry)].load(Ordering::Relaxed);
        bump(Op::DbRetry);
        add(Op::DbRetry, 4);
        let after = COUNTERS.0[index(Op::DbRetry)].load(Ordering::Relaxed);
        assert_eq!(after - before, 5);
    }
}
