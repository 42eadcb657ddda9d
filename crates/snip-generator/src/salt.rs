use jiff::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of salts used to re-hash after a probable collision.
pub trait SaltSource: Send + Sync + 'static {
    fn next_salt(&self) -> u64;
}

/// Wall-clock nanoseconds, forced strictly increasing within the process.
#[derive(Debug, Default)]
pub struct NanoSalt {
    last: AtomicU64,
}

impl NanoSalt {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SaltSource for NanoSalt {
    fn next_salt(&self) -> u64 {
        let now = Timestamp::now().as_nanosecond().max(0) as u64;
        let next = |prev: u64| now.max(prev.saturating_add(1));
        // fetch_update only fails when the closure returns None
        match self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| Some(next(prev)))
        {
            Ok(prev) | Err(prev) => next(prev),
        }
    }
}

/// A counter salt for reproducible tests.
#[derive(Debug, Default)]
pub struct SequentialSalt {
    counter: AtomicU64,
}

impl SequentialSalt {
    pub fn starting_at(start: u64) -> Self {
        Self {
            counter: AtomicU64::new(start),
        }
    }
}

impl SaltSource for SequentialSalt {
    fn next_salt(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst)
    }
}
