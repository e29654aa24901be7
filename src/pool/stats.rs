//! Per-destination counters and decaying rates.
//!
//! Forwarding workers bump counters with relaxed atomic adds. The stats
//! reporter drains them with `swap(0)`, so an increment racing with a drain
//! lands in exactly one report and is never lost or counted twice.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A per-destination event counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Received,
    Sent,
    Partial,
    Spilled,
    Dropped,
    Error,
    Disk,
    DiskError,
}

impl Counter {
    pub const ALL: [Counter; 8] = [
        Counter::Received,
        Counter::Sent,
        Counter::Partial,
        Counter::Spilled,
        Counter::Dropped,
        Counter::Error,
        Counter::Disk,
        Counter::DiskError,
    ];

    /// Counters that also carry decaying rate estimates.
    pub const RATED: [Counter; 4] = [
        Counter::Received,
        Counter::Sent,
        Counter::Spilled,
        Counter::Dropped,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Counter::Received => "received",
            Counter::Sent => "sent",
            Counter::Partial => "partial",
            Counter::Spilled => "spilled",
            Counter::Dropped => "dropped",
            Counter::Error => "error",
            Counter::Disk => "disk",
            Counter::DiskError => "disk_error",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    fn rated_index(self) -> Option<usize> {
        Self::RATED.iter().position(|c| *c == self)
    }
}

/// Averaging windows of the rate estimates, in seconds, with their labels.
pub const RATE_WINDOWS: [(u64, &str); 3] = [(60, "1"), (300, "5"), (900, "15")];

/// Plain counter values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSet([u64; 8]);

impl CounterSet {
    pub fn get(&self, counter: Counter) -> u64 {
        self.0[counter.index()]
    }

    pub fn add(&mut self, counter: Counter, n: u64) {
        let slot = &mut self.0[counter.index()];
        *slot = slot.saturating_add(n);
    }

    pub fn merge(&mut self, other: &CounterSet) {
        for counter in Counter::ALL {
            self.add(counter, other.get(counter));
        }
    }
}

/// Exponentially decaying events-per-second estimates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateWindows([[f64; 3]; 4]);

impl RateWindows {
    /// Events per second of `counter` over window `window` (index into
    /// `RATE_WINDOWS`). Zero for counters without rates.
    pub fn rate(&self, counter: Counter, window: usize) -> f64 {
        counter
            .rated_index()
            .and_then(|i| self.0[i].get(window).copied())
            .unwrap_or(0.0)
    }

    /// Add the estimates of `other` to these, e.g. to total several
    /// destinations.
    pub fn merge(&mut self, other: &RateWindows) {
        for (mine, theirs) in self.0.iter_mut().zip(other.0.iter()) {
            for (a, b) in mine.iter_mut().zip(theirs.iter()) {
                *a += *b;
            }
        }
    }

    /// Fold `counts` observed over `elapsed` into the estimates.
    pub fn update(&mut self, counts: &CounterSet, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return;
        }
        for (i, counter) in Counter::RATED.iter().enumerate() {
            let instant = counts.get(*counter) as f64 / secs;
            for (w, (window, _)) in RATE_WINDOWS.iter().enumerate() {
                let alpha = 1.0 - (-secs / *window as f64).exp();
                let rate = &mut self.0[i][w];
                *rate += alpha * (instant - *rate);
            }
        }
    }
}

struct RateState {
    windows: RateWindows,
    last_update: Instant,
}

/// Live counters of one forwarding destination.
pub struct ForwardStats {
    counters: [AtomicU64; 8],
    rates: Mutex<RateState>,
}

impl ForwardStats {
    pub fn new() -> Self {
        Self {
            counters: std::array::from_fn(|_| AtomicU64::new(0)),
            rates: Mutex::new(RateState {
                windows: RateWindows::default(),
                last_update: Instant::now(),
            }),
        }
    }

    /// Count `n` events. Called from the data path.
    pub fn record(&self, counter: Counter, n: u64) {
        self.counters[counter.index()].fetch_add(n, Ordering::Relaxed);
    }

    /// Counter value accumulated since the last drain.
    pub fn pending(&self, counter: Counter) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }

    /// Move every pending count into `into`, zeroing the live counters, and
    /// return the rate estimates updated with what was drained.
    pub fn accumulate_and_clear(&self, into: &mut CounterSet) -> RateWindows {
        let mut drained = CounterSet::default();
        for counter in Counter::ALL {
            let value = self.counters[counter.index()].swap(0, Ordering::AcqRel);
            drained.add(counter, value);
        }
        into.merge(&drained);

        let mut rates = self.rates.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let elapsed = now.duration_since(rates.last_update);
        rates.windows.update(&drained, elapsed);
        rates.last_update = now;
        rates.windows
    }
}

impl Default for ForwardStats {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ForwardStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardStats")
            .field("received", &self.pending(Counter::Received))
            .field("sent", &self.pending(Counter::Sent))
            .finish_non_exhaustive()
    }
}
