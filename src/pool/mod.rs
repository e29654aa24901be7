//! Forwarding worker pool.
//!
//! # Data Flow
//! ```text
//! Reload changes forward addresses
//!     → WorkerPool::reconcile (add new destinations, retire removed ones)
//!
//! Data path (per destination)
//!     → ForwardStats::record (atomic adds)
//!
//! Stats reporter, once per cycle
//!     → WorkerPool::snapshot
//!         lock pool → accumulate_and_clear every member → unlock
//!     → format and send without holding the lock
//! ```
//!
//! # Design Decisions
//! - One coarse lock guards membership; it is never held across I/O
//! - Members are `Arc`s so the data path keeps its handle while the pool
//!   changes shape around it
//! - Buffer pool counters (`blobs`) are lock-free and read without the pool

pub mod blobs;
pub mod stats;

use std::sync::{Arc, Mutex, PoisonError};

pub use blobs::{BlobSnapshot, BlobStats};
pub use stats::{Counter, CounterSet, ForwardStats, RateWindows, RATE_WINDOWS};

/// One forwarding destination and its live counters.
#[derive(Debug)]
pub struct PoolMember {
    pub address: String,
    pub stats: ForwardStats,
}

impl PoolMember {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            stats: ForwardStats::new(),
        }
    }
}

/// Counters drained from one destination.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationStats {
    pub address: String,
    pub counters: CounterSet,
    pub rates: RateWindows,
}

/// Value copy of every destination's counters at report time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSnapshot {
    pub destinations: Vec<DestinationStats>,
}

impl StatsSnapshot {
    /// Sum of `counter` across destinations.
    pub fn total(&self, counter: Counter) -> u64 {
        self.destinations.iter().map(|d| d.counters.get(counter)).sum()
    }
}

/// Result of `WorkerPool::reconcile`.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// The set of live forwarding destinations.
#[derive(Debug, Default)]
pub struct WorkerPool {
    members: Mutex<Vec<Arc<PoolMember>>>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pool with one member per forward address.
    pub fn from_forwards(forwards: &[String]) -> Self {
        let pool = Self::new();
        pool.reconcile(forwards);
        pool
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<PoolMember>>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Look up the member forwarding to `address`.
    pub fn member(&self, address: &str) -> Option<Arc<PoolMember>> {
        self.lock().iter().find(|m| m.address == address).cloned()
    }

    /// Make membership match `forwards`, in that order.
    ///
    /// Members whose address is still configured keep their counters.
    pub fn reconcile(&self, forwards: &[String]) -> Reconciled {
        let mut members = self.lock();
        let mut result = Reconciled::default();

        for member in members.iter() {
            if !forwards.contains(&member.address) {
                tracing::info!(address = %member.address, "Retiring forward destination");
                result.removed.push(member.address.clone());
            }
        }

        let mut next = Vec::with_capacity(forwards.len());
        for address in forwards {
            if next.iter().any(|m: &Arc<PoolMember>| &m.address == address) {
                continue;
            }
            match members.iter().find(|m| &m.address == address) {
                Some(existing) => next.push(existing.clone()),
                None => {
                    tracing::info!(address = %address, "Adding forward destination");
                    result.added.push(address.clone());
                    next.push(Arc::new(PoolMember::new(address.clone())));
                }
            }
        }

        *members = next;
        result
    }

    /// Drain every member's counters into a value snapshot.
    ///
    /// The pool lock is held only for the drain itself.
    pub fn snapshot(&self) -> StatsSnapshot {
        let members = self.lock();
        let destinations = members
            .iter()
            .map(|member| {
                let mut counters = CounterSet::default();
                let rates = member.stats.accumulate_and_clear(&mut counters);
                DestinationStats {
                    address: member.address.clone(),
                    counters,
                    rates,
                }
            })
            .collect();
        StatsSnapshot { destinations }
    }
}
