//! Process-wide buffer pool counters.
//!
//! Updated from the data path with relaxed atomics and read by the stats
//! reporter without any lock. Readings are eventually consistent: a report
//! may see an allocation counted in `total` but not yet in `active`.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Number of power-of-two size buckets.
pub const SIZE_BUCKETS: usize = 64;

/// Live buffer pool counters.
#[derive(Debug)]
pub struct BlobStats {
    active_count: AtomicI64,
    active_bytes: AtomicI64,
    active_refcnt_bytes: AtomicI64,
    total_count: AtomicU64,
    total_bytes: AtomicU64,
    total_refcnt_bytes: AtomicU64,
    ored_buckets: AtomicU64,
    sizes: [AtomicU64; SIZE_BUCKETS],
}

/// A point-in-time reading of `BlobStats`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobSnapshot {
    pub active_count: u64,
    pub active_bytes: u64,
    pub active_refcnt_bytes: u64,
    pub total_count: u64,
    pub total_bytes: u64,
    pub total_refcnt_bytes: u64,
    /// `(log2 bucket, count)` for every non-empty bucket, ascending.
    pub buckets: Vec<(usize, u64)>,
}

/// Bucket index of a buffer of `size` bytes: floor(log2(size)).
pub fn size_bucket(size: u64) -> usize {
    if size == 0 {
        0
    } else {
        (63 - size.leading_zeros()) as usize
    }
}

impl BlobStats {
    pub fn new() -> Self {
        Self {
            active_count: AtomicI64::new(0),
            active_bytes: AtomicI64::new(0),
            active_refcnt_bytes: AtomicI64::new(0),
            total_count: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            total_refcnt_bytes: AtomicU64::new(0),
            ored_buckets: AtomicU64::new(0),
            sizes: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// A buffer of `size` bytes was allocated.
    pub fn record_alloc(&self, size: u64) {
        self.active_count.fetch_add(1, Ordering::Relaxed);
        self.active_bytes.fetch_add(size as i64, Ordering::Relaxed);
        self.total_count.fetch_add(1, Ordering::Relaxed);
        self.total_bytes.fetch_add(size, Ordering::Relaxed);

        let bucket = size_bucket(size);
        self.sizes[bucket].fetch_add(1, Ordering::Relaxed);
        self.ored_buckets.fetch_or(1u64 << bucket, Ordering::Relaxed);
    }

    /// A buffer of `size` bytes was released.
    pub fn record_free(&self, size: u64) {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        self.active_bytes.fetch_sub(size as i64, Ordering::Relaxed);
    }

    /// A reference to a `size`-byte buffer was taken.
    pub fn record_ref(&self, size: u64) {
        self.active_refcnt_bytes.fetch_add(size as i64, Ordering::Relaxed);
        self.total_refcnt_bytes.fetch_add(size, Ordering::Relaxed);
    }

    /// A reference to a `size`-byte buffer was dropped.
    pub fn record_unref(&self, size: u64) {
        self.active_refcnt_bytes.fetch_sub(size as i64, Ordering::Relaxed);
    }

    /// Read every counter. Active values that transiently dip below zero
    /// read as zero.
    pub fn read(&self) -> BlobSnapshot {
        let active = |v: &AtomicI64| v.load(Ordering::Relaxed).max(0) as u64;

        let mut buckets = Vec::new();
        let mut ored = self.ored_buckets.load(Ordering::Relaxed);
        let mut i = 0;
        while ored != 0 && i < SIZE_BUCKETS {
            if ored & 1 == 1 {
                let count = self.sizes[i].load(Ordering::Relaxed);
                if count > 0 {
                    buckets.push((i, count));
                }
            }
            ored >>= 1;
            i += 1;
        }

        BlobSnapshot {
            active_count: active(&self.active_count),
            active_bytes: active(&self.active_bytes),
            active_refcnt_bytes: active(&self.active_refcnt_bytes),
            total_count: self.total_count.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            total_refcnt_bytes: self.total_refcnt_bytes.load(Ordering::Relaxed),
            buckets,
        }
    }
}

impl Default for BlobStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_bucket() {
        assert_eq!(size_bucket(0), 0);
        assert_eq!(size_bucket(1), 0);
        assert_eq!(size_bucket(1023), 9);
        assert_eq!(size_bucket(1024), 10);
        assert_eq!(size_bucket(u64::MAX), 63);
    }

    #[test]
    fn test_alloc_free_and_histogram() {
        let blobs = BlobStats::new();
        blobs.record_alloc(100);
        blobs.record_alloc(120);
        blobs.record_alloc(5000);
        blobs.record_ref(100);
        blobs.record_free(120);

        let snap = blobs.read();
        assert_eq!(snap.active_count, 2);
        assert_eq!(snap.active_bytes, 5100);
        assert_eq!(snap.total_count, 3);
        assert_eq!(snap.total_bytes, 5220);
        assert_eq!(snap.active_refcnt_bytes, 100);
        assert_eq!(snap.total_refcnt_bytes, 100);
        assert_eq!(snap.buckets, vec![(6, 2), (12, 1)]);
    }

    #[test]
    fn test_negative_active_reads_zero() {
        let blobs = BlobStats::new();
        blobs.record_free(10);
        blobs.record_unref(10);
        let snap = blobs.read();
        assert_eq!(snap.active_count, 0);
        assert_eq!(snap.active_bytes, 0);
        assert_eq!(snap.active_refcnt_bytes, 0);
    }
}
