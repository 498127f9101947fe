//! Allocation tracking and runtime-owned host memory
//!
//! Every device keeps an [`AllocationTracker`] recording the address ranges
//! of the memory views it created, so an arbitrary pointer can be classified
//! with [`AllocationTracker::classify`].

use super::AllocationType;
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::alloc::{Layout as AllocLayout, alloc_zeroed, dealloc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Ordering key of a tracked range: start address, then registration id
type RangeKey = (u64, u64);

/// Address ranges of live allocations
///
/// Ranges may coincide or nest (several views over one caller buffer); each
/// registration is kept separately and removed only by its own
/// [`TrackedRange`].
#[derive(Debug, Default)]
pub struct AllocationTracker {
    ranges: RwLock<BTreeMap<RangeKey, (usize, AllocationType)>>,
    next_id: AtomicU64,
}

impl AllocationTracker {
    /// Create an empty tracker
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record `[addr, addr + size)` as an allocation of `kind` until the
    /// returned registration is dropped.
    ///
    /// Null or empty ranges are not recorded and yield `None`.
    pub fn track(self: &Arc<Self>, addr: u64, size: usize, kind: AllocationType) -> Option<TrackedRange> {
        if addr == 0 || size == 0 {
            return None;
        }
        let key = (addr, self.next_id.fetch_add(1, Ordering::Relaxed));
        self.ranges.write().insert(key, (size, kind));
        Some(TrackedRange {
            tracker: self.clone(),
            key,
        })
    }

    /// Classify an address; `Unknown` when no tracked range contains it.
    ///
    /// With overlapping ranges the innermost (latest starting, then most
    /// recently tracked) one decides.
    pub fn classify(&self, addr: u64) -> AllocationType {
        if addr == 0 {
            return AllocationType::Unknown;
        }
        self.ranges
            .read()
            .range(..=(addr, u64::MAX))
            .rev()
            .find(|(key, range)| addr - key.0 < range.0 as u64)
            .map_or(AllocationType::Unknown, |(_, &(_, kind))| kind)
    }

    /// Number of tracked allocations
    pub fn len(&self) -> usize {
        self.ranges.read().len()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.ranges.read().is_empty()
    }
}

/// Registration of one range in an [`AllocationTracker`], removed on drop
#[derive(Debug)]
pub struct TrackedRange {
    tracker: Arc<AllocationTracker>,
    key: RangeKey,
}

impl Drop for TrackedRange {
    fn drop(&mut self) {
        self.tracker.ranges.write().remove(&self.key);
    }
}

/// Zero-initialized, aligned host allocation freed on drop
#[derive(Debug)]
pub(crate) struct HostAllocation {
    ptr: u64,
    layout: AllocLayout,
}

// SAFETY: the allocation is exclusively owned; the address is only handed out
// as an integer and all accesses go through the runtime's copy/launch paths.
unsafe impl Send for HostAllocation {}
unsafe impl Sync for HostAllocation {}

impl HostAllocation {
    /// Allocate `size_bytes` with the configured host alignment.
    ///
    /// A zero-byte request yields a null allocation.
    pub(crate) fn new(size_bytes: usize) -> Result<Self> {
        let align = crate::config::global().host_alignment;
        let layout = AllocLayout::from_size_align(size_bytes.max(1), align)
            .map_err(|e| Error::invalid_argument("size", e.to_string()))?;

        if size_bytes == 0 {
            return Ok(Self { ptr: 0, layout });
        }

        // SAFETY: layout has non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(Error::OutOfMemory { size: size_bytes });
        }

        Ok(Self {
            ptr: ptr as u64,
            layout,
        })
    }

    /// Address of the allocation (0 for empty)
    pub(crate) fn addr(&self) -> u64 {
        self.ptr
    }
}

impl Drop for HostAllocation {
    fn drop(&mut self) {
        if self.ptr == 0 {
            return;
        }
        // SAFETY: ptr was returned by alloc_zeroed with this layout.
        unsafe {
            dealloc(self.ptr as *mut u8, self.layout);
        }
    }
}
