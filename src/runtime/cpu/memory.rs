//! CPU memory views

use crate::error::Result;
use crate::runtime::allocator::{HostAllocation, TrackedRange};
use crate::runtime::traits::MemoryView;
use crate::runtime::{AllocationTracker, AllocationType, DeviceType, MemoryViewFlags, SharedMemoryHint};
use std::sync::Arc;
use tracing::trace;

#[derive(Debug)]
enum Storage {
    /// Allocated by the runtime, freed with the view
    Owned(HostAllocation),
    /// Caller-owned memory; must outlive the view
    Borrowed(u64),
}

impl Storage {
    fn addr(&self) -> u64 {
        match self {
            Storage::Owned(alloc) => alloc.addr(),
            Storage::Borrowed(addr) => *addr,
        }
    }
}

/// Memory view in host RAM
///
/// A shared view wraps the caller's memory when one is given, otherwise the
/// runtime allocates zeroed memory. A device-only view always gets its own
/// allocation and exposes no host address.
#[derive(Debug)]
pub struct CpuMemoryView {
    // Declared before `storage` so the range is forgotten before it is freed.
    tracked: Option<TrackedRange>,
    storage: Storage,
    size: usize,
    alloc_type: AllocationType,
    hint: SharedMemoryHint,
}

impl CpuMemoryView {
    /// Create a view and register it with `tracker`
    pub fn new(
        host_addr: u64,
        size: usize,
        flags: MemoryViewFlags,
        tracker: Arc<AllocationTracker>,
    ) -> Result<Arc<Self>> {
        let storage = if flags.alloc_type == AllocationType::Shared && host_addr != 0 {
            Storage::Borrowed(host_addr)
        } else {
            Storage::Owned(HostAllocation::new(size)?)
        };

        let tracked = tracker.track(storage.addr(), size, flags.alloc_type);
        trace!(addr = storage.addr(), size, alloc = ?flags.alloc_type, "CPU memory view created");

        Ok(Arc::new(Self {
            tracked,
            storage,
            size,
            alloc_type: flags.alloc_type,
            hint: flags.sm_hint,
        }))
    }
}

impl MemoryView for CpuMemoryView {
    fn device_type(&self) -> DeviceType {
        DeviceType::Cpu
    }

    fn host_ptr(&self) -> u64 {
        match self.alloc_type {
            AllocationType::Shared => self.storage.addr(),
            _ => 0,
        }
    }

    fn device_ptr(&self) -> u64 {
        self.storage.addr()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn alloc_type(&self) -> AllocationType {
        self.alloc_type
    }

    fn hint(&self) -> SharedMemoryHint {
        self.hint
    }
}
