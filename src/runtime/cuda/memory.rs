//! CUDA memory views

use super::check;
use crate::error::Result;
use crate::runtime::allocator::TrackedRange;
use crate::runtime::traits::MemoryView;
use crate::runtime::{AllocationTracker, AllocationType, DeviceType, MemoryViewFlags, SharedMemoryHint};
use cudarc::driver::safe::CudaContext;
use cudarc::driver::sys;
use std::sync::Arc;
use tracing::{trace, warn};

/// Memory view backed by a CUDA allocation
///
/// Shared views use managed memory. When the caller supplies host memory the
/// view keeps it as the host side and copies move bytes between it and the
/// managed allocation; otherwise host and device addresses coincide.
pub struct GpuMemoryView {
    cuda: Arc<CudaContext>,
    device_ptr: u64,
    host_ptr: u64,
    size: usize,
    alloc_type: AllocationType,
    hint: SharedMemoryHint,
    tracked: Vec<TrackedRange>,
}

impl std::fmt::Debug for GpuMemoryView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuMemoryView")
            .field("device_ptr", &format_args!("{:#x}", self.device_ptr))
            .field("host_ptr", &format_args!("{:#x}", self.host_ptr))
            .field("size", &self.size)
            .field("alloc_type", &self.alloc_type)
            .finish()
    }
}

impl GpuMemoryView {
    /// Allocate a view on the device of `cuda` and register it with `tracker`
    pub fn new(
        cuda: Arc<CudaContext>,
        host_addr: u64,
        size: usize,
        flags: MemoryViewFlags,
        tracker: Arc<AllocationTracker>,
    ) -> Result<Arc<Self>> {
        cuda.bind_to_thread()?;

        let mut device_ptr: sys::CUdeviceptr = 0;
        if size > 0 {
            // SAFETY: the context is bound; the driver writes the new address.
            let status = unsafe {
                match flags.alloc_type {
                    AllocationType::Shared => sys::cuMemAllocManaged(
                        &mut device_ptr,
                        size,
                        sys::CUmemAttach_flags::CU_MEM_ATTACH_GLOBAL as u32,
                    ),
                    _ => sys::cuMemAlloc_v2(&mut device_ptr, size),
                }
            };
            check(status, "allocation")?;
        }

        let device_ptr = device_ptr as u64;
        let host_ptr = match flags.alloc_type {
            AllocationType::Shared if host_addr != 0 => host_addr,
            AllocationType::Shared => device_ptr,
            _ => 0,
        };

        let mut tracked: Vec<TrackedRange> =
            tracker.track(device_ptr, size, flags.alloc_type).into_iter().collect();
        if host_ptr != 0 && host_ptr != device_ptr {
            tracked.extend(tracker.track(host_ptr, size, AllocationType::Shared));
        }
        trace!(
            device_ptr = format_args!("{device_ptr:#x}"),
            size,
            alloc = ?flags.alloc_type,
            "CUDA memory view created"
        );

        Ok(Arc::new(Self {
            cuda,
            device_ptr,
            host_ptr,
            size,
            alloc_type: flags.alloc_type,
            hint: flags.sm_hint,
            tracked,
        }))
    }

    /// Whether host and device copies are distinct buffers
    pub fn needs_transfer(&self) -> bool {
        self.host_ptr != 0 && self.host_ptr != self.device_ptr
    }
}

impl MemoryView for GpuMemoryView {
    fn device_type(&self) -> DeviceType {
        DeviceType::Gpu
    }

    fn host_ptr(&self) -> u64 {
        self.host_ptr
    }

    fn device_ptr(&self) -> u64 {
        self.device_ptr
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

impl Drop for GpuMemoryView {
    fn drop(&mut self) {
        self.tracked.clear();
        if self.device_ptr == 0 {
            return;
        }
        if let Err(e) = self.cuda.bind_to_thread() {
            warn!("Failed to bind CUDA context while freeing memory view: {e:?}");
            return;
        }
        // SAFETY: the allocation is owned by this view and no longer used.
        let status = unsafe { sys::cuMemFree_v2(self.device_ptr as sys::CUdeviceptr) };
        if let Err(e) = check(status, "free") {
            warn!("{e}");
        }
    }
}
