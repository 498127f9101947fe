//! CUDA back-end
//!
//! This module provides GPU execution through the CUDA driver API using
//! cudarc.
//!
//! - `GpuContext` - owned CUDA context, or a caller-supplied one adopted
//! - `GpuDevice` - one CUDA device bound to a context
//! - `GpuMemoryView` - managed (shared) or device-only allocation
//! - `GpuModule` / `GpuKernel` - PTX or cubin modules and their entry points
//! - `GpuTaskQueue` - one CUDA stream; launches are timed with events
//!
//! Driver calls must run with the context bound to the calling thread; every
//! entry point binds before touching the driver.

mod context;
mod device;
mod kernel;
mod memory;
mod module;
mod queue;

pub use context::GpuContext;
pub use device::GpuDevice;
pub use kernel::GpuKernel;
pub use memory::GpuMemoryView;
pub use module::GpuModule;
pub use queue::GpuTaskQueue;

use crate::error::{Error, ErrorKind, Result};
use crate::runtime::DeviceInfo;
use cudarc::driver::sys;

/// PCI vendor id reported for CUDA devices
pub const NVIDIA_VENDOR_ID: u32 = 0x10de;

/// Turn a driver status into a `Result`
pub(crate) fn check(result: sys::CUresult, operation: &str) -> Result<()> {
    match result {
        sys::CUresult::CUDA_SUCCESS => Ok(()),
        sys::CUresult::CUDA_ERROR_OUT_OF_MEMORY => Err(Error::runtime(
            ErrorKind::OutOfMemory,
            format!("CUDA {operation} failed: out of device memory"),
        )),
        other => Err(Error::Backend(format!("CUDA {operation} failed: {other:?}"))),
    }
}

/// Number of CUDA devices visible to this process
pub fn device_count() -> Result<u32> {
    let mut count: std::ffi::c_int = 0;
    // SAFETY: cuInit and cuDeviceGetCount only write to the provided pointer.
    unsafe {
        check(sys::cuInit(0), "initialization")?;
        check(sys::cuDeviceGetCount(&mut count), "device enumeration")?;
    }
    Ok(count.max(0) as u32)
}

/// Identification of CUDA device `index`
pub fn device_info(index: u32) -> Result<DeviceInfo> {
    let mut device: sys::CUdevice = 0;
    let mut pci_device: std::ffi::c_int = 0;
    // SAFETY: the driver only writes to the provided pointers.
    unsafe {
        check(sys::cuInit(0), "initialization")?;
        check(sys::cuDeviceGet(&mut device, index as std::ffi::c_int), "device lookup")?;
        check(
            sys::cuDeviceGetAttribute(
                &mut pci_device,
                sys::CUdevice_attribute::CU_DEVICE_ATTRIBUTE_PCI_DEVICE_ID,
                device,
            ),
            "device attribute query",
        )?;
    }
    Ok(DeviceInfo {
        vendor_id: NVIDIA_VENDOR_ID,
        device_id: pci_device.max(0) as u32,
    })
}

/// Whether a CUDA driver with at least one device is usable
pub fn is_cuda_available() -> bool {
    std::panic::catch_unwind(|| device_count().map(|n| n > 0).unwrap_or(false)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::traits::{Device, MemoryView, TaskQueue};
    use crate::runtime::{AllocationType, MemoryViewFlags};

    #[test]
    fn test_device_info_reports_nvidia_vendor() {
        if !is_cuda_available() {
            return;
        }
        let info = device_info(0).unwrap();
        assert_eq!(info.vendor_id, NVIDIA_VENDOR_ID);
    }

    #[test]
    fn test_shared_view_round_trips_through_device() {
        if !is_cuda_available() {
            return;
        }
        let device = GpuDevice::new(0).unwrap();
        let mut host = vec![7u8; 256];
        let view = device
            .new_memory_view(host.as_mut_ptr() as u64, host.len(), MemoryViewFlags::shared())
            .unwrap();
        assert_eq!(view.host_ptr(), host.as_ptr() as u64);
        assert_eq!(device.alloc_type_of(view.device_ptr()), AllocationType::Shared);

        let queue = device.clone().new_task_queue().unwrap();
        queue.copy_to_device(&view).unwrap();
        queue.sync().unwrap();
        host.fill(0);
        queue.copy_to_host(&view).unwrap();
        queue.sync().unwrap();
        assert!(host.iter().all(|&b| b == 7));
    }

    #[test]
    fn test_device_only_view_has_no_host_side() {
        if !is_cuda_available() {
            return;
        }
        let device = GpuDevice::new(0).unwrap();
        let view = device.new_memory_view(0, 64, MemoryViewFlags::device()).unwrap();
        assert_eq!(view.host_ptr(), 0);
        assert_ne!(view.device_ptr(), 0);
        let queue = device.clone().new_task_queue().unwrap();
        assert!(queue.copy_to_host(&view).is_err());
    }

    #[test]
    fn test_queue_settles_at_capacity() {
        if !is_cuda_available() {
            return;
        }
        let device = GpuDevice::new(0).unwrap();
        let mut host = vec![3u8; 128];
        let view = device
            .new_memory_view(host.as_mut_ptr() as u64, host.len(), MemoryViewFlags::shared())
            .unwrap();
        let queue = GpuTaskQueue::with_max_pending(device.clone(), 2).unwrap();

        for _ in 0..5 {
            queue.copy_to_device(&view).unwrap();
            assert!(queue.pending_ops() <= 2);
        }
        // Five copies against a cap of two settle twice, leaving one queued.
        assert_eq!(queue.pending_ops(), 1);
        queue.sync().unwrap();
        assert_eq!(queue.pending_ops(), 0);

        host.fill(0);
        queue.copy_to_host(&view).unwrap();
        queue.sync().unwrap();
        assert!(host.iter().all(|&b| b == 3));
    }
}
