//! CUDA contexts, owned or adopted

use super::{GpuMemoryView, check};
use crate::error::{Error, ErrorKind, Result};
use crate::runtime::traits::Context;
use crate::runtime::{AllocationTracker, DeviceType, MemoryView, MemoryViewFlags};
use cudarc::driver::safe::CudaContext;
use cudarc::driver::sys;
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

/// CUDA execution context
///
/// Work runs on the device's primary context through cudarc, so only a
/// primary context can be adopted. An adopted context is reported back as the
/// native handle and never destroyed.
pub struct GpuContext {
    cuda: Arc<CudaContext>,
    native: u64,
    adopted: bool,
    tracker: Arc<AllocationTracker>,
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("ordinal", &self.cuda.ordinal())
            .field("native", &format_args!("{:#x}", self.native))
            .field("adopted", &self.adopted)
            .finish()
    }
}

impl GpuContext {
    /// Create a context on device `ordinal`
    pub fn new(ordinal: u32) -> Result<Arc<Self>> {
        debug!(ordinal, "Creating CUDA context");
        let cuda = CudaContext::new(ordinal as usize)?;
        Ok(Arc::new(Self {
            native: cuda.cu_ctx() as u64,
            cuda,
            adopted: false,
            tracker: AllocationTracker::new(),
        }))
    }

    /// Adopt a caller-owned `CUcontext`.
    ///
    /// The handle must be the primary context of its device; any other
    /// context is rejected as NotSupported.
    pub fn from_native_handle(native: u64) -> Result<Arc<Self>> {
        if native == 0 {
            return Err(Error::NullPointer("native context"));
        }
        let ordinal = native_context_ordinal(native)?;
        let cuda = CudaContext::new(ordinal)?;
        require_primary(native, cuda.cu_ctx() as u64, ordinal)?;
        debug!(ordinal, "Adopted CUDA context");
        Ok(Arc::new(Self {
            cuda,
            native,
            adopted: true,
            tracker: AllocationTracker::new(),
        }))
    }

    /// cudarc context used for driver calls
    pub fn cuda(&self) -> &Arc<CudaContext> {
        &self.cuda
    }

    /// Device ordinal of the context
    pub fn ordinal(&self) -> usize {
        self.cuda.ordinal()
    }

    /// Allocations made through this context
    pub fn tracker(&self) -> &Arc<AllocationTracker> {
        &self.tracker
    }
}

fn require_primary(native: u64, primary: u64, ordinal: usize) -> Result<()> {
    if native == primary {
        return Ok(());
    }
    Err(Error::runtime(
        ErrorKind::NotSupported,
        format!(
            "CUDA context {native:#x} is not the primary context of device {ordinal}; \
             only primary contexts can be adopted"
        ),
    ))
}

fn native_context_ordinal(native: u64) -> Result<usize> {
    let mut device: sys::CUdevice = 0;
    let mut popped: sys::CUcontext = std::ptr::null_mut();
    // SAFETY: the caller guarantees `native` is a live CUcontext; it is pushed
    // only for the duration of the device query.
    unsafe {
        check(sys::cuInit(0), "initialization")?;
        check(
            sys::cuCtxPushCurrent_v2(native as usize as sys::CUcontext),
            "context push",
        )?;
        let queried = sys::cuCtxGetDevice(&mut device);
        let _ = sys::cuCtxPopCurrent_v2(&mut popped);
        check(queried, "context device query")?;
    }
    Ok(device.max(0) as usize)
}

impl Context for GpuContext {
    fn device_type(&self) -> DeviceType {
        DeviceType::Gpu
    }

    fn native_handle(&self) -> u64 {
        self.native
    }

    fn is_adopted(&self) -> bool {
        self.adopted
    }

    fn create_memory_view(
        &self,
        host_addr: u64,
        size: usize,
        flags: MemoryViewFlags,
    ) -> Result<Arc<dyn MemoryView>> {
        let view = GpuMemoryView::new(self.cuda.clone(), host_addr, size, flags, self.tracker.clone())?;
        Ok(view)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
