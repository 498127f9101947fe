//! Trait for ordered task queues

use super::{Kernel, LaunchFuture, MemoryView};
use crate::error::{Error, Result};
use crate::runtime::{DeviceType, LaunchDims};
use std::fmt;
use std::sync::Arc;

/// An ordered submission channel bound to one device
///
/// Operations run in program order within a queue; there is no ordering
/// across queues. Enqueue methods return once the operation is accepted.
/// Back-ends implement the `enqueue_*` hooks; callers use the provided
/// methods, which validate arguments before anything is enqueued.
pub trait TaskQueue: Send + Sync + fmt::Debug {
    /// Back-end family of the owning device
    fn device_type(&self) -> DeviceType;

    /// Enqueue a full-extent host to device transfer of a shared view
    fn enqueue_copy_to_device(&self, view: &Arc<dyn MemoryView>) -> Result<()>;

    /// Enqueue a full-extent device to host transfer of a shared view
    fn enqueue_copy_to_host(&self, view: &Arc<dyn MemoryView>) -> Result<()>;

    /// Enqueue a device to device copy of `size` bytes; bounds already checked
    fn enqueue_copy(
        &self,
        dst: &Arc<dyn MemoryView>,
        src: &Arc<dyn MemoryView>,
        size: usize,
    ) -> Result<()>;

    /// Enqueue a canonical three-dimensional launch
    fn enqueue_launch(
        &self,
        kernel: &Arc<dyn Kernel>,
        params: Option<&Arc<dyn MemoryView>>,
        dims: LaunchDims,
    ) -> Result<Arc<dyn LaunchFuture>>;

    /// Enqueue an ordering point
    fn barrier(&self) -> Result<()>;

    /// Block until all work enqueued so far has completed.
    ///
    /// Returns the first asynchronous failure recorded since the previous
    /// sync, if any.
    fn sync(&self) -> Result<()>;

    /// Driver stream handle (0 when the back-end has none)
    fn native_handle(&self) -> u64 {
        0
    }

    /// Transfer a shared view's host contents to the device
    fn copy_to_device(&self, view: &Arc<dyn MemoryView>) -> Result<()> {
        check_backend(self.device_type(), view.device_type())?;
        require_host_side(view.as_ref(), "copy_to_device")?;
        self.enqueue_copy_to_device(view)
    }

    /// Transfer a shared view's device contents to the host
    fn copy_to_host(&self, view: &Arc<dyn MemoryView>) -> Result<()> {
        check_backend(self.device_type(), view.device_type())?;
        require_host_side(view.as_ref(), "copy_to_host")?;
        self.enqueue_copy_to_host(view)
    }

    /// Copy `size` bytes from `src` to `dst`, both from offset 0
    fn copy_memory_view(
        &self,
        dst: &Arc<dyn MemoryView>,
        src: &Arc<dyn MemoryView>,
        size: usize,
    ) -> Result<()> {
        if size > dst.size() {
            return Err(Error::CopyExceedsDestination {
                size,
                capacity: dst.size(),
            });
        }
        if size > src.size() {
            return Err(Error::CopyExceedsSource {
                size,
                capacity: src.size(),
            });
        }
        check_backend(self.device_type(), dst.device_type())?;
        check_backend(self.device_type(), src.device_type())?;
        if size == 0 {
            return Ok(());
        }
        self.enqueue_copy(dst, src, size)
    }

    /// Launch `kernel` over a three-dimensional index space
    fn launch(
        &self,
        kernel: &Arc<dyn Kernel>,
        params: Option<&Arc<dyn MemoryView>>,
        dims: LaunchDims,
    ) -> Result<Arc<dyn LaunchFuture>> {
        check_backend(self.device_type(), kernel.device_type())?;
        if let Some(params) = params {
            check_backend(self.device_type(), params.device_type())?;
        }
        self.enqueue_launch(kernel, params, dims)
    }

    /// Launch over `d0` instances
    fn launch_1d(
        &self,
        kernel: &Arc<dyn Kernel>,
        params: Option<&Arc<dyn MemoryView>>,
        d0: usize,
    ) -> Result<Arc<dyn LaunchFuture>> {
        self.launch(kernel, params, LaunchDims::d1(d0))
    }

    /// Launch over a `d0 x d1` grid
    fn launch_2d(
        &self,
        kernel: &Arc<dyn Kernel>,
        params: Option<&Arc<dyn MemoryView>>,
        d0: usize,
        d1: usize,
    ) -> Result<Arc<dyn LaunchFuture>> {
        self.launch(kernel, params, LaunchDims::d2(d0, d1))
    }

    /// Launch over a `d0 x d1 x d2` grid
    fn launch_3d(
        &self,
        kernel: &Arc<dyn Kernel>,
        params: Option<&Arc<dyn MemoryView>>,
        d0: usize,
        d1: usize,
        d2: usize,
    ) -> Result<Arc<dyn LaunchFuture>> {
        self.launch(kernel, params, LaunchDims::new(d0, d1, d2))
    }
}

fn check_backend(expected: DeviceType, found: DeviceType) -> Result<()> {
    if expected != found {
        return Err(Error::BackendMismatch { expected, found });
    }
    Ok(())
}

fn require_host_side(view: &dyn MemoryView, operation: &'static str) -> Result<()> {
    if !view.is_shared() || (view.host_ptr() == 0 && view.size() > 0) {
        return Err(Error::NoHostMemory {
            operation,
            size: view.size(),
        });
    }
    Ok(())
}
