//! Trait for execution targets

use super::{Kernel, MemoryView, Module, TaskQueue};
use crate::error::{Error, Result};
use crate::runtime::{AllocationType, DeviceInfo, DeviceType, MemoryViewFlags, ModuleOptions};
use std::fmt;
use std::sync::Arc;

/// An execution target bound to exactly one back-end
///
/// A `Device` creates every other per-back-end object. The binding to its
/// back-end is chosen at construction and never changes.
pub trait Device: Send + Sync + fmt::Debug {
    /// Back-end family of this device
    fn device_type(&self) -> DeviceType;

    /// Index among the devices of the same family
    fn index(&self) -> u32;

    /// Human-readable name
    fn name(&self) -> String {
        format!("{}:{}", self.device_type(), self.index())
    }

    /// Enumeration info (vendor and device id)
    fn info(&self) -> DeviceInfo;

    /// Back-end hook creating a view; `flags.alloc_type` is already validated
    fn create_memory_view(
        &self,
        host_addr: u64,
        size: usize,
        flags: MemoryViewFlags,
    ) -> Result<Arc<dyn MemoryView>>;

    /// Create a shared or device-only memory view.
    ///
    /// `host_addr` is caller-owned memory backing a shared view (0 lets the
    /// back-end allocate); it must outlive the view.
    fn new_memory_view(
        &self,
        host_addr: u64,
        size: usize,
        flags: MemoryViewFlags,
    ) -> Result<Arc<dyn MemoryView>> {
        match flags.alloc_type {
            AllocationType::Shared | AllocationType::Device => {
                self.create_memory_view(host_addr, size, flags)
            }
            AllocationType::Unknown => Err(Error::UnsupportedAllocationType(
                AllocationType::Unknown as u32,
            )),
        }
    }

    /// Classify an address against the views created through this device
    fn alloc_type_of(&self, addr: u64) -> AllocationType;

    /// Load a module file
    fn load_module(&self, path: &str, options: &ModuleOptions) -> Result<Arc<dyn Module>>;

    /// Combine modules into a new, independent module
    fn static_link_modules(&self, modules: &[Arc<dyn Module>]) -> Result<Arc<dyn Module>>;

    /// Make the given modules resolve symbols from each other, in place
    fn dynamic_link_modules(&self, modules: &[Arc<dyn Module>]) -> Result<()>;

    /// Resolve a kernel entry point from a module
    fn new_kernel(&self, module: &Arc<dyn Module>, name: &str) -> Result<Arc<dyn Kernel>>;

    /// Create an ordered task queue; the queue keeps this device alive
    fn new_task_queue(self: Arc<Self>) -> Result<Arc<dyn TaskQueue>>;

    /// Driver platform handle (0 when the back-end has none)
    fn platform_native_handle(&self) -> u64 {
        0
    }

    /// Driver device handle (0 when the back-end has none)
    fn device_native_handle(&self) -> u64 {
        0
    }

    /// Driver context handle this device runs on (0 when the back-end has none)
    fn context_native_handle(&self) -> u64 {
        0
    }
}

/// Reject an empty module list for linking
pub(crate) fn require_modules(modules: &[Arc<dyn Module>]) -> Result<()> {
    if modules.is_empty() {
        return Err(Error::EmptyModuleList);
    }
    Ok(())
}
