//! CPU context

use super::CpuMemoryView;
use crate::error::Result;
use crate::runtime::traits::Context;
use crate::runtime::{AllocationTracker, DeviceType, MemoryView, MemoryViewFlags};
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

/// CPU execution context
///
/// The host has no driver context; a context only groups the allocations
/// made through it and through devices created from it.
#[derive(Debug)]
pub struct CpuContext {
    tracker: Arc<AllocationTracker>,
    adopted: bool,
}

impl CpuContext {
    /// Create a runtime-owned context
    pub fn new() -> Arc<Self> {
        debug!("Creating CPU context");
        Arc::new(Self {
            tracker: AllocationTracker::new(),
            adopted: false,
        })
    }

    /// Create a context for a caller-supplied native handle.
    ///
    /// The CPU has no native contexts; the handle is ignored and only the
    /// adoption is recorded.
    pub fn from_native_handle(native: u64) -> Arc<Self> {
        debug!(native, "Adopting CPU context (native handle ignored)");
        Arc::new(Self {
            tracker: AllocationTracker::new(),
            adopted: true,
        })
    }

    /// Allocations made through this context
    pub fn tracker(&self) -> &Arc<AllocationTracker> {
        &self.tracker
    }
}

impl Context for CpuContext {
    fn device_type(&self) -> DeviceType {
        DeviceType::Cpu
    }

    fn native_handle(&self) -> u64 {
        0
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
        let view = CpuMemoryView::new(host_addr, size, flags, self.tracker.clone())?;
        Ok(view)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
