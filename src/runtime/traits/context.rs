//! Trait for execution contexts

use super::MemoryView;
use crate::error::{Error, Result};
use crate::runtime::{AllocationType, DeviceType, MemoryViewFlags};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// An execution context of one back-end family
///
/// A context is either created by the runtime (owned, destroyed on drop) or
/// adopted from a native handle supplied by the caller (never destroyed by the
/// runtime).
pub trait Context: Send + Sync + fmt::Debug {
    /// Back-end family of this context
    fn device_type(&self) -> DeviceType;

    /// Driver context handle (0 when the back-end has none)
    fn native_handle(&self) -> u64;

    /// Whether the native context was supplied by the caller
    fn is_adopted(&self) -> bool;

    /// Back-end hook creating a shared view
    fn create_memory_view(
        &self,
        host_addr: u64,
        size: usize,
        flags: MemoryViewFlags,
    ) -> Result<Arc<dyn MemoryView>>;

    /// Create a context-scoped memory view; only shared allocations are allowed
    fn new_memory_view(
        &self,
        host_addr: u64,
        size: usize,
        flags: MemoryViewFlags,
    ) -> Result<Arc<dyn MemoryView>> {
        if flags.alloc_type != AllocationType::Shared {
            return Err(Error::ContextRequiresShared);
        }
        self.create_memory_view(host_addr, size, flags)
    }

    /// Type-erased self for back-end downcasts
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}
