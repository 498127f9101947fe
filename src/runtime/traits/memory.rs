//! Trait for memory views

use crate::runtime::{AllocationType, DeviceType, SharedMemoryHint};
use std::fmt;

/// A fixed-size region of memory with a fixed allocation kind
///
/// Addresses are plain integers (0 = null). A shared view exposes both a host
/// and a device address; a device-only view has host address 0.
pub trait MemoryView: Send + Sync + fmt::Debug {
    /// Back-end family that created the view
    fn device_type(&self) -> DeviceType;

    /// Host address (0 for device-only views)
    fn host_ptr(&self) -> u64;

    /// Device address
    fn device_ptr(&self) -> u64;

    /// Alias of [`MemoryView::device_ptr`]
    fn shared_ptr(&self) -> u64 {
        self.device_ptr()
    }

    /// Size in bytes
    fn size(&self) -> usize;

    /// Allocation kind
    fn alloc_type(&self) -> AllocationType;

    /// Whether host and device can both see the view
    fn is_shared(&self) -> bool {
        self.alloc_type() == AllocationType::Shared
    }

    /// Shared memory hint given at creation
    fn hint(&self) -> SharedMemoryHint {
        SharedMemoryHint::None
    }
}
