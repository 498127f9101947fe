//! Execution back-ends and the abstraction hierarchy they implement
//!
//! This module defines the back-end traits and the value types shared by
//! every back-end, and provides implementations for CPU and CUDA.
//!
//! # Architecture
//!
//! ```text
//! Context (execution context, owned or adopted)
//! └── Device (execution target, one back-end bound at construction)
//!     ├── MemoryView (shared or device-only allocation)
//!     ├── Module (loaded or linked kernel code)
//!     │   └── Kernel (resolved entry point)
//!     └── TaskQueue (ordered copies, launches, barriers)
//!         └── LaunchFuture (outcome of one launch)
//! ```
//!
//! Back-end objects are shared as `Arc<dyn Trait>`; a dependent object keeps
//! the objects it needs alive by holding its own `Arc`.

pub mod allocator;
pub(crate) mod linking;
pub mod select;
pub mod traits;

#[cfg(feature = "cpu")]
pub mod cpu;

#[cfg(feature = "cuda")]
pub mod cuda;

pub use allocator::{AllocationTracker, TrackedRange};
pub use select::{
    device_count, device_info, get_device, get_device_from_context,
    get_device_from_native_handle, get_context_from_native_handle, new_context,
};
pub use traits::{Context, Device, Kernel, LaunchFuture, MemoryView, Module, TaskQueue};

use crate::error::Error;
use std::fmt;

/// Execution back-end family
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceType {
    /// Host CPU
    Cpu = 0,
    /// GPU through a compute driver
    Gpu = 1,
    /// Prefer GPU, fall back to CPU
    Auto = 2,
}

impl TryFrom<u32> for DeviceType {
    type Error = Error;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(DeviceType::Cpu),
            1 => Ok(DeviceType::Gpu),
            2 => Ok(DeviceType::Auto),
            other => Err(Error::UnknownDeviceType(other)),
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Cpu => write!(f, "CPU"),
            DeviceType::Gpu => write!(f, "GPU"),
            DeviceType::Auto => write!(f, "AUTO"),
        }
    }
}

/// Allocation kind of a memory view
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AllocationType {
    /// Visible to host and device
    Shared = 0,
    /// Device-only, no host pointer
    Device = 1,
    /// Not tracked by the runtime
    Unknown = 2,
}

impl AllocationType {
    /// Decode a raw C value
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(AllocationType::Shared),
            1 => Some(AllocationType::Device),
            2 => Some(AllocationType::Unknown),
            _ => None,
        }
    }
}

/// Access pattern hint for shared allocations, consumed by the back-end
#[repr(u32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SharedMemoryHint {
    /// No hint
    #[default]
    None = 0,
    /// Both sides read and write
    HostDeviceReadWrite = 1,
    /// Host writes, device reads
    HostWriteDeviceRead = 2,
    /// Host reads, device writes
    HostReadDeviceWrite = 3,
}

impl SharedMemoryHint {
    /// Decode a raw C value
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(SharedMemoryHint::None),
            1 => Some(SharedMemoryHint::HostDeviceReadWrite),
            2 => Some(SharedMemoryHint::HostWriteDeviceRead),
            3 => Some(SharedMemoryHint::HostReadDeviceWrite),
            _ => None,
        }
    }
}

/// Creation parameters of a memory view
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryViewFlags {
    /// Allocation kind
    pub alloc_type: AllocationType,
    /// Shared memory hint
    pub sm_hint: SharedMemoryHint,
}

impl MemoryViewFlags {
    /// Flags for a shared view
    pub fn shared() -> Self {
        Self {
            alloc_type: AllocationType::Shared,
            sm_hint: SharedMemoryHint::None,
        }
    }

    /// Flags for a device-only view
    pub fn device() -> Self {
        Self {
            alloc_type: AllocationType::Device,
            sm_hint: SharedMemoryHint::None,
        }
    }

    /// Replace the shared memory hint
    pub fn with_hint(mut self, sm_hint: SharedMemoryHint) -> Self {
        self.sm_hint = sm_hint;
        self
    }
}

/// Compilation flavor of a kernel module
#[repr(u32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ModuleType {
    /// SPMD vector code
    #[default]
    Vector = 0,
    /// Scalar code
    Scalar = 1,
}

impl ModuleType {
    /// Decode a raw C value
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(ModuleType::Vector),
            1 => Some(ModuleType::Scalar),
            _ => None,
        }
    }
}

/// Back-end specific module loading options
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModuleOptions {
    /// Per-invocation stack size in bytes (0 = back-end default)
    pub stack_size: u32,
    /// Module is a library linked into other modules
    pub library_compilation: bool,
    /// Module flavor
    pub module_type: ModuleType,
    /// Load with debug information
    pub debug: bool,
    /// JIT optimization level
    pub opt_level: u32,
}

/// Device identification returned by enumeration
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// PCI vendor id (0 for the host CPU)
    pub vendor_id: u32,
    /// Vendor device id
    pub device_id: u32,
}

/// Canonical three-dimensional launch extent
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LaunchDims {
    /// Extent per dimension
    pub dims: [usize; 3],
}

impl LaunchDims {
    /// Three-dimensional extent
    pub fn new(d0: usize, d1: usize, d2: usize) -> Self {
        Self { dims: [d0, d1, d2] }
    }

    /// One-dimensional extent; the other dimensions are 1
    pub fn d1(d0: usize) -> Self {
        Self::new(d0, 1, 1)
    }

    /// Two-dimensional extent; the third dimension is 1
    pub fn d2(d0: usize, d1: usize) -> Self {
        Self::new(d0, d1, 1)
    }

    /// Total number of kernel instances, or `None` if it overflows `usize`
    pub fn count(&self) -> Option<usize> {
        self.dims.iter().try_fold(1_usize, |acc, &d| acc.checked_mul(d))
    }

    /// Whether any extent is zero, so the launch runs no instances
    pub fn is_empty(&self) -> bool {
        self.dims.iter().any(|&d| d == 0)
    }
}
