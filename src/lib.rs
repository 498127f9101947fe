//! # hcrt
//!
//! **Heterogeneous compute runtime with a stable C ABI.**
//!
//! hcrt lets a client enqueue memory transfers and kernel launches against a
//! CPU or a GPU back-end chosen at runtime, through one `extern "C"` surface
//! that never lets a failure escape.
//!
//! ## Object model
//!
//! A [`Device`](runtime::Device) (optionally created from a
//! [`Context`](runtime::Context)) hands out memory views, modules, kernels and
//! task queues. Task queues run copies and launches in program order; each
//! launch yields a future carrying its completion state and timing.
//!
//! Rust callers use the traits in [`runtime`] directly. C callers go through
//! [`capi`], where every object is an opaque, reference-counted handle from
//! the [`handle`] registry.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hcrt::prelude::*;
//!
//! let device = get_device(DeviceType::Auto, 0)?;
//! let module = device.load_module("kernels", &ModuleOptions::default())?;
//! let kernel = device.new_kernel(&module, "saxpy")?;
//! let params = device.new_memory_view(0, 64, MemoryViewFlags::shared())?;
//!
//! let queue = device.new_task_queue()?;
//! let future = queue.launch_1d(&kernel, Some(&params), 1024)?;
//! queue.sync()?;
//! println!("{:?} ns", future.time_ns());
//! ```
//!
//! ## Feature Flags
//!
//! - `cpu` (default): host back-end, kernels from shared libraries
//! - `cuda`: NVIDIA CUDA back-end via the driver API

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod capi;
pub mod config;
pub mod error;
pub mod handle;
pub mod runtime;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::RuntimeConfig;
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::runtime::{
        AllocationType, Context, Device, DeviceInfo, DeviceType, Kernel, LaunchDims,
        LaunchFuture, MemoryView, MemoryViewFlags, Module, ModuleOptions, ModuleType,
        SharedMemoryHint, TaskQueue, device_count, device_info, get_device,
        get_device_from_context, new_context,
    };

    #[cfg(feature = "cpu")]
    pub use crate::runtime::cpu::{CpuDevice, CpuKernelFn, CpuModule};

    #[cfg(feature = "cuda")]
    pub use crate::runtime::cuda::GpuDevice;
}
