//! CPU back-end
//!
//! Kernels are host functions, loaded from shared libraries with `libloading`
//! or registered in-process with [`CpuModule::from_symbols`]. Memory lives in
//! host RAM, so shared views have identical host and device addresses and
//! host/device transfers only order the queue.
//!
//! Each [`CpuTaskQueue`] owns a single-threaded rayon pool; jobs are spawned
//! FIFO, which gives strict program order within the queue while the caller
//! keeps running.

mod context;
mod device;
mod kernel;
mod memory;
mod module;
mod queue;

pub use context::CpuContext;
pub use device::CpuDevice;
pub use kernel::{CpuKernel, CpuKernelFn};
pub use memory::CpuMemoryView;
pub use module::CpuModule;
pub use queue::CpuTaskQueue;

/// Number of CPU devices: the host itself
pub const CPU_DEVICE_COUNT: u32 = 1;
