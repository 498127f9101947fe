//! CPU kernels

use super::CpuModule;
use crate::error::Result;
use crate::runtime::traits::{Kernel, Module};
use crate::runtime::DeviceType;
use std::any::Any;
use std::ffi::c_void;
use std::sync::Arc;

/// Entry point of a CPU kernel.
///
/// Called once per launch with the parameter block address (null when no
/// parameters were given) and the three launch extents. The `C-unwind` ABI
/// lets a panicking Rust kernel surface as a failed launch; C kernels are
/// called the same way as through `extern "C"`.
pub type CpuKernelFn = unsafe extern "C-unwind" fn(params: *mut c_void, d0: usize, d1: usize, d2: usize);

/// Entry point resolved from a [`CpuModule`]
#[derive(Debug)]
pub struct CpuKernel {
    name: String,
    entry: CpuKernelFn,
    module: Arc<CpuModule>,
    /// Module whose code `entry` points into; differs from `module` when the
    /// symbol came from a dynamic link peer
    owner: Arc<CpuModule>,
}

impl CpuKernel {
    /// Resolve `name` in `module` or its link peers
    pub fn new(module: Arc<CpuModule>, name: &str) -> Result<Arc<Self>> {
        let resolved = module.resolve(name)?;
        // SAFETY: the address is non-null and declared to have the CpuKernelFn
        // signature; `owner` keeps its library loaded while this kernel exists.
        let entry = unsafe { std::mem::transmute::<usize, CpuKernelFn>(resolved.addr as usize) };
        Ok(Arc::new(Self {
            name: name.to_string(),
            entry,
            module,
            owner: resolved.owner,
        }))
    }

    /// Raw entry point
    pub fn entry(&self) -> CpuKernelFn {
        self.entry
    }

    /// Module that holds the kernel's code
    pub fn owner(&self) -> &Arc<CpuModule> {
        &self.owner
    }
}

impl Kernel for CpuKernel {
    fn device_type(&self) -> DeviceType {
        DeviceType::Cpu
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn module(&self) -> Arc<dyn Module> {
        self.module.clone()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
