//! CUDA kernels

use super::GpuModule;
use crate::error::Result;
use crate::runtime::traits::{Kernel, Module};
use crate::runtime::DeviceType;
use std::any::Any;
use std::sync::Arc;

/// `CUfunction` resolved from a [`GpuModule`]
#[derive(Debug)]
pub struct GpuKernel {
    name: String,
    function: u64,
    module: Arc<GpuModule>,
    /// Module that `function` belongs to
    owner: Arc<GpuModule>,
}

impl GpuKernel {
    /// Resolve `name` in `module` or its link peers
    pub fn new(module: Arc<GpuModule>, name: &str) -> Result<Arc<Self>> {
        let resolved = module.resolve(name)?;
        Ok(Arc::new(Self {
            name: name.to_string(),
            function: resolved.addr,
            module,
            owner: resolved.owner,
        }))
    }

    /// `CUfunction` as an integer
    pub fn function(&self) -> u64 {
        self.function
    }

    /// Module that holds the kernel's code
    pub fn owner(&self) -> &Arc<GpuModule> {
        &self.owner
    }
}

impl Kernel for GpuKernel {
    fn device_type(&self) -> DeviceType {
        DeviceType::Gpu
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
