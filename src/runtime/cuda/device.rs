//! CUDA device implementation

use super::{GpuContext, GpuKernel, GpuModule, GpuTaskQueue};
use crate::error::{Error, Result};
use crate::runtime::linking::{downcast_modules, link_dynamic};
use crate::runtime::traits::device::require_modules;
use crate::runtime::traits::{Context, Device, Kernel, MemoryView, Module, TaskQueue, downcast_arc};
use crate::runtime::{AllocationType, DeviceInfo, DeviceType, MemoryViewFlags, ModuleOptions};
use std::sync::Arc;
use tracing::{debug, warn};

/// CUDA device bound to one context
///
/// A CUDA context covers exactly one device, so the only valid index within
/// a context is 0. [`Device::index`] reports the device ordinal.
#[derive(Debug)]
pub struct GpuDevice {
    context: Arc<GpuContext>,
}

impl GpuDevice {
    /// Create device `ordinal` with its own context
    pub fn new(ordinal: u32) -> Result<Arc<Self>> {
        let count = super::device_count()?;
        if ordinal >= count {
            return Err(Error::DeviceIndexOutOfRange {
                device_type: DeviceType::Gpu,
                index: ordinal,
                count,
            });
        }
        Self::with_context(GpuContext::new(ordinal)?, 0)
    }

    /// Create the device of an existing context
    pub fn with_context(context: Arc<GpuContext>, index: u32) -> Result<Arc<Self>> {
        if index != 0 {
            return Err(Error::DeviceIndexOutOfRange {
                device_type: DeviceType::Gpu,
                index,
                count: 1,
            });
        }
        debug!(ordinal = context.ordinal(), "Creating CUDA device");
        Ok(Arc::new(Self { context }))
    }

    /// Create the device of `context` identified by a native `CUdevice`
    pub fn from_native_handle(context: Arc<GpuContext>, native_device: u64) -> Result<Arc<Self>> {
        let expected = context.cuda().cu_device() as u64;
        if native_device != expected {
            return Err(Error::invalid_argument(
                "native_device",
                format!("CUdevice {native_device} does not belong to the context (device {expected})"),
            ));
        }
        Self::with_context(context, 0)
    }

    /// Context the device runs on
    pub fn context(&self) -> &Arc<GpuContext> {
        &self.context
    }

    fn downcast_module(module: &Arc<dyn Module>) -> Result<Arc<GpuModule>> {
        let found = module.device_type();
        if found != DeviceType::Gpu {
            return Err(Error::BackendMismatch {
                expected: DeviceType::Gpu,
                found,
            });
        }
        downcast_arc::<GpuModule>(module.clone().into_any(), DeviceType::Gpu, found)
    }
}

impl Device for GpuDevice {
    fn device_type(&self) -> DeviceType {
        DeviceType::Gpu
    }

    fn index(&self) -> u32 {
        self.context.ordinal() as u32
    }

    fn name(&self) -> String {
        match self.context.cuda().name() {
            Ok(name) => name,
            Err(e) => {
                warn!("Failed to query CUDA device name: {e:?}");
                format!("gpu:{}", self.index())
            }
        }
    }

    fn info(&self) -> DeviceInfo {
        super::device_info(self.index()).unwrap_or_else(|e| {
            warn!("Failed to query CUDA device info: {e}");
            DeviceInfo {
                vendor_id: super::NVIDIA_VENDOR_ID,
                device_id: 0,
            }
        })
    }

    fn create_memory_view(
        &self,
        host_addr: u64,
        size: usize,
        flags: MemoryViewFlags,
    ) -> Result<Arc<dyn MemoryView>> {
        self.context.create_memory_view(host_addr, size, flags)
    }

    fn alloc_type_of(&self, addr: u64) -> AllocationType {
        self.context.tracker().classify(addr)
    }

    fn load_module(&self, path: &str, options: &ModuleOptions) -> Result<Arc<dyn Module>> {
        let module = GpuModule::load(self.context.cuda().clone(), path, options)?;
        Ok(module)
    }

    fn static_link_modules(&self, modules: &[Arc<dyn Module>]) -> Result<Arc<dyn Module>> {
        require_modules(modules)?;
        let parts = downcast_modules::<GpuModule>(modules, DeviceType::Gpu)?;
        Ok(GpuModule::link_static(self.context.cuda().clone(), parts))
    }

    fn dynamic_link_modules(&self, modules: &[Arc<dyn Module>]) -> Result<()> {
        require_modules(modules)?;
        let parts = downcast_modules::<GpuModule>(modules, DeviceType::Gpu)?;
        debug!(modules = parts.len(), "Dynamically linking CUDA modules");
        link_dynamic(&parts);
        Ok(())
    }

    fn new_kernel(&self, module: &Arc<dyn Module>, name: &str) -> Result<Arc<dyn Kernel>> {
        let module = Self::downcast_module(module)?;
        let kernel = GpuKernel::new(module, name)?;
        Ok(kernel)
    }

    fn new_task_queue(self: Arc<Self>) -> Result<Arc<dyn TaskQueue>> {
        let queue = GpuTaskQueue::new(self)?;
        Ok(queue)
    }

    fn device_native_handle(&self) -> u64 {
        self.context.cuda().cu_device() as u64
    }

    fn context_native_handle(&self) -> u64 {
        self.context.native_handle()
    }
}
