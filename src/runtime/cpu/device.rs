//! CPU device implementation

use super::{CPU_DEVICE_COUNT, CpuContext, CpuKernel, CpuMemoryView, CpuModule, CpuTaskQueue};
use crate::error::{Error, Result};
use crate::runtime::linking::{downcast_modules, link_dynamic};
use crate::runtime::traits::device::require_modules;
use crate::runtime::traits::{Device, Kernel, MemoryView, Module, TaskQueue, downcast_arc};
use crate::runtime::{
    AllocationTracker, AllocationType, DeviceInfo, DeviceType, MemoryViewFlags, ModuleOptions,
};
use std::sync::Arc;
use tracing::debug;

/// CPU device (there's only one: the host CPU)
#[derive(Debug)]
pub struct CpuDevice {
    index: u32,
    context: Arc<CpuContext>,
}

impl CpuDevice {
    /// Create the host device with its own context
    pub fn new(index: u32) -> Result<Arc<Self>> {
        Self::with_context(CpuContext::new(), index)
    }

    /// Create the host device on an existing context.
    ///
    /// Views created through the device are classified together with the
    /// context's own views.
    pub fn with_context(context: Arc<CpuContext>, index: u32) -> Result<Arc<Self>> {
        if index >= CPU_DEVICE_COUNT {
            return Err(Error::DeviceIndexOutOfRange {
                device_type: DeviceType::Cpu,
                index,
                count: CPU_DEVICE_COUNT,
            });
        }
        debug!(index, "Creating CPU device");
        Ok(Arc::new(Self { index, context }))
    }

    /// Context the device runs on
    pub fn context(&self) -> &Arc<CpuContext> {
        &self.context
    }

    fn tracker(&self) -> &Arc<AllocationTracker> {
        self.context.tracker()
    }
}

impl Device for CpuDevice {
    fn device_type(&self) -> DeviceType {
        DeviceType::Cpu
    }

    fn index(&self) -> u32 {
        self.index
    }

    fn name(&self) -> String {
        "cpu".to_string()
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo::default()
    }

    fn create_memory_view(
        &self,
        host_addr: u64,
        size: usize,
        flags: MemoryViewFlags,
    ) -> Result<Arc<dyn MemoryView>> {
        let view = CpuMemoryView::new(host_addr, size, flags, self.tracker().clone())?;
        Ok(view)
    }

    fn alloc_type_of(&self, addr: u64) -> AllocationType {
        self.tracker().classify(addr)
    }

    fn load_module(&self, path: &str, options: &ModuleOptions) -> Result<Arc<dyn Module>> {
        let module = CpuModule::load(path, options)?;
        Ok(module)
    }

    fn static_link_modules(&self, modules: &[Arc<dyn Module>]) -> Result<Arc<dyn Module>> {
        require_modules(modules)?;
        let parts = downcast_modules::<CpuModule>(modules, DeviceType::Cpu)?;
        Ok(CpuModule::link_static(parts))
    }

    fn dynamic_link_modules(&self, modules: &[Arc<dyn Module>]) -> Result<()> {
        require_modules(modules)?;
        let parts = downcast_modules::<CpuModule>(modules, DeviceType::Cpu)?;
        debug!(modules = parts.len(), "Dynamically linking CPU modules");
        link_dynamic(&parts);
        Ok(())
    }

    fn new_kernel(&self, module: &Arc<dyn Module>, name: &str) -> Result<Arc<dyn Kernel>> {
        let found = module.device_type();
        if found != DeviceType::Cpu {
            return Err(Error::BackendMismatch {
                expected: DeviceType::Cpu,
                found,
            });
        }
        let module = downcast_arc::<CpuModule>(module.clone().into_any(), DeviceType::Cpu, found)?;
        let kernel = CpuKernel::new(module, name)?;
        Ok(kernel)
    }

    fn new_task_queue(self: Arc<Self>) -> Result<Arc<dyn TaskQueue>> {
        let queue = CpuTaskQueue::new(self)?;
        Ok(queue)
    }
}
