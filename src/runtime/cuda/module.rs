//! CUDA modules loaded from PTX or cubin images

use super::check;
use crate::error::{Error, Result};
use crate::runtime::linking::{LinkPeers, Linkable, Resolved, resolve, resolve_address};
use crate::runtime::traits::Module;
use crate::runtime::{DeviceType, ModuleOptions};
use cudarc::driver::safe::CudaContext;
use cudarc::driver::sys;
use std::any::Any;
use std::ffi::{CString, c_void};
use std::sync::Arc;
use tracing::{debug, warn};

/// Highest JIT optimization level the driver accepts
const MAX_JIT_OPT_LEVEL: u32 = 4;

enum Code {
    /// `CUmodule` as an integer
    Loaded(u64),
    Composite(Vec<Arc<GpuModule>>),
}

/// Kernel code loaded into a CUDA context
pub struct GpuModule {
    name: String,
    cuda: Arc<CudaContext>,
    code: Code,
    options: ModuleOptions,
    peers: LinkPeers<GpuModule>,
}

impl std::fmt::Debug for GpuModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts = match &self.code {
            Code::Loaded(_) => 1,
            Code::Composite(parts) => parts.len(),
        };
        f.debug_struct("GpuModule")
            .field("name", &self.name)
            .field("parts", &parts)
            .field("peers", &self.peers.len())
            .finish()
    }
}

impl GpuModule {
    /// Load a PTX or cubin file, JIT-compiling PTX with `options`
    pub fn load(cuda: Arc<CudaContext>, path: &str, options: &ModuleOptions) -> Result<Arc<Self>> {
        if path.is_empty() {
            return Err(Error::invalid_argument("path", "module path is empty"));
        }
        debug!(path, ?options, "Loading CUDA module");

        let mut image = std::fs::read(path).map_err(|e| Error::module_load(path, e))?;
        image.push(0);

        cuda.bind_to_thread()?;
        if options.stack_size > 0 {
            // SAFETY: the context is bound to this thread.
            let status = unsafe {
                sys::cuCtxSetLimit(sys::CUlimit::CU_LIMIT_STACK_SIZE, options.stack_size as usize)
            };
            check(status, "stack size limit")?;
        }

        let mut jit_options = vec![sys::CUjit_option::CU_JIT_GENERATE_DEBUG_INFO];
        let mut jit_values = vec![usize::from(options.debug) as *mut c_void];
        if options.opt_level > 0 {
            jit_options.push(sys::CUjit_option::CU_JIT_OPTIMIZATION_LEVEL);
            jit_values.push(options.opt_level.min(MAX_JIT_OPT_LEVEL) as usize as *mut c_void);
        }

        let mut module: sys::CUmodule = std::ptr::null_mut();
        // SAFETY: `image` is NUL terminated and outlives the call; the option
        // arrays have equal length.
        let status = unsafe {
            sys::cuModuleLoadDataEx(
                &mut module,
                image.as_ptr() as *const c_void,
                jit_options.len() as u32,
                jit_options.as_mut_ptr(),
                jit_values.as_mut_ptr(),
            )
        };
        check(status, "module load").map_err(|e| Error::module_load(path, e))?;

        Ok(Arc::new(Self {
            name: path.to_string(),
            cuda,
            code: Code::Loaded(module as u64),
            options: *options,
            peers: LinkPeers::default(),
        }))
    }

    /// Combine modules into a new one; the inputs are left untouched
    pub fn link_static(cuda: Arc<CudaContext>, parts: Vec<Arc<GpuModule>>) -> Arc<Self> {
        let name = parts
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join("+");
        debug!(%name, parts = parts.len(), "Statically linking CUDA modules");
        Arc::new(Self {
            name,
            cuda,
            code: Code::Composite(parts),
            options: ModuleOptions::default(),
            peers: LinkPeers::default(),
        })
    }

    /// Options the module was loaded with
    pub fn options(&self) -> &ModuleOptions {
        &self.options
    }

    /// `CUfunction` of `name` and the module it was found in
    pub(crate) fn resolve(self: &Arc<Self>, name: &str) -> Result<Resolved<Self>> {
        resolve(self, name)
    }
}

impl Linkable for GpuModule {
    fn peers(&self) -> &LinkPeers<Self> {
        &self.peers
    }

    fn resolve_local(&self, name: &str) -> Option<u64> {
        match &self.code {
            Code::Loaded(module) => {
                let cname = CString::new(name).ok()?;
                self.cuda.bind_to_thread().ok()?;
                let mut function: sys::CUfunction = std::ptr::null_mut();
                // SAFETY: the module is loaded in the bound context.
                let status = unsafe {
                    sys::cuModuleGetFunction(&mut function, *module as sys::CUmodule, cname.as_ptr())
                };
                (status == sys::CUresult::CUDA_SUCCESS && !function.is_null())
                    .then_some(function as u64)
            }
            Code::Composite(parts) => parts.iter().find_map(|part| part.resolve_local(name)),
        }
    }
}

impl Module for GpuModule {
    fn device_type(&self) -> DeviceType {
        DeviceType::Gpu
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn function_ptr(&self, name: &str) -> Result<u64> {
        resolve_address(self, name)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl Drop for GpuModule {
    fn drop(&mut self) {
        let Code::Loaded(module) = self.code else {
            return;
        };
        if let Err(e) = self.cuda.bind_to_thread() {
            warn!("Failed to bind CUDA context while unloading {}: {e:?}", self.name);
            return;
        }
        // SAFETY: kernels hold their module, so nothing references it anymore.
        let status = unsafe { sys::cuModuleUnload(module as sys::CUmodule) };
        if let Err(e) = check(status, "module unload") {
            warn!("{e}");
        }
    }
}
