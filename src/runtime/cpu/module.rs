//! CPU modules: shared libraries, host symbols, and static link composites

use super::CpuKernelFn;
use crate::error::{Error, Result};
use crate::runtime::linking::{LinkPeers, Linkable, Resolved, resolve, resolve_address};
use crate::runtime::traits::Module;
use crate::runtime::{DeviceType, ModuleOptions};
use libloading::Library;
use std::any::Any;
use std::collections::HashMap;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

enum Code {
    Library(Library),
    Symbols(HashMap<String, u64>),
    Composite(Vec<Arc<CpuModule>>),
}

impl std::fmt::Debug for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Code::Library(_) => f.write_str("Library"),
            Code::Symbols(symbols) => f.debug_set().entries(symbols.keys()).finish(),
            Code::Composite(parts) => f
                .debug_list()
                .entries(parts.iter().map(|p| p.name.as_str()))
                .finish(),
        }
    }
}

/// Kernel code runnable on the host
#[derive(Debug)]
pub struct CpuModule {
    name: String,
    code: Code,
    options: ModuleOptions,
    peers: LinkPeers<CpuModule>,
}

impl CpuModule {
    /// Load a shared library.
    ///
    /// A bare name such as `kernels` resolves to the platform library file
    /// name (`libkernels.so`, `kernels.dll`, `libkernels.dylib`); anything
    /// with a directory or an extension is used as given.
    pub fn load(path: &str, options: &ModuleOptions) -> Result<Arc<Self>> {
        if path.is_empty() {
            return Err(Error::invalid_argument("path", "module path is empty"));
        }
        let file = library_path(path);
        debug!(path, file = %file.display(), ?options, "Loading CPU module");

        // SAFETY: loading a library runs its initializers; kernel libraries are
        // trusted code supplied by the caller.
        let library = unsafe { Library::new(&file) }
            .map_err(|e| Error::module_load(file.display().to_string(), e))?;

        Ok(Arc::new(Self {
            name: path.to_string(),
            code: Code::Library(library),
            options: *options,
            peers: LinkPeers::default(),
        }))
    }

    /// Build a module from in-process kernel functions
    pub fn from_symbols(name: &str, symbols: &[(&str, CpuKernelFn)]) -> Arc<Self> {
        let symbols = symbols
            .iter()
            .map(|(symbol, entry)| (symbol.to_string(), *entry as usize as u64))
            .collect();
        Arc::new(Self {
            name: name.to_string(),
            code: Code::Symbols(symbols),
            options: ModuleOptions::default(),
            peers: LinkPeers::default(),
        })
    }

    /// Combine modules into a new one; the inputs are left untouched
    pub fn link_static(parts: Vec<Arc<CpuModule>>) -> Arc<Self> {
        let name = parts
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join("+");
        debug!(%name, parts = parts.len(), "Statically linking CPU modules");
        Arc::new(Self {
            name,
            code: Code::Composite(parts),
            options: ModuleOptions::default(),
            peers: LinkPeers::default(),
        })
    }

    /// Options the module was loaded with
    pub fn options(&self) -> &ModuleOptions {
        &self.options
    }

    pub(crate) fn resolve(self: &Arc<Self>, name: &str) -> Result<Resolved<Self>> {
        resolve(self, name)
    }
}

impl Linkable for CpuModule {
    fn peers(&self) -> &LinkPeers<Self> {
        &self.peers
    }

    fn resolve_local(&self, name: &str) -> Option<u64> {
        match &self.code {
            Code::Library(library) => {
                // SAFETY: the symbol is only read as an address.
                let symbol = unsafe { library.get::<*mut c_void>(name.as_bytes()) }.ok()?;
                let addr = *symbol as u64;
                (addr != 0).then_some(addr)
            }
            Code::Symbols(symbols) => symbols.get(name).copied(),
            Code::Composite(parts) => parts.iter().find_map(|part| part.resolve_local(name)),
        }
    }
}

impl Module for CpuModule {
    fn device_type(&self) -> DeviceType {
        DeviceType::Cpu
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

fn library_path(path: &str) -> PathBuf {
    let p = Path::new(path);
    let bare = p.components().count() == 1 && p.extension().is_none();
    if bare {
        PathBuf::from(libloading::library_filename(path))
    } else {
        p.to_path_buf()
    }
}
