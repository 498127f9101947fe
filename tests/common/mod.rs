//! Common test utilities
#![allow(dead_code)]

use hcrt::capi::boundary::restore_default_error_func;
use hcrt::capi::{HcrtModule, HcrtNewMemoryViewFlags, hcrt_set_error_func};
use hcrt::error::ErrorKind;
use hcrt::handle;
use hcrt::runtime::cpu::{CpuKernelFn, CpuModule};
use hcrt::runtime::{AllocationType, Module, SharedMemoryHint};
use parking_lot::{Mutex, MutexGuard};
use std::ffi::{CStr, c_char, c_void};
use std::sync::Arc;

/// Serializes tests that touch the process-wide error callback
static TEST_LOCK: Mutex<()> = parking_lot::const_mutex(());

static RECORDED: Mutex<Vec<(ErrorKind, String)>> = parking_lot::const_mutex(Vec::new());

extern "C" fn record(kind: ErrorKind, message: *const c_char) {
    let text = if message.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(message) }.to_string_lossy().into_owned()
    };
    RECORDED.lock().push((kind, text));
}

/// Recording error callback, installed for the lifetime of the guard
pub struct ErrorRecorder {
    _lock: MutexGuard<'static, ()>,
}

impl ErrorRecorder {
    /// Take the test lock and install the recorder
    pub fn install() -> Self {
        let lock = TEST_LOCK.lock();
        RECORDED.lock().clear();
        hcrt_set_error_func(Some(record));
        Self { _lock: lock }
    }

    /// Drain the failures recorded so far
    pub fn take(&self) -> Vec<(ErrorKind, String)> {
        std::mem::take(&mut *RECORDED.lock())
    }

    /// Drain the recorded failures, keeping only their kinds
    pub fn kinds(&self) -> Vec<ErrorKind> {
        self.take().into_iter().map(|(kind, _)| kind).collect()
    }
}

impl Drop for ErrorRecorder {
    fn drop(&mut self) {
        restore_default_error_func();
    }
}

/// Kernel writing its launch extents into the first three `usize`s of params
pub unsafe extern "C-unwind" fn record_dims(params: *mut c_void, d0: usize, d1: usize, d2: usize) {
    if params.is_null() {
        return;
    }
    let out = params as *mut usize;
    unsafe {
        *out = d0;
        *out.add(1) = d1;
        *out.add(2) = d2;
    }
}

/// Kernel adding one to the first `usize` of params
pub unsafe extern "C-unwind" fn increment(params: *mut c_void, _: usize, _: usize, _: usize) {
    if !params.is_null() {
        unsafe { *(params as *mut usize) += 1 };
    }
}

/// Kernel that always panics
pub unsafe extern "C-unwind" fn explode(_: *mut c_void, _: usize, _: usize, _: usize) {
    panic!("kernel exploded");
}

/// Host-symbol module with the test kernels
pub fn test_module() -> Arc<dyn Module> {
    CpuModule::from_symbols(
        "test-kernels",
        &[
            ("record_dims", record_dims as CpuKernelFn),
            ("increment", increment as CpuKernelFn),
            ("explode", explode as CpuKernelFn),
        ],
    )
}

/// [`test_module`] exported as a C handle
pub fn test_module_handle() -> HcrtModule {
    handle::export(test_module()) as usize as HcrtModule
}

/// Flags for a view of `alloc_type` with no hint
pub fn flags(alloc_type: AllocationType) -> HcrtNewMemoryViewFlags {
    HcrtNewMemoryViewFlags {
        alloc_type: alloc_type as u32,
        sm_hint: SharedMemoryHint::None as u32,
    }
}

/// Whether CUDA tests can run on this machine
#[cfg(feature = "cuda")]
pub fn cuda_available() -> bool {
    hcrt::runtime::cuda::is_cuda_available()
}
