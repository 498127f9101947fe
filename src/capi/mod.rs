//! C ABI surface
//!
//! Every entry point is `extern "C"`, never unwinds, and reports failures
//! through the callback installed with [`hcrt_set_error_func`] before
//! returning its sentinel (null, 0, `false`, `u64::MAX`, or
//! `AllocationType::Unknown`).
//!
//! Objects cross the boundary as opaque handles: registry ids cast to
//! `void*`. Enumerations arrive as `u32` and are validated.

pub mod boundary;
pub mod header;

pub use boundary::HcrtErrorFunc;

use crate::error::{Error, Result};
use crate::handle::{self, HandleObject};
use crate::runtime::{
    self, AllocationType, Context, Device, DeviceInfo, DeviceType, Kernel, LaunchDims,
    LaunchFuture, MemoryView, MemoryViewFlags, Module, ModuleOptions, ModuleType,
    SharedMemoryHint, TaskQueue,
};
use boundary::guard;
use std::ffi::{CStr, c_char, c_void};
use std::ptr;
use std::sync::Arc;

/// Any handle
pub type HcrtGenericHandle = *mut c_void;
/// Device handle
pub type HcrtDevice = *mut c_void;
/// Context handle
pub type HcrtContext = *mut c_void;
/// Memory view handle
pub type HcrtMemoryView = *mut c_void;
/// Module handle
pub type HcrtModule = *mut c_void;
/// Kernel handle
pub type HcrtKernel = *mut c_void;
/// Task queue handle
pub type HcrtTaskQueue = *mut c_void;
/// Launch future handle
pub type HcrtFuture = *mut c_void;

/// Device identification filled by [`hcrt_get_device_info`]
pub type HcrtDeviceInfo = DeviceInfo;

/// Memory view creation flags
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HcrtNewMemoryViewFlags {
    /// `AllocationType` value
    pub alloc_type: u32,
    /// `SharedMemoryHint` value
    pub sm_hint: u32,
}

impl TryFrom<HcrtNewMemoryViewFlags> for MemoryViewFlags {
    type Error = Error;

    fn try_from(raw: HcrtNewMemoryViewFlags) -> Result<Self> {
        let alloc_type = AllocationType::from_raw(raw.alloc_type)
            .ok_or(Error::UnsupportedAllocationType(raw.alloc_type))?;
        let sm_hint = SharedMemoryHint::from_raw(raw.sm_hint).ok_or_else(|| {
            Error::invalid_argument("sm_hint", format!("unknown shared memory hint {}", raw.sm_hint))
        })?;
        Ok(MemoryViewFlags {
            alloc_type,
            sm_hint,
        })
    }
}

/// Module loading options
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HcrtModuleOptions {
    /// Per-invocation stack size in bytes (0 = default)
    pub stack_size: u32,
    /// Module is a library for linking
    pub library_compilation: bool,
    /// `ModuleType` value
    pub module_type: u32,
    /// Load with debug information
    pub debug: bool,
    /// JIT optimization level
    pub opt_level: u32,
}

impl TryFrom<HcrtModuleOptions> for ModuleOptions {
    type Error = Error;

    fn try_from(raw: HcrtModuleOptions) -> Result<Self> {
        let module_type = ModuleType::from_raw(raw.module_type).ok_or_else(|| {
            Error::invalid_argument("module_type", format!("unknown module type {}", raw.module_type))
        })?;
        Ok(ModuleOptions {
            stack_size: raw.stack_size,
            library_compilation: raw.library_compilation,
            module_type,
            debug: raw.debug,
            opt_level: raw.opt_level,
        })
    }
}

fn to_handle(id: u64) -> *mut c_void {
    id as usize as *mut c_void
}

fn from_handle(handle: *mut c_void) -> u64 {
    handle as usize as u64
}

fn export<T: HandleObject>(object: T) -> *mut c_void {
    to_handle(handle::export(object))
}

fn get<T: HandleObject>(handle: *mut c_void) -> Result<T> {
    handle::lookup::<T>(from_handle(handle))
}

fn device_type(raw: u32) -> Result<DeviceType> {
    DeviceType::try_from(raw)
}

/// Borrow a C string argument
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
unsafe fn c_str<'a>(ptr: *const c_char, what: &'static str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(Error::NullPointer(what));
    }
    // SAFETY: non-null and NUL-terminated per the caller contract.
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|e| Error::invalid_argument(what, e.to_string()))
}

/// Collect a C array of module handles
///
/// # Safety
///
/// `modules` must be null or point to `count` readable handles.
unsafe fn module_list(modules: *const HcrtModule, count: u32) -> Result<Vec<Arc<dyn Module>>> {
    if count == 0 {
        return Err(Error::EmptyModuleList);
    }
    if modules.is_null() {
        return Err(Error::NullPointer("modules"));
    }
    // SAFETY: non-null with `count` elements per the caller contract.
    let handles = unsafe { std::slice::from_raw_parts(modules, count as usize) };
    handles.iter().map(|&h| get::<Arc<dyn Module>>(h)).collect()
}

// ============================================================================
// Lifetime and errors
// ============================================================================

/// Add a reference to any handle
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_retain(h: HcrtGenericHandle) {
    guard((), || handle::retain(from_handle(h)))
}

/// Drop a reference to any handle, destroying the object at zero
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_release(h: HcrtGenericHandle) {
    guard((), || handle::release(from_handle(h)))
}

/// Number of outstanding references to a handle (0 on failure)
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_use_count(h: HcrtGenericHandle) -> i64 {
    guard(0, || {
        let count = handle::use_count(from_handle(h))?;
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    })
}

/// Install the process-wide error callback; null silences reporting
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_set_error_func(func: Option<HcrtErrorFunc>) {
    boundary::set_error_func(func);
}

// ============================================================================
// Device
// ============================================================================

/// Get a device of `device_type` (`HcrtDeviceType`) at `index`
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_get_device(device_type_raw: u32, index: u32) -> HcrtDevice {
    guard(ptr::null_mut(), || {
        let device = runtime::get_device(device_type(device_type_raw)?, index)?;
        Ok(export(device))
    })
}

/// Get a device running on `context`
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_get_device_from_context(context: HcrtContext, index: u32) -> HcrtDevice {
    guard(ptr::null_mut(), || {
        let context = get::<Arc<dyn Context>>(context)?;
        Ok(export(runtime::get_device_from_context(&context, index)?))
    })
}

/// Get a device on `context` from a native device handle
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_get_device_from_native_handle(
    context: HcrtContext,
    native_device: *mut c_void,
) -> HcrtDevice {
    guard(ptr::null_mut(), || {
        let context = get::<Arc<dyn Context>>(context)?;
        let device = runtime::get_device_from_native_handle(&context, native_device as usize as u64)?;
        Ok(export(device))
    })
}

/// Number of devices of an explicit back-end (0 on failure)
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_get_device_count(device_type_raw: u32) -> u32 {
    guard(0, || runtime::device_count(device_type(device_type_raw)?))
}

/// Fill `info` for device `index` of an explicit back-end
///
/// # Safety
///
/// `info` must be null or point to writable `HcrtDeviceInfo` storage.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hcrt_get_device_info(
    device_type_raw: u32,
    index: u32,
    info: *mut HcrtDeviceInfo,
) {
    guard((), || {
        if info.is_null() {
            return Err(Error::NullPointer("info"));
        }
        let found = runtime::device_info(device_type(device_type_raw)?, index)?;
        // SAFETY: non-null and writable per the caller contract.
        unsafe { info.write(found) };
        Ok(())
    })
}

/// Driver platform handle of a device
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_platform_native_handle(device: HcrtDevice) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let device = get::<Arc<dyn Device>>(device)?;
        Ok(device.platform_native_handle() as usize as *mut c_void)
    })
}

/// Driver device handle of a device
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_device_native_handle(device: HcrtDevice) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let device = get::<Arc<dyn Device>>(device)?;
        Ok(device.device_native_handle() as usize as *mut c_void)
    })
}

/// Driver context handle a device runs on
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_device_context_native_handle(device: HcrtDevice) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let device = get::<Arc<dyn Device>>(device)?;
        Ok(device.context_native_handle() as usize as *mut c_void)
    })
}

// ============================================================================
// Context
// ============================================================================

/// Create a runtime-owned context
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_new_context(device_type_raw: u32) -> HcrtContext {
    guard(ptr::null_mut(), || {
        Ok(export(runtime::new_context(device_type(device_type_raw)?)?))
    })
}

/// Adopt a caller-owned native context
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_get_context_from_native_handle(
    device_type_raw: u32,
    native: *mut c_void,
) -> HcrtContext {
    guard(ptr::null_mut(), || {
        let context = runtime::get_context_from_native_handle(
            device_type(device_type_raw)?,
            native as usize as u64,
        )?;
        Ok(export(context))
    })
}

/// Driver handle of a context
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_context_native_handle(context: HcrtContext) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let context = get::<Arc<dyn Context>>(context)?;
        Ok(context.native_handle() as usize as *mut c_void)
    })
}

// ============================================================================
// MemoryView
// ============================================================================

/// Create a memory view on a device
///
/// # Safety
///
/// `flags` must be null or point to a readable `HcrtNewMemoryViewFlags`.
/// A non-null `app_memory` must hold `size` bytes and outlive the view.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hcrt_new_memory_view(
    device: HcrtDevice,
    app_memory: *mut c_void,
    size: usize,
    flags: *const HcrtNewMemoryViewFlags,
) -> HcrtMemoryView {
    guard(ptr::null_mut(), || {
        if flags.is_null() {
            return Err(Error::NullPointer("flags"));
        }
        // SAFETY: non-null and readable per the caller contract.
        let flags = MemoryViewFlags::try_from(unsafe { flags.read() })?;
        let device = get::<Arc<dyn Device>>(device)?;
        let view = device.new_memory_view(app_memory as usize as u64, size, flags)?;
        Ok(export(view))
    })
}

/// Create a shared memory view on a context
///
/// # Safety
///
/// Same contract as [`hcrt_new_memory_view`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hcrt_new_memory_view_for_context(
    context: HcrtContext,
    app_memory: *mut c_void,
    size: usize,
    flags: *const HcrtNewMemoryViewFlags,
) -> HcrtMemoryView {
    guard(ptr::null_mut(), || {
        if flags.is_null() {
            return Err(Error::NullPointer("flags"));
        }
        // SAFETY: non-null and readable per the caller contract.
        let flags = MemoryViewFlags::try_from(unsafe { flags.read() })?;
        let context = get::<Arc<dyn Context>>(context)?;
        let view = context.new_memory_view(app_memory as usize as u64, size, flags)?;
        Ok(export(view))
    })
}

fn view_addr(view: HcrtMemoryView, addr: impl FnOnce(&dyn MemoryView) -> u64) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let view = get::<Arc<dyn MemoryView>>(view)?;
        Ok(addr(view.as_ref()) as usize as *mut c_void)
    })
}

/// Host address of a view (null for device-only views)
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_host_ptr(view: HcrtMemoryView) -> *mut c_void {
    view_addr(view, |v| v.host_ptr())
}

/// Device address of a view
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_device_ptr(view: HcrtMemoryView) -> *mut c_void {
    view_addr(view, |v| v.device_ptr())
}

/// Shared address of a view (same as the device address)
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_shared_ptr(view: HcrtMemoryView) -> *mut c_void {
    view_addr(view, |v| v.shared_ptr())
}

/// Size of a view in bytes
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_size(view: HcrtMemoryView) -> usize {
    guard(0, || Ok(get::<Arc<dyn MemoryView>>(view)?.size()))
}

/// Allocation kind of a view
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_get_memory_view_alloc_type(view: HcrtMemoryView) -> AllocationType {
    guard(AllocationType::Unknown, || {
        Ok(get::<Arc<dyn MemoryView>>(view)?.alloc_type())
    })
}

/// Classify an arbitrary address against a device's allocations
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_get_memory_alloc_type(
    device: HcrtDevice,
    memory: *mut c_void,
) -> AllocationType {
    guard(AllocationType::Unknown, || {
        let device = get::<Arc<dyn Device>>(device)?;
        Ok(device.alloc_type_of(memory as usize as u64))
    })
}

// ============================================================================
// Module and Kernel
// ============================================================================

/// Load a module file
///
/// # Safety
///
/// `path` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hcrt_load_module(
    device: HcrtDevice,
    path: *const c_char,
    options: HcrtModuleOptions,
) -> HcrtModule {
    guard(ptr::null_mut(), || {
        // SAFETY: forwarded caller contract.
        let path = unsafe { c_str(path, "path") }?;
        let options = ModuleOptions::try_from(options)?;
        let device = get::<Arc<dyn Device>>(device)?;
        Ok(export(device.load_module(path, &options)?))
    })
}

/// Link modules in place so they resolve symbols from each other
///
/// # Safety
///
/// `modules` must be null or point to `count` module handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hcrt_dynamic_link_modules(
    device: HcrtDevice,
    modules: *const HcrtModule,
    count: u32,
) {
    guard((), || {
        // SAFETY: forwarded caller contract.
        let modules = unsafe { module_list(modules, count) }?;
        get::<Arc<dyn Device>>(device)?.dynamic_link_modules(&modules)
    })
}

/// Link modules into a new module; the inputs are unaffected
///
/// # Safety
///
/// `modules` must be null or point to `count` module handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hcrt_static_link_modules(
    device: HcrtDevice,
    modules: *const HcrtModule,
    count: u32,
) -> HcrtModule {
    guard(ptr::null_mut(), || {
        // SAFETY: forwarded caller contract.
        let modules = unsafe { module_list(modules, count) }?;
        let device = get::<Arc<dyn Device>>(device)?;
        Ok(export(device.static_link_modules(&modules)?))
    })
}

/// Raw address of a named symbol in a module
///
/// # Safety
///
/// `name` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hcrt_function_ptr(
    module: HcrtModule,
    name: *const c_char,
) -> *mut c_void {
    guard(ptr::null_mut(), || {
        // SAFETY: forwarded caller contract.
        let name = unsafe { c_str(name, "name") }?;
        let addr = get::<Arc<dyn Module>>(module)?.function_ptr(name)?;
        Ok(addr as usize as *mut c_void)
    })
}

/// Resolve a kernel from a module
///
/// # Safety
///
/// `name` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hcrt_new_kernel(
    device: HcrtDevice,
    module: HcrtModule,
    name: *const c_char,
) -> HcrtKernel {
    guard(ptr::null_mut(), || {
        // SAFETY: forwarded caller contract.
        let name = unsafe { c_str(name, "name") }?;
        let device = get::<Arc<dyn Device>>(device)?;
        let module = get::<Arc<dyn Module>>(module)?;
        Ok(export(device.new_kernel(&module, name)?))
    })
}

// ============================================================================
// TaskQueue and Future
// ============================================================================

/// Create a task queue on a device
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_new_task_queue(device: HcrtDevice) -> HcrtTaskQueue {
    guard(ptr::null_mut(), || {
        let device = get::<Arc<dyn Device>>(device)?;
        Ok(export(device.new_task_queue()?))
    })
}

/// Enqueue an ordering point
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_device_barrier(queue: HcrtTaskQueue) {
    guard((), || get::<Arc<dyn TaskQueue>>(queue)?.barrier())
}

/// Enqueue a host to device transfer of a shared view
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_copy_to_device(queue: HcrtTaskQueue, view: HcrtMemoryView) {
    guard((), || {
        let queue = get::<Arc<dyn TaskQueue>>(queue)?;
        queue.copy_to_device(&get::<Arc<dyn MemoryView>>(view)?)
    })
}

/// Enqueue a device to host transfer of a shared view
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_copy_to_host(queue: HcrtTaskQueue, view: HcrtMemoryView) {
    guard((), || {
        let queue = get::<Arc<dyn TaskQueue>>(queue)?;
        queue.copy_to_host(&get::<Arc<dyn MemoryView>>(view)?)
    })
}

/// Enqueue a copy of `size` bytes between two views
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_copy_memory_view(
    queue: HcrtTaskQueue,
    dst: HcrtMemoryView,
    src: HcrtMemoryView,
    size: usize,
) {
    guard((), || {
        let queue = get::<Arc<dyn TaskQueue>>(queue)?;
        let dst = get::<Arc<dyn MemoryView>>(dst)?;
        let src = get::<Arc<dyn MemoryView>>(src)?;
        queue.copy_memory_view(&dst, &src, size)
    })
}

fn launch(
    queue: HcrtTaskQueue,
    kernel: HcrtKernel,
    params: HcrtMemoryView,
    dims: LaunchDims,
) -> HcrtFuture {
    guard(ptr::null_mut(), || {
        let queue = get::<Arc<dyn TaskQueue>>(queue)?;
        let kernel = get::<Arc<dyn Kernel>>(kernel)?;
        let params = if params.is_null() {
            None
        } else {
            Some(get::<Arc<dyn MemoryView>>(params)?)
        };
        let future = queue.launch(&kernel, params.as_ref(), dims)?;
        Ok(export(future))
    })
}

/// Launch over `dim0` instances; `params` may be null
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_launch_1d(
    queue: HcrtTaskQueue,
    kernel: HcrtKernel,
    params: HcrtMemoryView,
    dim0: usize,
) -> HcrtFuture {
    launch(queue, kernel, params, LaunchDims::d1(dim0))
}

/// Launch over a `dim0 x dim1` grid; `params` may be null
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_launch_2d(
    queue: HcrtTaskQueue,
    kernel: HcrtKernel,
    params: HcrtMemoryView,
    dim0: usize,
    dim1: usize,
) -> HcrtFuture {
    launch(queue, kernel, params, LaunchDims::d2(dim0, dim1))
}

/// Launch over a `dim0 x dim1 x dim2` grid; `params` may be null
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_launch_3d(
    queue: HcrtTaskQueue,
    kernel: HcrtKernel,
    params: HcrtMemoryView,
    dim0: usize,
    dim1: usize,
    dim2: usize,
) -> HcrtFuture {
    launch(queue, kernel, params, LaunchDims::new(dim0, dim1, dim2))
}

/// Block until all enqueued work has completed
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_sync(queue: HcrtTaskQueue) {
    guard((), || get::<Arc<dyn TaskQueue>>(queue)?.sync())
}

/// Elapsed kernel time in nanoseconds, or `u64::MAX` when unknown
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_future_get_time_ns(future: HcrtFuture) -> u64 {
    if future.is_null() {
        return u64::MAX;
    }
    guard(u64::MAX, || {
        let future = get::<Arc<dyn LaunchFuture>>(future)?;
        Ok(future.time_ns().unwrap_or(u64::MAX))
    })
}

/// Whether a future is pending or completed
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_future_is_valid(future: HcrtFuture) -> bool {
    guard(false, || Ok(get::<Arc<dyn LaunchFuture>>(future)?.is_valid()))
}

/// Driver stream handle of a task queue
#[unsafe(no_mangle)]
pub extern "C" fn hcrt_task_queue_native_handle(queue: HcrtTaskQueue) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let queue = get::<Arc<dyn TaskQueue>>(queue)?;
        Ok(queue.native_handle() as usize as *mut c_void)
    })
}
