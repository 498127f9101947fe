//! Integration tests for the C ABI error boundary
//!
//! Every test installs a recording callback so failures are observed instead
//! of terminating the process.
#![cfg(feature = "cpu")]

mod common;

use common::{ErrorRecorder, flags, test_module_handle};
use hcrt::capi::*;
use hcrt::error::ErrorKind;
use hcrt::runtime::{AllocationType, DeviceInfo, DeviceType};
use std::ffi::{CString, c_void};
use std::ptr;

fn cpu_device() -> HcrtDevice {
    let device = hcrt_get_device(DeviceType::Cpu as u32, 0);
    assert!(!device.is_null());
    device
}

fn shared_view(device: HcrtDevice, memory: &mut [u8]) -> HcrtMemoryView {
    let flags = flags(AllocationType::Shared);
    let view = unsafe {
        hcrt_new_memory_view(device, memory.as_mut_ptr().cast(), memory.len(), &flags)
    };
    assert!(!view.is_null());
    view
}

fn kernel(device: HcrtDevice, module: HcrtModule, name: &str) -> HcrtKernel {
    let name = CString::new(name).unwrap();
    let kernel = unsafe { hcrt_new_kernel(device, module, name.as_ptr()) };
    assert!(!kernel.is_null());
    kernel
}

#[test]
fn test_retain_release_pairs_preserve_use_count() {
    let rec = ErrorRecorder::install();
    let device = cpu_device();
    assert_eq!(hcrt_use_count(device), 1);

    hcrt_retain(device);
    hcrt_retain(device);
    assert_eq!(hcrt_use_count(device), 3);
    hcrt_release(device);
    hcrt_release(device);
    assert_eq!(hcrt_use_count(device), 1);
    assert!(rec.kinds().is_empty());

    hcrt_release(device);
    assert_eq!(hcrt_use_count(device), 0);
    assert_eq!(rec.kinds(), vec![ErrorKind::InvalidOperation]);
}

#[test]
fn test_released_handle_is_rejected_everywhere() {
    let rec = ErrorRecorder::install();
    let device = cpu_device();
    hcrt_release(device);

    assert!(hcrt_new_task_queue(device).is_null());
    hcrt_retain(device);
    hcrt_release(device);
    let kinds = rec.kinds();
    assert_eq!(kinds.len(), 3);
    assert!(kinds.iter().all(|k| *k == ErrorKind::InvalidOperation));
}

#[test]
fn test_wrong_kind_handle_is_reported() {
    let rec = ErrorRecorder::install();
    let device = cpu_device();
    assert_eq!(hcrt_size(device), 0);
    let failures = rec.take();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, ErrorKind::InvalidOperation);
    assert!(failures[0].1.contains("expected a MemoryView"), "{}", failures[0].1);
    hcrt_release(device);
}

#[test]
fn test_oversized_copy_is_rejected_without_transfer() {
    let rec = ErrorRecorder::install();
    let device = cpu_device();
    let queue = hcrt_new_task_queue(device);

    let mut big = vec![0xAB_u8; 16];
    let mut small = vec![0_u8; 8];
    let src = shared_view(device, &mut big);
    let dst = shared_view(device, &mut small);

    hcrt_copy_memory_view(queue, dst, src, 16);
    hcrt_sync(queue);
    let failures = rec.take();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, ErrorKind::InvalidOperation);
    assert!(failures[0].1.contains("destination buffer size"));
    assert!(small.iter().all(|&b| b == 0));

    hcrt_copy_memory_view(queue, src, dst, 16);
    let failures = rec.take();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].1.contains("source buffer size"));

    hcrt_copy_memory_view(queue, dst, src, 8);
    hcrt_sync(queue);
    assert!(rec.kinds().is_empty());
    assert_eq!(small, vec![0xAB; 8]);
    assert_eq!(big, vec![0xAB; 16]);

    for h in [dst, src, queue, device] {
        hcrt_release(h);
    }
}

#[test]
fn test_short_copy_moves_exactly_size_bytes() {
    let rec = ErrorRecorder::install();
    let device = cpu_device();
    let queue = hcrt_new_task_queue(device);

    let mut from: Vec<u8> = (1..=8).collect();
    let mut to = vec![0_u8; 8];
    let src = shared_view(device, &mut from);
    let dst = shared_view(device, &mut to);

    hcrt_copy_memory_view(queue, dst, src, 3);
    hcrt_sync(queue);
    assert!(rec.kinds().is_empty());
    assert_eq!(to, vec![1, 2, 3, 0, 0, 0, 0, 0]);

    for h in [dst, src, queue, device] {
        hcrt_release(h);
    }
}

#[test]
fn test_lower_rank_launches_match_3d() {
    let rec = ErrorRecorder::install();
    let device = cpu_device();
    let queue = hcrt_new_task_queue(device);
    let module = test_module_handle();
    let record = kernel(device, module, "record_dims");

    let mut out = [0_usize; 3];
    let bytes = unsafe {
        std::slice::from_raw_parts_mut(out.as_mut_ptr().cast::<u8>(), std::mem::size_of_val(&out))
    };
    let params = shared_view(device, bytes);

    let mut observed = Vec::new();
    let launches: [&dyn Fn() -> HcrtFuture; 4] = [
        &|| hcrt_launch_1d(queue, record, params, 5),
        &|| hcrt_launch_3d(queue, record, params, 5, 1, 1),
        &|| hcrt_launch_2d(queue, record, params, 5, 7),
        &|| hcrt_launch_3d(queue, record, params, 5, 7, 1),
    ];
    for launch in launches {
        let future = launch();
        assert!(!future.is_null());
        hcrt_sync(queue);
        assert!(hcrt_future_is_valid(future));
        assert_ne!(hcrt_future_get_time_ns(future), u64::MAX);
        observed.push(unsafe { ptr::read_volatile(out.as_ptr().cast::<[usize; 3]>()) });
        hcrt_release(future);
    }
    assert_eq!(observed[0], observed[1]);
    assert_eq!(observed[0], [5, 1, 1]);
    assert_eq!(observed[2], observed[3]);
    assert_eq!(observed[2], [5, 7, 1]);
    assert!(rec.kinds().is_empty());

    for h in [params, record, module, queue, device] {
        hcrt_release(h);
    }
}

#[test]
fn test_launches_run_in_program_order() {
    let rec = ErrorRecorder::install();
    let device = cpu_device();
    let queue = hcrt_new_task_queue(device);
    let module = test_module_handle();
    let bump = kernel(device, module, "increment");

    let mut counter = [0_usize; 1];
    let bytes = unsafe {
        std::slice::from_raw_parts_mut(counter.as_mut_ptr().cast::<u8>(), std::mem::size_of_val(&counter))
    };
    let params = shared_view(device, bytes);

    for _ in 0..100 {
        let future = hcrt_launch_1d(queue, bump, params, 1);
        hcrt_release(future);
    }
    hcrt_device_barrier(queue);
    hcrt_sync(queue);
    assert_eq!(unsafe { ptr::read_volatile(counter.as_ptr()) }, 100);
    assert!(rec.kinds().is_empty());

    for h in [params, bump, module, queue, device] {
        hcrt_release(h);
    }
}

#[test]
fn test_device_count_requires_explicit_type() {
    let rec = ErrorRecorder::install();
    assert_eq!(hcrt_get_device_count(DeviceType::Auto as u32), 0);
    assert_eq!(rec.kinds(), vec![ErrorKind::InvalidOperation]);

    assert_eq!(hcrt_get_device_count(DeviceType::Cpu as u32), 1);
    assert!(rec.kinds().is_empty());

    assert_eq!(hcrt_get_device_count(17), 0);
    assert_eq!(rec.kinds(), vec![ErrorKind::InvalidArgument]);
}

#[cfg(not(feature = "cuda"))]
#[test]
fn test_gpu_is_not_supported_without_cuda() {
    let rec = ErrorRecorder::install();
    assert_eq!(hcrt_get_device_count(DeviceType::Gpu as u32), 0);
    assert!(hcrt_get_device(DeviceType::Gpu as u32, 0).is_null());
    let failures = rec.take();
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().all(|(k, _)| *k == ErrorKind::NotSupported));
    assert!(failures[0].1.contains("GPU support not enabled"));

    let device = hcrt_get_device(DeviceType::Auto as u32, 0);
    assert!(!device.is_null());
    assert!(rec.kinds().is_empty());
    hcrt_release(device);
}

#[test]
fn test_device_info_null_out_is_rejected() {
    let rec = ErrorRecorder::install();
    unsafe { hcrt_get_device_info(DeviceType::Cpu as u32, 0, ptr::null_mut()) };
    assert_eq!(rec.kinds(), vec![ErrorKind::InvalidOperation]);

    let mut info = DeviceInfo {
        vendor_id: 9,
        device_id: 9,
    };
    unsafe { hcrt_get_device_info(DeviceType::Cpu as u32, 0, &mut info) };
    assert!(rec.kinds().is_empty());
    assert_eq!(info, DeviceInfo::default());

    unsafe { hcrt_get_device_info(DeviceType::Cpu as u32, 4, &mut info) };
    assert_eq!(rec.kinds(), vec![ErrorKind::InvalidArgument]);
}

#[test]
fn test_time_of_null_future_is_silent_sentinel() {
    let rec = ErrorRecorder::install();
    assert_eq!(hcrt_future_get_time_ns(ptr::null_mut()), u64::MAX);
    assert!(rec.take().is_empty());
}

#[test]
fn test_failed_launch_invalidates_future_and_reports_once() {
    let rec = ErrorRecorder::install();
    let device = cpu_device();
    let queue = hcrt_new_task_queue(device);
    let module = test_module_handle();
    let boom = kernel(device, module, "explode");

    let future = hcrt_launch_1d(queue, boom, ptr::null_mut(), 1);
    assert!(!future.is_null());
    hcrt_sync(queue);
    let failures = rec.take();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, ErrorKind::DeviceFailure);
    assert!(failures[0].1.contains("kernel exploded"), "{}", failures[0].1);

    assert!(!hcrt_future_is_valid(future));
    assert_eq!(hcrt_future_get_time_ns(future), u64::MAX);
    hcrt_sync(queue);
    assert!(rec.kinds().is_empty());

    for h in [future, boom, module, queue, device] {
        hcrt_release(h);
    }
}

#[test]
fn test_context_views_must_be_shared() {
    let rec = ErrorRecorder::install();
    let context = hcrt_new_context(DeviceType::Cpu as u32);
    assert!(!context.is_null());

    let device_only = flags(AllocationType::Device);
    let view = unsafe { hcrt_new_memory_view_for_context(context, ptr::null_mut(), 64, &device_only) };
    assert!(view.is_null());
    let failures = rec.take();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, ErrorKind::InvalidOperation);
    assert!(failures[0].1.contains("Only shared memory allocation is allowed for context"));

    let shared = flags(AllocationType::Shared);
    let view = unsafe { hcrt_new_memory_view_for_context(context, ptr::null_mut(), 64, &shared) };
    assert!(!view.is_null());
    assert_eq!(hcrt_size(view), 64);
    assert_eq!(hcrt_get_memory_view_alloc_type(view), AllocationType::Shared);

    let view2 = unsafe { hcrt_new_memory_view_for_context(context, ptr::null_mut(), 64, ptr::null()) };
    assert!(view2.is_null());
    assert_eq!(rec.kinds(), vec![ErrorKind::InvalidOperation]);

    hcrt_release(view);
    hcrt_release(context);
}

#[test]
fn test_device_views_reject_unknown_alloc_type() {
    let rec = ErrorRecorder::install();
    let device = cpu_device();
    for raw in [AllocationType::Unknown as u32, 42] {
        let bad = common::flags(AllocationType::Shared);
        let bad = HcrtNewMemoryViewFlags { alloc_type: raw, ..bad };
        let view = unsafe { hcrt_new_memory_view(device, ptr::null_mut(), 8, &bad) };
        assert!(view.is_null());
    }
    let failures = rec.take();
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().all(|(k, m)| {
        *k == ErrorKind::InvalidOperation && m.contains("Unsupported memory allocation type requested")
    }));
    hcrt_release(device);
}

#[test]
fn test_host_transfer_of_device_only_view_fails() {
    let rec = ErrorRecorder::install();
    let device = cpu_device();
    let queue = hcrt_new_task_queue(device);
    let device_only = flags(AllocationType::Device);
    let view = unsafe { hcrt_new_memory_view(device, ptr::null_mut(), 32, &device_only) };
    assert!(!view.is_null());
    assert!(hcrt_host_ptr(view).is_null());
    assert!(!hcrt_device_ptr(view).is_null());
    assert_eq!(hcrt_shared_ptr(view), hcrt_device_ptr(view));

    hcrt_copy_to_host(queue, view);
    hcrt_copy_to_device(queue, view);
    assert_eq!(rec.kinds(), vec![ErrorKind::InvalidOperation; 2]);

    for h in [view, queue, device] {
        hcrt_release(h);
    }
}

#[test]
fn test_memory_classification() {
    let rec = ErrorRecorder::install();
    let device = cpu_device();
    let mut memory = vec![0_u8; 128];
    let view = shared_view(device, &mut memory);
    let base = memory.as_mut_ptr();

    assert_eq!(hcrt_get_memory_alloc_type(device, base.cast()), AllocationType::Shared);
    let inside = unsafe { base.add(127) }.cast::<c_void>();
    assert_eq!(hcrt_get_memory_alloc_type(device, inside), AllocationType::Shared);
    let outside = unsafe { base.add(128) }.cast::<c_void>();
    assert_eq!(hcrt_get_memory_alloc_type(device, outside), AllocationType::Unknown);

    hcrt_release(view);
    assert_eq!(hcrt_get_memory_alloc_type(device, base.cast()), AllocationType::Unknown);
    assert!(rec.kinds().is_empty());
    hcrt_release(device);
}

#[test]
fn test_overlapping_views_keep_memory_classified() {
    let rec = ErrorRecorder::install();
    let device = cpu_device();
    let mut memory = vec![0_u8; 64];
    let first = shared_view(device, &mut memory);
    let second = shared_view(device, &mut memory);
    let base = memory.as_mut_ptr();

    hcrt_release(second);
    assert_eq!(hcrt_get_memory_alloc_type(device, base.cast()), AllocationType::Shared);

    let nested = shared_view(device, &mut memory[16..24]);
    let past_nested = unsafe { base.add(40) }.cast::<c_void>();
    assert_eq!(hcrt_get_memory_alloc_type(device, past_nested), AllocationType::Shared);

    hcrt_release(nested);
    hcrt_release(first);
    assert_eq!(hcrt_get_memory_alloc_type(device, base.cast()), AllocationType::Unknown);
    assert!(rec.kinds().is_empty());
    hcrt_release(device);
}

#[test]
fn test_module_errors() {
    let rec = ErrorRecorder::install();
    let device = cpu_device();
    let module = test_module_handle();

    let missing = CString::new("no_such_kernel").unwrap();
    assert!(unsafe { hcrt_function_ptr(module, missing.as_ptr()) }.is_null());
    assert!(unsafe { hcrt_new_kernel(device, module, missing.as_ptr()) }.is_null());
    assert_eq!(rec.kinds(), vec![ErrorKind::InvalidArgument; 2]);

    assert!(unsafe { hcrt_static_link_modules(device, &module, 0) }.is_null());
    unsafe { hcrt_dynamic_link_modules(device, ptr::null(), 3) };
    assert_eq!(rec.kinds(), vec![ErrorKind::InvalidOperation; 2]);

    let path = CString::new("/nonexistent/libhcrt-missing.so").unwrap();
    let options = HcrtModuleOptions::default();
    assert!(unsafe { hcrt_load_module(device, path.as_ptr(), options) }.is_null());
    assert!(unsafe { hcrt_load_module(device, ptr::null(), options) }.is_null());
    assert_eq!(
        rec.kinds(),
        vec![ErrorKind::InvalidArgument, ErrorKind::InvalidOperation]
    );

    let bad_type = HcrtModuleOptions {
        module_type: 9,
        ..options
    };
    assert!(unsafe { hcrt_load_module(device, path.as_ptr(), bad_type) }.is_null());
    assert_eq!(rec.kinds(), vec![ErrorKind::InvalidArgument]);

    hcrt_release(module);
    hcrt_release(device);
}

#[test]
fn test_null_callback_silences_reporting() {
    let rec = ErrorRecorder::install();
    hcrt_set_error_func(None);
    assert_eq!(hcrt_get_device_count(DeviceType::Auto as u32), 0);
    assert!(rec.take().is_empty());
}

#[test]
fn test_cpu_native_handles_are_null() {
    let rec = ErrorRecorder::install();
    let device = cpu_device();
    let queue = hcrt_new_task_queue(device);
    assert!(hcrt_platform_native_handle(device).is_null());
    assert!(hcrt_device_native_handle(device).is_null());
    assert!(hcrt_device_context_native_handle(device).is_null());
    assert!(hcrt_task_queue_native_handle(queue).is_null());
    assert!(rec.kinds().is_empty());

    let adopted = hcrt_get_context_from_native_handle(DeviceType::Cpu as u32, 0x1234 as *mut c_void);
    assert!(!adopted.is_null());
    assert!(hcrt_context_native_handle(adopted).is_null());
    let on_adopted = hcrt_get_device_from_native_handle(adopted, 0x99 as *mut c_void);
    assert!(!on_adopted.is_null());
    assert!(rec.kinds().is_empty());

    for h in [on_adopted, adopted, queue, device] {
        hcrt_release(h);
    }
}
