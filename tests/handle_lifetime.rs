//! Integration tests for handle ownership across the registry
#![cfg(feature = "cpu")]

mod common;

use common::{ErrorRecorder, flags, test_module_handle};
use hcrt::capi::*;
use hcrt::error::Error;
use hcrt::handle;
use hcrt::runtime::{AllocationType, Device, DeviceType, MemoryView};
use std::ffi::CString;
use std::ptr;
use std::sync::Arc;

fn id(h: HcrtGenericHandle) -> u64 {
    h as usize as u64
}

#[test]
fn test_dependents_keep_their_parents_alive() {
    let rec = ErrorRecorder::install();
    let device = hcrt_get_device(DeviceType::Cpu as u32, 0);
    let module = test_module_handle();
    let name = CString::new("increment").unwrap();
    let kernel = unsafe { hcrt_new_kernel(device, module, name.as_ptr()) };
    let queue = hcrt_new_task_queue(device);
    let shared = flags(AllocationType::Shared);
    let params = unsafe { hcrt_new_memory_view(device, ptr::null_mut(), 8, &shared) };

    // Releasing the parents' handles leaves the objects reachable through
    // the kernel and queue.
    hcrt_release(module);
    hcrt_release(device);

    let future = hcrt_launch_1d(queue, kernel, params, 1);
    hcrt_sync(queue);
    assert!(hcrt_future_is_valid(future));
    let value = unsafe { *(hcrt_host_ptr(params) as *const usize) };
    assert_eq!(value, 1);
    assert!(rec.kinds().is_empty());

    for h in [future, params, queue, kernel] {
        hcrt_release(h);
    }
}

#[test]
fn test_ids_are_never_reused() {
    let _rec = ErrorRecorder::install();
    let first = hcrt_get_device(DeviceType::Cpu as u32, 0);
    hcrt_release(first);
    let second = hcrt_get_device(DeviceType::Cpu as u32, 0);
    assert_ne!(id(first), id(second));
    hcrt_release(second);
}

#[test]
fn test_rust_objects_can_be_exported() {
    let device: Arc<dyn Device> = hcrt::runtime::get_device(DeviceType::Cpu, 0).unwrap();
    let view: Arc<dyn MemoryView> = device
        .new_memory_view(0, 24, hcrt::runtime::MemoryViewFlags::shared())
        .unwrap();
    let h = handle::export(view.clone());

    assert_eq!(handle::use_count(h).unwrap(), 1);
    let found = handle::lookup::<Arc<dyn MemoryView>>(h).unwrap();
    assert!(Arc::ptr_eq(&found, &view));
    assert!(matches!(
        handle::lookup::<Arc<dyn Device>>(h),
        Err(Error::HandleKindMismatch { .. })
    ));

    handle::release(h).unwrap();
    assert!(matches!(handle::use_count(h), Err(Error::InvalidHandle(_))));
    assert!(matches!(handle::retain(0), Err(Error::NullPointer(_))));
}

#[test]
fn test_concurrent_retain_release_balances() {
    let device: Arc<dyn Device> = hcrt::runtime::get_device(DeviceType::Cpu, 0).unwrap();
    let h = handle::export(device);

    let workers: Vec<_> = (0..8)
        .map(|_| {
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    handle::retain(h).unwrap();
                    handle::release(h).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(handle::use_count(h).unwrap(), 1);
    handle::release(h).unwrap();
}
