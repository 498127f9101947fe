//! Integration tests for the CUDA back-end; skipped without a driver
#![cfg(all(feature = "cpu", feature = "cuda"))]

mod common;

use common::cuda_available;
use hcrt::prelude::*;
use hcrt::runtime::get_context_from_native_handle;
use hcrt::runtime::cuda::NVIDIA_VENDOR_ID;

#[test]
fn test_auto_prefers_gpu_when_present() {
    if !cuda_available() {
        return;
    }
    let device = get_device(DeviceType::Auto, 0).unwrap();
    assert_eq!(device.device_type(), DeviceType::Gpu);
    assert_eq!(device.info().vendor_id, NVIDIA_VENDOR_ID);
    assert!(device_count(DeviceType::Gpu).unwrap() >= 1);
}

#[test]
fn test_adopted_context_reports_caller_handle() {
    if !cuda_available() {
        return;
    }
    let owned = new_context(DeviceType::Gpu).unwrap();
    assert!(!owned.is_adopted());
    let native = owned.native_handle();
    assert_ne!(native, 0);

    let adopted = get_context_from_native_handle(DeviceType::Gpu, native).unwrap();
    assert!(adopted.is_adopted());
    assert_eq!(adopted.native_handle(), native);

    let device = get_device_from_context(&adopted, 0).unwrap();
    assert_eq!(device.context_native_handle(), native);
    let same = hcrt::runtime::get_device_from_native_handle(&adopted, device.device_native_handle())
        .unwrap();
    assert_eq!(same.index(), device.index());
}

#[test]
fn test_gpu_queue_copies_between_views() {
    if !cuda_available() {
        return;
    }
    let device = get_device(DeviceType::Gpu, 0).unwrap();
    let queue = device.clone().new_task_queue().unwrap();
    assert_ne!(queue.native_handle(), 0);

    let mut input: Vec<u8> = (0..128).map(|i| i as u8).collect();
    let mut output = vec![0u8; 128];
    let src = device
        .new_memory_view(input.as_mut_ptr() as u64, input.len(), MemoryViewFlags::shared())
        .unwrap();
    let scratch = device.new_memory_view(0, 128, MemoryViewFlags::device()).unwrap();
    let dst = device
        .new_memory_view(output.as_mut_ptr() as u64, output.len(), MemoryViewFlags::shared())
        .unwrap();

    queue.copy_to_device(&src).unwrap();
    queue.copy_memory_view(&scratch, &src, 128).unwrap();
    queue.copy_memory_view(&dst, &scratch, 128).unwrap();
    queue.copy_to_host(&dst).unwrap();
    queue.sync().unwrap();
    assert_eq!(output, input);
}
