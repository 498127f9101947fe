//! The generated C header declares every exported entry point

use hcrt::capi::header::generate_header;

const ENTRY_POINTS: &[&str] = &[
    "hcrt_retain",
    "hcrt_release",
    "hcrt_use_count",
    "hcrt_set_error_func",
    "hcrt_get_device",
    "hcrt_get_device_from_context",
    "hcrt_get_device_from_native_handle",
    "hcrt_get_device_count",
    "hcrt_get_device_info",
    "hcrt_platform_native_handle",
    "hcrt_device_native_handle",
    "hcrt_device_context_native_handle",
    "hcrt_new_context",
    "hcrt_get_context_from_native_handle",
    "hcrt_context_native_handle",
    "hcrt_new_memory_view",
    "hcrt_new_memory_view_for_context",
    "hcrt_host_ptr",
    "hcrt_device_ptr",
    "hcrt_shared_ptr",
    "hcrt_size",
    "hcrt_get_memory_view_alloc_type",
    "hcrt_get_memory_alloc_type",
    "hcrt_load_module",
    "hcrt_dynamic_link_modules",
    "hcrt_static_link_modules",
    "hcrt_function_ptr",
    "hcrt_new_kernel",
    "hcrt_new_task_queue",
    "hcrt_device_barrier",
    "hcrt_copy_to_device",
    "hcrt_copy_to_host",
    "hcrt_copy_memory_view",
    "hcrt_launch_1d",
    "hcrt_launch_2d",
    "hcrt_launch_3d",
    "hcrt_sync",
    "hcrt_future_get_time_ns",
    "hcrt_future_is_valid",
    "hcrt_task_queue_native_handle",
];

#[test]
fn test_every_entry_point_is_declared_once() {
    let header = generate_header();
    for name in ENTRY_POINTS {
        let declaration = format!(" {name}(");
        assert_eq!(
            header.matches(&declaration).count(),
            1,
            "{name} should be declared exactly once"
        );
    }
}

#[test]
fn test_enum_values_match_abi() {
    let header = generate_header();
    for value in [
        "HCRT_DEVICE_TYPE_AUTO=2",
        "HCRT_ALLOC_TYPE_UNKNOWN=2",
        "HCRT_SM_HINT_HOST_READ_DEVICE_WRITE=3",
        "HCRT_MODULE_TYPE_SCALAR=1",
        "HCRT_INVALID_OPERATION=3",
        "HCRT_OUT_OF_MEMORY=6",
    ] {
        assert!(header.contains(value), "missing {value}");
    }
}
