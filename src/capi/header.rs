//! C header for the `hcrt_*` entry points

/// Text of `hcrt.h` declaring the C ABI of this library
pub fn generate_header() -> String {
    let header = r#"#ifndef HCRT_H
#define HCRT_H
#include <stdbool.h>
#include <stddef.h>
#include <stdint.h>
#ifdef __cplusplus
extern "C" {
#endif

typedef void* HcrtGenericHandle;
typedef void* HcrtDevice;
typedef void* HcrtContext;
typedef void* HcrtMemoryView;
typedef void* HcrtModule;
typedef void* HcrtKernel;
typedef void* HcrtTaskQueue;
typedef void* HcrtFuture;

typedef enum { HCRT_DEVICE_TYPE_CPU=0, HCRT_DEVICE_TYPE_GPU=1, HCRT_DEVICE_TYPE_AUTO=2 } HcrtDeviceType;
typedef enum { HCRT_ALLOC_TYPE_SHARED=0, HCRT_ALLOC_TYPE_DEVICE=1, HCRT_ALLOC_TYPE_UNKNOWN=2 } HcrtAllocationType;
typedef enum {
    HCRT_SM_HINT_NONE=0,
    HCRT_SM_HINT_HOST_DEVICE_READ_WRITE=1,
    HCRT_SM_HINT_HOST_WRITE_DEVICE_READ=2,
    HCRT_SM_HINT_HOST_READ_DEVICE_WRITE=3
} HcrtSharedMemoryHint;
typedef enum { HCRT_MODULE_TYPE_VECTOR=0, HCRT_MODULE_TYPE_SCALAR=1 } HcrtModuleType;
typedef enum {
    HCRT_NO_ERROR=0,
    HCRT_UNKNOWN_ERROR=1,
    HCRT_INVALID_ARGUMENT=2,
    HCRT_INVALID_OPERATION=3,
    HCRT_NOT_SUPPORTED=4,
    HCRT_DEVICE_FAILURE=5,
    HCRT_OUT_OF_MEMORY=6
} HcrtError;

typedef struct { uint32_t vendor_id; uint32_t device_id; } HcrtDeviceInfo;
typedef struct { uint32_t alloc_type; uint32_t sm_hint; } HcrtNewMemoryViewFlags;
typedef struct {
    uint32_t stack_size;
    bool library_compilation;
    uint32_t module_type;
    bool debug;
    uint32_t opt_level;
} HcrtModuleOptions;

typedef void (*HcrtErrorFunc)(HcrtError kind, const char* message);

void hcrt_retain(HcrtGenericHandle h);
void hcrt_release(HcrtGenericHandle h);
int64_t hcrt_use_count(HcrtGenericHandle h);
void hcrt_set_error_func(HcrtErrorFunc func);

HcrtDevice hcrt_get_device(uint32_t device_type, uint32_t index);
HcrtDevice hcrt_get_device_from_context(HcrtContext context, uint32_t index);
HcrtDevice hcrt_get_device_from_native_handle(HcrtContext context, void* native_device);
uint32_t hcrt_get_device_count(uint32_t device_type);
void hcrt_get_device_info(uint32_t device_type, uint32_t index, HcrtDeviceInfo* info);
void* hcrt_platform_native_handle(HcrtDevice device);
void* hcrt_device_native_handle(HcrtDevice device);
void* hcrt_device_context_native_handle(HcrtDevice device);

HcrtContext hcrt_new_context(uint32_t device_type);
HcrtContext hcrt_get_context_from_native_handle(uint32_t device_type, void* native);
void* hcrt_context_native_handle(HcrtContext context);

HcrtMemoryView hcrt_new_memory_view(HcrtDevice device, void* app_memory, size_t size, const HcrtNewMemoryViewFlags* flags);
HcrtMemoryView hcrt_new_memory_view_for_context(HcrtContext context, void* app_memory, size_t size, const HcrtNewMemoryViewFlags* flags);
void* hcrt_host_ptr(HcrtMemoryView view);
void* hcrt_device_ptr(HcrtMemoryView view);
void* hcrt_shared_ptr(HcrtMemoryView view);
size_t hcrt_size(HcrtMemoryView view);
HcrtAllocationType hcrt_get_memory_view_alloc_type(HcrtMemoryView view);
HcrtAllocationType hcrt_get_memory_alloc_type(HcrtDevice device, void* memory);

HcrtModule hcrt_load_module(HcrtDevice device, const char* path, HcrtModuleOptions options);
void hcrt_dynamic_link_modules(HcrtDevice device, const HcrtModule* modules, uint32_t count);
HcrtModule hcrt_static_link_modules(HcrtDevice device, const HcrtModule* modules, uint32_t count);
void* hcrt_function_ptr(HcrtModule module, const char* name);
HcrtKernel hcrt_new_kernel(HcrtDevice device, HcrtModule module, const char* name);

HcrtTaskQueue hcrt_new_task_queue(HcrtDevice device);
void hcrt_device_barrier(HcrtTaskQueue queue);
void hcrt_copy_to_device(HcrtTaskQueue queue, HcrtMemoryView view);
void hcrt_copy_to_host(HcrtTaskQueue queue, HcrtMemoryView view);
void hcrt_copy_memory_view(HcrtTaskQueue queue, HcrtMemoryView dst, HcrtMemoryView src, size_t size);
HcrtFuture hcrt_launch_1d(HcrtTaskQueue queue, HcrtKernel kernel, HcrtMemoryView params, size_t dim0);
HcrtFuture hcrt_launch_2d(HcrtTaskQueue queue, HcrtKernel kernel, HcrtMemoryView params, size_t dim0, size_t dim1);
HcrtFuture hcrt_launch_3d(HcrtTaskQueue queue, HcrtKernel kernel, HcrtMemoryView params, size_t dim0, size_t dim1, size_t dim2);
void hcrt_sync(HcrtTaskQueue queue);
uint64_t hcrt_future_get_time_ns(HcrtFuture future);
bool hcrt_future_is_valid(HcrtFuture future);
void* hcrt_task_queue_native_handle(HcrtTaskQueue queue);

#ifdef __cplusplus
} // extern "C"
#endif
#endif
"#;
    header.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_has_guards_and_core_entry_points() {
        let header = generate_header();
        assert!(header.starts_with("#ifndef HCRT_H"));
        assert!(header.trim_end().ends_with("#endif"));
        for symbol in ["hcrt_retain(", "hcrt_set_error_func(", "hcrt_launch_3d(", "hcrt_sync("] {
            assert!(header.contains(symbol), "missing {symbol}");
        }
    }
}
