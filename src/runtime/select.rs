//! Back-end selection and device enumeration
//!
//! Every constructor takes a [`DeviceType`]. CPU and GPU construct their
//! back-end directly; AUTO tries the GPU first and falls back to the CPU on
//! any failure, including a panic inside the driver bindings.

use super::traits::{Context, Device, downcast_arc};
use super::{DeviceInfo, DeviceType};
use crate::error::{Error, Result, panic_message};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::debug;

#[cfg(feature = "cpu")]
use super::cpu::{CPU_DEVICE_COUNT, CpuContext, CpuDevice};

#[cfg(feature = "cuda")]
use super::cuda::{self, GpuContext, GpuDevice};

/// Construct a device of `device_type` at `index`.
///
/// For AUTO, `index` selects the GPU; the CPU fallback is the host device.
pub fn get_device(device_type: DeviceType, index: u32) -> Result<Arc<dyn Device>> {
    match device_type {
        DeviceType::Cpu => cpu_device(index),
        DeviceType::Gpu => gpu_device(index),
        DeviceType::Auto => prefer_gpu("device", || gpu_device(index), || cpu_device(0)),
    }
}

/// Create a runtime-owned context of `device_type`
pub fn new_context(device_type: DeviceType) -> Result<Arc<dyn Context>> {
    match device_type {
        DeviceType::Cpu => cpu_context(None),
        DeviceType::Gpu => gpu_context(None),
        DeviceType::Auto => prefer_gpu("context", || gpu_context(None), || cpu_context(None)),
    }
}

/// Adopt a caller-owned native context; the runtime never destroys it.
///
/// The CPU back-end has no native contexts and ignores `native`.
pub fn get_context_from_native_handle(
    device_type: DeviceType,
    native: u64,
) -> Result<Arc<dyn Context>> {
    match device_type {
        DeviceType::Cpu => cpu_context(Some(native)),
        DeviceType::Gpu => gpu_context(Some(native)),
        DeviceType::Auto => prefer_gpu(
            "context",
            || gpu_context(Some(native)),
            || cpu_context(Some(native)),
        ),
    }
}

/// Construct a device of the context's type running on that context
pub fn get_device_from_context(context: &Arc<dyn Context>, index: u32) -> Result<Arc<dyn Device>> {
    let found = context.device_type();
    match found {
        #[cfg(feature = "cpu")]
        DeviceType::Cpu => {
            let ctx = downcast_arc::<CpuContext>(context.clone().into_any(), found, found)?;
            let device = CpuDevice::with_context(ctx, index)?;
            Ok(device)
        }
        #[cfg(feature = "cuda")]
        DeviceType::Gpu => {
            let ctx = downcast_arc::<GpuContext>(context.clone().into_any(), found, found)?;
            let device = GpuDevice::with_context(ctx, index)?;
            Ok(device)
        }
        other => Err(Error::BackendNotEnabled(other)),
    }
}

/// Construct a device on `context` from a caller-supplied native device handle.
///
/// On the CPU the handle is ignored and the host device is returned.
pub fn get_device_from_native_handle(
    context: &Arc<dyn Context>,
    native_device: u64,
) -> Result<Arc<dyn Device>> {
    let found = context.device_type();
    match found {
        #[cfg(feature = "cpu")]
        DeviceType::Cpu => {
            debug!(native_device, "CPU device from native handle (handle ignored)");
            get_device_from_context(context, 0)
        }
        #[cfg(feature = "cuda")]
        DeviceType::Gpu => {
            let ctx = downcast_arc::<GpuContext>(context.clone().into_any(), found, found)?;
            let device = GpuDevice::from_native_handle(ctx, native_device)?;
            Ok(device)
        }
        other => {
            let _ = native_device;
            Err(Error::BackendNotEnabled(other))
        }
    }
}

/// Number of devices of an explicit back-end
pub fn device_count(device_type: DeviceType) -> Result<u32> {
    match device_type {
        DeviceType::Auto => Err(Error::DeviceTypeRequired),
        DeviceType::Cpu => {
            #[cfg(feature = "cpu")]
            {
                Ok(CPU_DEVICE_COUNT)
            }
            #[cfg(not(feature = "cpu"))]
            {
                Err(Error::BackendNotEnabled(DeviceType::Cpu))
            }
        }
        DeviceType::Gpu => {
            #[cfg(feature = "cuda")]
            {
                guarded_driver_call(cuda::device_count)
            }
            #[cfg(not(feature = "cuda"))]
            {
                Err(Error::BackendNotEnabled(DeviceType::Gpu))
            }
        }
    }
}

/// Identification of device `index` of an explicit back-end
pub fn device_info(device_type: DeviceType, index: u32) -> Result<DeviceInfo> {
    let count = device_count(device_type)?;
    if index >= count {
        return Err(Error::DeviceIndexOutOfRange {
            device_type,
            index,
            count,
        });
    }
    match device_type {
        #[cfg(feature = "cuda")]
        DeviceType::Gpu => guarded_driver_call(|| cuda::device_info(index)),
        // The host CPU reports vendor and device id 0.
        _ => Ok(DeviceInfo::default()),
    }
}

fn prefer_gpu<T>(
    what: &'static str,
    gpu: impl FnOnce() -> Result<T>,
    cpu: impl FnOnce() -> Result<T>,
) -> Result<T> {
    if !cfg!(feature = "cpu") {
        return guarded_driver_call(gpu);
    }
    if !cfg!(feature = "cuda") {
        return cpu();
    }
    match guarded_driver_call(gpu) {
        Ok(found) => Ok(found),
        Err(err) => {
            debug!(what, error = %err, "GPU unavailable, falling back to CPU");
            cpu()
        }
    }
}

/// Run a driver-facing constructor, turning a panic into an error
fn guarded_driver_call<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(Error::BackendUnavailable {
            device_type: DeviceType::Gpu,
            reason: panic_message(payload.as_ref())
                .unwrap_or_else(|| "driver initialization panicked".to_string()),
        })
    })
}

fn cpu_device(index: u32) -> Result<Arc<dyn Device>> {
    #[cfg(feature = "cpu")]
    {
        let device = CpuDevice::new(index)?;
        Ok(device)
    }
    #[cfg(not(feature = "cpu"))]
    {
        let _ = index;
        Err(Error::BackendNotEnabled(DeviceType::Cpu))
    }
}

fn gpu_device(index: u32) -> Result<Arc<dyn Device>> {
    #[cfg(feature = "cuda")]
    {
        let device = guarded_driver_call(|| GpuDevice::new(index))?;
        Ok(device)
    }
    #[cfg(not(feature = "cuda"))]
    {
        let _ = index;
        Err(Error::BackendNotEnabled(DeviceType::Gpu))
    }
}

fn cpu_context(native: Option<u64>) -> Result<Arc<dyn Context>> {
    #[cfg(feature = "cpu")]
    {
        let context = match native {
            Some(handle) => CpuContext::from_native_handle(handle),
            None => CpuContext::new(),
        };
        Ok(context)
    }
    #[cfg(not(feature = "cpu"))]
    {
        let _ = native;
        Err(Error::BackendNotEnabled(DeviceType::Cpu))
    }
}

fn gpu_context(native: Option<u64>) -> Result<Arc<dyn Context>> {
    #[cfg(feature = "cuda")]
    {
        let context = guarded_driver_call(|| match native {
            Some(handle) => GpuContext::from_native_handle(handle),
            None => GpuContext::new(crate::config::global().gpu_device_index),
        })?;
        Ok(context)
    }
    #[cfg(not(feature = "cuda"))]
    {
        let _ = native;
        Err(Error::BackendNotEnabled(DeviceType::Gpu))
    }
}
