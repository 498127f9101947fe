//! CUDA task queue

use super::{GpuDevice, GpuKernel, check};
use crate::error::{Error, Result};
use crate::runtime::traits::{
    Device, FutureCell, Kernel, LaunchFuture, MemoryView, TaskQueue, downcast_arc,
};
use crate::runtime::{DeviceType, LaunchDims};
use cudarc::driver::result::event;
use cudarc::driver::safe::CudaStream;
use cudarc::driver::sys;
use parking_lot::Mutex;
use std::ffi::c_void;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Launch waiting for its timing events
struct TimedLaunch {
    future: Arc<FutureCell>,
    start: u64,
    end: u64,
}

#[derive(Default)]
struct InFlight {
    ops: usize,
    launches: Vec<TimedLaunch>,
    /// Objects referenced by enqueued work, released at the next settle
    retained: Vec<Box<dyn Send + Sync>>,
    failure: Option<Error>,
}

/// Ordered queue backed by one CUDA stream
///
/// Launch futures stay pending until the queue synchronizes, then complete
/// with the time measured between the launch's start and end events.
pub struct GpuTaskQueue {
    device: Arc<GpuDevice>,
    stream: Arc<CudaStream>,
    in_flight: Mutex<InFlight>,
    max_pending: usize,
}

impl std::fmt::Debug for GpuTaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let in_flight = self.in_flight.lock();
        f.debug_struct("GpuTaskQueue")
            .field("device", &self.device.index())
            .field("ops", &in_flight.ops)
            .field("launches", &in_flight.launches.len())
            .field("max_pending", &self.max_pending)
            .finish()
    }
}

impl GpuTaskQueue {
    /// Create a queue with its own stream on `device`
    pub fn new(device: Arc<GpuDevice>) -> Result<Arc<Self>> {
        Self::with_max_pending(device, crate::config::global().max_pending_ops)
    }

    /// Create a queue that settles once `max_pending` operations are queued
    pub fn with_max_pending(device: Arc<GpuDevice>, max_pending: usize) -> Result<Arc<Self>> {
        let max_pending = max_pending.max(1);
        let stream = device.context().cuda().new_stream()?;
        debug!(ordinal = device.index(), max_pending, "Creating CUDA task queue");
        Ok(Arc::new(Self {
            device,
            stream,
            in_flight: Mutex::new(InFlight::default()),
            max_pending,
        }))
    }

    /// Device the queue submits to
    pub fn device(&self) -> &Arc<GpuDevice> {
        &self.device
    }

    /// Operations enqueued since the stream last settled
    pub fn pending_ops(&self) -> usize {
        self.in_flight.lock().ops
    }

    fn raw_stream(&self) -> sys::CUstream {
        self.stream.cu_stream()
    }

    /// Run `enqueue` under the queue lock, keeping `keep` alive until the
    /// next settle. Settles first once `max_pending` operations are queued.
    fn submit<T>(
        &self,
        op: &'static str,
        keep: Vec<Box<dyn Send + Sync>>,
        enqueue: impl FnOnce(&mut InFlight) -> Result<T>,
    ) -> Result<T> {
        let mut in_flight = self.in_flight.lock();
        if in_flight.ops >= self.max_pending {
            trace!(ops = in_flight.ops, "CUDA queue at capacity, settling");
            self.settle(&mut in_flight);
        }
        self.device.context().cuda().bind_to_thread()?;
        trace!(op, "CUDA queue enqueue");
        let out = enqueue(&mut in_flight)?;
        in_flight.ops += 1;
        in_flight.retained.extend(keep);
        Ok(out)
    }

    /// Wait for the stream, then settle every pending future
    fn settle(&self, in_flight: &mut InFlight) {
        let synced = self
            .device
            .context()
            .cuda()
            .bind_to_thread()
            .and_then(|()| self.stream.synchronize())
            .map_err(Error::from);

        for launch in in_flight.launches.drain(..) {
            let (start, end) = (launch.start as sys::CUevent, launch.end as sys::CUevent);
            if synced.is_ok() {
                // SAFETY: both events were recorded on this stream, which has
                // completed.
                match unsafe { event::elapsed(start, end) } {
                    Ok(ms) => {
                        launch.future.complete((f64::from(ms) * 1e6) as u64);
                    }
                    Err(e) => {
                        warn!("Failed to read CUDA launch timing: {e:?}");
                        launch.future.invalidate();
                    }
                }
            } else {
                launch.future.invalidate();
            }
            destroy_event(start);
            destroy_event(end);
        }

        in_flight.retained.clear();
        in_flight.ops = 0;
        if let Err(err) = synced {
            if in_flight.failure.is_none() {
                in_flight.failure = Some(err);
            } else {
                warn!(error = %err, "Dropping additional CUDA queue failure until next sync");
            }
        }
    }
}

fn new_event() -> Result<sys::CUevent> {
    Ok(event::create(sys::CUevent_flags::CU_EVENT_DEFAULT)?)
}

fn destroy_event(ev: sys::CUevent) {
    // SAFETY: the event is owned by the queue and no longer recorded.
    if let Err(e) = unsafe { event::destroy(ev) } {
        warn!("Failed to destroy CUDA event: {e:?}");
    }
}

/// Grid dimensions for one program instance per index
fn grid(dims: LaunchDims) -> Result<[u32; 3]> {
    let mut out = [0_u32; 3];
    for (slot, &extent) in out.iter_mut().zip(&dims.dims) {
        *slot = u32::try_from(extent).map_err(|_| {
            Error::invalid_argument(
                "dims",
                format!("launch extent {extent} exceeds the CUDA grid limit"),
            )
        })?;
    }
    Ok(out)
}

impl TaskQueue for GpuTaskQueue {
    fn device_type(&self) -> DeviceType {
        DeviceType::Gpu
    }

    fn enqueue_copy_to_device(&self, view: &Arc<dyn MemoryView>) -> Result<()> {
        let (host, device, size) = (view.host_ptr(), view.device_ptr(), view.size());
        if host == device || size == 0 {
            // Managed memory without a separate host buffer migrates on access.
            trace!(size, "CUDA managed transfer elided");
            return Ok(());
        }
        let stream = self.raw_stream();
        self.submit("copy_to_device", vec![Box::new(view.clone())], |_| {
            // SAFETY: both buffers hold `size` bytes and are retained until
            // the stream has been synchronized.
            let status = unsafe {
                sys::cuMemcpyHtoDAsync_v2(device, host as *const c_void, size, stream)
            };
            check(status, "host to device copy")
        })
    }

    fn enqueue_copy_to_host(&self, view: &Arc<dyn MemoryView>) -> Result<()> {
        let (host, device, size) = (view.host_ptr(), view.device_ptr(), view.size());
        if host == device || size == 0 {
            trace!(size, "CUDA managed transfer elided");
            return Ok(());
        }
        let stream = self.raw_stream();
        self.submit("copy_to_host", vec![Box::new(view.clone())], |_| {
            // SAFETY: both buffers hold `size` bytes and are retained until
            // the stream has been synchronized.
            let status =
                unsafe { sys::cuMemcpyDtoHAsync_v2(host as *mut c_void, device, size, stream) };
            check(status, "device to host copy")
        })
    }

    fn enqueue_copy(
        &self,
        dst: &Arc<dyn MemoryView>,
        src: &Arc<dyn MemoryView>,
        size: usize,
    ) -> Result<()> {
        let (to, from) = (dst.device_ptr(), src.device_ptr());
        let stream = self.raw_stream();
        let keep: Vec<Box<dyn Send + Sync>> = vec![Box::new(dst.clone()), Box::new(src.clone())];
        self.submit("copy", keep, |_| {
            // SAFETY: both views hold at least `size` bytes (checked before
            // enqueue) and are retained until the stream has been synchronized.
            let status = unsafe { sys::cuMemcpyDtoDAsync_v2(to, from, size, stream) };
            check(status, "device to device copy")
        })
    }

    fn enqueue_launch(
        &self,
        kernel: &Arc<dyn Kernel>,
        params: Option<&Arc<dyn MemoryView>>,
        dims: LaunchDims,
    ) -> Result<Arc<dyn LaunchFuture>> {
        let gpu_kernel = downcast_arc::<GpuKernel>(
            kernel.clone().into_any(),
            DeviceType::Gpu,
            kernel.device_type(),
        )?;
        let [gx, gy, gz] = grid(dims)?;
        let future = Arc::new(FutureCell::new());
        if dims.is_empty() {
            trace!(kernel = kernel.name(), "Empty CUDA launch completed immediately");
            future.complete(0);
            return Ok(future);
        }

        let mut keep: Vec<Box<dyn Send + Sync>> = vec![Box::new(kernel.clone())];
        let mut params_addr: u64 = params.map_or(0, |p| p.device_ptr());
        if let Some(params) = params {
            keep.push(Box::new(params.clone()));
        }
        let stream = self.raw_stream();
        let function = gpu_kernel.function() as sys::CUfunction;
        let done = future.clone();

        self.submit("launch", keep, move |in_flight| {
            let start = new_event()?;
            let end = match new_event() {
                Ok(end) => end,
                Err(e) => {
                    destroy_event(start);
                    return Err(e.into());
                }
            };
            let mut args = [&mut params_addr as *mut u64 as *mut c_void];
            // SAFETY: the function belongs to a module kept alive by the
            // retained kernel; the single argument is the parameter block
            // address, read by the driver during the call.
            let launched = unsafe {
                event::record(start, stream)
                    .map_err(Error::from)
                    .and_then(|()| {
                        check(
                            sys::cuLaunchKernel(
                                function,
                                gx,
                                gy,
                                gz,
                                1,
                                1,
                                1,
                                0,
                                stream,
                                args.as_mut_ptr(),
                                std::ptr::null_mut(),
                            ),
                            "kernel launch",
                        )
                    })
                    .and_then(|()| event::record(end, stream).map_err(Error::from))
            };
            if let Err(err) = launched {
                destroy_event(start);
                destroy_event(end);
                done.invalidate();
                return Err(err);
            }
            in_flight.launches.push(TimedLaunch {
                future: done,
                start: start as u64,
                end: end as u64,
            });
            Ok(())
        })?;
        Ok(future)
    }

    fn barrier(&self) -> Result<()> {
        // A single stream already executes in submission order.
        trace!("CUDA queue barrier");
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        let mut in_flight = self.in_flight.lock();
        self.settle(&mut in_flight);
        match in_flight.failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn native_handle(&self) -> u64 {
        self.raw_stream() as u64
    }
}

impl Drop for GpuTaskQueue {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock();
        self.settle(&mut in_flight);
        if let Some(err) = in_flight.failure.take() {
            warn!(error = %err, "CUDA task queue dropped with unreported failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_rejects_extents_beyond_u32() {
        assert_eq!(grid(LaunchDims::new(4, 2, 1)).unwrap(), [4, 2, 1]);
        let err = grid(LaunchDims::new(1 << 32, 1 << 32, 1)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }
}
