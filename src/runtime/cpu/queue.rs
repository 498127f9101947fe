//! CPU task queue

use super::{CpuDevice, CpuKernel};
use crate::error::{Error, Result, panic_message};
use crate::runtime::traits::{
    Device, FutureCell, Kernel, LaunchFuture, MemoryView, TaskQueue, downcast_arc,
};
use crate::runtime::{DeviceType, LaunchDims};
use parking_lot::{Condvar, Mutex};
use std::ffi::c_void;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

#[derive(Debug, Default)]
struct Progress {
    pending: usize,
    failure: Option<Error>,
}

/// Outstanding-work bookkeeping shared with the worker thread
#[derive(Debug, Default)]
struct Tracker {
    progress: Mutex<Progress>,
    changed: Condvar,
}

impl Tracker {
    fn acquire(&self, cap: usize) {
        let mut progress = self.progress.lock();
        while progress.pending >= cap {
            self.changed.wait(&mut progress);
        }
        progress.pending += 1;
    }

    fn finish(&self, failure: Option<Error>) {
        let mut progress = self.progress.lock();
        progress.pending -= 1;
        if let Some(err) = failure {
            if progress.failure.is_none() {
                progress.failure = Some(err);
            } else {
                warn!(error = %err, "Dropping additional CPU queue failure until next sync");
            }
        }
        self.changed.notify_all();
    }

    fn drain(&self) -> Option<Error> {
        let mut progress = self.progress.lock();
        while progress.pending > 0 {
            self.changed.wait(&mut progress);
        }
        progress.failure.take()
    }
}

/// Ordered queue executing on a dedicated host thread
pub struct CpuTaskQueue {
    device: Arc<CpuDevice>,
    pool: rayon::ThreadPool,
    tracker: Arc<Tracker>,
    max_pending: usize,
}

impl std::fmt::Debug for CpuTaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuTaskQueue")
            .field("device", &self.device.index())
            .field("pending", &self.tracker.progress.lock().pending)
            .field("max_pending", &self.max_pending)
            .finish()
    }
}

impl CpuTaskQueue {
    /// Create a queue on `device`
    pub fn new(device: Arc<CpuDevice>) -> Result<Arc<Self>> {
        Self::with_max_pending(device, crate::config::global().max_pending_ops)
    }

    /// Create a queue whose enqueues block once `max_pending` jobs are outstanding
    pub fn with_max_pending(device: Arc<CpuDevice>, max_pending: usize) -> Result<Arc<Self>> {
        let max_pending = max_pending.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .thread_name(|i| format!("hcrt-cpu-queue-{i}"))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create CPU queue thread: {e}")))?;
        debug!(max_pending, "Creating CPU task queue");

        Ok(Arc::new(Self {
            device,
            pool,
            tracker: Arc::new(Tracker::default()),
            max_pending,
        }))
    }

    /// Device the queue submits to
    pub fn device(&self) -> &Arc<CpuDevice> {
        &self.device
    }

    /// Queue `job` behind all earlier work.
    ///
    /// A failing or panicking job is recorded for the next `sync` and
    /// invalidates `future` when one is given.
    fn submit<F>(&self, op: &'static str, future: Option<Arc<FutureCell>>, job: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.tracker.acquire(self.max_pending);
        trace!(op, "CPU queue enqueue");

        let tracker = self.tracker.clone();
        self.pool.spawn_fifo(move || {
            let failure = match catch_unwind(AssertUnwindSafe(job)) {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err),
                Err(payload) => Some(Error::Execution(format!(
                    "{op} panicked: {}",
                    panic_message(payload.as_ref()).unwrap_or_else(|| "unknown panic".to_string())
                ))),
            };
            if failure.is_some() {
                if let Some(future) = &future {
                    future.invalidate();
                }
            }
            trace!(op, failed = failure.is_some(), "CPU queue complete");
            tracker.finish(failure);
        });
    }
}

impl TaskQueue for CpuTaskQueue {
    fn device_type(&self) -> DeviceType {
        DeviceType::Cpu
    }

    fn enqueue_copy_to_device(&self, view: &Arc<dyn MemoryView>) -> Result<()> {
        // Host and device memory are the same; the transfer only orders the queue.
        let view = view.clone();
        self.submit("copy_to_device", None, move || {
            trace!(size = view.size(), "CPU host transfer");
            Ok(())
        });
        Ok(())
    }

    fn enqueue_copy_to_host(&self, view: &Arc<dyn MemoryView>) -> Result<()> {
        let view = view.clone();
        self.submit("copy_to_host", None, move || {
            trace!(size = view.size(), "CPU host transfer");
            Ok(())
        });
        Ok(())
    }

    fn enqueue_copy(
        &self,
        dst: &Arc<dyn MemoryView>,
        src: &Arc<dyn MemoryView>,
        size: usize,
    ) -> Result<()> {
        let (dst, src) = (dst.clone(), src.clone());
        self.submit("copy", None, move || {
            let (to, from) = (dst.device_ptr(), src.device_ptr());
            if to == 0 || from == 0 {
                return Err(Error::Execution("copy between unallocated views".to_string()));
            }
            // SAFETY: both views hold at least `size` bytes (checked before
            // enqueue) and stay alive until this job has run.
            unsafe {
                std::ptr::copy(from as *const u8, to as *mut u8, size);
            }
            Ok(())
        });
        Ok(())
    }

    fn enqueue_launch(
        &self,
        kernel: &Arc<dyn Kernel>,
        params: Option<&Arc<dyn MemoryView>>,
        dims: LaunchDims,
    ) -> Result<Arc<dyn LaunchFuture>> {
        let kernel = downcast_arc::<CpuKernel>(
            kernel.clone().into_any(),
            DeviceType::Cpu,
            kernel.device_type(),
        )?;
        let params = params.cloned();
        let future = Arc::new(FutureCell::new());
        let done = future.clone();
        let [d0, d1, d2] = dims.dims;

        self.submit("launch", Some(future.clone()), move || {
            let params_addr = params.as_ref().map_or(0, |p| p.device_ptr());
            let start = Instant::now();
            // SAFETY: the entry point was resolved from a module kept alive by
            // `kernel`; the parameter block is kept alive by `params`.
            unsafe {
                (kernel.entry())(params_addr as *mut c_void, d0, d1, d2);
            }
            done.complete(start.elapsed().as_nanos() as u64);
            Ok(())
        });
        Ok(future)
    }

    fn barrier(&self) -> Result<()> {
        // Jobs run one at a time in submission order.
        trace!("CPU queue barrier");
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        match self.tracker.drain() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for CpuTaskQueue {
    fn drop(&mut self) {
        if let Some(err) = self.tracker.drain() {
            warn!(error = %err, "CPU task queue dropped with unreported failure");
        }
    }
}
