//! Back-end traits for the abstraction hierarchy

pub mod context;
pub mod device;
pub mod future;
pub mod kernel;
pub mod memory;
pub mod module;
pub mod queue;

pub use context::Context;
pub use device::Device;
pub use future::{FutureCell, FutureState, LaunchFuture};
pub use kernel::Kernel;
pub use memory::MemoryView;
pub use module::Module;
pub use queue::TaskQueue;

use super::DeviceType;
use crate::error::{Error, Result};
use std::any::Any;
use std::sync::Arc;

/// Recover the concrete back-end type behind a trait object.
///
/// Fails with [`Error::BackendMismatch`] when `object` was created by another
/// back-end than `expected`.
pub(crate) fn downcast_arc<T: Any + Send + Sync>(
    object: Arc<dyn Any + Send + Sync>,
    expected: DeviceType,
    found: DeviceType,
) -> Result<Arc<T>> {
    object
        .downcast::<T>()
        .map_err(|_| Error::BackendMismatch { expected, found })
}
