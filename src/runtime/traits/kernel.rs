//! Trait for resolved kernel entry points

use super::Module;
use crate::runtime::DeviceType;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A callable entry point resolved from a module
///
/// The kernel holds its module, so the module outlives every kernel
/// resolved from it.
pub trait Kernel: Send + Sync + fmt::Debug {
    /// Back-end family that resolved the kernel
    fn device_type(&self) -> DeviceType;

    /// Entry point name
    fn name(&self) -> &str;

    /// Module the kernel was resolved from
    fn module(&self) -> Arc<dyn Module>;

    /// Type-erased self for back-end downcasts
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}
