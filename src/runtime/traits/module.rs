//! Trait for loaded kernel code

use crate::error::Result;
use crate::runtime::DeviceType;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A loaded or linked unit of kernel code, owned by one device
pub trait Module: Send + Sync + fmt::Debug {
    /// Back-end family that loaded the module
    fn device_type(&self) -> DeviceType;

    /// Name the module was loaded or linked under
    fn name(&self) -> &str;

    /// Raw address of a named symbol, searching dynamic link peers last
    fn function_ptr(&self, name: &str) -> Result<u64>;

    /// Type-erased self for back-end downcasts
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}
