//! Process-wide registry of objects handed out across the C boundary
//!
//! A handle is a registry id (never 0, never reused) naming a slot that holds
//! a reference count and a tagged object. Looking a handle up validates both
//! liveness and kind, so stale or mismatched handles are reported errors.
//!
//! The registry owns one `Arc` per live handle. Objects that depend on each
//! other hold their own `Arc`s, so releasing a handle never frees something
//! another live object still uses.

use crate::error::{Error, Result};
use crate::runtime::{Context, Device, Kernel, LaunchFuture, MemoryView, Module, TaskQueue};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Object stored behind a handle
#[derive(Clone, Debug)]
pub enum Object {
    /// Execution target
    Device(Arc<dyn Device>),
    /// Execution context
    Context(Arc<dyn Context>),
    /// Memory view
    MemoryView(Arc<dyn MemoryView>),
    /// Loaded or linked module
    Module(Arc<dyn Module>),
    /// Kernel entry point
    Kernel(Arc<dyn Kernel>),
    /// Task queue
    TaskQueue(Arc<dyn TaskQueue>),
    /// Launch future
    Future(Arc<dyn LaunchFuture>),
}

impl Object {
    /// Tag name used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Object::Device(_) => "Device",
            Object::Context(_) => "Context",
            Object::MemoryView(_) => "MemoryView",
            Object::Module(_) => "Module",
            Object::Kernel(_) => "Kernel",
            Object::TaskQueue(_) => "TaskQueue",
            Object::Future(_) => "Future",
        }
    }
}

/// A shared object type that can be stored behind a handle
pub trait HandleObject: Sized {
    /// Tag name used in diagnostics
    const KIND: &'static str;

    /// Wrap into a registry object
    fn into_object(self) -> Object;

    /// Borrow back out of a registry object of the same kind
    fn from_object(object: &Object) -> Option<Self>;
}

macro_rules! handle_object {
    ($variant:ident, $trait_:ident) => {
        impl HandleObject for Arc<dyn $trait_> {
            const KIND: &'static str = stringify!($variant);

            fn into_object(self) -> Object {
                Object::$variant(self)
            }

            fn from_object(object: &Object) -> Option<Self> {
                match object {
                    Object::$variant(inner) => Some(inner.clone()),
                    _ => None,
                }
            }
        }
    };
}

handle_object!(Device, Device);
handle_object!(Context, Context);
handle_object!(MemoryView, MemoryView);
handle_object!(Module, Module);
handle_object!(Kernel, Kernel);
handle_object!(TaskQueue, TaskQueue);
handle_object!(Future, LaunchFuture);

#[derive(Debug)]
struct Slot {
    refs: AtomicU64,
    object: Object,
}

static REGISTRY: OnceLock<RwLock<HashMap<u64, Slot>>> = OnceLock::new();

/// Next handle id; 0 is reserved for null.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn registry() -> &'static RwLock<HashMap<u64, Slot>> {
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

fn require(handle: u64) -> Result<u64> {
    if handle == 0 {
        return Err(Error::NullPointer("handle"));
    }
    Ok(handle)
}

/// Register `object` and return its handle with a reference count of 1
pub fn export<T: HandleObject>(object: T) -> u64 {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let slot = Slot {
        refs: AtomicU64::new(1),
        object: object.into_object(),
    };
    trace!(handle = id, kind = slot.object.kind_name(), "Handle created");
    registry().write().insert(id, slot);
    id
}

/// Resolve `handle` to an object of kind `T`
pub fn lookup<T: HandleObject>(handle: u64) -> Result<T> {
    let handle = require(handle)?;
    let registry = registry().read();
    let slot = registry.get(&handle).ok_or(Error::InvalidHandle(handle))?;
    T::from_object(&slot.object).ok_or(Error::HandleKindMismatch {
        handle,
        expected: T::KIND,
        found: slot.object.kind_name(),
    })
}

/// Resolve `handle` to whatever object it names
pub fn lookup_any(handle: u64) -> Result<Object> {
    let handle = require(handle)?;
    let registry = registry().read();
    registry
        .get(&handle)
        .map(|slot| slot.object.clone())
        .ok_or(Error::InvalidHandle(handle))
}

/// Add one reference to `handle`
pub fn retain(handle: u64) -> Result<()> {
    let handle = require(handle)?;
    let registry = registry().read();
    let slot = registry.get(&handle).ok_or(Error::InvalidHandle(handle))?;
    slot.refs.fetch_add(1, Ordering::AcqRel);
    Ok(())
}

/// Drop one reference to `handle`, destroying it at zero
pub fn release(handle: u64) -> Result<()> {
    let handle = require(handle)?;
    let removed = {
        let mut registry = registry().write();
        let slot = registry.get(&handle).ok_or(Error::InvalidHandle(handle))?;
        if slot.refs.fetch_sub(1, Ordering::AcqRel) > 1 {
            return Ok(());
        }
        registry.remove(&handle)
    };
    // The object is dropped outside the lock: its destructor may wait on a
    // queue or release driver resources.
    if let Some(slot) = removed {
        trace!(handle, kind = slot.object.kind_name(), "Handle destroyed");
        drop(slot);
    }
    Ok(())
}

/// Number of outstanding references to `handle`
pub fn use_count(handle: u64) -> Result<u64> {
    let handle = require(handle)?;
    let registry = registry().read();
    let slot = registry.get(&handle).ok_or(Error::InvalidHandle(handle))?;
    Ok(slot.refs.load(Ordering::Acquire))
}

/// Number of live handles in the process
pub fn live_handles() -> usize {
    registry().read().len()
}
