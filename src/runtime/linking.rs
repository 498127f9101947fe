//! Module linking shared by back-ends
//!
//! Static linking builds a new module from its inputs; dynamic linking records
//! weak peer references on each input so symbol lookup can fall through to the
//! other modules of the link set without creating reference cycles.

use super::traits::{Module, downcast_arc};
use super::DeviceType;
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::any::Any;
use std::sync::{Arc, Weak};

/// Back-end module that can take part in linking
pub(crate) trait Linkable: Send + Sync + Sized + 'static {
    /// Dynamic link peers of this module
    fn peers(&self) -> &LinkPeers<Self>;

    /// Look a symbol up in this module's own code only
    fn resolve_local(&self, name: &str) -> Option<u64>;
}

/// Weak references to dynamically linked modules
#[derive(Debug)]
pub(crate) struct LinkPeers<M> {
    peers: RwLock<Vec<Weak<M>>>,
}

impl<M> Default for LinkPeers<M> {
    fn default() -> Self {
        Self {
            peers: RwLock::new(Vec::new()),
        }
    }
}

impl<M> LinkPeers<M> {
    fn add(&self, peer: &Arc<M>) {
        let mut peers = self.peers.write();
        peers.retain(|p| p.strong_count() > 0);
        if !peers.iter().any(|p| std::ptr::eq(p.as_ptr(), Arc::as_ptr(peer))) {
            peers.push(Arc::downgrade(peer));
        }
    }

    fn live(&self) -> Vec<Arc<M>> {
        self.peers.read().iter().filter_map(Weak::upgrade).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.peers.read().iter().filter(|p| p.strong_count() > 0).count()
    }
}

/// Symbol address together with the module whose code it points into
#[derive(Debug)]
pub(crate) struct Resolved<M> {
    pub(crate) addr: u64,
    pub(crate) owner: Arc<M>,
}

/// Resolve `name` in `module`, then in its live link peers.
///
/// The returned owner must be kept alive for as long as the address is used;
/// peers are only held weakly by the modules they are linked to.
pub(crate) fn resolve<M: Linkable>(module: &Arc<M>, name: &str) -> Result<Resolved<M>> {
    if let Some(addr) = module.resolve_local(name) {
        return Ok(Resolved {
            addr,
            owner: module.clone(),
        });
    }
    module
        .peers()
        .live()
        .into_iter()
        .find_map(|peer| peer.resolve_local(name).map(|addr| Resolved { addr, owner: peer }))
        .ok_or_else(|| Error::SymbolNotFound(name.to_string()))
}

/// Address of `name` in `module` or its live link peers
pub(crate) fn resolve_address<M: Linkable>(module: &M, name: &str) -> Result<u64> {
    if let Some(addr) = module.resolve_local(name) {
        return Ok(addr);
    }
    module
        .peers()
        .live()
        .iter()
        .find_map(|peer| peer.resolve_local(name))
        .ok_or_else(|| Error::SymbolNotFound(name.to_string()))
}

/// Make every module of the set resolve symbols from all the others
pub(crate) fn link_dynamic<M: Linkable>(modules: &[Arc<M>]) {
    for module in modules {
        for peer in modules {
            if !Arc::ptr_eq(module, peer) {
                module.peers().add(peer);
            }
        }
    }
}

/// Recover back-end modules from trait objects, rejecting foreign ones
pub(crate) fn downcast_modules<M: Any + Send + Sync>(
    modules: &[Arc<dyn Module>],
    expected: DeviceType,
) -> Result<Vec<Arc<M>>> {
    modules
        .iter()
        .map(|module| {
            let found = module.device_type();
            if found != expected {
                return Err(Error::BackendMismatch { expected, found });
            }
            downcast_arc::<M>(module.clone().into_any(), expected, found)
        })
        .collect()
}
