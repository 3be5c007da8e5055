//! Object proxies.

use bitflags::bitflags;

use crate::address::Address;
use crate::ids::{MethodId, ScopeId};

use super::ProxyHandle;

bitflags! {
    /// Ownership and shape flags of an [`ObjectProxy`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ProxyFlags: u8 {
        /// This side destroys the native object when the proxy dies.
        const OWNER = 0x01;
        /// The stored address is the address of a pointer to the object.
        const REFERENCE = 0x02;
        /// Eligible to be consumed by a move parameter.
        const RVALUE = 0x04;
        /// The object was returned by value and is embedded in the proxy.
        const VALUE = 0x08;
        /// The stored address is a smart pointer's.
        const SMART_PTR = 0x10;
    }
}

/// The smart pointer a proxy was created from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmartPtr {
    /// Declared smart-pointer class.
    pub class: ScopeId,
    /// Its dereference operator.
    pub deref: MethodId,
}

/// Host-side handle state for one native object.
///
/// For smart-pointer proxies `address` is the smart pointer's own address
/// and `class` the pointee class; the managed object is re-derived through
/// the dereference operator on every access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectProxy {
    pub address: Address,
    pub class: ScopeId,
    pub flags: ProxyFlags,
    pub smart: Option<SmartPtr>,
    /// Proxy kept alive for as long as this one lives.
    pub lifeline: Option<ProxyHandle>,
}

impl ObjectProxy {
    pub fn new(address: Address, class: ScopeId, flags: ProxyFlags) -> Self {
        Self {
            address,
            class,
            flags,
            smart: None,
            lifeline: None,
        }
    }

    pub fn with_smart(mut self, smart: SmartPtr) -> Self {
        self.flags |= ProxyFlags::SMART_PTR;
        self.smart = Some(smart);
        self
    }

    pub fn is_owner(&self) -> bool {
        self.flags.contains(ProxyFlags::OWNER)
    }

    /// Whether collecting this proxy must destroy the native object.
    pub fn destroys_on_collect(&self) -> bool {
        !self.address.is_null()
            && !self.flags.contains(ProxyFlags::REFERENCE)
            && self.flags.intersects(ProxyFlags::OWNER | ProxyFlags::VALUE)
    }

    /// Whether the regulator tracks this proxy by address.
    pub fn is_tracked(&self) -> bool {
        !self.address.is_null()
            && !self
                .flags
                .intersects(ProxyFlags::REFERENCE | ProxyFlags::SMART_PTR)
    }
}
