//! Proxy storage, identity, and ownership.
//!
//! [`ObjectSpace`] owns the proxy heap and the memory regulator and is the
//! only way the rest of the crate creates, finds, or retires proxies.
//!
//! ## Locking
//!
//! The internal lock is never held across a reflection call. Destruction
//! notifications may arrive from inside a native call at any point, so
//! every operation re-resolves its handles after reacquiring the lock.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::address::{self, Address};
use crate::ids::{MethodId, ScopeId};
use crate::reflection::{CastDirection, Reflection};
use crate::signature::{ArgIdentity, TypeTag};
use crate::value::Value;

use super::{MemoryRegulator, ObjectProxy, ProxyFlags, ProxyHandle, ProxyHeap, ProxyState, SmartPtr};

#[derive(Debug, Default)]
struct SpaceState {
    heap: ProxyHeap,
    regulator: MemoryRegulator,
}

/// The set of proxies one bridge hands out.
pub struct ObjectSpace {
    reflection: Arc<dyn Reflection>,
    state: Mutex<SpaceState>,
}

impl ObjectSpace {
    pub fn new(reflection: Arc<dyn Reflection>) -> Self {
        Self {
            reflection,
            state: Mutex::new(SpaceState::default()),
        }
    }

    pub fn reflection(&self) -> &dyn Reflection {
        self.reflection.as_ref()
    }

    pub fn reflection_arc(&self) -> Arc<dyn Reflection> {
        Arc::clone(&self.reflection)
    }

    // ========================================================================
    // Construction and binding
    // ========================================================================

    /// Create a new proxy unconditionally and track it if it is trackable.
    pub fn construct_proxy(&self, address: Address, class: ScopeId, flags: ProxyFlags) -> ProxyHandle {
        let proxy = ObjectProxy::new(address, class, flags);
        let tracked = proxy.is_tracked();
        let mut state = self.state.lock();
        let handle = state.heap.allocate(proxy);
        if tracked {
            state.regulator.register(class, address, handle);
        }
        trace!(%address, %class, ?flags, ?handle, "constructed proxy");
        handle
    }

    /// Retrieve the proxy for `address`, or create one.
    ///
    /// The object is first downcast to its most-derived class. Reference
    /// proxies bypass the regulator: their address is the address of a
    /// pointer, not of the object.
    pub fn bind_object(&self, address: Address, class: ScopeId, flags: ProxyFlags) -> Value {
        if flags.contains(ProxyFlags::REFERENCE) || address.is_null() {
            return Value::Object(self.construct_proxy(address, class, flags));
        }
        let (address, class) = self.downcast(address, class);
        self.bind_exact(address, class, flags)
    }

    /// Like [`bind_object`](Self::bind_object), without the downcast.
    pub fn bind_exact(&self, address: Address, class: ScopeId, flags: ProxyFlags) -> Value {
        if !flags.contains(ProxyFlags::REFERENCE)
            && let Some(handle) = self.retrieve(class, address)
        {
            let mut state = self.state.lock();
            if let Some(proxy) = state.heap.get_mut(handle) {
                proxy.flags |= flags & ProxyFlags::OWNER;
                state.heap.add_ref(handle);
                trace!(%address, %class, ?handle, "retrieved proxy");
                return Value::Object(handle);
            }
        }
        Value::Object(self.construct_proxy(address, class, flags))
    }

    /// Bind a smart pointer at `address` whose dereference operator yields
    /// an instance of `pointee`.
    pub fn bind_smart(
        &self,
        address: Address,
        smart_class: ScopeId,
        deref: MethodId,
        pointee: ScopeId,
        flags: ProxyFlags,
    ) -> Value {
        let proxy = ObjectProxy::new(address, pointee, flags).with_smart(SmartPtr {
            class: smart_class,
            deref,
        });
        let handle = self.state.lock().heap.allocate(proxy);
        trace!(%address, %smart_class, %pointee, ?handle, "constructed smart proxy");
        Value::Object(handle)
    }

    /// Bind `len` consecutive instances of `class` starting at `address`.
    pub fn bind_array(&self, address: Address, class: ScopeId, len: usize) -> Value {
        let size = self.reflection.size_of(class);
        let items = (0..len)
            .map(|i| self.bind_exact(address.offset((i * size) as isize), class, ProxyFlags::empty()))
            .collect();
        Value::Tuple(items)
    }

    /// The tracked proxy for `address` as exactly `class`, if still live.
    pub fn retrieve(&self, class: ScopeId, address: Address) -> Option<ProxyHandle> {
        let mut state = self.state.lock();
        let handle = state.regulator.retrieve(class, address)?;
        match state.heap.get(handle) {
            Some(proxy) if proxy.class == class && proxy.address == address => Some(handle),
            Some(_) | None => {
                warn!(%address, %class, ?handle, "identity table entry does not resolve to its proxy; dropping it");
                state.regulator.unregister(class, address);
                None
            }
        }
    }

    fn downcast(&self, address: Address, class: ScopeId) -> (Address, ScopeId) {
        let actual = self.reflection.actual_class(class, address);
        if actual == class || !self.reflection.is_subtype(actual, class) {
            return (address, class);
        }
        let offset = self
            .reflection
            .base_offset(actual, class, address, CastDirection::Down);
        (address.offset(offset), actual)
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Snapshot of the live proxy behind `handle`.
    pub fn proxy(&self, handle: ProxyHandle) -> Option<ObjectProxy> {
        self.state.lock().heap.get(handle).cloned()
    }

    pub fn class_of(&self, handle: ProxyHandle) -> Option<ScopeId> {
        self.state.lock().heap.get(handle).map(|p| p.class)
    }

    pub fn flags(&self, handle: ProxyHandle) -> Option<ProxyFlags> {
        self.state.lock().heap.get(handle).map(|p| p.flags)
    }

    /// The native object behind `handle`.
    ///
    /// Smart-pointer targets are re-derived through the dereference
    /// operator on every call. `None` means the handle is stale or
    /// tombstoned; a live proxy may still yield a null address.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn get_object(&self, handle: ProxyHandle) -> Option<Address> {
        let proxy = self.proxy(handle)?;
        Some(self.resolve(&proxy))
    }

    fn resolve(&self, proxy: &ObjectProxy) -> Address {
        if let Some(smart) = proxy.smart {
            return match self.reflection.invoke(smart.deref, proxy.address, &[]) {
                Ok(Some(slot)) => slot.as_address().unwrap_or(Address::NULL),
                Ok(None) => Address::NULL,
                Err(fault) => {
                    debug!(%fault, "smart pointer dereference failed");
                    Address::NULL
                }
            };
        }
        if proxy.flags.contains(ProxyFlags::REFERENCE) {
            if proxy.address.is_null() {
                return Address::NULL;
            }
            // SAFETY: reference proxies store the address of a pointer slot.
            return Address(unsafe { address::read::<usize>(proxy.address) });
        }
        proxy.address
    }

    /// The smart pointer itself: its address and declared class.
    pub fn smart_ptr(&self, handle: ProxyHandle) -> Option<(Address, ScopeId)> {
        let proxy = self.proxy(handle)?;
        proxy.smart.map(|s| (proxy.address, s.class))
    }

    pub fn ref_count(&self, handle: ProxyHandle) -> Option<u32> {
        self.state.lock().heap.ref_count(handle)
    }

    pub fn is_tombstone(&self, handle: ProxyHandle) -> bool {
        self.state.lock().heap.is_tombstone(handle)
    }

    /// Proxies tracked for `class`.
    pub fn tracked(&self, class: ScopeId) -> usize {
        self.state.lock().regulator.tracked(class)
    }

    /// Reachable proxy slots, live or tombstoned.
    pub fn live_proxies(&self) -> usize {
        self.state.lock().heap.len()
    }

    // ========================================================================
    // Ownership
    // ========================================================================

    fn update_flags(&self, handle: ProxyHandle, f: impl FnOnce(&mut ProxyFlags)) -> bool {
        match self.state.lock().heap.get_mut(handle) {
            Some(proxy) => {
                f(&mut proxy.flags);
                true
            }
            None => false,
        }
    }

    /// This side now destroys the object when the proxy dies.
    pub fn take_ownership(&self, handle: ProxyHandle) -> bool {
        self.update_flags(handle, |flags| flags.insert(ProxyFlags::OWNER))
    }

    /// The native side now controls the object's lifetime.
    pub fn release_ownership(&self, handle: ProxyHandle) -> bool {
        self.update_flags(handle, |flags| flags.remove(ProxyFlags::OWNER))
    }

    pub fn set_flags(&self, handle: ProxyHandle, set: ProxyFlags) -> bool {
        self.update_flags(handle, |flags| flags.insert(set))
    }

    pub fn clear_flags(&self, handle: ProxyHandle, clear: ProxyFlags) -> bool {
        self.update_flags(handle, |flags| flags.remove(clear))
    }

    /// Point a live proxy at a different object, moving its identity-table
    /// entry along.
    pub fn reseat(&self, handle: ProxyHandle, address: Address) -> bool {
        let mut state = self.state.lock();
        let Some(proxy) = state.heap.get_mut(handle) else {
            return false;
        };
        let before = proxy.clone();
        proxy.address = address;
        let after = proxy.clone();
        if before.is_tracked() {
            state.regulator.unregister(before.class, before.address);
        }
        if after.is_tracked() {
            state.regulator.register(after.class, after.address, handle);
        }
        trace!(?handle, from = %before.address, to = %address, "reseated proxy");
        true
    }

    /// Keep `keeper` alive for as long as `handle` lives.
    pub fn set_lifeline(&self, handle: ProxyHandle, keeper: ProxyHandle) -> bool {
        let previous = {
            let mut state = self.state.lock();
            if state.heap.get(handle).is_none() || !state.heap.add_ref(keeper) {
                return false;
            }
            match state.heap.get_mut(handle) {
                Some(proxy) => proxy.lifeline.replace(keeper),
                None => None,
            }
        };
        if let Some(previous) = previous {
            self.release(previous);
        }
        true
    }

    pub fn add_ref(&self, handle: ProxyHandle) -> bool {
        self.state.lock().heap.add_ref(handle)
    }

    /// Drop one host reference; on the last one the proxy is collected,
    /// its regulator entries erased, and an owned native object destroyed.
    pub fn release(&self, handle: ProxyHandle) {
        let collected = {
            let mut state = self.state.lock();
            match state.heap.release(handle) {
                Some(ProxyState::Live(proxy)) => {
                    if proxy.is_tracked() {
                        state.regulator.erase_callback(proxy.class, handle);
                    }
                    Some(proxy)
                }
                Some(ProxyState::Tombstone) | None => None,
            }
        };
        let Some(proxy) = collected else {
            return;
        };
        trace!(?handle, address = %proxy.address, "collected proxy");
        if proxy.destroys_on_collect() {
            let class = proxy.smart.map_or(proxy.class, |s| s.class);
            self.reflection.destruct(class, proxy.address);
        }
        if let Some(lifeline) = proxy.lifeline {
            self.release(lifeline);
        }
    }

    /// Destroy the native object now, if owned, leaving a live proxy to a
    /// null object.
    pub fn destruct(&self, handle: ProxyHandle) -> bool {
        let proxy = {
            let mut state = self.state.lock();
            let Some(proxy) = state.heap.get_mut(handle) else {
                return false;
            };
            let before = proxy.clone();
            proxy.address = Address::NULL;
            proxy.flags.remove(ProxyFlags::OWNER | ProxyFlags::VALUE);
            if before.is_tracked() {
                state.regulator.unregister(before.class, before.address);
            }
            before
        };
        if proxy.destroys_on_collect() {
            let class = proxy.smart.map_or(proxy.class, |s| s.class);
            self.reflection.destruct(class, proxy.address);
        }
        true
    }

    // ========================================================================
    // Destruction notifications
    // ========================================================================

    /// The native side destroyed the object at `address` of type `class`.
    ///
    /// Any proxy for it is turned into a tombstone in place and the table
    /// entries are removed. Returns whether a proxy was neutralized.
    pub fn notify_destroyed(&self, class: ScopeId, address: Address) -> bool {
        let lifeline = {
            let mut state = self.state.lock();
            let Some(handle) = state.regulator.retrieve(class, address) else {
                return false;
            };
            state.regulator.unregister(class, address);
            let found = state.heap.get(handle).map(|p| p.class);
            match found {
                None if state.heap.is_tombstone(handle) => {
                    warn!(%address, %class, ?handle, "destroyed object tracked by a tombstone");
                    return false;
                }
                None => {
                    trace!(%address, %class, "dropping stale identity entry");
                    return false;
                }
                Some(found) if found != class => {
                    warn!(%address, %class, %found, "unexpected proxy type in identity table");
                    return false;
                }
                Some(_) => {
                    let lifeline = state.heap.tombstone(handle).and_then(|p| p.lifeline);
                    debug!(%address, %class, ?handle, "proxy tombstoned after native destruction");
                    lifeline
                }
            }
        };
        if let Some(lifeline) = lifeline {
            self.release(lifeline);
        }
        true
    }

    /// Forget the identity table of `class`.
    pub fn drop_type(&self, class: ScopeId) -> usize {
        self.state.lock().regulator.drop_type(class).len()
    }

    // ========================================================================
    // Host-side queries
    // ========================================================================

    /// Whether `value` behaves as the host's "no value".
    pub fn is_none(&self, value: &Value) -> bool {
        match value {
            Value::None => true,
            Value::Object(handle) => self.state.lock().heap.get(*handle).is_none(),
            _ => false,
        }
    }

    /// Length of a proxy: tombstones report zero, live proxies have none.
    pub fn len(&self, handle: ProxyHandle) -> Option<usize> {
        self.is_tombstone(handle).then_some(0)
    }

    /// Host equality with proxy semantics.
    ///
    /// Two proxies are equal if they wrap the same object as the same
    /// class. A proxy equals None if it is a tombstone or wraps null.
    pub fn values_equal(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Object(x), Value::Object(y)) => {
                if x == y {
                    return true;
                }
                match (self.proxy(*x), self.proxy(*y)) {
                    (Some(px), Some(py)) => px.class == py.class && self.resolve(&px) == self.resolve(&py),
                    (None, None) => true,
                    _ => false,
                }
            }
            (Value::Object(h), Value::None | Value::NullPtr)
            | (Value::None | Value::NullPtr, Value::Object(h)) => match self.proxy(*h) {
                Some(proxy) => self.resolve(&proxy).is_null(),
                None => true,
            },
            _ => a == b,
        }
    }

    /// What `value` contributes to a dispatch signature hash.
    pub fn arg_identity(&self, value: &Value) -> ArgIdentity {
        match value {
            Value::Object(handle) => {
                let state = self.state.lock();
                match state.heap.get(*handle) {
                    Some(proxy) => ArgIdentity::new(
                        TypeTag::of_class(proxy.class),
                        state.heap.ref_count(*handle) == Some(1),
                    ),
                    None => ArgIdentity::new(TypeTag::from_name("NoneType"), false),
                }
            }
            Value::Buffer(buffer) => {
                let base = TypeTag::from_name("buffer").0;
                let kind = TypeTag::from_name(buffer.kind().name()).0;
                ArgIdentity::new(TypeTag(base ^ kind.rotate_left(1)), false)
            }
            other => ArgIdentity::new(TypeTag::from_name(other.type_name()), false),
        }
    }
}

impl std::fmt::Debug for ObjectSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectSpace")
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}
