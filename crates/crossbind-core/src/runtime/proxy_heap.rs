//! Generational arena of object proxies.

use std::fmt;

use super::ObjectProxy;

/// Generation-checked handle to a proxy slot.
///
/// This is the host's reference to a proxy. A handle whose slot has been
/// reclaimed fails the generation check instead of aliasing the slot's next
/// occupant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProxyHandle {
    pub index: u32,
    pub generation: u32,
}

impl ProxyHandle {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

/// What a reachable slot currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyState {
    Live(ObjectProxy),
    /// The native object was destroyed behind the proxy's back. The slot
    /// stays allocated so outstanding handles remain inspectable.
    Tombstone,
}

struct HeapSlot {
    generation: u32,
    state: Option<ProxyState>,
    ref_count: u32,
}

/// Storage for every proxy the host can reach.
///
/// Each slot carries the host's reference count. When it drops to zero the
/// slot is reclaimed and its generation bumped.
pub struct ProxyHeap {
    slots: Vec<HeapSlot>,
    free_list: Vec<u32>,
}

impl ProxyHeap {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
        }
    }

    /// Store a proxy with one host reference.
    pub fn allocate(&mut self, proxy: ObjectProxy) -> ProxyHandle {
        let state = Some(ProxyState::Live(proxy));
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.state = state;
            slot.ref_count = 1;
            ProxyHandle::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(HeapSlot {
                generation: 0,
                state,
                ref_count: 1,
            });
            ProxyHandle::new(index, 0)
        }
    }

    fn slot(&self, handle: ProxyHandle) -> Option<&HeapSlot> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation && s.state.is_some())
    }

    fn slot_mut(&mut self, handle: ProxyHandle) -> Option<&mut HeapSlot> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation && s.state.is_some())
    }

    pub fn state(&self, handle: ProxyHandle) -> Option<&ProxyState> {
        self.slot(handle)?.state.as_ref()
    }

    /// The live proxy behind `handle`; `None` if stale or tombstoned.
    pub fn get(&self, handle: ProxyHandle) -> Option<&ObjectProxy> {
        match self.state(handle)? {
            ProxyState::Live(proxy) => Some(proxy),
            ProxyState::Tombstone => None,
        }
    }

    pub fn get_mut(&mut self, handle: ProxyHandle) -> Option<&mut ObjectProxy> {
        match self.slot_mut(handle)?.state.as_mut()? {
            ProxyState::Live(proxy) => Some(proxy),
            ProxyState::Tombstone => None,
        }
    }

    pub fn is_tombstone(&self, handle: ProxyHandle) -> bool {
        matches!(self.state(handle), Some(ProxyState::Tombstone))
    }

    /// Reassign a live proxy to the tombstone state in place.
    ///
    /// Returns the proxy as it was, or `None` if the handle is stale or
    /// already tombstoned.
    pub fn tombstone(&mut self, handle: ProxyHandle) -> Option<ObjectProxy> {
        let slot = self.slot_mut(handle)?;
        match slot.state.replace(ProxyState::Tombstone)? {
            ProxyState::Live(proxy) => Some(proxy),
            ProxyState::Tombstone => None,
        }
    }

    pub fn add_ref(&mut self, handle: ProxyHandle) -> bool {
        match self.slot_mut(handle) {
            Some(slot) => {
                slot.ref_count = slot.ref_count.saturating_add(1);
                true
            }
            None => false,
        }
    }

    /// Drop one host reference.
    ///
    /// Returns the slot's final state if this released the last reference.
    pub fn release(&mut self, handle: ProxyHandle) -> Option<ProxyState> {
        let slot = self.slot_mut(handle)?;
        slot.ref_count = slot.ref_count.saturating_sub(1);
        if slot.ref_count > 0 {
            return None;
        }
        let state = slot.state.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        state
    }

    pub fn ref_count(&self, handle: ProxyHandle) -> Option<u32> {
        self.slot(handle).map(|s| s.ref_count)
    }

    /// Number of reachable slots, live or tombstoned.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProxyHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProxyHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyHeap")
            .field("slot_count", &self.slots.len())
            .field("free_count", &self.free_list.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::ids::ScopeId;
    use crate::runtime::ProxyFlags;

    fn proxy(address: usize) -> ObjectProxy {
        ObjectProxy::new(Address(address), ScopeId::new(1), ProxyFlags::empty())
    }

    #[test]
    fn allocate_and_get() {
        let mut heap = ProxyHeap::new();
        let handle = heap.allocate(proxy(0x10));
        assert_eq!(heap.get(handle).map(|p| p.address), Some(Address(0x10)));
        assert_eq!(heap.ref_count(handle), Some(1));
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn stale_handle_after_reuse() {
        let mut heap = ProxyHeap::new();
        let first = heap.allocate(proxy(0x10));
        assert!(matches!(heap.release(first), Some(ProxyState::Live(_))));

        let second = heap.allocate(proxy(0x20));
        assert_eq!(first.index, second.index);
        assert_ne!(first.generation, second.generation);
        assert!(heap.get(first).is_none());
        assert!(!heap.add_ref(first));
        assert_eq!(heap.get(second).map(|p| p.address), Some(Address(0x20)));
    }

    #[test]
    fn release_counts_down() {
        let mut heap = ProxyHeap::new();
        let handle = heap.allocate(proxy(0x10));
        assert!(heap.add_ref(handle));
        assert!(heap.release(handle).is_none());
        assert_eq!(heap.ref_count(handle), Some(1));
        assert!(heap.release(handle).is_some());
        assert_eq!(heap.ref_count(handle), None);
        assert!(heap.is_empty());
    }

    #[test]
    fn tombstone_keeps_slot_reachable() {
        let mut heap = ProxyHeap::new();
        let handle = heap.allocate(proxy(0x10));
        let old = heap.tombstone(handle).unwrap();
        assert_eq!(old.address, Address(0x10));

        assert!(heap.get(handle).is_none());
        assert!(heap.is_tombstone(handle));
        assert_eq!(heap.ref_count(handle), Some(1));
        assert!(heap.tombstone(handle).is_none());
        assert_eq!(heap.release(handle), Some(ProxyState::Tombstone));
    }
}
