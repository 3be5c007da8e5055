//! Address-to-proxy identity tables.
//!
//! The regulator guarantees at most one live proxy per native address and
//! type. Each native type gets its own [`TypeTable`] holding both
//! directions of the mapping, so that a proxy collected by the host can be
//! erased without re-deriving its address, and an address destroyed by the
//! native side can be found without scanning proxies.
//!
//! The regulator only stores handles. Whether a handle still resolves, and
//! to what, is decided by the [`ProxyHeap`](super::ProxyHeap); callers
//! re-check on every use.

use rustc_hash::FxHashMap;

use crate::address::Address;
use crate::ids::ScopeId;

use super::ProxyHandle;

#[derive(Debug, Default)]
struct TypeTable {
    objects: FxHashMap<Address, ProxyHandle>,
    weak_refs: FxHashMap<ProxyHandle, Address>,
}

/// Per-type bidirectional address/handle tables.
#[derive(Debug, Default)]
pub struct MemoryRegulator {
    tables: FxHashMap<ScopeId, TypeTable>,
}

impl MemoryRegulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `handle` as the proxy for `address`.
    ///
    /// Returns `false` for a null address or an address that already has a
    /// tracked proxy; the existing entry is left untouched.
    pub fn register(&mut self, class: ScopeId, address: Address, handle: ProxyHandle) -> bool {
        if address.is_null() {
            return false;
        }
        let table = self.tables.entry(class).or_default();
        if table.objects.contains_key(&address) {
            return false;
        }
        table.objects.insert(address, handle);
        table.weak_refs.insert(handle, address);
        true
    }

    /// Stop tracking `address`.
    pub fn unregister(&mut self, class: ScopeId, address: Address) -> Option<ProxyHandle> {
        let table = self.tables.get_mut(&class)?;
        let handle = table.objects.remove(&address)?;
        table.weak_refs.remove(&handle);
        Some(handle)
    }

    /// The tracked handle for `address` as an instance of exactly `class`.
    ///
    /// An address tracked under a different class is a miss.
    pub fn retrieve(&self, class: ScopeId, address: Address) -> Option<ProxyHandle> {
        self.tables.get(&class)?.objects.get(&address).copied()
    }

    /// Erase the entries of a proxy the host has collected.
    pub fn erase_callback(&mut self, class: ScopeId, handle: ProxyHandle) -> bool {
        let Some(table) = self.tables.get_mut(&class) else {
            return false;
        };
        match table.weak_refs.remove(&handle) {
            Some(address) => {
                table.objects.remove(&address);
                true
            }
            None => false,
        }
    }

    /// Drop the whole table of `class`, returning the handles it tracked.
    pub fn drop_type(&mut self, class: ScopeId) -> Vec<ProxyHandle> {
        self.tables
            .remove(&class)
            .map(|t| t.weak_refs.into_keys().collect())
            .unwrap_or_default()
    }

    pub fn tracked(&self, class: ScopeId) -> usize {
        self.tables.get(&class).map_or(0, |t| t.objects.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOO: ScopeId = ScopeId::new(1);
    const BAR: ScopeId = ScopeId::new(2);

    #[test]
    fn register_and_retrieve() {
        let mut regulator = MemoryRegulator::new();
        let handle = ProxyHandle::new(0, 0);
        assert!(regulator.register(FOO, Address(0x10), handle));
        assert_eq!(regulator.retrieve(FOO, Address(0x10)), Some(handle));
        assert_eq!(regulator.tracked(FOO), 1);
    }

    #[test]
    fn class_mismatch_is_a_miss() {
        let mut regulator = MemoryRegulator::new();
        regulator.register(FOO, Address(0x10), ProxyHandle::new(0, 0));
        assert_eq!(regulator.retrieve(BAR, Address(0x10)), None);
    }

    #[test]
    fn no_duplicate_registration() {
        let mut regulator = MemoryRegulator::new();
        let first = ProxyHandle::new(0, 0);
        assert!(regulator.register(FOO, Address(0x10), first));
        assert!(!regulator.register(FOO, Address(0x10), ProxyHandle::new(1, 0)));
        assert_eq!(regulator.retrieve(FOO, Address(0x10)), Some(first));
        assert!(!regulator.register(FOO, Address::NULL, ProxyHandle::new(2, 0)));
    }

    #[test]
    fn erase_callback_clears_both_directions() {
        let mut regulator = MemoryRegulator::new();
        let handle = ProxyHandle::new(3, 1);
        regulator.register(FOO, Address(0x10), handle);
        assert!(regulator.erase_callback(FOO, handle));
        assert_eq!(regulator.retrieve(FOO, Address(0x10)), None);
        assert!(!regulator.erase_callback(FOO, handle));
        assert!(regulator.register(FOO, Address(0x10), ProxyHandle::new(4, 0)));
    }

    #[test]
    fn unregister_and_drop_type() {
        let mut regulator = MemoryRegulator::new();
        regulator.register(FOO, Address(0x10), ProxyHandle::new(0, 0));
        regulator.register(FOO, Address(0x20), ProxyHandle::new(1, 0));
        assert_eq!(
            regulator.unregister(FOO, Address(0x10)),
            Some(ProxyHandle::new(0, 0))
        );
        assert_eq!(regulator.drop_type(FOO), vec![ProxyHandle::new(1, 0)]);
        assert_eq!(regulator.tracked(FOO), 0);
    }
}
