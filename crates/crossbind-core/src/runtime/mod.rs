//! Proxies, identity, and per-call state.
//!
//! ## Key Types
//!
//! - [`ObjectProxy`]: host-side state for one native object
//! - [`ProxyHeap`]: generational arena owning every proxy
//! - [`MemoryRegulator`]: per-type address ↔ handle identity tables
//! - [`ObjectSpace`]: heap + regulator behind one lock, plus binding and
//!   ownership operations
//! - [`CallContext`]: arguments, flags, and scratch storage of one call

mod call_context;
mod object_space;
mod proxy;
mod proxy_heap;
mod regulator;

pub use call_context::{CallContext, CallFlags, MemoryPolicy, SignalPolicy};
pub use object_space::ObjectSpace;
pub use proxy::{ObjectProxy, ProxyFlags, SmartPtr};
pub use proxy_heap::{ProxyHandle, ProxyHeap, ProxyState};
pub use regulator::MemoryRegulator;
