//! Core types for crossbind.
//!
//! This crate holds everything the converter, executor, and dispatch layers
//! share:
//!
//! - [`Parameter`] and [`SlotValue`]: argument slots of a native call
//! - [`Value`] and [`Buffer`]: dynamic host values
//! - [`CallContext`]: arguments, flags, and scratch storage of one call
//! - [`ObjectSpace`]: proxies, identity tables, and ownership
//! - [`Reflection`]: the interface to the reflection/JIT service
//! - [`HostLock`]: the host runtime's execution lock
//! - error types for each failure category

pub mod address;
pub mod diagnostics;
pub mod error;
pub mod host_lock;
pub mod ids;
pub mod parameter;
pub mod primitive;
pub mod reflection;
pub mod runtime;
pub mod signature;
pub mod type_name;
pub mod value;

pub use address::{Address, NativeStr};
pub use diagnostics::WarnOnce;
pub use error::{CallError, CompileError, ConversionError, DispatchError, ErrorKind, NativeFault};
pub use host_lock::{HOST_LOCK, HostGuard, HostLock};
pub use ids::{MethodId, ScopeId};
pub use parameter::{Parameter, PassBy, SlotValue, TypeCode};
pub use primitive::PrimitiveKind;
pub use reflection::{CastDirection, Reflection};
pub use runtime::{
    CallContext, CallFlags, MemoryPolicy, MemoryRegulator, ObjectProxy, ObjectSpace, ProxyFlags,
    ProxyHandle, ProxyHeap, ProxyState, SignalPolicy, SmartPtr,
};
pub use signature::{ArgIdentity, SignatureHash, TypeTag};
pub use type_name::Compound;
pub use value::{Buffer, Value};
