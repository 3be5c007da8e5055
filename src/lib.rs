//! Object marshaling and call dispatch between a dynamic host runtime and
//! native code described by a reflection service.
//!
//! The layers, bottom up:
//!
//! - [`crossbind_core`]: values, argument slots, proxies and their identity
//!   tables, and the [`Reflection`] interface
//! - [`crossbind_marshal`]: per-type converters and executors
//! - this crate: callables, overload sets with signature caching, the
//!   [`Bridge`] facade, and trampolines for host subclasses of native
//!   classes
//!
//! ```ignore
//! let bridge = Bridge::new(reflection, BridgeConfig::default());
//! let vec = bridge.construct(vec_class, &[Value::Int(3)])?;
//! let len = bridge.call_method(vec.as_object().unwrap(), "size", &[])?;
//! ```

pub mod bridge;
pub mod callable;
pub mod config;
pub mod error;
pub mod overload;
pub mod priority;
pub mod runtime;
pub mod trampoline;

#[cfg(test)]
#[path = "../tests/common/mod.rs"]
pub(crate) mod testing;

pub use bridge::{Bridge, DerivedClass};
pub use callable::{Callable, HostCallback, HostFn, Invocation};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use overload::OverloadSet;
pub use runtime::Runtime;

pub use crossbind_core::{
    Address, CallError, ErrorKind, MemoryPolicy, MethodId, ProxyHandle, Reflection, ScopeId,
    SignalPolicy, Value,
};

pub mod prelude {
    pub use crate::bridge::*;
    pub use crate::callable::*;
    pub use crate::config::*;
    pub use crate::error::BridgeError;
    pub use crate::overload::*;
    pub use crate::runtime::*;
    pub use crate::trampoline::*;
    pub use crossbind_core::{
        Address, CallError, CallFlags, DispatchError, ErrorKind, MemoryPolicy, MethodId,
        ObjectSpace, ProxyFlags, ProxyHandle, Reflection, ScopeId, SignalPolicy, Value,
    };
}
