//! Things an overload set can call.
//!
//! ## Key Types
//!
//! - [`Callable`]: one overload: describes itself and performs the call
//! - [`NativeMethod`], [`NativeFunction`], [`NativeConstructor`]: native
//!   overloads reached through the reflection service
//! - [`HostCallback`]: a host closure added to an overload set

mod host;
mod native;

use std::fmt;

use crossbind_core::{CallError, CallFlags, ProxyHandle, Value};

use crate::runtime::Runtime;

pub use host::{HostCallback, HostFn};
pub use native::{NativeConstructor, NativeFunction, NativeMethod, parse_default};

/// One call of one overload.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    /// The bound receiver, if any.
    pub this: Option<ProxyHandle>,
    pub args: &'a [Value],
    /// Value to store through a reference result instead of returning it.
    pub assign: Option<&'a Value>,
    pub flags: CallFlags,
}

impl<'a> Invocation<'a> {
    pub fn new(this: Option<ProxyHandle>, args: &'a [Value], flags: CallFlags) -> Self {
        Self {
            this,
            args,
            assign: None,
            flags,
        }
    }
}

pub trait Callable: Send + Sync + fmt::Debug {
    /// Argument types only, e.g. `(int, double)`; what `select` matches.
    fn signature(&self) -> &str;

    /// Full declaration, e.g. `double Vec::at(int i)`.
    fn prototype(&self) -> &str;

    fn priority(&self) -> i32;

    fn max_args(&self) -> usize;

    fn is_constructor(&self) -> bool {
        false
    }

    fn doc(&self) -> String {
        self.prototype().to_string()
    }

    fn call(&self, rt: &Runtime, invocation: &Invocation<'_>) -> Result<Value, CallError>;
}
