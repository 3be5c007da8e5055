//! Executors for class-typed results.
//!
//! | Return shape | Proxy flags |
//! |---|---|
//! | `T` | `OWNER \| VALUE`, always a new proxy |
//! | `T*`, `T&` | none, retrieve-or-create |
//! | `T**`, `T*&` | `REFERENCE` |
//! | smart pointer by value | smart proxy, `OWNER` |

use crossbind_core::type_name::Compound;
use crossbind_core::{
    Address, CallContext, CallError, MethodId, ProxyFlags, ScopeId, Value,
};

use super::{Executor, result_address};
use crate::converters::{assign, cast_object};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectValueExecutor {
    class: ScopeId,
}

impl ObjectValueExecutor {
    pub fn new(class: ScopeId) -> Self {
        Self { class }
    }
}

impl Executor for ObjectValueExecutor {
    fn execute(&self, method: MethodId, this: Address, ctx: &mut CallContext<'_>) -> Result<Value, CallError> {
        let object = result_address(ctx.invoke(method, this)?)?;
        if object.is_null() {
            return Err(CallError::value_error("by-value call returned no object"));
        }
        let handle = ctx
            .space()
            .construct_proxy(object, self.class, ProxyFlags::OWNER | ProxyFlags::VALUE);
        Ok(Value::Object(handle))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectPtrExecutor {
    class: ScopeId,
}

impl ObjectPtrExecutor {
    pub fn new(class: ScopeId) -> Self {
        Self { class }
    }
}

impl Executor for ObjectPtrExecutor {
    fn execute(&self, method: MethodId, this: Address, ctx: &mut CallContext<'_>) -> Result<Value, CallError> {
        let object = result_address(ctx.invoke(method, this)?)?;
        Ok(ctx.space().bind_object(object, self.class, ProxyFlags::empty()))
    }
}

/// `T&`. A pending assignable value is copy-assigned into the referent
/// instead of binding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectRefExecutor {
    class: ScopeId,
}

impl ObjectRefExecutor {
    pub fn new(class: ScopeId) -> Self {
        Self { class }
    }
}

impl Executor for ObjectRefExecutor {
    fn execute(&self, method: MethodId, this: Address, ctx: &mut CallContext<'_>) -> Result<Value, CallError> {
        let object = result_address(ctx.invoke(method, this)?)?;
        let space = ctx.space();
        match ctx.take_assignable() {
            Some(Value::Object(source)) => {
                let source = cast_object(space, source, self.class)?;
                assign(space, self.class, object, source)?;
                Ok(Value::None)
            }
            Some(other) => Err(CallError::type_error(format!(
                "cannot assign {} to a reference to {}",
                other.type_name(),
                space.reflection().final_name(self.class)
            ))),
            None => Ok(space.bind_object(object, self.class, ProxyFlags::empty())),
        }
    }
}

/// `T**` and `T*&`: a proxy that follows the returned pointer cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectPtrPtrExecutor {
    class: ScopeId,
}

impl ObjectPtrPtrExecutor {
    pub fn new(class: ScopeId) -> Self {
        Self { class }
    }
}

impl Executor for ObjectPtrPtrExecutor {
    fn execute(&self, method: MethodId, this: Address, ctx: &mut CallContext<'_>) -> Result<Value, CallError> {
        let cell = result_address(ctx.invoke(method, this)?)?;
        Ok(ctx.space().bind_object(cell, self.class, ProxyFlags::REFERENCE))
    }
}

/// Fixed-size arrays, returned as a tuple of element proxies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectArrayExecutor {
    class: ScopeId,
    len: usize,
}

impl ObjectArrayExecutor {
    pub fn new(class: ScopeId, len: usize) -> Self {
        Self { class, len }
    }
}

impl Executor for ObjectArrayExecutor {
    fn execute(&self, method: MethodId, this: Address, ctx: &mut CallContext<'_>) -> Result<Value, CallError> {
        let first = result_address(ctx.invoke(method, this)?)?;
        Ok(ctx.space().bind_array(first, self.class, self.len))
    }
}

/// Smart-pointer results.
///
/// Managed results become smart proxies whose target is re-derived on every
/// access; unmanaged ones are plain proxies of the smart class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmartPtrExecutor {
    smart: ScopeId,
    deref: MethodId,
    pointee: ScopeId,
    shape: Compound,
    managed: bool,
}

impl SmartPtrExecutor {
    pub fn new(smart: ScopeId, deref: MethodId, pointee: ScopeId, shape: Compound, managed: bool) -> Self {
        Self {
            smart,
            deref,
            pointee,
            shape,
            managed,
        }
    }
}

impl Executor for SmartPtrExecutor {
    fn execute(&self, method: MethodId, this: Address, ctx: &mut CallContext<'_>) -> Result<Value, CallError> {
        let object = result_address(ctx.invoke(method, this)?)?;
        let space = ctx.space();
        let by_value = self.shape == Compound::Value;
        Ok(if self.managed {
            let flags = if by_value { ProxyFlags::OWNER } else { ProxyFlags::empty() };
            space.bind_smart(object, self.smart, self.deref, self.pointee, flags)
        } else {
            let flags = if by_value {
                ProxyFlags::OWNER | ProxyFlags::VALUE
            } else {
                ProxyFlags::empty()
            };
            space.bind_object(object, self.smart, flags)
        })
    }
}

/// Runs a constructor; the new object is owned by its proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstructorExecutor {
    class: ScopeId,
}

impl ConstructorExecutor {
    pub fn new(class: ScopeId) -> Self {
        Self { class }
    }
}

impl Executor for ConstructorExecutor {
    fn execute(&self, method: MethodId, _this: Address, ctx: &mut CallContext<'_>) -> Result<Value, CallError> {
        let object = ctx.construct(method, self.class)?;
        let handle = ctx.space().construct_proxy(object, self.class, ProxyFlags::OWNER);
        Ok(Value::Object(handle))
    }
}
