//! Executors for builtin return types.

use crossbind_core::{
    Address, CallContext, CallError, ErrorKind, MethodId, NativeStr, PrimitiveKind, Value, address,
};

use super::{Executor, result_address};

fn null_reference() -> CallError {
    CallError::value_error("attempt to access a null-pointer")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoidExecutor;

impl Executor for VoidExecutor {
    fn execute(&self, method: MethodId, this: Address, ctx: &mut CallContext<'_>) -> Result<Value, CallError> {
        ctx.invoke(method, this)?;
        Ok(Value::None)
    }
}

/// Primitives returned by value, or by const reference when `by_ref`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericExecutor {
    kind: PrimitiveKind,
    by_ref: bool,
}

impl NumericExecutor {
    pub fn new(kind: PrimitiveKind) -> Self {
        Self { kind, by_ref: false }
    }

    pub fn by_ref(kind: PrimitiveKind) -> Self {
        Self { kind, by_ref: true }
    }
}

impl Executor for NumericExecutor {
    fn execute(&self, method: MethodId, this: Address, ctx: &mut CallContext<'_>) -> Result<Value, CallError> {
        let slot = ctx.invoke(method, this)?;
        if self.by_ref {
            let at = result_address(slot)?;
            if at.is_null() {
                return Err(null_reference());
            }
            // SAFETY: a reference result points at a live value of this kind.
            return Ok(self.kind.to_value(unsafe { self.kind.read(at) }));
        }
        let slot = slot.ok_or_else(|| {
            CallError::new(ErrorKind::SystemError, format!("{} call returned no value", self.kind.name()))
        })?;
        Ok(self.kind.to_value(slot))
    }
}

/// Primitives returned by mutable reference.
///
/// With an assignable value pending in the context the result is written
/// through the reference instead of read, and the call yields `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericRefExecutor {
    kind: PrimitiveKind,
}

impl NumericRefExecutor {
    pub fn new(kind: PrimitiveKind) -> Self {
        Self { kind }
    }
}

impl Executor for NumericRefExecutor {
    fn execute(&self, method: MethodId, this: Address, ctx: &mut CallContext<'_>) -> Result<Value, CallError> {
        let at = result_address(ctx.invoke(method, this)?)?;
        if at.is_null() {
            return Err(null_reference());
        }
        if let Some(value) = ctx.take_assignable() {
            let slot = self.kind.to_slot(&value)?;
            // SAFETY: the reference result is writable storage of this kind.
            unsafe { slot.write_to(at) };
            return Ok(Value::None);
        }
        // SAFETY: as above.
        Ok(self.kind.to_value(unsafe { self.kind.read(at) }))
    }
}

/// `const char*` / `char*`; a null result reads as the empty string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CStringExecutor;

impl Executor for CStringExecutor {
    fn execute(&self, method: MethodId, this: Address, ctx: &mut CallContext<'_>) -> Result<Value, CallError> {
        let at = result_address(ctx.invoke(method, this)?)?;
        // SAFETY: c-string results are null or NUL-terminated.
        Ok(Value::Str(unsafe { address::read_c_str(at) }))
    }
}

/// `std::string` results. By-value results are caller-owned copies and are
/// destroyed once read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StdStringExecutor {
    owned: bool,
}

impl StdStringExecutor {
    pub fn new(owned: bool) -> Self {
        Self { owned }
    }
}

impl Executor for StdStringExecutor {
    fn execute(&self, method: MethodId, this: Address, ctx: &mut CallContext<'_>) -> Result<Value, CallError> {
        let at = result_address(ctx.invoke(method, this)?)?;
        if at.is_null() {
            return Ok(Value::Str(String::new()));
        }
        // SAFETY: string results are native string objects.
        let native = unsafe { address::read::<NativeStr>(at) };
        // SAFETY: a live native string references `len` readable bytes.
        let text = unsafe { native.to_string_lossy() };
        if self.owned {
            let reflection = ctx.reflection();
            if let Some(class) = reflection.scope("std::string") {
                reflection.destruct(class, at);
            }
        }
        Ok(Value::Str(text))
    }
}

/// Opaque addresses; null reads as the null-pointer singleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoidPtrExecutor;

impl Executor for VoidPtrExecutor {
    fn execute(&self, method: MethodId, this: Address, ctx: &mut CallContext<'_>) -> Result<Value, CallError> {
        let at = result_address(ctx.invoke(method, this)?)?;
        Ok(if at.is_null() {
            Value::NullPtr
        } else {
            Value::Address(at)
        })
    }
}
