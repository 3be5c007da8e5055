//! Opaque pointers and the terminal converters for types that cannot be
//! passed.

use crossbind_core::{
    Address, CallContext, ConversionError, ObjectSpace, Parameter, ProxyHandle, Value, address,
};

use super::{Converter, is_null_like, null_pointer};

/// `void*` and unknown pointer types: any address-like host value.
///
/// Passing a proxy whose ownership the callee may take releases the proxy's
/// ownership unless `keep_control` is set or ownership is strict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoidPtrConverter {
    keep_control: bool,
}

impl VoidPtrConverter {
    pub fn new(keep_control: bool) -> Self {
        Self { keep_control }
    }
}

fn object_address(space: &ObjectSpace, handle: ProxyHandle) -> Result<Address, ConversionError> {
    space.get_object(handle).ok_or(ConversionError::StaleProxy)
}

/// Address an address-like host value stands for.
fn opaque_address(value: &Value, space: &ObjectSpace) -> Result<Address, ConversionError> {
    match value {
        Value::Address(target) => Ok(*target),
        Value::Buffer(buffer) => Ok(buffer.address()),
        Value::Object(handle) => object_address(space, *handle),
        other if is_null_like(other) => Ok(Address::NULL),
        other => Err(ConversionError::mismatch("address", other.type_name())),
    }
}

fn read_pointer(address: Address) -> Result<Value, ConversionError> {
    if address.is_null() {
        return Err(null_pointer());
    }
    // SAFETY: pointer members hold one pointer-sized word.
    let target = Address(unsafe { address::read::<usize>(address) });
    Ok(if target.is_null() {
        Value::NullPtr
    } else {
        Value::Address(target)
    })
}

impl Converter for VoidPtrConverter {
    fn set_arg(&self, value: &Value, ctx: &mut CallContext<'_>) -> Result<Parameter, ConversionError> {
        let target = opaque_address(value, ctx.space())?;
        if let Value::Object(handle) = value
            && !self.keep_control
            && !ctx.use_strict_ownership()
        {
            ctx.space().release_ownership(*handle);
        }
        Ok(Parameter::pointer(target))
    }

    fn from_memory(&self, address: Address, _space: &ObjectSpace) -> Result<Value, ConversionError> {
        read_pointer(address)
    }

    fn to_memory(&self, value: &Value, address: Address, space: &ObjectSpace) -> Result<(), ConversionError> {
        if address.is_null() {
            return Err(null_pointer());
        }
        let target = opaque_address(value, space)?;
        // SAFETY: as in `read_pointer`.
        unsafe { address::write(address, target.0) };
        Ok(())
    }
}

/// `void*&`: the callee may reseat the pointer held by a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoidPtrRefConverter;

impl Converter for VoidPtrRefConverter {
    fn set_arg(&self, value: &Value, ctx: &mut CallContext<'_>) -> Result<Parameter, ConversionError> {
        match value {
            Value::Object(handle) => {
                let object = object_address(ctx.space(), *handle)?;
                Ok(Parameter::by_ref(ctx.pointer_cell(*handle, object)))
            }
            other => Err(ConversionError::mismatch("object", other.type_name())),
        }
    }
}

/// `void**`: a proxy's pointer cell, a buffer, or a raw address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoidPtrPtrConverter;

impl Converter for VoidPtrPtrConverter {
    fn set_arg(&self, value: &Value, ctx: &mut CallContext<'_>) -> Result<Parameter, ConversionError> {
        match value {
            Value::Object(handle) => {
                let object = object_address(ctx.space(), *handle)?;
                Ok(Parameter::pointer(ctx.pointer_cell(*handle, object)))
            }
            other => Ok(Parameter::pointer(opaque_address(other, ctx.space())?)),
        }
    }

    fn from_memory(&self, address: Address, _space: &ObjectSpace) -> Result<Value, ConversionError> {
        read_pointer(address)
    }
}

/// Types with a known shape this layer does not support, e.g. rvalue
/// references to builtins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotImplementedConverter {
    type_name: String,
}

impl NotImplementedConverter {
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
        }
    }
}

impl Converter for NotImplementedConverter {
    fn set_arg(&self, _value: &Value, _ctx: &mut CallContext<'_>) -> Result<Parameter, ConversionError> {
        Err(ConversionError::NotImplemented(self.type_name.clone()))
    }
}

/// Unknown value types; every conversion fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailingConverter {
    type_name: String,
}

impl FailingConverter {
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
        }
    }
}

impl Converter for FailingConverter {
    fn set_arg(&self, _value: &Value, _ctx: &mut CallContext<'_>) -> Result<Parameter, ConversionError> {
        Err(ConversionError::UnknownType(self.type_name.clone()))
    }
}
