//! Converters for native class types.
//!
//! Every class-typed argument is a proxy whose class must be the declared
//! class or derive from it; derived objects are upcast through the
//! reflection service's base offsets before their address goes into the
//! slot.

use crossbind_core::type_name::Compound;
use crossbind_core::{
    Address, CallContext, CallFlags, CastDirection, ConversionError, MethodId, ObjectSpace,
    Parameter, ProxyFlags, ProxyHandle, ScopeId, Value, address,
};

use super::{Converter, is_null_like, null_pointer};

/// Address of the object behind `handle` as an instance of `class`.
///
/// May be null: a live proxy can wrap a null object.
pub(crate) fn cast_object(
    space: &ObjectSpace,
    handle: ProxyHandle,
    class: ScopeId,
) -> Result<Address, ConversionError> {
    let proxy = space.proxy(handle).ok_or(ConversionError::StaleProxy)?;
    let reflection = space.reflection();
    if proxy.class != class && !reflection.is_subtype(proxy.class, class) {
        return Err(ConversionError::WrongClass {
            expected: reflection.final_name(class),
            actual: reflection.final_name(proxy.class),
        });
    }
    let object = space.get_object(handle).ok_or(ConversionError::StaleProxy)?;
    if object.is_null() || proxy.class == class {
        return Ok(object);
    }
    let offset = reflection.base_offset(proxy.class, class, object, CastDirection::Up);
    Ok(object.offset(offset))
}

fn object_handle(value: &Value) -> Result<ProxyHandle, ConversionError> {
    value
        .as_object()
        .ok_or_else(|| ConversionError::mismatch("object", value.type_name()))
}

/// Non-null instance of `class` for by-value and by-reference passing.
fn instance(space: &ObjectSpace, value: &Value, class: ScopeId) -> Result<Address, ConversionError> {
    let object = cast_object(space, object_handle(value)?, class)?;
    if object.is_null() {
        return Err(null_pointer());
    }
    Ok(object)
}

fn assignment_operator(space: &ObjectSpace, class: ScopeId) -> Result<MethodId, ConversionError> {
    let reflection = space.reflection();
    reflection
        .methods_named(class, "operator=")
        .into_iter()
        .find(|m| reflection.arg_count(*m) == 1)
        .ok_or_else(|| {
            ConversionError::NotImplemented(format!("{}::operator=", reflection.final_name(class)))
        })
}

/// Copy-assign the `class` instance at `source` into `target`.
pub(crate) fn assign(
    space: &ObjectSpace,
    class: ScopeId,
    target: Address,
    source: Address,
) -> Result<(), ConversionError> {
    if target.is_null() || source.is_null() {
        return Err(null_pointer());
    }
    let method = assignment_operator(space, class)?;
    let mut ctx = CallContext::new(space, CallFlags::SAFE_SIGNALS);
    ctx.args.push(Parameter::by_ref(source));
    ctx.invoke(method, target)
        .map_err(|fault| ConversionError::InvalidValue(fault.to_string()))?;
    Ok(())
}

// ============================================================================
// By value and by reference
// ============================================================================

/// Class instances passed by value; the callee receives the object's
/// address and copies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectValueConverter {
    class: ScopeId,
}

impl ObjectValueConverter {
    pub fn new(class: ScopeId) -> Self {
        Self { class }
    }
}

impl Converter for ObjectValueConverter {
    fn set_arg(&self, value: &Value, ctx: &mut CallContext<'_>) -> Result<Parameter, ConversionError> {
        Ok(Parameter::by_ref(instance(ctx.space(), value, self.class)?))
    }

    fn from_memory(&self, address: Address, space: &ObjectSpace) -> Result<Value, ConversionError> {
        Ok(space.bind_object(address, self.class, ProxyFlags::empty()))
    }

    fn to_memory(&self, value: &Value, address: Address, space: &ObjectSpace) -> Result<(), ConversionError> {
        assign(space, self.class, address, instance(space, value, self.class)?)
    }
}

/// `T&` and `const T&`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectRefConverter {
    class: ScopeId,
}

impl ObjectRefConverter {
    pub fn new(class: ScopeId) -> Self {
        Self { class }
    }
}

impl Converter for ObjectRefConverter {
    fn set_arg(&self, value: &Value, ctx: &mut CallContext<'_>) -> Result<Parameter, ConversionError> {
        Ok(Parameter::by_ref(instance(ctx.space(), value, self.class)?))
    }

    fn from_memory(&self, address: Address, space: &ObjectSpace) -> Result<Value, ConversionError> {
        Ok(space.bind_object(address, self.class, ProxyFlags::empty()))
    }

    fn to_memory(&self, value: &Value, address: Address, space: &ObjectSpace) -> Result<(), ConversionError> {
        assign(space, self.class, address, instance(space, value, self.class)?)
    }
}

// ============================================================================
// Pointers
// ============================================================================

/// `T*`. Unless `keep_control` is set the callee is presumed to take the
/// object over, and the proxy gives up ownership outside strict mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectPtrConverter {
    class: ScopeId,
    keep_control: bool,
}

impl ObjectPtrConverter {
    pub fn new(class: ScopeId, keep_control: bool) -> Self {
        Self {
            class,
            keep_control,
        }
    }
}

impl Converter for ObjectPtrConverter {
    fn set_arg(&self, value: &Value, ctx: &mut CallContext<'_>) -> Result<Parameter, ConversionError> {
        if is_null_like(value) {
            return Ok(Parameter::pointer(Address::NULL));
        }
        let handle = object_handle(value)?;
        let object = cast_object(ctx.space(), handle, self.class)?;
        if !self.keep_control && !ctx.use_strict_ownership() {
            ctx.space().release_ownership(handle);
        }
        Ok(Parameter::pointer(object))
    }

    fn from_memory(&self, address: Address, space: &ObjectSpace) -> Result<Value, ConversionError> {
        Ok(space.bind_object(address, self.class, ProxyFlags::REFERENCE))
    }

    fn to_memory(&self, value: &Value, address: Address, space: &ObjectSpace) -> Result<(), ConversionError> {
        if address.is_null() {
            return Err(null_pointer());
        }
        let object = if is_null_like(value) {
            Address::NULL
        } else {
            let handle = object_handle(value)?;
            let object = cast_object(space, handle, self.class)?;
            if !self.keep_control {
                space.release_ownership(handle);
            }
            object
        };
        // SAFETY: pointer members hold one pointer-sized word.
        unsafe { address::write(address, object.0) };
        Ok(())
    }
}

/// `T**` and `T*&`: the callee may reseat the proxy's pointer, which is
/// written back after the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectPtrPtrConverter {
    class: ScopeId,
    is_ref: bool,
}

impl ObjectPtrPtrConverter {
    pub fn new(class: ScopeId, is_ref: bool) -> Self {
        Self { class, is_ref }
    }
}

impl Converter for ObjectPtrPtrConverter {
    fn set_arg(&self, value: &Value, ctx: &mut CallContext<'_>) -> Result<Parameter, ConversionError> {
        if !self.is_ref && is_null_like(value) {
            return Ok(Parameter::pointer(Address::NULL));
        }
        let handle = object_handle(value)?;
        let object = cast_object(ctx.space(), handle, self.class)?;
        let cell = ctx.pointer_cell(handle, object);
        Ok(if self.is_ref {
            Parameter::by_ref(cell)
        } else {
            Parameter::pointer(cell)
        })
    }

    fn from_memory(&self, address: Address, space: &ObjectSpace) -> Result<Value, ConversionError> {
        Ok(space.bind_object(address, self.class, ProxyFlags::REFERENCE))
    }
}

/// `T&&`: consumes a proxy marked movable, or a fresh temporary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMoveConverter {
    class: ScopeId,
}

impl ObjectMoveConverter {
    pub fn new(class: ScopeId) -> Self {
        Self { class }
    }
}

impl Converter for ObjectMoveConverter {
    fn set_arg(&self, value: &Value, ctx: &mut CallContext<'_>) -> Result<Parameter, ConversionError> {
        let space = ctx.space();
        let handle = object_handle(value)?;
        let flags = space.flags(handle).ok_or(ConversionError::StaleProxy)?;
        if !flags.contains(ProxyFlags::RVALUE) && space.ref_count(handle) != Some(1) {
            return Err(ConversionError::NotMovable);
        }
        let object = instance(space, value, self.class)?;
        space.clear_flags(handle, ProxyFlags::RVALUE);
        Ok(Parameter::moved(object))
    }
}

/// Arrays of class instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectArrayConverter {
    class: ScopeId,
    size: Option<usize>,
}

impl ObjectArrayConverter {
    pub fn new(class: ScopeId, size: Option<usize>) -> Self {
        Self { class, size }
    }
}

impl Converter for ObjectArrayConverter {
    fn set_arg(&self, value: &Value, ctx: &mut CallContext<'_>) -> Result<Parameter, ConversionError> {
        if is_null_like(value) {
            return Ok(Parameter::pointer(Address::NULL));
        }
        let object = cast_object(ctx.space(), object_handle(value)?, self.class)?;
        Ok(Parameter::pointer(object))
    }

    fn from_memory(&self, address: Address, space: &ObjectSpace) -> Result<Value, ConversionError> {
        Ok(match self.size {
            Some(len) => space.bind_array(address, self.class, len),
            None => space.bind_object(address, self.class, ProxyFlags::empty()),
        })
    }

    fn to_memory(&self, value: &Value, address: Address, space: &ObjectSpace) -> Result<(), ConversionError> {
        let Value::Tuple(items) = value else {
            return Err(ConversionError::mismatch("tuple", value.type_name()));
        };
        if let Some(limit) = self.size
            && items.len() > limit
        {
            return Err(ConversionError::TooLong {
                len: items.len(),
                limit,
            });
        }
        let stride = space.reflection().size_of(self.class);
        for (i, item) in items.iter().enumerate() {
            let source = instance(space, item, self.class)?;
            assign(space, self.class, address.offset((i * stride) as isize), source)?;
        }
        Ok(())
    }
}

// ============================================================================
// Smart pointers
// ============================================================================

/// Smart-pointer classes, chained to their pointee class through the
/// dereference operator.
///
/// Accepts smart-pointer proxies of this smart class, and plain proxies of
/// the smart class itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmartPtrConverter {
    smart: ScopeId,
    deref: MethodId,
    pointee: ScopeId,
    shape: Compound,
}

impl SmartPtrConverter {
    pub fn new(smart: ScopeId, deref: MethodId, pointee: ScopeId, shape: Compound) -> Self {
        Self {
            smart,
            deref,
            pointee,
            shape,
        }
    }

    /// Address of the smart pointer object itself.
    fn smart_address(&self, space: &ObjectSpace, value: &Value) -> Result<Address, ConversionError> {
        let handle = object_handle(value)?;
        match space.smart_ptr(handle) {
            Some((address, class)) if class == self.smart => Ok(address),
            Some((_, class)) => Err(ConversionError::WrongClass {
                expected: space.reflection().final_name(self.smart),
                actual: space.reflection().final_name(class),
            }),
            None => cast_object(space, handle, self.smart),
        }
    }
}

impl Converter for SmartPtrConverter {
    fn set_arg(&self, value: &Value, ctx: &mut CallContext<'_>) -> Result<Parameter, ConversionError> {
        if self.shape == Compound::Pointer && is_null_like(value) {
            return Ok(Parameter::pointer(Address::NULL));
        }
        let smart = self.smart_address(ctx.space(), value)?;
        match self.shape {
            Compound::Pointer => Ok(Parameter::pointer(smart)),
            Compound::RValueRef => Ok(Parameter::moved(smart)),
            _ if smart.is_null() => Err(null_pointer()),
            _ => Ok(Parameter::by_ref(smart)),
        }
    }

    fn from_memory(&self, address: Address, space: &ObjectSpace) -> Result<Value, ConversionError> {
        Ok(space.bind_smart(address, self.smart, self.deref, self.pointee, ProxyFlags::empty()))
    }

    fn to_memory(&self, value: &Value, address: Address, space: &ObjectSpace) -> Result<(), ConversionError> {
        let source = self.smart_address(space, value)?;
        assign(space, self.smart, address, source)
    }
}
