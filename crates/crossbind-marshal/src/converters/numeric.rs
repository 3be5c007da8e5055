//! Primitive converters: by value, by const reference, by mutable
//! reference, and as pointers to primitive arrays.

use crossbind_core::{
    Address, CallContext, ConversionError, ObjectSpace, Parameter, PrimitiveKind, Value, address,
};

use super::{Converter, is_null_like, null_pointer};

/// By-value and by-const-reference primitives.
///
/// Const-reference arguments are copied into the call's arena and the slot
/// holds the copy's address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericConverter {
    kind: PrimitiveKind,
    const_ref: bool,
}

impl NumericConverter {
    pub fn new(kind: PrimitiveKind) -> Self {
        Self {
            kind,
            const_ref: false,
        }
    }

    pub fn const_ref(kind: PrimitiveKind) -> Self {
        Self {
            kind,
            const_ref: true,
        }
    }

    pub fn kind(&self) -> PrimitiveKind {
        self.kind
    }
}

impl Converter for NumericConverter {
    fn set_arg(&self, value: &Value, ctx: &mut CallContext<'_>) -> Result<Parameter, ConversionError> {
        let slot = self.kind.to_slot(value)?;
        if self.const_ref {
            Ok(Parameter::const_ref(slot, ctx.alloc_slot(slot)))
        } else {
            Ok(Parameter::by_value(slot))
        }
    }

    fn from_memory(&self, address: Address, _space: &ObjectSpace) -> Result<Value, ConversionError> {
        read_value(self.kind, address)
    }

    fn to_memory(&self, value: &Value, address: Address, _space: &ObjectSpace) -> Result<(), ConversionError> {
        write_value(self.kind, value, address)
    }
}

fn read_value(kind: PrimitiveKind, address: Address) -> Result<Value, ConversionError> {
    if address.is_null() {
        return Err(null_pointer());
    }
    // SAFETY: the reflection service hands out addresses of live members.
    Ok(kind.to_value(unsafe { kind.read(address) }))
}

fn write_value(kind: PrimitiveKind, value: &Value, address: Address) -> Result<(), ConversionError> {
    if address.is_null() {
        return Err(null_pointer());
    }
    let slot = kind.to_slot(value)?;
    // SAFETY: as for `read_value`.
    unsafe { slot.write_to(address) };
    Ok(())
}

/// Primitives passed by mutable reference.
///
/// The callee writes through the slot, so the host must supply storage it
/// can observe afterwards: a [`Buffer`](crossbind_core::Buffer) of exactly
/// this kind. Plain host numbers are rejected rather than silently copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericRefConverter {
    kind: PrimitiveKind,
}

impl NumericRefConverter {
    pub fn new(kind: PrimitiveKind) -> Self {
        Self { kind }
    }
}

impl Converter for NumericRefConverter {
    fn set_arg(&self, value: &Value, _ctx: &mut CallContext<'_>) -> Result<Parameter, ConversionError> {
        match value {
            Value::Buffer(buffer) if buffer.kind() != self.kind => Err(ConversionError::BufferKind {
                expected: self.kind.name(),
                actual: buffer.kind().name(),
            }),
            Value::Buffer(buffer) if buffer.is_empty() => Err(ConversionError::InvalidValue(
                "empty buffer passed by reference".into(),
            )),
            Value::Buffer(buffer) => Ok(Parameter::by_ref(buffer.address())),
            other => Err(ConversionError::mismatch("buffer", other.type_name())),
        }
    }

    fn from_memory(&self, address: Address, _space: &ObjectSpace) -> Result<Value, ConversionError> {
        read_value(self.kind, address)
    }

    fn to_memory(&self, value: &Value, address: Address, _space: &ObjectSpace) -> Result<(), ConversionError> {
        write_value(self.kind, value, address)
    }
}

/// Pointers to primitives, and fixed-size primitive arrays.
///
/// Arguments must be a buffer of the same kind (or null). In memory, a
/// fixed-size array is stored inline while a pointer member stores the
/// address of its elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericArrayConverter {
    kind: PrimitiveKind,
    size: Option<usize>,
}

impl NumericArrayConverter {
    pub fn new(kind: PrimitiveKind, size: Option<usize>) -> Self {
        Self { kind, size }
    }

    fn element(&self, base: Address, index: usize) -> Address {
        base.offset((index * self.kind.size()) as isize)
    }
}

impl Converter for NumericArrayConverter {
    fn set_arg(&self, value: &Value, _ctx: &mut CallContext<'_>) -> Result<Parameter, ConversionError> {
        match value {
            Value::Buffer(buffer) if buffer.kind() == self.kind => Ok(Parameter::pointer(buffer.address())),
            Value::Buffer(buffer) => Err(ConversionError::BufferKind {
                expected: self.kind.name(),
                actual: buffer.kind().name(),
            }),
            Value::Address(target) => Ok(Parameter::pointer(*target)),
            other if is_null_like(other) => Ok(Parameter::pointer(Address::NULL)),
            other => Err(ConversionError::mismatch("buffer", other.type_name())),
        }
    }

    fn from_memory(&self, address: Address, _space: &ObjectSpace) -> Result<Value, ConversionError> {
        if address.is_null() {
            return Err(null_pointer());
        }
        match self.size {
            Some(len) => Ok(Value::Tuple(
                (0..len)
                    // SAFETY: inline arrays span `len` elements at `address`.
                    .map(|i| self.kind.to_value(unsafe { self.kind.read(self.element(address, i)) }))
                    .collect(),
            )),
            None => {
                // SAFETY: a pointer member holds one pointer-sized word.
                let target = Address(unsafe { address::read::<usize>(address) });
                Ok(if target.is_null() {
                    Value::NullPtr
                } else {
                    Value::Address(target)
                })
            }
        }
    }

    fn to_memory(&self, value: &Value, address: Address, _space: &ObjectSpace) -> Result<(), ConversionError> {
        if address.is_null() {
            return Err(null_pointer());
        }
        let Some(limit) = self.size else {
            let target = match value {
                Value::Buffer(buffer) if buffer.kind() == self.kind => buffer.address(),
                Value::Address(target) => *target,
                other if is_null_like(other) => Address::NULL,
                other => return Err(ConversionError::mismatch("buffer", other.type_name())),
            };
            // SAFETY: as in `from_memory`.
            unsafe { address::write(address, target.0) };
            return Ok(());
        };
        let items = match value {
            Value::Tuple(items) => items.clone(),
            Value::Buffer(buffer) => buffer.to_vec(),
            other => return Err(ConversionError::mismatch("tuple", other.type_name())),
        };
        if items.len() > limit {
            return Err(ConversionError::TooLong {
                len: items.len(),
                limit,
            });
        }
        let slots = items
            .iter()
            .map(|item| self.kind.to_slot(item))
            .collect::<Result<Vec<_>, _>>()?;
        for (i, slot) in slots.into_iter().enumerate() {
            // SAFETY: `i < limit`, within the inline array.
            unsafe { slot.write_to(self.element(address, i)) };
        }
        Ok(())
    }
}
