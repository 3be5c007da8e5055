//! C-string and `std::string` converters.

use tracing::warn;

use crossbind_core::{
    Address, CallContext, ConversionError, NativeStr, ObjectSpace, Parameter, PrimitiveKind,
    SlotValue, Value, address,
};

use super::{Converter, is_null_like, null_pointer};

/// `const char*`, `char*`, and `char[N]`.
///
/// With a fixed extent the member is an inline array; otherwise the member
/// is a pointer and reads and writes go through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CStringConverter {
    max_len: Option<usize>,
}

impl CStringConverter {
    pub fn new(max_len: Option<usize>) -> Self {
        Self { max_len }
    }
}

/// Longest prefix of `s` of at most `limit` bytes ending on a character
/// boundary.
fn truncate(s: &str, limit: usize) -> &str {
    if s.len() <= limit {
        return s;
    }
    let mut end = limit;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

impl Converter for CStringConverter {
    fn set_arg(&self, value: &Value, ctx: &mut CallContext<'_>) -> Result<Parameter, ConversionError> {
        match value {
            Value::Str(s) => {
                let s = match self.max_len {
                    Some(limit) if s.len() > limit => {
                        warn!(len = s.len(), limit, "string too long for char array (truncated)");
                        truncate(s, limit)
                    }
                    _ => s.as_str(),
                };
                Ok(Parameter::pointer(ctx.alloc_c_str(s)))
            }
            Value::Buffer(buffer) if buffer.kind().is_char() => Ok(Parameter::pointer(buffer.address())),
            other if is_null_like(other) => Ok(Parameter::pointer(Address::NULL)),
            other => Err(ConversionError::mismatch("str", other.type_name())),
        }
    }

    fn from_memory(&self, address: Address, _space: &ObjectSpace) -> Result<Value, ConversionError> {
        if address.is_null() {
            return Err(null_pointer());
        }
        match self.max_len {
            Some(limit) => {
                let bytes: Vec<u8> = (0..limit)
                    // SAFETY: the inline array spans `limit` bytes.
                    .map(|i| unsafe { address::read::<u8>(address.offset(i as isize)) })
                    .take_while(|b| *b != 0)
                    .collect();
                Ok(Value::Str(String::from_utf8_lossy(&bytes).into_owned()))
            }
            None => {
                // SAFETY: pointer members hold one pointer-sized word.
                let target = Address(unsafe { address::read::<usize>(address) });
                if target.is_null() {
                    return Ok(Value::None);
                }
                // SAFETY: non-null char pointers reference NUL-terminated text.
                Ok(Value::Str(unsafe { address::read_c_str(target) }))
            }
        }
    }

    fn to_memory(&self, value: &Value, address: Address, _space: &ObjectSpace) -> Result<(), ConversionError> {
        let Value::Str(s) = value else {
            return Err(ConversionError::mismatch("str", value.type_name()));
        };
        if address.is_null() {
            return Err(null_pointer());
        }
        let target = match self.max_len {
            Some(limit) if s.len() > limit => {
                return Err(ConversionError::TooLong { len: s.len(), limit });
            }
            Some(_) => address,
            // SAFETY: pointer members hold one pointer-sized word.
            None => Address(unsafe { address::read::<usize>(address) }),
        };
        if target.is_null() {
            return Err(null_pointer());
        }
        // SAFETY: the target buffer is at least as large as the string it
        // is being overwritten with, as for `strcpy`.
        unsafe {
            std::ptr::copy_nonoverlapping(s.as_ptr(), target.as_ptr::<u8>(), s.len());
            if self.max_len.is_none_or(|limit| s.len() < limit) {
                address::write(target.offset(s.len() as isize), 0u8);
            }
        }
        Ok(())
    }
}

/// `std::string` and `std::string_view`, by value or const reference.
///
/// Arguments are materialized as native string objects in the call arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StdStringConverter;

impl Converter for StdStringConverter {
    fn set_arg(&self, value: &Value, ctx: &mut CallContext<'_>) -> Result<Parameter, ConversionError> {
        match value {
            Value::Str(s) => {
                let object = ctx.alloc_native_str(s);
                Ok(Parameter::const_ref(SlotValue::Address(object), object))
            }
            Value::Buffer(buffer) if buffer.kind() == PrimitiveKind::Char => {
                let text: String = buffer
                    .to_vec()
                    .into_iter()
                    .filter_map(|c| c.as_str().map(str::to_string))
                    .collect();
                let object = ctx.alloc_native_str(&text);
                Ok(Parameter::const_ref(SlotValue::Address(object), object))
            }
            other => Err(ConversionError::mismatch("str", other.type_name())),
        }
    }

    fn from_memory(&self, address: Address, _space: &ObjectSpace) -> Result<Value, ConversionError> {
        if address.is_null() {
            return Err(null_pointer());
        }
        // SAFETY: string members are native string objects.
        let native = unsafe { address::read::<NativeStr>(address) };
        // SAFETY: a live native string references `len` readable bytes.
        Ok(Value::Str(unsafe { native.to_string_lossy() }))
    }

    fn to_memory(&self, value: &Value, address: Address, _space: &ObjectSpace) -> Result<(), ConversionError> {
        let Value::Str(s) = value else {
            return Err(ConversionError::mismatch("str", value.type_name()));
        };
        if address.is_null() {
            return Err(null_pointer());
        }
        // the native object owns its characters from here on
        let bytes: &'static [u8] = Box::leak(s.as_bytes().to_vec().into_boxed_slice());
        let native = NativeStr {
            ptr: bytes.as_ptr(),
            len: bytes.len(),
        };
        // SAFETY: as in `from_memory`.
        unsafe { address::write(address, native) };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crossbind_core::{Buffer, CallFlags, PassBy};

    use super::*;
    use crate::testing::{MockReflection, alloc};

    fn space() -> ObjectSpace {
        ObjectSpace::new(Arc::new(MockReflection::new()))
    }

    #[test]
    fn c_string_args_are_nul_terminated() {
        let space = space();
        let mut ctx = CallContext::new(&space, CallFlags::empty());
        let param = CStringConverter::new(None)
            .set_arg(&Value::from("hello"), &mut ctx)
            .unwrap();
        let at = param.value.as_address().unwrap();
        assert_eq!(unsafe { address::read_c_str(at) }, "hello");
        let param = CStringConverter::new(None).set_arg(&Value::None, &mut ctx).unwrap();
        assert_eq!(param.value.as_address(), Some(Address::NULL));
        assert!(CStringConverter::new(None).set_arg(&Value::Int(3), &mut ctx).is_err());
    }

    #[test]
    fn char_arrays_truncate_arguments() {
        let space = space();
        let mut ctx = CallContext::new(&space, CallFlags::empty());
        let param = CStringConverter::new(Some(3))
            .set_arg(&Value::from("abcdef"), &mut ctx)
            .unwrap();
        let at = param.value.as_address().unwrap();
        assert_eq!(unsafe { address::read_c_str(at) }, "abc");
        assert_eq!(truncate("héllo", 2), "h");
    }

    #[test]
    fn inline_char_array_roundtrip() {
        let space = space();
        let at = alloc(8);
        let conv = CStringConverter::new(Some(8));
        conv.to_memory(&Value::from("abc"), at, &space).unwrap();
        assert_eq!(conv.from_memory(at, &space).unwrap(), Value::from("abc"));
        conv.to_memory(&Value::from("abcdefgh"), at, &space).unwrap();
        assert_eq!(conv.from_memory(at, &space).unwrap(), Value::from("abcdefgh"));
        assert!(matches!(
            conv.to_memory(&Value::from("abcdefghi"), at, &space),
            Err(ConversionError::TooLong { len: 9, limit: 8 })
        ));
    }

    #[test]
    fn char_pointer_members_write_through() {
        let space = space();
        let storage = alloc(16);
        let member = alloc(8);
        let conv = CStringConverter::new(None);
        assert_eq!(conv.from_memory(member, &space).unwrap(), Value::None);
        unsafe { address::write(member, storage.0) };
        conv.to_memory(&Value::from("native"), member, &space).unwrap();
        assert_eq!(conv.from_memory(member, &space).unwrap(), Value::from("native"));
        assert_eq!(unsafe { address::read_c_str(storage) }, "native");
    }

    #[test]
    fn std_string_args_and_members() {
        let space = space();
        let mut ctx = CallContext::new(&space, CallFlags::empty());
        let param = StdStringConverter.set_arg(&Value::from("text"), &mut ctx).unwrap();
        assert_eq!(param.pass, PassBy::ConstRef);
        let object = param.back_ref.unwrap();
        assert_eq!(StdStringConverter.from_memory(object, &space).unwrap(), Value::from("text"));

        let member = alloc(16);
        StdStringConverter.to_memory(&Value::from("stored"), member, &space).unwrap();
        assert_eq!(StdStringConverter.from_memory(member, &space).unwrap(), Value::from("stored"));
    }

    #[test]
    fn std_string_from_char_buffer() {
        let space = space();
        let mut ctx = CallContext::new(&space, CallFlags::empty());
        let buffer = Buffer::from_values(PrimitiveKind::Char, &[Value::from("o"), Value::from("k")]).unwrap();
        let param = StdStringConverter.set_arg(&Value::Buffer(buffer), &mut ctx).unwrap();
        assert_eq!(
            StdStringConverter.from_memory(param.back_ref.unwrap(), &space).unwrap(),
            Value::from("ok")
        );
    }
}
