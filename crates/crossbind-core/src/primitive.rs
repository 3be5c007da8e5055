//! Native primitive kinds and their host conversions.
//!
//! Every numeric converter and executor is parameterized by a
//! [`PrimitiveKind`]. The kind knows its width, its accepted range, how to
//! read and write itself in native memory, and how host values map onto it.

use crate::address::{self, Address};
use crate::error::ConversionError;
use crate::parameter::SlotValue;
use crate::value::Value;

/// A native primitive type. Sizes follow an LP64 data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Bool,
    Char,
    SChar,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    LongLong,
    ULongLong,
    Float,
    Double,
    LongDouble,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 15] = [
        PrimitiveKind::Bool,
        PrimitiveKind::Char,
        PrimitiveKind::SChar,
        PrimitiveKind::UChar,
        PrimitiveKind::Short,
        PrimitiveKind::UShort,
        PrimitiveKind::Int,
        PrimitiveKind::UInt,
        PrimitiveKind::Long,
        PrimitiveKind::ULong,
        PrimitiveKind::LongLong,
        PrimitiveKind::ULongLong,
        PrimitiveKind::Float,
        PrimitiveKind::Double,
        PrimitiveKind::LongDouble,
    ];

    /// Kind of a builtin type name, fixed-width aliases included.
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(kind) = Self::ALL.into_iter().find(|k| k.name() == name) {
            return Some(kind);
        }
        Some(match name {
            "int8_t" => PrimitiveKind::SChar,
            "uint8_t" => PrimitiveKind::UChar,
            "int16_t" | "short int" => PrimitiveKind::Short,
            "uint16_t" | "unsigned short int" => PrimitiveKind::UShort,
            "int32_t" | "signed" | "signed int" => PrimitiveKind::Int,
            "uint32_t" | "unsigned" => PrimitiveKind::UInt,
            "int64_t" | "long int" | "ssize_t" | "ptrdiff_t" | "intptr_t" => PrimitiveKind::Long,
            "uint64_t" | "unsigned long int" | "size_t" | "uintptr_t" => PrimitiveKind::ULong,
            "long long int" => PrimitiveKind::LongLong,
            "unsigned long long int" => PrimitiveKind::ULongLong,
            _ => return None,
        })
    }

    /// The native spelling of this type.
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::Char => "char",
            PrimitiveKind::SChar => "signed char",
            PrimitiveKind::UChar => "unsigned char",
            PrimitiveKind::Short => "short",
            PrimitiveKind::UShort => "unsigned short",
            PrimitiveKind::Int => "int",
            PrimitiveKind::UInt => "unsigned int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::ULong => "unsigned long",
            PrimitiveKind::LongLong => "long long",
            PrimitiveKind::ULongLong => "unsigned long long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
            PrimitiveKind::LongDouble => "long double",
        }
    }

    pub fn size(self) -> usize {
        match self {
            PrimitiveKind::Bool
            | PrimitiveKind::Char
            | PrimitiveKind::SChar
            | PrimitiveKind::UChar => 1,
            PrimitiveKind::Short | PrimitiveKind::UShort => 2,
            PrimitiveKind::Int | PrimitiveKind::UInt | PrimitiveKind::Float => 4,
            PrimitiveKind::Long
            | PrimitiveKind::ULong
            | PrimitiveKind::LongLong
            | PrimitiveKind::ULongLong
            | PrimitiveKind::Double
            | PrimitiveKind::LongDouble => 8,
        }
    }

    pub fn is_floating(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Float | PrimitiveKind::Double | PrimitiveKind::LongDouble
        )
    }

    pub fn is_char(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Char | PrimitiveKind::SChar | PrimitiveKind::UChar
        )
    }

    /// Inclusive range of an integral kind.
    fn int_range(self) -> (i128, i128) {
        match self {
            PrimitiveKind::Bool => (0, 1),
            PrimitiveKind::Char | PrimitiveKind::SChar => (i8::MIN as i128, i8::MAX as i128),
            PrimitiveKind::UChar => (0, u8::MAX as i128),
            PrimitiveKind::Short => (i16::MIN as i128, i16::MAX as i128),
            PrimitiveKind::UShort => (0, u16::MAX as i128),
            PrimitiveKind::Int => (i32::MIN as i128, i32::MAX as i128),
            PrimitiveKind::UInt => (0, u32::MAX as i128),
            PrimitiveKind::Long | PrimitiveKind::LongLong => (i64::MIN as i128, i64::MAX as i128),
            PrimitiveKind::ULong | PrimitiveKind::ULongLong => (0, u64::MAX as i128),
            PrimitiveKind::Float | PrimitiveKind::Double | PrimitiveKind::LongDouble => {
                (i128::MIN, i128::MAX)
            }
        }
    }

    /// Build the slot for an in-range integer.
    fn int_slot(self, v: i128) -> SlotValue {
        match self {
            PrimitiveKind::Bool => SlotValue::Bool(v != 0),
            PrimitiveKind::Char | PrimitiveKind::SChar => SlotValue::Int8(v as i8),
            PrimitiveKind::UChar => SlotValue::UInt8(v as u8),
            PrimitiveKind::Short => SlotValue::Int16(v as i16),
            PrimitiveKind::UShort => SlotValue::UInt16(v as u16),
            PrimitiveKind::Int => SlotValue::Int32(v as i32),
            PrimitiveKind::UInt => SlotValue::UInt32(v as u32),
            PrimitiveKind::Long | PrimitiveKind::LongLong => SlotValue::Int64(v as i64),
            PrimitiveKind::ULong | PrimitiveKind::ULongLong => SlotValue::UInt64(v as u64),
            PrimitiveKind::Float => SlotValue::Float32(v as f32),
            PrimitiveKind::Double => SlotValue::Float64(v as f64),
            PrimitiveKind::LongDouble => SlotValue::LongDouble(v as f64),
        }
    }

    fn float_slot(self, v: f64) -> SlotValue {
        match self {
            PrimitiveKind::Float => SlotValue::Float32(v as f32),
            PrimitiveKind::LongDouble => SlotValue::LongDouble(v),
            _ => SlotValue::Float64(v),
        }
    }

    fn checked(self, v: i128) -> Result<SlotValue, ConversionError> {
        let (lo, hi) = self.int_range();
        if v < lo || v > hi {
            return Err(ConversionError::OutOfRange {
                value: v.to_string(),
                target: self.name(),
            });
        }
        Ok(self.int_slot(v))
    }

    /// Convert a host value into a slot of this kind.
    ///
    /// Integral kinds reject floats rather than truncating them, `bool`
    /// accepts only booleans and the integers 0 and 1, and the char kinds
    /// additionally accept one-character strings.
    pub fn to_slot(self, value: &Value) -> Result<SlotValue, ConversionError> {
        match self {
            PrimitiveKind::Bool => match value {
                Value::Bool(b) => Ok(SlotValue::Bool(*b)),
                Value::Int(0) | Value::UInt(0) => Ok(SlotValue::Bool(false)),
                Value::Int(1) | Value::UInt(1) => Ok(SlotValue::Bool(true)),
                Value::Int(_) | Value::UInt(_) => Err(ConversionError::InvalidValue(
                    "boolean value should be bool, or integer 1 or 0".into(),
                )),
                other => Err(ConversionError::mismatch("bool", other.type_name())),
            },
            PrimitiveKind::Char | PrimitiveKind::SChar | PrimitiveKind::UChar => match value {
                // One-character strings carry the raw byte, as `to_value` produces.
                Value::Str(s) => {
                    let mut chars = s.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) if (c as u32) <= u8::MAX as u32 => {
                            Ok(self.int_slot(c as u32 as u8 as i8 as i128))
                        }
                        (Some(c), None) => Err(ConversionError::OutOfRange {
                            value: format!("{c:?}"),
                            target: self.name(),
                        }),
                        _ => Err(ConversionError::InvalidValue(format!(
                            "{} expected, got string of size {}",
                            self.name(),
                            s.chars().count()
                        ))),
                    }
                }
                other => self.checked(integral(other, self.name())?),
            },
            PrimitiveKind::Float | PrimitiveKind::Double | PrimitiveKind::LongDouble => {
                match value {
                    Value::Float(f) => Ok(self.float_slot(*f)),
                    Value::Int(i) => Ok(self.float_slot(*i as f64)),
                    Value::UInt(u) => Ok(self.float_slot(*u as f64)),
                    Value::Bool(b) => Ok(self.float_slot(*b as u8 as f64)),
                    other => Err(ConversionError::mismatch("float", other.type_name())),
                }
            }
            _ => self.checked(integral(value, self.name())?),
        }
    }

    /// Convert a slot of this kind back into a host value.
    pub fn to_value(self, slot: SlotValue) -> Value {
        if self.is_char()
            && let Some(code) = slot.as_i128()
        {
            let byte = code as u8;
            return Value::Str((byte as char).to_string());
        }
        match slot {
            SlotValue::Bool(b) => Value::Bool(b),
            SlotValue::Float32(v) => Value::Float(v as f64),
            SlotValue::Float64(v) | SlotValue::LongDouble(v) => Value::Float(v),
            SlotValue::Address(a) => Value::Address(a),
            SlotValue::UInt64(v) => Value::from_u64(v),
            other => Value::Int(other.as_i128().unwrap_or_default() as i64),
        }
    }

    /// Read a value of this kind from native memory.
    ///
    /// # Safety
    ///
    /// `at` must be valid for a read of [`size`](Self::size) bytes.
    pub unsafe fn read(self, at: Address) -> SlotValue {
        // SAFETY: guaranteed by the caller.
        unsafe {
            match self {
                PrimitiveKind::Bool => SlotValue::Bool(address::read::<u8>(at) != 0),
                PrimitiveKind::Char | PrimitiveKind::SChar => SlotValue::Int8(address::read(at)),
                PrimitiveKind::UChar => SlotValue::UInt8(address::read(at)),
                PrimitiveKind::Short => SlotValue::Int16(address::read(at)),
                PrimitiveKind::UShort => SlotValue::UInt16(address::read(at)),
                PrimitiveKind::Int => SlotValue::Int32(address::read(at)),
                PrimitiveKind::UInt => SlotValue::UInt32(address::read(at)),
                PrimitiveKind::Long | PrimitiveKind::LongLong => {
                    SlotValue::Int64(address::read(at))
                }
                PrimitiveKind::ULong | PrimitiveKind::ULongLong => {
                    SlotValue::UInt64(address::read(at))
                }
                PrimitiveKind::Float => SlotValue::Float32(address::read(at)),
                PrimitiveKind::Double => SlotValue::Float64(address::read(at)),
                PrimitiveKind::LongDouble => SlotValue::LongDouble(address::read(at)),
            }
        }
    }
}

/// Integer view of a host value; floats are rejected, not truncated.
fn integral(value: &Value, target: &'static str) -> Result<i128, ConversionError> {
    match value {
        Value::Int(i) => Ok(*i as i128),
        Value::UInt(u) => Ok(*u as i128),
        Value::Bool(b) => Ok(*b as i128),
        Value::Float(_) => Err(ConversionError::InvalidValue(format!(
            "{target} conversion expects an integer object, got float"
        ))),
        other => Err(ConversionError::mismatch(target, other.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_accepts_only_zero_and_one() {
        let kind = PrimitiveKind::Bool;
        assert_eq!(kind.to_slot(&Value::Int(1)).ok(), Some(SlotValue::Bool(true)));
        assert_eq!(kind.to_slot(&Value::Bool(false)).ok(), Some(SlotValue::Bool(false)));
        assert!(kind.to_slot(&Value::Int(2)).is_err());
        assert!(kind.to_slot(&Value::Float(1.0)).is_err());
    }

    #[test]
    fn integers_are_range_checked() {
        assert!(PrimitiveKind::Short.to_slot(&Value::Int(32767)).is_ok());
        let err = PrimitiveKind::Short.to_slot(&Value::Int(32768)).unwrap_err();
        assert!(matches!(err, ConversionError::OutOfRange { target: "short", .. }));
        assert!(PrimitiveKind::UInt.to_slot(&Value::Int(-1)).is_err());
        assert_eq!(
            PrimitiveKind::ULongLong.to_slot(&Value::UInt(u64::MAX)).ok(),
            Some(SlotValue::UInt64(u64::MAX))
        );
    }

    #[test]
    fn integers_reject_floats() {
        let err = PrimitiveKind::Long.to_slot(&Value::Float(1.5)).unwrap_err();
        assert!(matches!(err, ConversionError::InvalidValue(_)));
    }

    #[test]
    fn floats_accept_integers() {
        assert_eq!(
            PrimitiveKind::Double.to_slot(&Value::Int(2)).ok(),
            Some(SlotValue::Float64(2.0))
        );
        assert!(PrimitiveKind::Float.to_slot(&Value::Str("x".into())).is_err());
    }

    #[test]
    fn chars_accept_single_character_strings() {
        assert_eq!(
            PrimitiveKind::Char.to_slot(&Value::Str("a".into())).ok(),
            Some(SlotValue::Int8(b'a' as i8))
        );
        assert!(PrimitiveKind::Char.to_slot(&Value::Str("ab".into())).is_err());
        assert!(PrimitiveKind::Char.to_slot(&Value::Int(200)).is_err());
        assert!(PrimitiveKind::UChar.to_slot(&Value::Int(200)).is_ok());
        assert_eq!(
            PrimitiveKind::Char.to_value(SlotValue::Int8(b'z' as i8)),
            Value::Str("z".into())
        );
        assert!(PrimitiveKind::Char.to_slot(&Value::Str("\u{263a}".into())).is_err());
    }

    #[test]
    fn high_bit_chars_keep_their_byte() {
        let value = PrimitiveKind::Char.to_value(SlotValue::Int8(-23));
        assert_eq!(value, Value::Str("\u{e9}".into()));
        assert_eq!(PrimitiveKind::Char.to_slot(&value).ok(), Some(SlotValue::Int8(-23)));

        let value = PrimitiveKind::UChar.to_value(SlotValue::UInt8(0xe9));
        assert_eq!(PrimitiveKind::UChar.to_slot(&value).ok(), Some(SlotValue::UInt8(0xe9)));
    }

    #[test]
    fn names_and_aliases() {
        assert_eq!(PrimitiveKind::from_name("unsigned short"), Some(PrimitiveKind::UShort));
        assert_eq!(PrimitiveKind::from_name("size_t"), Some(PrimitiveKind::ULong));
        assert_eq!(PrimitiveKind::from_name("int8_t"), Some(PrimitiveKind::SChar));
        assert_eq!(PrimitiveKind::from_name("std::string"), None);
    }

    #[test]
    fn memory_roundtrip_is_bytewise() {
        let mut storage = [0u8; 8];
        let at = Address::from_ptr(storage.as_mut_ptr());
        for kind in PrimitiveKind::ALL {
            let slot = kind.to_slot(&Value::Int(1)).unwrap();
            unsafe {
                slot.write_to(at);
                assert_eq!(kind.read(at), slot, "{}", kind.name());
            }
        }
    }
}
