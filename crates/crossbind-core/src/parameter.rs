//! Argument slots passed to native calls.
//!
//! A [`Parameter`] is the fixed-shape slot a converter fills for one formal
//! argument. The interpretation of the slot is not stored separately: the
//! [`TypeCode`] is derived from the slot's value variant and its [`PassBy`]
//! mode, so the two can never disagree.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::address::{self, Address};

// ============================================================================
// Slot values
// ============================================================================

/// The payload of one argument or return slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlotValue {
    Bool(bool),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    /// Extended precision is carried as `f64`.
    LongDouble(f64),
    Address(Address),
}

impl SlotValue {
    /// Integer view of the slot, if it holds an integer or bool.
    pub fn as_i128(self) -> Option<i128> {
        Some(match self {
            SlotValue::Bool(v) => v as i128,
            SlotValue::Int8(v) => v as i128,
            SlotValue::UInt8(v) => v as i128,
            SlotValue::Int16(v) => v as i128,
            SlotValue::UInt16(v) => v as i128,
            SlotValue::Int32(v) => v as i128,
            SlotValue::UInt32(v) => v as i128,
            SlotValue::Int64(v) => v as i128,
            SlotValue::UInt64(v) => v as i128,
            _ => return None,
        })
    }

    pub fn as_f64(self) -> Option<f64> {
        match self {
            SlotValue::Float32(v) => Some(v as f64),
            SlotValue::Float64(v) | SlotValue::LongDouble(v) => Some(v),
            other => other.as_i128().map(|v| v as f64),
        }
    }

    pub fn as_address(self) -> Option<Address> {
        match self {
            SlotValue::Address(a) => Some(a),
            _ => None,
        }
    }

    /// Store the slot's payload at `target` using its own width.
    ///
    /// # Safety
    ///
    /// `target` must be valid for a write of the payload's width.
    pub unsafe fn write_to(self, target: Address) {
        // SAFETY: guaranteed by the caller.
        unsafe {
            match self {
                SlotValue::Bool(v) => address::write(target, v as u8),
                SlotValue::Int8(v) => address::write(target, v),
                SlotValue::UInt8(v) => address::write(target, v),
                SlotValue::Int16(v) => address::write(target, v),
                SlotValue::UInt16(v) => address::write(target, v),
                SlotValue::Int32(v) => address::write(target, v),
                SlotValue::UInt32(v) => address::write(target, v),
                SlotValue::Int64(v) => address::write(target, v),
                SlotValue::UInt64(v) => address::write(target, v),
                SlotValue::Float32(v) => address::write(target, v),
                SlotValue::Float64(v) | SlotValue::LongDouble(v) => address::write(target, v),
                SlotValue::Address(v) => address::write(target, v.0),
            }
        }
    }
}

// ============================================================================
// Passing modes and type codes
// ============================================================================

/// How the native callee receives the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassBy {
    Value,
    /// Value copied into the call's scratch arena; the callee gets its address.
    ConstRef,
    /// Address of caller-visible storage the callee may write through.
    Ref,
    Pointer,
    /// Address of an object the callee may move from.
    Move,
}

/// One-character tag selecting how the native side interprets a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum TypeCode {
    Bool = b'?',
    Int8 = b'b',
    UInt8 = b'B',
    Int16 = b'h',
    UInt16 = b'H',
    Int32 = b'i',
    UInt32 = b'I',
    Int64 = b'q',
    UInt64 = b'Q',
    Float32 = b'f',
    Float64 = b'd',
    LongDouble = b'g',
    Pointer = b'p',
    ConstRef = b'r',
    Buffer = b'V',
    Move = b'm',
}

impl TypeCode {
    #[inline]
    pub fn as_char(self) -> char {
        u8::from(self) as char
    }
}

// ============================================================================
// Parameter
// ============================================================================

/// One argument slot of a native call.
///
/// Only valid for the duration of the call that produced it: const-reference
/// slots point into that call's scratch arena.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parameter {
    pub value: SlotValue,
    pub pass: PassBy,
    /// Storage the callee sees for by-reference passing.
    pub back_ref: Option<Address>,
}

impl Parameter {
    pub fn by_value(value: SlotValue) -> Self {
        Self {
            value,
            pass: PassBy::Value,
            back_ref: None,
        }
    }

    /// `value` has been copied to `scratch`.
    pub fn const_ref(value: SlotValue, scratch: Address) -> Self {
        Self {
            value,
            pass: PassBy::ConstRef,
            back_ref: Some(scratch),
        }
    }

    pub fn by_ref(storage: Address) -> Self {
        Self {
            value: SlotValue::Address(storage),
            pass: PassBy::Ref,
            back_ref: Some(storage),
        }
    }

    pub fn pointer(target: Address) -> Self {
        Self {
            value: SlotValue::Address(target),
            pass: PassBy::Pointer,
            back_ref: None,
        }
    }

    pub fn moved(target: Address) -> Self {
        Self {
            value: SlotValue::Address(target),
            pass: PassBy::Move,
            back_ref: None,
        }
    }

    pub fn type_code(&self) -> TypeCode {
        match self.pass {
            PassBy::ConstRef => TypeCode::ConstRef,
            PassBy::Ref => TypeCode::Buffer,
            PassBy::Pointer => TypeCode::Pointer,
            PassBy::Move => TypeCode::Move,
            PassBy::Value => match self.value {
                SlotValue::Bool(_) => TypeCode::Bool,
                SlotValue::Int8(_) => TypeCode::Int8,
                SlotValue::UInt8(_) => TypeCode::UInt8,
                SlotValue::Int16(_) => TypeCode::Int16,
                SlotValue::UInt16(_) => TypeCode::UInt16,
                SlotValue::Int32(_) => TypeCode::Int32,
                SlotValue::UInt32(_) => TypeCode::UInt32,
                SlotValue::Int64(_) => TypeCode::Int64,
                SlotValue::UInt64(_) => TypeCode::UInt64,
                SlotValue::Float32(_) => TypeCode::Float32,
                SlotValue::Float64(_) => TypeCode::Float64,
                SlotValue::LongDouble(_) => TypeCode::LongDouble,
                SlotValue::Address(_) => TypeCode::Pointer,
            },
        }
    }

    /// The slot as the native callee receives it.
    pub fn native_arg(&self) -> SlotValue {
        match (self.pass, self.back_ref) {
            (PassBy::ConstRef, Some(scratch)) => SlotValue::Address(scratch),
            _ => self.value,
        }
    }
}
