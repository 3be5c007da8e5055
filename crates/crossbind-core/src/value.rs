//! Dynamic host values.
//!
//! [`Value`] is what the host runtime hands to the dispatcher and what it
//! gets back. Native objects appear as [`Value::Object`] holding a
//! generation-checked [`ProxyHandle`]; caller-visible mutable storage for
//! by-reference arguments appears as a [`Buffer`].

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::address::Address;
use crate::error::ConversionError;
use crate::primitive::PrimitiveKind;
use crate::runtime::ProxyHandle;

/// A dynamically-typed host value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// The host's "no value" singleton.
    #[default]
    None,
    Bool(bool),
    Int(i64),
    /// Integers above `i64::MAX`.
    UInt(u64),
    Float(f64),
    Str(String),
    /// An opaque native address.
    Address(Address),
    /// The typed null-pointer singleton.
    NullPtr,
    Buffer(Buffer),
    Object(ProxyHandle),
    Tuple(Vec<Value>),
}

impl Value {
    /// Host type name, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::UInt(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Address(_) => "address",
            Value::NullPtr => "nullptr_t",
            Value::Buffer(_) => "buffer",
            Value::Object(_) => "object",
            Value::Tuple(_) => "tuple",
        }
    }

    pub fn from_u64(v: u64) -> Self {
        if v <= i64::MAX as u64 {
            Value::Int(v as i64)
        } else {
            Value::UInt(v)
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_object(&self) -> Option<ProxyHandle> {
        match self {
            Value::Object(handle) => Some(*handle),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

// ============================================================================
// Buffer
// ============================================================================

/// Typed, shared, address-stable primitive storage.
///
/// This is the interop protocol for pass-by-mutable-reference and primitive
/// arrays: the native callee receives [`address`](Buffer::address) and may
/// write through it, and the host observes the writes through the same
/// buffer afterwards. Clones share storage.
#[derive(Clone)]
pub struct Buffer {
    inner: Arc<BufferInner>,
}

struct BufferInner {
    kind: PrimitiveKind,
    len: usize,
    base: Address,
    words: Mutex<Box<[u64]>>,
}

impl Buffer {
    /// Zero-initialized buffer of `len` elements of `kind`.
    pub fn new(kind: PrimitiveKind, len: usize) -> Self {
        let bytes = kind.size() * len.max(1);
        let mut words = vec![0u64; bytes.div_ceil(8)].into_boxed_slice();
        let base = Address::from_ptr(words.as_mut_ptr());
        Self {
            inner: Arc::new(BufferInner {
                kind,
                len,
                base,
                words: Mutex::new(words),
            }),
        }
    }

    /// Buffer holding `values`, each converted with `kind`'s rules.
    pub fn from_values(kind: PrimitiveKind, values: &[Value]) -> Result<Self, ConversionError> {
        let buffer = Self::new(kind, values.len());
        for (i, v) in values.iter().enumerate() {
            buffer.set(i, v)?;
        }
        Ok(buffer)
    }

    pub fn kind(&self) -> PrimitiveKind {
        self.inner.kind
    }

    pub fn len(&self) -> usize {
        self.inner.len
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    /// Stable address of the first element.
    pub fn address(&self) -> Address {
        self.inner.base
    }

    fn element(&self, index: usize) -> Address {
        self.inner.base.offset((index * self.inner.kind.size()) as isize)
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        if index >= self.inner.len {
            return None;
        }
        let _guard = self.inner.words.lock();
        // SAFETY: index is in bounds and the storage outlives `self`.
        let slot = unsafe { self.inner.kind.read(self.element(index)) };
        Some(self.inner.kind.to_value(slot))
    }

    pub fn set(&self, index: usize, value: &Value) -> Result<(), ConversionError> {
        if index >= self.inner.len {
            return Err(ConversionError::InvalidValue(format!(
                "buffer index {index} out of range for length {}",
                self.inner.len
            )));
        }
        let slot = self.inner.kind.to_slot(value)?;
        let _guard = self.inner.words.lock();
        // SAFETY: index is in bounds and the storage outlives `self`.
        unsafe { slot.write_to(self.element(index)) };
        Ok(())
    }

    pub fn to_vec(&self) -> Vec<Value> {
        (0..self.inner.len).filter_map(|i| self.get(i)).collect()
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("kind", &self.inner.kind.name())
            .field("len", &self.inner.len)
            .field("address", &self.inner.base)
            .finish()
    }
}
