//! Argument and data-member converters.
//!
//! A [`Converter`] handles one native type string. It turns a host value
//! into an argument slot for a call ([`Converter::set_arg`]) and moves
//! values between the host and native memory for data members
//! ([`Converter::from_memory`], [`Converter::to_memory`]).
//!
//! ## Key Types
//!
//! - [`Converter`]: the conversion interface
//! - [`ConverterRegistry`]: lookup by type string, cached per registry
//!
//! ## Lookup
//!
//! [`ConverterRegistry::get`] tries, in order: the exact string among the
//! builtins, the typedef-resolved string, `const <base><suffix>`,
//! `<base><suffix>`, and for arrays `<base>*`. Failing that it synthesizes a
//! converter for a known class or enum, maps function pointers to `void*`,
//! and finally falls back to an opaque address converter for
//! pointer-bearing types or an always-failing one for everything else.

mod numeric;
mod object;
mod pointer;
mod string;

use std::fmt;
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::trace;

use crossbind_core::type_name::{self, Compound};
use crossbind_core::{
    Address, CallContext, ConversionError, ObjectSpace, Parameter, PrimitiveKind, Reflection,
    Value, WarnOnce,
};

use crate::lookup::{INTEGER_ALIASES, TypeKey, smart_pointee};

pub use numeric::{NumericArrayConverter, NumericConverter, NumericRefConverter};
pub use object::{
    ObjectArrayConverter, ObjectMoveConverter, ObjectPtrConverter, ObjectPtrPtrConverter,
    ObjectRefConverter, ObjectValueConverter, SmartPtrConverter,
};
pub(crate) use object::{assign, cast_object};
pub use pointer::{
    FailingConverter, NotImplementedConverter, VoidPtrConverter, VoidPtrPtrConverter,
    VoidPtrRefConverter,
};
pub use string::{CStringConverter, StdStringConverter};

/// Conversion for one native type.
///
/// Failures are local: the dispatcher records them and moves on to the next
/// overload.
pub trait Converter: Send + Sync + fmt::Debug {
    /// Fill the argument slot for `value`.
    fn set_arg(
        &self,
        value: &Value,
        ctx: &mut CallContext<'_>,
    ) -> Result<Parameter, ConversionError>;

    /// Read a host value from native memory at `address`.
    fn from_memory(&self, _address: Address, _space: &ObjectSpace) -> Result<Value, ConversionError> {
        Err(ConversionError::NotImplemented(format!("{self:?}: read from memory")))
    }

    /// Store `value` into native memory at `address`.
    fn to_memory(
        &self,
        _value: &Value,
        _address: Address,
        _space: &ObjectSpace,
    ) -> Result<(), ConversionError> {
        Err(ConversionError::NotImplemented(format!("{self:?}: write to memory")))
    }
}

/// Null-like host values accepted wherever a native pointer is.
pub(crate) fn is_null_like(value: &Value) -> bool {
    matches!(
        value,
        Value::None | Value::NullPtr | Value::Int(0) | Value::Address(Address::NULL)
    )
}

pub(crate) fn null_pointer() -> ConversionError {
    ConversionError::InvalidValue("attempt to access a null-pointer".into())
}

// ============================================================================
// Builtin factories
// ============================================================================

type Factory = Box<dyn Fn(Option<usize>) -> Arc<dyn Converter> + Send + Sync>;

lazy_static! {
    static ref BUILTINS: FxHashMap<String, Factory> = builtin_factories();
}

fn insert<C: Converter + 'static>(
    table: &mut FxHashMap<String, Factory>,
    name: impl Into<String>,
    make: impl Fn(Option<usize>) -> C + Send + Sync + 'static,
) {
    table.insert(
        name.into(),
        Box::new(move |size| Arc::new(make(size)) as Arc<dyn Converter>),
    );
}

fn insert_numeric(table: &mut FxHashMap<String, Factory>, name: &str, kind: PrimitiveKind) {
    insert(table, name, move |_| NumericConverter::new(kind));
    insert(table, format!("const {name}&"), move |_| NumericConverter::const_ref(kind));
    insert(table, format!("{name}&"), move |_| NumericRefConverter::new(kind));
    insert(table, format!("{name}*"), move |size| NumericArrayConverter::new(kind, size));
}

fn builtin_factories() -> FxHashMap<String, Factory> {
    let mut table = FxHashMap::default();
    for kind in PrimitiveKind::ALL {
        insert_numeric(&mut table, kind.name(), kind);
    }
    for alias in INTEGER_ALIASES {
        if let Some(kind) = PrimitiveKind::from_name(alias) {
            insert_numeric(&mut table, alias, kind);
        }
    }

    // c-strings take precedence over char arrays
    insert(&mut table, "const char*", CStringConverter::new);
    insert(&mut table, "char*", CStringConverter::new);

    for name in [
        "std::string",
        "const std::string&",
        "std::basic_string<char>",
        "const std::basic_string<char>&",
        "std::string_view",
        "const std::string_view&",
    ] {
        insert(&mut table, name, |_| StdStringConverter);
    }

    insert(&mut table, "void*", |_| VoidPtrConverter::new(true));
    insert(&mut table, "std::nullptr_t", |_| VoidPtrConverter::new(true));
    insert(&mut table, "void*&", |_| VoidPtrRefConverter);
    insert(&mut table, "void**", |_| VoidPtrPtrConverter);
    table
}

/// Builtin converter registered under exactly `name`.
pub fn builtin(name: &str, size: Option<usize>) -> Option<Arc<dyn Converter>> {
    BUILTINS.get(name).map(|make| make(size))
}

// ============================================================================
// Registry
// ============================================================================

/// Converter lookup with a per-registry cache of resolved types.
pub struct ConverterRegistry {
    reflection: Arc<dyn Reflection>,
    cache: RwLock<FxHashMap<(String, Option<usize>), Arc<dyn Converter>>>,
    diagnostics: WarnOnce,
}

impl ConverterRegistry {
    pub fn new(reflection: Arc<dyn Reflection>, warn_unknown: bool) -> Self {
        Self {
            reflection,
            cache: RwLock::new(FxHashMap::default()),
            diagnostics: WarnOnce::new(warn_unknown),
        }
    }

    /// Converter for type `name`; `size` overrides the extent of an array
    /// declarator and limits c-string buffers.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn get(&self, name: &str, size: Option<usize>) -> Arc<dyn Converter> {
        let size = size.or_else(|| type_name::array_size(name));
        if let Some(converter) = self.cache.read().get(&(name.to_string(), size)) {
            return Arc::clone(converter);
        }
        // Keyed by the typedef-resolved name; aliases share an entry.
        let key = (self.reflection.resolve_name(name), size);
        if let Some(converter) = self.cache.read().get(&key) {
            return Arc::clone(converter);
        }
        let converter = self.lookup(name, size);
        trace!(name, resolved = %key.0, ?converter, "resolved converter");
        Arc::clone(self.cache.write().entry(key).or_insert(converter))
    }

    /// Number of cached resolutions.
    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }

    fn lookup(&self, full: &str, size: Option<usize>) -> Arc<dyn Converter> {
        if let Some(converter) = builtin(full, size) {
            return converter;
        }
        let key = TypeKey::parse(self.reflection.as_ref(), full);
        if key.resolved != full
            && let Some(converter) = builtin(&key.resolved, size)
        {
            return converter;
        }
        if key.is_const
            && let Some(converter) = builtin(&key.const_key(), size)
        {
            return converter;
        }
        if let Some(converter) = builtin(&key.plain_key(), size) {
            return converter;
        }
        if key.compound == Compound::Array
            && let Some(converter) = builtin(&format!("{}*", key.real), size)
        {
            return converter;
        }
        if let Some(converter) = self.class_converter(&key, size) {
            return converter;
        }
        if self.reflection.is_enum(&key.real) {
            let alias = match key.compound {
                Compound::Reference if key.is_const => "const long&",
                Compound::Reference => "long&",
                Compound::Pointer | Compound::Array => "unsigned int*",
                _ => "unsigned int",
            };
            if let Some(converter) = builtin(alias, size) {
                return converter;
            }
        }
        if type_name::is_function_pointer(&key.resolved) {
            return Arc::new(VoidPtrConverter::new(true));
        }
        match key.compound {
            Compound::RValueRef => Arc::new(NotImplementedConverter::new(full)),
            Compound::Value => {
                self.diagnostics.warn(full, || {
                    format!("cannot convert arguments of unknown type \"{full}\"")
                });
                Arc::new(FailingConverter::new(full))
            }
            _ => {
                self.diagnostics.warn(full, || {
                    format!("unknown type \"{full}\" passed as an opaque pointer")
                });
                Arc::new(VoidPtrConverter::new(true))
            }
        }
    }

    fn class_converter(&self, key: &TypeKey, size: Option<usize>) -> Option<Arc<dyn Converter>> {
        let reflection = self.reflection.as_ref();
        let class = reflection.scope(&key.real)?;
        if reflection.is_namespace(class) {
            return None;
        }
        if reflection.is_smart_ptr(class)
            && let Some((deref, pointee)) = smart_pointee(reflection, class)
        {
            return Some(Arc::new(SmartPtrConverter::new(class, deref, pointee, key.compound)));
        }
        let keep_control = key.compound == Compound::Reference || key.is_const;
        Some(match key.compound {
            Compound::Value => Arc::new(ObjectValueConverter::new(class)),
            Compound::Reference => Arc::new(ObjectRefConverter::new(class)),
            Compound::Pointer => Arc::new(ObjectPtrConverter::new(class, keep_control)),
            Compound::RValueRef => Arc::new(ObjectMoveConverter::new(class)),
            Compound::PtrPtr => Arc::new(ObjectPtrPtrConverter::new(class, false)),
            Compound::PtrRef => Arc::new(ObjectPtrPtrConverter::new(class, true)),
            Compound::Array => Arc::new(ObjectArrayConverter::new(class, size)),
            Compound::Other => return None,
        })
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("cached", &self.cached())
            .finish_non_exhaustive()
    }
}
