//! Result executors.
//!
//! An [`Executor`] performs the native call for one return type and turns
//! the raw result into a host value: numbers and strings are copied out,
//! class results are bound to proxies with the ownership their return
//! convention implies.
//!
//! Lookup mirrors [`ConverterRegistry`](crate::ConverterRegistry): exact
//! builtin, typedef-resolved, const and plain `<base><suffix>` keys, then
//! class and enum synthesis. Unknown pointer-bearing types return opaque
//! addresses and unknown value types are treated as `void`, each with a
//! one-time warning.

mod builtin;
mod object;

use std::fmt;
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::trace;

use crossbind_core::type_name::{self, Compound};
use crossbind_core::{
    Address, CallContext, CallError, ErrorKind, MethodId, PrimitiveKind, Reflection, SlotValue,
    Value, WarnOnce,
};

use crate::lookup::{INTEGER_ALIASES, TypeKey, smart_pointee};

pub use builtin::{
    CStringExecutor, NumericExecutor, NumericRefExecutor, StdStringExecutor, VoidExecutor,
    VoidPtrExecutor,
};
pub use object::{
    ConstructorExecutor, ObjectArrayExecutor, ObjectPtrExecutor, ObjectPtrPtrExecutor,
    ObjectRefExecutor, ObjectValueExecutor, SmartPtrExecutor,
};

/// Invocation and result conversion for one return type.
pub trait Executor: Send + Sync + fmt::Debug {
    /// Call `method` on `this` with `ctx`'s arguments.
    fn execute(
        &self,
        method: MethodId,
        this: Address,
        ctx: &mut CallContext<'_>,
    ) -> Result<Value, CallError>;
}

/// The address carried by a pointer or reference result.
pub(crate) fn result_address(slot: Option<SlotValue>) -> Result<Address, CallError> {
    match slot {
        Some(SlotValue::Address(address)) => Ok(address),
        None => Ok(Address::NULL),
        Some(other) => Err(CallError::new(
            ErrorKind::SystemError,
            format!("expected an address result, got {other:?}"),
        )),
    }
}

// ============================================================================
// Builtin factories
// ============================================================================

type Factory = Box<dyn Fn() -> Arc<dyn Executor> + Send + Sync>;

lazy_static! {
    static ref BUILTINS: FxHashMap<String, Factory> = builtin_factories();
}

fn insert<E: Executor + 'static>(
    table: &mut FxHashMap<String, Factory>,
    name: impl Into<String>,
    make: impl Fn() -> E + Send + Sync + 'static,
) {
    table.insert(name.into(), Box::new(move || Arc::new(make()) as Arc<dyn Executor>));
}

fn insert_numeric(table: &mut FxHashMap<String, Factory>, name: &str, kind: PrimitiveKind) {
    insert(table, name, move || NumericExecutor::new(kind));
    insert(table, format!("const {name}&"), move || NumericExecutor::by_ref(kind));
    insert(table, format!("{name}&"), move || NumericRefExecutor::new(kind));
    insert(table, format!("{name}*"), || VoidPtrExecutor);
}

fn builtin_factories() -> FxHashMap<String, Factory> {
    let mut table = FxHashMap::default();
    insert(&mut table, "void", || VoidExecutor);
    for kind in PrimitiveKind::ALL {
        insert_numeric(&mut table, kind.name(), kind);
    }
    for alias in INTEGER_ALIASES {
        if let Some(kind) = PrimitiveKind::from_name(alias) {
            insert_numeric(&mut table, alias, kind);
        }
    }

    insert(&mut table, "const char*", || CStringExecutor);
    insert(&mut table, "char*", || CStringExecutor);

    for name in ["std::string", "std::basic_string<char>", "std::string_view"] {
        insert(&mut table, name, || StdStringExecutor::new(true));
    }
    for name in ["const std::string&", "std::string&", "const std::basic_string<char>&"] {
        insert(&mut table, name, || StdStringExecutor::new(false));
    }

    for name in ["void*", "void**", "std::nullptr_t"] {
        insert(&mut table, name, || VoidPtrExecutor);
    }
    table
}

/// Builtin executor registered under exactly `name`.
pub fn builtin(name: &str) -> Option<Arc<dyn Executor>> {
    BUILTINS.get(name).map(|make| make())
}

// ============================================================================
// Registry
// ============================================================================

/// Executor lookup with a per-registry cache of resolved types.
pub struct ExecutorRegistry {
    reflection: Arc<dyn Reflection>,
    cache: RwLock<FxHashMap<(String, bool), Arc<dyn Executor>>>,
    diagnostics: WarnOnce,
}

impl ExecutorRegistry {
    pub fn new(reflection: Arc<dyn Reflection>, warn_unknown: bool) -> Self {
        Self {
            reflection,
            cache: RwLock::new(FxHashMap::default()),
            diagnostics: WarnOnce::new(warn_unknown),
        }
    }

    /// Executor for return type `name`. With `manage_smart_ptr`, smart
    /// pointer results stay wrapped in smart-pointer proxies.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn get(&self, name: &str, manage_smart_ptr: bool) -> Arc<dyn Executor> {
        let key = (name.to_string(), manage_smart_ptr);
        if let Some(executor) = self.cache.read().get(&key) {
            return Arc::clone(executor);
        }
        let executor = self.lookup(name, manage_smart_ptr);
        trace!(name, ?executor, "resolved executor");
        Arc::clone(self.cache.write().entry(key).or_insert(executor))
    }

    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }

    fn lookup(&self, full: &str, manage_smart_ptr: bool) -> Arc<dyn Executor> {
        if let Some(executor) = builtin(full) {
            return executor;
        }
        let key = TypeKey::parse(self.reflection.as_ref(), full);
        if key.resolved != full
            && let Some(executor) = builtin(&key.resolved)
        {
            return executor;
        }
        if key.is_const
            && let Some(executor) = builtin(&key.const_key())
        {
            return executor;
        }
        if let Some(executor) = builtin(&key.plain_key()) {
            return executor;
        }
        if let Some(executor) = self.class_executor(&key, full, manage_smart_ptr) {
            return executor;
        }
        if self.reflection.is_enum(&key.real) {
            let alias = match key.compound {
                Compound::Reference if key.is_const => "const unsigned int&",
                Compound::Reference => "unsigned int&",
                Compound::Value => "unsigned int",
                _ => "void*",
            };
            if let Some(executor) = builtin(alias) {
                return executor;
            }
        }
        if type_name::is_function_pointer(&key.resolved) {
            return Arc::new(VoidPtrExecutor);
        }
        if key.compound == Compound::Value {
            self.diagnostics
                .warn(full, || format!("return type \"{full}\" not handled (using void)"));
            Arc::new(VoidExecutor)
        } else {
            self.diagnostics
                .warn(full, || format!("return type \"{full}\" returned as an opaque pointer"));
            Arc::new(VoidPtrExecutor)
        }
    }

    fn class_executor(&self, key: &TypeKey, full: &str, manage_smart_ptr: bool) -> Option<Arc<dyn Executor>> {
        let reflection = self.reflection.as_ref();
        let class = reflection.scope(&key.real)?;
        if reflection.is_namespace(class) {
            return None;
        }
        if reflection.is_smart_ptr(class)
            && let Some((deref, pointee)) = smart_pointee(reflection, class)
        {
            return Some(Arc::new(SmartPtrExecutor::new(
                class,
                deref,
                pointee,
                key.compound,
                manage_smart_ptr,
            )));
        }
        Some(match key.compound {
            Compound::Value => Arc::new(ObjectValueExecutor::new(class)),
            Compound::Pointer => Arc::new(ObjectPtrExecutor::new(class)),
            Compound::Reference | Compound::RValueRef => Arc::new(ObjectRefExecutor::new(class)),
            Compound::PtrPtr | Compound::PtrRef => Arc::new(ObjectPtrPtrExecutor::new(class)),
            Compound::Array => Arc::new(ObjectArrayExecutor::new(
                class,
                type_name::array_size(full).unwrap_or(0),
            )),
            Compound::Other => return None,
        })
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("cached", &self.cached())
            .finish_non_exhaustive()
    }
}
