//! The facade the host-side proxy layer talks to.
//!
//! A [`Bridge`] owns one [`Runtime`] and the overload sets built over it.
//! Overload sets are created on first lookup from the reflection service's
//! methods and live as long as the bridge; host code may add callbacks to
//! them. Host subclasses of native classes are installed through
//! [`Bridge::derive`], and their overrides are reached from native code
//! through [`Bridge::call_override`].

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crossbind_core::type_name::{self, Compound};
use crossbind_core::{
    Address, CallError, ConversionError, MethodId, ObjectSpace, ProxyFlags, ProxyHandle, Reflection,
    ScopeId, Value, address,
};

use crate::callable::{
    Callable, HostCallback, HostFn, NativeConstructor, NativeFunction, NativeMethod,
};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::overload::OverloadSet;
use crate::runtime::Runtime;
use crate::trampoline::{
    SourceBackend, Trampoline, TrampolineBackend, TrampolineRequest, virtual_methods,
};

/// A host class deriving from a native class.
pub struct DerivedClass {
    pub name: String,
    pub base: ScopeId,
    pub trampoline: Trampoline,
    overrides: FxHashMap<String, HostFn>,
}

impl DerivedClass {
    pub fn overrides(&self, method: &str) -> bool {
        self.overrides.contains_key(method)
    }
}

impl fmt::Debug for DerivedClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedClass")
            .field("name", &self.name)
            .field("base", &self.base)
            .field("trampoline", &self.trampoline)
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .finish()
    }
}

type OverloadKey = (ScopeId, String);

pub struct Bridge {
    runtime: Runtime,
    overloads: RwLock<FxHashMap<OverloadKey, Arc<OverloadSet>>>,
    derived: RwLock<FxHashMap<String, Arc<DerivedClass>>>,
    backend: Box<dyn TrampolineBackend>,
}

impl Bridge {
    pub fn new(reflection: Arc<dyn Reflection>, config: BridgeConfig) -> Self {
        Self::with_backend(reflection, config, Box::new(SourceBackend::new()))
    }

    pub fn with_backend(
        reflection: Arc<dyn Reflection>,
        config: BridgeConfig,
        backend: Box<dyn TrampolineBackend>,
    ) -> Self {
        Self {
            runtime: Runtime::new(reflection, config),
            overloads: RwLock::new(FxHashMap::default()),
            derived: RwLock::new(FxHashMap::default()),
            backend,
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn space(&self) -> &ObjectSpace {
        &self.runtime.space
    }

    pub fn reflection(&self) -> &dyn Reflection {
        self.runtime.reflection()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.runtime.config
    }

    // ========================================================================
    // Overload sets
    // ========================================================================

    fn new_set(&self, name: &str, callables: Vec<Arc<dyn Callable>>) -> OverloadSet {
        let config = self.config();
        OverloadSet::new(name, callables, config.overload_flags(), config.memory_policy)
    }

    /// Wrap every method of `scope` named `name`.
    fn native_callables(&self, scope: ScopeId, name: &str) -> Vec<Arc<dyn Callable>> {
        let reflection = self.reflection();
        reflection
            .methods_named(scope, name)
            .into_iter()
            .map(|method| -> Arc<dyn Callable> {
                if reflection.is_constructor(method) {
                    Arc::new(NativeConstructor::new(reflection, scope, method))
                } else if reflection.is_static(method) || reflection.is_namespace(scope) {
                    Arc::new(NativeFunction::new(reflection, scope, method))
                } else {
                    Arc::new(NativeMethod::new(reflection, scope, method))
                }
            })
            .collect()
    }

    /// Register `callable` under `name` in `scope`, creating the set (with
    /// any native overloads of that name) if needed.
    pub fn register_overload(
        &self,
        scope: ScopeId,
        name: &str,
        callable: Arc<dyn Callable>,
    ) -> Arc<OverloadSet> {
        let mut overloads = self.overloads.write();
        let set = overloads
            .entry((scope, name.to_string()))
            .or_insert_with(|| Arc::new(self.new_set(name, self.native_callables(scope, name))));
        set.add_overload(callable);
        set.clone()
    }

    /// Add `callable` to an existing set.
    pub fn add_overload(&self, scope: ScopeId, name: &str, callable: Arc<dyn Callable>) -> Result<()> {
        let set = self
            .lookup_overload(scope, name)
            .ok_or_else(|| self.unknown_overload(scope, name))?;
        set.add_overload(callable);
        Ok(())
    }

    /// Add a host callback to an existing set.
    pub fn add_callback(&self, scope: ScopeId, name: &str, callback: HostCallback) -> Result<()> {
        self.add_overload(scope, name, Arc::new(callback))
    }

    /// The overload set for `name` in `scope`, built from the reflection
    /// service on first use. `None` if nothing has that name.
    pub fn lookup_overload(&self, scope: ScopeId, name: &str) -> Option<Arc<OverloadSet>> {
        let key = (scope, name.to_string());
        if let Some(set) = self.overloads.read().get(&key) {
            return Some(set.clone());
        }
        let callables = self.native_callables(scope, name);
        if callables.is_empty() {
            return None;
        }
        debug!(scope = %self.reflection().final_name(scope), name, overloads = callables.len(), "built overload set");
        let mut overloads = self.overloads.write();
        let set = overloads
            .entry(key)
            .or_insert_with(|| Arc::new(self.new_set(name, callables)));
        Some(set.clone())
    }

    fn unknown_overload(&self, scope: ScopeId, name: &str) -> BridgeError {
        BridgeError::UnknownOverload {
            scope: self.reflection().final_name(scope),
            name: name.to_string(),
        }
    }

    fn set_for(&self, scope: ScopeId, name: &str) -> Result<Arc<OverloadSet>> {
        self.lookup_overload(scope, name)
            .ok_or_else(|| self.unknown_overload(scope, name))
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Call `name` in `scope`, bound to `this` if given.
    pub fn call(
        &self,
        scope: ScopeId,
        name: &str,
        this: Option<ProxyHandle>,
        args: &[Value],
    ) -> Result<Value> {
        let set = self.set_for(scope, name)?;
        Ok(set.call(&self.runtime, this, args)?)
    }

    /// Call a method on `this`, resolved in the proxy's own class.
    pub fn call_method(&self, this: ProxyHandle, name: &str, args: &[Value]) -> Result<Value> {
        let class = self
            .space()
            .class_of(this)
            .ok_or(BridgeError::Conversion(ConversionError::StaleProxy))?;
        self.call(class, name, Some(this), args)
    }

    /// `this[index] = value` through a reference-returning `operator[]`.
    pub fn set_item(&self, this: ProxyHandle, index: &[Value], value: &Value) -> Result<()> {
        let class = self
            .space()
            .class_of(this)
            .ok_or(BridgeError::Conversion(ConversionError::StaleProxy))?;
        let set = self.set_for(class, "operator[]")?;
        set.call_assign(&self.runtime, Some(this), index, value)?;
        Ok(())
    }

    /// Construct a `class` instance with whichever constructor accepts
    /// `args`.
    pub fn construct(&self, class: ScopeId, args: &[Value]) -> Result<Value> {
        let name = self.reflection().final_name(class);
        let short = name.rsplit("::").next().unwrap_or(&name);
        let set = self
            .lookup_overload(class, short)
            .ok_or_else(|| BridgeError::UnknownClass(name.clone()))?;
        Ok(set.call(&self.runtime, None, args)?)
    }

    // ========================================================================
    // Proxies
    // ========================================================================

    /// Create a proxy for `address` without consulting the identity table.
    pub fn construct_proxy(&self, address: Address, class: ScopeId, is_ref: bool, is_value: bool) -> Value {
        let mut flags = ProxyFlags::empty();
        flags.set(ProxyFlags::REFERENCE, is_ref);
        flags.set(ProxyFlags::VALUE, is_value);
        Value::Object(self.space().construct_proxy(address, class, flags))
    }

    /// The live proxy for `address` as `class`, or a new one.
    pub fn retrieve_or_create(&self, address: Address, class: ScopeId) -> Value {
        self.space().bind_object(address, class, ProxyFlags::empty())
    }

    pub fn take_ownership(&self, handle: ProxyHandle) -> bool {
        self.space().take_ownership(handle)
    }

    pub fn release_ownership(&self, handle: ProxyHandle) -> bool {
        self.space().release_ownership(handle)
    }

    /// Native code destroyed the object at `address`.
    pub fn notify_destroyed(&self, class: ScopeId, address: Address) -> bool {
        self.space().notify_destroyed(class, address)
    }

    // ========================================================================
    // Host subclasses
    // ========================================================================

    /// Install a native trampoline for host class `name` deriving from
    /// `base` and overriding `overrides`.
    pub fn derive(
        &self,
        name: &str,
        base: ScopeId,
        overrides: Vec<(String, HostFn)>,
    ) -> Result<Arc<DerivedClass>> {
        let reflection = self.reflection();
        let virtuals: Vec<String> = virtual_methods(reflection, base)
            .into_iter()
            .map(|method| reflection.method_name(method))
            .collect();
        let mut request = TrampolineRequest::new(name, base);
        for (method, _) in &overrides {
            if !virtuals.contains(method) {
                return Err(BridgeError::NotOverridable {
                    class: reflection.final_name(base),
                    method: method.clone(),
                });
            }
            request.overrides.insert(method.clone());
        }
        let trampoline = self.backend.synthesize(reflection, &request)?;
        let derived = Arc::new(DerivedClass {
            name: name.to_string(),
            base,
            overrides: overrides.into_iter().collect(),
            trampoline,
        });
        self.derived
            .write()
            .insert(derived.trampoline.name.clone(), derived.clone());
        Ok(derived)
    }

    /// Construct an instance of a host subclass. The native object is the
    /// trampoline, so native virtual calls reach the host overrides.
    pub fn construct_derived(&self, derived: &DerivedClass, args: &[Value]) -> Result<Value> {
        let scope = derived.trampoline.scope;
        self.construct(scope, args)
    }

    /// Runtime side of a trampoline's forwarding body.
    ///
    /// `args` holds the address of each native argument and `result` the
    /// address of the return slot (a pointer cell for reference results,
    /// ignored for `void`). Errors raised by the host override are
    /// returned, never swallowed.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call_override(
        &self,
        class: &str,
        object: Address,
        method: MethodId,
        args: &[Address],
        result: Address,
    ) -> Result<()> {
        let derived = self
            .derived
            .read()
            .get(class)
            .cloned()
            .ok_or_else(|| BridgeError::UnknownClass(class.to_string()))?;
        let reflection = self.reflection();
        let name = reflection.method_name(method);
        let func = derived.overrides.get(&name).ok_or_else(|| BridgeError::UnknownOverload {
            scope: derived.name.clone(),
            name: name.clone(),
        })?;

        let this = self
            .space()
            .retrieve(derived.trampoline.scope, object)
            .ok_or_else(|| {
                CallError::value_error(format!("no host object for {class} at {object}"))
            })?;

        let mut values = Vec::with_capacity(args.len() + 1);
        values.push(Value::Object(this));
        for (i, arg) in args.iter().enumerate() {
            match self.argument_value(&reflection.arg_type(method, i), *arg) {
                Ok(value) => values.push(value),
                Err(err) => {
                    self.release_arguments(&values[1..]);
                    return Err(err);
                }
            }
        }

        trace!(class, method = %name, "calling host override");
        let outcome = func(&self.runtime, &values);
        self.release_arguments(&values[1..]);
        self.store_result(&reflection.result_type(method), &outcome?, result)
    }

    /// Drop the references `argument_value` took on object arguments.
    fn release_arguments(&self, values: &[Value]) {
        for value in values {
            match value {
                Value::Object(handle) => self.space().release(*handle),
                Value::Tuple(items) => self.release_arguments(items),
                _ => {}
            }
        }
    }

    /// Host value of a native argument living at `arg`.
    fn argument_value(&self, arg_type: &str, arg: Address) -> Result<Value> {
        let space = self.space();
        match Compound::of(arg_type) {
            Compound::Reference | Compound::RValueRef => {
                let referenced = arg_type.trim_end().trim_end_matches('&').trim_end();
                Ok(self.runtime.converters.get(referenced, None).from_memory(arg, space)?)
            }
            Compound::Pointer
                if self
                    .reflection()
                    .scope(&type_name::clean_type(arg_type))
                    .is_some() =>
            {
                // SAFETY: a pointer argument's address holds one pointer.
                let target = Address(unsafe { address::read::<usize>(arg) });
                if target.is_null() {
                    return Ok(Value::None);
                }
                let class = type_name::clean_type(arg_type);
                Ok(self.runtime.converters.get(&class, None).from_memory(target, space)?)
            }
            _ => Ok(self.runtime.converters.get(arg_type, None).from_memory(arg, space)?),
        }
    }

    fn store_result(&self, result_type: &str, value: &Value, result: Address) -> Result<()> {
        let compound = Compound::of(result_type);
        if compound == Compound::Value && type_name::clean_type(result_type) == "void" {
            return Ok(());
        }
        let target = if compound == Compound::Reference {
            format!("{}*", result_type.trim_end().trim_end_matches('&').trim_end())
        } else {
            result_type.to_string()
        };
        self.runtime
            .converters
            .get(&target, None)
            .to_memory(value, result, self.space())?;
        Ok(())
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("runtime", &self.runtime)
            .field("overload_sets", &self.overloads.read().len())
            .field("derived", &self.derived.read().len())
            .field("backend", &self.backend)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockReflection, alloc};
    use crossbind_core::{ErrorKind, SlotValue, address};
    use parking_lot::Mutex;

    fn host(
        func: impl Fn(&Runtime, &[Value]) -> std::result::Result<Value, CallError> + Send + Sync + 'static,
    ) -> HostFn {
        Arc::new(func)
    }

    fn counter(mock: &MockReflection) -> ScopeId {
        let class = mock.class("Counter", 8);
        mock.constructor(class, &[], |_, _| Some(SlotValue::Address(alloc(8))));
        mock.method(class, "get", "int", &[], |this, _| {
            Some(SlotValue::Int64(unsafe { address::read::<i64>(this) }))
        });
        mock.method(class, "bump", "void", &["int"], |this, args| {
            let by = args[0].value.as_i128().unwrap_or(0) as i64;
            unsafe { address::write(this, address::read::<i64>(this) + by) };
            None
        });
        class
    }

    #[test]
    fn overload_sets_are_built_once() {
        let mock = Arc::new(MockReflection::new());
        let class = counter(&mock);
        let bridge = Bridge::new(mock, BridgeConfig::default());

        let first = bridge.lookup_overload(class, "get").unwrap();
        let second = bridge.lookup_overload(class, "get").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(bridge.lookup_overload(class, "missing").is_none());
    }

    #[test]
    fn construct_and_call_methods() {
        let mock = Arc::new(MockReflection::new());
        let class = counter(&mock);
        let bridge = Bridge::new(mock, BridgeConfig::default());

        let object = bridge.construct(class, &[]).unwrap().as_object().unwrap();
        bridge.call_method(object, "bump", &[Value::Int(4)]).unwrap();
        bridge.call_method(object, "bump", &[Value::Int(3)]).unwrap();
        assert_eq!(bridge.call_method(object, "get", &[]).unwrap(), Value::Int(7));
    }

    #[test]
    fn unknown_names_are_lookup_errors() {
        let mock = Arc::new(MockReflection::new());
        let class = counter(&mock);
        let bridge = Bridge::new(mock, BridgeConfig::default());

        let err = bridge.call(class, "reset", None, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LookupError);
        assert_eq!(err.to_string(), "'Counter' has no operation named 'reset'");
        assert!(bridge.add_callback(class, "reset", HostCallback::new(|_, _| Ok(Value::None))).is_err());
    }

    #[test]
    fn registered_callbacks_join_native_overloads() {
        let mock = Arc::new(MockReflection::new());
        let class = counter(&mock);
        let bridge = Bridge::new(mock, BridgeConfig::default());

        bridge
            .add_callback(class, "get", HostCallback::new(|_, args| Ok(Value::Int(args.len() as i64))))
            .unwrap();
        let object = bridge.construct(class, &[]).unwrap().as_object().unwrap();
        assert_eq!(bridge.call_method(object, "get", &[]).unwrap(), Value::Int(1));
        assert_eq!(bridge.lookup_overload(class, "get").unwrap().len(), 2);

        let set = bridge.register_overload(class, "describe", Arc::new(HostCallback::new(|_, _| Ok(Value::from("counter")))));
        assert_eq!(set.len(), 1);
        assert_eq!(bridge.call_method(object, "describe", &[]).unwrap(), Value::from("counter"));
    }

    fn shape(mock: &MockReflection) -> (ScopeId, MethodId, MethodId) {
        let class = mock.class("Shape", 16);
        mock.constructor(class, &[], |_, _| Some(SlotValue::Address(alloc(16))));
        let area = mock.method(class, "area", "double", &[], |_, _| Some(SlotValue::Float64(0.0)));
        mock.set_virtual(area);
        mock.const_method(area);
        let scale = mock.method(class, "scale", "void", &["double"], |_, _| None);
        mock.set_virtual(scale);
        mock.method(class, "id", "int", &[], |_, _| Some(SlotValue::Int32(1)));
        (class, area, scale)
    }

    #[test]
    fn overrides_must_name_virtual_methods() {
        let mock = Arc::new(MockReflection::new());
        let (class, _, _) = shape(&mock);
        let bridge = Bridge::new(mock, BridgeConfig::default());

        let err = bridge
            .derive("Square", class, vec![("id".to_string(), host(|_, _| Ok(Value::Int(2))))])
            .unwrap_err();
        assert!(matches!(err, BridgeError::NotOverridable { ref method, .. } if method == "id"));
    }

    #[test]
    fn native_calls_reach_host_overrides() {
        let mock = Arc::new(MockReflection::new());
        let (class, area, scale) = shape(&mock);
        let bridge = Bridge::new(mock, BridgeConfig::default());

        let scaled = Arc::new(Mutex::new(Vec::new()));
        let seen = scaled.clone();
        let overrides: Vec<(String, HostFn)> = vec![
            (
                "area".to_string(),
                host(|_, args| {
                    assert!(args[0].as_object().is_some());
                    Ok(Value::Float(2.5))
                }),
            ),
            (
                "scale".to_string(),
                host(move |_, args| {
                    seen.lock().push(args[1].clone());
                    Ok(Value::None)
                }),
            ),
        ];
        let derived = bridge.derive("Circle", class, overrides).unwrap();
        assert!(derived.overrides("area"));
        assert!(derived.trampoline.forwards(area));

        let object = bridge.construct_derived(&derived, &[]).unwrap().as_object().unwrap();
        let native = bridge.space().get_object(object).unwrap();

        let result = alloc(8);
        bridge.call_override(&derived.trampoline.name, native, area, &[], result).unwrap();
        assert_eq!(unsafe { address::read::<f64>(result) }, 2.5);

        let factor = alloc(8);
        unsafe { address::write(factor, 3.0f64) };
        bridge.call_override(&derived.trampoline.name, native, scale, &[factor], Address::NULL).unwrap();
        assert_eq!(*scaled.lock(), vec![Value::Float(3.0)]);
    }

    #[test]
    fn host_errors_propagate_out_of_overrides() {
        let mock = Arc::new(MockReflection::new());
        let (class, area, _) = shape(&mock);
        let bridge = Bridge::new(mock, BridgeConfig::default());

        let overrides: Vec<(String, HostFn)> = vec![(
            "area".to_string(),
            host(|_, _| Err(CallError::new(ErrorKind::HostError, "boom"))),
        )];
        let derived = bridge.derive("Circle", class, overrides).unwrap();
        let object = bridge.construct_derived(&derived, &[]).unwrap().as_object().unwrap();
        let native = bridge.space().get_object(object).unwrap();

        let err = bridge
            .call_override(&derived.trampoline.name, native, area, &[], alloc(8))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HostError);
        assert!(matches!(
            bridge.call_override("NoSuchDispatcher", native, area, &[], alloc(8)),
            Err(BridgeError::UnknownClass(_))
        ));
    }
}
