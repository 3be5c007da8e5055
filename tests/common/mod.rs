//! An in-process reflection service over real memory.
//!
//! Classes, methods, and their bodies are declared by the test; objects
//! are leaked, zeroed allocations so that addresses stay valid for the
//! whole test. Compiling a trampoline unit registers the generated class
//! and its forwarding constructors.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crossbind_core::type_name;
use crossbind_core::{
    Address, CastDirection, MethodId, NativeFault, Parameter, Reflection, ScopeId, SlotValue,
};

pub type Body = Arc<dyn Fn(Address, &[Parameter]) -> Option<SlotValue> + Send + Sync>;

struct MockClass {
    name: String,
    size: usize,
    bases: Vec<(ScopeId, isize)>,
    smart: bool,
    namespace: bool,
}

struct MockMethod {
    scope: ScopeId,
    name: String,
    result: String,
    args: Vec<String>,
    defaults: Vec<Option<String>>,
    constructor: bool,
    is_static: bool,
    is_virtual: bool,
    is_const: bool,
    is_template: bool,
    body: Body,
}

#[derive(Default)]
struct World {
    classes: Vec<MockClass>,
    methods: Vec<MockMethod>,
    typedefs: FxHashMap<String, String>,
    enums: Vec<String>,
}

impl World {
    fn class(&self, scope: ScopeId) -> Option<&MockClass> {
        self.classes.get((scope.raw() as usize).checked_sub(1)?)
    }

    fn method(&self, method: MethodId) -> &MockMethod {
        &self.methods[method.raw() as usize - 1]
    }

    fn method_mut(&mut self, method: MethodId) -> &mut MockMethod {
        &mut self.methods[method.raw() as usize - 1]
    }

    fn scope(&self, name: &str) -> Option<ScopeId> {
        self.classes
            .iter()
            .position(|c| c.name == name)
            .map(|i| ScopeId::new(i as u64 + 1))
    }
}

/// Zeroed, leaked, 8-byte aligned storage.
pub fn alloc(size: usize) -> Address {
    let words = vec![0u64; size.div_ceil(8).max(1)].into_boxed_slice();
    Address::from_ptr(Box::leak(words).as_ptr())
}

#[derive(Default)]
pub struct MockReflection {
    world: RwLock<World>,
    pub destroyed: Mutex<Vec<(ScopeId, Address)>>,
    pub compiled: Mutex<Vec<String>>,
    pub fail_compiles: AtomicBool,
}

impl MockReflection {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    pub fn class(&self, name: &str, size: usize) -> ScopeId {
        let mut world = self.world.write();
        world.classes.push(MockClass {
            name: name.to_string(),
            size,
            bases: Vec::new(),
            smart: false,
            namespace: false,
        });
        ScopeId::new(world.classes.len() as u64)
    }

    pub fn namespace(&self, name: &str) -> ScopeId {
        let scope = self.class(name, 0);
        self.world.write().classes[scope.raw() as usize - 1].namespace = true;
        scope
    }

    pub fn derive(&self, derived: ScopeId, base: ScopeId, offset: isize) {
        self.world.write().classes[derived.raw() as usize - 1]
            .bases
            .push((base, offset));
    }

    pub fn typedef(&self, alias: &str, target: &str) {
        self.world
            .write()
            .typedefs
            .insert(alias.to_string(), target.to_string());
    }

    pub fn enumeration(&self, name: &str) {
        self.world.write().enums.push(name.to_string());
    }

    pub fn method(
        &self,
        scope: ScopeId,
        name: &str,
        result: &str,
        args: &[&str],
        body: impl Fn(Address, &[Parameter]) -> Option<SlotValue> + Send + Sync + 'static,
    ) -> MethodId {
        let mut world = self.world.write();
        world.methods.push(MockMethod {
            scope,
            name: name.to_string(),
            result: result.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            defaults: vec![None; args.len()],
            constructor: false,
            is_static: false,
            is_virtual: false,
            is_const: false,
            is_template: false,
            body: Arc::new(body),
        });
        MethodId::new(world.methods.len() as u64)
    }

    /// A constructor whose body returns the new object's address.
    pub fn constructor(
        &self,
        scope: ScopeId,
        args: &[&str],
        body: impl Fn(Address, &[Parameter]) -> Option<SlotValue> + Send + Sync + 'static,
    ) -> MethodId {
        let name = self.world.read().classes[scope.raw() as usize - 1].name.clone();
        let short = name.rsplit("::").next().unwrap_or(&name).to_string();
        let method = self.method(scope, &short, "", args, body);
        self.world.write().method_mut(method).constructor = true;
        method
    }

    pub fn set_static(&self, method: MethodId) {
        self.world.write().method_mut(method).is_static = true;
    }

    pub fn set_virtual(&self, method: MethodId) {
        self.world.write().method_mut(method).is_virtual = true;
    }

    pub fn const_method(&self, method: MethodId) {
        self.world.write().method_mut(method).is_const = true;
    }

    pub fn template(&self, method: MethodId) {
        self.world.write().method_mut(method).is_template = true;
    }

    pub fn default_arg(&self, method: MethodId, index: usize, value: &str) {
        self.world.write().method_mut(method).defaults[index] = Some(value.to_string());
    }

    /// A smart pointer laid out as a single pointer to its pointee.
    pub fn smart(&self, name: &str, pointee: &str) -> (ScopeId, MethodId) {
        let scope = self.class(name, 8);
        self.world.write().classes[scope.raw() as usize - 1].smart = true;
        let deref = self.method(scope, "operator->", &format!("{pointee}*"), &[], |this, _| {
            Some(SlotValue::Address(Address(unsafe {
                crossbind_core::address::read::<usize>(this)
            })))
        });
        (scope, deref)
    }

    /// Bytewise `operator=` for `scope`.
    pub fn assignment(&self, scope: ScopeId) -> MethodId {
        let (name, size) = {
            let world = self.world.read();
            let class = &world.classes[scope.raw() as usize - 1];
            (class.name.clone(), class.size)
        };
        self.method(
            scope,
            "operator=",
            &format!("{name}&"),
            &[&format!("const {name}&")],
            move |this, args| {
                let source = args[0].value.as_address().unwrap_or(Address::NULL);
                unsafe {
                    std::ptr::copy_nonoverlapping(source.as_ptr::<u8>(), this.as_ptr::<u8>(), size);
                }
                Some(SlotValue::Address(this))
            },
        )
    }

    /// Register the class a trampoline unit declares, with default and
    /// copy constructors when the unit forwards them.
    fn register_trampoline(&self, source: &str) {
        let Some(decl) = source.lines().find(|l| l.starts_with("class ")) else {
            return;
        };
        let Some((name, rest)) = decl["class ".len()..].split_once(" : public ::") else {
            return;
        };
        let base_name = rest.trim_end_matches(" {").trim();
        let Some(base) = self.world.read().scope(base_name) else {
            return;
        };
        let size = self.size_of(base);
        let scope = self.class(&format!("__crossbind_internal::{name}"), size);
        self.derive(scope, base, 0);
        if source.contains(&format!("  {name}() : ")) {
            self.constructor(scope, &[], move |_, _| Some(SlotValue::Address(alloc(size))));
        }
        if source.contains(&format!("  {name}(const {name}& other)")) {
            self.constructor(scope, &[&format!("const {name}&")], move |_, args| {
                let copy = alloc(size);
                let source = args[0].value.as_address().unwrap_or(Address::NULL);
                unsafe {
                    std::ptr::copy_nonoverlapping(source.as_ptr::<u8>(), copy.as_ptr::<u8>(), size);
                }
                Some(SlotValue::Address(copy))
            });
        }
    }
}

impl Reflection for MockReflection {
    fn scope(&self, name: &str) -> Option<ScopeId> {
        self.world.read().scope(name)
    }

    fn resolve_name(&self, name: &str) -> String {
        let clean = type_name::clean_type(name);
        match self.world.read().typedefs.get(&clean) {
            Some(target) => name.replacen(&clean, target, 1),
            None => name.to_string(),
        }
    }

    fn final_name(&self, scope: ScopeId) -> String {
        self.world
            .read()
            .class(scope)
            .map(|c| c.name.clone())
            .unwrap_or_default()
    }

    fn is_namespace(&self, scope: ScopeId) -> bool {
        self.world.read().class(scope).is_some_and(|c| c.namespace)
    }

    fn is_enum(&self, name: &str) -> bool {
        self.world.read().enums.iter().any(|e| e == name)
    }

    fn is_smart_ptr(&self, scope: ScopeId) -> bool {
        self.world.read().class(scope).is_some_and(|c| c.smart)
    }

    fn size_of(&self, scope: ScopeId) -> usize {
        self.world.read().class(scope).map_or(0, |c| c.size)
    }

    fn is_subtype(&self, derived: ScopeId, base: ScopeId) -> bool {
        if derived == base {
            return true;
        }
        let bases: Vec<ScopeId> = self
            .world
            .read()
            .class(derived)
            .map(|c| c.bases.iter().map(|(b, _)| *b).collect())
            .unwrap_or_default();
        bases.into_iter().any(|b| self.is_subtype(b, base))
    }

    fn base_offset(&self, derived: ScopeId, base: ScopeId, _object: Address, direction: CastDirection) -> isize {
        let offset = self
            .world
            .read()
            .class(derived)
            .and_then(|c| c.bases.iter().find(|(b, _)| *b == base).map(|(_, o)| *o))
            .unwrap_or(0);
        match direction {
            CastDirection::Up => offset,
            CastDirection::Down => -offset,
        }
    }

    fn bases(&self, scope: ScopeId) -> Vec<ScopeId> {
        self.world
            .read()
            .class(scope)
            .map(|c| c.bases.iter().map(|(b, _)| *b).collect())
            .unwrap_or_default()
    }

    fn methods(&self, scope: ScopeId) -> Vec<MethodId> {
        self.world
            .read()
            .methods
            .iter()
            .enumerate()
            .filter(|(_, m)| m.scope == scope)
            .map(|(i, _)| MethodId::new(i as u64 + 1))
            .collect()
    }

    fn method_name(&self, method: MethodId) -> String {
        self.world.read().method(method).name.clone()
    }

    fn result_type(&self, method: MethodId) -> String {
        self.world.read().method(method).result.clone()
    }

    fn arg_count(&self, method: MethodId) -> usize {
        self.world.read().method(method).args.len()
    }

    fn required_args(&self, method: MethodId) -> usize {
        let world = self.world.read();
        let info = world.method(method);
        info.defaults.iter().take_while(|d| d.is_none()).count()
    }

    fn arg_type(&self, method: MethodId, index: usize) -> String {
        self.world.read().method(method).args[index].clone()
    }

    fn arg_default(&self, method: MethodId, index: usize) -> Option<String> {
        self.world.read().method(method).defaults.get(index).cloned().flatten()
    }

    fn is_constructor(&self, method: MethodId) -> bool {
        self.world.read().method(method).constructor
    }

    fn is_static(&self, method: MethodId) -> bool {
        self.world.read().method(method).is_static
    }

    fn is_virtual(&self, method: MethodId) -> bool {
        self.world.read().method(method).is_virtual
    }

    fn is_const_method(&self, method: MethodId) -> bool {
        self.world.read().method(method).is_const
    }

    fn is_template(&self, method: MethodId) -> bool {
        self.world.read().method(method).is_template
    }

    fn invoke(&self, method: MethodId, this: Address, args: &[Parameter]) -> Result<Option<SlotValue>, NativeFault> {
        let body = self.world.read().method(method).body.clone();
        Ok(body(this, args))
    }

    fn construct(&self, method: MethodId, _class: ScopeId, args: &[Parameter]) -> Result<Address, NativeFault> {
        let body = self.world.read().method(method).body.clone();
        body(Address::NULL, args)
            .and_then(SlotValue::as_address)
            .ok_or_else(|| NativeFault("constructor returned no object".into()))
    }

    fn destruct(&self, class: ScopeId, object: Address) {
        self.destroyed.lock().push((class, object));
    }

    fn compile(&self, source: &str) -> Result<(), String> {
        self.compiled.lock().push(source.to_string());
        if self.fail_compiles.load(Ordering::Relaxed) {
            return Err("error: expected ';' after class".into());
        }
        self.register_trampoline(source);
        Ok(())
    }
}
