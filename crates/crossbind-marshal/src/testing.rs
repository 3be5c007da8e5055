//! In-process reflection service over real memory for unit tests.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crossbind_core::{
    Address, CastDirection, MethodId, NativeFault, Parameter, Reflection, ScopeId, SlotValue,
};

type Body = Box<dyn Fn(Address, &[Parameter]) -> Option<SlotValue> + Send + Sync>;

struct MockClass {
    name: String,
    size: usize,
    bases: Vec<(ScopeId, isize)>,
    smart: bool,
}

struct MockMethod {
    scope: ScopeId,
    name: String,
    result: String,
    args: Vec<String>,
    body: Body,
}

#[derive(Default)]
pub(crate) struct MockReflection {
    classes: Vec<MockClass>,
    methods: Vec<MockMethod>,
    typedefs: FxHashMap<String, String>,
    enums: Vec<String>,
    pub destroyed: Mutex<Vec<(ScopeId, Address)>>,
}

/// Zeroed, leaked, 8-byte aligned storage.
pub(crate) fn alloc(size: usize) -> Address {
    let words = vec![0u64; size.div_ceil(8).max(1)].into_boxed_slice();
    Address::from_ptr(Box::leak(words).as_ptr())
}

impl MockReflection {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn class(&mut self, name: &str, size: usize) -> ScopeId {
        self.classes.push(MockClass {
            name: name.to_string(),
            size,
            bases: Vec::new(),
            smart: false,
        });
        ScopeId::new(self.classes.len() as u64)
    }

    pub(crate) fn derive(&mut self, derived: ScopeId, base: ScopeId, offset: isize) {
        self.classes[derived.raw() as usize - 1].bases.push((base, offset));
    }

    pub(crate) fn typedef(&mut self, alias: &str, target: &str) {
        self.typedefs.insert(alias.to_string(), target.to_string());
    }

    pub(crate) fn enumeration(&mut self, name: &str) {
        self.enums.push(name.to_string());
    }

    pub(crate) fn method(
        &mut self,
        scope: ScopeId,
        name: &str,
        result: &str,
        args: &[&str],
        body: impl Fn(Address, &[Parameter]) -> Option<SlotValue> + Send + Sync + 'static,
    ) -> MethodId {
        self.methods.push(MockMethod {
            scope,
            name: name.to_string(),
            result: result.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            body: Box::new(body),
        });
        MethodId::new(self.methods.len() as u64)
    }

    /// A smart pointer laid out as a single pointer to its pointee.
    pub(crate) fn smart(&mut self, name: &str, pointee: &str) -> (ScopeId, MethodId) {
        let scope = self.class(name, 8);
        self.classes[scope.raw() as usize - 1].smart = true;
        let deref = self.method(scope, "operator->", &format!("{pointee}*"), &[], |this, _| {
            Some(SlotValue::Address(Address(unsafe {
                crossbind_core::address::read::<usize>(this)
            })))
        });
        (scope, deref)
    }

    /// Bytewise `operator=` for `scope`.
    pub(crate) fn assignment(&mut self, scope: ScopeId) -> MethodId {
        let name = self.classes[scope.raw() as usize - 1].name.clone();
        let size = self.classes[scope.raw() as usize - 1].size;
        self.method(scope, "operator=", &format!("{name}&"), &[&format!("const {name}&")], move |this, args| {
            let source = args[0].value.as_address().unwrap_or(Address::NULL);
            unsafe {
                std::ptr::copy_nonoverlapping(source.as_ptr::<u8>(), this.as_ptr::<u8>(), size);
            }
            Some(SlotValue::Address(this))
        })
    }

    fn class_info(&self, scope: ScopeId) -> Option<&MockClass> {
        self.classes.get((scope.raw() as usize).checked_sub(1)?)
    }

    fn method_info(&self, method: MethodId) -> &MockMethod {
        &self.methods[method.raw() as usize - 1]
    }
}

impl Reflection for MockReflection {
    fn scope(&self, name: &str) -> Option<ScopeId> {
        self.classes
            .iter()
            .position(|c| c.name == name)
            .map(|i| ScopeId::new(i as u64 + 1))
    }

    fn resolve_name(&self, name: &str) -> String {
        let clean = crossbind_core::type_name::clean_type(name);
        match self.typedefs.get(&clean) {
            Some(target) => name.replacen(&clean, target, 1),
            None => name.to_string(),
        }
    }

    fn final_name(&self, scope: ScopeId) -> String {
        self.class_info(scope).map(|c| c.name.clone()).unwrap_or_default()
    }

    fn is_enum(&self, name: &str) -> bool {
        self.enums.iter().any(|e| e == name)
    }

    fn is_smart_ptr(&self, scope: ScopeId) -> bool {
        self.class_info(scope).is_some_and(|c| c.smart)
    }

    fn size_of(&self, scope: ScopeId) -> usize {
        self.class_info(scope).map_or(0, |c| c.size)
    }

    fn is_subtype(&self, derived: ScopeId, base: ScopeId) -> bool {
        derived == base
            || self
                .class_info(derived)
                .is_some_and(|c| c.bases.iter().any(|(b, _)| *b == base))
    }

    fn base_offset(&self, derived: ScopeId, base: ScopeId, _object: Address, direction: CastDirection) -> isize {
        let offset = self
            .class_info(derived)
            .and_then(|c| c.bases.iter().find(|(b, _)| *b == base))
            .map_or(0, |(_, offset)| *offset);
        match direction {
            CastDirection::Up => offset,
            CastDirection::Down => -offset,
        }
    }

    fn methods(&self, scope: ScopeId) -> Vec<MethodId> {
        self.methods
            .iter()
            .enumerate()
            .filter(|(_, m)| m.scope == scope)
            .map(|(i, _)| MethodId::new(i as u64 + 1))
            .collect()
    }

    fn method_name(&self, method: MethodId) -> String {
        self.method_info(method).name.clone()
    }

    fn result_type(&self, method: MethodId) -> String {
        self.method_info(method).result.clone()
    }

    fn arg_count(&self, method: MethodId) -> usize {
        self.method_info(method).args.len()
    }

    fn arg_type(&self, method: MethodId, index: usize) -> String {
        self.method_info(method).args[index].clone()
    }

    fn is_constructor(&self, method: MethodId) -> bool {
        let info = self.method_info(method);
        self.class_info(info.scope).is_some_and(|c| c.name == info.name)
    }

    fn invoke(&self, method: MethodId, this: Address, args: &[Parameter]) -> Result<Option<SlotValue>, NativeFault> {
        Ok((self.method_info(method).body)(this, args))
    }

    fn construct(&self, method: MethodId, _class: ScopeId, args: &[Parameter]) -> Result<Address, NativeFault> {
        (self.method_info(method).body)(Address::NULL, args)
            .and_then(SlotValue::as_address)
            .ok_or_else(|| NativeFault("constructor returned no object".into()))
    }

    fn destruct(&self, class: ScopeId, object: Address) {
        self.destroyed.lock().push((class, object));
    }

    fn compile(&self, _source: &str) -> Result<(), String> {
        Ok(())
    }
}
