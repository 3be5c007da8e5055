//! The reflection/JIT service interface.
//!
//! Everything this layer knows about native types comes from an
//! implementation of [`Reflection`]: scopes, methods, layouts, and the
//! ability to invoke a method or compile a translation unit. Queries that a
//! service may reasonably not support have default implementations.
//!
//! Implementations must tolerate re-entrant calls: a native call made
//! through [`Reflection::invoke`] may call back into the host, which may in
//! turn dispatch further native calls.

use crate::address::Address;
use crate::error::NativeFault;
use crate::ids::{MethodId, ScopeId};
use crate::parameter::{Parameter, SlotValue};
use crate::type_name::{self, Compound};

/// Direction of a base-offset query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastDirection {
    /// Derived to base.
    Up,
    /// Base to derived.
    Down,
}

pub trait Reflection: Send + Sync {
    // ========================================================================
    // Scopes
    // ========================================================================

    /// Look up a class, struct, or namespace by (qualified) name.
    fn scope(&self, name: &str) -> Option<ScopeId>;

    /// Resolve typedefs and aliases in a type string.
    fn resolve_name(&self, name: &str) -> String {
        name.to_string()
    }

    /// Fully qualified name of a scope.
    fn final_name(&self, scope: ScopeId) -> String;

    fn is_namespace(&self, _scope: ScopeId) -> bool {
        false
    }

    fn is_enum(&self, _name: &str) -> bool {
        false
    }

    /// Whether the full definition of a named class is available.
    fn is_complete(&self, name: &str) -> bool {
        self.scope(name).is_some()
    }

    fn is_smart_ptr(&self, _scope: ScopeId) -> bool {
        false
    }

    fn size_of(&self, scope: ScopeId) -> usize;

    fn is_subtype(&self, derived: ScopeId, base: ScopeId) -> bool;

    /// Byte offset to apply to `object` when casting between `derived` and
    /// `base` in `direction`.
    fn base_offset(
        &self,
        _derived: ScopeId,
        _base: ScopeId,
        _object: Address,
        _direction: CastDirection,
    ) -> isize {
        0
    }

    fn bases(&self, _scope: ScopeId) -> Vec<ScopeId> {
        Vec::new()
    }

    /// Most-derived class of the object at `object`, declared as `declared`.
    fn actual_class(&self, declared: ScopeId, _object: Address) -> ScopeId {
        declared
    }

    // ========================================================================
    // Methods
    // ========================================================================

    /// All methods and constructors declared in `scope`.
    fn methods(&self, scope: ScopeId) -> Vec<MethodId>;

    fn methods_named(&self, scope: ScopeId, name: &str) -> Vec<MethodId> {
        self.methods(scope)
            .into_iter()
            .filter(|m| self.method_name(*m) == name)
            .collect()
    }

    fn method_name(&self, method: MethodId) -> String;

    fn result_type(&self, method: MethodId) -> String;

    fn arg_count(&self, method: MethodId) -> usize;

    /// Arguments without default values.
    fn required_args(&self, method: MethodId) -> usize {
        self.arg_count(method)
    }

    fn arg_type(&self, method: MethodId, index: usize) -> String;

    fn arg_name(&self, _method: MethodId, index: usize) -> String {
        format!("arg{index}")
    }

    fn arg_default(&self, _method: MethodId, _index: usize) -> Option<String> {
        None
    }

    fn is_constructor(&self, method: MethodId) -> bool;

    fn is_static(&self, _method: MethodId) -> bool {
        false
    }

    fn is_virtual(&self, _method: MethodId) -> bool {
        false
    }

    fn is_const_method(&self, _method: MethodId) -> bool {
        false
    }

    fn is_template(&self, _method: MethodId) -> bool {
        false
    }

    fn has_default_constructor(&self, scope: ScopeId) -> bool {
        self.methods(scope)
            .into_iter()
            .any(|m| self.is_constructor(m) && self.required_args(m) == 0)
    }

    fn has_copy_constructor(&self, scope: ScopeId) -> bool {
        let name = self.final_name(scope);
        self.methods(scope).into_iter().any(|m| {
            self.is_constructor(m) && self.arg_count(m) == 1 && {
                let arg = self.arg_type(m, 0);
                type_name::clean_type(&arg) == name && Compound::of(&arg) == Compound::Reference
            }
        })
    }

    // ========================================================================
    // Invocation
    // ========================================================================

    /// Invoke `method` on `this` (null for static and free functions).
    ///
    /// Returns `None` for void methods. Class-typed results are returned as
    /// the address of the result object; by-value results are heap copies
    /// owned by the caller.
    fn invoke(
        &self,
        method: MethodId,
        this: Address,
        args: &[Parameter],
    ) -> Result<Option<SlotValue>, NativeFault>;

    /// Run constructor `method` of `class`, returning the new object.
    fn construct(
        &self,
        method: MethodId,
        class: ScopeId,
        args: &[Parameter],
    ) -> Result<Address, NativeFault>;

    fn destruct(&self, class: ScopeId, object: Address);

    /// Compile a translation unit into the running process.
    fn compile(&self, source: &str) -> Result<(), String>;
}
