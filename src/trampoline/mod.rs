//! Native subclasses that forward virtual calls to host overrides.
//!
//! A host class deriving from a native class with virtual methods needs a
//! native counterpart for native code to call into. A
//! [`TrampolineBackend`] produces that counterpart: a class deriving from
//! the native base, overriding each virtual method the host overrides with
//! a body that calls back into the bridge through [`OVERRIDE_ENTRY`].
//!
//! ## Key Types
//!
//! - [`TrampolineRequest`]: the host class, its native bases, and the
//!   names it overrides
//! - [`Trampoline`]: the installed native class
//! - [`SourceBackend`]: generates a translation unit and hands it to the
//!   reflection service's compiler

mod source;

use std::fmt;

use rustc_hash::FxHashSet;

use crossbind_core::{CompileError, MethodId, Reflection, ScopeId};

pub use source::SourceBackend;

/// Namespace generated classes are declared in.
pub const INTERNAL_NAMESPACE: &str = "__crossbind_internal";

/// Native symbol forwarding bodies call.
///
/// ```text
/// int crossbind_call_override(const char* cls, void* self,
///                             unsigned long long method,
///                             void** args, void* result);
/// ```
///
/// The embedding resolves it to [`Bridge::call_override`](crate::Bridge::call_override).
pub const OVERRIDE_ENTRY: &str = "crossbind_call_override";

/// A host class that needs a native trampoline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrampolineRequest {
    /// Host-side class name; used to name the generated class.
    pub name: String,
    pub bases: Vec<ScopeId>,
    /// Method names the host class defines.
    pub overrides: FxHashSet<String>,
}

impl TrampolineRequest {
    pub fn new(name: impl Into<String>, base: ScopeId) -> Self {
        Self {
            name: name.into(),
            bases: vec![base],
            overrides: FxHashSet::default(),
        }
    }

    pub fn with_override(mut self, method: impl Into<String>) -> Self {
        self.overrides.insert(method.into());
        self
    }
}

/// A compiled trampoline class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trampoline {
    pub scope: ScopeId,
    /// Fully qualified native name.
    pub name: String,
    /// Base virtual methods whose calls are forwarded to the host.
    pub forwarded: Vec<MethodId>,
}

impl Trampoline {
    pub fn forwards(&self, method: MethodId) -> bool {
        self.forwarded.contains(&method)
    }
}

/// Turns a [`TrampolineRequest`] into an installed native class.
pub trait TrampolineBackend: Send + Sync + fmt::Debug {
    fn synthesize(
        &self,
        reflection: &dyn Reflection,
        request: &TrampolineRequest,
    ) -> Result<Trampoline, CompileError>;
}

/// Virtual, non-constructor methods of `scope` and its bases, nearest
/// declaration first.
pub fn virtual_methods(reflection: &dyn Reflection, scope: ScopeId) -> Vec<MethodId> {
    let mut seen: FxHashSet<(String, Vec<String>)> = FxHashSet::default();
    let mut methods = Vec::new();
    let mut pending = vec![scope];
    while let Some(current) = pending.pop() {
        for method in reflection.methods(current) {
            if !reflection.is_virtual(method) || reflection.is_constructor(method) {
                continue;
            }
            let args = (0..reflection.arg_count(method))
                .map(|i| reflection.arg_type(method, i))
                .collect();
            if seen.insert((reflection.method_name(method), args)) {
                methods.push(method);
            }
        }
        pending.extend(reflection.bases(current).into_iter().rev());
    }
    methods
}
