//! Type-string decomposition shared by the converter and executor
//! registries.

use crossbind_core::type_name::{self, Compound};
use crossbind_core::{MethodId, PrimitiveKind, Reflection, ScopeId};

/// Fixed-width and platform integer spellings with builtin handlers.
pub(crate) const INTEGER_ALIASES: [&str; 13] = [
    "int8_t",
    "uint8_t",
    "int16_t",
    "uint16_t",
    "int32_t",
    "uint32_t",
    "int64_t",
    "uint64_t",
    "size_t",
    "ssize_t",
    "ptrdiff_t",
    "intptr_t",
    "uintptr_t",
];

/// A type string split into the pieces lookup keys on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TypeKey {
    /// The string after typedef resolution.
    pub resolved: String,
    /// Base name without `const` and decorations.
    pub real: String,
    /// Raw trailing decoration, e.g. `*&` or `[]`.
    pub suffix: String,
    pub compound: Compound,
    pub is_const: bool,
}

impl TypeKey {
    pub(crate) fn parse(reflection: &dyn Reflection, full: &str) -> Self {
        let resolved = reflection.resolve_name(full);
        let suffix = type_name::suffix(&resolved);
        Self {
            real: type_name::clean_type(&resolved),
            compound: Compound::from_suffix(&suffix),
            is_const: type_name::is_const(&resolved),
            suffix,
            resolved,
        }
    }

    /// `const <real><suffix>`, the key of const-sensitive builtins.
    pub(crate) fn const_key(&self) -> String {
        format!("const {}{}", self.real, self.suffix)
    }

    pub(crate) fn plain_key(&self) -> String {
        format!("{}{}", self.real, self.suffix)
    }
}

/// Whether `name` is a builtin native type (primitives and `void`).
pub fn is_builtin(name: &str) -> bool {
    let clean = type_name::clean_type(name);
    clean == "void" || PrimitiveKind::from_name(&clean).is_some()
}

/// Dereference operator and pointee class of smart-pointer class `smart`.
pub fn smart_pointee(reflection: &dyn Reflection, smart: ScopeId) -> Option<(MethodId, ScopeId)> {
    let deref = reflection
        .methods_named(smart, "operator->")
        .into_iter()
        .find(|m| reflection.arg_count(*m) == 0)?;
    let pointee = reflection.scope(&type_name::clean_type(&reflection.result_type(deref)))?;
    Some((deref, pointee))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockReflection;

    #[test]
    fn parse_resolves_typedefs() {
        let mut mock = MockReflection::new();
        mock.typedef("Int_t", "int");
        let key = TypeKey::parse(&mock, "const Int_t&");
        assert_eq!(key.resolved, "const int&");
        assert_eq!(key.real, "int");
        assert_eq!(key.suffix, "&");
        assert_eq!(key.compound, Compound::Reference);
        assert!(key.is_const);
        assert_eq!(key.const_key(), "const int&");
        assert_eq!(key.plain_key(), "int&");
    }

    #[test]
    fn builtin_names() {
        assert!(is_builtin("const double&"));
        assert!(is_builtin("void*"));
        assert!(is_builtin("size_t"));
        assert!(!is_builtin("std::string"));
        assert!(!is_builtin("Widget*"));
    }

    #[test]
    fn smart_pointer_pointee() {
        let mut mock = MockReflection::new();
        let widget = mock.class("Widget", 8);
        let (smart, deref) = mock.smart("WidgetPtr", "Widget");
        let mock = mock;
        assert_eq!(smart_pointee(&mock, smart), Some((deref, widget)));
        assert_eq!(smart_pointee(&mock, widget), None);
    }
}
