//! Text backend: C++ source compiled by the reflection service.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tracing::{debug, warn};

use crossbind_core::type_name::{self, Compound};
use crossbind_core::{CompileError, MethodId, Reflection, ScopeId};

use super::{
    INTERNAL_NAMESPACE, OVERRIDE_ENTRY, Trampoline, TrampolineBackend, TrampolineRequest,
    virtual_methods,
};

const PRELUDE: &str = "#include <stdexcept>\n";

/// Generates one class per request, named `<Host>Dispatcher<N>`.
///
/// The prelude declaring [`OVERRIDE_ENTRY`] is compiled once per backend.
#[derive(Debug, Default)]
pub struct SourceBackend {
    prelude_done: AtomicBool,
    counter: AtomicUsize,
}

impl SourceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn prelude() -> String {
        format!(
            "{PRELUDE}extern \"C\" int {OVERRIDE_ENTRY}(const char* cls, void* self, \
             unsigned long long method, void** args, void* result);\n"
        )
    }

    fn ensure_prelude(&self, reflection: &dyn Reflection, class: &str) -> Result<(), CompileError> {
        if self.prelude_done.load(Ordering::Acquire) {
            return Ok(());
        }
        let prelude = Self::prelude();
        reflection.compile(&prelude).map_err(|message| CompileError {
            class: class.to_string(),
            message,
            unit: prelude,
        })?;
        self.prelude_done.store(true, Ordering::Release);
        Ok(())
    }

    /// The translation unit for `request`, declaring class `class_name`.
    ///
    /// Returns the source and the base methods it forwards.
    pub fn generate(
        &self,
        reflection: &dyn Reflection,
        request: &TrampolineRequest,
        class_name: &str,
    ) -> (String, Vec<MethodId>) {
        let qualified = format!("{INTERNAL_NAMESPACE}::{class_name}");
        let base_names: Vec<String> = request
            .bases
            .iter()
            .map(|b| reflection.final_name(*b))
            .collect();

        let mut code = String::new();
        code.push_str(&format!("namespace {INTERNAL_NAMESPACE} {{\n"));
        let bases = base_names
            .iter()
            .map(|b| format!("public ::{b}"))
            .collect::<Vec<_>>()
            .join(", ");
        code.push_str(&format!("class {class_name} : {bases} {{\n"));
        code.push_str("public:\n");

        // Constructors: only those every base can provide.
        if request.bases.iter().all(|b| reflection.has_default_constructor(*b)) {
            let inits = base_names
                .iter()
                .map(|b| format!("::{b}()"))
                .collect::<Vec<_>>()
                .join(", ");
            code.push_str(&format!("  {class_name}() : {inits} {{}}\n"));
        }
        if request.bases.iter().all(|b| reflection.has_copy_constructor(*b)) {
            let inits = base_names
                .iter()
                .map(|b| format!("::{b}(other)"))
                .collect::<Vec<_>>()
                .join(", ");
            code.push_str(&format!("  {class_name}(const {class_name}& other) : {inits} {{}}\n"));
        }

        let mut forwarded = Vec::new();
        let mut using = Vec::new();
        for (base, base_name) in request.bases.iter().zip(&base_names) {
            for method in virtual_methods(reflection, *base) {
                let name = reflection.method_name(method);
                if request.overrides.contains(&name) {
                    write_forwarder(&mut code, reflection, &qualified, base_name, method);
                    forwarded.push(method);
                } else if !using.contains(&name) {
                    code.push_str(&format!("  using ::{base_name}::{name};\n"));
                    using.push(name);
                }
            }
        }

        code.push_str("};\n}\n");
        (code, forwarded)
    }
}

/// A body marshaling the arguments' addresses to the bridge and the
/// host's result back.
fn write_forwarder(
    code: &mut String,
    reflection: &dyn Reflection,
    qualified: &str,
    base_name: &str,
    method: MethodId,
) {
    let name = reflection.method_name(method);
    let result = reflection.result_type(method);
    let nargs = reflection.arg_count(method);
    let formals = (0..nargs)
        .map(|i| format!("{} a{i}", reflection.arg_type(method, i)))
        .collect::<Vec<_>>()
        .join(", ");
    let constness = if reflection.is_const_method(method) {
        " const"
    } else {
        ""
    };

    code.push_str(&format!("  {result} {name}({formals}){constness} override {{\n"));
    if nargs == 0 {
        code.push_str("    void** crossbind_args = nullptr;\n");
    } else {
        let addrs = (0..nargs)
            .map(|i| format!("(void*)&a{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        code.push_str(&format!("    void* crossbind_args[] = {{{addrs}}};\n"));
    }

    let is_void = type_name::clean_type(&result) == "void" && Compound::of(&result) == Compound::Value;
    let by_ref = Compound::of(&result) == Compound::Reference;
    let (storage, result_ptr, ret) = if is_void {
        (String::new(), "nullptr", String::new())
    } else if by_ref {
        let pointee = result.trim_end().trim_end_matches('&').trim_end();
        (
            format!("    {pointee}* crossbind_ret = nullptr;\n"),
            "(void*)&crossbind_ret",
            "    return *crossbind_ret;\n".to_string(),
        )
    } else {
        (
            format!("    {result} crossbind_ret{{}};\n"),
            "(void*)&crossbind_ret",
            "    return crossbind_ret;\n".to_string(),
        )
    };
    code.push_str(&storage);
    code.push_str(&format!(
        "    if (::{OVERRIDE_ENTRY}(\"{qualified}\", (void*)this, {}ULL, crossbind_args, {result_ptr}) != 0)\n",
        method.raw()
    ));
    code.push_str(&format!(
        "      throw std::runtime_error(\"host override of {base_name}::{name} raised an error\");\n"
    ));
    code.push_str(&ret);
    code.push_str("  }\n");
}

impl TrampolineBackend for SourceBackend {
    fn synthesize(
        &self,
        reflection: &dyn Reflection,
        request: &TrampolineRequest,
    ) -> Result<Trampoline, CompileError> {
        self.ensure_prelude(reflection, &request.name)?;

        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let host = request.name.rsplit("::").next().unwrap_or(&request.name);
        let class_name = format!("{host}Dispatcher{n}");
        let (source, forwarded) = self.generate(reflection, request, &class_name);

        if let Err(message) = reflection.compile(&source) {
            warn!(class = %request.name, %message, "trampoline failed to compile");
            return Err(CompileError {
                class: request.name.clone(),
                message,
                unit: source,
            });
        }

        let name = format!("{INTERNAL_NAMESPACE}::{class_name}");
        let scope: ScopeId = reflection.scope(&name).ok_or_else(|| CompileError {
            class: request.name.clone(),
            message: format!("compiled class '{name}' could not be found"),
            unit: source.clone(),
        })?;
        debug!(class = %request.name, trampoline = %name, forwarded = forwarded.len(), "installed trampoline");
        Ok(Trampoline {
            scope,
            name,
            forwarded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockReflection;
    use crossbind_core::SlotValue;

    fn shape(mock: &MockReflection) -> ScopeId {
        let shape = mock.class("Shape", 16);
        mock.constructor(shape, &[], |_, _| None);
        let area = mock.method(shape, "area", "double", &[], |_, _| Some(SlotValue::Float64(0.0)));
        mock.set_virtual(area);
        mock.const_method(area);
        let scale = mock.method(shape, "scale", "void", &["double", "const Shape&"], |_, _| None);
        mock.set_virtual(scale);
        let name = mock.method(shape, "name", "const std::string&", &[], |_, _| None);
        mock.set_virtual(name);
        mock.method(shape, "id", "int", &[], |_, _| None);
        shape
    }

    #[test]
    fn generates_forwarders_and_using_declarations() {
        let mock = MockReflection::new();
        let base = shape(&mock);
        let request = TrampolineRequest::new("Circle", base).with_override("area").with_override("scale");
        let (source, forwarded) = SourceBackend::new().generate(&mock, &request, "CircleDispatcher1");

        assert_eq!(forwarded.len(), 2);
        assert!(source.starts_with("namespace __crossbind_internal {\nclass CircleDispatcher1 : public ::Shape {\n"));
        assert!(source.contains("  CircleDispatcher1() : ::Shape() {}\n"));
        assert!(!source.contains("CircleDispatcher1(const CircleDispatcher1& other)"));
        assert!(source.contains("  double area() const override {\n    void** crossbind_args = nullptr;\n    double crossbind_ret{};\n"));
        assert!(source.contains("  void scale(double a0, const Shape& a1) override {\n    void* crossbind_args[] = {(void*)&a0, (void*)&a1};\n    if (::crossbind_call_override(\"__crossbind_internal::CircleDispatcher1\", (void*)this, "));
        assert!(source.contains("  using ::Shape::name;\n"));
        assert!(!source.contains("id("));
    }

    #[test]
    fn reference_results_go_through_a_pointer() {
        let mock = MockReflection::new();
        let base = shape(&mock);
        let request = TrampolineRequest::new("Circle", base).with_override("name");
        let (source, _) = SourceBackend::new().generate(&mock, &request, "C1");
        assert!(source.contains("    const std::string* crossbind_ret = nullptr;\n"));
        assert!(source.contains("    return *crossbind_ret;\n"));
    }

    #[test]
    fn synthesize_compiles_prelude_once() {
        let mock = MockReflection::new();
        let base = shape(&mock);
        let backend = SourceBackend::new();
        let first = backend
            .synthesize(&mock, &TrampolineRequest::new("app::Circle", base).with_override("area"))
            .unwrap();
        let second = backend
            .synthesize(&mock, &TrampolineRequest::new("Square", base))
            .unwrap();
        assert_eq!(first.name, "__crossbind_internal::CircleDispatcher1");
        assert_eq!(second.name, "__crossbind_internal::SquareDispatcher2");
        assert_eq!(first.forwarded.len(), 1);
        assert!(second.forwarded.is_empty());

        let compiled = mock.compiled.lock();
        assert_eq!(compiled.len(), 3);
        assert!(compiled[0].contains("extern \"C\" int crossbind_call_override"));
    }

    #[test]
    fn compile_failures_carry_the_source() {
        let mock = MockReflection::new();
        let base = shape(&mock);
        mock.fail_compiles.store(true, Ordering::Relaxed);
        let err = SourceBackend::new()
            .synthesize(&mock, &TrampolineRequest::new("Circle", base))
            .unwrap_err();
        assert_eq!(err.class, "Circle");
        assert!(err.unit.contains("extern \"C\""));
    }
}
