//! Native overloads.
//!
//! All three kinds share one description of the method, built once from
//! the reflection service: argument types and defaults, the signature and
//! prototype strings, and the overload priority. Converters are fetched on
//! the first call and kept for the lifetime of the callable.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::trace;

use crossbind_core::{
    Address, CallContext, CallError, CastDirection, MethodId, ProxyHandle, Reflection, ScopeId,
    Value,
};
use crossbind_marshal::{Converter, Executor};
use crossbind_marshal::executors::ConstructorExecutor;

use super::{Callable, Invocation};
use crate::priority::method_priority;
use crate::runtime::Runtime;

/// Parse a default-argument expression as a host value.
///
/// Understands the literals a declaration typically carries: booleans,
/// `nullptr`, integers and floats with their suffixes, and string and
/// character literals. Anything else needs the host to evaluate it.
pub fn parse_default(text: &str) -> Option<Value> {
    let text = text.trim();
    match text {
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        "nullptr" | "NULL" => return Some(Value::NullPtr),
        _ => {}
    }
    if let Some(inner) = text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        return Some(Value::Str(inner.to_string()));
    }
    if let Some(inner) = text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        return Some(Value::Str(inner.to_string()));
    }
    let integral = text.trim_end_matches(['u', 'U', 'l', 'L']);
    if let Some(hex) = integral.strip_prefix("0x").or_else(|| integral.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok().map(Value::from_u64);
    }
    if let Ok(v) = integral.parse::<i64>() {
        return Some(Value::Int(v));
    }
    text.trim_end_matches(['f', 'F']).parse::<f64>().ok().map(Value::Float)
}

// ============================================================================
// Shared description
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MethodKind {
    Instance,
    Static,
    Constructor,
}

struct MethodInfo {
    scope: ScopeId,
    method: MethodId,
    name: String,
    result_type: String,
    arg_types: Vec<String>,
    defaults: Vec<Option<String>>,
    required: usize,
    signature: String,
    prototype: String,
    priority: i32,
    converters: OnceLock<Vec<Arc<dyn Converter>>>,
}

impl MethodInfo {
    fn new(reflection: &dyn Reflection, scope: ScopeId, method: MethodId, kind: MethodKind) -> Self {
        let name = reflection.method_name(method);
        let nargs = reflection.arg_count(method);
        let arg_types: Vec<String> = (0..nargs).map(|i| reflection.arg_type(method, i)).collect();
        let defaults: Vec<Option<String>> = (0..nargs).map(|i| reflection.arg_default(method, i)).collect();

        let signature = format!("({})", arg_types.join(", "));
        let formals = arg_types
            .iter()
            .enumerate()
            .map(|(i, ty)| {
                let arg = format!("{ty} {}", reflection.arg_name(method, i));
                match &defaults[i] {
                    Some(default) => format!("{arg} = {default}"),
                    None => arg,
                }
            })
            .collect::<Vec<_>>()
            .join(", ");

        let scope_name = reflection.final_name(scope);
        let qualified = if scope_name.is_empty() {
            name.clone()
        } else {
            format!("{scope_name}::{name}")
        };
        let result_type = reflection.result_type(method);
        let prototype = match kind {
            MethodKind::Constructor => format!("{qualified}({formals})"),
            MethodKind::Static => format!("static {result_type} {qualified}({formals})"),
            MethodKind::Instance if reflection.is_const_method(method) => {
                format!("{result_type} {qualified}({formals}) const")
            }
            MethodKind::Instance => format!("{result_type} {qualified}({formals})"),
        };

        Self {
            scope,
            method,
            required: reflection.required_args(method),
            priority: method_priority(reflection, method),
            name,
            result_type,
            arg_types,
            defaults,
            signature,
            prototype,
            converters: OnceLock::new(),
        }
    }

    fn converters(&self, rt: &Runtime) -> &[Arc<dyn Converter>] {
        self.converters.get_or_init(|| {
            self.arg_types
                .iter()
                .map(|ty| rt.converters.get(ty, None))
                .collect()
        })
    }

    fn check_arity(&self, given: usize) -> Result<(), CallError> {
        let max = self.arg_types.len();
        if given < self.required {
            return Err(CallError::type_error(format!(
                "takes at least {} arguments ({given} given)",
                self.required
            )));
        }
        if given > max {
            return Err(CallError::type_error(format!(
                "takes at most {max} arguments ({given} given)"
            )));
        }
        Ok(())
    }

    /// Convert `args`, filling missing trailing ones from their defaults.
    #[cfg_attr(feature = "profiling", profiling::function)]
    fn convert_args(&self, rt: &Runtime, args: &[Value], ctx: &mut CallContext<'_>) -> Result<(), CallError> {
        self.check_arity(args.len())?;
        let converters = self.converters(rt);
        ctx.args.reserve(converters.len());
        for (i, converter) in converters.iter().enumerate() {
            let defaulted;
            let value = match args.get(i) {
                Some(value) => value,
                None => {
                    defaulted = self.defaults[i]
                        .as_deref()
                        .and_then(parse_default)
                        .ok_or_else(|| {
                            CallError::type_error(format!(
                                "could not evaluate default for argument {}",
                                i + 1
                            ))
                        })?;
                    &defaulted
                }
            };
            let param = converter.set_arg(value, ctx).map_err(|err| {
                CallError::new(
                    err.kind(),
                    format!("could not convert argument {} ({err})", i + 1),
                )
            })?;
            ctx.args.push(param);
        }
        Ok(())
    }

    /// Convert, invoke through the result type's executor, and write back
    /// reseated pointer arguments.
    fn execute(
        &self,
        rt: &Runtime,
        this: Address,
        invocation: &Invocation<'_>,
        args: &[Value],
        constructor: Option<ScopeId>,
    ) -> Result<Value, CallError> {
        let mut ctx = CallContext::new(&rt.space, invocation.flags);
        self.convert_args(rt, args, &mut ctx)?;
        if let Some(value) = invocation.assign {
            ctx.set_assignable(value.clone());
        }
        let result = match constructor {
            Some(class) => ConstructorExecutor::new(class).execute(self.method, Address::NULL, &mut ctx),
            None => rt
                .executors
                .get(&self.result_type, ctx.manages_smart_ptr())
                .execute(self.method, this, &mut ctx),
        };
        ctx.apply_reseats();
        result
    }
}

impl fmt::Debug for MethodInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInfo")
            .field("method", &self.method)
            .field("prototype", &self.prototype)
            .field("priority", &self.priority)
            .finish()
    }
}

// ============================================================================
// Instance methods
// ============================================================================

/// A non-static member function.
///
/// The receiver is the bound proxy or, for unbound calls, the first
/// argument. Receivers of derived classes are upcast to the declaring
/// class before the call.
#[derive(Debug)]
pub struct NativeMethod {
    info: MethodInfo,
}

impl NativeMethod {
    pub fn new(reflection: &dyn Reflection, scope: ScopeId, method: MethodId) -> Self {
        Self {
            info: MethodInfo::new(reflection, scope, method, MethodKind::Instance),
        }
    }

    fn receiver<'a>(
        &self,
        rt: &Runtime,
        invocation: &Invocation<'a>,
    ) -> Result<(ProxyHandle, &'a [Value]), CallError> {
        if let Some(this) = invocation.this {
            return Ok((this, invocation.args));
        }
        if let Some((Value::Object(first), rest)) = invocation.args.split_first()
            && rt
                .space
                .class_of(*first)
                .is_some_and(|class| rt.reflection().is_subtype(class, self.info.scope))
        {
            return Ok((*first, rest));
        }
        Err(CallError::type_error(format!(
            "unbound method {}::{} requires a {} instance as first argument",
            rt.reflection().final_name(self.info.scope),
            self.info.name,
            rt.reflection().final_name(self.info.scope),
        )))
    }

    fn object(&self, rt: &Runtime, receiver: ProxyHandle) -> Result<Address, CallError> {
        let reflection = rt.reflection();
        let class = rt
            .space
            .class_of(receiver)
            .ok_or_else(|| CallError::value_error("attempt to access a null-pointer"))?;
        let object = rt.space.get_object(receiver).unwrap_or(Address::NULL);
        if object.is_null() {
            return Err(CallError::value_error("attempt to access a null-pointer"));
        }
        if class == self.info.scope {
            return Ok(object);
        }
        if !reflection.is_subtype(class, self.info.scope) {
            return Err(CallError::type_error(format!(
                "receiver of class {} is not a {}",
                reflection.final_name(class),
                reflection.final_name(self.info.scope)
            )));
        }
        let offset = reflection.base_offset(class, self.info.scope, object, CastDirection::Up);
        Ok(object.offset(offset))
    }
}

impl Callable for NativeMethod {
    fn signature(&self) -> &str {
        &self.info.signature
    }

    fn prototype(&self) -> &str {
        &self.info.prototype
    }

    fn priority(&self) -> i32 {
        self.info.priority
    }

    fn max_args(&self) -> usize {
        self.info.arg_types.len()
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    fn call(&self, rt: &Runtime, invocation: &Invocation<'_>) -> Result<Value, CallError> {
        let result = self.receiver(rt, invocation).and_then(|(receiver, args)| {
            let object = self.object(rt, receiver)?;
            trace!(method = %self.info.prototype, %object, "calling method");
            self.info.execute(rt, object, invocation, args, None)
        });
        result.map_err(|err| err.in_context(&self.info.prototype))
    }
}

// ============================================================================
// Static and free functions
// ============================================================================

/// A static member or namespace-level function; any bound receiver is
/// ignored.
#[derive(Debug)]
pub struct NativeFunction {
    info: MethodInfo,
}

impl NativeFunction {
    pub fn new(reflection: &dyn Reflection, scope: ScopeId, method: MethodId) -> Self {
        let kind = if reflection.is_namespace(scope) {
            MethodKind::Instance
        } else {
            MethodKind::Static
        };
        Self {
            info: MethodInfo::new(reflection, scope, method, kind),
        }
    }
}

impl Callable for NativeFunction {
    fn signature(&self) -> &str {
        &self.info.signature
    }

    fn prototype(&self) -> &str {
        &self.info.prototype
    }

    fn priority(&self) -> i32 {
        self.info.priority
    }

    fn max_args(&self) -> usize {
        self.info.arg_types.len()
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    fn call(&self, rt: &Runtime, invocation: &Invocation<'_>) -> Result<Value, CallError> {
        trace!(function = %self.info.prototype, "calling function");
        self.info
            .execute(rt, Address::NULL, invocation, invocation.args, None)
            .map_err(|err| err.in_context(&self.info.prototype))
    }
}

// ============================================================================
// Constructors
// ============================================================================

/// A constructor; the result is a new proxy owning its object.
#[derive(Debug)]
pub struct NativeConstructor {
    info: MethodInfo,
    class: ScopeId,
}

impl NativeConstructor {
    pub fn new(reflection: &dyn Reflection, scope: ScopeId, method: MethodId) -> Self {
        Self {
            info: MethodInfo::new(reflection, scope, method, MethodKind::Constructor),
            class: scope,
        }
    }
}

impl Callable for NativeConstructor {
    fn signature(&self) -> &str {
        &self.info.signature
    }

    fn prototype(&self) -> &str {
        &self.info.prototype
    }

    fn priority(&self) -> i32 {
        self.info.priority
    }

    fn max_args(&self) -> usize {
        self.info.arg_types.len()
    }

    fn is_constructor(&self) -> bool {
        true
    }

    fn call(&self, rt: &Runtime, invocation: &Invocation<'_>) -> Result<Value, CallError> {
        trace!(constructor = %self.info.prototype, "constructing");
        self.info
            .execute(rt, Address::NULL, invocation, invocation.args, Some(self.class))
            .map_err(|err| err.in_context(&self.info.prototype))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_literals() {
        assert_eq!(parse_default("true"), Some(Value::Bool(true)));
        assert_eq!(parse_default("nullptr"), Some(Value::NullPtr));
        assert_eq!(parse_default("42"), Some(Value::Int(42)));
        assert_eq!(parse_default("-3L"), Some(Value::Int(-3)));
        assert_eq!(parse_default("0x10u"), Some(Value::Int(16)));
        assert_eq!(parse_default("0.5f"), Some(Value::Float(0.5)));
        assert_eq!(parse_default("\"abc\""), Some(Value::Str("abc".into())));
        assert_eq!(parse_default("std::string()"), None);
    }
}
