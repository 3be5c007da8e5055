//! Overload sets and per-call overload resolution.
//!
//! An [`OverloadSet`] groups every callable exposed under one logical
//! name. A call goes through:
//!
//! ```text
//! START → HASH_LOOKUP → CACHED_CALL ──ok──→ SUCCESS
//!                  │          │
//!                  │        error
//!                  ▼          ▼
//!               LINEAR_SCAN ──ok──→ SUCCESS
//!                  │
//!                  └── all failed ─→ ALL_FAILED
//! ```
//!
//! The hash covers each argument's runtime type identity and whether it is
//! a fresh temporary, never its contents, so a cached overload can still
//! reject a call; that failure is dropped and the scan runs as if there
//! were no cache entry. The scan tries overloads in descending priority
//! (sorted once, stably) and records the first success under the hash.
//!
//! No lock is held while a callable runs: native code may call back into
//! the same set.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crossbind_core::{
    CallError, CallFlags, DispatchError, ErrorKind, MemoryPolicy, ProxyHandle, SignatureHash,
    Value,
};

use crate::callable::{Callable, Invocation};
use crate::runtime::Runtime;

struct OverloadState {
    callables: Arc<[Arc<dyn Callable>]>,
    dispatch: FxHashMap<SignatureHash, usize>,
    flags: CallFlags,
    /// Memory policy in force when the set carries no override.
    default_policy: MemoryPolicy,
    /// Creator status set through [`OverloadSet::set_creator`].
    explicit_creator: Option<bool>,
}

impl OverloadState {
    fn memory_policy(&self) -> MemoryPolicy {
        if self.flags.contains(CallFlags::USE_STRICT) {
            MemoryPolicy::Strict
        } else if self.flags.contains(CallFlags::USE_HEURISTICS) {
            MemoryPolicy::Heuristics
        } else {
            self.default_policy
        }
    }

    /// Recompute `IS_CREATOR` from the explicit setting, the constructor
    /// bit, and the `Clone` naming heuristic.
    fn refresh_creator(&mut self, name: &str) {
        let creator = self.explicit_creator.unwrap_or_else(|| {
            self.flags.contains(CallFlags::IS_CONSTRUCTOR)
                || (self.memory_policy() == MemoryPolicy::Heuristics && name.contains("Clone"))
        });
        self.flags.set(CallFlags::IS_CREATOR, creator);
    }
}

/// Every overload of one logical operation.
pub struct OverloadSet {
    name: String,
    state: Mutex<OverloadState>,
}

impl OverloadSet {
    /// Create a set with `flags` as its starting policy bits.
    ///
    /// Sets of constructors are creators. Under the heuristic memory policy
    /// so is any set whose name contains `Clone`.
    pub fn new(
        name: impl Into<String>,
        callables: Vec<Arc<dyn Callable>>,
        flags: CallFlags,
        policy: MemoryPolicy,
    ) -> Self {
        let name = name.into();
        let mut flags = flags - CallFlags::IS_SORTED;
        let explicit_creator = flags.contains(CallFlags::IS_CREATOR).then_some(true);
        if !callables.is_empty() && callables.iter().all(|c| c.is_constructor()) {
            flags |= CallFlags::IS_CONSTRUCTOR;
        }
        let mut state = OverloadState {
            callables: callables.into(),
            dispatch: FxHashMap::default(),
            flags,
            default_policy: policy,
            explicit_creator,
        };
        state.refresh_creator(&name);
        Self {
            name,
            state: Mutex::new(state),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.state.lock().callables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flags(&self) -> CallFlags {
        self.state.lock().flags
    }

    /// The callables in their current order.
    pub fn callables(&self) -> Vec<Arc<dyn Callable>> {
        self.state.lock().callables.to_vec()
    }

    /// Number of signatures with a cached resolution.
    pub fn cached_signatures(&self) -> usize {
        self.state.lock().dispatch.len()
    }

    /// Append an overload. Resets the priority order and the dispatch cache.
    pub fn add_overload(&self, callable: Arc<dyn Callable>) {
        let mut state = self.state.lock();
        let mut callables = state.callables.to_vec();
        callables.push(callable);
        state.callables = callables.into();
        state.dispatch.clear();
        state.flags.remove(CallFlags::IS_SORTED);
    }

    /// Append every overload of `other`.
    pub fn merge(&self, other: &OverloadSet) {
        for callable in other.callables() {
            self.add_overload(callable);
        }
    }

    /// A new set holding only the overload whose argument types are
    /// `signature`, e.g. `"int, double"` or `"(int, double)"`.
    pub fn select(&self, signature: &str) -> Result<OverloadSet, DispatchError> {
        let wanted = normalize_signature(signature);
        let state = self.state.lock();
        let callable = state
            .callables
            .iter()
            .find(|c| normalize_signature(c.signature()) == wanted)
            .cloned()
            .ok_or_else(|| DispatchError::SignatureNotFound(signature.to_string()))?;
        Ok(OverloadSet {
            name: self.name.clone(),
            state: Mutex::new(OverloadState {
                callables: Arc::from(vec![callable]),
                dispatch: FxHashMap::default(),
                flags: state.flags - CallFlags::IS_SORTED,
                default_policy: state.default_policy,
                explicit_creator: state.explicit_creator,
            }),
        })
    }

    /// Each overload's documentation, one per line.
    pub fn doc(&self) -> String {
        self.state
            .lock()
            .callables
            .iter()
            .map(|c| c.doc())
            .collect::<Vec<_>>()
            .join("\n")
    }

    // ========================================================================
    // Policy
    // ========================================================================

    fn set_flag(&self, flag: CallFlags, enabled: bool) {
        self.state.lock().flags.set(flag, enabled);
    }

    pub fn is_creator(&self) -> bool {
        self.flags().contains(CallFlags::IS_CREATOR)
    }

    /// Whether results of this operation are owned by the caller.
    pub fn set_creator(&self, creator: bool) {
        let mut state = self.state.lock();
        state.explicit_creator = Some(creator);
        state.refresh_creator(&self.name);
    }

    /// Override the bridge's memory policy for this set; `None` restores it.
    pub fn set_memory_policy(&self, policy: Option<MemoryPolicy>) {
        let mut state = self.state.lock();
        state
            .flags
            .remove(CallFlags::USE_HEURISTICS | CallFlags::USE_STRICT);
        if let Some(policy) = policy {
            state.flags |= policy.flag();
        }
        state.refresh_creator(&self.name);
    }

    pub fn memory_policy(&self) -> Option<MemoryPolicy> {
        let flags = self.flags();
        if flags.contains(CallFlags::USE_HEURISTICS) {
            Some(MemoryPolicy::Heuristics)
        } else if flags.contains(CallFlags::USE_STRICT) {
            Some(MemoryPolicy::Strict)
        } else {
            None
        }
    }

    pub fn set_release_host_lock(&self, release: bool) {
        self.set_flag(CallFlags::RELEASE_HOST_LOCK, release);
    }

    pub fn set_manage_smart_ptr(&self, manage: bool) {
        self.set_flag(CallFlags::MANAGE_SMART_PTR, manage);
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Resolve and call an overload with `args`, bound to `this` if given.
    pub fn call(
        &self,
        rt: &Runtime,
        this: Option<ProxyHandle>,
        args: &[Value],
    ) -> Result<Value, DispatchError> {
        self.dispatch(rt, this, args, None)
    }

    /// Like [`call`](Self::call), storing `value` through the reference
    /// the selected overload returns, as in `obj[i] = value`.
    pub fn call_assign(
        &self,
        rt: &Runtime,
        this: Option<ProxyHandle>,
        args: &[Value],
        value: &Value,
    ) -> Result<Value, DispatchError> {
        self.dispatch(rt, this, args, Some(value))
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    fn dispatch(
        &self,
        rt: &Runtime,
        this: Option<ProxyHandle>,
        args: &[Value],
        assign: Option<&Value>,
    ) -> Result<Value, DispatchError> {
        let (callables, set_flags) = {
            let state = self.state.lock();
            (state.callables.clone(), state.flags)
        };
        let invocation = Invocation {
            this,
            args,
            assign,
            flags: rt.call_flags(set_flags),
        };

        // START
        if callables.len() == 1 {
            let result = callables[0].call(rt, &invocation)?;
            return Ok(self.finish(rt, this, result, set_flags));
        }

        // HASH_LOOKUP
        let hash = SignatureHash::compute(args.iter().map(|a| rt.space.arg_identity(a)));
        let cached = self.state.lock().dispatch.get(&hash).copied();

        // CACHED_CALL
        if let Some(index) = cached
            && let Some(callable) = callables.get(index)
        {
            match callable.call(rt, &invocation) {
                Ok(result) => {
                    trace!(name = %self.name, ?hash, index, "dispatch cache hit");
                    return Ok(self.finish(rt, this, result, set_flags));
                }
                Err(err) => {
                    debug!(name = %self.name, ?hash, index, error = %err, "cached overload rejected call, rescanning");
                }
            }
        }

        // LINEAR_SCAN
        let callables = self.sorted();
        let mut errors: Vec<CallError> = Vec::with_capacity(callables.len());
        for (index, callable) in callables.iter().enumerate() {
            match callable.call(rt, &invocation) {
                Ok(result) => {
                    self.state.lock().dispatch.insert(hash, index);
                    debug!(name = %self.name, ?hash, index, prototype = callable.prototype(), "resolved overload");
                    return Ok(self.finish(rt, this, result, set_flags));
                }
                Err(err) => errors.push(err),
            }
        }

        // ALL_FAILED
        Err(exhausted(callables.len(), errors))
    }

    /// Sort by descending priority once; returns the current order.
    fn sorted(&self) -> Arc<[Arc<dyn Callable>]> {
        let mut state = self.state.lock();
        if !state.flags.contains(CallFlags::IS_SORTED) {
            let mut callables = state.callables.to_vec();
            callables.sort_by_key(|c| std::cmp::Reverse(c.priority()));
            state.callables = callables.into();
            state.dispatch.clear();
            state.flags |= CallFlags::IS_SORTED;
        }
        state.callables.clone()
    }

    /// Apply creator ownership and lifelines to a successful result.
    fn finish(&self, rt: &Runtime, this: Option<ProxyHandle>, result: Value, flags: CallFlags) -> Value {
        let Value::Object(handle) = &result else {
            return result;
        };
        let handle = *handle;

        if flags.contains(CallFlags::IS_CREATOR) {
            rt.space.take_ownership(handle);
        }

        if let Some(receiver) = this
            && receiver != handle
            && let (Some(base), Some(object), Some(class)) = (
                rt.space.get_object(receiver),
                rt.space.get_object(handle),
                rt.space.class_of(receiver),
            )
            && !base.is_null()
            && let Some(offset) = object.distance_from(base)
            && offset < rt.reflection().size_of(class)
        {
            trace!(?handle, ?receiver, offset, "result lives inside receiver");
            rt.space.set_lifeline(handle, receiver);
        }
        result
    }
}

impl std::fmt::Debug for OverloadSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("OverloadSet")
            .field("name", &self.name)
            .field("overloads", &state.callables.len())
            .field("cached", &state.dispatch.len())
            .field("flags", &state.flags)
            .finish()
    }
}

fn normalize_signature(signature: &str) -> String {
    let trimmed = signature.trim();
    let inner = trimmed
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(trimmed);
    inner
        .split(',')
        .map(|arg| arg.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Fold every overload's failure into one error.
///
/// The kind is the one all attempts agree on, `TypeError` if they differ.
/// `NotImplemented` failures never vote.
fn exhausted(count: usize, errors: Vec<CallError>) -> DispatchError {
    let mut kind: Option<ErrorKind> = None;
    let mut message = format!("none of the {count} overloaded methods succeeded. Full details:");
    for err in errors {
        if err.kind != ErrorKind::NotImplemented {
            kind = match kind {
                None => Some(err.kind),
                Some(k) if k == err.kind => Some(k),
                Some(_) => Some(ErrorKind::TypeError),
            };
        }
        message.push_str("\n  ");
        message.push_str(&err.message);
    }
    DispatchError::Exhausted {
        kind: kind.unwrap_or(ErrorKind::TypeError),
        message,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crossbind_core::{CallError, ErrorKind};

    use super::*;
    use crate::callable::HostCallback;
    use crate::config::BridgeConfig;
    use crate::testing::MockReflection;

    fn runtime() -> Runtime {
        Runtime::new(Arc::new(MockReflection::new()), BridgeConfig::default())
    }

    /// A callback accepting only arguments of one host type.
    #[derive(Debug)]
    struct Typed {
        accepts: &'static str,
        priority: i32,
        signature: String,
        calls: Arc<AtomicUsize>,
    }

    impl Typed {
        fn new(accepts: &'static str, priority: i32) -> Arc<Self> {
            Arc::new(Self {
                accepts,
                priority,
                signature: format!("({accepts})"),
                calls: Arc::new(AtomicUsize::new(0)),
            })
        }
    }

    impl Callable for Typed {
        fn signature(&self) -> &str {
            &self.signature
        }

        fn prototype(&self) -> &str {
            &self.signature
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn max_args(&self) -> usize {
            1
        }

        fn call(&self, _rt: &Runtime, invocation: &Invocation<'_>) -> Result<Value, CallError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            match invocation.args {
                [arg] if arg.type_name() == self.accepts => Ok(Value::Str(self.accepts.into())),
                [arg] => Err(CallError::type_error(format!(
                    "{} expected, got {}",
                    self.accepts,
                    arg.type_name()
                ))),
                _ => Err(CallError::type_error("takes exactly 1 argument")),
            }
        }
    }

    fn set_of(callables: Vec<Arc<dyn Callable>>) -> OverloadSet {
        OverloadSet::new("f", callables, CallFlags::empty(), MemoryPolicy::Heuristics)
    }

    #[test]
    fn scan_then_cache() {
        let rt = runtime();
        let int = Typed::new("int", 0);
        let float = Typed::new("float", -10);
        let set = set_of(vec![float.clone(), int.clone()]);

        assert_eq!(set.call(&rt, None, &[Value::Int(1)]).unwrap(), Value::Str("int".into()));
        assert_eq!(set.cached_signatures(), 1);
        assert_eq!(int.calls.load(Ordering::Relaxed), 1);
        assert_eq!(float.calls.load(Ordering::Relaxed), 0);

        assert_eq!(set.call(&rt, None, &[Value::Float(1.5)]).unwrap(), Value::Str("float".into()));
        assert_eq!(int.calls.load(Ordering::Relaxed), 2);

        // cached: no further scan
        set.call(&rt, None, &[Value::Float(2.5)]).unwrap();
        assert_eq!(int.calls.load(Ordering::Relaxed), 2);
        assert_eq!(float.calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn stable_priority_order() {
        let rt = runtime();
        let first = Typed::new("str", 5);
        let second = Typed::new("str", 5);
        let set = set_of(vec![Typed::new("int", -1), first.clone(), second.clone()]);
        set.call(&rt, None, &[Value::from("x")]).unwrap();
        assert_eq!(first.calls.load(Ordering::Relaxed), 1);
        assert_eq!(second.calls.load(Ordering::Relaxed), 0);
        assert!(set.flags().contains(CallFlags::IS_SORTED));
    }

    #[test]
    fn aggregated_failure() {
        let rt = runtime();
        let set = set_of(vec![Typed::new("int", 0), Typed::new("float", 0)]);
        let err = set.call(&rt, None, &[Value::from("x")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeError);
        assert_eq!(
            err.to_string(),
            "none of the 2 overloaded methods succeeded. Full details:\n  int expected, got str\n  float expected, got str"
        );
    }

    #[test]
    fn aggregated_kind_ignores_not_implemented() {
        let err = exhausted(
            2,
            vec![
                CallError::value_error("bad value"),
                CallError::new(ErrorKind::NotImplemented, "no rvalue support"),
            ],
        );
        assert_eq!(err.kind(), ErrorKind::ValueError);

        let err = exhausted(
            2,
            vec![CallError::value_error("a"), CallError::new(ErrorKind::LookupError, "b")],
        );
        assert_eq!(err.kind(), ErrorKind::TypeError);
    }

    #[test]
    fn single_overload_error_is_unwrapped() {
        let rt = runtime();
        let set = set_of(vec![Typed::new("int", 0)]);
        let err = set.call(&rt, None, &[Value::from("x")]).unwrap_err();
        assert_eq!(err, DispatchError::Call(CallError::type_error("int expected, got str")));
    }

    #[test]
    fn add_overload_resets_order_and_cache() {
        let rt = runtime();
        let set = set_of(vec![Typed::new("int", 0), Typed::new("float", 0)]);
        set.call(&rt, None, &[Value::Int(1)]).unwrap();
        assert_eq!(set.cached_signatures(), 1);

        set.add_overload(Arc::new(HostCallback::new(|_, args| Ok(Value::Int(args.len() as i64)))));
        assert_eq!(set.cached_signatures(), 0);
        assert!(!set.flags().contains(CallFlags::IS_SORTED));
        // the callback outranks native overloads
        assert_eq!(set.call(&rt, None, &[Value::Int(1)]).unwrap(), Value::Int(1));
    }

    #[test]
    fn select_by_signature() {
        let set = set_of(vec![Typed::new("int", 0), Typed::new("float", 0)]);
        let only = set.select("float").unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only.callables()[0].signature(), "(float)");
        assert_eq!(set.select("( int )").unwrap().callables()[0].signature(), "(int)");
        assert_eq!(
            set.select("str").unwrap_err(),
            DispatchError::SignatureNotFound("str".into())
        );
    }

    #[test]
    fn doc_joins_overloads() {
        let set = set_of(vec![
            Typed::new("int", 0),
            Arc::new(HostCallback::new(|_, _| Ok(Value::None)).with_doc("host version")),
        ]);
        assert_eq!(set.doc(), "(int)\nhost version");
    }

    #[test]
    fn creator_heuristics() {
        let cb: Arc<dyn Callable> = Arc::new(HostCallback::new(|_, _| Ok(Value::None)));
        let clone = OverloadSet::new("Clone", vec![cb.clone()], CallFlags::empty(), MemoryPolicy::Heuristics);
        assert!(clone.is_creator());
        let strict = OverloadSet::new("Clone", vec![cb.clone()], CallFlags::empty(), MemoryPolicy::Strict);
        assert!(!strict.is_creator());
        strict.set_creator(true);
        assert!(strict.is_creator());

        strict.set_memory_policy(Some(MemoryPolicy::Strict));
        assert_eq!(strict.memory_policy(), Some(MemoryPolicy::Strict));
        strict.set_memory_policy(None);
        assert_eq!(strict.memory_policy(), None);
    }

    #[test]
    fn creator_heuristic_follows_policy_changes() {
        let cb: Arc<dyn Callable> = Arc::new(HostCallback::new(|_, _| Ok(Value::None)));
        let clone = OverloadSet::new("Clone", vec![cb.clone()], CallFlags::empty(), MemoryPolicy::Heuristics);
        clone.set_memory_policy(Some(MemoryPolicy::Strict));
        assert!(!clone.is_creator());
        clone.set_memory_policy(None);
        assert!(clone.is_creator());
        clone.set_creator(false);
        clone.set_memory_policy(Some(MemoryPolicy::Heuristics));
        assert!(!clone.is_creator());

        let strict = OverloadSet::new("Clone", vec![cb], CallFlags::empty(), MemoryPolicy::Strict);
        strict.set_memory_policy(Some(MemoryPolicy::Heuristics));
        assert!(strict.is_creator());
    }

    #[test]
    fn host_callbacks_receive_self() {
        let rt = runtime();
        let handle = rt
            .space
            .construct_proxy(crossbind_core::Address(0x1000), crossbind_core::ScopeId::new(1), crossbind_core::ProxyFlags::empty());
        let set = set_of(vec![Arc::new(HostCallback::new(|_, args| {
            Ok(Value::Int(args.len() as i64))
        }))]);
        assert_eq!(set.call(&rt, Some(handle), &[Value::Int(1)]).unwrap(), Value::Int(2));
        assert_eq!(rt.space.ref_count(handle), Some(1));
    }
}
