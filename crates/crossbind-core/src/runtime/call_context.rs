//! Per-call state bridging converters, executors, and the native call.

use std::panic::{self, AssertUnwindSafe};

use bitflags::bitflags;
use bumpalo::Bump;

use crate::address::{Address, NativeStr};
use crate::error::NativeFault;
use crate::host_lock::HOST_LOCK;
use crate::ids::{MethodId, ScopeId};
use crate::parameter::{Parameter, SlotValue};
use crate::reflection::Reflection;
use crate::value::Value;

use super::{ObjectSpace, ProxyHandle};

bitflags! {
    /// Configuration of one call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CallFlags: u32 {
        /// Heuristic ownership transfer (e.g. `Clone` methods are creators).
        const USE_HEURISTICS = 1 << 0;
        /// Ownership only moves when explicitly requested.
        const USE_STRICT = 1 << 1;
        /// Release the host lock for the duration of the native call.
        const RELEASE_HOST_LOCK = 1 << 2;
        /// Ownership of the result passes to the caller.
        const IS_CREATOR = 1 << 3;
        const IS_CONSTRUCTOR = 1 << 4;
        /// Keep smart-pointer results wrapped in smart-pointer proxies.
        const MANAGE_SMART_PTR = 1 << 5;
        /// Trap native faults and report them as errors.
        const SAFE_SIGNALS = 1 << 6;
        const FAST_SIGNALS = 1 << 7;
        /// The owning overload set has been priority-sorted.
        const IS_SORTED = 1 << 8;
    }
}

/// Ownership policy applied when no per-call flag overrides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryPolicy {
    #[default]
    Heuristics,
    Strict,
}

impl MemoryPolicy {
    pub fn flag(self) -> CallFlags {
        match self {
            MemoryPolicy::Heuristics => CallFlags::USE_HEURISTICS,
            MemoryPolicy::Strict => CallFlags::USE_STRICT,
        }
    }
}

/// Whether native faults are trapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalPolicy {
    Fast,
    #[default]
    Safe,
}

impl SignalPolicy {
    pub fn flag(self) -> CallFlags {
        match self {
            SignalPolicy::Fast => CallFlags::FAST_SIGNALS,
            SignalPolicy::Safe => CallFlags::SAFE_SIGNALS,
        }
    }
}

/// Context for one native call.
///
/// Holds the argument slots converters fill, the call's flags, and a
/// scratch arena for values that must outlive conversion but not the call:
/// const-reference copies and temporary strings. Built per call and never
/// shared.
///
/// ```ignore
/// let mut ctx = CallContext::new(&space, CallFlags::SAFE_SIGNALS);
/// let param = converter.set_arg(&Value::Int(3), &mut ctx)?;
/// ctx.args.push(param);
/// let result = ctx.invoke(method, this)?;
/// ```
pub struct CallContext<'s> {
    pub args: Vec<Parameter>,
    pub flags: CallFlags,
    arena: Bump,
    space: &'s ObjectSpace,
    assignable: Option<Value>,
    reseats: Vec<(ProxyHandle, Address)>,
}

impl<'s> CallContext<'s> {
    pub fn new(space: &'s ObjectSpace, flags: CallFlags) -> Self {
        Self {
            args: Vec::new(),
            flags,
            arena: Bump::new(),
            space,
            assignable: None,
            reseats: Vec::new(),
        }
    }

    pub fn space(&self) -> &'s ObjectSpace {
        self.space
    }

    pub fn reflection(&self) -> &'s dyn Reflection {
        self.space.reflection()
    }

    // ========================================================================
    // Flags
    // ========================================================================

    /// Ownership moves only on explicit request.
    pub fn use_strict_ownership(&self) -> bool {
        self.flags.contains(CallFlags::USE_STRICT)
    }

    pub fn is_creator(&self) -> bool {
        self.flags.contains(CallFlags::IS_CREATOR)
    }

    pub fn is_constructor(&self) -> bool {
        self.flags.contains(CallFlags::IS_CONSTRUCTOR)
    }

    pub fn manages_smart_ptr(&self) -> bool {
        self.flags.contains(CallFlags::MANAGE_SMART_PTR)
    }

    // ========================================================================
    // Scratch storage
    // ========================================================================

    /// Copy `value` into the arena; valid until the context is dropped.
    pub fn alloc<T: Copy>(&self, value: T) -> Address {
        Address::from_ptr(self.arena.alloc(value) as *const T)
    }

    /// Copy a slot's payload into the arena at its native width.
    pub fn alloc_slot(&self, slot: SlotValue) -> Address {
        match slot {
            SlotValue::Bool(v) => self.alloc(v as u8),
            SlotValue::Int8(v) => self.alloc(v),
            SlotValue::UInt8(v) => self.alloc(v),
            SlotValue::Int16(v) => self.alloc(v),
            SlotValue::UInt16(v) => self.alloc(v),
            SlotValue::Int32(v) => self.alloc(v),
            SlotValue::UInt32(v) => self.alloc(v),
            SlotValue::Int64(v) => self.alloc(v),
            SlotValue::UInt64(v) => self.alloc(v),
            SlotValue::Float32(v) => self.alloc(v),
            SlotValue::Float64(v) | SlotValue::LongDouble(v) => self.alloc(v),
            SlotValue::Address(v) => self.alloc(v.0),
        }
    }

    /// NUL-terminated copy of `s`.
    pub fn alloc_c_str(&self, s: &str) -> Address {
        let bytes = self.arena.alloc_slice_fill_copy(s.len() + 1, 0u8);
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        Address::from_ptr(bytes.as_ptr())
    }

    /// A native string object holding a copy of `s`; returns its address.
    pub fn alloc_native_str(&self, s: &str) -> Address {
        let bytes = self.arena.alloc_slice_copy(s.as_bytes());
        self.alloc(NativeStr {
            ptr: bytes.as_ptr(),
            len: bytes.len(),
        })
    }

    // ========================================================================
    // By-reference return assignment
    // ========================================================================

    /// Value to store through a reference-returning call's result.
    pub fn set_assignable(&mut self, value: Value) {
        self.assignable = Some(value);
    }

    pub fn take_assignable(&mut self) -> Option<Value> {
        self.assignable.take()
    }

    // ========================================================================
    // Pointer write-back
    // ========================================================================

    /// Pass `handle`'s object pointer through a scratch cell the callee may
    /// overwrite; the proxy is reseated to the cell's final value by
    /// [`apply_reseats`](Self::apply_reseats).
    pub fn pointer_cell(&mut self, handle: ProxyHandle, object: Address) -> Address {
        let cell = self.alloc(object.0);
        self.reseats.push((handle, cell));
        cell
    }

    /// Reseat proxies whose pointer cells the callee rewrote.
    pub fn apply_reseats(&mut self) {
        for (handle, cell) in std::mem::take(&mut self.reseats) {
            // SAFETY: cells are arena allocations that live as long as `self`.
            let target = Address(unsafe { crate::address::read::<usize>(cell) });
            if self.space.get_object(handle) != Some(target) {
                self.space.reseat(handle, target);
            }
        }
    }

    // ========================================================================
    // Invocation
    // ========================================================================

    /// Invoke `method` with the converted arguments.
    ///
    /// Releases the host lock around the call when `RELEASE_HOST_LOCK` is
    /// set, and traps panics from the native side when `SAFE_SIGNALS` is.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn invoke(
        &self,
        method: MethodId,
        this: Address,
    ) -> Result<Option<SlotValue>, NativeFault> {
        let reflection = self.reflection();
        let args = self.args.as_slice();
        self.guarded(|| reflection.invoke(method, this, args))
    }

    /// Run constructor `method` of `class` with the converted arguments.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn construct(&self, method: MethodId, class: ScopeId) -> Result<Address, NativeFault> {
        let reflection = self.reflection();
        let args = self.args.as_slice();
        self.guarded(|| reflection.construct(method, class, args))
    }

    fn guarded<R>(&self, call: impl FnOnce() -> Result<R, NativeFault>) -> Result<R, NativeFault> {
        let safe = self.flags.contains(CallFlags::SAFE_SIGNALS);
        let run = move || {
            if safe {
                panic::catch_unwind(AssertUnwindSafe(call))
                    .unwrap_or_else(|payload| Err(NativeFault(panic_message(payload.as_ref()))))
            } else {
                call()
            }
        };
        if self.flags.contains(CallFlags::RELEASE_HOST_LOCK) {
            HOST_LOCK.release_during(run)
        } else {
            run()
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown native fault".to_string()
    }
}
