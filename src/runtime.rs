//! Shared state every call needs.

use std::sync::Arc;

use crossbind_core::{CallFlags, ObjectSpace, Reflection};
use crossbind_marshal::{ConverterRegistry, ExecutorRegistry};

use crate::config::BridgeConfig;

/// The object space and marshaling registries of one bridge.
#[derive(Debug)]
pub struct Runtime {
    pub space: ObjectSpace,
    pub converters: ConverterRegistry,
    pub executors: ExecutorRegistry,
    pub config: BridgeConfig,
}

impl Runtime {
    pub fn new(reflection: Arc<dyn Reflection>, config: BridgeConfig) -> Self {
        Self {
            converters: ConverterRegistry::new(reflection.clone(), config.warn_unknown_types),
            executors: ExecutorRegistry::new(reflection.clone(), config.warn_unknown_types),
            space: ObjectSpace::new(reflection),
            config,
        }
    }

    pub fn reflection(&self) -> &dyn Reflection {
        self.space.reflection()
    }

    /// Flags of a call made under `set_flags`.
    ///
    /// Policy bits present on the set win; otherwise the configured memory
    /// and signal policies apply.
    pub fn call_flags(&self, set_flags: CallFlags) -> CallFlags {
        let mut flags = set_flags
            & (CallFlags::USE_HEURISTICS
                | CallFlags::USE_STRICT
                | CallFlags::MANAGE_SMART_PTR
                | CallFlags::RELEASE_HOST_LOCK
                | CallFlags::SAFE_SIGNALS
                | CallFlags::FAST_SIGNALS
                | CallFlags::IS_CREATOR
                | CallFlags::IS_CONSTRUCTOR);
        if !flags.intersects(CallFlags::USE_HEURISTICS | CallFlags::USE_STRICT) {
            flags |= self.config.memory_policy.flag();
        }
        if !flags.intersects(CallFlags::SAFE_SIGNALS | CallFlags::FAST_SIGNALS) {
            flags |= self.config.signal_policy.flag();
        }
        flags
    }
}
