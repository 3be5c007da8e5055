//! Bridge-wide defaults.
//!
//! Every overload set starts from these; the per-set setters on
//! [`OverloadSet`](crate::OverloadSet) override them.

use crossbind_core::{CallFlags, MemoryPolicy, SignalPolicy};

/// Configuration of a [`Bridge`](crate::Bridge).
///
/// ```ignore
/// let config = BridgeConfig::default()
///     .with_memory_policy(MemoryPolicy::Strict)
///     .with_signal_policy(SignalPolicy::Fast);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeConfig {
    pub memory_policy: MemoryPolicy,
    pub signal_policy: SignalPolicy,
    /// Log a one-time warning for each type string no handler knows.
    pub warn_unknown_types: bool,
    /// Release the host lock around every native call by default.
    pub release_host_lock: bool,
    /// Keep smart-pointer results wrapped in smart-pointer proxies.
    pub manage_smart_ptr: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            memory_policy: MemoryPolicy::Heuristics,
            signal_policy: SignalPolicy::Safe,
            warn_unknown_types: true,
            release_host_lock: false,
            manage_smart_ptr: true,
        }
    }
}

impl BridgeConfig {
    pub fn with_memory_policy(mut self, policy: MemoryPolicy) -> Self {
        self.memory_policy = policy;
        self
    }

    pub fn with_signal_policy(mut self, policy: SignalPolicy) -> Self {
        self.signal_policy = policy;
        self
    }

    pub fn with_unknown_type_warnings(mut self, enabled: bool) -> Self {
        self.warn_unknown_types = enabled;
        self
    }

    pub fn with_release_host_lock(mut self, enabled: bool) -> Self {
        self.release_host_lock = enabled;
        self
    }

    pub fn with_manage_smart_ptr(mut self, enabled: bool) -> Self {
        self.manage_smart_ptr = enabled;
        self
    }

    /// Flags a freshly created overload set starts with.
    pub fn overload_flags(&self) -> CallFlags {
        let mut flags = CallFlags::empty();
        flags.set(CallFlags::MANAGE_SMART_PTR, self.manage_smart_ptr);
        flags.set(CallFlags::RELEASE_HOST_LOCK, self.release_host_lock);
        flags
    }
}
