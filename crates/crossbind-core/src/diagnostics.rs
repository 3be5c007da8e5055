//! One-time diagnostics.

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tracing::warn;

/// Emits each distinct warning at most once.
#[derive(Debug, Default)]
pub struct WarnOnce {
    seen: Mutex<FxHashSet<String>>,
    enabled: bool,
}

impl WarnOnce {
    pub fn new(enabled: bool) -> Self {
        Self {
            seen: Mutex::new(FxHashSet::default()),
            enabled,
        }
    }

    /// Log `message` the first time `key` is seen. Returns whether it was
    /// logged.
    pub fn warn(&self, key: &str, message: impl FnOnce() -> String) -> bool {
        if !self.enabled || !self.seen.lock().insert(key.to_string()) {
            return false;
        }
        warn!("{}", message());
        true
    }
}
