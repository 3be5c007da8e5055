//! The host runtime's single execution lock.
//!
//! All marshaling and dispatch runs with the lock held. The only suspension
//! point is [`HostLock::release_during`], used for one native call when the
//! call context carries `RELEASE_HOST_LOCK`: the lock is given up for the
//! duration of the call and reacquired before control returns, even if the
//! call unwinds.

use std::cell::Cell;
use std::marker::PhantomData;

use parking_lot::RawMutex;
use parking_lot::lock_api::RawMutex as _;

thread_local! {
    static HELD: Cell<bool> = const { Cell::new(false) };
}

/// The process-wide host lock.
pub static HOST_LOCK: HostLock = HostLock::new();

pub struct HostLock {
    raw: RawMutex,
}

impl HostLock {
    pub const fn new() -> Self {
        Self { raw: RawMutex::INIT }
    }

    /// Block until the lock is held by the current thread.
    pub fn acquire(&self) -> HostGuard<'_> {
        self.raw.lock();
        HELD.with(|h| h.set(true));
        HostGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    pub fn try_acquire(&self) -> Option<HostGuard<'_>> {
        if !self.raw.try_lock() {
            return None;
        }
        HELD.with(|h| h.set(true));
        Some(HostGuard {
            lock: self,
            _not_send: PhantomData,
        })
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        HELD.with(|h| h.get())
    }

    /// Run `f` with the lock released, if the current thread holds it.
    pub fn release_during<R>(&self, f: impl FnOnce() -> R) -> R {
        if !self.is_held_by_current_thread() {
            return f();
        }
        HELD.with(|h| h.set(false));
        // SAFETY: the current thread holds the lock.
        unsafe { self.raw.unlock() };
        let _relock = Relock(self);
        f()
    }
}

impl Default for HostLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds the host lock until dropped.
pub struct HostGuard<'a> {
    lock: &'a HostLock,
    _not_send: PhantomData<*const ()>,
}

impl Drop for HostGuard<'_> {
    fn drop(&mut self) {
        HELD.with(|h| h.set(false));
        // SAFETY: the guard proves the current thread holds the lock.
        unsafe { self.lock.raw.unlock() };
    }
}

struct Relock<'a>(&'a HostLock);

impl Drop for Relock<'_> {
    fn drop(&mut self) {
        self.0.raw.lock();
        HELD.with(|h| h.set(true));
    }
}
