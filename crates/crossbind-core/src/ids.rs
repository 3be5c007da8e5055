//! Opaque handles issued by the reflection service.
//!
//! The reflection service identifies native scopes (classes, structs,
//! namespaces) and methods by opaque integers. These newtypes keep the two
//! from being confused with each other or with raw addresses.

use std::fmt;

/// Identifies a native scope: a class, struct, or namespace.
///
/// # Example
///
/// ```
/// use crossbind_core::ScopeId;
///
/// let scope = ScopeId::new(7);
/// assert_eq!(scope.raw(), 7);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope_{}", self.0)
    }
}

impl From<u64> for ScopeId {
    fn from(raw: u64) -> Self {
        Self::new(raw)
    }
}

/// Identifies one native method, constructor, or free function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(u64);

impl MethodId {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "method_{}", self.0)
    }
}

impl From<u64> for MethodId {
    fn from(raw: u64) -> Self {
        Self::new(raw)
    }
}
