//! Runtime argument-signature hashing.
//!
//! The dispatcher memoizes which overload answered a call, keyed by a cheap
//! hash of the arguments' *runtime type identity*, never their contents.
//! Each argument contributes a [`TypeTag`] and one "fresh temporary" bit,
//! mixed with a one-at-a-time scheme so that argument order matters.
//!
//! # Examples
//!
//! ```
//! use crossbind_core::signature::{ArgIdentity, SignatureHash, TypeTag};
//!
//! let int = ArgIdentity::new(TypeTag::from_name("int"), false);
//! let float = ArgIdentity::new(TypeTag::from_name("float"), false);
//!
//! let a = SignatureHash::compute([int, float]);
//! let b = SignatureHash::compute([float, int]);
//! assert_ne!(a, b);
//! ```

use std::fmt;

use xxhash_rust::xxh64::xxh64;

use crate::ids::ScopeId;

/// Domain-specific mixing constants.
pub mod hash_constants {
    /// Domain marker for host value type tags.
    pub const TYPE: u64 = 0x2fac10b63a6cc57c;

    /// Domain marker for proxies, mixed with the exact native class.
    pub const OBJECT: u64 = 0x7d3c8b4a92e15f6d;

    /// Added for an argument that is a fresh temporary.
    pub const FRESH: u64 = 0x9e3779b97f4a7c15;
}

/// Runtime type identity of one host value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct TypeTag(pub u64);

impl TypeTag {
    #[inline]
    pub fn from_name(name: &str) -> Self {
        TypeTag(hash_constants::TYPE ^ xxh64(name.as_bytes(), 0))
    }

    /// Identity of a proxy whose exact native class is `class`.
    #[inline]
    pub fn of_class(class: ScopeId) -> Self {
        TypeTag(hash_constants::OBJECT ^ xxh64(&class.raw().to_le_bytes(), 0))
    }
}

/// What one argument contributes to a signature hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgIdentity {
    pub tag: TypeTag,
    /// The host holds no other reference to the value.
    pub fresh: bool,
}

impl ArgIdentity {
    pub fn new(tag: TypeTag, fresh: bool) -> Self {
        Self { tag, fresh }
    }
}

/// Hash of an argument-type signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SignatureHash(pub u64);

impl SignatureHash {
    pub const EMPTY: SignatureHash = SignatureHash(0);

    /// Hash an ordered argument sequence.
    pub fn compute(args: impl IntoIterator<Item = ArgIdentity>) -> Self {
        let mut hash: u64 = 0;
        for arg in args {
            hash = hash.wrapping_add(arg.tag.0);
            if arg.fresh {
                hash = hash.wrapping_add(hash_constants::FRESH);
            }
            hash = hash.wrapping_add(hash << 10);
            hash ^= hash >> 6;
        }
        hash = hash.wrapping_add(hash << 3);
        hash ^= hash >> 11;
        hash = hash.wrapping_add(hash << 15);
        SignatureHash(hash)
    }
}

impl fmt::Debug for SignatureHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureHash({:#018x})", self.0)
    }
}
