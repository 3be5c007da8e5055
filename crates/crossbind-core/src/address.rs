//! Raw native addresses and unchecked memory access.
//!
//! Everything the native side hands across the boundary is an [`Address`]:
//! object instances, by-reference return storage, c-strings, and the
//! scratch copies a call context makes for const-reference arguments.
//!
//! The free functions in this module are the only places that dereference
//! such addresses. They are `unsafe` because the caller must guarantee that
//! the address is valid for the requested layout.

use std::ffi::CStr;
use std::fmt;

/// An untyped address in native memory.
///
/// A null address is a legitimate value: proxies may wrap a null object and
/// pointer-returning methods may return one.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Address(pub usize);

impl Address {
    /// The null address.
    pub const NULL: Address = Address(0);

    /// Create an address from a raw pointer.
    #[inline]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Address(ptr as usize)
    }

    /// Reinterpret this address as a typed pointer.
    #[inline]
    pub fn as_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Apply a signed byte offset, as produced by base-class offset queries.
    #[inline]
    pub fn offset(self, delta: isize) -> Self {
        Address(self.0.wrapping_add_signed(delta))
    }

    /// Byte distance of `self` past `base`, or `None` if `self` lies below it.
    #[inline]
    pub fn distance_from(self, base: Address) -> Option<usize> {
        self.0.checked_sub(base.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:#x})", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Layout of a native `std::string` as seen by this layer: a byte pointer
/// and a length, not necessarily NUL-terminated.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct NativeStr {
    pub ptr: *const u8,
    pub len: usize,
}

impl NativeStr {
    /// Copy the referenced bytes into an owned string.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for `len` bytes of reads.
    pub unsafe fn to_string_lossy(&self) -> String {
        if self.ptr.is_null() || self.len == 0 {
            return String::new();
        }
        // SAFETY: guaranteed by the caller.
        let bytes = unsafe { std::slice::from_raw_parts(self.ptr, self.len) };
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Read a `T` stored at `address`.
///
/// # Safety
///
/// `address` must be valid for reads of `size_of::<T>()` bytes.
#[inline]
pub unsafe fn read<T: Copy>(address: Address) -> T {
    // SAFETY: guaranteed by the caller.
    unsafe { std::ptr::read_unaligned(address.as_ptr::<T>()) }
}

/// Write a `T` to `address`.
///
/// # Safety
///
/// `address` must be valid for writes of `size_of::<T>()` bytes.
#[inline]
pub unsafe fn write<T: Copy>(address: Address, value: T) {
    // SAFETY: guaranteed by the caller.
    unsafe { std::ptr::write_unaligned(address.as_ptr::<T>(), value) }
}

/// Read a NUL-terminated c-string.
///
/// # Safety
///
/// `address` must be null or point to a NUL-terminated byte sequence.
pub unsafe fn read_c_str(address: Address) -> String {
    if address.is_null() {
        return String::new();
    }
    // SAFETY: guaranteed by the caller.
    let s = unsafe { CStr::from_ptr(address.as_ptr::<std::ffi::c_char>()) };
    s.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_and_distance() {
        let base = Address(0x1000);
        let inner = base.offset(0x18);
        assert_eq!(inner, Address(0x1018));
        assert_eq!(inner.distance_from(base), Some(0x18));
        assert_eq!(base.distance_from(inner), None);
        assert_eq!(inner.offset(-0x18), base);
    }

    #[test]
    fn null_address() {
        assert!(Address::NULL.is_null());
        assert!(!Address(8).is_null());
        assert_eq!(format!("{}", Address(255)), "0xff");
    }

    #[test]
    fn read_write_roundtrip() {
        let mut slot = 0i64;
        let address = Address::from_ptr(&mut slot as *mut i64);
        unsafe {
            write(address, -42i64);
            assert_eq!(read::<i64>(address), -42);
        }
        assert_eq!(slot, -42);
    }

    #[test]
    fn c_string_read() {
        let bytes = b"hello\0";
        let text = unsafe { read_c_str(Address::from_ptr(bytes.as_ptr())) };
        assert_eq!(text, "hello");
        assert_eq!(unsafe { read_c_str(Address::NULL) }, "");
    }
}
