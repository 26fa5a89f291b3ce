//! Memory owned by the host allocator
//!
//! Everything handed out here was allocated with the core table's `alloc`
//! and goes back through its `free`. The owning handles do that on drop;
//! `into_raw` gives the pointer away when it has to outlive Rust (e.g. when
//! it's passed to C code that calls the host's free itself).

use std::ffi::{CStr, c_char, c_int};
use std::ptr::{self, NonNull};

use crate::resolver::Core;

/// Allocate `bytes` with the host allocator.
///
/// `None` when the host reports failure or the size doesn't fit the host's
/// `int` size argument.
pub fn alloc(core: Core, bytes: usize) -> Option<NonNull<u8>> {
    let Ok(size) = c_int::try_from(bytes) else {
        tracing::warn!(target: "gdnhl", bytes, "allocation larger than the host accepts");
        return None;
    };
    // SAFETY: plain host allocation
    let ptr = NonNull::new(unsafe { (core.alloc)(size) }.cast::<u8>());
    if ptr.is_none() {
        tracing::warn!(target: "gdnhl", bytes, "host allocation failed");
    }
    ptr
}

/// Resize a host allocation.
///
/// # Safety
/// `ptr` must be null or come from the host allocator and not be used after
/// this call unless it's returned unchanged.
pub unsafe fn realloc(core: Core, ptr: *mut u8, bytes: usize) -> Option<NonNull<u8>> {
    let size = c_int::try_from(bytes).ok()?;
    NonNull::new(unsafe { (core.realloc)(ptr.cast(), size) }.cast::<u8>())
}

/// Release a host allocation. Null is ignored.
///
/// # Safety
/// `ptr` must be null or come from the host allocator, and not be freed twice.
pub unsafe fn free(core: Core, ptr: *mut u8) {
    if !ptr.is_null() {
        unsafe { (core.free)(ptr.cast()) }
    }
}

// =============================================================================
// Typed slices
// =============================================================================

/// Host-allocated copy of a slice of plain values.
pub struct HostSlice<E: Copy> {
    ptr: NonNull<E>,
    len: usize,
    core: Core,
}

impl<E: Copy> HostSlice<E> {
    /// Copy `src` into a fresh host allocation.
    pub fn copy_from(core: Core, src: &[E]) -> Option<Self> {
        let ptr = alloc(core, std::mem::size_of_val(src))?.cast::<E>();
        // SAFETY: the allocation holds `src.len()` elements and is disjoint from `src`
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), ptr.as_ptr(), src.len()) };
        Some(Self {
            ptr,
            len: src.len(),
            core,
        })
    }

    /// Take ownership of a host allocation holding `len` elements.
    ///
    /// # Safety
    /// `ptr` must come from the host allocator and hold `len` initialized `E`s.
    pub unsafe fn from_raw(core: Core, ptr: NonNull<E>, len: usize) -> Self {
        Self { ptr, len, core }
    }

    /// Give up ownership. The caller releases the pointer with [`free`].
    #[must_use]
    pub fn into_raw(self) -> (*mut E, usize) {
        let this = std::mem::ManuallyDrop::new(self);
        (this.ptr.as_ptr(), this.len)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_ptr(&self) -> *const E {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn as_slice(&self) -> &[E] {
        // SAFETY: owned allocation of `len` initialized elements
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<E: Copy> std::ops::Deref for HostSlice<E> {
    type Target = [E];

    fn deref(&self) -> &[E] {
        self.as_slice()
    }
}

impl<E: Copy> Drop for HostSlice<E> {
    fn drop(&mut self) {
        unsafe { free(self.core, self.ptr.as_ptr().cast()) }
    }
}

impl<E: Copy + std::fmt::Debug> std::fmt::Debug for HostSlice<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

// =============================================================================
// C strings
// =============================================================================

/// Host-allocated, NUL-terminated UTF-8 string.
pub struct HostCString {
    ptr: NonNull<c_char>,
    len: usize,
    core: Core,
}

impl HostCString {
    /// Copy `bytes` and append a terminator.
    pub fn copy_from(core: Core, bytes: &[u8]) -> Option<Self> {
        let ptr = alloc(core, bytes.len() + 1)?;
        // SAFETY: allocation holds `bytes.len() + 1` bytes
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len());
            ptr.as_ptr().add(bytes.len()).write(0);
        }
        Some(Self {
            ptr: ptr.cast(),
            len: bytes.len(),
            core,
        })
    }

    /// Take ownership of a host-allocated C string.
    ///
    /// # Safety
    /// `ptr` must come from the host allocator and be NUL-terminated.
    pub unsafe fn from_raw(core: Core, ptr: NonNull<c_char>) -> Self {
        let len = unsafe { CStr::from_ptr(ptr.as_ptr()) }.count_bytes();
        Self { ptr, len, core }
    }

    /// Give up ownership. The caller releases the pointer with [`free`].
    #[must_use]
    pub fn into_raw(self) -> *mut c_char {
        std::mem::ManuallyDrop::new(self).ptr.as_ptr()
    }

    /// Length in bytes, terminator excluded
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_ptr(&self) -> *const c_char {
        self.ptr.as_ptr()
    }

    /// Contents without the terminator
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: `len` bytes plus terminator were written at construction
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().cast(), self.len) }
    }

    /// Contents up to the first NUL
    pub fn as_c_str(&self) -> &CStr {
        // SAFETY: terminated at `len` at the latest
        unsafe { CStr::from_ptr(self.ptr.as_ptr()) }
    }

    pub fn to_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(self.as_bytes())
    }
}

impl Drop for HostCString {
    fn drop(&mut self) {
        unsafe { free(self.core, self.ptr.as_ptr().cast()) }
    }
}

impl std::fmt::Debug for HostCString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self.as_c_str(), f)
    }
}

// =============================================================================
// String arrays
// =============================================================================

/// Host-allocated array of host-allocated C strings.
///
/// Dropping it frees every element, then the array.
pub struct HostStringArray {
    ptr: NonNull<*mut c_char>,
    len: usize,
    core: Core,
}

impl HostStringArray {
    /// Copy every item into its own host C string.
    ///
    /// `None` if any allocation fails; whatever was already copied is freed.
    pub fn collect<I, B>(core: Core, items: I) -> Option<Self>
    where
        I: ExactSizeIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let len = items.len();
        let ptr = alloc(core, len * std::mem::size_of::<*mut c_char>())?.cast::<*mut c_char>();
        // SAFETY: slots are nulled first so a partially filled array drops cleanly
        unsafe {
            for i in 0..len {
                ptr.as_ptr().add(i).write(ptr::null_mut());
            }
        }
        let array = Self { ptr, len, core };

        for (i, item) in items.take(len).enumerate() {
            let s = HostCString::copy_from(core, item.as_ref())?;
            unsafe { array.ptr.as_ptr().add(i).write(s.into_raw()) };
        }
        Some(array)
    }

    /// Take ownership of a host array of `len` host C strings.
    ///
    /// # Safety
    /// `ptr` and every non-null element must come from the host allocator.
    pub unsafe fn from_raw(core: Core, ptr: NonNull<*mut c_char>, len: usize) -> Self {
        Self { ptr, len, core }
    }

    /// Give up ownership. Release later with [`HostStringArray::from_raw`].
    #[must_use]
    pub fn into_raw(self) -> (*mut *mut c_char, usize) {
        let this = std::mem::ManuallyDrop::new(self);
        (this.ptr.as_ptr(), this.len)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Element at `index`, `None` if out of range or null
    pub fn get(&self, index: usize) -> Option<&CStr> {
        if index >= self.len {
            return None;
        }
        // SAFETY: in bounds; elements are null or terminated host strings
        unsafe {
            let item = *self.ptr.as_ptr().add(index);
            (!item.is_null()).then(|| CStr::from_ptr(item))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&CStr>> + '_ {
        (0..self.len).map(|i| self.get(i))
    }
}

impl Drop for HostStringArray {
    fn drop(&mut self) {
        unsafe {
            for i in 0..self.len {
                free(self.core, (*self.ptr.as_ptr().add(i)).cast());
            }
            free(self.core, self.ptr.as_ptr().cast());
        }
    }
}

impl std::fmt::Debug for HostStringArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
