use std::borrow::Cow;
use std::ffi::{CStr, c_char};
use std::mem::{ManuallyDrop, MaybeUninit};

use crate::host::HostCString;
use crate::resolver::Core;
use crate::sys::{GodotCharString, GodotInt, GodotString};

/// Owned engine string. Destroyed on drop.
pub struct GdString {
    raw: GodotString,
    core: Core,
}

impl GdString {
    /// Empty string
    pub fn new(core: Core) -> Self {
        let mut raw = MaybeUninit::uninit();
        // SAFETY: the host initializes `raw`
        unsafe {
            (core.string_new)(raw.as_mut_ptr());
            Self::from_sys(core, raw.assume_init())
        }
    }

    /// Decode `bytes` as UTF-8. Input past `GodotInt::MAX` bytes is cut off.
    pub fn from_bytes(core: Core, bytes: &[u8]) -> Self {
        let len = GodotInt::try_from(bytes.len()).unwrap_or(GodotInt::MAX);
        // SAFETY: the host reads exactly `len` bytes
        let raw = unsafe { (core.string_chars_to_utf8_with_len)(bytes.as_ptr().cast(), len) };
        Self { raw, core }
    }

    /// Sized construction from a Rust string.
    pub fn from_str(core: Core, s: &str) -> Self {
        Self::from_bytes(core, s.as_bytes())
    }

    /// Construction from a NUL-terminated string.
    pub fn from_c_str(core: Core, s: &CStr) -> Self {
        // SAFETY: `s` is terminated
        let raw = unsafe { (core.string_chars_to_utf8)(s.as_ptr()) };
        Self { raw, core }
    }

    /// Take ownership of a host string.
    ///
    /// # Safety
    /// `raw` must be an initialized string nobody else will destroy.
    #[inline]
    pub unsafe fn from_sys(core: Core, raw: GodotString) -> Self {
        Self { raw, core }
    }

    /// Hand ownership back to the host.
    #[must_use]
    pub fn into_sys(self) -> GodotString {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so `raw` is moved out exactly once
        unsafe { std::ptr::read(&this.raw) }
    }

    #[inline]
    pub fn sys(&self) -> *const GodotString {
        &self.raw
    }

    /// Bitwise alias for embedding in a host payload struct. The alias must
    /// not be destroyed, and must not outlive `self`.
    pub(crate) fn alias(&self) -> GodotString {
        // SAFETY: plain bit copy; ownership stays with `self`
        unsafe { std::ptr::read(&self.raw) }
    }

    #[inline]
    pub fn core(&self) -> Core {
        self.core
    }

    /// Length in characters, as counted by the host
    pub fn len(&self) -> usize {
        // SAFETY: live string
        let len = unsafe { (self.core.string_length)(&self.raw) };
        usize::try_from(len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// UTF-8 encoding of the string
    pub fn to_utf8(&self) -> CharString {
        // SAFETY: live string; the returned char string is ours
        unsafe { CharString::of(self.core, &self.raw) }
    }

    /// Host-allocated, NUL-terminated UTF-8 copy. `None` if allocation fails.
    pub fn dup(&self) -> Option<HostCString> {
        HostCString::copy_from(self.core, self.to_utf8().as_bytes())
    }
}

impl Clone for GdString {
    fn clone(&self) -> Self {
        let mut raw = MaybeUninit::uninit();
        // SAFETY: the host initializes `raw` from a live string
        unsafe {
            (self.core.string_new_copy)(raw.as_mut_ptr(), &self.raw);
            Self::from_sys(self.core, raw.assume_init())
        }
    }
}

impl Drop for GdString {
    fn drop(&mut self) {
        // SAFETY: owned string, destroyed once
        unsafe { (self.core.string_destroy)(&mut self.raw) }
    }
}

impl std::fmt::Display for GdString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_utf8().to_string_lossy())
    }
}

impl std::fmt::Debug for GdString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&*self.to_utf8().to_string_lossy(), f)
    }
}

/// Owned UTF-8 encoding of an engine string. Destroyed on drop.
pub struct CharString {
    raw: GodotCharString,
    core: Core,
}

impl CharString {
    /// UTF-8 encode a host string.
    ///
    /// # Safety
    /// `string` must point to a live string.
    pub unsafe fn of(core: Core, string: *const GodotString) -> Self {
        let raw = unsafe { (core.string_utf8)(string) };
        Self { raw, core }
    }

    /// Length in bytes, terminator excluded
    pub fn len(&self) -> usize {
        // SAFETY: live char string
        let len = unsafe { (self.core.char_string_length)(&self.raw) };
        usize::try_from(len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pointer to the encoded bytes, valid while `self` lives
    pub fn as_ptr(&self) -> *const c_char {
        // SAFETY: live char string
        unsafe { (self.core.char_string_get_data)(&self.raw) }
    }

    pub fn as_bytes(&self) -> &[u8] {
        let ptr = self.as_ptr();
        let len = self.len();
        if ptr.is_null() || len == 0 {
            return &[];
        }
        // SAFETY: host storage of `len` bytes owned by `self`
        unsafe { std::slice::from_raw_parts(ptr.cast(), len) }
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }
}

impl Drop for CharString {
    fn drop(&mut self) {
        // SAFETY: owned char string, destroyed once
        unsafe { (self.core.char_string_destroy)(&mut self.raw) }
    }
}

impl std::fmt::Debug for CharString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&*self.to_string_lossy(), f)
    }
}
