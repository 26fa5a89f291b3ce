//! Pooled arrays
//!
//! Every pooled kind has the same host operations, reached through its own
//! [`PoolArrayApi`] descriptor, so [`PoolArray`] is written once over the
//! element type. Element access goes through [`PoolRead`] / [`PoolWrite`]
//! guards, which hold the host's access handle for as long as the slice is
//! borrowed.

use std::marker::PhantomData;
use std::mem::{ManuallyDrop, MaybeUninit};
use std::ops::{Deref, DerefMut};

use paste::paste;

use crate::host::{HostSlice, HostStringArray};
use crate::math::{Color, Vector2, Vector3};
use crate::resolver::Core;
use crate::string::{CharString, GdString};
use crate::sys::{
    CoreApi, GodotInt, GodotPoolArray, GodotPoolReadAccess, GodotPoolWriteAccess, GodotReal,
    GodotString, PoolArrayApi, VariantType,
};
use crate::variant::{Variant, VariantRef};

/// Element type of a pooled array kind.
pub trait PoolElement: Sized + 'static {
    /// Variant tag of an array of this element
    const VARIANT_TYPE: VariantType;

    /// Host operations for this kind
    fn api(core: &CoreApi) -> &PoolArrayApi<Self>;
}

macro_rules! pool_elements {
    ($($elem:ty => $kind:ident;)*) => {
        paste! {
            $(
                impl PoolElement for $elem {
                    const VARIANT_TYPE: VariantType = VariantType::[<Pool $kind:camel Array>];

                    #[inline]
                    fn api(core: &CoreApi) -> &PoolArrayApi<Self> {
                        &core.[<pool_ $kind _array>]
                    }
                }

                pub type [<Pool $kind:camel Array>] = PoolArray<$elem>;
            )*
        }
    };
}

pool_elements! {
    u8 => byte;
    GodotInt => int;
    GodotReal => real;
    GodotString => string;
    Vector2 => vector2;
    Vector3 => vector3;
    Color => color;
}

/// Owned pooled array. Destroyed on drop.
pub struct PoolArray<E: PoolElement> {
    raw: GodotPoolArray,
    core: Core,
    _elem: PhantomData<E>,
}

impl<E: PoolElement> PoolArray<E> {
    pub fn new(core: Core) -> Self {
        let mut raw = MaybeUninit::uninit();
        // SAFETY: the host initializes `raw`
        unsafe {
            (E::api(core.api()).new)(raw.as_mut_ptr());
            Self::from_sys(core, raw.assume_init())
        }
    }

    /// Copy of the array held by `variant`
    pub fn from_variant(variant: VariantRef<'_>) -> Self {
        let core = variant.core();
        // SAFETY: the host returns a fresh copy owned by the caller
        unsafe { Self::from_sys(core, (E::api(core.api()).variant_as)(variant.sys())) }
    }

    /// Take ownership of a host pooled array of this kind.
    ///
    /// # Safety
    /// `raw` must be an initialized `E` array nobody else will destroy.
    #[inline]
    pub unsafe fn from_sys(core: Core, raw: GodotPoolArray) -> Self {
        Self {
            raw,
            core,
            _elem: PhantomData,
        }
    }

    #[must_use]
    pub fn into_sys(self) -> GodotPoolArray {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so `raw` is moved out exactly once
        unsafe { std::ptr::read(&this.raw) }
    }

    #[inline]
    pub fn sys(&self) -> *const GodotPoolArray {
        &self.raw
    }

    #[inline]
    pub fn core(&self) -> Core {
        self.core
    }

    #[inline]
    fn api(&self) -> &'static PoolArrayApi<E> {
        E::api(self.core.api())
    }

    /// Element count reported by the host
    pub fn len(&self) -> usize {
        // SAFETY: live array
        let len = unsafe { (self.api().size)(&self.raw) };
        usize::try_from(len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a copy of `value`.
    pub fn push(&mut self, value: &E) {
        unsafe { (self.api().append)(&mut self.raw, value) }
    }

    /// Grow or shrink to `len` elements.
    pub fn resize(&mut self, len: usize) {
        let len = GodotInt::try_from(len).unwrap_or(GodotInt::MAX);
        unsafe { (self.api().resize)(&mut self.raw, len) }
    }

    /// Overwrite the element at `index`. Out-of-range indices are the
    /// host's to report.
    pub fn set(&mut self, index: usize, value: &E) {
        let index = GodotInt::try_from(index).unwrap_or(GodotInt::MAX);
        unsafe { (self.api().set)(&mut self.raw, index, value) }
    }

    /// Lock the array for reading.
    pub fn read(&self) -> PoolRead<'_, E> {
        let api = self.api();
        let len = self.len();
        // SAFETY: the access handle is released by the guard
        unsafe {
            let access = (api.read)(&self.raw);
            let data = if access.is_null() {
                std::ptr::null()
            } else {
                (api.read_access_ptr)(access)
            };
            PoolRead {
                access,
                data,
                len,
                api,
                _array: PhantomData,
            }
        }
    }

    /// Lock the array for writing.
    pub fn write(&mut self) -> PoolWrite<'_, E> {
        let api = self.api();
        let len = self.len();
        // SAFETY: the access handle is released by the guard
        unsafe {
            let access = (api.write)(&mut self.raw);
            let data = if access.is_null() {
                std::ptr::null_mut()
            } else {
                (api.write_access_ptr)(access)
            };
            PoolWrite {
                access,
                data,
                len,
                api,
                _array: PhantomData,
            }
        }
    }

    pub fn to_variant(&self) -> Variant {
        Variant::from_pool_array(self)
    }
}

impl<E: PoolElement + Copy> PoolArray<E> {
    /// Array holding a copy of `items`. Input past `GodotInt::MAX` elements
    /// is cut off.
    pub fn from_slice(core: Core, items: &[E]) -> Self {
        let mut array = Self::new(core);
        array.resize(items.len());
        {
            let mut write = array.write();
            let n = write.len().min(items.len());
            write[..n].copy_from_slice(&items[..n]);
        }
        array
    }

    pub fn to_vec(&self) -> Vec<E> {
        self.read().to_vec()
    }

    /// Host-allocated copy of the contents. `None` if allocation fails.
    pub fn dup(&self) -> Option<HostSlice<E>> {
        HostSlice::copy_from(self.core, &self.read())
    }
}

impl<E: PoolElement + Copy + Default + PartialEq> PoolArray<E> {
    /// Array holding the items before the first zero element of `items`
    /// (all of them if there is none).
    pub fn from_terminated(core: Core, items: &[E]) -> Self {
        let zero = E::default();
        let end = items.iter().position(|e| *e == zero).unwrap_or(items.len());
        Self::from_slice(core, &items[..end])
    }
}

impl PoolArray<GodotString> {
    /// String array holding a copy of every item. Input past `GodotInt::MAX`
    /// items is cut off.
    pub fn from_strs<S: AsRef<str>>(core: Core, items: &[S]) -> Self {
        let mut array = Self::new(core);
        array.resize(items.len());
        for (i, item) in items.iter().enumerate() {
            let Ok(index) = GodotInt::try_from(i) else {
                break;
            };
            let s = GdString::from_str(core, item.as_ref());
            // SAFETY: the host copies the element; `s` is destroyed afterwards
            unsafe { (array.api().set)(&mut array.raw, index, s.sys()) };
        }
        array
    }

    /// UTF-8 encoding of every element
    pub fn to_utf8(&self) -> Vec<CharString> {
        let read = self.read();
        read.iter()
            // SAFETY: elements of a live read access
            .map(|s| unsafe { CharString::of(self.core, s) })
            .collect()
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.to_utf8()
            .iter()
            .map(|s| s.to_string_lossy().into_owned())
            .collect()
    }

    /// Host-allocated array of host-allocated C strings.
    /// `None` if any allocation fails.
    pub fn dup_strings(&self) -> Option<HostStringArray> {
        let encoded = self.to_utf8();
        HostStringArray::collect(self.core, encoded.iter().map(CharString::as_bytes))
    }
}

impl<E: PoolElement> Clone for PoolArray<E> {
    fn clone(&self) -> Self {
        let mut raw = MaybeUninit::uninit();
        // SAFETY: the host initializes `raw` from a live array
        unsafe {
            (self.api().new_copy)(raw.as_mut_ptr(), &self.raw);
            Self::from_sys(self.core, raw.assume_init())
        }
    }
}

impl<E: PoolElement> Drop for PoolArray<E> {
    fn drop(&mut self) {
        // SAFETY: owned array, destroyed once
        unsafe { (self.api().destroy)(&mut self.raw) }
    }
}

impl<E: PoolElement + Copy + std::fmt::Debug> std::fmt::Debug for PoolArray<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.read().iter()).finish()
    }
}

// =============================================================================
// Access guards
// =============================================================================

/// Read lock on a pooled array. Derefs to the element slice.
pub struct PoolRead<'a, E: PoolElement> {
    access: *mut GodotPoolReadAccess,
    data: *const E,
    len: usize,
    api: &'static PoolArrayApi<E>,
    _array: PhantomData<&'a PoolArray<E>>,
}

impl<E: PoolElement> Deref for PoolRead<'_, E> {
    type Target = [E];

    fn deref(&self) -> &[E] {
        if self.data.is_null() || self.len == 0 {
            return &[];
        }
        // SAFETY: the host keeps `len` elements readable while the access lives
        unsafe { std::slice::from_raw_parts(self.data, self.len) }
    }
}

impl<E: PoolElement> Drop for PoolRead<'_, E> {
    fn drop(&mut self) {
        if !self.access.is_null() {
            unsafe { (self.api.read_access_destroy)(self.access) }
        }
    }
}

/// Write lock on a pooled array. Derefs to the mutable element slice.
pub struct PoolWrite<'a, E: PoolElement> {
    access: *mut GodotPoolWriteAccess,
    data: *mut E,
    len: usize,
    api: &'static PoolArrayApi<E>,
    _array: PhantomData<&'a mut PoolArray<E>>,
}

impl<E: PoolElement> Deref for PoolWrite<'_, E> {
    type Target = [E];

    fn deref(&self) -> &[E] {
        if self.data.is_null() || self.len == 0 {
            return &[];
        }
        // SAFETY: see `deref_mut`
        unsafe { std::slice::from_raw_parts(self.data, self.len) }
    }
}

impl<E: PoolElement> DerefMut for PoolWrite<'_, E> {
    fn deref_mut(&mut self) -> &mut [E] {
        if self.data.is_null() || self.len == 0 {
            return &mut [];
        }
        // SAFETY: the host keeps `len` elements writable while the access
        // lives, and the guard borrows the array mutably
        unsafe { std::slice::from_raw_parts_mut(self.data, self.len) }
    }
}

impl<E: PoolElement> Drop for PoolWrite<'_, E> {
    fn drop(&mut self) {
        if !self.access.is_null() {
            unsafe { (self.api.write_access_destroy)(self.access) }
        }
    }
}
