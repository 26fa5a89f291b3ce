use std::ffi::c_int;
use std::mem::{ManuallyDrop, MaybeUninit};

use crate::convert::{FromVariant, ToVariant};
use crate::resolver::Core;
use crate::sys::{GodotArray, GodotInt, GodotVariant};
use crate::variant::{Variant, VariantRef};

fn to_index(index: usize) -> GodotInt {
    GodotInt::try_from(index).unwrap_or(GodotInt::MAX)
}

/// Owned engine array. Destroyed on drop.
pub struct Array {
    raw: GodotArray,
    core: Core,
}

impl Array {
    pub fn new(core: Core) -> Self {
        let mut raw = MaybeUninit::uninit();
        // SAFETY: the host initializes `raw`
        unsafe {
            (core.array_new)(raw.as_mut_ptr());
            Self::from_sys(core, raw.assume_init())
        }
    }

    /// # Safety
    /// `raw` must be an initialized array nobody else will destroy.
    #[inline]
    pub unsafe fn from_sys(core: Core, raw: GodotArray) -> Self {
        Self { raw, core }
    }

    #[must_use]
    pub fn into_sys(self) -> GodotArray {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so `raw` is moved out exactly once
        unsafe { std::ptr::read(&this.raw) }
    }

    #[inline]
    pub fn sys(&self) -> *const GodotArray {
        &self.raw
    }

    #[inline]
    pub fn as_ref(&self) -> ArrayRef<'_> {
        ArrayRef {
            raw: &self.raw,
            core: self.core,
        }
    }

    /// Append a copy of `value` converted to a variant.
    pub fn push<T: ToVariant + ?Sized>(&mut self, value: &T) {
        let variant = value.to_variant(self.core);
        // SAFETY: the host copies the variant
        unsafe { (self.core.array_append)(&mut self.raw, variant.sys()) }
    }

    pub fn len(&self) -> usize {
        self.as_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Variant {
        self.as_ref().get(index)
    }

    pub fn get_as<T: FromVariant>(&self, index: usize) -> T {
        self.as_ref().get_as(index)
    }
}

impl Drop for Array {
    fn drop(&mut self) {
        // SAFETY: owned array, destroyed once
        unsafe { (self.core.array_destroy)(&mut self.raw) }
    }
}

/// Borrowed engine array, e.g. the argument array of a native call.
#[derive(Clone, Copy)]
pub struct ArrayRef<'a> {
    raw: &'a GodotArray,
    core: Core,
}

impl<'a> ArrayRef<'a> {
    /// # Safety
    /// `raw` must be non-null and point to an array that stays alive and
    /// unmodified for `'a`.
    #[inline]
    pub unsafe fn from_sys(core: Core, raw: *const GodotArray) -> Self {
        Self {
            raw: unsafe { &*raw },
            core,
        }
    }

    #[inline]
    pub fn core(self) -> Core {
        self.core
    }

    pub fn len(self) -> usize {
        // SAFETY: live array
        let len = unsafe { (self.core.array_size)(self.raw) };
        usize::try_from(len).unwrap_or(0)
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    /// Copy of the element at `index`. Out-of-range indices are the host's
    /// to report; it returns nil for them.
    pub fn get(self, index: usize) -> Variant {
        // SAFETY: the returned variant is a fresh copy owned by the caller
        unsafe { Variant::from_sys(self.core, (self.core.array_get)(self.raw, to_index(index))) }
    }

    /// Borrow the element at `index` without copying it. `None` when the
    /// host hands back no element.
    pub fn get_ref(self, index: usize) -> Option<VariantRef<'a>> {
        // SAFETY: element storage lives as long as the array
        unsafe {
            let ptr = (self.core.array_operator_index_const)(self.raw, to_index(index));
            (!ptr.is_null()).then(|| VariantRef::from_sys(self.core, ptr))
        }
    }

    /// Element at `index` converted to `T`
    pub fn get_as<T: FromVariant>(self, index: usize) -> T {
        match self.get_ref(index) {
            Some(element) => T::from_variant(element),
            None => T::from_variant(self.get(index).as_ref()),
        }
    }
}

/// Arguments of a NativeScript method call.
#[derive(Clone, Copy)]
pub struct Args<'a> {
    args: &'a [*mut GodotVariant],
    core: Core,
}

impl<'a> Args<'a> {
    /// # Safety
    /// `args` must point to `num_args` valid variant pointers that outlive `'a`.
    pub unsafe fn from_sys(core: Core, num_args: c_int, args: *mut *mut GodotVariant) -> Self {
        let len = usize::try_from(num_args).unwrap_or(0);
        let args = if args.is_null() || len == 0 {
            &[][..]
        } else {
            unsafe { std::slice::from_raw_parts(args.cast_const(), len) }
        };
        Self { args, core }
    }

    #[inline]
    pub fn len(self) -> usize {
        self.args.len()
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.args.is_empty()
    }

    /// Borrow argument `index`, `None` if it wasn't passed
    pub fn get_ref(self, index: usize) -> Option<VariantRef<'a>> {
        let ptr = *self.args.get(index)?;
        // SAFETY: argument pointers live for the duration of the call
        (!ptr.is_null()).then(|| unsafe { VariantRef::from_sys(self.core, ptr) })
    }

    /// Argument `index` converted to `T`. Missing arguments convert from nil.
    pub fn get<T: FromVariant>(self, index: usize) -> T {
        match self.get_ref(index) {
            Some(arg) => T::from_variant(arg),
            None => T::from_variant(Variant::nil(self.core).as_ref()),
        }
    }

    pub fn iter(self) -> impl Iterator<Item = VariantRef<'a>> {
        (0..self.len()).filter_map(move |i| self.get_ref(i))
    }
}
