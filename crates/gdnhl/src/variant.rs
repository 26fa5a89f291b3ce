use std::ffi::CStr;
use std::mem::{ManuallyDrop, MaybeUninit};

use crate::buffer::Buffer;
use crate::convert::{FromVariant, ToVariant};
use crate::math::{Color, Vector2, Vector3};
use crate::pool::{PoolArray, PoolElement};
use crate::resolver::Core;
use crate::string::GdString;
use crate::sys::{GodotString, GodotVariant, VariantType};

/// Owned variant. Destroyed on drop.
pub struct Variant {
    raw: GodotVariant,
    core: Core,
}

/// Borrowed variant, e.g. a method argument or an array element.
#[derive(Clone, Copy)]
pub struct VariantRef<'a> {
    raw: &'a GodotVariant,
    core: Core,
}

/// Build a variant with a host constructor writing into `dest`.
fn construct(core: Core, init: impl FnOnce(*mut GodotVariant)) -> Variant {
    let mut raw = MaybeUninit::uninit();
    init(raw.as_mut_ptr());
    // SAFETY: every caller passes a host constructor, which initializes `raw`
    unsafe { Variant::from_sys(core, raw.assume_init()) }
}

impl Variant {
    pub fn nil(core: Core) -> Self {
        construct(core, |dest| unsafe { (core.variant_new_nil)(dest) })
    }

    pub fn from_bool(core: Core, value: bool) -> Self {
        construct(core, |dest| unsafe { (core.variant_new_bool)(dest, value) })
    }

    pub fn from_u64(core: Core, value: u64) -> Self {
        construct(core, |dest| unsafe { (core.variant_new_uint)(dest, value) })
    }

    pub fn from_i64(core: Core, value: i64) -> Self {
        construct(core, |dest| unsafe { (core.variant_new_int)(dest, value) })
    }

    pub fn from_f64(core: Core, value: f64) -> Self {
        construct(core, |dest| unsafe { (core.variant_new_real)(dest, value) })
    }

    pub fn from_vector2(core: Core, value: Vector2) -> Self {
        construct(core, |dest| unsafe { (core.variant_new_vector2)(dest, &value) })
    }

    pub fn from_vector3(core: Core, value: Vector3) -> Self {
        construct(core, |dest| unsafe { (core.variant_new_vector3)(dest, &value) })
    }

    pub fn from_color(core: Core, value: Color) -> Self {
        construct(core, |dest| unsafe { (core.variant_new_color)(dest, &value) })
    }

    /// Copy of a host string
    pub fn from_gd_string(string: &GdString) -> Self {
        let core = string.core();
        construct(core, |dest| unsafe { (core.variant_new_string)(dest, string.sys()) })
    }

    /// String variant from sized UTF-8 text
    pub fn from_str(core: Core, s: &str) -> Self {
        Self::from_gd_string(&GdString::from_str(core, s))
    }

    /// String variant from a NUL-terminated string
    pub fn from_c_str(core: Core, s: &CStr) -> Self {
        Self::from_gd_string(&GdString::from_c_str(core, s))
    }

    /// Copy of a pooled array
    pub fn from_pool_array<E: PoolElement>(array: &PoolArray<E>) -> Self {
        let core = array.core();
        let api = E::api(core.api());
        construct(core, |dest| unsafe { (api.variant_new)(dest, array.sys()) })
    }

    /// Pooled array variant holding a copy of `items`
    pub fn from_slice<E: PoolElement + Copy>(core: Core, items: &[E]) -> Self {
        Self::from_pool_array(&PoolArray::from_slice(core, items))
    }

    /// Pooled array variant holding the items of `items` before its first
    /// zero element
    pub fn from_terminated<E: PoolElement + Copy + Default + PartialEq>(
        core: Core,
        items: &[E],
    ) -> Self {
        Self::from_pool_array(&PoolArray::from_terminated(core, items))
    }

    /// String array variant
    pub fn from_strs<S: AsRef<str>>(core: Core, items: &[S]) -> Self {
        Self::from_pool_array(&PoolArray::<GodotString>::from_strs(core, items))
    }

    /// Convert any [`ToVariant`] value.
    pub fn new<T: ToVariant + ?Sized>(core: Core, value: &T) -> Self {
        value.to_variant(core)
    }

    /// Take ownership of a host variant.
    ///
    /// # Safety
    /// `raw` must be an initialized variant nobody else will destroy.
    #[inline]
    pub unsafe fn from_sys(core: Core, raw: GodotVariant) -> Self {
        Self { raw, core }
    }

    /// Hand ownership back to the host, e.g. as a method's return value.
    #[must_use]
    pub fn into_sys(self) -> GodotVariant {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so `raw` is moved out exactly once
        unsafe { std::ptr::read(&this.raw) }
    }

    /// Bitwise alias for embedding in a host payload struct. The alias must
    /// not be destroyed, and must not outlive `self`.
    pub(crate) fn alias(&self) -> GodotVariant {
        // SAFETY: plain bit copy; ownership stays with `self`
        unsafe { std::ptr::read(&self.raw) }
    }

    #[inline]
    pub fn sys(&self) -> *const GodotVariant {
        &self.raw
    }

    #[inline]
    pub fn as_ref(&self) -> VariantRef<'_> {
        VariantRef {
            raw: &self.raw,
            core: self.core,
        }
    }

    #[inline]
    pub fn core(&self) -> Core {
        self.core
    }

    pub fn get_type(&self) -> Option<VariantType> {
        self.as_ref().get_type()
    }

    pub fn is_nil(&self) -> bool {
        self.as_ref().is_nil()
    }

    pub fn to<T: FromVariant>(&self) -> T {
        self.as_ref().to()
    }

    pub fn buffer(&self) -> Buffer {
        self.as_ref().buffer()
    }
}

impl Clone for Variant {
    fn clone(&self) -> Self {
        self.as_ref().to_owned()
    }
}

impl Drop for Variant {
    fn drop(&mut self) {
        // SAFETY: owned variant, destroyed once
        unsafe { (self.core.variant_destroy)(&mut self.raw) }
    }
}

impl std::fmt::Debug for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.as_ref(), f)
    }
}

impl<'a> VariantRef<'a> {
    /// Borrow a host variant.
    ///
    /// # Safety
    /// `raw` must be non-null and point to a variant that stays alive and
    /// unmodified for `'a`.
    #[inline]
    pub unsafe fn from_sys(core: Core, raw: *const GodotVariant) -> Self {
        Self {
            raw: unsafe { &*raw },
            core,
        }
    }

    #[inline]
    pub fn sys(self) -> *const GodotVariant {
        self.raw
    }

    #[inline]
    pub fn core(self) -> Core {
        self.core
    }

    /// Type tag, `None` for tags this crate doesn't know
    pub fn get_type(self) -> Option<VariantType> {
        // SAFETY: live variant
        VariantType::from_sys(unsafe { (self.core.variant_get_type)(self.raw) })
    }

    pub fn is_nil(self) -> bool {
        self.get_type() == Some(VariantType::Nil)
    }

    pub fn as_bool(self) -> bool {
        unsafe { (self.core.variant_as_bool)(self.raw) }
    }

    pub fn as_u64(self) -> u64 {
        unsafe { (self.core.variant_as_uint)(self.raw) }
    }

    pub fn as_i64(self) -> i64 {
        unsafe { (self.core.variant_as_int)(self.raw) }
    }

    pub fn as_f64(self) -> f64 {
        unsafe { (self.core.variant_as_real)(self.raw) }
    }

    pub fn as_vector2(self) -> Vector2 {
        unsafe { (self.core.variant_as_vector2)(self.raw) }
    }

    pub fn as_vector3(self) -> Vector3 {
        unsafe { (self.core.variant_as_vector3)(self.raw) }
    }

    pub fn as_color(self) -> Color {
        unsafe { (self.core.variant_as_color)(self.raw) }
    }

    /// String conversion, as the host performs it
    pub fn to_gd_string(self) -> GdString {
        // SAFETY: the returned string is a fresh copy owned by the caller
        unsafe { GdString::from_sys(self.core, (self.core.variant_as_string)(self.raw)) }
    }

    /// Copy of the pooled array held by the variant (empty if it holds none)
    pub fn to_pool_array<E: PoolElement>(self) -> PoolArray<E> {
        PoolArray::from_variant(self)
    }

    /// Typed conversion
    pub fn to<T: FromVariant>(self) -> T {
        T::from_variant(self)
    }

    /// Raw view over the variant's data. See [`Buffer`].
    pub fn buffer(self) -> Buffer {
        Buffer::from_variant(self)
    }

    /// Owned copy
    pub fn to_owned(self) -> Variant {
        let core = self.core;
        construct(core, |dest| unsafe { (core.variant_new_copy)(dest, self.raw) })
    }
}

impl std::fmt::Debug for VariantRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.get_type() {
            Some(VariantType::Nil) => f.write_str("Nil"),
            Some(VariantType::Bool) => write!(f, "Bool({})", self.as_bool()),
            Some(VariantType::Int) => write!(f, "Int({})", self.as_i64()),
            Some(VariantType::Real) => write!(f, "Real({})", self.as_f64()),
            Some(VariantType::String) => write!(f, "String({:?})", self.to_gd_string()),
            Some(other) => write!(f, "{other:?}"),
            None => f.write_str("Unknown"),
        }
    }
}
