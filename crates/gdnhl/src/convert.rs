//! Conversions between Rust values and variants
//!
//! Conversions never fail: reading a variant of another type returns
//! whatever the host's coercion produces (usually a zero value).

use std::ffi::{CStr, CString};

use crate::math::{Color, Vector2, Vector3};
use crate::pool::{PoolArray, PoolElement};
use crate::resolver::Core;
use crate::string::GdString;
use crate::sys::{GodotInt, GodotReal, GodotString};
use crate::variant::{Variant, VariantRef};

/// Values that can be stored in a variant.
pub trait ToVariant {
    fn to_variant(&self, core: Core) -> Variant;
}

/// Values that can be read out of a variant.
pub trait FromVariant: Sized {
    fn from_variant(variant: VariantRef<'_>) -> Self;
}

impl<T: ToVariant + ?Sized> ToVariant for &T {
    fn to_variant(&self, core: Core) -> Variant {
        (**self).to_variant(core)
    }
}

impl ToVariant for () {
    fn to_variant(&self, core: Core) -> Variant {
        Variant::nil(core)
    }
}

impl ToVariant for bool {
    fn to_variant(&self, core: Core) -> Variant {
        Variant::from_bool(core, *self)
    }
}

macro_rules! scalar_conversions {
    ($($ty:ty => $new:ident, $as:ident;)*) => {
        $(
            impl ToVariant for $ty {
                fn to_variant(&self, core: Core) -> Variant {
                    Variant::$new(core, (*self).into())
                }
            }

            impl FromVariant for $ty {
                fn from_variant(variant: VariantRef<'_>) -> Self {
                    variant.$as() as $ty
                }
            }
        )*
    };
}

scalar_conversions! {
    u8 => from_u64, as_u64;
    u16 => from_u64, as_u64;
    u32 => from_u64, as_u64;
    u64 => from_u64, as_u64;
    i8 => from_i64, as_i64;
    i16 => from_i64, as_i64;
    i32 => from_i64, as_i64;
    i64 => from_i64, as_i64;
    f32 => from_f64, as_f64;
    f64 => from_f64, as_f64;
}

impl FromVariant for bool {
    fn from_variant(variant: VariantRef<'_>) -> Self {
        variant.as_bool()
    }
}

impl ToVariant for str {
    fn to_variant(&self, core: Core) -> Variant {
        Variant::from_str(core, self)
    }
}

impl ToVariant for String {
    fn to_variant(&self, core: Core) -> Variant {
        Variant::from_str(core, self)
    }
}

impl FromVariant for String {
    fn from_variant(variant: VariantRef<'_>) -> Self {
        variant.to_gd_string().to_utf8().to_string_lossy().into_owned()
    }
}

impl ToVariant for CStr {
    fn to_variant(&self, core: Core) -> Variant {
        Variant::from_c_str(core, self)
    }
}

impl ToVariant for CString {
    fn to_variant(&self, core: Core) -> Variant {
        Variant::from_c_str(core, self)
    }
}

impl ToVariant for GdString {
    fn to_variant(&self, _core: Core) -> Variant {
        Variant::from_gd_string(self)
    }
}

impl FromVariant for GdString {
    fn from_variant(variant: VariantRef<'_>) -> Self {
        variant.to_gd_string()
    }
}

impl ToVariant for Vector2 {
    fn to_variant(&self, core: Core) -> Variant {
        Variant::from_vector2(core, *self)
    }
}

impl FromVariant for Vector2 {
    fn from_variant(variant: VariantRef<'_>) -> Self {
        variant.as_vector2()
    }
}

impl ToVariant for Vector3 {
    fn to_variant(&self, core: Core) -> Variant {
        Variant::from_vector3(core, *self)
    }
}

impl FromVariant for Vector3 {
    fn from_variant(variant: VariantRef<'_>) -> Self {
        variant.as_vector3()
    }
}

impl ToVariant for Color {
    fn to_variant(&self, core: Core) -> Variant {
        Variant::from_color(core, *self)
    }
}

impl FromVariant for Color {
    fn from_variant(variant: VariantRef<'_>) -> Self {
        variant.as_color()
    }
}

impl ToVariant for Variant {
    fn to_variant(&self, _core: Core) -> Variant {
        self.clone()
    }
}

impl FromVariant for Variant {
    fn from_variant(variant: VariantRef<'_>) -> Self {
        variant.to_owned()
    }
}

impl ToVariant for VariantRef<'_> {
    fn to_variant(&self, _core: Core) -> Variant {
        VariantRef::to_owned(*self)
    }
}

impl<T: ToVariant> ToVariant for Option<T> {
    fn to_variant(&self, core: Core) -> Variant {
        match self {
            Some(value) => value.to_variant(core),
            None => Variant::nil(core),
        }
    }
}

impl<T: FromVariant> FromVariant for Option<T> {
    fn from_variant(variant: VariantRef<'_>) -> Self {
        (!variant.is_nil()).then(|| T::from_variant(variant))
    }
}

impl<E: PoolElement> ToVariant for PoolArray<E> {
    fn to_variant(&self, _core: Core) -> Variant {
        Variant::from_pool_array(self)
    }
}

impl<E: PoolElement> FromVariant for PoolArray<E> {
    fn from_variant(variant: VariantRef<'_>) -> Self {
        PoolArray::from_variant(variant)
    }
}

macro_rules! pooled_conversions {
    ($($elem:ty),* $(,)?) => {
        $(
            impl ToVariant for [$elem] {
                fn to_variant(&self, core: Core) -> Variant {
                    Variant::from_slice(core, self)
                }
            }

            impl ToVariant for Vec<$elem> {
                fn to_variant(&self, core: Core) -> Variant {
                    Variant::from_slice(core, self)
                }
            }

            impl FromVariant for Vec<$elem> {
                fn from_variant(variant: VariantRef<'_>) -> Self {
                    PoolArray::<$elem>::from_variant(variant).to_vec()
                }
            }
        )*
    };
}

pooled_conversions!(u8, GodotInt, GodotReal, Vector2, Vector3, Color);

impl ToVariant for [&str] {
    fn to_variant(&self, core: Core) -> Variant {
        Variant::from_strs(core, self)
    }
}

impl ToVariant for [String] {
    fn to_variant(&self, core: Core) -> Variant {
        Variant::from_strs(core, self)
    }
}

impl ToVariant for Vec<String> {
    fn to_variant(&self, core: Core) -> Variant {
        Variant::from_strs(core, self)
    }
}

impl FromVariant for Vec<String> {
    fn from_variant(variant: VariantRef<'_>) -> Self {
        PoolArray::<GodotString>::from_variant(variant).to_strings()
    }
}
