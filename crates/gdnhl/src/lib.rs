//! High-level helpers over the GDNative plugin ABI.
//!
//! A GDNative library receives everything it can call from the host as a
//! chain of function tables. This crate resolves those tables once at load
//! time and wraps the values that cross the boundary (variants, strings,
//! arrays, pooled arrays) in owning or borrowing Rust types, so every host
//! resource a wrapper creates is released exactly once.
//!
//! # Lifecycle
//!
//! ```ignore
//! use gdnhl::prelude::*;
//!
//! unsafe extern "C" fn count_chars(_: *mut c_void, args: *mut GodotArray) -> GodotVariant {
//!     let core = gdnhl::core();
//!     let args = unsafe { ArrayRef::from_sys(core, args) };
//!     let text: String = args.get_as(0);
//!     Variant::from_i64(core, text.chars().count() as i64).into_sys()
//! }
//!
//! fn init(tables: &'static ApiTables) {
//!     tables.core().register_native_call(c"count_chars", count_chars);
//! }
//!
//! gdnhl::gdnative_entry! { init => init, }
//! ```
//!
//! # Views over variant data
//!
//! [`Buffer`] exposes a variant's payload as a pointer and element count,
//! for handing engine data to C APIs without per-type code.
//!
//! # Features
//! - `macros` (default): re-exports the `#[methods]` attribute

pub mod array;
pub mod buffer;
pub mod convert;
mod entry;
pub mod error;
pub mod host;
pub mod log;
pub mod math;
pub mod nativescript;
pub mod pool;
pub mod resolver;
pub mod string;
pub mod sys;
pub mod variant;

pub use array::{Args, Array, ArrayRef};
pub use buffer::{Buffer, HostBuffer};
pub use convert::{FromVariant, ToVariant};
pub use error::{Error, Result};
pub use math::{Color, Vector2, Vector3};
pub use pool::{
    PoolArray, PoolByteArray, PoolColorArray, PoolElement, PoolIntArray, PoolRead, PoolRealArray,
    PoolStringArray, PoolVector2Array, PoolVector3Array, PoolWrite,
};
pub use resolver::{
    ApiChain, ApiTables, Core, api, core, gdnative_init, gdnative_terminate, try_api,
};
pub use string::{CharString, GdString};
pub use variant::{Variant, VariantRef};

/// Re-export of the proc-macro attributes
#[cfg(feature = "macros")]
pub mod proc {
    pub use gdnhl_macro::methods;
}

/// Common imports for plugin code
pub mod prelude {
    pub use std::ffi::c_void;

    pub use crate::nativescript::{ClassBuilder, InitHandle, NativeClass, Owner, SignalArg};
    pub use crate::sys::{GodotArray, GodotVariant, VariantType};
    pub use crate::{
        ApiTables, Args, Array, ArrayRef, Buffer, Color, Core, FromVariant, GdString, PoolArray,
        ToVariant, Variant, VariantRef, Vector2, Vector3, gd_assert, gd_assert_args,
        gd_assert_array_size, gd_error, gd_print, gd_warn,
    };

    #[cfg(feature = "macros")]
    pub use crate::proc::methods;
}
