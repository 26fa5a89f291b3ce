//! Raw views over variant data
//!
//! A [`Buffer`] exposes the payload of a variant as a pointer plus an
//! element count, whatever the variant holds. It owns every intermediate
//! it had to create to get there (decoded string, pooled array copy, read
//! access) and releases them on drop, so the pointer stays valid exactly
//! as long as the buffer does.
//!
//! | Variant type | Pointer to | `len()` | `element_size()` |
//! |--------------|------------|---------|------------------|
//! | `Bool` | `bool` copy | 1 | 1 |
//! | `Int` | `i64` copy | 1 | 8 |
//! | `Real` | `f64` copy | 1 | 8 |
//! | `String` | UTF-8 bytes, no terminator | byte count | 1 |
//! | byte/int/real/vector2/vector3/color pooled arrays | host array data | element count | element size |
//! | anything else | null | 0 | 0 |
//!
//! `len()` always counts elements; `byte_len()` counts bytes.

use std::ffi::c_void;
use std::ptr::{self, NonNull};

use bytemuck::Pod;

use crate::host::HostSlice;
use crate::math::{Color, Vector2, Vector3};
use crate::pool::PoolElement;
use crate::resolver::Core;
use crate::string::CharString;
use crate::sys::{GodotInt, GodotPoolArray, GodotPoolReadAccess, GodotReal, VariantType};
use crate::variant::VariantRef;

/// Owning view over a variant's data.
pub struct Buffer {
    tag: Option<VariantType>,
    storage: Storage,
    core: Core,
}

enum Storage {
    Empty,
    Bool(bool),
    Int(i64),
    Real(f64),
    String(CharString),
    Pooled(PooledView),
}

/// A pooled array copy held open for reading.
///
/// Type-erased: the release entry points don't depend on the element type.
struct PooledView {
    array: GodotPoolArray,
    access: *mut GodotPoolReadAccess,
    data: *const c_void,
    len: usize,
    element_size: usize,
    release_access: unsafe extern "C" fn(*mut GodotPoolReadAccess),
    destroy: unsafe extern "C" fn(*mut GodotPoolArray),
}

impl PooledView {
    fn open<E: PoolElement>(variant: VariantRef<'_>) -> Self {
        let api = E::api(variant.core().api());
        // SAFETY: the array copy and its access are both released in `drop`
        unsafe {
            let array = (api.variant_as)(variant.sys());
            let len = usize::try_from((api.size)(&array)).unwrap_or(0);
            let access = (api.read)(&array);
            let data = if access.is_null() {
                ptr::null()
            } else {
                (api.read_access_ptr)(access).cast::<c_void>()
            };
            Self {
                array,
                access,
                data,
                len,
                element_size: std::mem::size_of::<E>(),
                release_access: api.read_access_destroy,
                destroy: api.destroy,
            }
        }
    }
}

impl Drop for PooledView {
    fn drop(&mut self) {
        // SAFETY: access first, then the array it reads from
        unsafe {
            if !self.access.is_null() {
                (self.release_access)(self.access);
            }
            (self.destroy)(&mut self.array);
        }
    }
}

impl Buffer {
    /// View the data held by `variant`.
    pub fn from_variant(variant: VariantRef<'_>) -> Self {
        let tag = variant.get_type();
        let storage = match tag {
            None => Storage::Empty,
            Some(ty) => match ty {
                VariantType::Bool => Storage::Bool(variant.as_bool()),
                VariantType::Int => Storage::Int(variant.as_i64()),
                VariantType::Real => Storage::Real(variant.as_f64()),
                VariantType::String => Storage::String(variant.to_gd_string().to_utf8()),
                VariantType::PoolByteArray => Storage::Pooled(PooledView::open::<u8>(variant)),
                VariantType::PoolIntArray => Storage::Pooled(PooledView::open::<GodotInt>(variant)),
                VariantType::PoolRealArray => {
                    Storage::Pooled(PooledView::open::<GodotReal>(variant))
                }
                VariantType::PoolVector2Array => {
                    Storage::Pooled(PooledView::open::<Vector2>(variant))
                }
                VariantType::PoolVector3Array => {
                    Storage::Pooled(PooledView::open::<Vector3>(variant))
                }
                VariantType::PoolColorArray => Storage::Pooled(PooledView::open::<Color>(variant)),
                // Elements of a string array are opaque string handles
                VariantType::PoolStringArray
                | VariantType::Nil
                | VariantType::Vector2
                | VariantType::Rect2
                | VariantType::Vector3
                | VariantType::Transform2D
                | VariantType::Plane
                | VariantType::Quat
                | VariantType::Aabb
                | VariantType::Basis
                | VariantType::Transform
                | VariantType::Color
                | VariantType::NodePath
                | VariantType::Rid
                | VariantType::Object
                | VariantType::Dictionary
                | VariantType::Array => Storage::Empty,
            },
        };
        Self {
            tag,
            storage,
            core: variant.core(),
        }
    }

    /// Type of the variant this buffer was built from
    #[inline]
    pub fn variant_type(&self) -> Option<VariantType> {
        self.tag
    }

    /// Pointer to the data, null for an empty view
    pub fn as_ptr(&self) -> *const c_void {
        match &self.storage {
            Storage::Empty => ptr::null(),
            Storage::Bool(b) => ptr::from_ref(b).cast(),
            Storage::Int(i) => ptr::from_ref(i).cast(),
            Storage::Real(r) => ptr::from_ref(r).cast(),
            Storage::String(s) => {
                if s.is_empty() {
                    ptr::null()
                } else {
                    s.as_ptr().cast()
                }
            }
            Storage::Pooled(view) => view.data,
        }
    }

    /// Element count
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Empty => 0,
            Storage::Bool(_) | Storage::Int(_) | Storage::Real(_) => 1,
            Storage::String(s) => s.len(),
            Storage::Pooled(view) if view.data.is_null() => 0,
            Storage::Pooled(view) => view.len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size in bytes of one element, 0 for an empty view
    pub fn element_size(&self) -> usize {
        match &self.storage {
            Storage::Empty => 0,
            Storage::Bool(_) => std::mem::size_of::<bool>(),
            Storage::Int(_) => std::mem::size_of::<i64>(),
            Storage::Real(_) => std::mem::size_of::<f64>(),
            Storage::String(_) => 1,
            Storage::Pooled(view) => view.element_size,
        }
    }

    /// `len() * element_size()`
    pub fn byte_len(&self) -> usize {
        self.len() * self.element_size()
    }

    /// `(pointer, element count)`
    pub fn view(&self) -> (*const c_void, usize) {
        (self.as_ptr(), self.len())
    }

    /// The data as bytes
    pub fn as_bytes(&self) -> &[u8] {
        let ptr = self.as_ptr();
        let len = self.byte_len();
        if ptr.is_null() || len == 0 {
            return &[];
        }
        // SAFETY: `ptr` addresses `len` initialized bytes owned by `self`;
        // `bool` is a single byte of value 0 or 1
        unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), len) }
    }

    /// The data as a slice of `T`, `None` if the element size differs or the
    /// data isn't aligned for `T`.
    pub fn as_slice<T: Pod>(&self) -> Option<&[T]> {
        if std::mem::size_of::<T>() != self.element_size() {
            return None;
        }
        if self.is_empty() {
            return Some(&[]);
        }
        bytemuck::try_cast_slice(self.as_bytes()).ok()
    }

    /// Host-allocated copy of the data. `None` if allocation fails.
    pub fn duplicate(&self) -> Option<HostBuffer> {
        let bytes = HostSlice::copy_from(self.core, self.as_bytes())?;
        Some(HostBuffer {
            bytes,
            element_size: self.element_size(),
        })
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("variant_type", &self.tag)
            .field("len", &self.len())
            .field("element_size", &self.element_size())
            .finish()
    }
}

/// Host-allocated copy of a [`Buffer`]'s data. Freed on drop.
pub struct HostBuffer {
    bytes: HostSlice<u8>,
    element_size: usize,
}

impl HostBuffer {
    /// Element count, same unit as [`Buffer::len`]
    pub fn len(&self) -> usize {
        match self.element_size {
            0 => 0,
            size => self.bytes.len() / size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    #[inline]
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The copy as a slice of `T`, `None` on size or alignment mismatch
    pub fn as_slice<T: Pod>(&self) -> Option<&[T]> {
        if std::mem::size_of::<T>() != self.element_size {
            return None;
        }
        bytemuck::try_cast_slice(self.as_bytes()).ok()
    }

    /// Give up ownership: `(pointer, element count)`. Release the pointer
    /// with [`host::free`](crate::host::free).
    #[must_use]
    pub fn into_raw(self) -> (NonNull<u8>, usize) {
        let len = self.len();
        let (ptr, _) = self.bytes.into_raw();
        // SAFETY: comes from a NonNull inside `HostSlice`
        (unsafe { NonNull::new_unchecked(ptr) }, len)
    }
}

impl std::fmt::Debug for HostBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostBuffer")
            .field("len", &self.len())
            .field("element_size", &self.element_size)
            .finish()
    }
}
