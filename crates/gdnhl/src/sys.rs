//! Raw GDNative ABI declarations
//!
//! `#[repr(C)]` mirrors of the structures the host hands across the plugin
//! boundary. Nothing in this module owns resources: the safe wrappers in the
//! rest of the crate decide who releases what.
//!
//! ## Capability tables
//!
//! ```text
//! InitOptions.api_struct
//!        │
//!        ▼
//! ┌──────────────────┐  next   ┌─────────────┐  next   ┌─────────────┐
//! │ CoreApi 1.0      │────────▶│ CoreApi11   │────────▶│ CoreApi12   │
//! │ num_extensions   │         └─────────────┘         └─────────────┘
//! │ extensions ──┐   │
//! └──────────────│───┘
//!                ▼
//!   [ NativeScriptApi ─next─▶ NativeScriptApi11, ArvrApi ─next─▶ ArvrApi12, ... ]
//! ```
//!
//! Every table starts with an [`ApiHeader`]. Only the header and the core
//! prefix (`num_extensions`, `extensions`) are read while resolving; the
//! function entries that follow are the ones this crate calls.

use std::ffi::{c_char, c_int, c_uint, c_void};

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::math::{Color, Vector2, Vector3};

/// Engine integer (`godot_int`)
pub type GodotInt = c_int;
/// Engine float (`godot_real`)
pub type GodotReal = f32;
/// Engine boolean (`godot_bool`, C99 `bool`)
pub type GodotBool = bool;

/// Size of the opaque variant storage (`16 + sizeof(int64_t)`)
pub const VARIANT_SIZE: usize = 24;
/// Size of every pointer-backed opaque value (strings, arrays, pooled arrays)
pub const HANDLE_SIZE: usize = std::mem::size_of::<*const c_void>();

// =============================================================================
// Table headers
// =============================================================================

/// `(major, minor)` version of a capability table
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ApiVersion {
    pub major: c_uint,
    pub minor: c_uint,
}

impl ApiVersion {
    #[must_use]
    pub const fn new(major: c_uint, minor: c_uint) -> Self {
        Self { major, minor }
    }
}

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Common prefix of every capability table (`godot_gdnative_api_struct`)
#[repr(C)]
#[derive(Debug)]
pub struct ApiHeader {
    /// Raw [`ApiKind`] tag. Kept raw so tags from newer hosts stay representable.
    pub kind: c_uint,
    pub version: ApiVersion,
    /// Next point release of the same table, or null
    pub next: *const ApiHeader,
}

/// Capability table kind (`GDNATIVE_API_TYPES`)
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
pub enum ApiKind {
    Core = 0,
    NativeScript = 1,
    PluginScript = 2,
    Android = 3,
    Arvr = 4,
    VideoDecoder = 5,
    Net = 6,
}

impl ApiKind {
    /// Classify a raw header tag, `None` for kinds this crate doesn't know.
    #[inline]
    #[must_use]
    pub fn from_raw(raw: c_uint) -> Option<Self> {
        Self::try_from(raw).ok()
    }
}

impl ApiHeader {
    /// Kind of this table, if recognised
    #[inline]
    #[must_use]
    pub fn api_kind(&self) -> Option<ApiKind> {
        ApiKind::from_raw(self.kind)
    }
}

// =============================================================================
// Opaque value storage
// =============================================================================

/// Opaque `godot_variant`
#[repr(C)]
pub struct GodotVariant {
    _opaque: [u8; VARIANT_SIZE],
}

/// Opaque `godot_string`
#[repr(C)]
pub struct GodotString {
    _opaque: [u8; HANDLE_SIZE],
}

/// Opaque `godot_char_string` (UTF-8 encoded copy of a string)
#[repr(C)]
pub struct GodotCharString {
    _opaque: [u8; HANDLE_SIZE],
}

/// Opaque `godot_array`
#[repr(C)]
pub struct GodotArray {
    _opaque: [u8; HANDLE_SIZE],
}

/// Opaque pooled array. All pooled array kinds share this representation.
#[repr(C)]
pub struct GodotPoolArray {
    _opaque: [u8; HANDLE_SIZE],
}

/// Engine object, only ever handled by pointer
#[repr(C)]
pub struct GodotObject {
    _private: [u8; 0],
}

/// Pooled array read access handle, only ever handled by pointer
#[repr(C)]
pub struct GodotPoolReadAccess {
    _private: [u8; 0],
}

/// Pooled array write access handle, only ever handled by pointer
#[repr(C)]
pub struct GodotPoolWriteAccess {
    _private: [u8; 0],
}

/// Variant type tag (`godot_variant_type`), in the host's numeric order
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
pub enum VariantType {
    Nil = 0,
    Bool = 1,
    Int = 2,
    Real = 3,
    String = 4,
    Vector2 = 5,
    Rect2 = 6,
    Vector3 = 7,
    Transform2D = 8,
    Plane = 9,
    Quat = 10,
    Aabb = 11,
    Basis = 12,
    Transform = 13,
    Color = 14,
    NodePath = 15,
    Rid = 16,
    Object = 17,
    Dictionary = 18,
    Array = 19,
    PoolByteArray = 20,
    PoolIntArray = 21,
    PoolRealArray = 22,
    PoolStringArray = 23,
    PoolVector2Array = 24,
    PoolVector3Array = 25,
    PoolColorArray = 26,
}

impl VariantType {
    /// Convert the host's raw tag, `None` for values outside the enumeration.
    #[inline]
    #[must_use]
    pub fn from_sys(raw: c_int) -> Option<Self> {
        u32::try_from(raw).ok().and_then(|v| Self::try_from(v).ok())
    }

    /// Raw value as passed to the host
    #[inline]
    #[must_use]
    pub fn to_sys(self) -> GodotInt {
        u32::from(self) as GodotInt
    }
}

// =============================================================================
// Pooled array descriptor
// =============================================================================

/// Host operations for one pooled array element kind.
///
/// The core table carries one descriptor per kind, so the generic wrappers
/// in [`crate::pool`] are written once over `E`.
#[repr(C)]
pub struct PoolArrayApi<E> {
    pub new: unsafe extern "C" fn(dest: *mut GodotPoolArray),
    pub new_copy: unsafe extern "C" fn(dest: *mut GodotPoolArray, src: *const GodotPoolArray),
    pub append: unsafe extern "C" fn(array: *mut GodotPoolArray, data: *const E),
    pub resize: unsafe extern "C" fn(array: *mut GodotPoolArray, size: GodotInt),
    pub set: unsafe extern "C" fn(array: *mut GodotPoolArray, idx: GodotInt, data: *const E),
    pub size: unsafe extern "C" fn(array: *const GodotPoolArray) -> GodotInt,
    pub read: unsafe extern "C" fn(array: *const GodotPoolArray) -> *mut GodotPoolReadAccess,
    pub read_access_ptr: unsafe extern "C" fn(access: *const GodotPoolReadAccess) -> *const E,
    pub read_access_destroy: unsafe extern "C" fn(access: *mut GodotPoolReadAccess),
    pub write: unsafe extern "C" fn(array: *mut GodotPoolArray) -> *mut GodotPoolWriteAccess,
    pub write_access_ptr: unsafe extern "C" fn(access: *const GodotPoolWriteAccess) -> *mut E,
    pub write_access_destroy: unsafe extern "C" fn(access: *mut GodotPoolWriteAccess),
    pub destroy: unsafe extern "C" fn(array: *mut GodotPoolArray),
    pub variant_new: unsafe extern "C" fn(dest: *mut GodotVariant, array: *const GodotPoolArray),
    pub variant_as: unsafe extern "C" fn(var: *const GodotVariant) -> GodotPoolArray,
}

/// Callback registered with `register_native_call_type`
pub type NativeCallFn =
    unsafe extern "C" fn(symbol: *mut c_void, args: *mut GodotArray) -> GodotVariant;

// =============================================================================
// Core table
// =============================================================================

/// Core capability table, version 1.0 (`godot_gdnative_core_api_struct`)
#[repr(C)]
pub struct CoreApi {
    pub header: ApiHeader,
    pub num_extensions: c_uint,
    pub extensions: *const *const ApiHeader,

    // Memory
    pub alloc: unsafe extern "C" fn(bytes: c_int) -> *mut c_void,
    pub realloc: unsafe extern "C" fn(ptr: *mut c_void, bytes: c_int) -> *mut c_void,
    pub free: unsafe extern "C" fn(ptr: *mut c_void),

    // Diagnostics
    pub print_error: unsafe extern "C" fn(
        description: *const c_char,
        function: *const c_char,
        file: *const c_char,
        line: c_int,
    ),
    pub print_warning: unsafe extern "C" fn(
        description: *const c_char,
        function: *const c_char,
        file: *const c_char,
        line: c_int,
    ),
    pub print: unsafe extern "C" fn(message: *const GodotString),

    // String
    pub string_new: unsafe extern "C" fn(dest: *mut GodotString),
    pub string_new_copy: unsafe extern "C" fn(dest: *mut GodotString, src: *const GodotString),
    pub string_chars_to_utf8: unsafe extern "C" fn(utf8: *const c_char) -> GodotString,
    pub string_chars_to_utf8_with_len:
        unsafe extern "C" fn(utf8: *const c_char, len: GodotInt) -> GodotString,
    pub string_length: unsafe extern "C" fn(s: *const GodotString) -> GodotInt,
    pub string_utf8: unsafe extern "C" fn(s: *const GodotString) -> GodotCharString,
    pub string_destroy: unsafe extern "C" fn(s: *mut GodotString),
    pub char_string_length: unsafe extern "C" fn(cs: *const GodotCharString) -> GodotInt,
    pub char_string_get_data: unsafe extern "C" fn(cs: *const GodotCharString) -> *const c_char,
    pub char_string_destroy: unsafe extern "C" fn(cs: *mut GodotCharString),

    // Variant
    pub variant_new_copy: unsafe extern "C" fn(dest: *mut GodotVariant, src: *const GodotVariant),
    pub variant_new_nil: unsafe extern "C" fn(dest: *mut GodotVariant),
    pub variant_new_bool: unsafe extern "C" fn(dest: *mut GodotVariant, b: GodotBool),
    pub variant_new_uint: unsafe extern "C" fn(dest: *mut GodotVariant, u: u64),
    pub variant_new_int: unsafe extern "C" fn(dest: *mut GodotVariant, i: i64),
    pub variant_new_real: unsafe extern "C" fn(dest: *mut GodotVariant, r: f64),
    pub variant_new_string: unsafe extern "C" fn(dest: *mut GodotVariant, s: *const GodotString),
    pub variant_new_vector2: unsafe extern "C" fn(dest: *mut GodotVariant, v: *const Vector2),
    pub variant_new_vector3: unsafe extern "C" fn(dest: *mut GodotVariant, v: *const Vector3),
    pub variant_new_color: unsafe extern "C" fn(dest: *mut GodotVariant, c: *const Color),
    pub variant_get_type: unsafe extern "C" fn(var: *const GodotVariant) -> c_int,
    pub variant_as_bool: unsafe extern "C" fn(var: *const GodotVariant) -> GodotBool,
    pub variant_as_uint: unsafe extern "C" fn(var: *const GodotVariant) -> u64,
    pub variant_as_int: unsafe extern "C" fn(var: *const GodotVariant) -> i64,
    pub variant_as_real: unsafe extern "C" fn(var: *const GodotVariant) -> f64,
    pub variant_as_string: unsafe extern "C" fn(var: *const GodotVariant) -> GodotString,
    pub variant_as_vector2: unsafe extern "C" fn(var: *const GodotVariant) -> Vector2,
    pub variant_as_vector3: unsafe extern "C" fn(var: *const GodotVariant) -> Vector3,
    pub variant_as_color: unsafe extern "C" fn(var: *const GodotVariant) -> Color,
    pub variant_destroy: unsafe extern "C" fn(var: *mut GodotVariant),

    // Array
    pub array_new: unsafe extern "C" fn(dest: *mut GodotArray),
    pub array_append: unsafe extern "C" fn(array: *mut GodotArray, value: *const GodotVariant),
    pub array_size: unsafe extern "C" fn(array: *const GodotArray) -> GodotInt,
    pub array_get: unsafe extern "C" fn(array: *const GodotArray, idx: GodotInt) -> GodotVariant,
    pub array_operator_index_const:
        unsafe extern "C" fn(array: *const GodotArray, idx: GodotInt) -> *const GodotVariant,
    pub array_destroy: unsafe extern "C" fn(array: *mut GodotArray),

    // Pooled arrays
    pub pool_byte_array: PoolArrayApi<u8>,
    pub pool_int_array: PoolArrayApi<GodotInt>,
    pub pool_real_array: PoolArrayApi<GodotReal>,
    pub pool_string_array: PoolArrayApi<GodotString>,
    pub pool_vector2_array: PoolArrayApi<Vector2>,
    pub pool_vector3_array: PoolArrayApi<Vector3>,
    pub pool_color_array: PoolArrayApi<Color>,

    pub register_native_call_type:
        unsafe extern "C" fn(call_type: *const c_char, callback: NativeCallFn),
}

// SAFETY: capability tables are immutable after the host hands them over;
// the raw pointers they hold are never written through.
unsafe impl Send for CoreApi {}
unsafe impl Sync for CoreApi {}

/// Declare a point-release or extension table that this crate resolves but
/// whose function entries it doesn't call.
macro_rules! header_only_table {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[repr(C)]
            pub struct $name {
                pub header: ApiHeader,
            }

            // SAFETY: immutable host-owned table
            unsafe impl Send for $name {}
            unsafe impl Sync for $name {}
        )*
    };
}

header_only_table! {
    /// Core table, version 1.1
    CoreApi11;
    /// Core table, version 1.2
    CoreApi12;
    /// NativeScript extension, version 1.1
    NativeScriptApi11;
    /// PluginScript extension
    PluginScriptApi;
    /// Android extension
    AndroidApi;
    /// ARVR extension, version 1.1
    ArvrApi;
    /// ARVR extension, version 1.2
    ArvrApi12;
    /// Video decoder extension
    VideoDecoderApi;
    /// Networking extension, version 3.1
    NetApi;
    /// Networking extension, version 3.2
    NetApi32;
}

// =============================================================================
// NativeScript
// =============================================================================

pub type CreateFn =
    unsafe extern "C" fn(owner: *mut GodotObject, method_data: *mut c_void) -> *mut c_void;
pub type DestroyFn =
    unsafe extern "C" fn(owner: *mut GodotObject, method_data: *mut c_void, user_data: *mut c_void);
pub type MethodFn = unsafe extern "C" fn(
    owner: *mut GodotObject,
    method_data: *mut c_void,
    user_data: *mut c_void,
    num_args: c_int,
    args: *mut *mut GodotVariant,
) -> GodotVariant;
pub type SetterFn = unsafe extern "C" fn(
    owner: *mut GodotObject,
    method_data: *mut c_void,
    user_data: *mut c_void,
    value: *mut GodotVariant,
);
pub type GetterFn = unsafe extern "C" fn(
    owner: *mut GodotObject,
    method_data: *mut c_void,
    user_data: *mut c_void,
) -> GodotVariant;
pub type FreeFn = unsafe extern "C" fn(method_data: *mut c_void);

#[repr(C)]
pub struct InstanceCreateFunc {
    pub create_func: Option<CreateFn>,
    pub method_data: *mut c_void,
    pub free_func: Option<FreeFn>,
}

#[repr(C)]
pub struct InstanceDestroyFunc {
    pub destroy_func: Option<DestroyFn>,
    pub method_data: *mut c_void,
    pub free_func: Option<FreeFn>,
}

#[repr(C)]
pub struct InstanceMethod {
    pub method: Option<MethodFn>,
    pub method_data: *mut c_void,
    pub free_func: Option<FreeFn>,
}

/// `godot_method_rpc_mode`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RpcMode {
    #[default]
    Disabled = 0,
    Remote = 1,
    Master = 2,
    Puppet = 3,
    RemoteSync = 4,
    MasterSync = 5,
    PuppetSync = 6,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct MethodAttributes {
    pub rpc_type: RpcMode,
}

/// `GODOT_PROPERTY_HINT_NONE`
pub const PROPERTY_HINT_NONE: c_int = 0;
/// `GODOT_PROPERTY_USAGE_DEFAULT` (storage | editor | network)
pub const PROPERTY_USAGE_DEFAULT: c_int = 7;

#[repr(C)]
pub struct PropertyAttributes {
    pub rset_type: RpcMode,
    pub type_: GodotInt,
    pub hint: c_int,
    pub hint_string: GodotString,
    pub usage: c_int,
    pub default_value: GodotVariant,
}

#[repr(C)]
pub struct PropertySetFunc {
    pub set_func: Option<SetterFn>,
    pub method_data: *mut c_void,
    pub free_func: Option<FreeFn>,
}

#[repr(C)]
pub struct PropertyGetFunc {
    pub get_func: Option<GetterFn>,
    pub method_data: *mut c_void,
    pub free_func: Option<FreeFn>,
}

#[repr(C)]
pub struct SignalArgument {
    pub name: GodotString,
    pub type_: GodotInt,
    pub hint: c_int,
    pub hint_string: GodotString,
    pub usage: c_int,
    pub default_value: GodotVariant,
}

#[repr(C)]
pub struct Signal {
    pub name: GodotString,
    pub num_args: c_int,
    pub args: *mut SignalArgument,
    pub num_default_args: c_int,
    pub default_args: *mut GodotVariant,
}

/// NativeScript extension, version 1.0
#[repr(C)]
pub struct NativeScriptApi {
    pub header: ApiHeader,
    pub register_class: unsafe extern "C" fn(
        gdnative_handle: *mut c_void,
        name: *const c_char,
        base: *const c_char,
        create_func: InstanceCreateFunc,
        destroy_func: InstanceDestroyFunc,
    ),
    pub register_tool_class: unsafe extern "C" fn(
        gdnative_handle: *mut c_void,
        name: *const c_char,
        base: *const c_char,
        create_func: InstanceCreateFunc,
        destroy_func: InstanceDestroyFunc,
    ),
    pub register_method: unsafe extern "C" fn(
        gdnative_handle: *mut c_void,
        class_name: *const c_char,
        function_name: *const c_char,
        attr: MethodAttributes,
        method: InstanceMethod,
    ),
    pub register_property: unsafe extern "C" fn(
        gdnative_handle: *mut c_void,
        class_name: *const c_char,
        path: *const c_char,
        attr: *mut PropertyAttributes,
        set_func: PropertySetFunc,
        get_func: PropertyGetFunc,
    ),
    pub register_signal: unsafe extern "C" fn(
        gdnative_handle: *mut c_void,
        class_name: *const c_char,
        signal: *const Signal,
    ),
    pub get_userdata: unsafe extern "C" fn(instance: *mut GodotObject) -> *mut c_void,
}

// SAFETY: immutable host-owned table
unsafe impl Send for NativeScriptApi {}
unsafe impl Sync for NativeScriptApi {}

// =============================================================================
// Lifecycle payloads
// =============================================================================

/// Payload of `godot_gdnative_init` (`godot_gdnative_init_options`)
#[repr(C)]
pub struct InitOptions {
    pub in_editor: GodotBool,
    pub core_api_hash: u64,
    pub editor_api_hash: u64,
    pub no_api_hash: u64,
    pub report_version_mismatch: Option<
        unsafe extern "C" fn(
            library: *const GodotObject,
            what: *const c_char,
            want: ApiVersion,
            have: ApiVersion,
        ),
    >,
    pub report_loading_error:
        Option<unsafe extern "C" fn(library: *const GodotObject, what: *const c_char)>,
    pub gd_native_library: *mut GodotObject,
    pub api_struct: *const CoreApi,
    pub active_library_path: *const GodotString,
}

/// Payload of `godot_gdnative_terminate` (`godot_gdnative_terminate_options`)
#[repr(C)]
pub struct TerminateOptions {
    pub in_editor: GodotBool,
    pub core_api_hash: u64,
    pub editor_api_hash: u64,
    pub no_api_hash: u64,
}
