//! In-process mock of the GDNative host
//!
//! Implements the core and NativeScript entry points gdnhl calls, with
//! plain Rust storage behind every opaque handle:
//!
//! - variants: tag (u32) at byte 0, payload at byte 8 (scalars inline,
//!   strings and pooled arrays as boxed pointers)
//! - strings: `Box<String>`, char strings: `Box<Vec<u8>>` with a trailing NUL
//! - arrays: `Box<Vec<GodotVariant>>`, pooled arrays: `Box<Vec<E>>`
//!
//! Every live variant, string, array, pooled array, access handle and host
//! allocation bumps a per-thread counter, so tests can check that whatever
//! they create is released.

#![allow(dead_code)]

use std::alloc::Layout;
use std::cell::{Cell, RefCell};
use std::ffi::{CStr, c_char, c_int, c_uint, c_void};
use std::mem::MaybeUninit;
use std::ptr;

use gdnhl::sys::*;
use gdnhl::{Color, Core, Variant, Vector2, Vector3};

// =============================================================================
// Bookkeeping
// =============================================================================

thread_local! {
    static LIVE: Cell<i64> = const { Cell::new(0) };
    static FAIL_ALLOC: Cell<bool> = const { Cell::new(false) };
    static LOG: RefCell<Vec<LogEntry>> = const { RefCell::new(Vec::new()) };
    static NATIVE_CALLS: RefCell<Vec<(String, NativeCallFn)>> = const { RefCell::new(Vec::new()) };
    static REGISTRY: RefCell<Registry> = const {
        RefCell::new(Registry {
            classes: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
            signals: Vec::new(),
        })
    };
}

fn bump(delta: i64) {
    LIVE.set(LIVE.get() + delta);
}

/// Host resources currently alive on this thread
pub fn live() -> i64 {
    LIVE.get()
}

/// Make every following host allocation on this thread fail (or succeed again).
pub fn fail_allocations(fail: bool) {
    FAIL_ALLOC.set(fail);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Print,
    Warning,
    Error,
}

#[derive(Clone, Debug)]
pub struct LogEntry {
    pub level: Level,
    pub message: String,
    pub function: String,
    pub file: String,
    pub line: i32,
}

/// Drain everything printed on this thread
pub fn take_log() -> Vec<LogEntry> {
    LOG.with(|log| std::mem::take(&mut *log.borrow_mut()))
}

fn log(level: Level, message: String, function: String, file: String, line: i32) {
    LOG.with(|log| {
        log.borrow_mut().push(LogEntry {
            level,
            message,
            function,
            file,
            line,
        })
    });
}

fn host_error(message: impl Into<String>) {
    log(Level::Error, message.into(), "mock".into(), "mock".into(), 0);
}

pub fn native_calls() -> Vec<(String, NativeCallFn)> {
    NATIVE_CALLS.with(|calls| calls.borrow().clone())
}

// =============================================================================
// Handle plumbing
// =============================================================================

/// Pack a pointer into an opaque pointer-sized handle.
unsafe fn to_handle<H, X>(ptr: *mut X) -> H {
    assert_eq!(std::mem::size_of::<H>(), std::mem::size_of::<*mut X>());
    unsafe { std::mem::transmute_copy(&ptr) }
}

unsafe fn write_handle<H, X>(dest: *mut H, ptr: *mut X) {
    unsafe { ptr::write_unaligned(dest.cast::<*mut X>(), ptr) }
}

unsafe fn from_handle<H, X>(handle: *const H) -> *mut X {
    unsafe { ptr::read_unaligned(handle.cast::<*mut X>()) }
}

fn new_string(s: String) -> *mut String {
    bump(1);
    Box::into_raw(Box::new(s))
}

unsafe fn string_of<'a>(s: *const GodotString) -> &'a String {
    unsafe { &*from_handle::<_, String>(s) }
}

unsafe fn drop_string(s: *mut String) {
    drop(unsafe { Box::from_raw(s) });
    bump(-1);
}

/// Contents of a host string
pub fn read_string(s: *const GodotString) -> String {
    unsafe { string_of(s).clone() }
}

// =============================================================================
// Variants
// =============================================================================

const TAG_BYTES: usize = 8;

fn variant_bytes(tag: u32, payload: &[u8]) -> [u8; VARIANT_SIZE] {
    let mut bytes = [0u8; VARIANT_SIZE];
    bytes[..4].copy_from_slice(&tag.to_ne_bytes());
    bytes[TAG_BYTES..TAG_BYTES + payload.len()].copy_from_slice(payload);
    bytes
}

unsafe fn write_variant(dest: *mut GodotVariant, tag: VariantType, payload: &[u8]) {
    unsafe { write_raw_variant(dest, u32::from(tag), payload) }
}

unsafe fn write_raw_variant(dest: *mut GodotVariant, tag: u32, payload: &[u8]) {
    unsafe { ptr::write(dest.cast::<[u8; VARIANT_SIZE]>(), variant_bytes(tag, payload)) };
    bump(1);
}

unsafe fn bytes_of_variant(v: *const GodotVariant) -> [u8; VARIANT_SIZE] {
    unsafe { ptr::read(v.cast::<[u8; VARIANT_SIZE]>()) }
}

unsafe fn tag_of(v: *const GodotVariant) -> u32 {
    let bytes = unsafe { bytes_of_variant(v) };
    u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

unsafe fn payload<T: bytemuck::Pod>(v: *const GodotVariant) -> T {
    let bytes = unsafe { bytes_of_variant(v) };
    bytemuck::pod_read_unaligned(&bytes[TAG_BYTES..TAG_BYTES + std::mem::size_of::<T>()])
}

unsafe fn payload_ptr<X>(v: *const GodotVariant) -> *mut X {
    unsafe { payload::<usize>(v) as *mut X }
}

fn ptr_bytes<X>(p: *mut X) -> [u8; 8] {
    (p as usize as u64).to_ne_bytes()
}

/// A variant with an arbitrary raw tag and no payload, e.g. a tag this
/// crate doesn't know about.
pub fn raw_variant(core: Core, tag: u32) -> Variant {
    let mut raw = MaybeUninit::<GodotVariant>::uninit();
    unsafe {
        write_raw_variant(raw.as_mut_ptr(), tag, &[]);
        Variant::from_sys(core, raw.assume_init())
    }
}

/// Copy whatever the payload of a `tag` variant owns.
unsafe fn copy_payload(tag: Option<VariantType>, v: *const GodotVariant) -> [u8; 8] {
    unsafe {
        match tag {
            Some(VariantType::String) => ptr_bytes(new_string(string_of_variant(v).clone())),
            Some(VariantType::PoolByteArray) => ptr_bytes(copy_pool::<u8>(payload_ptr(v))),
            Some(VariantType::PoolIntArray) => ptr_bytes(copy_pool::<GodotInt>(payload_ptr(v))),
            Some(VariantType::PoolRealArray) => ptr_bytes(copy_pool::<GodotReal>(payload_ptr(v))),
            Some(VariantType::PoolStringArray) => {
                ptr_bytes(copy_pool::<GodotString>(payload_ptr(v)))
            }
            Some(VariantType::PoolVector2Array) => ptr_bytes(copy_pool::<Vector2>(payload_ptr(v))),
            Some(VariantType::PoolVector3Array) => ptr_bytes(copy_pool::<Vector3>(payload_ptr(v))),
            Some(VariantType::PoolColorArray) => ptr_bytes(copy_pool::<Color>(payload_ptr(v))),
            _ => unreachable!("payload without owned storage"),
        }
    }
}

/// Whether a variant of this tag owns boxed storage
fn owns_storage(tag: Option<VariantType>) -> bool {
    matches!(
        tag,
        Some(
            VariantType::String
                | VariantType::PoolByteArray
                | VariantType::PoolIntArray
                | VariantType::PoolRealArray
                | VariantType::PoolStringArray
                | VariantType::PoolVector2Array
                | VariantType::PoolVector3Array
                | VariantType::PoolColorArray
        )
    )
}

unsafe fn release_payload(tag: Option<VariantType>, v: *const GodotVariant) {
    unsafe {
        match tag {
            Some(VariantType::String) => drop_string(payload_ptr(v)),
            Some(VariantType::PoolByteArray) => drop_pool::<u8>(payload_ptr(v)),
            Some(VariantType::PoolIntArray) => drop_pool::<GodotInt>(payload_ptr(v)),
            Some(VariantType::PoolRealArray) => drop_pool::<GodotReal>(payload_ptr(v)),
            Some(VariantType::PoolStringArray) => drop_pool::<GodotString>(payload_ptr(v)),
            Some(VariantType::PoolVector2Array) => drop_pool::<Vector2>(payload_ptr(v)),
            Some(VariantType::PoolVector3Array) => drop_pool::<Vector3>(payload_ptr(v)),
            Some(VariantType::PoolColorArray) => drop_pool::<Color>(payload_ptr(v)),
            _ => {}
        }
    }
}

unsafe fn variant_type(v: *const GodotVariant) -> Option<VariantType> {
    VariantType::from_sys(unsafe { tag_of(v) } as c_int)
}

unsafe fn string_of_variant<'a>(v: *const GodotVariant) -> &'a String {
    unsafe { &*payload_ptr::<String>(v) }
}

unsafe extern "C" fn variant_new_copy(dest: *mut GodotVariant, src: *const GodotVariant) {
    unsafe {
        let tag = variant_type(src);
        if owns_storage(tag) {
            let copied = copy_payload(tag, src);
            write_raw_variant(dest, tag_of(src), &copied);
        } else {
            let bytes = bytes_of_variant(src);
            ptr::write(dest.cast::<[u8; VARIANT_SIZE]>(), bytes);
            bump(1);
        }
    }
}

unsafe extern "C" fn variant_new_nil(dest: *mut GodotVariant) {
    unsafe { write_variant(dest, VariantType::Nil, &[]) }
}

unsafe extern "C" fn variant_new_bool(dest: *mut GodotVariant, b: GodotBool) {
    unsafe { write_variant(dest, VariantType::Bool, &[u8::from(b)]) }
}

unsafe extern "C" fn variant_new_uint(dest: *mut GodotVariant, u: u64) {
    unsafe { write_variant(dest, VariantType::Int, &(u as i64).to_ne_bytes()) }
}

unsafe extern "C" fn variant_new_int(dest: *mut GodotVariant, i: i64) {
    unsafe { write_variant(dest, VariantType::Int, &i.to_ne_bytes()) }
}

unsafe extern "C" fn variant_new_real(dest: *mut GodotVariant, r: f64) {
    unsafe { write_variant(dest, VariantType::Real, &r.to_ne_bytes()) }
}

unsafe extern "C" fn variant_new_string(dest: *mut GodotVariant, s: *const GodotString) {
    unsafe {
        let copy = new_string(string_of(s).clone());
        write_variant(dest, VariantType::String, &ptr_bytes(copy));
    }
}

unsafe extern "C" fn variant_new_vector2(dest: *mut GodotVariant, v: *const Vector2) {
    unsafe { write_variant(dest, VariantType::Vector2, bytemuck::bytes_of(&*v)) }
}

unsafe extern "C" fn variant_new_vector3(dest: *mut GodotVariant, v: *const Vector3) {
    unsafe { write_variant(dest, VariantType::Vector3, bytemuck::bytes_of(&*v)) }
}

unsafe extern "C" fn variant_new_color(dest: *mut GodotVariant, c: *const Color) {
    unsafe { write_variant(dest, VariantType::Color, bytemuck::bytes_of(&*c)) }
}

unsafe extern "C" fn variant_get_type(v: *const GodotVariant) -> c_int {
    unsafe { tag_of(v) as c_int }
}

unsafe extern "C" fn variant_as_bool(v: *const GodotVariant) -> GodotBool {
    unsafe {
        match variant_type(v) {
            Some(VariantType::Bool) => payload::<u8>(v) != 0,
            Some(VariantType::Int) => payload::<i64>(v) != 0,
            Some(VariantType::Real) => payload::<f64>(v) != 0.0,
            Some(VariantType::String) => !string_of_variant(v).is_empty(),
            _ => false,
        }
    }
}

unsafe extern "C" fn variant_as_int(v: *const GodotVariant) -> i64 {
    unsafe {
        match variant_type(v) {
            Some(VariantType::Bool) => i64::from(payload::<u8>(v)),
            Some(VariantType::Int) => payload::<i64>(v),
            Some(VariantType::Real) => payload::<f64>(v) as i64,
            Some(VariantType::String) => string_of_variant(v).trim().parse().unwrap_or(0),
            _ => 0,
        }
    }
}

unsafe extern "C" fn variant_as_uint(v: *const GodotVariant) -> u64 {
    unsafe { variant_as_int(v) as u64 }
}

unsafe extern "C" fn variant_as_real(v: *const GodotVariant) -> f64 {
    unsafe {
        match variant_type(v) {
            Some(VariantType::Real) => payload::<f64>(v),
            Some(VariantType::String) => string_of_variant(v).trim().parse().unwrap_or(0.0),
            _ => variant_as_int(v) as f64,
        }
    }
}

unsafe extern "C" fn variant_as_string(v: *const GodotVariant) -> GodotString {
    unsafe {
        let text = match variant_type(v) {
            Some(VariantType::Nil) => String::new(),
            Some(VariantType::Bool) => {
                let text = if payload::<u8>(v) != 0 { "True" } else { "False" };
                text.to_owned()
            }
            Some(VariantType::Int) => payload::<i64>(v).to_string(),
            Some(VariantType::Real) => payload::<f64>(v).to_string(),
            Some(VariantType::String) => string_of_variant(v).clone(),
            Some(other) => format!("[{other:?}]"),
            None => String::new(),
        };
        to_handle(new_string(text))
    }
}

unsafe extern "C" fn variant_as_vector2(v: *const GodotVariant) -> Vector2 {
    unsafe {
        match variant_type(v) {
            Some(VariantType::Vector2) => payload(v),
            _ => Vector2::ZERO,
        }
    }
}

unsafe extern "C" fn variant_as_vector3(v: *const GodotVariant) -> Vector3 {
    unsafe {
        match variant_type(v) {
            Some(VariantType::Vector3) => payload(v),
            _ => Vector3::ZERO,
        }
    }
}

unsafe extern "C" fn variant_as_color(v: *const GodotVariant) -> Color {
    unsafe {
        match variant_type(v) {
            Some(VariantType::Color) => payload(v),
            _ => Color::default(),
        }
    }
}

unsafe extern "C" fn variant_destroy(v: *mut GodotVariant) {
    unsafe {
        let tag = variant_type(v);
        release_payload(tag, v);
        ptr::write(v.cast::<[u8; VARIANT_SIZE]>(), [0u8; VARIANT_SIZE]);
    }
    bump(-1);
}

// =============================================================================
// Strings
// =============================================================================

unsafe extern "C" fn string_new(dest: *mut GodotString) {
    unsafe { write_handle(dest, new_string(String::new())) }
}

unsafe extern "C" fn string_new_copy(dest: *mut GodotString, src: *const GodotString) {
    unsafe { write_handle(dest, new_string(string_of(src).clone())) }
}

unsafe extern "C" fn string_chars_to_utf8(utf8: *const c_char) -> GodotString {
    unsafe {
        let text = CStr::from_ptr(utf8).to_string_lossy().into_owned();
        to_handle(new_string(text))
    }
}

unsafe extern "C" fn string_chars_to_utf8_with_len(utf8: *const c_char, len: GodotInt) -> GodotString {
    unsafe {
        let bytes = std::slice::from_raw_parts(utf8.cast::<u8>(), len.max(0) as usize);
        to_handle(new_string(String::from_utf8_lossy(bytes).into_owned()))
    }
}

unsafe extern "C" fn string_length(s: *const GodotString) -> GodotInt {
    unsafe { string_of(s).chars().count() as GodotInt }
}

unsafe extern "C" fn string_utf8(s: *const GodotString) -> GodotCharString {
    unsafe {
        let mut bytes = string_of(s).as_bytes().to_vec();
        bytes.push(0);
        bump(1);
        to_handle(Box::into_raw(Box::new(bytes)))
    }
}

unsafe extern "C" fn string_destroy(s: *mut GodotString) {
    unsafe { drop_string(from_handle(s)) }
}

unsafe fn char_string_of<'a>(cs: *const GodotCharString) -> &'a Vec<u8> {
    unsafe { &*from_handle::<_, Vec<u8>>(cs) }
}

unsafe extern "C" fn char_string_length(cs: *const GodotCharString) -> GodotInt {
    unsafe { (char_string_of(cs).len() - 1) as GodotInt }
}

unsafe extern "C" fn char_string_get_data(cs: *const GodotCharString) -> *const c_char {
    unsafe { char_string_of(cs).as_ptr().cast() }
}

unsafe extern "C" fn char_string_destroy(cs: *mut GodotCharString) {
    unsafe { drop(Box::from_raw(from_handle::<_, Vec<u8>>(cs))) };
    bump(-1);
}

// =============================================================================
// Arrays
// =============================================================================

unsafe fn array_of<'a>(a: *const GodotArray) -> &'a mut Vec<GodotVariant> {
    unsafe { &mut *from_handle::<_, Vec<GodotVariant>>(a) }
}

unsafe fn copy_variant(src: *const GodotVariant) -> GodotVariant {
    let mut dest = MaybeUninit::uninit();
    unsafe {
        variant_new_copy(dest.as_mut_ptr(), src);
        dest.assume_init()
    }
}

unsafe fn nil_variant() -> GodotVariant {
    let mut dest = MaybeUninit::uninit();
    unsafe {
        variant_new_nil(dest.as_mut_ptr());
        dest.assume_init()
    }
}

unsafe extern "C" fn array_new(dest: *mut GodotArray) {
    bump(1);
    unsafe { write_handle(dest, Box::into_raw(Box::new(Vec::<GodotVariant>::new()))) }
}

unsafe extern "C" fn array_append(a: *mut GodotArray, v: *const GodotVariant) {
    unsafe { array_of(a).push(copy_variant(v)) }
}

unsafe extern "C" fn array_size(a: *const GodotArray) -> GodotInt {
    unsafe { array_of(a).len() as GodotInt }
}

unsafe extern "C" fn array_get(a: *const GodotArray, idx: GodotInt) -> GodotVariant {
    unsafe {
        let items = array_of(a);
        match usize::try_from(idx).ok().and_then(|i| items.get(i)) {
            Some(item) => copy_variant(item),
            None => {
                host_error(format!("Index p_index = {idx} is out of bounds"));
                nil_variant()
            }
        }
    }
}

unsafe extern "C" fn array_operator_index_const(
    a: *const GodotArray,
    idx: GodotInt,
) -> *const GodotVariant {
    unsafe {
        let items = array_of(a);
        match usize::try_from(idx).ok().and_then(|i| items.get(i)) {
            Some(item) => item,
            None => {
                host_error(format!("Index p_index = {idx} is out of bounds"));
                ptr::null()
            }
        }
    }
}

unsafe extern "C" fn array_destroy(a: *mut GodotArray) {
    unsafe {
        let items = Box::from_raw(from_handle::<_, Vec<GodotVariant>>(a));
        for mut item in *items {
            variant_destroy(&mut item);
        }
    }
    bump(-1);
}

// =============================================================================
// Pooled arrays
// =============================================================================

/// Element of a mock pooled array
pub trait MockElem: Sized + 'static {
    const TAG: VariantType;
    fn duplicate(&self) -> Self;
    fn zero() -> Self;
    fn release(self) {}
}

macro_rules! plain_elems {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(
            impl MockElem for $ty {
                const TAG: VariantType = VariantType::$tag;
                fn duplicate(&self) -> Self {
                    *self
                }
                fn zero() -> Self {
                    Default::default()
                }
            }
        )*
    };
}

plain_elems! {
    u8 => PoolByteArray,
    GodotInt => PoolIntArray,
    GodotReal => PoolRealArray,
    Vector2 => PoolVector2Array,
    Vector3 => PoolVector3Array,
    Color => PoolColorArray,
}

impl MockElem for GodotString {
    const TAG: VariantType = VariantType::PoolStringArray;
    fn duplicate(&self) -> Self {
        unsafe { to_handle(new_string(string_of(self).clone())) }
    }
    fn zero() -> Self {
        unsafe { to_handle(new_string(String::new())) }
    }
    fn release(mut self) {
        unsafe { string_destroy(&mut self) }
    }
}

fn new_pool<E>(items: Vec<E>) -> *mut Vec<E> {
    bump(1);
    Box::into_raw(Box::new(items))
}

unsafe fn copy_pool<E: MockElem>(src: *mut Vec<E>) -> *mut Vec<E> {
    new_pool(unsafe { &*src }.iter().map(E::duplicate).collect())
}

unsafe fn drop_pool<E: MockElem>(pool: *mut Vec<E>) {
    let items = unsafe { Box::from_raw(pool) };
    (*items).into_iter().for_each(E::release);
    bump(-1);
}

unsafe fn pool_of<'a, E>(a: *const GodotPoolArray) -> &'a mut Vec<E> {
    unsafe { &mut *from_handle::<_, Vec<E>>(a) }
}

unsafe extern "C" fn pool_new<E: MockElem>(dest: *mut GodotPoolArray) {
    unsafe { write_handle(dest, new_pool::<E>(Vec::new())) }
}

unsafe extern "C" fn pool_new_copy<E: MockElem>(dest: *mut GodotPoolArray, src: *const GodotPoolArray) {
    unsafe { write_handle(dest, copy_pool::<E>(from_handle(src))) }
}

unsafe extern "C" fn pool_append<E: MockElem>(a: *mut GodotPoolArray, data: *const E) {
    unsafe { pool_of::<E>(a).push((*data).duplicate()) }
}

unsafe extern "C" fn pool_resize<E: MockElem>(a: *mut GodotPoolArray, size: GodotInt) {
    let items = unsafe { pool_of::<E>(a) };
    let size = size.max(0) as usize;
    if size < items.len() {
        items.drain(size..).for_each(E::release);
    } else {
        items.resize_with(size, E::zero);
    }
}

unsafe extern "C" fn pool_set<E: MockElem>(a: *mut GodotPoolArray, idx: GodotInt, data: *const E) {
    unsafe {
        let items = pool_of::<E>(a);
        match usize::try_from(idx).ok().filter(|&i| i < items.len()) {
            Some(i) => std::mem::replace(&mut items[i], (*data).duplicate()).release(),
            None => host_error(format!("Index p_index = {idx} is out of bounds")),
        }
    }
}

unsafe extern "C" fn pool_size<E: MockElem>(a: *const GodotPoolArray) -> GodotInt {
    unsafe { pool_of::<E>(a).len() as GodotInt }
}

unsafe extern "C" fn pool_read<E: MockElem>(a: *const GodotPoolArray) -> *mut GodotPoolReadAccess {
    bump(1);
    let data = unsafe { pool_of::<E>(a) }.as_ptr().cast::<c_void>();
    Box::into_raw(Box::new(data)).cast()
}

unsafe extern "C" fn pool_read_access_ptr<E: MockElem>(access: *const GodotPoolReadAccess) -> *const E {
    unsafe { *access.cast::<*const c_void>() }.cast()
}

unsafe extern "C" fn pool_read_access_destroy(access: *mut GodotPoolReadAccess) {
    drop(unsafe { Box::from_raw(access.cast::<*const c_void>()) });
    bump(-1);
}

unsafe extern "C" fn pool_write<E: MockElem>(a: *mut GodotPoolArray) -> *mut GodotPoolWriteAccess {
    bump(1);
    let data = unsafe { pool_of::<E>(a) }.as_mut_ptr().cast::<c_void>();
    Box::into_raw(Box::new(data)).cast()
}

unsafe extern "C" fn pool_write_access_ptr<E: MockElem>(access: *const GodotPoolWriteAccess) -> *mut E {
    unsafe { *access.cast::<*mut c_void>() }.cast()
}

unsafe extern "C" fn pool_write_access_destroy(access: *mut GodotPoolWriteAccess) {
    drop(unsafe { Box::from_raw(access.cast::<*mut c_void>()) });
    bump(-1);
}

unsafe extern "C" fn pool_destroy<E: MockElem>(a: *mut GodotPoolArray) {
    unsafe { drop_pool::<E>(from_handle(a)) }
}

unsafe extern "C" fn pool_variant_new<E: MockElem>(dest: *mut GodotVariant, a: *const GodotPoolArray) {
    unsafe {
        let copy = copy_pool::<E>(from_handle(a));
        write_variant(dest, E::TAG, &ptr_bytes(copy));
    }
}

unsafe extern "C" fn pool_variant_as<E: MockElem>(v: *const GodotVariant) -> GodotPoolArray {
    unsafe {
        let pool = if variant_type(v) == Some(E::TAG) {
            copy_pool::<E>(payload_ptr(v))
        } else {
            new_pool::<E>(Vec::new())
        };
        to_handle(pool)
    }
}

fn pool_api<E: MockElem>() -> PoolArrayApi<E> {
    PoolArrayApi {
        new: pool_new::<E>,
        new_copy: pool_new_copy::<E>,
        append: pool_append::<E>,
        resize: pool_resize::<E>,
        set: pool_set::<E>,
        size: pool_size::<E>,
        read: pool_read::<E>,
        read_access_ptr: pool_read_access_ptr::<E>,
        read_access_destroy: pool_read_access_destroy,
        write: pool_write::<E>,
        write_access_ptr: pool_write_access_ptr::<E>,
        write_access_destroy: pool_write_access_destroy,
        destroy: pool_destroy::<E>,
        variant_new: pool_variant_new::<E>,
        variant_as: pool_variant_as::<E>,
    }
}

// =============================================================================
// Memory and printing
// =============================================================================

const ALLOC_HEADER: usize = 16;

fn alloc_layout(total: usize) -> Layout {
    Layout::from_size_align(total, ALLOC_HEADER).expect("valid layout")
}

unsafe extern "C" fn mock_alloc(bytes: c_int) -> *mut c_void {
    if FAIL_ALLOC.get() || bytes < 0 {
        return ptr::null_mut();
    }
    let total = bytes as usize + ALLOC_HEADER;
    unsafe {
        let base = std::alloc::alloc(alloc_layout(total));
        if base.is_null() {
            return ptr::null_mut();
        }
        base.cast::<usize>().write(total);
        bump(1);
        base.add(ALLOC_HEADER).cast()
    }
}

unsafe extern "C" fn mock_free(ptr: *mut c_void) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        let base = ptr.cast::<u8>().sub(ALLOC_HEADER);
        let total = base.cast::<usize>().read();
        std::alloc::dealloc(base, alloc_layout(total));
    }
    bump(-1);
}

unsafe extern "C" fn mock_realloc(ptr: *mut c_void, bytes: c_int) -> *mut c_void {
    unsafe {
        let fresh = mock_alloc(bytes);
        if fresh.is_null() || ptr.is_null() {
            return fresh;
        }
        let old = ptr.cast::<u8>().sub(ALLOC_HEADER).cast::<usize>().read() - ALLOC_HEADER;
        ptr::copy_nonoverlapping(ptr.cast::<u8>(), fresh.cast::<u8>(), old.min(bytes as usize));
        mock_free(ptr);
        fresh
    }
}

unsafe fn c_string(s: *const c_char) -> String {
    if s.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(s) }.to_string_lossy().into_owned()
}

unsafe extern "C" fn mock_print_error(
    description: *const c_char,
    function: *const c_char,
    file: *const c_char,
    line: c_int,
) {
    unsafe {
        log(Level::Error, c_string(description), c_string(function), c_string(file), line)
    }
}

unsafe extern "C" fn mock_print_warning(
    description: *const c_char,
    function: *const c_char,
    file: *const c_char,
    line: c_int,
) {
    unsafe {
        log(Level::Warning, c_string(description), c_string(function), c_string(file), line)
    }
}

unsafe extern "C" fn mock_print(message: *const GodotString) {
    log(Level::Print, read_string(message), String::new(), String::new(), 0);
}

unsafe extern "C" fn register_native_call_type(call_type: *const c_char, callback: NativeCallFn) {
    let name = unsafe { c_string(call_type) };
    NATIVE_CALLS.with(|calls| calls.borrow_mut().push((name, callback)));
}

// =============================================================================
// NativeScript
// =============================================================================

pub struct ClassRecord {
    pub name: String,
    pub base: String,
    pub tool: bool,
    pub create: Option<CreateFn>,
    pub destroy: Option<DestroyFn>,
}

pub struct MethodRecord {
    pub class: String,
    pub name: String,
    pub rpc: RpcMode,
    pub method: Option<MethodFn>,
}

pub struct PropertyRecord {
    pub class: String,
    pub path: String,
    pub ty: GodotInt,
    pub default_int: i64,
    pub hint_string: String,
    pub setter: Option<SetterFn>,
    pub getter: Option<GetterFn>,
    pub set_data: *mut c_void,
    pub get_data: *mut c_void,
    pub free_func: Option<FreeFn>,
}

pub struct SignalRecord {
    pub class: String,
    pub name: String,
    pub args: Vec<(String, GodotInt)>,
}

pub struct Registry {
    pub classes: Vec<ClassRecord>,
    pub methods: Vec<MethodRecord>,
    pub properties: Vec<PropertyRecord>,
    pub signals: Vec<SignalRecord>,
}

pub fn with_registry<R>(f: impl FnOnce(&Registry) -> R) -> R {
    REGISTRY.with(|registry| f(&registry.borrow()))
}

unsafe extern "C" fn ns_register(
    tool: bool,
    name: *const c_char,
    base: *const c_char,
    create: InstanceCreateFunc,
    destroy: InstanceDestroyFunc,
) {
    let record = ClassRecord {
        name: unsafe { c_string(name) },
        base: unsafe { c_string(base) },
        tool,
        create: create.create_func,
        destroy: destroy.destroy_func,
    };
    REGISTRY.with(|registry| registry.borrow_mut().classes.push(record));
}

unsafe extern "C" fn ns_register_class(
    _handle: *mut c_void,
    name: *const c_char,
    base: *const c_char,
    create: InstanceCreateFunc,
    destroy: InstanceDestroyFunc,
) {
    unsafe { ns_register(false, name, base, create, destroy) }
}

unsafe extern "C" fn ns_register_tool_class(
    _handle: *mut c_void,
    name: *const c_char,
    base: *const c_char,
    create: InstanceCreateFunc,
    destroy: InstanceDestroyFunc,
) {
    unsafe { ns_register(true, name, base, create, destroy) }
}

unsafe extern "C" fn ns_register_method(
    _handle: *mut c_void,
    class_name: *const c_char,
    function_name: *const c_char,
    attr: MethodAttributes,
    method: InstanceMethod,
) {
    let record = MethodRecord {
        class: unsafe { c_string(class_name) },
        name: unsafe { c_string(function_name) },
        rpc: attr.rpc_type,
        method: method.method,
    };
    REGISTRY.with(|registry| registry.borrow_mut().methods.push(record));
}

unsafe extern "C" fn ns_register_property(
    _handle: *mut c_void,
    class_name: *const c_char,
    path: *const c_char,
    attr: *mut PropertyAttributes,
    set_func: PropertySetFunc,
    get_func: PropertyGetFunc,
) {
    let record = unsafe {
        PropertyRecord {
            class: c_string(class_name),
            path: c_string(path),
            ty: (*attr).type_,
            default_int: variant_as_int(&(*attr).default_value),
            hint_string: read_string(&(*attr).hint_string),
            setter: set_func.set_func,
            getter: get_func.get_func,
            set_data: set_func.method_data,
            get_data: get_func.method_data,
            free_func: set_func.free_func.or(get_func.free_func),
        }
    };
    REGISTRY.with(|registry| registry.borrow_mut().properties.push(record));
}

unsafe extern "C" fn ns_register_signal(
    _handle: *mut c_void,
    class_name: *const c_char,
    signal: *const Signal,
) {
    let record = unsafe {
        let signal = &*signal;
        let args = (0..signal.num_args.max(0) as usize)
            .map(|i| {
                let arg = &*signal.args.add(i);
                (read_string(&arg.name), arg.type_)
            })
            .collect();
        SignalRecord {
            class: c_string(class_name),
            name: read_string(&signal.name),
            args,
        }
    };
    REGISTRY.with(|registry| registry.borrow_mut().signals.push(record));
}

unsafe extern "C" fn ns_get_userdata(_instance: *mut GodotObject) -> *mut c_void {
    ptr::null_mut()
}

/// Forget `class`'s properties and run their free funcs, as the host does
/// when the class is unloaded.
pub fn release_properties(class: &str) {
    let frees: Vec<_> = REGISTRY.with(|registry| {
        let properties = &mut registry.borrow_mut().properties;
        let (released, kept) = std::mem::take(properties)
            .into_iter()
            .partition::<Vec<_>, _>(|p| p.class == class);
        *properties = kept;
        released
            .into_iter()
            .map(|p| (p.free_func, p.set_data))
            .collect()
    });
    for (free, data) in frees {
        if let Some(free) = free {
            unsafe { free(data) };
        }
    }
}

// =============================================================================
// Tables
// =============================================================================

pub fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

pub fn header(kind: c_uint, major: c_uint, minor: c_uint, next: *const ApiHeader) -> ApiHeader {
    ApiHeader {
        kind,
        version: ApiVersion::new(major, minor),
        next,
    }
}

/// Pointer to the header every table starts with
pub fn header_of<T>(table: &'static T) -> *const ApiHeader {
    (table as *const T).cast()
}

/// Core table 1.0 with every mock entry point and no chain or extensions
pub fn core_api() -> CoreApi {
    CoreApi {
        header: header(0, 1, 0, ptr::null()),
        num_extensions: 0,
        extensions: ptr::null(),
        alloc: mock_alloc,
        realloc: mock_realloc,
        free: mock_free,
        print_error: mock_print_error,
        print_warning: mock_print_warning,
        print: mock_print,
        string_new,
        string_new_copy,
        string_chars_to_utf8,
        string_chars_to_utf8_with_len,
        string_length,
        string_utf8,
        string_destroy,
        char_string_length,
        char_string_get_data,
        char_string_destroy,
        variant_new_copy,
        variant_new_nil,
        variant_new_bool,
        variant_new_uint,
        variant_new_int,
        variant_new_real,
        variant_new_string,
        variant_new_vector2,
        variant_new_vector3,
        variant_new_color,
        variant_get_type,
        variant_as_bool,
        variant_as_uint,
        variant_as_int,
        variant_as_real,
        variant_as_string,
        variant_as_vector2,
        variant_as_vector3,
        variant_as_color,
        variant_destroy,
        array_new,
        array_append,
        array_size,
        array_get,
        array_operator_index_const,
        array_destroy,
        pool_byte_array: pool_api(),
        pool_int_array: pool_api(),
        pool_real_array: pool_api(),
        pool_string_array: pool_api(),
        pool_vector2_array: pool_api(),
        pool_vector3_array: pool_api(),
        pool_color_array: pool_api(),
        register_native_call_type,
    }
}

pub fn nativescript_api(next: *const ApiHeader) -> NativeScriptApi {
    NativeScriptApi {
        header: header(1, 1, 0, next),
        register_class: ns_register_class,
        register_tool_class: ns_register_tool_class,
        register_method: ns_register_method,
        register_property: ns_register_property,
        register_signal: ns_register_signal,
        get_userdata: ns_get_userdata,
    }
}

/// Core table with the given chain and extension array
pub fn core_with(next: *const ApiHeader, extensions: &[*const ApiHeader]) -> &'static CoreApi {
    let extensions: &'static [*const ApiHeader] = Box::leak(extensions.to_vec().into_boxed_slice());
    let mut api = core_api();
    api.header.next = next;
    api.num_extensions = extensions.len() as c_uint;
    api.extensions = extensions.as_ptr();
    leak(api)
}

/// Standalone core handle, without the process-wide tables
pub fn mock_core() -> Core {
    Core::new(leak(core_api()))
}

/// Stand-in for the library object
pub fn library_object() -> *mut GodotObject {
    leak(0u64) as *const u64 as *mut GodotObject
}

pub fn init_options(core: &'static CoreApi, in_editor: bool) -> InitOptions {
    InitOptions {
        in_editor,
        core_api_hash: 0,
        editor_api_hash: 0,
        no_api_hash: 0,
        report_version_mismatch: None,
        report_loading_error: None,
        gd_native_library: library_object(),
        api_struct: core,
        active_library_path: ptr::null(),
    }
}

pub fn terminate_options(in_editor: bool) -> TerminateOptions {
    TerminateOptions {
        in_editor,
        core_api_hash: 0,
        editor_api_hash: 0,
        no_api_hash: 0,
    }
}

/// Variant argument list as the host passes it to a method
pub fn arg_pointers(args: &[Variant]) -> Vec<*mut GodotVariant> {
    args.iter().map(|a| a.sys().cast_mut()).collect()
}
