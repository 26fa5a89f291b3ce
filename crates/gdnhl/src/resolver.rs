//! Capability table resolution
//!
//! The host hands the library a single [`InitOptions`] at load time. Its core
//! table links to newer point releases of itself through `next`, and carries
//! an array of extension tables, each of which may be chained the same way.
//! [`ApiTables::resolve`] walks all of it once and keeps a reference to every
//! table this crate knows about.
//!
//! Resolution is forward compatible: unknown kinds and unknown versions are
//! skipped, never reported as errors. When two tables would land in the same
//! slot the first one wins, so the order of the extension array doesn't
//! change the outcome.
//!
//! The process-wide copy lives in a [`OnceLock`]: [`gdnative_init`] fills it,
//! [`api`] and [`core`] read it, and nothing writes it afterwards.

use std::ffi::CStr;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::OnceLock;

use crate::sys::{
    AndroidApi, ApiHeader, ApiKind, ArvrApi, ArvrApi12, CoreApi, CoreApi11, CoreApi12,
    GodotObject, InitOptions, NativeCallFn, NativeScriptApi, NativeScriptApi11, NetApi, NetApi32,
    PluginScriptApi, TerminateOptions, VideoDecoderApi,
};

// =============================================================================
// Core handle
// =============================================================================

/// Copyable handle to the resolved core table.
///
/// Every wrapper that needs to call back into the host carries one of these.
#[derive(Clone, Copy)]
pub struct Core(&'static CoreApi);

impl Core {
    #[inline]
    #[must_use]
    pub const fn new(api: &'static CoreApi) -> Self {
        Self(api)
    }

    /// The underlying function table
    #[inline]
    #[must_use]
    pub fn api(self) -> &'static CoreApi {
        self.0
    }

    /// Register a callback for `GDNative.call_native(call_type, ...)`.
    pub fn register_native_call(self, call_type: &CStr, callback: NativeCallFn) {
        // SAFETY: `call_type` is NUL-terminated and the host copies it
        unsafe { (self.0.register_native_call_type)(call_type.as_ptr(), callback) }
    }
}

impl Deref for Core {
    type Target = CoreApi;

    #[inline]
    fn deref(&self) -> &CoreApi {
        self.0
    }
}

impl fmt::Debug for Core {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Core")
            .field(&(self.0 as *const CoreApi))
            .finish()
    }
}

// =============================================================================
// Chain walking
// =============================================================================

/// Iterator over the point releases chained after a table header.
pub struct ApiChain<'a> {
    next: *const ApiHeader,
    _marker: PhantomData<&'a ApiHeader>,
}

impl<'a> ApiChain<'a> {
    /// Walk `head` and every table linked from it.
    ///
    /// # Safety
    /// Every `next` pointer reachable from `head` must be null or point to a
    /// valid header that lives for `'a`.
    #[must_use]
    pub unsafe fn starting_at(head: &'a ApiHeader) -> Self {
        Self {
            next: head,
            _marker: PhantomData,
        }
    }

    /// Walk the tables linked from `head.next` (`head` itself excluded).
    ///
    /// # Safety
    /// Same as [`ApiChain::starting_at`].
    #[must_use]
    pub unsafe fn after(head: &'a ApiHeader) -> Self {
        Self {
            next: head.next,
            _marker: PhantomData,
        }
    }
}

impl<'a> Iterator for ApiChain<'a> {
    type Item = &'a ApiHeader;

    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: guaranteed by the constructors' contract
        let current = unsafe { self.next.as_ref()? };
        self.next = current.next;
        Some(current)
    }
}

// =============================================================================
// Resolved tables
// =============================================================================

/// Every capability table the host offered that this crate recognises.
pub struct ApiTables {
    pub core: &'static CoreApi,
    pub core_1_1: Option<&'static CoreApi11>,
    pub core_1_2: Option<&'static CoreApi12>,
    pub nativescript: Option<&'static NativeScriptApi>,
    pub nativescript_1_1: Option<&'static NativeScriptApi11>,
    pub pluginscript: Option<&'static PluginScriptApi>,
    pub android: Option<&'static AndroidApi>,
    pub arvr: Option<&'static ArvrApi>,
    pub arvr_1_2: Option<&'static ArvrApi12>,
    pub videodecoder: Option<&'static VideoDecoderApi>,
    pub net: Option<&'static NetApi>,
    pub net_3_2: Option<&'static NetApi32>,
    /// `GDNativeLibrary` object being initialized
    pub library: *mut GodotObject,
    /// Whether the library was loaded by the editor
    pub in_editor: bool,
}

// SAFETY: every referenced table is immutable host memory, and `library` is
// an opaque handle this crate never dereferences.
unsafe impl Send for ApiTables {}
unsafe impl Sync for ApiTables {}

/// Tables are raw function pointers; only the core address and which
/// extension slots were filled are shown.
impl fmt::Debug for ApiTables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiTables")
            .field("core", &(self.core as *const CoreApi))
            .field("core_1_1", &self.core_1_1.is_some())
            .field("core_1_2", &self.core_1_2.is_some())
            .field("nativescript", &self.nativescript.is_some())
            .field("nativescript_1_1", &self.nativescript_1_1.is_some())
            .field("pluginscript", &self.pluginscript.is_some())
            .field("android", &self.android.is_some())
            .field("arvr", &self.arvr.is_some())
            .field("arvr_1_2", &self.arvr_1_2.is_some())
            .field("videodecoder", &self.videodecoder.is_some())
            .field("net", &self.net.is_some())
            .field("net_3_2", &self.net_3_2.is_some())
            .field("library", &self.library)
            .field("in_editor", &self.in_editor)
            .finish()
    }
}

/// Reinterpret a header as the table it prefixes.
///
/// # Safety
/// `header` must be the first field of a live `T`.
unsafe fn table<T>(header: &'static ApiHeader) -> &'static T {
    unsafe { &*(header as *const ApiHeader as *const T) }
}

/// Store `header` as a `T` in `slot` unless the slot is already taken.
///
/// # Safety
/// Same as [`table`].
unsafe fn claim<T>(slot: &mut Option<&'static T>, header: &'static ApiHeader, name: &str) {
    if slot.is_some() {
        tracing::debug!(target: "gdnhl", table = name, version = %header.version, "duplicate table ignored");
        return;
    }
    tracing::trace!(target: "gdnhl", table = name, version = %header.version, "table resolved");
    *slot = Some(unsafe { table(header) });
}

impl ApiTables {
    fn empty(core: &'static CoreApi, library: *mut GodotObject, in_editor: bool) -> Self {
        Self {
            core,
            core_1_1: None,
            core_1_2: None,
            nativescript: None,
            nativescript_1_1: None,
            pluginscript: None,
            android: None,
            arvr: None,
            arvr_1_2: None,
            videodecoder: None,
            net: None,
            net_3_2: None,
            library,
            in_editor,
        }
    }

    /// Resolve every recognised table reachable from `options`.
    ///
    /// Pure: calling it twice on the same chain gives the same references.
    ///
    /// # Safety
    /// - `options.api_struct` must point to a valid core table
    /// - every table reachable from it (chains and extension array) must be
    ///   valid and stay alive, unmodified, for the rest of the process
    pub unsafe fn resolve(options: &InitOptions) -> Self {
        // SAFETY: caller guarantees a valid core table with static lifetime
        let core: &'static CoreApi = unsafe { &*options.api_struct };
        let mut tables = Self::empty(core, options.gd_native_library, options.in_editor);

        // The head is normally 1.0, but a host may hand over a newer release
        // directly, so it's classified along with its chain.
        // SAFETY: chain validity is part of the caller contract
        for header in unsafe { chain_of(&core.header) } {
            match (header.version.major, header.version.minor) {
                (1, 1) => unsafe { claim(&mut tables.core_1_1, header, "core 1.1") },
                (1, 2) => unsafe { claim(&mut tables.core_1_2, header, "core 1.2") },
                (1, 0) => {}
                _ => {
                    tracing::debug!(target: "gdnhl", version = %header.version, "unknown core release skipped")
                }
            }
        }

        for &ptr in unsafe { extension_slice(core) } {
            // SAFETY: entries are null or valid static headers
            let Some(header) = (unsafe { ptr.as_ref() }) else {
                continue;
            };
            unsafe { tables.classify(header) };
        }

        tables
    }

    /// Store one extension table and walk its own chain.
    unsafe fn classify(&mut self, header: &'static ApiHeader) {
        let Some(kind) = header.api_kind() else {
            tracing::debug!(target: "gdnhl", kind = header.kind, "unknown extension skipped");
            return;
        };
        unsafe {
            match kind {
                ApiKind::NativeScript => {
                    claim(&mut self.nativescript, header, "nativescript");
                    for next in chain_of(header) {
                        if (next.version.major, next.version.minor) == (1, 1) {
                            claim(&mut self.nativescript_1_1, next, "nativescript 1.1");
                        }
                    }
                }
                ApiKind::PluginScript => claim(&mut self.pluginscript, header, "pluginscript"),
                ApiKind::Android => claim(&mut self.android, header, "android"),
                ApiKind::Arvr => {
                    claim(&mut self.arvr, header, "arvr");
                    for next in chain_of(header) {
                        if (next.version.major, next.version.minor) == (1, 2) {
                            claim(&mut self.arvr_1_2, next, "arvr 1.2");
                        }
                    }
                }
                ApiKind::VideoDecoder => claim(&mut self.videodecoder, header, "videodecoder"),
                ApiKind::Net => {
                    claim(&mut self.net, header, "net");
                    for next in chain_of(header) {
                        if (next.version.major, next.version.minor) == (3, 2) {
                            claim(&mut self.net_3_2, next, "net 3.2");
                        }
                    }
                }
                ApiKind::Core => {
                    tracing::debug!(target: "gdnhl", "core table listed as an extension, skipped")
                }
            }
        }
    }

    /// Handle to the core table
    #[inline]
    #[must_use]
    pub fn core(&self) -> Core {
        Core(self.core)
    }
}

/// A static header followed by its chain.
unsafe fn chain_of(header: &'static ApiHeader) -> ApiChain<'static> {
    unsafe { ApiChain::starting_at(header) }
}

/// The core table's extension array as a slice.
unsafe fn extension_slice(core: &'static CoreApi) -> &'static [*const ApiHeader] {
    if core.extensions.is_null() || core.num_extensions == 0 {
        return &[];
    }
    // SAFETY: the host guarantees `num_extensions` entries behind `extensions`
    unsafe { std::slice::from_raw_parts(core.extensions, core.num_extensions as usize) }
}

// =============================================================================
// Process-wide lifecycle
// =============================================================================

static TABLES: OnceLock<ApiTables> = OnceLock::new();

/// Resolve and publish the host's tables. Call from `godot_gdnative_init`
/// before anything else in this crate.
///
/// A second call keeps the tables from the first one.
///
/// # Safety
/// Same contract as [`ApiTables::resolve`].
///
/// # Panics
/// If `options.api_struct` is null.
pub unsafe fn gdnative_init(options: &InitOptions) -> &'static ApiTables {
    assert!(
        !options.api_struct.is_null(),
        "gdnative_init: host passed a null core table"
    );

    let mut fresh = false;
    let tables = TABLES.get_or_init(|| {
        fresh = true;
        // SAFETY: forwarded caller contract
        unsafe { ApiTables::resolve(options) }
    });

    if fresh {
        tracing::debug!(
            target: "gdnhl",
            in_editor = tables.in_editor,
            core_1_1 = tables.core_1_1.is_some(),
            core_1_2 = tables.core_1_2.is_some(),
            nativescript = tables.nativescript.is_some(),
            "gdnative initialized"
        );
    } else {
        tracing::warn!(target: "gdnhl", "gdnative_init called more than once, keeping the first tables");
    }
    tables
}

/// Mirror of [`gdnative_init`]. Call from `godot_gdnative_terminate`.
///
/// Releases this thread's formatting scratch buffer. Resolved tables stay
/// readable.
pub fn gdnative_terminate(options: &TerminateOptions) {
    crate::log::release_scratch();
    tracing::debug!(target: "gdnhl", in_editor = options.in_editor, "gdnative terminated");
}

/// Resolved tables, or `None` before [`gdnative_init`].
#[inline]
pub fn try_api() -> Option<&'static ApiTables> {
    TABLES.get()
}

/// Resolved tables.
///
/// # Panics
/// If called before [`gdnative_init`].
#[inline]
pub fn api() -> &'static ApiTables {
    match TABLES.get() {
        Some(tables) => tables,
        None => panic!("gdnhl used before gdnative_init"),
    }
}

/// Handle to the resolved core table.
///
/// # Panics
/// If called before [`gdnative_init`].
#[inline]
pub fn core() -> Core {
    api().core()
}
