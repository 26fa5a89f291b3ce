//! Exported library entry points

/// Define the symbols the host looks up when loading the library.
///
/// Emits `godot_gdnative_init` and `godot_gdnative_terminate`, which resolve
/// and release the API tables, and optionally `godot_nativescript_init`.
/// Each hook is a plain function called after the tables are in place.
///
/// ```ignore
/// fn init(tables: &'static ApiTables) { ... }
/// fn terminate(tables: &'static ApiTables) { ... }
/// fn nativescript(handle: &InitHandle) { ... }
///
/// gdnhl::gdnative_entry! {
///     init => init,
///     terminate => terminate,
///     nativescript => nativescript,
/// }
/// ```
///
/// Every hook is optional, but they must appear in that order.
#[macro_export]
macro_rules! gdnative_entry {
    (
        $(init => $init:path,)?
        $(terminate => $terminate:path,)?
        $(nativescript => $nativescript:path $(,)?)?
    ) => {
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn godot_gdnative_init(options: *mut $crate::sys::InitOptions) {
            // SAFETY: the host passes valid options whose tables outlive the library
            let tables = unsafe { $crate::gdnative_init(&*options) };
            $( $init(tables); )?
            let _ = tables;
        }

        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn godot_gdnative_terminate(
            options: *mut $crate::sys::TerminateOptions,
        ) {
            $( $terminate($crate::api()); )?
            // SAFETY: the host passes valid options
            $crate::gdnative_terminate(unsafe { &*options });
        }

        $(
            #[unsafe(no_mangle)]
            pub unsafe extern "C" fn godot_nativescript_init(handle: *mut ::std::ffi::c_void) {
                // SAFETY: `handle` comes straight from the host
                let init = unsafe { $crate::nativescript::InitHandle::new($crate::api(), handle) };
                $nativescript(&init);
            }
        )?
    };
}
