//! ABI tests for gdnhl against a C++ compiler
//!
//! The structures below are written the way the GDNative C headers declare
//! them. Every test compares a layout (size, alignment, field offset) or a
//! pointer chain built by C++ against what the Rust declarations in
//! `gdnhl::sys` assume.
//!
//! Run with: `cargo test -p gdnhl-cpp-tests`

#![recursion_limit = "512"]

use cpp::cpp;

// =============================================================================
// C++ mirrors of the host headers
// =============================================================================

cpp! {{
    #include <cstddef>
    #include <cstdint>

    struct cpp_api_version {
        unsigned int major;
        unsigned int minor;
    };

    struct cpp_api_struct {
        unsigned int type;
        cpp_api_version version;
        const cpp_api_struct *next;
    };

    struct cpp_core_api_prefix {
        unsigned int type;
        cpp_api_version version;
        const cpp_api_struct *next;
        unsigned int num_extensions;
        const cpp_api_struct **extensions;
    };

    struct cpp_variant { uint8_t _dont_touch_that[16 + sizeof(int64_t)]; };
    struct cpp_string { uint8_t _dont_touch_that[sizeof(void *)]; };
    struct cpp_pool_array { uint8_t _dont_touch_that[sizeof(void *)]; };

    struct cpp_vector2 { float x, y; };
    struct cpp_vector3 { float x, y, z; };
    struct cpp_color { float r, g, b, a; };

    enum cpp_rpc_mode { CPP_RPC_DISABLED, CPP_RPC_REMOTE };

    struct cpp_init_options {
        bool in_editor;
        uint64_t core_api_hash;
        uint64_t editor_api_hash;
        uint64_t no_api_hash;
        void (*report_version_mismatch)(const void *, const char *, cpp_api_version, cpp_api_version);
        void (*report_loading_error)(const void *, const char *);
        void *gd_native_library;
        const cpp_core_api_prefix *api_struct;
        const cpp_string *active_library_path;
    };

    struct cpp_terminate_options {
        bool in_editor;
        uint64_t core_api_hash;
        uint64_t editor_api_hash;
        uint64_t no_api_hash;
    };

    struct cpp_instance_method {
        cpp_variant (*method)(void *, void *, void *, int, cpp_variant **);
        void *method_data;
        void (*free_func)(void *);
    };

    struct cpp_property_attributes {
        cpp_rpc_mode rset_type;
        int type;
        int hint;
        cpp_string hint_string;
        int usage;
        cpp_variant default_value;
    };

    struct cpp_signal_argument {
        cpp_string name;
        int type;
        int hint;
        cpp_string hint_string;
        int usage;
        cpp_variant default_value;
    };

    struct cpp_signal {
        cpp_string name;
        int num_args;
        cpp_signal_argument *args;
        int num_default_args;
        cpp_variant *default_args;
    };

    // A host-like table set: core 1.0 -> 1.1 -> 1.2, and an extension
    // array with NativeScript 1.0 -> 1.1, an unknown kind and a null slot.
    static const cpp_api_struct core_1_2 = { 0, { 1, 2 }, nullptr };
    static const cpp_api_struct core_1_1 = { 0, { 1, 1 }, &core_1_2 };
    static const cpp_api_struct nativescript_1_1 = { 1, { 1, 1 }, nullptr };
    static const cpp_api_struct nativescript_1_0 = { 1, { 1, 0 }, &nativescript_1_1 };
    static const cpp_api_struct future_kind = { 99, { 1, 0 }, nullptr };
    static const cpp_api_struct *extensions[] = { &nativescript_1_0, &future_kind, nullptr };
    static const cpp_core_api_prefix core_api = {
        0, { 1, 0 }, &core_1_1, 3, extensions
    };
}}

// =============================================================================
// C++ helper functions (only used in tests)
// =============================================================================

#[cfg(test)]
fn cpp_core_api() -> *const gdnhl::sys::ApiHeader {
    cpp!(unsafe [] -> *const gdnhl::sys::ApiHeader as "const void*" {
        return &core_api;
    })
}

#[cfg(test)]
fn cpp_core_num_extensions() -> u32 {
    cpp!(unsafe [] -> u32 as "unsigned int" {
        return core_api.num_extensions;
    })
}

#[cfg(test)]
fn cpp_extension(index: usize) -> *const gdnhl::sys::ApiHeader {
    cpp!(unsafe [index as "size_t"] -> *const gdnhl::sys::ApiHeader as "const void*" {
        return core_api.extensions[index];
    })
}
