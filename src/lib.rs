//! Example GDNative plugin built on gdnhl
//!
//! Load it from a `GDNativeLibrary` resource. It provides:
//! 1. Native calls: `GDNative.call_native("standard_varcall", "count_chars", [text])`
//!    and `"byte_checksum"` over any variant with raw data
//! 2. A `Tally` script class with a property, a signal and a few methods
//!
//! Build with: `cargo build -p gdnhl-demo`

use gdnhl::prelude::*;

// =============================================================================
// Native calls
// =============================================================================

/// Number of characters (not bytes) in the first argument.
pub fn count_chars(args: ArrayRef<'_>) -> Variant {
    gd_assert_array_size!(args, 1);
    let text: String = args.get_as(0);
    Variant::from_i64(args.core(), text.chars().count() as i64)
}

/// Sum of the raw bytes behind the first argument, whatever its type.
pub fn byte_checksum(args: ArrayRef<'_>) -> Variant {
    gd_assert_array_size!(args, 1);
    let Some(arg) = args.get_ref(0) else {
        return Variant::nil(args.core());
    };
    let buffer = arg.buffer();
    if buffer.as_ptr().is_null() {
        gd_warn!("byte_checksum: {:?} has no raw data", buffer.variant_type());
    }
    let sum: u64 = buffer.as_bytes().iter().map(|&b| u64::from(b)).sum();
    Variant::from_u64(args.core(), sum)
}

unsafe extern "C" fn count_chars_call(_symbol: *mut c_void, args: *mut GodotArray) -> GodotVariant {
    // SAFETY: the host passes its argument array for the duration of the call
    let args = unsafe { ArrayRef::from_sys(gdnhl::core(), args) };
    count_chars(args).into_sys()
}

unsafe extern "C" fn byte_checksum_call(_symbol: *mut c_void, args: *mut GodotArray) -> GodotVariant {
    // SAFETY: as above
    let args = unsafe { ArrayRef::from_sys(gdnhl::core(), args) };
    byte_checksum(args).into_sys()
}

// =============================================================================
// Script class
// =============================================================================

/// Counts events, optionally wrapping at a limit.
pub struct Tally {
    count: i64,
    limit: i64,
}

impl NativeClass for Tally {
    const CLASS_NAME: &'static str = "Tally";

    fn init(_owner: Owner) -> Self {
        Tally { count: 0, limit: 0 }
    }
}

fn limit(this: &Tally) -> i64 {
    this.limit
}

fn set_limit(this: &mut Tally, limit: i64) {
    this.limit = limit.max(0);
}

#[methods(register_with = Tally::register)]
impl Tally {
    fn register(builder: &ClassBuilder<'_, Self>) -> gdnhl::Result<()> {
        builder.add_property("limit", 0i64, limit, set_limit)?;
        builder.add_signal(
            "wrapped",
            &[SignalArg {
                name: "times",
                ty: VariantType::Int,
            }],
        )
    }

    fn add(&mut self, amount: i64) -> i64 {
        self.count += amount;
        if self.limit > 0 {
            self.count %= self.limit;
        }
        self.count
    }

    fn count(&self) -> i64 {
        self.count
    }

    fn reset(&mut self) {
        self.count = 0;
    }

    #[method(rpc = "remote_sync")]
    fn describe(&self) -> String {
        format!("{} of {}", self.count, self.limit)
    }
}

// =============================================================================
// Entry points
// =============================================================================

fn init(tables: &'static ApiTables) {
    let core = tables.core();
    core.register_native_call(c"count_chars", count_chars_call);
    core.register_native_call(c"byte_checksum", byte_checksum_call);
    if tables.nativescript.is_none() {
        gd_warn!("host has no NativeScript, Tally won't be available");
    }
}

fn nativescript(handle: &InitHandle) {
    if let Err(e) = handle.add_class::<Tally>() {
        gd_error!("{e}");
    }
}

gdnhl::gdnative_entry! {
    init => init,
    nativescript => nativescript,
}
