//! Host console output
//!
//! Messages are formatted into a per-thread scratch buffer and handed to the
//! host's print entry points together with the caller's module, file and
//! line. The macros at the bottom are the intended entry points.
//!
//! These go to the engine's console and editor output. Diagnostics about the
//! binding layer itself use `tracing` under the `gdnhl` target instead.

use std::cell::RefCell;
use std::ffi::{c_char, c_int};
use std::fmt;
use std::io::Write;

use crate::resolver::Core;
use crate::string::GdString;

thread_local! {
    static SCRATCH: RefCell<Vec<u8>> = const { RefCell::new(Vec::new()) };
}

/// Call site reported with warnings and errors.
///
/// Both strings carry their own NUL terminator; build it with
/// [`location!`](crate::location).
#[derive(Clone, Copy, Debug)]
pub struct Location {
    function: &'static str,
    file: &'static str,
    line: u32,
}

impl Location {
    #[must_use]
    pub const fn new(function: &'static str, file: &'static str, line: u32) -> Self {
        Self {
            function,
            file,
            line,
        }
    }

    fn function_ptr(&self) -> *const c_char {
        terminated(self.function)
    }

    fn file_ptr(&self) -> *const c_char {
        terminated(self.file)
    }

    fn line(&self) -> c_int {
        c_int::try_from(self.line).unwrap_or(c_int::MAX)
    }
}

/// Pointer to a string that must end in NUL, or to an empty C string.
fn terminated(s: &'static str) -> *const c_char {
    if s.ends_with('\0') {
        s.as_ptr().cast()
    } else {
        c"".as_ptr()
    }
}

/// Render `args` followed by a NUL into `buf`.
fn render(buf: &mut Vec<u8>, args: fmt::Arguments<'_>) {
    buf.clear();
    // Writing into a Vec only fails if a Display impl does
    let _ = buf.write_fmt(args);
    buf.push(0);
}

/// Format `args` and pass the NUL-terminated text (and its length, without
/// the terminator) to `f`.
///
/// Re-entrant calls, e.g. a host print that calls back into Rust which
/// prints again, fall back to a fresh buffer.
fn with_scratch<R>(args: fmt::Arguments<'_>, f: impl FnOnce(&[u8]) -> R) -> R {
    SCRATCH.with(|cell| match cell.try_borrow_mut() {
        Ok(mut buf) => {
            render(&mut buf, args);
            f(&buf)
        }
        Err(_) => {
            let mut buf = Vec::new();
            render(&mut buf, args);
            f(&buf)
        }
    })
}

/// Free this thread's scratch buffer.
pub(crate) fn release_scratch() {
    SCRATCH.with(|cell| {
        if let Ok(mut buf) = cell.try_borrow_mut() {
            *buf = Vec::new();
        }
    });
}

/// Print a message to the host console.
pub fn print(core: Core, args: fmt::Arguments<'_>) {
    with_scratch(args, |text| {
        let message = GdString::from_bytes(core, &text[..text.len() - 1]);
        // SAFETY: `message` is a live host string for the duration of the call
        unsafe { (core.print)(message.sys()) }
    });
}

/// Print a warning with its call site. Text after an interior NUL is dropped.
pub fn print_warning(core: Core, args: fmt::Arguments<'_>, location: Location) {
    with_scratch(args, |text| {
        // SAFETY: all three strings are NUL-terminated and outlive the call
        unsafe {
            (core.print_warning)(
                text.as_ptr().cast(),
                location.function_ptr(),
                location.file_ptr(),
                location.line(),
            )
        }
    });
}

/// Print an error with its call site. Text after an interior NUL is dropped.
pub fn print_error(core: Core, args: fmt::Arguments<'_>, location: Location) {
    with_scratch(args, |text| {
        // SAFETY: all three strings are NUL-terminated and outlive the call
        unsafe {
            (core.print_error)(
                text.as_ptr().cast(),
                location.function_ptr(),
                location.file_ptr(),
                location.line(),
            )
        }
    });
}

// =============================================================================
// Macros
// =============================================================================

/// [`Location`](crate::log::Location) of the macro's call site.
#[macro_export]
macro_rules! location {
    () => {
        $crate::log::Location::new(
            ::std::concat!(::std::module_path!(), "\0"),
            ::std::concat!(::std::file!(), "\0"),
            ::std::line!(),
        )
    };
}

/// Print to the host console, `format!` style.
#[macro_export]
macro_rules! gd_print {
    ($($arg:tt)*) => {
        $crate::log::print($crate::core(), ::std::format_args!($($arg)*))
    };
}

/// Print a warning to the host console, `format!` style.
#[macro_export]
macro_rules! gd_warn {
    ($($arg:tt)*) => {
        $crate::log::print_warning(
            $crate::core(),
            ::std::format_args!($($arg)*),
            $crate::location!(),
        )
    };
}

/// Print an error to the host console, `format!` style.
#[macro_export]
macro_rules! gd_error {
    ($($arg:tt)*) => {
        $crate::log::print_error(
            $crate::core(),
            ::std::format_args!($($arg)*),
            $crate::location!(),
        )
    };
}

/// Log an error and return a nil [`Variant`](crate::Variant) from the
/// enclosing function when `cond` is false.
#[macro_export]
macro_rules! gd_assert {
    ($cond:expr $(,)?) => {
        $crate::gd_assert!($cond, "Assertion error: !({})", ::std::stringify!($cond))
    };
    ($cond:expr, $($arg:tt)+) => {
        if !($cond) {
            $crate::gd_error!($($arg)+);
            return $crate::Variant::nil($crate::core());
        }
    };
}

/// Return nil unless at least `$min` arguments were passed.
#[macro_export]
macro_rules! gd_assert_args {
    ($args:expr, $min:expr $(,)?) => {
        $crate::gd_assert!(
            $args.len() >= $min,
            "Error: expected at least {} arguments",
            $min
        )
    };
}

/// Return nil unless the array holds at least `$min` elements.
#[macro_export]
macro_rules! gd_assert_array_size {
    ($array:expr, $min:expr $(,)?) => {
        $crate::gd_assert!(
            $array.len() >= $min,
            "Error: array should have size of at least {}",
            $min
        )
    };
}
