//! Logging macros
//!
//! One set of macros for every build:
//! - Firmware (`defmt` feature): forwards to `defmt`, shipped over RTT.
//! - Host unit tests: prints to stdout/stderr.
//! - Anything else: compiled out, arguments are type-checked but never evaluated.
//!
//! Format strings must stay within the subset both `defmt` and `core::fmt`
//! accept (`{}`, `{:?}` and `{:x}`).

#[doc(hidden)]
#[macro_export]
macro_rules! __log_sink {
    ($defmt:ident, $prefix:literal, $($arg:tt)*) => {{
        #[cfg(all(feature = "defmt", not(test)))]
        ::defmt::$defmt!($($arg)*);

        #[cfg(test)]
        println!("{} {}", $prefix, format!($($arg)*));

        #[cfg(all(not(feature = "defmt"), not(test)))]
        {
            if false {
                let _ = ::core::format_args!($($arg)*);
            }
        }
    }};
}

/// Log informational message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => { $crate::__log_sink!(info, "[INFO] ", $($arg)*) };
}

/// Log warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => { $crate::__log_sink!(warn, "[WARN] ", $($arg)*) };
}

/// Log error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => { $crate::__log_sink!(error, "[ERROR]", $($arg)*) };
}

/// Log debug message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => { $crate::__log_sink!(debug, "[DEBUG]", $($arg)*) };
}
