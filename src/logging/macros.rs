// SPDX-License-Identifier: Apache-2.0 OR MIT
// Logging macros for convenient logging
//
// Unlike the plain `Logger` methods, the macros capture the module path and
// enclosing function as well as file and line.

/// Path of the enclosing function, e.g. `my_crate::worker::run`
#[doc(hidden)]
#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        let name = name.strip_suffix("::f").unwrap_or(name);
        name.trim_end_matches("::{{closure}}")
    }};
}

/// Call-site metadata for the macro invocation point
#[macro_export]
macro_rules! call_site {
    () => {
        $crate::logging::CallSite {
            file: file!(),
            line: line!(),
            module: module_path!(),
            function: $crate::function_name!(),
        }
    };
}

/// Log a formatted message at an explicit severity
///
/// # Examples
/// ```ignore
/// log_at!(logger, Severity::Info, "loaded {} rows", rows);
/// ```
#[macro_export]
macro_rules! log_at {
    ($logger:expr, $level:expr, $($arg:tt)+) => {
        $logger.log_at($level, $crate::call_site!(), format!($($arg)+), None)
    };
}

/// Log a message with trace severity
///
/// # Examples
/// ```ignore
/// log_trace!(logger, "entering poll loop");
/// ```
#[macro_export]
macro_rules! log_trace {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::logging::Severity::Trace, $($arg)+)
    };
}

/// Log a message with debug severity
#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::logging::Severity::Debug, $($arg)+)
    };
}

/// Log a message with info severity
///
/// # Examples
/// ```ignore
/// log_info!(logger, "worker {} started", id);
/// ```
#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::logging::Severity::Info, $($arg)+)
    };
}

/// Log a message with success severity
#[macro_export]
macro_rules! log_success {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::logging::Severity::Success, $($arg)+)
    };
}

/// Log a message with warning severity
#[macro_export]
macro_rules! log_warning {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::logging::Severity::Warning, $($arg)+)
    };
}

/// Log a message with error severity
#[macro_export]
macro_rules! log_error {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::logging::Severity::Error, $($arg)+)
    };
}

/// Log a message with critical severity
#[macro_export]
macro_rules! log_critical {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::logging::Severity::Critical, $($arg)+)
    };
}

/// Log at error severity with an error's source chain attached
///
/// # Examples
/// ```ignore
/// log_exception!(logger, &err, "failed to open {}", path.display());
/// ```
#[macro_export]
macro_rules! log_exception {
    ($logger:expr, $err:expr, $($arg:tt)+) => {
        $logger.log_at(
            $crate::logging::Severity::Error,
            $crate::call_site!(),
            format!($($arg)+),
            Some($crate::logging::render_error_chain($err)),
        )
    };
}
