// re-export so that they need not be imported by downstream users.
// hidden because they shouldn't be imported.
#[doc(hidden)]
pub use const_format::{
    concatcp as __concatcp,
    map_ascii_case as __map_ascii_case,
    Case as __Case,
};

/// Declare a `const` string slice, using the declaring crate's name as a
/// prefix and the variable name as a suffix.
///
/// This macro essentially performs this declaration:
/// ```text
/// METRIC_NAME := ${CARGO_CRATE_NAME}_metric_name;
/// ```
///
/// The purpose of this macro is to avoid accidental typos, ensuring that the
/// metric name matches the const variable name.
///
/// # Examples
/// ```
/// use quill_telemetry::metric_name;
/// metric_name!(pub const EXAMPLE_COUNTER);
/// // Note that this example has `quill_telemetry` as a prefix because
/// // this doctest is part of this crate.
/// // In your case, use your crate's `CARGO_CRATE_NAME` as prefix.
/// assert_eq!(EXAMPLE_COUNTER, "quill_telemetry_example_counter");
/// ```
#[macro_export]
macro_rules! metric_name {
    ($vis:vis const $($tt:tt)*) => {
        $crate::__metric_name_internal!(
            $vis [$($tt)*] [::core::stringify!($($tt)*)]
        );
    }
}

/// Declare a list of metric name constants along with a `const` slice
/// collecting all of them.
///
/// # Examples
/// ```
/// use quill_telemetry::metric_names;
/// metric_names!(pub const METRICS_NAMES: EXAMPLE_COUNTER, EXAMPLE_GAUGE);
/// assert_eq!(
///     METRICS_NAMES,
///     [
///         "quill_telemetry_example_counter",
///         "quill_telemetry_example_gauge"
///     ]
/// );
/// ```
#[macro_export]
macro_rules! metric_names {
    ($vis:vis const $collection_name:ident: $($name:ident),+ $(,)?) => {
        $(
            $crate::metric_name!($vis const $name);
        )+
        $vis const $collection_name: &[&str] = &[$($name),+];
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __metric_name_internal {
    ($vis:vis [$name:ident][$suffix:expr]) => {
        $vis const $name: &str = $crate::macros::__concatcp!(
            ::core::env!("CARGO_CRATE_NAME"),
            "_",
            $crate::macros::__map_ascii_case!($crate::macros::__Case::Lower, $suffix),
        );
    };
}
