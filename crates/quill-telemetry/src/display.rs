//! Utilities to emit fields using their [`std::fmt::Display`] implementation.
use std::fmt::{
    Display,
    Formatter,
    Result,
};

use serde_with::SerializeDisplay;

/// Format `bytes` as lower-cased hex.
///
/// # Example
/// ```
/// use quill_telemetry::display;
/// let tx_hash = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
/// tracing::info!(tx_hash = %display::hex(&tx_hash), "transaction submitted");
/// ```
pub fn hex<T: AsRef<[u8]> + ?Sized>(bytes: &T) -> Hex<'_> {
    Hex(bytes.as_ref())
}

/// A newtype wrapper of a byte slice that implements [`std::fmt::Display`].
///
/// To be used in tracing contexts. See the [`self::hex`] utility.
#[derive(SerializeDisplay)]
pub struct Hex<'a>(&'a [u8]);

impl<'a> Display for Hex<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        for byte in self.0 {
            f.write_fmt(format_args!("{byte:02x}"))?;
        }
        Ok(())
    }
}
