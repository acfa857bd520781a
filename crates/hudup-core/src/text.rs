//! Flat delimited text form used for persistence.

use crate::error::Result;

/// Round-trip between a value and its flat delimited text form.
///
/// Types without a text form answer [`ErrorKind::Unsupported`].
///
/// [`ErrorKind::Unsupported`]: crate::ErrorKind::Unsupported
pub trait TextParsable: Sized {
    /// Formats the value as text.
    fn to_text(&self) -> Result<String>;

    /// Parses a value formatted by [`TextParsable::to_text`].
    fn parse_text(text: &str) -> Result<Self>;
}
