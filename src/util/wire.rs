/*!
Helpers for reading and writing the fixed width little endian integers used
by the binary match tree format.

Writing goes through a [`Buffer`], so it can only fail when the buffer cannot
grow. Reading is bounds checked and reports a [`DecodeError`] instead of
panicking when the input is truncated.
*/

use core::{convert::TryInto, fmt};

use crate::{error::Result, util::buffer::Buffer};

/// An error that occurs when decoding a binary match tree.
///
/// A `DecodeError` provides no introspection capabilities. Its only
/// supported operation is conversion to a human readable message, which
/// always starts with "corrupt match data".
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecodeError(DecodeErrorKind);

#[derive(Clone, Debug, Eq, PartialEq)]
enum DecodeErrorKind {
    BufferTooSmall { what: &'static str, offset: usize },
    InvalidTag { found: u8 },
    ExpectedStart { offset: usize },
    InvalidNameLength { offset: usize },
    TrailingData { offset: usize },
}

impl DecodeError {
    pub(crate) fn buffer_too_small(
        what: &'static str,
        offset: usize,
    ) -> DecodeError {
        DecodeError(DecodeErrorKind::BufferTooSmall { what, offset })
    }

    pub(crate) fn invalid_tag(found: u8) -> DecodeError {
        DecodeError(DecodeErrorKind::InvalidTag { found })
    }

    pub(crate) fn expected_start(offset: usize) -> DecodeError {
        DecodeError(DecodeErrorKind::ExpectedStart { offset })
    }

    pub(crate) fn invalid_name_length(offset: usize) -> DecodeError {
        DecodeError(DecodeErrorKind::InvalidNameLength { offset })
    }

    pub(crate) fn trailing_data(offset: usize) -> DecodeError {
        DecodeError(DecodeErrorKind::TrailingData { offset })
    }
}

impl std::error::Error for DecodeError {}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use self::DecodeErrorKind::*;

        match self.0 {
            BufferTooSmall { what, offset } => write!(
                f,
                "corrupt match data (buffer overrun reading {} at offset {})",
                what, offset,
            ),
            InvalidTag { found } => write!(
                f,
                "corrupt match data (unknown encoding tag {})",
                found,
            ),
            ExpectedStart { offset } => write!(
                f,
                "corrupt match data (expected start marker at offset {})",
                offset,
            ),
            InvalidNameLength { offset } => write!(
                f,
                "corrupt match data (expected length of name at offset {})",
                offset,
            ),
            TrailingData { offset } => write!(
                f,
                "corrupt match data (unexpected data at offset {})",
                offset,
            ),
        }
    }
}

pub fn write_i16(n: i16, dst: &mut Buffer) -> Result<()> {
    dst.extend(&n.to_le_bytes())
}

pub fn write_i32(n: i32, dst: &mut Buffer) -> Result<()> {
    dst.extend(&n.to_le_bytes())
}

/// Try to read a little endian i16 from the beginning of the given slice.
///
/// `offset` is the position of `slice` within the whole input and is only
/// used for error reporting.
pub fn try_read_i16(
    slice: &[u8],
    offset: usize,
    what: &'static str,
) -> core::result::Result<i16, DecodeError> {
    match slice.get(..2) {
        None => Err(DecodeError::buffer_too_small(what, offset)),
        Some(bytes) => Ok(i16::from_le_bytes(bytes.try_into().unwrap())),
    }
}

/// Try to read a little endian i32 from the beginning of the given slice.
pub fn try_read_i32(
    slice: &[u8],
    offset: usize,
    what: &'static str,
) -> core::result::Result<i32, DecodeError> {
    match slice.get(..4) {
        None => Err(DecodeError::buffer_too_small(what, offset)),
        Some(bytes) => Ok(i32::from_le_bytes(bytes.try_into().unwrap())),
    }
}
