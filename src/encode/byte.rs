use core::convert::TryFrom;

use crate::{
    error::{Error, Result},
    util::{buffer::Buffer, wire},
};

use super::{check_close, check_full, check_open, Context, Encoder};

/// The first byte of every non-empty byte encoded match.
pub(crate) const TAG: u8 = 3;

/// An encoder for the compact binary format.
///
/// After a leading tag byte, every node is written as its negated start
/// position, the length of its name as an `i16`, the name itself, then its
/// children and finally its end position. All integers are little endian,
/// and the sign of the next integer tells a reader whether a child starts
/// or the current node ends.
///
/// Use [`decode`](super::decode) to read this format back.
#[derive(Clone, Debug, Default)]
pub struct ByteEncoder {
    buf: Buffer,
}

impl ByteEncoder {
    pub fn new() -> ByteEncoder {
        ByteEncoder::default()
    }

    pub fn into_buffer(self) -> Buffer {
        self.buf
    }

    fn start_node(&mut self, cx: &Context<'_>, cap: usize) -> Result<()> {
        if self.buf.is_empty() {
            self.buf.push(TAG)?;
        }
        let rec = cx.record(cap);
        let name = cx.name(&rec)?;
        wire::write_i32(-position(rec.start + 1)?, &mut self.buf)?;
        let len = i16::try_from(name.len())
            .map_err(|_| Error::encoding_overflow("capture name"))?;
        wire::write_i16(len, &mut self.buf)?;
        self.buf.extend(name)
    }
}

fn position(pos: usize) -> Result<i32> {
    i32::try_from(pos).map_err(|_| Error::encoding_overflow("position"))
}

impl Encoder for ByteEncoder {
    fn open(
        &mut self,
        cx: &Context<'_>,
        cap: usize,
        _count: usize,
    ) -> Result<()> {
        check_open(cx, cap)?;
        self.start_node(cx, cap)
    }

    fn full_capture(
        &mut self,
        cx: &Context<'_>,
        cap: usize,
        _count: usize,
    ) -> Result<()> {
        let rec = check_full(cx, cap)?;
        self.start_node(cx, cap)?;
        wire::write_i32(position(rec.end() + 1)?, &mut self.buf)
    }

    fn close(
        &mut self,
        cx: &Context<'_>,
        cap: usize,
        _count: usize,
        _start: Option<usize>,
    ) -> Result<()> {
        let rec = check_close(cx, cap)?;
        wire::write_i32(position(rec.start + 1)?, &mut self.buf)
    }
}
