use bstr::ByteSlice;

use crate::{
    capture::Capture,
    error::Result,
    util::buffer::Buffer,
    value::Value,
};

use super::{check_close, check_full, check_open, Context, Encoder};

/// An encoder that writes one line of text per callback.
///
/// This shows everything the walk does, including the sibling counts, and
/// is meant for looking at matches by eye. Names are printed whatever their
/// type, so this encoder works even for programs the other encoders reject.
#[derive(Clone, Debug, Default)]
pub struct DebugEncoder {
    buf: Buffer,
}

impl DebugEncoder {
    pub fn new() -> DebugEncoder {
        DebugEncoder::default()
    }

    pub fn into_buffer(self) -> Buffer {
        self.buf
    }

    fn line(
        &mut self,
        cx: &Context<'_>,
        what: &str,
        rec: &Capture,
        count: usize,
    ) -> Result<()> {
        let name = cx.program().constant(rec.idx).unwrap_or(&Value::Nil);
        let line = format!(
            "{} {} pos={} size={} key={} name={} count={}",
            what,
            rec.kind,
            rec.start + 1,
            rec.size.saturating_sub(1),
            rec.idx,
            name,
            count,
        );
        self.buf.extend(line.as_bytes())
    }

    fn text(&mut self, text: &[u8]) -> Result<()> {
        let text = format!(" text={:?}", text.as_bstr());
        self.buf.extend(text.as_bytes())
    }
}

impl Encoder for DebugEncoder {
    fn open(
        &mut self,
        cx: &Context<'_>,
        cap: usize,
        count: usize,
    ) -> Result<()> {
        let rec = check_open(cx, cap)?;
        self.line(cx, "OPEN", &rec, count)?;
        self.buf.push(b'\n')
    }

    fn full_capture(
        &mut self,
        cx: &Context<'_>,
        cap: usize,
        count: usize,
    ) -> Result<()> {
        let rec = check_full(cx, cap)?;
        self.line(cx, "FULL", &rec, count)?;
        self.text(cx.text(rec.start, rec.end()))?;
        self.buf.push(b'\n')
    }

    fn close(
        &mut self,
        cx: &Context<'_>,
        cap: usize,
        count: usize,
        start: Option<usize>,
    ) -> Result<()> {
        let rec = check_close(cx, cap)?;
        let line = format!("CLOSE pos={} count={}", rec.start + 1, count);
        self.buf.extend(line.as_bytes())?;
        if let Some(start) = start {
            self.text(cx.text(start, rec.start))?;
        }
        self.buf.push(b'\n')
    }
}
