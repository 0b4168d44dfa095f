use crate::{error::Result, util::buffer::Buffer};

use super::{check_close, check_full, check_open, Context, Encoder};

/// An encoder that writes one JSON object per node.
///
/// A node is written as `{"s":S,"type":"NAME","e":E}`. A node with children
/// has a `"subs"` array between its type and its end, and the outermost node
/// additionally carries the text it matched as `"text"`.
///
/// Bytes that are not ASCII are copied through unchanged, so the output is
/// valid JSON exactly when the names and the matched text are valid UTF-8.
#[derive(Clone, Debug, Default)]
pub struct JsonEncoder {
    buf: Buffer,
    /// One entry per open node, set once it has written its first child.
    subs: Vec<bool>,
}

impl JsonEncoder {
    pub fn new() -> JsonEncoder {
        JsonEncoder::default()
    }

    pub fn into_buffer(self) -> Buffer {
        self.buf
    }

    /// Write whatever must precede a node: nothing for the outermost one,
    /// the start of the parent's child array for its first child, or a
    /// separator.
    fn begin_node(&mut self) -> Result<()> {
        match self.subs.last_mut() {
            None => Ok(()),
            Some(has_subs) if !*has_subs => {
                *has_subs = true;
                self.buf.extend(br#","subs":["#)
            }
            Some(_) => self.buf.push(b','),
        }
    }

    fn start(&mut self, cx: &Context<'_>, cap: usize) -> Result<()> {
        let rec = cx.record(cap);
        let name = cx.name(&rec)?;
        self.begin_node()?;
        self.buf.extend(br#"{"s":"#)?;
        self.buf.push_int(rec.start + 1)?;
        self.buf.extend(br#","type":""#)?;
        escape(name, &mut self.buf)?;
        self.buf.push(b'"')
    }

    fn end(&mut self, end: usize, text: Option<&[u8]>) -> Result<()> {
        self.buf.extend(br#","e":"#)?;
        self.buf.push_int(end)?;
        if let Some(text) = text {
            self.buf.extend(br#","text":""#)?;
            escape(text, &mut self.buf)?;
            self.buf.push(b'"')?;
        }
        self.buf.push(b'}')
    }
}

impl Encoder for JsonEncoder {
    fn open(
        &mut self,
        cx: &Context<'_>,
        cap: usize,
        _count: usize,
    ) -> Result<()> {
        check_open(cx, cap)?;
        self.start(cx, cap)?;
        self.subs.push(false);
        Ok(())
    }

    fn full_capture(
        &mut self,
        cx: &Context<'_>,
        cap: usize,
        _count: usize,
    ) -> Result<()> {
        let rec = check_full(cx, cap)?;
        let outermost = self.subs.is_empty();
        self.start(cx, cap)?;
        let text = if outermost {
            Some(cx.text(rec.start, rec.end()))
        } else {
            None
        };
        self.end(rec.end() + 1, text)
    }

    fn close(
        &mut self,
        cx: &Context<'_>,
        cap: usize,
        _count: usize,
        start: Option<usize>,
    ) -> Result<()> {
        let rec = check_close(cx, cap)?;
        if self.subs.pop() == Some(true) {
            self.buf.push(b']')?;
        }
        let text = start.map(|start| cx.text(start, rec.start));
        self.end(rec.start + 1, text)
    }
}

/// Append `bytes` to `dst` as the contents of a JSON string.
fn escape(bytes: &[u8], dst: &mut Buffer) -> Result<()> {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";

    let mut last = 0;
    for (i, &b) in bytes.iter().enumerate() {
        let esc: &[u8] = match b {
            b'"' => br#"\""#,
            b'\\' => br"\\",
            b'/' => br"\/",
            b'\x08' => br"\b",
            b'\x0C' => br"\f",
            b'\n' => br"\n",
            b'\r' => br"\r",
            b'\t' => br"\t",
            0x00..=0x1F => &[],
            _ => continue,
        };
        dst.extend(&bytes[last..i])?;
        last = i + 1;
        if esc.is_empty() {
            let hi = HEX[usize::from(b >> 4)];
            let lo = HEX[usize::from(b & 0xF)];
            dst.extend(&[b'\\', b'u', b'0', b'0', hi, lo])?;
        } else {
            dst.extend(esc)?;
        }
    }
    dst.extend(&bytes[last..])
}

#[cfg(test)]
mod tests {
    use bstr::ByteSlice;

    use super::*;
    use crate::{
        capture::{Capture, CaptureKind},
        encode::walk,
        program::{Inst, Program},
        value::Value,
    };

    const R: CaptureKind = CaptureKind::Reportable;

    fn json(haystack: &[u8], caps: &[Capture]) -> String {
        let program = Program::new(
            vec![Inst::End],
            vec![Value::str("a"), Value::str("b")],
        )
        .unwrap();
        let cx = Context::new(&program, haystack, caps);
        let mut enc = JsonEncoder::new();
        walk(&cx, &mut enc).unwrap();
        enc.into_buffer().as_bytes().to_str().unwrap().to_string()
    }

    #[test]
    fn escapes() {
        let mut buf = Buffer::new();
        escape(b"a\"b\\c/d\x08\x0C\n\r\t\x01\x1Fz\xE2\x98\x83", &mut buf)
            .unwrap();
        assert_eq!(
            br#"a\"b\\c\/d\b\f\n\r\t\u0001\u001Fz"#
                .iter()
                .chain(b"\xE2\x98\x83")
                .copied()
                .collect::<Vec<u8>>(),
            buf.as_bytes(),
        );
    }

    #[test]
    fn nested() {
        let caps = vec![
            Capture::open(R, 1, 0),
            Capture::full(R, 2, 0, 1),
            Capture::open(R, 2, 2),
            Capture::close(3),
            Capture::close(3),
            Capture::close(3),
        ];
        assert_eq!(
            r#"{"s":1,"type":"a","subs":[{"s":1,"type":"b","e":2},"#
                .to_string()
                + r#"{"s":3,"type":"b","e":4}],"e":4,"text":"x\"y"}"#,
            json(b"x\"y", &caps),
        );
    }

    #[test]
    fn leaf_region_has_no_subs() {
        let caps = vec![
            Capture::open(R, 1, 0),
            Capture::full(CaptureKind::Simple, 0, 0, 1),
            Capture::close(2),
            Capture::close(2),
        ];
        assert_eq!(
            r#"{"s":1,"type":"a","e":3,"text":"xy"}"#,
            json(b"xy", &caps),
        );
    }
}
