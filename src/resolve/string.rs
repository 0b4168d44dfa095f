// String and substitution captures. Both build a byte string out of the
// subject and the values of their nested captures, so they share the logic
// for turning a single nested capture into bytes.

use crate::{
    capture::CaptureKind,
    error::{Error, Result},
    value::{Value, ValueEnv},
};

use super::CapState;

/// The most nested captures a format string can refer to, counting the
/// whole match as `%0`.
const MAX_STR_CAPS: usize = 10;

/// A piece of a string capture that a `%n` item can refer to.
#[derive(Clone, Copy, Debug)]
enum StrCap {
    /// A simple capture, which contributes its text directly.
    Text { start: usize, end: usize },
    /// Any other capture, identified by the index of its record.
    Capture(usize),
}

impl<'a, E: ValueEnv + ?Sized> CapState<'a, E> {
    /// Collect the pieces of the capture at `cur` into `caps`.
    ///
    /// Simple captures are flattened into the list in the order they start.
    /// Captures past the limit are skipped.
    fn get_str_caps(&mut self, caps: &mut Vec<StrCap>) {
        let k = caps.len();
        let open = self.cap();
        caps.push(StrCap::Text { start: open.start, end: open.start });
        self.cur += 1;
        let end = if open.is_open() {
            while !self.cap().is_terminal() {
                if caps.len() >= MAX_STR_CAPS {
                    self.skip();
                } else if self.cap().kind == CaptureKind::Simple {
                    self.get_str_caps(caps);
                } else {
                    caps.push(StrCap::Capture(self.cur));
                    self.skip();
                }
            }
            self.close_region()
        } else {
            open.end()
        };
        caps[k] = StrCap::Text { start: open.start, end };
    }

    /// Evaluate a string capture at `cur`, appending the result to `buf`.
    ///
    /// The format is the constant named by the capture. `%0` through `%9`
    /// are replaced by the corresponding piece. `%` followed by anything
    /// else stands for that byte, so `%%` is a literal `%`.
    pub(super) fn string_cap(&mut self, buf: &mut Vec<u8>) -> Result<()> {
        let key = self.cap().idx;
        let fmt = match self.program.constant(key) {
            Some(&Value::Str(ref s)) => s.clone(),
            other => {
                return Err(Error::invalid_value(
                    "format string",
                    other.map_or("nil", Value::type_name),
                ))
            }
        };
        let mut pieces = Vec::with_capacity(MAX_STR_CAPS);
        self.get_str_caps(&mut pieces);
        let n = pieces.len() - 1;

        let mut bytes = fmt.iter();
        while let Some(&b) = bytes.next() {
            if b != b'%' {
                buf.push(b);
                continue;
            }
            let b = match bytes.next() {
                None => {
                    buf.push(b'%');
                    break;
                }
                Some(&b) => b,
            };
            if !b.is_ascii_digit() {
                buf.push(b);
                continue;
            }
            let l = usize::from(b - b'0');
            if l > n {
                return Err(Error::invalid_capture_index(l));
            }
            match pieces[l] {
                StrCap::Text { start, end } => {
                    buf.extend_from_slice(self.text(start, end));
                }
                StrCap::Capture(i) => {
                    let saved = self.cur;
                    self.cur = i;
                    let added = self.add_one_string(buf, "capture")?;
                    self.cur = saved;
                    if !added {
                        return Err(Error::no_values_in_capture(l));
                    }
                }
            }
        }
        Ok(())
    }

    /// Evaluate a substitution capture at `cur`, appending the result to
    /// `buf`.
    ///
    /// The result is the matched text with the span of every nested capture
    /// replaced by that capture's first value. Nested captures without
    /// values leave the text as is.
    pub(super) fn subst_cap(&mut self, buf: &mut Vec<u8>) -> Result<()> {
        let open = self.cap();
        let mut curr = open.start;
        if open.is_full() {
            buf.extend_from_slice(self.text(open.start, open.end()));
            self.cur += 1;
            return Ok(());
        }
        self.cur += 1;
        while !self.cap().is_terminal() {
            let i = self.cur;
            let next = self.cap().start;
            buf.extend_from_slice(self.text(curr, next));
            if self.add_one_string(buf, "replacement")? {
                curr = self.end_of(i);
            } else {
                curr = next;
            }
        }
        let end = self.close_region();
        buf.extend_from_slice(self.text(curr, end));
        Ok(())
    }

    /// Append the first value of the capture at `cur` to `buf`.
    ///
    /// Returns false when the capture has no values. Values that are neither
    /// strings nor numbers are an error.
    fn add_one_string(
        &mut self,
        buf: &mut Vec<u8>,
        what: &'static str,
    ) -> Result<bool> {
        match self.cap().kind {
            CaptureKind::String => {
                self.string_cap(buf)?;
                return Ok(true);
            }
            CaptureKind::Subst => {
                self.subst_cap(buf)?;
                return Ok(true);
            }
            _ => {}
        }
        let mut values = vec![];
        if self.push_capture(&mut values)? == 0 {
            return Ok(false);
        }
        match values.swap_remove(0) {
            Value::Str(s) => buf.extend_from_slice(&s),
            Value::Int(n) => {
                let mut num = itoa::Buffer::new();
                buf.extend_from_slice(num.format(n).as_bytes());
            }
            v => return Err(Error::invalid_value(what, v.type_name())),
        }
        Ok(true)
    }
}
