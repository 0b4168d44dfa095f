/*!
Turn a capture list into values.

The interpreter only records where captures start and end. This module
computes what they produce: each [`CaptureKind`] has its own rule for turning
the records it encloses (and possibly the constant table and host functions)
into zero or more [`Value`]s. The rules compose recursively, following the
nesting of the capture list.

# Example

```
use pegvm::{
    capture::CaptureKind,
    program::{Builder, Inst},
    resolve, Input, Interpreter, Value, ValueStack,
};

// Capture one byte, then the position after it.
let mut b = Builder::new();
b.push(Inst::OpenCapture { kind: CaptureKind::Simple, key: 0 });
b.push(Inst::Any);
b.push(Inst::CloseCapture);
b.push(Inst::FullCapture { kind: CaptureKind::Position, key: 0, len: 0 });
b.push(Inst::End);
let program = b.build()?;

let input = Input::new("xy");
let mut env = ValueStack::new();
let m = Interpreter::new().exec(&program, &input, &mut env)?.unwrap();
let values = resolve::captures(&program, &input, &m, &mut env)?;
assert_eq!(vec![Value::str("x"), Value::Int(2)], values);
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/

use crate::{
    capture::{self, Capture, CaptureKind},
    error::{Error, Result},
    program::Program,
    util::search::Input,
    value::{Function, Table, Value, ValueEnv},
    vm::Match,
};

mod string;

/// Compute the values of every top-level capture of a match.
///
/// This always returns at least one value: when no capture produces a
/// value, the result is the 1-based position just past the end of the match.
///
/// Host functions referred to by function and fold captures are called
/// through `env`, and values stored by match-time captures are read from it,
/// so `env` should be the same environment that was used for the match.
pub fn captures<E: ValueEnv + ?Sized>(
    program: &Program,
    input: &Input<'_, '_>,
    m: &Match,
    env: &mut E,
) -> Result<Vec<Value>> {
    let mut out = vec![];
    let caps = m.captures();
    if caps.first().map_or(false, |cap| !cap.is_terminal()) {
        let mut cs = CapState {
            program,
            haystack: input.haystack(),
            args: input.get_args(),
            caps,
            cur: 0,
            env,
        };
        loop {
            cs.push_capture(&mut out)?;
            if cs.cap().is_terminal() {
                break;
            }
        }
    }
    if out.is_empty() {
        out.push(Value::Int(m.end() as i64 + 1));
    }
    Ok(out)
}

/// Push the nested values of the open record at `open` onto `out`.
///
/// This is what a match-time capture receives as its extra arguments. The
/// record's matching close must already be in `caps`.
pub(crate) fn nested_values<E: ValueEnv + ?Sized>(
    program: &Program,
    haystack: &[u8],
    args: &[Value],
    caps: &[Capture],
    open: usize,
    env: &mut E,
    out: &mut Vec<Value>,
) -> Result<usize> {
    let mut cs = CapState { program, haystack, args, caps, cur: open, env };
    cs.push_nested_values(out, false)
}

/// The state of a walk over a capture list.
///
/// `cur` always points at the next record to evaluate. Every handler leaves
/// it just past the last record it consumed.
struct CapState<'a, E: ?Sized> {
    program: &'a Program,
    haystack: &'a [u8],
    args: &'a [Value],
    caps: &'a [Capture],
    cur: usize,
    env: &'a mut E,
}

impl<'a, E: ValueEnv + ?Sized> CapState<'a, E> {
    /// The current record. Running off the end of the list reads as a close
    /// record, so a truncated list cannot make a walk loop forever.
    fn cap(&self) -> Capture {
        self.record(self.cur)
    }

    fn record(&self, i: usize) -> Capture {
        match self.caps.get(i) {
            Some(&cap) => cap,
            None => Capture::close(self.haystack.len()),
        }
    }

    fn text(&self, start: usize, end: usize) -> &'a [u8] {
        self.haystack.get(start..end).unwrap_or(&[])
    }

    fn skip(&mut self) {
        self.cur = capture::next_cap(self.caps, self.cur);
    }

    /// Step past the record that ends the current region and return its
    /// position. A final record ends every region that is still open, so it
    /// is left in place for the enclosing ones.
    fn close_region(&mut self) -> usize {
        let cap = self.cap();
        if cap.kind != CaptureKind::Final {
            self.cur += 1;
        }
        cap.start
    }

    /// The end of the capture at index `i`.
    fn end_of(&self, i: usize) -> usize {
        let cap = self.record(i);
        if cap.is_full() {
            return cap.end();
        }
        match capture::find_close(self.caps, i) {
            Some(j) => self.caps[j].start,
            None => self.haystack.len(),
        }
    }

    fn constant(&self, key: u16) -> Value {
        self.program.constant(key).cloned().unwrap_or(Value::Nil)
    }

    fn function(&self, key: u16, what: &'static str) -> Result<Function> {
        let constant = self.program.constant(key);
        constant.and_then(Value::as_function).cloned().ok_or_else(|| {
            Error::invalid_value(what, constant.map_or("nil", Value::type_name))
        })
    }

    fn call(&mut self, func: &Function, args: &[Value]) -> Result<Vec<Value>> {
        self.env.call(func, args).map_err(Error::host)
    }

    /// Push all values of the current capture and return how many there
    /// were.
    fn push_capture(&mut self, out: &mut Vec<Value>) -> Result<usize> {
        let cap = self.cap();
        match cap.kind {
            CaptureKind::Position => {
                out.push(Value::Int(cap.start as i64 + 1));
                self.skip();
                Ok(1)
            }
            CaptureKind::Constant => {
                out.push(self.constant(cap.idx));
                self.skip();
                Ok(1)
            }
            CaptureKind::Arg => {
                let i = usize::from(cap.idx);
                let value = i
                    .checked_sub(1)
                    .and_then(|i| self.args.get(i))
                    .ok_or_else(|| Error::absent_argument(cap.idx))?;
                out.push(value.clone());
                self.skip();
                Ok(1)
            }
            CaptureKind::Simple => {
                let k = self.push_nested_values(out, true)?;
                // The whole match goes first.
                let len = out.len();
                out[len - k..].rotate_right(1);
                Ok(k)
            }
            CaptureKind::Runtime => {
                let slot = usize::from(cap.idx);
                out.push(self.env.get(slot).cloned().unwrap_or(Value::Nil));
                self.skip();
                Ok(1)
            }
            CaptureKind::String => {
                let mut buf = vec![];
                self.string_cap(&mut buf)?;
                out.push(Value::str(buf));
                Ok(1)
            }
            CaptureKind::Subst => {
                let mut buf = vec![];
                self.subst_cap(&mut buf)?;
                out.push(Value::str(buf));
                Ok(1)
            }
            CaptureKind::Group => {
                if cap.idx == 0 {
                    self.push_nested_values(out, false)
                } else {
                    // Named groups only produce values through back
                    // references and tables.
                    self.skip();
                    Ok(0)
                }
            }
            CaptureKind::Backref => self.backref_cap(out),
            CaptureKind::Table => self.table_cap(out),
            CaptureKind::Function => self.function_cap(out),
            CaptureKind::Num => self.num_cap(out),
            CaptureKind::Query => self.query_cap(out),
            CaptureKind::Fold => self.fold_cap(out),
            CaptureKind::Close
            | CaptureKind::Final
            | CaptureKind::Reportable => {
                Err(Error::invalid_capture_kind(cap.kind))
            }
        }
    }

    /// Push the values of every capture nested in the current one.
    ///
    /// The whole match is pushed as well when `add_extra` is set or when
    /// the nested captures produced nothing, so this never returns zero.
    fn push_nested_values(
        &mut self,
        out: &mut Vec<Value>,
        add_extra: bool,
    ) -> Result<usize> {
        let open = self.cap();
        self.cur += 1;
        if open.is_full() {
            out.push(Value::str(self.text(open.start, open.end())));
            return Ok(1);
        }
        let mut n = 0;
        while !self.cap().is_terminal() {
            n += self.push_capture(out)?;
        }
        let end = self.close_region();
        if add_extra || n == 0 {
            out.push(Value::str(self.text(open.start, end)));
            n += 1;
        }
        Ok(n)
    }

    /// Push only the first value produced by the nested captures.
    fn push_one_nested_value(&mut self, out: &mut Vec<Value>) -> Result<()> {
        let n = self.push_nested_values(out, false)?;
        out.truncate(out.len() - n + 1);
        Ok(())
    }

    fn backref_cap(&mut self, out: &mut Vec<Value>) -> Result<usize> {
        let curr = self.cur;
        let name = self.program.constant(self.cap().idx);
        self.cur = self.find_back(curr, name)?;
        let n = self.push_nested_values(out, false)?;
        self.cur = curr + 1;
        Ok(n)
    }

    /// Look backwards from `from` for the most recent group named `name`.
    ///
    /// Complete nested regions are stepped over as a whole, and open records
    /// that enclose `from` are skipped, so only groups that closed before
    /// `from` are candidates.
    fn find_back(&self, from: usize, name: Option<&Value>) -> Result<usize> {
        let mut i = from;
        while i > 0 {
            i -= 1;
            let mut cap = self.caps[i];
            if cap.is_close() {
                match capture::find_open(self.caps, i) {
                    Some(open) => i = open,
                    None => break,
                }
                cap = self.caps[i];
            } else if cap.is_open() {
                continue;
            }
            if cap.kind == CaptureKind::Group
                && self.program.constant(cap.idx) == name
            {
                return Ok(i);
            }
        }
        let name = name.map_or_else(|| "nil".to_string(), |v| v.to_string());
        debug!("back reference '{}' not found", name);
        Err(Error::backref_not_found(name.as_bytes()))
    }

    fn table_cap(&mut self, out: &mut Vec<Value>) -> Result<usize> {
        let mut table = Table::new();
        let open = self.cap();
        self.cur += 1;
        if open.is_full() {
            out.push(Value::Table(table));
            return Ok(1);
        }
        let mut values = vec![];
        while !self.cap().is_terminal() {
            let cap = self.cap();
            if cap.kind == CaptureKind::Group && cap.idx != 0 {
                let name = self.constant(cap.idx);
                let key = name.to_key().ok_or_else(|| {
                    Error::invalid_value("table key", name.type_name())
                })?;
                self.push_one_nested_value(&mut values)?;
                if let Some(value) = values.pop() {
                    if value != Value::Nil {
                        table.insert(key, value);
                    }
                }
            } else {
                self.push_capture(&mut values)?;
                for value in values.drain(..) {
                    table.push(value);
                }
            }
        }
        self.close_region();
        out.push(Value::Table(table));
        Ok(1)
    }

    fn query_cap(&mut self, out: &mut Vec<Value>) -> Result<usize> {
        let idx = self.cap().idx;
        let mut key = vec![];
        self.push_one_nested_value(&mut key)?;
        let table = match self.program.constant(idx) {
            Some(Value::Table(t)) => t,
            other => {
                return Err(Error::invalid_value(
                    "query table",
                    other.map_or("nil", Value::type_name),
                ))
            }
        };
        let found = key
            .pop()
            .and_then(|k| k.to_key())
            .and_then(|k| table.get(&k))
            .filter(|v| **v != Value::Nil);
        match found {
            Some(value) => {
                out.push(value.clone());
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn fold_cap(&mut self, out: &mut Vec<Value>) -> Result<usize> {
        let open = self.cap();
        self.cur += 1;
        if open.is_full() || self.cap().is_terminal() {
            return Err(Error::no_fold_initial_value());
        }
        let mut values = vec![];
        if self.push_capture(&mut values)? == 0 {
            return Err(Error::no_fold_initial_value());
        }
        values.truncate(1);
        let func = self.function(open.idx, "fold function")?;
        while !self.cap().is_terminal() {
            self.push_capture(&mut values)?;
            let results = self.call(&func, &values)?;
            values.clear();
            values.push(results.into_iter().next().unwrap_or(Value::Nil));
        }
        self.close_region();
        out.append(&mut values);
        Ok(1)
    }

    fn function_cap(&mut self, out: &mut Vec<Value>) -> Result<usize> {
        let func = self.function(self.cap().idx, "capture function")?;
        let mut args = vec![];
        self.push_nested_values(&mut args, false)?;
        let results = self.call(&func, &args)?;
        let n = results.len();
        out.extend(results);
        Ok(n)
    }

    fn num_cap(&mut self, out: &mut Vec<Value>) -> Result<usize> {
        let idx = self.cap().idx;
        if idx == 0 {
            self.skip();
            return Ok(0);
        }
        let mut values = vec![];
        let n = self.push_nested_values(&mut values, false)?;
        if n < usize::from(idx) {
            return Err(Error::no_capture(idx));
        }
        out.push(values.swap_remove(usize::from(idx) - 1));
        Ok(1)
    }
}
