/*!
Serialize the reportable captures of a match as a tree.

Resolving captures into values (see [`resolve`](crate::resolve)) is general
but needs a value environment and may call into the host. Most consumers of
a match only want to know which named pieces of the subject matched where,
which this module provides much more cheaply. It walks the capture list once,
considers only [`CaptureKind::Reportable`] records, and streams a tree of
`(start, name, end)` nodes into a [`Buffer`] using one of several
[`Encoding`]s.

Other records are not emitted. A non-reportable region is transparent: the
reportable captures inside it become children of the nearest reportable
capture that encloses it.

All positions written by the encoders are 1-based, and end positions are
exclusive.

# Example

```
use pegvm::{
    capture::CaptureKind,
    encode::{self, Encoding},
    program::{Builder, CharSet, Inst},
    Input, Interpreter, ValueStack,
};

let mut b = Builder::new();
let word = b.constant("word");
b.push(Inst::OpenCapture { kind: CaptureKind::Reportable, key: word });
b.push(Inst::Span(CharSet::from_range(b'a', b'z')));
b.push(Inst::CloseCapture);
b.push(Inst::End);
let program = b.build()?;

let input = Input::new("abc");
let m = Interpreter::new()
    .exec(&program, &input, &mut ValueStack::new())?
    .unwrap();
let json = encode::encode(&program, &input, &m, Encoding::Json)?;
assert_eq!(
    r#"{"s":1,"type":"word","e":4,"text":"abc"}"#.as_bytes(),
    json.as_bytes(),
);
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/

use core::{fmt, str::FromStr};

use crate::{
    capture::{Capture, CaptureKind},
    error::{Error, Result},
    program::Program,
    util::{buffer::Buffer, search::Input},
    value::Value,
    vm::Match,
};

pub use self::{
    byte::ByteEncoder, debug::DebugEncoder, decode::decode,
    json::JsonEncoder, tree::MatchTree, tree::TreeEncoder,
};

mod byte;
mod debug;
mod decode;
mod json;
mod tree;

/// The deepest reportable captures may be nested.
pub const MAX_DEPTH: usize = 200;

/// The serialization formats supported by [`encode`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Encoding {
    /// A human readable listing of every callback, for debugging.
    Debug,
    /// The compact binary format read by [`decode`].
    Byte,
    /// A JSON object per node.
    Json,
}

impl Encoding {
    /// The name of this encoding, as accepted by its `FromStr` impl.
    pub fn name(&self) -> &'static str {
        match *self {
            Encoding::Debug => "debug",
            Encoding::Byte => "byte",
            Encoding::Json => "json",
        }
    }

    /// The numeric code of this encoding used by older interfaces.
    pub fn code(&self) -> i32 {
        match *self {
            Encoding::Debug => -1,
            Encoding::Byte => 0,
            Encoding::Json => 1,
        }
    }
}

impl FromStr for Encoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Encoding> {
        match s {
            "debug" => Ok(Encoding::Debug),
            "byte" => Ok(Encoding::Byte),
            "json" => Ok(Encoding::Json),
            _ => Err(Error::unknown_encoding(s)),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Everything an encoder may need to know about the match being encoded.
#[derive(Clone, Copy, Debug)]
pub struct Context<'a> {
    program: &'a Program,
    haystack: &'a [u8],
    caps: &'a [Capture],
}

impl<'a> Context<'a> {
    pub fn new(
        program: &'a Program,
        haystack: &'a [u8],
        caps: &'a [Capture],
    ) -> Context<'a> {
        Context { program, haystack, caps }
    }

    pub fn program(&self) -> &'a Program {
        self.program
    }

    pub fn haystack(&self) -> &'a [u8] {
        self.haystack
    }

    /// The record at index `i`. Reading past the end of the list returns
    /// a close record at the end of the subject.
    pub fn record(&self, i: usize) -> Capture {
        match self.caps.get(i) {
            Some(&cap) => cap,
            None => Capture::close(self.haystack.len()),
        }
    }

    /// The name of a capture, which is the string constant at its key.
    pub fn name(&self, cap: &Capture) -> Result<&'a [u8]> {
        match self.program.constant(cap.idx) {
            Some(Value::Str(s)) => Ok(s.as_slice()),
            other => Err(Error::invalid_name(
                other.map_or("nil", Value::type_name),
            )),
        }
    }

    /// The subject between two offsets, clamped to its bounds.
    pub fn text(&self, start: usize, end: usize) -> &'a [u8] {
        let end = core::cmp::min(end, self.haystack.len());
        self.haystack.get(start..end).unwrap_or(&[])
    }
}

/// The callbacks invoked by [`walk`].
///
/// Each callback receives the index of the record it is about and `count`,
/// the number of siblings that were emitted before the node at the same
/// level. Callbacks are expected to check that the record has the shape they
/// are named after and return an error otherwise.
pub trait Encoder {
    /// A reportable region starts. Its children follow, then its close.
    fn open(&mut self, cx: &Context<'_>, cap: usize, count: usize)
        -> Result<()>;

    /// A reportable capture without children.
    fn full_capture(
        &mut self,
        cx: &Context<'_>,
        cap: usize,
        count: usize,
    ) -> Result<()>;

    /// The innermost open region ends.
    ///
    /// `start` is the offset at which the region started, and is only given
    /// when the region is the outermost one.
    fn close(
        &mut self,
        cx: &Context<'_>,
        cap: usize,
        count: usize,
        start: Option<usize>,
    ) -> Result<()>;
}

/// One open region during a walk.
#[derive(Clone, Copy, Debug)]
struct Level {
    start: usize,
    /// The count of the parent level when this region opened.
    count: usize,
    /// False for non-reportable regions, which are not emitted.
    visible: bool,
}

/// Walk the reportable captures of a capture list in order, calling `enc`
/// for each.
///
/// The first record of the list must be a reportable capture. Only that
/// capture (and what is nested in it) is walked.
pub fn walk<E: Encoder + ?Sized>(cx: &Context<'_>, enc: &mut E) -> Result<()> {
    let result = walk_imp(cx, enc);
    if let Err(ref _err) = result {
        debug!("match encoding failed: {}", _err);
    }
    result
}

fn walk_imp<E: Encoder + ?Sized>(cx: &Context<'_>, enc: &mut E) -> Result<()> {
    let first = cx.record(0);
    if cx.caps.is_empty() || first.is_terminal() {
        return Ok(());
    }
    if first.is_full() {
        if first.kind != CaptureKind::Reportable {
            return Err(Error::full_capture());
        }
        enc.full_capture(cx, 0, 0)?;
        if !cx.record(1).is_terminal() {
            return Err(Error::open());
        }
        return Ok(());
    }
    if first.kind != CaptureKind::Reportable {
        return Err(Error::open());
    }

    let mut stack =
        vec![Level { start: first.start, count: 0, visible: true }];
    enc.open(cx, 0, 0)?;
    let mut count = 0;
    let mut i = 1;
    while let Some(&top) = stack.last() {
        let cap = cx.record(i);
        if cap.is_terminal() {
            stack.pop();
            if top.visible {
                let start =
                    if stack.is_empty() { Some(top.start) } else { None };
                enc.close(cx, i, top.count, start)?;
                count = top.count + 1;
            }
            // A final record closes every region that is still open.
            if cap.kind == CaptureKind::Final {
                continue;
            }
        } else if cap.is_open() {
            if stack.len() >= MAX_DEPTH {
                return Err(Error::nesting_too_deep(MAX_DEPTH));
            }
            if cap.kind == CaptureKind::Reportable {
                enc.open(cx, i, count)?;
                stack.push(Level { start: cap.start, count, visible: true });
                count = 0;
            } else {
                stack.push(Level { start: cap.start, count, visible: false });
            }
        } else if cap.kind == CaptureKind::Reportable {
            enc.full_capture(cx, i, count)?;
            count += 1;
        }
        i += 1;
    }
    Ok(())
}

/// Serialize the reportable captures of a match.
///
/// A match without captures produces an empty buffer.
pub fn encode(
    program: &Program,
    input: &Input<'_, '_>,
    m: &Match,
    encoding: Encoding,
) -> Result<Buffer> {
    let cx = Context::new(program, input.haystack(), m.captures());
    match encoding {
        Encoding::Debug => {
            let mut enc = DebugEncoder::new();
            walk(&cx, &mut enc)?;
            Ok(enc.into_buffer())
        }
        Encoding::Byte => {
            let mut enc = ByteEncoder::new();
            walk(&cx, &mut enc)?;
            Ok(enc.into_buffer())
        }
        Encoding::Json => {
            let mut enc = JsonEncoder::new();
            walk(&cx, &mut enc)?;
            Ok(enc.into_buffer())
        }
    }
}

/// Build the tree of reportable captures of a match.
///
/// This is the structure that [`encode`] serializes, and it is equal to what
/// [`decode`] returns for the byte encoding of the same match. A match
/// without captures has no tree.
pub fn tree(
    program: &Program,
    input: &Input<'_, '_>,
    m: &Match,
) -> Result<Option<MatchTree>> {
    let cx = Context::new(program, input.haystack(), m.captures());
    let mut enc = TreeEncoder::new();
    walk(&cx, &mut enc)?;
    Ok(enc.into_tree())
}

/// Returns an error unless the record at `cap` is a reportable open record.
fn check_open(cx: &Context<'_>, cap: usize) -> Result<Capture> {
    let rec = cx.record(cap);
    if !rec.is_open() || rec.kind != CaptureKind::Reportable {
        return Err(Error::open());
    }
    Ok(rec)
}

/// Returns an error unless the record at `cap` is a reportable full record.
fn check_full(cx: &Context<'_>, cap: usize) -> Result<Capture> {
    let rec = cx.record(cap);
    if !rec.is_full() || rec.kind != CaptureKind::Reportable {
        return Err(Error::full_capture());
    }
    Ok(rec)
}

/// Returns an error unless the record at `cap` ends a region. A final
/// record ends all of them.
fn check_close(cx: &Context<'_>, cap: usize) -> Result<Capture> {
    let rec = cx.record(cap);
    if !rec.is_terminal() {
        return Err(Error::close());
    }
    Ok(rec)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records the callbacks it receives.
    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl Encoder for Recorder {
        fn open(
            &mut self,
            cx: &Context<'_>,
            cap: usize,
            count: usize,
        ) -> Result<()> {
            check_open(cx, cap)?;
            self.0.push(format!("open {} {}", cap, count));
            Ok(())
        }

        fn full_capture(
            &mut self,
            cx: &Context<'_>,
            cap: usize,
            count: usize,
        ) -> Result<()> {
            check_full(cx, cap)?;
            self.0.push(format!("full {} {}", cap, count));
            Ok(())
        }

        fn close(
            &mut self,
            cx: &Context<'_>,
            cap: usize,
            count: usize,
            start: Option<usize>,
        ) -> Result<()> {
            check_close(cx, cap)?;
            self.0.push(format!("close {} {} {:?}", cap, count, start));
            Ok(())
        }
    }

    fn program() -> Program {
        Program::new(vec![crate::program::Inst::End], vec![Value::str("n")])
            .unwrap()
    }

    fn run(caps: &[Capture]) -> Result<Vec<String>> {
        let program = program();
        let cx = Context::new(&program, b"abcdef", caps);
        let mut rec = Recorder::default();
        walk(&cx, &mut rec)?;
        Ok(rec.0)
    }

    const R: CaptureKind = CaptureKind::Reportable;

    #[test]
    fn parse_encoding() {
        assert_eq!(Encoding::Json, "json".parse().unwrap());
        assert_eq!(Encoding::Byte, "byte".parse().unwrap());
        assert_eq!(-1, "debug".parse::<Encoding>().unwrap().code());
        let err = "line".parse::<Encoding>().unwrap_err();
        assert_eq!("invalid encoding type 'line'", err.to_string());
    }

    #[test]
    fn hidden_regions_are_transparent() {
        let caps = vec![
            Capture::open(R, 1, 0),
            Capture::full(R, 1, 0, 1),
            Capture::open(CaptureKind::Group, 0, 1),
            Capture::full(CaptureKind::Simple, 0, 1, 1),
            Capture::full(R, 1, 2, 1),
            Capture::close(3),
            Capture::open(R, 1, 3),
            Capture::close(4),
            Capture::close(4),
            Capture::close(4),
        ];
        let got = run(&caps).unwrap();
        assert_eq!(
            vec![
                "open 0 0",
                "full 1 0",
                "full 4 1",
                "open 6 2",
                "close 7 2 None",
                "close 8 0 Some(0)",
            ],
            got,
        );
    }

    #[test]
    fn top_level_full_capture() {
        let caps = vec![Capture::full(R, 1, 0, 3), Capture::close(3)];
        assert_eq!(vec!["full 0 0"], run(&caps).unwrap());

        let caps = vec![
            Capture::full(R, 1, 0, 3),
            Capture::full(R, 1, 3, 1),
            Capture::close(4),
        ];
        let err = run(&caps).unwrap_err();
        assert_eq!("open capture error in match encoding", err.to_string());
    }

    #[test]
    fn first_record_must_be_reportable() {
        let caps = vec![
            Capture::full(CaptureKind::Simple, 0, 0, 3),
            Capture::close(3),
        ];
        assert_eq!(
            "full capture error in match encoding",
            run(&caps).unwrap_err().to_string(),
        );
        let caps = vec![
            Capture::open(CaptureKind::Simple, 0, 0),
            Capture::close(3),
            Capture::close(3),
        ];
        assert_eq!(
            "open capture error in match encoding",
            run(&caps).unwrap_err().to_string(),
        );
    }

    #[test]
    fn no_captures() {
        assert!(run(&[]).unwrap().is_empty());
        assert!(run(&[Capture::close(2)]).unwrap().is_empty());
    }

    #[test]
    fn final_record_closes_open_regions() {
        let caps = vec![
            Capture::open(R, 1, 0),
            Capture::full(R, 1, 0, 1),
            Capture::open(CaptureKind::Simple, 0, 1),
            Capture::open(R, 1, 1),
            Capture::final_at(2),
        ];
        assert_eq!(
            vec![
                "open 0 0",
                "full 1 0",
                "open 3 1",
                "close 4 1 None",
                "close 4 0 Some(0)",
            ],
            run(&caps).unwrap(),
        );
    }

    #[test]
    fn nesting_limit() {
        let mut caps = vec![];
        for i in 0..=MAX_DEPTH {
            caps.push(Capture::open(R, 1, i % 6));
        }
        let err = run(&caps).unwrap_err();
        assert_eq!(
            "max pattern nesting depth exceeded (limit is 200)",
            err.to_string(),
        );
    }
}
