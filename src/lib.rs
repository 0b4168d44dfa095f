/*!
A backtracking virtual machine for compiled parsing expression grammars.

This crate executes programs for a small PEG bytecode: byte and set tests,
calls and returns, choice points and commits, and a family of capture
instructions. It does not compile grammars. A program is either assembled
by hand with [`program::Builder`] or produced by some other compiler and
handed over as a list of [`program::Inst`]s plus a table of constants.

Running a program has three stages, each in its own module:

* [`vm`] matches a program against a subject and returns a [`Match`]: the
  final position and a flat list of capture records.
* [`resolve`] turns that capture list into [`Value`]s, calling host
  [`Function`]s where the program asks for them.
* [`encode`] serializes just the *reportable* captures of a match as a tree,
  in a binary, JSON or debugging format.

# Example

This matches a word followed by an optional run of digits, reporting the
word as a named capture and the digits as a nested one.

```
use pegvm::{
    capture::CaptureKind,
    encode::{self, Encoding, MatchTree},
    program::{Builder, CharSet, Inst},
    Input, Interpreter, ValueStack,
};

let mut b = Builder::new();
let (word, num) = (b.constant("word"), b.constant("num"));
b.push(Inst::OpenCapture { kind: CaptureKind::Reportable, key: word });
b.push(Inst::Span(CharSet::from_range(b'a', b'z')));
b.push(Inst::OpenCapture { kind: CaptureKind::Reportable, key: num });
b.push(Inst::Span(CharSet::from_range(b'0', b'9')));
b.push(Inst::CloseCapture);
b.push(Inst::CloseCapture);
b.push(Inst::End);
let program = b.build()?;

let input = Input::new("abc42!");
let m = Interpreter::new()
    .exec(&program, &input, &mut ValueStack::new())?
    .expect("a match");
assert_eq!(5, m.end());

let bytes = encode::encode(&program, &input, &m, Encoding::Byte)?;
let mut expected = MatchTree::leaf(1, "word", 6);
expected.subs.push(MatchTree::leaf(4, "num", 6));
assert_eq!(expected, encode::decode(bytes.as_bytes())?);
# Ok::<(), Box<dyn std::error::Error>>(())
```

# Crate features

* **std** - Enabled by default. Enables the standard library features of
  `memchr`.
* **logging** - Emits `debug` and `trace` messages through the `log` crate:
  program validation failures, buffer and stack growth, match-time capture
  calls, backtracking and encoder errors.
*/

#[cfg(not(any(
    target_pointer_width = "16",
    target_pointer_width = "32",
    target_pointer_width = "64"
)))]
compile_error!("pegvm currently not supported on non-{16,32,64}");

pub use crate::{
    encode::{Encoding, MatchTree},
    error::{Error, ErrorKind},
    program::Program,
    util::{
        buffer::Buffer,
        search::{Input, Span},
        wire::DecodeError,
    },
    value::{Function, HostError, Key, Table, Value, ValueEnv, ValueStack},
    vm::{Config, Engine, Interpreter, Match},
};

#[macro_use]
mod macros;

pub mod capture;
pub mod encode;
mod error;
pub mod program;
pub mod resolve;
pub mod util;
pub mod value;
pub mod vm;
