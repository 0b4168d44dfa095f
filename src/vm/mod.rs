/*!
The backtracking virtual machine that executes a [`Program`].

The interpreter walks the program one instruction at a time. Alternatives
are explored with an explicit stack of choice points, so matching never
recurses on the native stack, and every capture made along the way is
appended to a flat capture list that is truncated on backtracking. A
successful match returns a [`Match`]: the final position and that list,
which can then be turned into values with [`resolve::captures`] or into a
match tree with [`encode::encode`].

The interpreter is one implementation of the [`Engine`] trait. Any other
strategy for executing programs (a JIT compiler, for example) can implement
the same trait and is then interchangeable with it.

# Example

This matches a run of lowercase letters at the start of a subject.

```
use pegvm::{program::{CharSet, Inst, Program}, Input, Interpreter, ValueStack};

let program = Program::new(
    vec![Inst::Span(CharSet::from_range(b'a', b'z')), Inst::End],
    vec![],
)?;
let vm = Interpreter::new();
let mut env = ValueStack::new();
let m = vm.exec(&program, &Input::new("abc123"), &mut env)?.unwrap();
assert_eq!(3, m.end());
# Ok::<(), Box<dyn std::error::Error>>(())
```

[`resolve::captures`]: crate::resolve::captures
[`encode::encode`]: crate::encode::encode
*/

use crate::{
    capture::Capture,
    error::Result,
    program::Program,
    util::search::Input,
    value::ValueEnv,
};

mod interp;

/// A strategy for executing programs.
///
/// Implementations must agree on every observable aspect of a match: the
/// final position, whether the match halted early, the capture list and
/// any host calls made through the value environment.
pub trait Engine {
    /// Run `program` on `input`.
    ///
    /// This returns `Ok(None)` when the program does not match, and an error
    /// when a resource limit is exceeded, the program is malformed or a host
    /// function fails.
    fn exec<E: ValueEnv + ?Sized>(
        &self,
        program: &Program,
        input: &Input<'_, '_>,
        env: &mut E,
    ) -> Result<Option<Match>>;
}

/// The configuration for an [`Interpreter`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Config {
    stack_limit: Option<Option<usize>>,
    capture_limit: Option<Option<usize>>,
    initial_stack: Option<usize>,
    initial_captures: Option<usize>,
}

impl Config {
    /// Return a new default configuration.
    pub fn new() -> Config {
        Config::default()
    }

    /// Set the maximum number of entries on the backtrack stack.
    ///
    /// Calls and choice points each take one entry. A match that needs more
    /// fails with a "backtrack stack overflow" error. By default there is
    /// no limit.
    pub fn stack_limit(mut self, limit: Option<usize>) -> Config {
        self.stack_limit = Some(limit);
        self
    }

    /// Set the maximum number of records in the capture list.
    ///
    /// A match that needs more fails with a "too many captures" error. By
    /// default there is no limit.
    pub fn capture_limit(mut self, limit: Option<usize>) -> Config {
        self.capture_limit = Some(limit);
        self
    }

    /// Set the number of backtrack stack entries allocated up front.
    pub fn initial_stack(mut self, entries: usize) -> Config {
        self.initial_stack = Some(entries);
        self
    }

    /// Set the number of capture records allocated up front.
    pub fn initial_captures(mut self, records: usize) -> Config {
        self.initial_captures = Some(records);
        self
    }

    pub fn get_stack_limit(&self) -> Option<usize> {
        self.stack_limit.unwrap_or(None)
    }

    pub fn get_capture_limit(&self) -> Option<usize> {
        self.capture_limit.unwrap_or(None)
    }

    pub fn get_initial_stack(&self) -> usize {
        self.initial_stack.unwrap_or(100)
    }

    pub fn get_initial_captures(&self) -> usize {
        self.initial_captures.unwrap_or(32)
    }

    /// Overwrite the default configuration such that the options in `o` are
    /// always used. If an option in `o` is not set, then the corresponding
    /// option in `self` is used.
    pub(crate) fn overwrite(&self, o: Config) -> Config {
        Config {
            stack_limit: o.stack_limit.or(self.stack_limit),
            capture_limit: o.capture_limit.or(self.capture_limit),
            initial_stack: o.initial_stack.or(self.initial_stack),
            initial_captures: o.initial_captures.or(self.initial_captures),
        }
    }
}

/// A builder for an [`Interpreter`].
#[derive(Clone, Debug)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder { config: Config::default() }
    }

    pub fn build(&self) -> Interpreter {
        Interpreter { config: self.config }
    }

    pub fn configure(&mut self, config: Config) -> &mut Builder {
        self.config = self.config.overwrite(config);
        self
    }
}

impl Default for Builder {
    fn default() -> Builder {
        Builder::new()
    }
}

/// The bytecode interpreter.
///
/// An interpreter holds only its configuration. Every call to
/// [`Interpreter::exec`] allocates its own backtrack stack and capture list,
/// so a single interpreter may be shared freely.
#[derive(Clone, Debug, Default)]
pub struct Interpreter {
    config: Config,
}

impl Interpreter {
    /// Create an interpreter with the default configuration.
    pub fn new() -> Interpreter {
        Interpreter::builder().build()
    }

    pub fn config() -> Config {
        Config::new()
    }

    pub fn builder() -> Builder {
        Builder::new()
    }

    pub fn get_config(&self) -> &Config {
        &self.config
    }

    /// Run `program` on `input`, using `env` to hold the values produced by
    /// match-time captures.
    ///
    /// When the start of the span lies beyond the end of the subject, this
    /// reports no match.
    pub fn exec<E: ValueEnv + ?Sized>(
        &self,
        program: &Program,
        input: &Input<'_, '_>,
        env: &mut E,
    ) -> Result<Option<Match>> {
        interp::exec(&self.config, program, input, env)
    }
}

impl Engine for Interpreter {
    fn exec<E: ValueEnv + ?Sized>(
        &self,
        program: &Program,
        input: &Input<'_, '_>,
        env: &mut E,
    ) -> Result<Option<Match>> {
        Interpreter::exec(self, program, input, env)
    }
}

/// The result of a successful match.
///
/// The capture list always ends with a terminator: a close record at the
/// final position, or a final record when the program halted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Match {
    end: usize,
    halted: bool,
    captures: Vec<Capture>,
}

impl Match {
    /// Create a match. This is meant for alternate [`Engine`]s.
    pub fn new(end: usize, halted: bool, captures: Vec<Capture>) -> Match {
        Match { end, halted, captures }
    }

    /// The offset just past the last byte consumed.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Returns true when the match ended with a halt instruction.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// The capture list, including its terminator.
    pub fn captures(&self) -> &[Capture] {
        &self.captures
    }
}
