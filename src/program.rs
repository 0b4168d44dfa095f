/*!
Compiled programs for the matching virtual machine.

A [`Program`] is a sequence of [`Inst`]ructions together with a constant
table. Programs are normally produced by a grammar compiler. This module only
defines the representation, validates it and provides a small [`Builder`]
that resolves symbolic jump labels, which is handy for assembling programs by
hand.

# Jumps

Every jump offset is relative to the index of the instruction that holds it.
That is, an instruction at index `pc` with offset `off` transfers control to
`pc + off`.

# The constant table

Capture instructions refer to constants (names, functions, format strings and
so on) through a 16-bit key. Keys are 1-based and `0` means "no constant",
which is how anonymous groups are expressed.
*/

use core::fmt;

use crate::{
    capture::{CaptureKind, MAX_FULL_LEN},
    error::{Error, Result},
    value::Value,
};

/// A set of bytes, represented as a 256-bit bitmap.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct CharSet {
    bits: [u8; 32],
}

impl CharSet {
    /// Create an empty set.
    pub fn new() -> CharSet {
        CharSet::default()
    }

    /// Create a set containing every byte.
    pub fn full() -> CharSet {
        CharSet { bits: [0xFF; 32] }
    }

    /// Create a set from the given bytes.
    pub fn from_bytes(bytes: &[u8]) -> CharSet {
        let mut set = CharSet::new();
        for &b in bytes {
            set.insert(b);
        }
        set
    }

    /// Create a set from an inclusive range of bytes.
    pub fn from_range(lo: u8, hi: u8) -> CharSet {
        let mut set = CharSet::new();
        set.insert_range(lo, hi);
        set
    }

    pub fn insert(&mut self, byte: u8) {
        self.bits[usize::from(byte >> 3)] |= 1 << (byte & 7);
    }

    /// Insert every byte in the inclusive range `lo..=hi`.
    pub fn insert_range(&mut self, lo: u8, hi: u8) {
        for b in lo..=hi {
            self.insert(b);
        }
    }

    #[inline]
    pub fn contains(&self, byte: u8) -> bool {
        self.bits[usize::from(byte >> 3)] & (1 << (byte & 7)) != 0
    }

    /// Return the complement of this set.
    pub fn negate(&self) -> CharSet {
        let mut bits = self.bits;
        for b in bits.iter_mut() {
            *b = !*b;
        }
        CharSet { bits }
    }

    /// Return the union of this set and the other.
    pub fn union(&self, other: &CharSet) -> CharSet {
        let mut bits = self.bits;
        for (b, o) in bits.iter_mut().zip(other.bits.iter()) {
            *b |= *o;
        }
        CharSet { bits }
    }

    /// The number of bytes in this set.
    pub fn len(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&b| b == 0)
    }

    /// Iterate over the bytes in this set in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=255u8).filter(move |&b| self.contains(b))
    }

    /// Build an accelerator for spanning this set, if few enough bytes are
    /// missing from it.
    fn accel(&self) -> Option<Accel> {
        let missing = 256 - self.len();
        if missing > Accel::MAX_NEEDLES {
            return None;
        }
        let mut accel = Accel { needles: [0; Accel::MAX_NEEDLES], len: 0 };
        for b in self.negate().iter() {
            accel.needles[accel.len] = b;
            accel.len += 1;
        }
        Some(accel)
    }
}

impl fmt::Debug for CharSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use core::ascii::escape_default;

        let show = |f: &mut fmt::Formatter<'_>, b: u8| -> fmt::Result {
            for c in escape_default(b) {
                write!(f, "{}", c as char)?;
            }
            Ok(())
        };
        write!(f, "[")?;
        let mut b = 0usize;
        while b < 256 {
            if !self.contains(b as u8) {
                b += 1;
                continue;
            }
            let lo = b;
            while b + 1 < 256 && self.contains((b + 1) as u8) {
                b += 1;
            }
            show(f, lo as u8)?;
            if b > lo {
                write!(f, "-")?;
                show(f, b as u8)?;
            }
            b += 1;
        }
        write!(f, "]")
    }
}

/// A precomputed accelerator for a span instruction.
///
/// Spanning a set stops at the first byte that is not in the set. When at
/// most three bytes are missing, that is exactly a `memchr` search for the
/// missing bytes.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Accel {
    needles: [u8; Accel::MAX_NEEDLES],
    len: usize,
}

impl Accel {
    const MAX_NEEDLES: usize = 3;

    /// Return the position of the first byte at or after `at` that is not in
    /// the accelerated set, or the length of the haystack if there is none.
    #[inline]
    pub(crate) fn find_fwd(&self, haystack: &[u8], at: usize) -> usize {
        let bs = &self.needles;
        let rest = &haystack[at..];
        let found = match self.len {
            0 => None,
            1 => memchr::memchr(bs[0], rest),
            2 => memchr::memchr2(bs[0], bs[1], rest),
            _ => memchr::memchr3(bs[0], bs[1], bs[2], rest),
        };
        found.map_or(haystack.len(), |i| at + i)
    }
}

/// A single instruction.
///
/// Instructions that test a byte fail when the current position is at the
/// end of the span being matched.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Inst {
    /// Match any single byte.
    Any,
    /// Match the given byte.
    Char(u8),
    /// Match any byte in the set.
    Set(CharSet),
    /// Jump by `offset` if there is no byte left. Consumes nothing.
    TestAny { offset: i32 },
    /// Jump by `offset` unless the next byte is `byte`. Consumes nothing.
    TestChar { byte: u8, offset: i32 },
    /// Jump by `offset` unless the next byte is in the set. Consumes nothing.
    TestSet { set: CharSet, offset: i32 },
    /// Consume the longest run of bytes in the set. Never fails.
    Span(CharSet),
    /// Move back by the given number of bytes.
    Behind(u8),
    /// Return from a call.
    Ret,
    /// Successfully finish the match.
    End,
    /// Finish the match without a result.
    Giveup,
    /// Successfully finish the match early, marking it as halted.
    Halt,
    /// Push a choice point that resumes at `offset`.
    Choice { offset: i32 },
    Jmp { offset: i32 },
    /// Push a return address and jump.
    Call { offset: i32 },
    /// Pop the top choice point and jump.
    Commit { offset: i32 },
    /// Update the top choice point to the current state and jump.
    PartialCommit { offset: i32 },
    /// Restore the state saved by the top choice point, pop it and jump.
    BackCommit { offset: i32 },
    /// Pop the top choice point and fail.
    FailTwice,
    Fail,
    /// Close a group whose key refers to a match-time function and run it.
    CloseRuntime,
    OpenCapture { kind: CaptureKind, key: u16 },
    CloseCapture,
    /// Capture the `len` bytes that precede the current position.
    FullCapture { kind: CaptureKind, key: u16, len: u8 },
}

impl Inst {
    /// Return the jump offset of this instruction, if it has one.
    pub fn offset(&self) -> Option<i32> {
        match *self {
            Inst::TestAny { offset }
            | Inst::TestChar { offset, .. }
            | Inst::TestSet { offset, .. }
            | Inst::Choice { offset }
            | Inst::Jmp { offset }
            | Inst::Call { offset }
            | Inst::Commit { offset }
            | Inst::PartialCommit { offset }
            | Inst::BackCommit { offset } => Some(offset),
            _ => None,
        }
    }

    fn set_offset(&mut self, new: i32) -> bool {
        match *self {
            Inst::TestAny { ref mut offset }
            | Inst::TestChar { ref mut offset, .. }
            | Inst::TestSet { ref mut offset, .. }
            | Inst::Choice { ref mut offset }
            | Inst::Jmp { ref mut offset }
            | Inst::Call { ref mut offset }
            | Inst::Commit { ref mut offset }
            | Inst::PartialCommit { ref mut offset }
            | Inst::BackCommit { ref mut offset } => {
                *offset = new;
                true
            }
            _ => false,
        }
    }

    /// Returns true if control can continue with the next instruction after
    /// this one. Calls count, since they return to the next instruction.
    fn falls_through(&self) -> bool {
        !matches!(
            *self,
            Inst::Ret
                | Inst::End
                | Inst::Giveup
                | Inst::Halt
                | Inst::Jmp { .. }
                | Inst::Commit { .. }
                | Inst::PartialCommit { .. }
                | Inst::BackCommit { .. }
                | Inst::FailTwice
                | Inst::Fail
        )
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cap = |f: &mut fmt::Formatter<'_>, kind: CaptureKind, key: u16| {
            write!(f, "{}(n = {})", kind, key)
        };
        match *self {
            Inst::Any => write!(f, "any"),
            Inst::Char(b) => write!(f, "char {:?}", b as char),
            Inst::Set(ref set) => write!(f, "set {:?}", set),
            Inst::TestAny { offset } => write!(f, "testany -> {:+}", offset),
            Inst::TestChar { byte, offset } => {
                write!(f, "testchar {:?} -> {:+}", byte as char, offset)
            }
            Inst::TestSet { ref set, offset } => {
                write!(f, "testset {:?} -> {:+}", set, offset)
            }
            Inst::Span(ref set) => write!(f, "span {:?}", set),
            Inst::Behind(n) => write!(f, "behind {}", n),
            Inst::Ret => write!(f, "ret"),
            Inst::End => write!(f, "end"),
            Inst::Giveup => write!(f, "giveup"),
            Inst::Halt => write!(f, "halt"),
            Inst::Choice { offset } => write!(f, "choice -> {:+}", offset),
            Inst::Jmp { offset } => write!(f, "jmp -> {:+}", offset),
            Inst::Call { offset } => write!(f, "call -> {:+}", offset),
            Inst::Commit { offset } => write!(f, "commit -> {:+}", offset),
            Inst::PartialCommit { offset } => {
                write!(f, "partial_commit -> {:+}", offset)
            }
            Inst::BackCommit { offset } => {
                write!(f, "back_commit -> {:+}", offset)
            }
            Inst::FailTwice => write!(f, "failtwice"),
            Inst::Fail => write!(f, "fail"),
            Inst::CloseRuntime => write!(f, "closeruntime"),
            Inst::OpenCapture { kind, key } => {
                write!(f, "opencapture ")?;
                cap(f, kind, key)
            }
            Inst::CloseCapture => write!(f, "closecapture"),
            Inst::FullCapture { kind, key, len } => {
                write!(f, "fullcapture ")?;
                cap(f, kind, key)?;
                write!(f, " (size = {})", len)
            }
        }
    }
}

/// A validated program and its constant table.
///
/// A program is immutable once built and can be shared between threads and
/// used for any number of matches.
#[derive(Clone)]
pub struct Program {
    insts: Vec<Inst>,
    constants: Vec<Value>,
    /// One entry per instruction. Only span instructions over sets that
    /// exclude at most three bytes have an accelerator.
    accels: Vec<Option<Accel>>,
}

impl Program {
    /// Validate the given instructions and build a program.
    ///
    /// `constants[0]` is addressed by key `1`.
    ///
    /// This returns an error when the program is empty, when a jump leads
    /// outside of the program, when the last instruction can continue past
    /// the end of the program, when a full capture is too long, when a
    /// capture instruction uses a kind that the interpreter reserves for
    /// itself, or when a capture key that refers to the constant table is out
    /// of range.
    pub fn new(insts: Vec<Inst>, constants: Vec<Value>) -> Result<Program> {
        if let Err(err) = validate(&insts, constants.len()) {
            debug!("program failed validation: {}", err);
            return Err(err);
        }
        let accels = insts
            .iter()
            .map(|inst| match *inst {
                Inst::Span(ref set) => set.accel(),
                _ => None,
            })
            .collect();
        Ok(Program { insts, constants, accels })
    }

    /// The number of instructions in this program.
    pub fn len(&self) -> usize {
        self.insts.len()
    }

    /// Always false, since empty programs are rejected.
    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    #[inline]
    pub fn inst(&self, pc: usize) -> &Inst {
        &self.insts[pc]
    }

    pub fn insts(&self) -> &[Inst] {
        &self.insts
    }

    pub fn constants(&self) -> &[Value] {
        &self.constants
    }

    /// Look up a constant by its 1-based key. Key `0` never has a value.
    #[inline]
    pub fn constant(&self, key: u16) -> Option<&Value> {
        usize::from(key).checked_sub(1).and_then(|i| self.constants.get(i))
    }

    #[inline]
    pub(crate) fn accel(&self, pc: usize) -> Option<&Accel> {
        self.accels[pc].as_ref()
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Program(")?;
        for (pc, inst) in self.insts.iter().enumerate() {
            write!(f, "  {:04}: {}", pc, inst)?;
            if let Some(off) = inst.offset() {
                write!(f, " ({:04})", pc as i64 + i64::from(off))?;
            }
            writeln!(f)?;
        }
        for (i, value) in self.constants.iter().enumerate() {
            writeln!(f, "  k{}: {:?}", i + 1, value)?;
        }
        write!(f, ")")
    }
}

fn validate(insts: &[Inst], nconstants: usize) -> Result<()> {
    let last = match insts.last() {
        None => return Err(Error::invalid_program(None, "empty program")),
        Some(last) => last,
    };
    if last.falls_through() {
        return Err(Error::invalid_program(
            Some(insts.len() - 1),
            "last instruction continues past the end of the program",
        ));
    }
    for (pc, inst) in insts.iter().enumerate() {
        if let Some(offset) = inst.offset() {
            let target = pc as i64 + i64::from(offset);
            if target < 0 || target >= insts.len() as i64 {
                return Err(Error::invalid_program(
                    Some(pc),
                    "jump target outside of the program",
                ));
            }
        }
        let (kind, key) = match *inst {
            Inst::OpenCapture { kind, key } => (kind, key),
            Inst::FullCapture { kind, key, len } => {
                if usize::from(len) > MAX_FULL_LEN {
                    return Err(Error::invalid_program(
                        Some(pc),
                        "full capture is too long",
                    ));
                }
                (kind, key)
            }
            _ => continue,
        };
        match kind {
            CaptureKind::Close | CaptureKind::Final | CaptureKind::Runtime => {
                return Err(Error::invalid_program(
                    Some(pc),
                    "capture kind is reserved for the interpreter",
                ));
            }
            CaptureKind::Constant
            | CaptureKind::Backref
            | CaptureKind::Function
            | CaptureKind::Query
            | CaptureKind::String
            | CaptureKind::Fold
            | CaptureKind::Group
            | CaptureKind::Reportable => {
                if usize::from(key) > nconstants {
                    return Err(Error::invalid_program(
                        Some(pc),
                        "capture key outside of the constant table",
                    ));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// A symbolic jump target handed out by a [`Builder`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Label(usize);

/// Assemble a program with symbolic jump targets.
///
/// Labels are created with [`Builder::label`], placed with [`Builder::bind`]
/// and used by jump instructions pushed with [`Builder::jump`]. Offsets are
/// resolved when the program is built.
///
/// # Example
///
/// This assembles a program that matches one or more `a` bytes.
///
/// ```
/// use pegvm::program::{Builder, Inst};
///
/// let mut b = Builder::new();
/// let (top, done) = (b.label(), b.label());
/// b.push(Inst::Char(b'a'));
/// b.bind(top);
/// b.jump(Inst::TestChar { byte: b'a', offset: 0 }, done);
/// b.push(Inst::Any);
/// b.jump(Inst::Jmp { offset: 0 }, top);
/// b.bind(done);
/// b.push(Inst::End);
/// let program = b.build()?;
/// assert_eq!(5, program.len());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct Builder {
    insts: Vec<Inst>,
    constants: Vec<Value>,
    labels: Vec<Option<usize>>,
    fixups: Vec<(usize, Label)>,
    too_many_constants: bool,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Create a new, unbound label.
    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind the label to the index of the next instruction pushed.
    pub fn bind(&mut self, label: Label) {
        self.labels[label.0] = Some(self.insts.len());
    }

    /// Append an instruction and return its index.
    pub fn push(&mut self, inst: Inst) -> usize {
        self.insts.push(inst);
        self.insts.len() - 1
    }

    /// Append a jump instruction whose offset is resolved to the given label
    /// when the program is built. The offset already in `inst` is ignored.
    pub fn jump(&mut self, inst: Inst, label: Label) -> usize {
        let pc = self.push(inst);
        self.fixups.push((pc, label));
        pc
    }

    /// Add a constant and return the key that refers to it.
    pub fn constant<V: Into<Value>>(&mut self, value: V) -> u16 {
        if self.constants.len() >= usize::from(u16::MAX) {
            self.too_many_constants = true;
            return 0;
        }
        self.constants.push(value.into());
        self.constants.len() as u16
    }

    /// Resolve every label and validate the result.
    pub fn build(mut self) -> Result<Program> {
        if self.too_many_constants {
            return Err(Error::invalid_program(None, "too many constants"));
        }
        for &(pc, label) in self.fixups.iter() {
            let target = self.labels[label.0].ok_or_else(|| {
                Error::invalid_program(Some(pc), "jump to an unbound label")
            })?;
            let offset = i32::try_from(target as i64 - pc as i64)
                .map_err(|_| {
                    Error::invalid_program(Some(pc), "jump is too far")
                })?;
            if !self.insts[pc].set_offset(offset) {
                return Err(Error::invalid_program(
                    Some(pc),
                    "label given to an instruction that does not jump",
                ));
            }
        }
        Program::new(self.insts, self.constants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn invalid(insts: Vec<Inst>) -> (Option<usize>, &'static str) {
        match *Program::new(insts, vec![]).unwrap_err().kind() {
            ErrorKind::InvalidProgram { pc, msg } => (pc, msg),
            ref kind => panic!("unexpected error: {:?}", kind),
        }
    }

    #[test]
    fn charset() {
        let set = CharSet::from_range(b'a', b'z');
        assert!(set.contains(b'a') && set.contains(b'z'));
        assert!(!set.contains(b'A'));
        assert_eq!(26, set.len());
        assert_eq!(230, set.negate().len());
        assert_eq!("[a-z]", format!("{:?}", set));
        let set = CharSet::from_bytes(b"\n0")
            .union(&CharSet::from_range(b'5', b'7'));
        assert_eq!("[\\n05-7]", format!("{:?}", set));
    }

    #[test]
    fn accel_only_for_small_complements() {
        assert!(CharSet::from_range(b'a', b'z').accel().is_none());
        assert!(CharSet::full().accel().is_some());
        let accel = CharSet::from_bytes(b"\n,").negate().accel().unwrap();
        assert_eq!(3, accel.find_fwd(b"abc,def", 0));
        assert_eq!(7, accel.find_fwd(b"abc,def", 4));
        let accel = CharSet::full().accel().unwrap();
        assert_eq!(5, accel.find_fwd(b"hello", 2));
    }

    #[test]
    fn validation() {
        assert_eq!((None, "empty program"), invalid(vec![]));
        assert_eq!(Some(0), invalid(vec![Inst::Any]).0);
        assert_eq!(
            Some(0),
            invalid(vec![Inst::Jmp { offset: 2 }, Inst::End]).0
        );
        assert_eq!(
            Some(0),
            invalid(vec![Inst::Choice { offset: -1 }, Inst::End]).0
        );
        assert_eq!(
            Some(0),
            invalid(vec![
                Inst::FullCapture {
                    kind: CaptureKind::Simple,
                    key: 0,
                    len: 255
                },
                Inst::End,
            ])
            .0
        );
        assert_eq!(
            Some(0),
            invalid(vec![
                Inst::OpenCapture { kind: CaptureKind::Close, key: 0 },
                Inst::End,
            ])
            .0
        );
        assert_eq!(
            Some(0),
            invalid(vec![
                Inst::OpenCapture { kind: CaptureKind::Constant, key: 1 },
                Inst::End,
            ])
            .0
        );
        assert_eq!(Some(0), invalid(vec![Inst::Call { offset: 0 }]).0);
    }

    #[test]
    fn constants_are_one_based() {
        let program =
            Program::new(vec![Inst::End], vec![Value::str("x")]).unwrap();
        assert_eq!(None, program.constant(0));
        assert_eq!(Some(&Value::str("x")), program.constant(1));
        assert_eq!(None, program.constant(2));
    }

    #[test]
    fn builder_resolves_labels() {
        let mut b = Builder::new();
        let (fail, done) = (b.label(), b.label());
        b.jump(Inst::Choice { offset: 0 }, fail);
        b.push(Inst::Char(b'x'));
        b.jump(Inst::Commit { offset: 0 }, done);
        b.bind(fail);
        b.push(Inst::Any);
        b.bind(done);
        b.push(Inst::End);
        let program = b.build().unwrap();
        assert_eq!(&Inst::Choice { offset: 3 }, program.inst(0));
        assert_eq!(&Inst::Commit { offset: 2 }, program.inst(2));
    }

    #[test]
    fn builder_rejects_unbound_label() {
        let mut b = Builder::new();
        let nowhere = b.label();
        b.jump(Inst::Jmp { offset: 0 }, nowhere);
        assert!(b.build().is_err());
    }
}
