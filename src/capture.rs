/*!
Capture records and the capture list produced by a match.

The interpreter does not build a tree of captures while it runs. It appends
flat records to a list instead, and backtracking simply truncates the list.
Nesting is recovered afterwards from the shape of the records:

* An *open* record (size `0`) starts a region that extends until a matching
  *close* record.
* A *full* record (size `n > 0`) is a complete capture of the `n - 1` bytes
  starting at its position. It has no nested captures.
* A *close* record ends the innermost region that is still open.

A list produced by a successful match is well nested and ends with a
terminator: a close record at the final position, or a [`CaptureKind::Final`]
record when the program halted early.
*/

use core::fmt;

use crate::error::{Error, Result};

/// The kind of a capture record.
///
/// Each kind determines how the values of a capture are computed by the
/// resolver. [`CaptureKind::Reportable`] marks the captures that the
/// streaming encoders emit, while [`CaptureKind::Close`] and
/// [`CaptureKind::Final`] are structural and never produce values.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum CaptureKind {
    Close,
    Position,
    Constant,
    Backref,
    Arg,
    Simple,
    Table,
    Function,
    Query,
    String,
    Num,
    Subst,
    Fold,
    Runtime,
    Group,
    Reportable,
    Final,
}

impl CaptureKind {
    /// A short lowercase name for this kind, as used in traces.
    pub fn name(&self) -> &'static str {
        match *self {
            CaptureKind::Close => "close",
            CaptureKind::Position => "position",
            CaptureKind::Constant => "constant",
            CaptureKind::Backref => "backref",
            CaptureKind::Arg => "argument",
            CaptureKind::Simple => "simple",
            CaptureKind::Table => "table",
            CaptureKind::Function => "function",
            CaptureKind::Query => "query",
            CaptureKind::String => "string",
            CaptureKind::Num => "num",
            CaptureKind::Subst => "substitution",
            CaptureKind::Fold => "fold",
            CaptureKind::Runtime => "runtime",
            CaptureKind::Group => "group",
            CaptureKind::Reportable => "reportable",
            CaptureKind::Final => "final",
        }
    }

    /// Returns true for the kinds that only give structure to a capture list.
    pub fn is_structural(&self) -> bool {
        matches!(*self, CaptureKind::Close | CaptureKind::Final)
    }
}

impl fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The longest span a full capture can describe.
pub const MAX_FULL_LEN: usize = u8::MAX as usize - 1;

/// A single capture record.
///
/// `start` is an offset into the subject. `idx` is a key into the program's
/// constant table for most kinds; for [`CaptureKind::Runtime`] it is the slot
/// of the value in the value environment, and for [`CaptureKind::Num`] and
/// [`CaptureKind::Arg`] it is a plain number.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Capture {
    pub start: usize,
    pub idx: u16,
    pub kind: CaptureKind,
    pub size: u8,
}

impl Capture {
    /// An open record. Its extent is determined by a later close record.
    pub fn open(kind: CaptureKind, idx: u16, start: usize) -> Capture {
        Capture { start, idx, kind, size: 0 }
    }

    /// A full record spanning `len` bytes from `start`.
    ///
    /// `len` must not exceed [`MAX_FULL_LEN`].
    pub fn full(
        kind: CaptureKind,
        idx: u16,
        start: usize,
        len: usize,
    ) -> Capture {
        debug_assert!(len <= MAX_FULL_LEN);
        Capture { start, idx, kind, size: len as u8 + 1 }
    }

    /// A close record at the given position.
    pub fn close(at: usize) -> Capture {
        Capture { start: at, idx: 0, kind: CaptureKind::Close, size: 1 }
    }

    /// The terminator written when a program halts early.
    pub fn final_at(at: usize) -> Capture {
        Capture { start: at, idx: 0, kind: CaptureKind::Final, size: 1 }
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.size == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.size != 0
    }

    /// Returns true for close records.
    #[inline]
    pub fn is_close(&self) -> bool {
        self.kind == CaptureKind::Close
    }

    /// Returns true for either kind of terminator.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.kind.is_structural()
    }

    /// The end of a full record, or the position of a close record.
    ///
    /// This is meaningless for open records.
    #[inline]
    pub fn end(&self) -> usize {
        self.start + usize::from(self.size) - 1
    }
}

impl fmt::Display for Capture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({} {} {} {})",
            self.kind, self.idx, self.start, self.size
        )
    }
}

/// The growable list of capture records built by the interpreter.
///
/// The list grows by doubling. When a limit is configured, attempting to
/// hold more records than the limit returns an error instead.
#[derive(Clone)]
pub struct CaptureList {
    caps: Vec<Capture>,
    limit: Option<usize>,
}

impl CaptureList {
    pub fn new(capacity: usize, limit: Option<usize>) -> CaptureList {
        let capacity = match limit {
            None => capacity,
            Some(limit) => core::cmp::min(capacity, limit),
        };
        CaptureList { caps: Vec::with_capacity(capacity), limit }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.caps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.caps.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[Capture] {
        &self.caps
    }

    #[inline]
    pub fn get(&self, i: usize) -> Option<&Capture> {
        self.caps.get(i)
    }

    #[inline]
    pub fn last_mut(&mut self) -> Option<&mut Capture> {
        self.caps.last_mut()
    }

    /// Drop every record at or above `len`.
    #[inline]
    pub fn truncate(&mut self, len: usize) {
        self.caps.truncate(len);
    }

    /// Append a record, growing the list when it is full.
    pub fn push(&mut self, cap: Capture) -> Result<()> {
        if self.caps.len() == self.caps.capacity() {
            self.grow()?;
        }
        self.caps.push(cap);
        Ok(())
    }

    fn grow(&mut self) -> Result<()> {
        let len = self.caps.len();
        let mut new_cap = core::cmp::max(1, len.saturating_mul(2));
        if let Some(limit) = self.limit {
            if len >= limit {
                debug!("capture list reached its limit of {}", limit);
                return Err(Error::too_many_captures(limit));
            }
            new_cap = core::cmp::min(new_cap, limit);
        }
        trace!("growing capture list from {} to {}", len, new_cap);
        self.caps
            .try_reserve_exact(new_cap - len)
            .map_err(|_| Error::too_many_captures(new_cap))
    }

    pub fn into_vec(self) -> Vec<Capture> {
        self.caps
    }
}

impl fmt::Debug for CaptureList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CaptureList(")?;
        for (i, cap) in self.caps.iter().enumerate() {
            writeln!(f, "  {:04}: {}", i, cap)?;
        }
        write!(f, ")")
    }
}

/// Find the open record matched by the close record at `close`.
///
/// Full records in between are skipped, as are nested regions. Returns
/// `None` if there is no matching open record.
pub fn find_open(caps: &[Capture], close: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = close;
    while i > 0 {
        i -= 1;
        let cap = &caps[i];
        if cap.is_close() {
            depth += 1;
        } else if cap.is_open() {
            if depth == 0 {
                return Some(i);
            }
            depth -= 1;
        }
    }
    None
}

/// Return the index of the record that ends the region opened at `i`.
///
/// That is the matching close record or, when the program halted while the
/// region was still open, the final record. Returns `None` if the list ends
/// first.
pub fn find_close(caps: &[Capture], i: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut j = i + 1;
    while let Some(cap) = caps.get(j) {
        if cap.kind == CaptureKind::Final {
            return Some(j);
        } else if cap.is_close() {
            if depth == 0 {
                return Some(j);
            }
            depth -= 1;
        } else if cap.is_open() {
            depth += 1;
        }
        j += 1;
    }
    None
}

/// Return the index of the record just past the capture at `i`, including
/// everything nested within it.
///
/// For a full record, this is `i + 1`. For an open record, this is the index
/// after its matching close. A final record ends every open region without
/// being consumed, so a region that ends at one yields the final record's
/// own index. If the list ends before the region does, the length of the
/// list is returned.
pub fn next_cap(caps: &[Capture], i: usize) -> usize {
    match caps.get(i) {
        None => caps.len(),
        Some(cap) if cap.is_full() => i + 1,
        Some(_) => match find_close(caps, i) {
            Some(j) if caps[j].is_close() => j + 1,
            Some(j) => j,
            None => caps.len(),
        },
    }
}

/// Return the value environment slot of the first runtime record among the
/// given records, if there is one.
pub fn first_runtime_slot(caps: &[Capture]) -> Option<usize> {
    caps.iter()
        .find(|cap| cap.kind == CaptureKind::Runtime)
        .map(|cap| usize::from(cap.idx))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list() -> Vec<Capture> {
        // 0: open group
        // 1:   full simple [0, 2)
        // 2:   open simple
        // 3:     full position
        // 4:   close
        // 5: close
        // 6: terminator
        vec![
            Capture::open(CaptureKind::Group, 1, 0),
            Capture::full(CaptureKind::Simple, 0, 0, 2),
            Capture::open(CaptureKind::Simple, 0, 2),
            Capture::full(CaptureKind::Position, 0, 3, 0),
            Capture::close(4),
            Capture::close(5),
            Capture::close(5),
        ]
    }

    #[test]
    fn record_shapes() {
        let full = Capture::full(CaptureKind::Simple, 0, 3, 4);
        assert!(full.is_full());
        assert_eq!(7, full.end());
        let close = Capture::close(9);
        assert!(close.is_full() && close.is_close());
        assert_eq!(9, close.end());
        assert!(Capture::open(CaptureKind::Table, 0, 1).is_open());
        assert!(Capture::final_at(2).is_terminal());
    }

    #[test]
    fn navigation() {
        let caps = list();
        assert_eq!(6, next_cap(&caps, 0));
        assert_eq!(2, next_cap(&caps, 1));
        assert_eq!(5, next_cap(&caps, 2));
        assert_eq!(Some(2), find_open(&caps, 4));
        assert_eq!(Some(0), find_open(&caps, 5));
        assert_eq!(None, find_open(&caps, 0));
        assert_eq!(Some(5), find_close(&caps, 0));
        assert_eq!(Some(4), find_close(&caps, 2));
    }

    #[test]
    fn final_record_ends_open_regions() {
        let caps = vec![
            Capture::open(CaptureKind::Simple, 0, 0),
            Capture::open(CaptureKind::Group, 0, 1),
            Capture::full(CaptureKind::Position, 0, 2, 0),
            Capture::final_at(3),
        ];
        assert_eq!(Some(3), find_close(&caps, 0));
        assert_eq!(Some(3), find_close(&caps, 1));
        assert_eq!(3, next_cap(&caps, 0));
        assert_eq!(3, next_cap(&caps, 1));
        assert_eq!(3, next_cap(&caps, 2));
    }

    #[test]
    fn runtime_slot() {
        let caps = vec![
            Capture::open(CaptureKind::Group, 0, 0),
            Capture::full(CaptureKind::Runtime, 4, 0, 0),
            Capture::full(CaptureKind::Runtime, 5, 0, 0),
            Capture::close(0),
        ];
        assert_eq!(Some(4), first_runtime_slot(&caps));
        assert_eq!(None, first_runtime_slot(&caps[..1]));
    }

    #[test]
    fn limit() {
        let mut list = CaptureList::new(1, Some(3));
        for i in 0..3 {
            list.push(Capture::close(i)).unwrap();
        }
        let err = list.push(Capture::close(3)).unwrap_err();
        assert_eq!("too many captures (current limit is 3)", err.to_string());
        assert_eq!(3, list.len());
    }

    #[test]
    fn unlimited_growth() {
        let mut list = CaptureList::new(0, None);
        for i in 0..1000 {
            list.push(Capture::close(i)).unwrap();
        }
        assert_eq!(1000, list.len());
        list.truncate(10);
        assert_eq!(Some(&Capture::close(9)), list.get(9));
    }
}
