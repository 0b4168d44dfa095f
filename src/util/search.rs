use core::ops::{Range, RangeBounds};

use bstr::ByteSlice;

use crate::value::Value;

/// The parameters for a single match.
///
/// A match needs more than a subject. It may be restricted to a span of the
/// subject, and argument captures need the extra arguments that were handed
/// to the match. An `Input` bundles all of these. The minimal configuration
/// is a call to [`Input::new`] with the subject, which matches from the start
/// of the subject to its end with no extra arguments.
///
/// The span restricts where matching starts and how far it may consume, but
/// the whole subject remains visible: look-behind may step back over bytes
/// before the start of the span (but never before the start of the subject),
/// and every position reported by a match is an offset into the whole
/// subject.
///
/// The lifetime parameters have the following meaning:
///
/// * `'h` refers to the lifetime of the subject.
/// * `'a` refers to the lifetime of the extra arguments.
#[derive(Clone)]
pub struct Input<'h, 'a> {
    haystack: &'h [u8],
    span: Span,
    args: &'a [Value],
}

impl<'h> Input<'h, 'static> {
    /// Create a new input for the given subject.
    #[inline]
    pub fn new<H: ?Sized + AsRef<[u8]>>(
        haystack: &'h H,
    ) -> Input<'h, 'static> {
        let haystack = haystack.as_ref();
        let span = Span { start: 0, end: haystack.len() };
        Input { haystack, span, args: &[] }
    }
}

impl<'h, 'a> Input<'h, 'a> {
    /// Set the span to match within.
    ///
    /// This routine does not panic if the span given is not a valid range for
    /// the subject. Instead, the interpreter clamps the end of the span to
    /// the length of the subject and reports no match when the start lies
    /// beyond it.
    #[inline]
    pub fn span<S: Into<Span>>(mut self, span: S) -> Input<'h, 'a> {
        self.set_span(span);
        self
    }

    /// Like `Input::span`, but accepts any range instead.
    ///
    /// # Example
    ///
    /// ```
    /// use pegvm::Input;
    ///
    /// let input = Input::new("foobar").range(2..=4);
    /// assert_eq!(2..5, input.get_range());
    ///
    /// let input = Input::new("foobar").range(3..);
    /// assert_eq!(3..6, input.get_range());
    /// ```
    #[inline]
    pub fn range<R: RangeBounds<usize>>(mut self, range: R) -> Input<'h, 'a> {
        self.set_range(range);
        self
    }

    /// Set the extra arguments that argument captures refer to.
    ///
    /// Argument capture `N` refers to `args[N - 1]`.
    #[inline]
    pub fn args<'b>(self, args: &'b [Value]) -> Input<'h, 'b> {
        Input { haystack: self.haystack, span: self.span, args }
    }

    #[inline]
    pub fn set_span<S: Into<Span>>(&mut self, span: S) {
        self.span = span.into();
    }

    #[inline]
    pub fn set_range<R: RangeBounds<usize>>(&mut self, range: R) {
        use core::ops::Bound;

        let start = match range.start_bound() {
            Bound::Included(&i) => i,
            Bound::Excluded(&i) => i.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&i) => i.saturating_add(1),
            Bound::Excluded(&i) => i,
            Bound::Unbounded => self.haystack.len(),
        };
        self.set_span(Span { start, end });
    }

    /// Return the whole subject, including anything outside of the span.
    #[inline]
    pub fn haystack(&self) -> &'h [u8] {
        self.haystack
    }

    #[inline]
    pub fn start(&self) -> usize {
        self.span.start
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.span.end
    }

    #[inline]
    pub fn get_span(&self) -> Span {
        self.span
    }

    #[inline]
    pub fn get_range(&self) -> Range<usize> {
        self.span.range()
    }

    #[inline]
    pub fn get_args(&self) -> &'a [Value] {
        self.args
    }

    /// Return the 1-based extra argument `n`, if it was given.
    #[inline]
    pub fn arg(&self, n: u16) -> Option<&'a Value> {
        usize::from(n).checked_sub(1).and_then(|i| self.args.get(i))
    }
}

impl<'h, 'a> core::fmt::Debug for Input<'h, 'a> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Input")
            .field("haystack", &self.haystack.as_bstr())
            .field("span", &self.span)
            .field("args", &self.args)
            .finish()
    }
}

/// A half-open interval of byte offsets.
///
/// This is basically equivalent to a `std::ops::Range<usize>`, except this
/// type implements `Copy`. Like a range, it can be used to index a `[u8]`,
/// and `Span::from(5..10)` works.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Span {
    /// The start offset of the span, inclusive.
    pub start: usize,
    /// The end offset of the span, exclusive.
    pub end: usize,
}

impl Span {
    #[inline]
    pub fn range(&self) -> Range<usize> {
        Range::from(*self)
    }

    /// Returns true when this span is empty. That is, when `start >= end`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

impl core::ops::Index<Span> for [u8] {
    type Output = [u8];

    #[inline]
    fn index(&self, index: Span) -> &[u8] {
        &self[index.range()]
    }
}

impl From<Range<usize>> for Span {
    #[inline]
    fn from(range: Range<usize>) -> Span {
        Span { start: range.start, end: range.end }
    }
}

impl From<Span> for Range<usize> {
    #[inline]
    fn from(span: Span) -> Range<usize> {
        Range { start: span.start, end: span.end }
    }
}

impl PartialEq<Range<usize>> for Span {
    #[inline]
    fn eq(&self, range: &Range<usize>) -> bool {
        self.start == range.start && self.end == range.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_span_covers_subject() {
        let input = Input::new("hello");
        assert_eq!(0..5, input.get_range());
        assert!(input.get_args().is_empty());
    }

    #[test]
    fn args_are_one_based() {
        let args = [Value::Int(10), Value::str("x")];
        let input = Input::new("abc").args(&args);
        assert_eq!(None, input.arg(0));
        assert_eq!(Some(&Value::Int(10)), input.arg(1));
        assert_eq!(Some(&Value::str("x")), input.arg(2));
        assert_eq!(None, input.arg(3));
    }

    #[test]
    fn span_from_range() {
        let span = Span::from(2..7);
        assert_eq!(span, 2..7);
        assert_eq!(5, span.len());
        assert_eq!(b"cdefg", &b"abcdefghij"[span]);
    }
}
