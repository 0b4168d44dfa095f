use core::fmt;

use bstr::{BString, ByteSlice};

use crate::error::{Error, Result};

use super::{check_close, check_full, check_open, Context, Encoder};

/// A node of the tree of reportable captures.
///
/// Positions are 1-based and `end` is exclusive, matching the encodings.
#[derive(Clone, Eq, PartialEq)]
pub struct MatchTree {
    pub start: usize,
    pub end: usize,
    pub name: BString,
    pub subs: Vec<MatchTree>,
}

impl MatchTree {
    /// Create a node without children.
    pub fn leaf<B: AsRef<[u8]>>(
        start: usize,
        name: B,
        end: usize,
    ) -> MatchTree {
        let name = BString::from(name.as_ref());
        MatchTree { start, end, name, subs: vec![] }
    }

    /// Return the text of the subject this node matched.
    pub fn text<'h>(&self, haystack: &'h [u8]) -> &'h [u8] {
        let start = self.start.saturating_sub(1);
        let end = self.end.saturating_sub(1);
        haystack.get(start..end).unwrap_or(&[])
    }

    /// Visit this node and all of its descendants in pre-order.
    pub fn walk<F: FnMut(&MatchTree, usize)>(&self, mut f: F) {
        let mut stack = vec![(self, 0)];
        while let Some((node, depth)) = stack.pop() {
            f(node, depth);
            for sub in node.subs.iter().rev() {
                stack.push((sub, depth + 1));
            }
        }
    }
}

impl fmt::Debug for MatchTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}, {})", self.name.as_bstr(), self.start, self.end)?;
        if !self.subs.is_empty() {
            f.debug_list().entries(self.subs.iter()).finish()?;
        }
        Ok(())
    }
}

/// An encoder that builds a [`MatchTree`] instead of serializing it.
#[derive(Clone, Debug, Default)]
pub struct TreeEncoder {
    stack: Vec<MatchTree>,
    root: Option<MatchTree>,
}

impl TreeEncoder {
    pub fn new() -> TreeEncoder {
        TreeEncoder::default()
    }

    /// Return the tree that was built, if any capture was walked.
    pub fn into_tree(self) -> Option<MatchTree> {
        self.root
    }

    fn node(cx: &Context<'_>, cap: usize) -> Result<MatchTree> {
        let rec = cx.record(cap);
        let name = cx.name(&rec)?;
        Ok(MatchTree::leaf(rec.start + 1, name, 0))
    }

    fn finish(&mut self, node: MatchTree) {
        match self.stack.last_mut() {
            Some(parent) => parent.subs.push(node),
            None => self.root = Some(node),
        }
    }
}

impl Encoder for TreeEncoder {
    fn open(
        &mut self,
        cx: &Context<'_>,
        cap: usize,
        _count: usize,
    ) -> Result<()> {
        check_open(cx, cap)?;
        let node = TreeEncoder::node(cx, cap)?;
        self.stack.push(node);
        Ok(())
    }

    fn full_capture(
        &mut self,
        cx: &Context<'_>,
        cap: usize,
        _count: usize,
    ) -> Result<()> {
        let rec = check_full(cx, cap)?;
        let mut node = TreeEncoder::node(cx, cap)?;
        node.end = rec.end() + 1;
        self.finish(node);
        Ok(())
    }

    fn close(
        &mut self,
        cx: &Context<'_>,
        cap: usize,
        _count: usize,
        _start: Option<usize>,
    ) -> Result<()> {
        let rec = check_close(cx, cap)?;
        let mut node = match self.stack.pop() {
            Some(node) => node,
            None => return Err(Error::close()),
        };
        node.end = rec.start + 1;
        self.finish(node);
        Ok(())
    }
}
