use bstr::BString;

use crate::util::wire::{self, DecodeError};

use super::{byte::TAG, MatchTree};

/// Read a match tree from its byte encoding.
///
/// This accepts exactly the output of the [`Byte`](super::Encoding::Byte)
/// encoding for a match with at least one reportable capture. Every read is
/// bounds checked, and deeply nested trees are decoded without recursion.
///
/// # Example
///
/// ```
/// use pegvm::encode::{decode, MatchTree};
///
/// let bytes = [3, 0xFF, 0xFF, 0xFF, 0xFF, 1, 0, b'w', 4, 0, 0, 0];
/// assert_eq!(MatchTree::leaf(1, "w", 4), decode(&bytes)?);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn decode(bytes: &[u8]) -> Result<MatchTree, DecodeError> {
    let tag = *bytes
        .first()
        .ok_or_else(|| DecodeError::buffer_too_small("encoding tag", 0))?;
    if tag != TAG {
        return Err(DecodeError::invalid_tag(tag));
    }
    let rest = |pos: usize| bytes.get(pos..).unwrap_or(&[]);

    let mut parents: Vec<MatchTree> = vec![];
    let mut pos = 1;
    loop {
        let start = wire::try_read_i32(rest(pos), pos, "start position")?;
        if start >= 0 {
            return Err(DecodeError::expected_start(pos));
        }
        pos += 4;
        let len = wire::try_read_i16(rest(pos), pos, "name length")?;
        if len < 0 {
            return Err(DecodeError::invalid_name_length(pos));
        }
        pos += 2;
        let len = len as usize;
        let name = bytes
            .get(pos..pos + len)
            .ok_or_else(|| DecodeError::buffer_too_small("name", pos))?;
        pos += len;
        let mut node = MatchTree {
            start: start.unsigned_abs() as usize,
            end: 0,
            name: BString::from(name),
            subs: vec![],
        };
        // Each non-negative integer ends the current node. A negative one
        // starts a child of it.
        loop {
            let end = wire::try_read_i32(rest(pos), pos, "end position")?;
            if end < 0 {
                parents.push(node);
                break;
            }
            pos += 4;
            node.end = end as usize;
            match parents.pop() {
                Some(mut parent) => {
                    parent.subs.push(node);
                    node = parent;
                }
                None if pos == bytes.len() => return Ok(node),
                None => return Err(DecodeError::trailing_data(pos)),
            }
        }
    }
}
