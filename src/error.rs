use std::error;
use std::fmt;
use std::result;

use crate::{capture::CaptureKind, value::HostError};

pub type Result<T> = result::Result<T, Error>;

/// An error that occurred while matching, resolving captures or encoding a
/// match.
///
/// Every error is fatal to the call that produced it. Nothing in this crate
/// retries: callers may re-invoke with different inputs, but a failed call
/// leaves no partial results behind.
///
/// The kind of error can be inspected via [`Error::kind`]. A human readable
/// message is available through the `std::fmt::Display` impl.
#[derive(Clone, Debug)]
pub struct Error {
    kind: ErrorKind,
}

/// The kind of error that occurred.
#[non_exhaustive]
#[derive(Clone, Debug)]
pub enum ErrorKind {
    /// The program handed to the interpreter is malformed. For example, a
    /// jump leads outside of the program or the last instruction can fall
    /// through past the end.
    InvalidProgram {
        /// The index of the offending instruction, if there is one.
        pc: Option<usize>,
        /// What is wrong with it.
        msg: &'static str,
    },
    /// The backtrack stack would exceed its configured limit.
    StackOverflow {
        /// The configured limit, in entries.
        limit: usize,
    },
    /// The capture list would exceed its configured limit.
    TooManyCaptures {
        /// The configured limit, in records.
        limit: usize,
    },
    /// A growable buffer could not be grown to the requested size.
    BufferTooLarge {
        /// The total number of bytes that was requested.
        requested: usize,
    },
    /// A capture record of this kind was found where a value producing
    /// capture was expected.
    InvalidCaptureKind {
        /// The kind that was found.
        kind: CaptureKind,
    },
    /// An argument capture referred to an extra argument that was not given.
    AbsentArgument {
        /// The 1-based argument number.
        index: u16,
    },
    /// A back reference names a group that could not be found.
    BackrefNotFound {
        /// The (lossily decoded) name of the group.
        name: String,
    },
    /// A fold capture has no nested value to use as its initial accumulator.
    NoFoldInitialValue,
    /// A numbered capture selected a value that does not exist.
    NoCapture {
        /// The 1-based index that was selected.
        index: u16,
    },
    /// A string capture format referred to a capture it does not have.
    InvalidCaptureIndex {
        /// The index as it appears in the format string.
        index: usize,
    },
    /// A string capture format referred to a capture that produced no
    /// values.
    NoValuesInCapture {
        /// The index as it appears in the format string.
        index: usize,
    },
    /// A value of the wrong type was found.
    InvalidValue {
        /// What the value was supposed to be used as.
        what: &'static str,
        /// The type name of the value that was found.
        found: &'static str,
    },
    /// A match-time (runtime) capture returned a position outside of the
    /// range it is allowed to move to.
    InvalidRuntimePosition {
        /// The 1-based position that was returned.
        position: i64,
    },
    /// A host function failed.
    Host(HostError),
    /// An encoder expected an open capture and found something else.
    OpenError,
    /// An encoder expected a close capture and found something else.
    CloseError,
    /// An encoder expected a full capture and found something else.
    FullCaptureError,
    /// Reportable captures are nested deeper than an encoder supports.
    NestingTooDeep {
        /// The maximum supported depth.
        limit: usize,
    },
    /// The name of a reportable capture is not a string.
    InvalidName {
        /// The type name of the value that was found.
        found: &'static str,
    },
    /// A position or name does not fit into the fixed width fields of the
    /// byte encoding.
    EncodingOverflow {
        /// What did not fit.
        what: &'static str,
    },
    /// An encoding name was not recognized.
    UnknownEncoding {
        /// The name that was given.
        name: String,
    },
}

impl Error {
    /// Return the kind of this error.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub(crate) fn invalid_program(
        pc: Option<usize>,
        msg: &'static str,
    ) -> Error {
        Error { kind: ErrorKind::InvalidProgram { pc, msg } }
    }

    pub(crate) fn stack_overflow(limit: usize) -> Error {
        Error { kind: ErrorKind::StackOverflow { limit } }
    }

    pub(crate) fn too_many_captures(limit: usize) -> Error {
        Error { kind: ErrorKind::TooManyCaptures { limit } }
    }

    pub(crate) fn buffer_too_large(requested: usize) -> Error {
        Error { kind: ErrorKind::BufferTooLarge { requested } }
    }

    pub(crate) fn invalid_capture_kind(kind: CaptureKind) -> Error {
        Error { kind: ErrorKind::InvalidCaptureKind { kind } }
    }

    pub(crate) fn absent_argument(index: u16) -> Error {
        Error { kind: ErrorKind::AbsentArgument { index } }
    }

    pub(crate) fn backref_not_found(name: &[u8]) -> Error {
        let name = String::from_utf8_lossy(name).into_owned();
        Error { kind: ErrorKind::BackrefNotFound { name } }
    }

    pub(crate) fn no_fold_initial_value() -> Error {
        Error { kind: ErrorKind::NoFoldInitialValue }
    }

    pub(crate) fn no_capture(index: u16) -> Error {
        Error { kind: ErrorKind::NoCapture { index } }
    }

    pub(crate) fn invalid_capture_index(index: usize) -> Error {
        Error { kind: ErrorKind::InvalidCaptureIndex { index } }
    }

    pub(crate) fn no_values_in_capture(index: usize) -> Error {
        Error { kind: ErrorKind::NoValuesInCapture { index } }
    }

    pub(crate) fn invalid_value(
        what: &'static str,
        found: &'static str,
    ) -> Error {
        Error { kind: ErrorKind::InvalidValue { what, found } }
    }

    pub(crate) fn invalid_runtime_position(position: i64) -> Error {
        Error { kind: ErrorKind::InvalidRuntimePosition { position } }
    }

    pub(crate) fn host(err: HostError) -> Error {
        Error { kind: ErrorKind::Host(err) }
    }

    pub(crate) fn open() -> Error {
        Error { kind: ErrorKind::OpenError }
    }

    pub(crate) fn close() -> Error {
        Error { kind: ErrorKind::CloseError }
    }

    pub(crate) fn full_capture() -> Error {
        Error { kind: ErrorKind::FullCaptureError }
    }

    pub(crate) fn nesting_too_deep(limit: usize) -> Error {
        Error { kind: ErrorKind::NestingTooDeep { limit } }
    }

    pub(crate) fn invalid_name(found: &'static str) -> Error {
        Error { kind: ErrorKind::InvalidName { found } }
    }

    pub(crate) fn encoding_overflow(what: &'static str) -> Error {
        Error { kind: ErrorKind::EncodingOverflow { what } }
    }

    pub(crate) fn unknown_encoding(name: &str) -> Error {
        Error { kind: ErrorKind::UnknownEncoding { name: name.to_string() } }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self.kind {
            ErrorKind::Host(ref err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::InvalidProgram { pc: Some(pc), msg } => {
                write!(f, "invalid program at instruction {}: {}", pc, msg)
            }
            ErrorKind::InvalidProgram { pc: None, msg } => {
                write!(f, "invalid program: {}", msg)
            }
            ErrorKind::StackOverflow { limit } => write!(
                f,
                "backtrack stack overflow (current limit is {})",
                limit,
            ),
            ErrorKind::TooManyCaptures { limit } => {
                write!(f, "too many captures (current limit is {})", limit)
            }
            ErrorKind::BufferTooLarge { requested } => write!(
                f,
                "not enough memory for buffer expansion to {} bytes",
                requested,
            ),
            ErrorKind::InvalidCaptureKind { kind } => {
                write!(f, "invalid capture kind {:?}", kind)
            }
            ErrorKind::AbsentArgument { index } => {
                write!(f, "reference to absent extra argument #{}", index)
            }
            ErrorKind::BackrefNotFound { ref name } => {
                write!(f, "back reference '{}' not found", name)
            }
            ErrorKind::NoFoldInitialValue => {
                write!(f, "no initial value for fold capture")
            }
            ErrorKind::NoCapture { index } => {
                write!(f, "no capture '{}'", index)
            }
            ErrorKind::InvalidCaptureIndex { index } => {
                write!(f, "invalid capture index ({})", index)
            }
            ErrorKind::NoValuesInCapture { index } => {
                write!(f, "no values in capture index {}", index)
            }
            ErrorKind::InvalidValue { what, found } => {
                write!(f, "invalid {} value (a {})", what, found)
            }
            ErrorKind::InvalidRuntimePosition { position } => write!(
                f,
                "invalid position {} returned by match-time capture",
                position,
            ),
            ErrorKind::Host(_) => write!(f, "error in host function"),
            ErrorKind::OpenError => {
                write!(f, "open capture error in match encoding")
            }
            ErrorKind::CloseError => {
                write!(f, "close capture error in match encoding")
            }
            ErrorKind::FullCaptureError => {
                write!(f, "full capture error in match encoding")
            }
            ErrorKind::NestingTooDeep { limit } => write!(
                f,
                "max pattern nesting depth exceeded (limit is {})",
                limit,
            ),
            ErrorKind::InvalidName { found } => {
                write!(f, "invalid capture name (a {})", found)
            }
            ErrorKind::EncodingOverflow { what } => {
                write!(f, "{} too large for match encoding", what)
            }
            ErrorKind::UnknownEncoding { ref name } => {
                write!(f, "invalid encoding type '{}'", name)
            }
        }
    }
}
