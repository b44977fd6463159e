//! Error management module

use std::fmt;
use std::str::Utf8Error;

/// An error produced by an operation of the analyzer or one of its
/// segmenters.
#[derive(Debug)]
pub enum Error {
    /// A caller supplied a malformed argument: an empty required field, an
    /// out-of-range id or an expression that is not valid for the target
    /// segmenter.
    InvalidArgument(String),
    /// An operation was called out of order, for example a mutation of a
    /// configuration after the first context has been created or `put_input`
    /// after a chunk already declared the end of input.
    OperationOrder(String),
    /// A reference to a feature, field type or function that has not been
    /// defined.
    UnknownIdentifier(String),
    /// The character set of the input is not in the supported list.
    UnsupportedEncoding(String),
    /// The input document is malformed. The payload is a byte offset into
    /// the source where the problem was detected.
    BadDocument(u64, String),
    /// A selection expression could not be compiled. The payload is a
    /// one-based byte position into the expression string.
    BadExpression(usize, String),
    /// A configured limit was exceeded (feature count, sub-document count,
    /// nesting depth).
    LimitExceeded(String),
    /// The operation is valid for some segmenter variants but not for the
    /// one it was called on.
    NotImplemented(String),
    /// A byte sequence could not be decoded with the detected or declared
    /// character set.
    NonDecodable(Option<Utf8Error>),
}

/// A specialized `Result` type where the error is hard-wired to [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Error::OperationOrder(msg) => write!(f, "operation called out of order: {}", msg),
            Error::UnknownIdentifier(msg) => write!(f, "unknown identifier: {}", msg),
            Error::UnsupportedEncoding(name) => {
                write!(f, "unsupported character set encoding '{}'", name)
            }
            Error::BadDocument(pos, msg) => {
                write!(f, "malformed document at byte {}: {}", pos, msg)
            }
            Error::BadExpression(pos, msg) => {
                write!(f, "error in selection expression at position {}: {}", pos, msg)
            }
            Error::LimitExceeded(msg) => write!(f, "limit exceeded: {}", msg),
            Error::NotImplemented(msg) => write!(f, "not implemented: {}", msg),
            Error::NonDecodable(Some(err)) => write!(f, "malformed input: {}", err),
            Error::NonDecodable(None) => write!(f, "malformed input: input is not valid in the declared encoding"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::NonDecodable(Some(err)) => Some(err),
            _ => None,
        }
    }
}

impl From<Utf8Error> for Error {
    /// Creates a new `Error::NonDecodable` from the given error
    #[inline]
    fn from(error: Utf8Error) -> Error {
        Error::NonDecodable(Some(error))
    }
}
