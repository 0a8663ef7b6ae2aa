use crate::protocol::ServerError;
use thiserror::Error;

/// A list specifying categories of [`BdocError`](crate::BdocError).
///
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BdocError {
    /// Erroneous caller input, e.g. an empty address list or a malformed
    /// address string.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The connector (or one of its pools) was used after `close()`.
    #[error("Used after close")]
    Closed,

    /// Error occured in communication with the database.
    #[error("Error occured in communication with the database")]
    Network {
        /// The causing Error.
        #[source]
        source: std::io::Error,
        /// True if redispatch attempts were consumed before giving up.
        retried: bool,
    },

    /// A port could not be authenticated for a database.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The replica set kept refusing writes after all redispatch attempts.
    #[error("No primary accepted the operation after all redispatch attempts")]
    NotMasterExhausted,

    /// The server acknowledged a write with a duplicate-key violation.
    #[error("Duplicate key: {message}")]
    DuplicateKey {
        /// Server error code (11000 or 11001).
        code: i32,
        /// Server error message.
        message: String,
    },

    /// The server acknowledged a write with an error other than duplicate-key.
    #[error("Write failed with code {code}: {message}")]
    WriteFailure {
        /// Server error code.
        code: i32,
        /// Server error message.
        message: String,
    },

    /// Database server responded with an error;
    /// the contained `ServerError` describes the concrete reason.
    #[error("Database server responded with an error")]
    Db {
        /// The causing Error.
        #[from]
        source: ServerError,
    },

    /// An inbound BDOC document could not be decoded.
    #[error("Error occured while decoding a BDOC document")]
    Decode {
        /// The causing Error.
        #[from]
        source: DecodeError,
    },

    /// Implementation error.
    #[error("Implementation error: {}", _0)]
    Impl(&'static str),

    /// Implementation error.
    #[error("Implementation error: {}", _0)]
    ImplDetailed(String),

    /// Error occured in thread synchronization.
    #[error("Error occured in thread synchronization")]
    Poison,
}

/// Abbreviation of `Result<T, BdocError>`.
pub type BdocResult<T> = std::result::Result<T, BdocError>;

impl BdocError {
    /// Returns the contained `ServerError`, if any.
    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            Self::Db {
                source: server_error,
            } => Some(server_error),
            _ => None,
        }
    }

    /// True for errors that indicate a broken wire connection: the port they
    /// occured on must be fenced and the operation may be redispatched.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
            || matches!(
                self,
                Self::Decode {
                    source: DecodeError::Io { .. } | DecodeError::UnexpectedEof
                }
            )
    }

    // Normalizes a network-ish error into `Network`, recording whether
    // redispatch attempts were consumed.
    pub(crate) fn into_network(self, retried: bool) -> Self {
        match self {
            Self::Network { source, .. } => Self::Network { source, retried },
            Self::Decode { source }
                if matches!(source, DecodeError::Io { .. } | DecodeError::UnexpectedEof) =>
            {
                Self::Network {
                    source: std::io::Error::other(source),
                    retried,
                }
            }
            other => other,
        }
    }
}

impl<G> From<std::sync::PoisonError<G>> for BdocError {
    fn from(_error: std::sync::PoisonError<G>) -> Self {
        Self::Poison
    }
}

/// Why a BDOC document could not be decoded. Decode errors are never
/// recoverable; the surrounding connection is unusable afterwards.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DecodeError {
    /// The byte source ended inside a document.
    #[error("Unexpected end of input inside a BDOC document")]
    UnexpectedEof,

    /// An element carried a type byte that is not part of the format.
    #[error("Unsupported element type 0x{type_byte:02x} for element \"{name}\"")]
    UnsupportedType {
        /// The offending type byte.
        type_byte: u8,
        /// Name of the element it was read for.
        name: String,
    },

    /// A length field was negative, too large, or inconsistent with the
    /// enclosing frame.
    #[error("Bad length field: {0}")]
    BadLength(String),

    /// A binary element violated the rules of its subtype.
    #[error("Bad binary element of subtype 0x{subtype:02x}: {detail}")]
    BadBinarySubtype {
        /// The subtype byte.
        subtype: u8,
        /// What was inconsistent.
        detail: String,
    },

    /// A string element did not hold valid UTF-8.
    #[error("Element is not valid UTF-8")]
    Utf8 {
        /// The causing Error.
        #[from]
        source: std::str::Utf8Error,
    },

    /// The underlying byte source failed.
    #[error(transparent)]
    Io {
        /// The causing Error.
        #[from]
        source: std::io::Error,
    },
}

/// Shorthand for [`BdocError::ImplDetailed`] with format-string arguments.
#[macro_export]
macro_rules! impl_err {
    ($($arg:tt)*) => {
        $crate::BdocError::ImplDetailed(format!($($arg)*))
    };
}

/// Shorthand for [`BdocError::InvalidArgument`] with format-string arguments.
#[macro_export]
macro_rules! usage_err {
    ($($arg:tt)*) => {
        $crate::BdocError::InvalidArgument(format!($($arg)*))
    };
}
