
//! Error type definitions.

use std::borrow::Cow;
use std::io::ErrorKind;
pub use std::io::Error as IoError;
pub use std::io::Result as IoResult;
use std::convert::TryFrom;
use std::error;
use std::fmt;

/// A result that may contain an exr error.
pub type Result<T> = std::result::Result<T, Error>;

/// A result that, if ok, contains nothing, and otherwise contains an exr error.
pub type UnitResult = Result<()>;


/// An error that may happen while writing an exr file.
/// The variant tells whether the caller, the data, or the environment is to blame.
#[derive(Debug)]
pub enum Error {

    /// The header, the frame buffer or the options do not fit together.
    /// For example, a frame buffer slice has another sample type than the file channel.
    Configuration(Cow<'static, str>),

    /// An operation was called at the wrong point in the life of the file,
    /// for example writing more scan lines than the data window contains.
    Sequence(Cow<'static, str>),

    /// The contents of a file or of a header value are not valid.
    Invalid(Cow<'static, str>),

    /// The requested feature is not supported by this library.
    NotSupported(Cow<'static, str>),

    /// An internal invariant did not hold.
    Logic(Cow<'static, str>),

    /// A file system or stream error occurred.
    Io(IoError),
}


impl Error {

    /// Create an error of the variant `Configuration`.
    pub(crate) fn configuration(message: impl Into<Cow<'static, str>>) -> Self {
        Error::Configuration(message.into())
    }

    /// Create an error of the variant `Sequence`.
    pub(crate) fn sequence(message: impl Into<Cow<'static, str>>) -> Self {
        Error::Sequence(message.into())
    }

    /// Create an error of the variant `Invalid`.
    pub(crate) fn invalid(message: impl Into<Cow<'static, str>>) -> Self {
        Error::Invalid(message.into())
    }

    /// Create an error of the variant `NotSupported`.
    pub(crate) fn unsupported(message: impl Into<Cow<'static, str>>) -> Self {
        Error::NotSupported(message.into())
    }

    /// Create an error of the variant `Logic`.
    pub(crate) fn logic(message: impl Into<Cow<'static, str>>) -> Self {
        Error::Logic(message.into())
    }

    /// Prefix the message of this error with some context,
    /// usually the operation and the name of the file.
    /// Keeps the variant, and for io errors, keeps the error kind.
    pub fn with_context(self, context: impl fmt::Display) -> Self {
        let prefix = |message: Cow<'static, str>| -> Cow<'static, str> {
            Cow::Owned(format!("{}: {}", context, message))
        };

        match self {
            Error::Configuration(message) => Error::Configuration(prefix(message)),
            Error::Sequence(message) => Error::Sequence(prefix(message)),
            Error::Invalid(message) => Error::Invalid(prefix(message)),
            Error::NotSupported(message) => Error::NotSupported(prefix(message)),
            Error::Logic(message) => Error::Logic(prefix(message)),
            Error::Io(io) => Error::Io(IoError::new(io.kind(), format!("{}: {}", context, io))),
        }
    }

    /// Turn this error into an io error with the same message.
    /// Io errors are returned unchanged.
    pub(crate) fn into_io(self) -> Self {
        match self {
            Error::Io(io) => Error::Io(io),
            other => Error::Io(IoError::new(ErrorKind::Other, other.to_string())),
        }
    }

    /// Returns whether this error was caused by calling operations in the wrong order.
    pub fn is_sequence_error(&self) -> bool {
        matches!(self, Error::Sequence(_))
    }

    /// Returns whether this error was caused by an incompatible configuration.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}

/// Enable using the `?` operator on `std::io::Result`.
impl From<IoError> for Error {
    fn from(error: IoError) -> Self {
        if error.kind() == ErrorKind::UnexpectedEof {
            Error::invalid("reference to missing bytes")
        }
        else {
            Error::Io(error)
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => err.fmt(formatter),
            Error::Configuration(message) => write!(formatter, "incompatible configuration: {}", message),
            Error::Sequence(message) => write!(formatter, "invalid call sequence: {}", message),
            Error::Invalid(message) => write!(formatter, "invalid {}", message),
            Error::NotSupported(message) => write!(formatter, "not supported: {}", message),
            Error::Logic(message) => write!(formatter, "internal logic error: {}", message),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

/// Return error on invalid range.
#[inline]
pub(crate) fn i32_to_usize(value: i32, error_message: &'static str) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::invalid(error_message))
}

/// Return error on invalid range.
#[inline]
pub(crate) fn usize_to_i32(value: usize, error_message: &'static str) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::invalid(error_message))
}

/// Panics on overflow.
#[inline]
pub(crate) fn usize_to_u64(value: usize) -> u64 {
    u64::try_from(value).expect("(usize as u64) overflowed")
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn context_keeps_variant_and_io_kind(){
        let sequence = Error::sequence("too many lines").with_context("image.exr");
        assert!(sequence.is_sequence_error());
        assert_eq!(sequence.to_string(), "invalid call sequence: image.exr: too many lines");

        let io = Error::from(IoError::new(ErrorKind::PermissionDenied, "denied"))
            .with_context("cannot open \"image.exr\"");

        match io {
            Error::Io(io) => {
                assert_eq!(io.kind(), ErrorKind::PermissionDenied);
                assert_eq!(io.to_string(), "cannot open \"image.exr\": denied");
            },
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn io_conversion_keeps_the_message(){
        match Error::unsupported("pxr24").with_context("channel \"Y\"").into_io() {
            Error::Io(io) => {
                assert_eq!(io.kind(), ErrorKind::Other);
                assert_eq!(io.to_string(), "not supported: channel \"Y\": pxr24");
            },
            other => panic!("unexpected error {:?}", other),
        }

        match Error::Io(IoError::new(ErrorKind::WriteZero, "full")).into_io() {
            Error::Io(io) => assert_eq!(io.kind(), ErrorKind::WriteZero),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn unexpected_end_of_file_is_invalid_data(){
        let eof = Error::from(IoError::new(ErrorKind::UnexpectedEof, "eof"));
        assert!(matches!(eof, Error::Invalid(_)));
    }
}
