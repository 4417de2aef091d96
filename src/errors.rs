use std::error::Error;
use std::fmt;
use std::io;
use std::string::FromUtf8Error;

use nom::error::{ErrorKind, FromExternalError, ParseError};

/// Errors raised by the codec, the transport link, the sender and the
/// receiver. Decode failures carry enough context to tell a truncated
/// packet from an ill-structured one; runtime failures map one-to-one
/// onto the operation that rejected them.
#[derive(Debug)]
pub enum OscError {
    /// A packet that is empty or whose first byte is neither `/` nor `#`.
    BadPacket(&'static str),
    /// A message whose type-tag string or argument data is ill-formed.
    BadMessage(&'static str),
    /// A bundle with a wrong specifier, truncated child, or bad layout.
    BadBundle(String),
    /// An OSC string without terminator or with a short padding span.
    BadString(&'static str),
    /// An argument value that cannot be represented, e.g. a non-char u32.
    BadArg(String),
    /// A type tag the active dialect does not know how to decode or encode.
    UnsupportedTag(char),
    /// An OSC string that is not valid UTF-8.
    StringError(FromUtf8Error),
    /// A low-level read failure inside a parser combinator.
    ReadError(ErrorKind),
    /// An address that violates the OSC address grammar.
    BadAddress(String),
    /// An address pattern that could not be compiled.
    BadAddressPattern(String),
    /// Operation not allowed in the current link or sender state.
    WrongMode(&'static str),
    /// Packet larger than the configured maximum.
    Oversize { size: usize, max: usize },
    /// A required parameter was absent.
    MissingArg(&'static str),
    /// The host OS reported a socket failure.
    Io(io::Error),
    /// A user handler panicked; the payload is its panic message.
    HandlerPanic(String),
}

impl fmt::Display for OscError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OscError::BadPacket(msg) => write!(f, "bad OSC packet: {}", msg),
            OscError::BadMessage(msg) => write!(f, "bad OSC message: {}", msg),
            OscError::BadBundle(msg) => write!(f, "bad OSC bundle: {}", msg),
            OscError::BadString(msg) => write!(f, "bad OSC string: {}", msg),
            OscError::BadArg(msg) => write!(f, "bad OSC argument: {}", msg),
            OscError::UnsupportedTag(tag) => {
                write!(f, "type tag {:?} is not supported by this dialect", tag)
            }
            OscError::StringError(err) => write!(f, "reading OSC string as utf-8: {}", err),
            OscError::ReadError(kind) => write!(f, "error reading from buffer: {:?}", kind),
            OscError::BadAddress(msg) => write!(f, "bad OSC address: {}", msg),
            OscError::BadAddressPattern(msg) => write!(f, "bad OSC address pattern: {}", msg),
            OscError::WrongMode(msg) => write!(f, "operation not allowed in this state: {}", msg),
            OscError::Oversize { size, max } => {
                write!(f, "packet of {} bytes exceeds maximum of {}", size, max)
            }
            OscError::MissingArg(what) => write!(f, "required parameter missing: {}", what),
            OscError::Io(err) => write!(f, "socket error: {}", err),
            OscError::HandlerPanic(msg) => write!(f, "handler panicked: {}", msg),
        }
    }
}

impl Error for OscError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            OscError::StringError(err) => Some(err),
            OscError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for OscError {
    fn from(err: io::Error) -> Self {
        OscError::Io(err)
    }
}

impl<I> ParseError<I> for OscError {
    fn from_error_kind(_input: I, kind: ErrorKind) -> Self {
        OscError::ReadError(kind)
    }

    fn append(_input: I, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

impl<I> FromExternalError<I, OscError> for OscError {
    fn from_external_error(_input: I, _kind: ErrorKind, err: OscError) -> Self {
        err
    }
}

impl OscError {
    /// Unwrap the payload of a `nom::Err`; the crate's parsers only ever
    /// carry `OscError`.
    pub(crate) fn from_nom(err: nom::Err<OscError>) -> OscError {
        match err {
            nom::Err::Error(e) | nom::Err::Failure(e) => e,
            nom::Err::Incomplete(_) => OscError::BadPacket("unexpected end of input"),
        }
    }
}
