use std::io;
use std::string::FromUtf8Error;

use nom::error::{ErrorKind, FromExternalError, ParseError};
use thiserror::Error;

/// Errors raised while encoding, decoding, framing, matching or
/// transporting OSC packets.
#[derive(Debug, Error)]
pub enum OscError {
    /// A primitive argument could not be read or written: missing string
    /// terminator or padding, blob length past the end of the buffer,
    /// a truncated integer or float, or invalid UTF-8.
    #[error("malformed value: {0}")]
    MalformedValue(String),
    /// The type-tag string contains a character outside `ifsbtTFNI`.
    #[error("unknown type tag '{0}'")]
    UnknownTypeTag(char),
    /// The buffer starts with neither `/` nor `#bundle\0`.
    #[error("unknown packet: {0}")]
    UnknownPacket(&'static str),
    /// Bundles nested past the recursion bound.
    #[error("bundle nested too deeply")]
    BundleTooDeep,
    /// A SLIP escape byte was followed by something other than
    /// `ESC_END` or `ESC_ESC`.
    #[error("bad SLIP escape byte 0x{0:02X}")]
    BadEscape(u8),
    /// A SLIP frame grew past the configured cap before its END byte
    /// arrived.
    #[error("frame exceeds {0} bytes")]
    FrameTooLarge(usize),
    /// An address pattern failed to compile.
    #[error("illegal address pattern: {0}")]
    IllegalPattern(String),
    /// An out-of-order handshake message, a malformed handshake
    /// payload, or a frame that failed authentication.
    #[error("protocol error: {0}")]
    ProtocolError(&'static str),
    /// The peer spoke an encryption protocol version we do not know.
    #[error("unsupported encryption protocol version {0}")]
    UnsupportedProtocol(i32),
    /// The peer did not advance the handshake within the deadline.
    #[error("encryption handshake timed out")]
    HandshakeTimeout,
    #[error("transport: {0}")]
    Transport(#[from] io::Error),
}

impl From<FromUtf8Error> for OscError {
    fn from(err: FromUtf8Error) -> Self {
        OscError::MalformedValue(format!("string is not valid UTF-8: {err}"))
    }
}

impl<I> ParseError<I> for OscError {
    fn from_error_kind(_input: I, kind: ErrorKind) -> Self {
        OscError::MalformedValue(format!("read failed in {}", kind.description()))
    }

    fn append(_input: I, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

impl<I> FromExternalError<I, OscError> for OscError {
    fn from_external_error(_input: I, _kind: ErrorKind, e: OscError) -> Self {
        e
    }
}

impl<I> FromExternalError<I, FromUtf8Error> for OscError {
    fn from_external_error(_input: I, _kind: ErrorKind, e: FromUtf8Error) -> Self {
        e.into()
    }
}
