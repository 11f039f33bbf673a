use std::io;

use thiserror::Error;

use crate::protocol::Codec;

/// Why a frame or datagram failed to decode.
///
/// These are pure codec errors; i/o failures on the reader entry points are
/// reported separately through [`StreamError`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The input ended before the declared frame length was delivered.
    #[error("input ended before the declared frame length was delivered")]
    ShortRead,
    /// The four leading bytes of a TCP frame were not zero.
    #[error("frame preamble is not zero")]
    BadPreamble,
    /// The declared data length is zero or exceeds what the caller allows.
    #[error("declared data length {0} is out of range")]
    SizeOutOfRange(u32),
    /// The first byte of the data field is not a supported codec id.
    #[error("unknown codec id {0:#04x}")]
    UnknownCodec(u8),
    /// Leading and trailing record, message or element counts differ.
    #[error("leading count {leading} does not match trailing count {trailing}")]
    CountMismatch { leading: u16, trailing: u16 },
    /// The CRC trailer mismatched, or its high 16 bits were non-zero.
    #[error("crc trailer {received:#010x} does not match computed {computed:#06x}")]
    BadCrc { received: u32, computed: u16 },
    /// A record priority byte outside 0..=2.
    #[error("invalid record priority {0}")]
    BadPriority(u8),
    /// The handshake length prefix is zero or implausibly large.
    #[error("handshake length prefix is inconsistent")]
    ShortImei,
    /// An IMEI field that is not plain ASCII digits.
    #[error("imei is not 15 ascii digits")]
    BadImei,
    /// A GPRS message length too small for its codec's fixed fields.
    #[error("message of {len} bytes is too short for {codec:?}")]
    ShortMessage { codec: Codec, len: u32 },
    /// GPRS message text that is not valid UTF-8.
    #[error("message text is not valid utf-8")]
    BadText,
    /// The caller-provided buffer cannot hold the announced frame.
    #[error("buffer of {available} bytes cannot hold a frame of {needed} bytes")]
    BufferTooSmall { needed: usize, available: usize },
    /// A structurally invalid frame not covered by a more specific kind.
    #[error("malformed frame")]
    Malformed,
}

impl<I> nom::error::ParseError<I> for DecodeError {
    fn from_error_kind(_input: I, kind: nom::error::ErrorKind) -> Self {
        if kind == nom::error::ErrorKind::Eof {
            DecodeError::ShortRead
        } else {
            DecodeError::Malformed
        }
    }

    fn append(_input: I, _kind: nom::error::ErrorKind, other: Self) -> Self {
        other
    }
}

impl From<nom::Err<DecodeError>> for DecodeError {
    fn from(error: nom::Err<DecodeError>) -> Self {
        match error {
            nom::Err::Incomplete(_) => DecodeError::ShortRead,
            nom::Err::Error(e) | nom::Err::Failure(e) => e,
        }
    }
}

/// Why a packet could not be serialised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// An element value whose width only the codec 8E variable group could
    /// carry, on a codec without that group.
    #[error("{codec:?} cannot carry a {len}-byte io element value")]
    ElementLength { codec: Codec, len: usize },
    /// An event or element id above 255 on codec 8, whose ids are one byte.
    #[error("{codec:?} id {id} does not fit in one byte")]
    IdRange { codec: Codec, id: u16 },
    /// More elements than the codec's count field can express.
    #[error("too many io elements for one {0:?} record")]
    TooManyElements(Codec),
    /// More than 255 records or messages in one frame.
    #[error("too many records or messages for one frame")]
    TooManyEntries,
    /// A timestamp outside what the wire field can carry.
    #[error("timestamp is outside the encodable range")]
    TimestampRange,
    /// Codecs 14 and 15 address a device; the message had no IMEI.
    #[error("{0:?} messages require an imei")]
    MissingImei(Codec),
    /// An IMEI that is not exactly 15 ASCII digits.
    #[error("imei must be 15 ascii digits")]
    BadImei,
    /// Codecs 13 and 15 are timestamped; the message had no timestamp.
    #[error("{0:?} messages require a timestamp")]
    MissingTimestamp(Codec),
    /// Records on a GPRS codec, or messages on a telemetry codec.
    #[error("{codec:?} frames cannot carry {content}")]
    Payload {
        codec: Codec,
        content: &'static str,
    },
    /// The encoded frame exceeds its length prefix.
    #[error("encoded frame exceeds the length prefix")]
    FrameTooLarge,
}

/// Errors surfaced by the [`TeltonikaStream`](crate::TeltonikaStream)
/// read/write methods.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream i/o failed")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl StreamError {
    /// True when the underlying read or write deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            StreamError::Io(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
        )
    }
}

/// Errors surfaced by [`Hub::send`](crate::Hub::send).
#[derive(Debug, Error)]
pub enum SendError {
    /// No identified session holds that IMEI.
    #[error("no identified session for imei {0}")]
    NoSuchDevice(String),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    /// The session's write deadline elapsed.
    #[error("write deadline elapsed")]
    Timeout,
    /// The connection write failed; the session is closing.
    #[error("connection write failed")]
    Write(#[source] io::Error),
}
