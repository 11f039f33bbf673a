use std::io::{self, Read, Write};

#[cfg(feature = "tokio")]
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::{
    encoder,
    error::{DecodeError, StreamError},
    parser,
    protocol::{Datagram, Packet},
    DecodeConfig,
};

// Handshake frames announcing more than this are junk, not an IMEI.
const MAX_IMEI_LEN: usize = 64;

/// A wrapper around a device connection for reading and writing Teltonika
/// GPS module data.
///
/// Reads learn each frame's size from its fixed header and then read exactly
/// that many bytes, so a `TeltonikaStream` never consumes past the frame it
/// returns.
pub struct TeltonikaStream<S> {
    inner: S,
    config: DecodeConfig,
}

impl<S> TeltonikaStream<S> {
    /// Creates a new [`TeltonikaStream`] from an existing connection.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            config: DecodeConfig::default(),
        }
    }

    /// Creates a new [`TeltonikaStream`] with explicit decode options.
    pub fn with_config(inner: S, config: DecodeConfig) -> Self {
        Self { inner, config }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}

fn short_read(error: io::Error) -> StreamError {
    if error.kind() == io::ErrorKind::UnexpectedEof {
        StreamError::Decode(DecodeError::ShortRead)
    } else {
        StreamError::Io(error)
    }
}

fn tcp_data_length(header: [u8; 8]) -> Result<usize, DecodeError> {
    let preamble = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    let data_length = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    if preamble != 0 {
        return Err(DecodeError::BadPreamble);
    }
    if data_length == 0 {
        return Err(DecodeError::SizeOutOfRange(0));
    }
    Ok(data_length as usize)
}

impl<S: Read> TeltonikaStream<S> {
    /// Reads the IMEI (International Mobile Equipment Identity) handshake
    /// frame and returns the IMEI as a string.
    ///
    /// # Errors
    ///
    /// [`DecodeError::ShortImei`] when the length prefix is zero or
    /// implausibly large and [`DecodeError::BadImei`] when the payload is
    /// not text; i/o failures surface as [`StreamError::Io`].
    pub fn read_imei(&mut self) -> Result<String, StreamError> {
        let mut prefix = [0u8; 2];
        self.inner.read_exact(&mut prefix)?;
        let length = usize::from(u16::from_be_bytes(prefix));
        if length == 0 || length > MAX_IMEI_LEN {
            return Err(DecodeError::ShortImei.into());
        }
        let mut imei = vec![0u8; length];
        self.inner.read_exact(&mut imei).map_err(short_read)?;
        String::from_utf8(imei).map_err(|_| DecodeError::BadImei.into())
    }

    /// Reads one complete TCP frame, buffering it in an owned allocation of
    /// exactly the advertised size.
    ///
    /// Element values are always copied on this path; use
    /// [`read_frame_buf`](Self::read_frame_buf) to borrow them from a
    /// caller-owned buffer instead.
    pub fn read_frame(&mut self) -> Result<Packet<'static>, StreamError> {
        let mut header = [0u8; 8];
        self.inner.read_exact(&mut header)?;
        let data_length = tcp_data_length(header)?;
        let mut frame = vec![0u8; 8 + data_length + 4];
        frame[..8].copy_from_slice(&header);
        self.inner.read_exact(&mut frame[8..]).map_err(short_read)?;
        let (_, packet) = parser::decode_tcp(&frame, self.config)?;
        Ok(packet.into_owned())
    }

    /// Reads one complete TCP frame into `buf`, refusing frames that do not
    /// fit ([`DecodeError::BufferTooSmall`]).
    ///
    /// Returns the frame length and the packet; under
    /// [`IoElementAlloc::OnReadBuffer`](crate::IoElementAlloc::OnReadBuffer)
    /// element values borrow from `buf` and live no longer than it.
    pub fn read_frame_buf<'a>(
        &mut self,
        buf: &'a mut [u8],
    ) -> Result<(usize, Packet<'a>), StreamError> {
        if buf.len() < 12 {
            return Err(DecodeError::BufferTooSmall {
                needed: 12,
                available: buf.len(),
            }
            .into());
        }
        self.inner.read_exact(&mut buf[..8])?;
        let data_length = tcp_data_length([
            buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
        ])?;
        let total = 8 + data_length + 4;
        if buf.len() < total {
            return Err(DecodeError::BufferTooSmall {
                needed: total,
                available: buf.len(),
            }
            .into());
        }
        self.inner
            .read_exact(&mut buf[8..total])
            .map_err(short_read)?;
        let (consumed, packet) = parser::decode_tcp(&buf[..total], self.config)?;
        Ok((consumed, packet))
    }

    /// Reads one complete UDP channel datagram, buffering it in an owned
    /// allocation of exactly the advertised size.
    pub fn read_datagram(&mut self) -> Result<Datagram<'static>, StreamError> {
        let mut prefix = [0u8; 2];
        self.inner.read_exact(&mut prefix)?;
        let payload_length = usize::from(u16::from_be_bytes(prefix));
        if payload_length == 0 {
            return Err(DecodeError::SizeOutOfRange(0).into());
        }
        let mut datagram = vec![0u8; 2 + payload_length];
        datagram[..2].copy_from_slice(&prefix);
        self.inner
            .read_exact(&mut datagram[2..])
            .map_err(short_read)?;
        let (_, datagram) = parser::decode_udp(&datagram, self.config)?;
        Ok(datagram.into_owned())
    }

    /// Reads one complete UDP channel datagram into `buf`, refusing
    /// datagrams that do not fit.
    pub fn read_datagram_buf<'a>(
        &mut self,
        buf: &'a mut [u8],
    ) -> Result<(usize, Datagram<'a>), StreamError> {
        if buf.len() < 2 {
            return Err(DecodeError::BufferTooSmall {
                needed: 2,
                available: buf.len(),
            }
            .into());
        }
        self.inner.read_exact(&mut buf[..2])?;
        let payload_length = usize::from(u16::from_be_bytes([buf[0], buf[1]]));
        if payload_length == 0 {
            return Err(DecodeError::SizeOutOfRange(0).into());
        }
        let total = 2 + payload_length;
        if buf.len() < total {
            return Err(DecodeError::BufferTooSmall {
                needed: total,
                available: buf.len(),
            }
            .into());
        }
        self.inner
            .read_exact(&mut buf[2..total])
            .map_err(short_read)?;
        let (consumed, datagram) = parser::decode_udp(&buf[..total], self.config)?;
        Ok((consumed, datagram))
    }
}

impl<S: Write> TeltonikaStream<S> {
    /// Writes an IMEI approval signal to the stream.
    pub fn write_imei_approval(&mut self) -> io::Result<()> {
        self.inner.write_all(&[0x01])?;
        self.inner.flush()
    }

    /// Writes an IMEI denial signal to the stream.
    pub fn write_imei_denial(&mut self) -> io::Result<()> {
        self.inner.write_all(&[0x00])?;
        self.inner.flush()
    }

    /// Writes a frame ACK (acknowledgment) to the stream.
    /// If `frame` is `None`, writes a zero value.
    pub fn write_frame_ack(&mut self, frame: Option<&Packet<'_>>) -> io::Result<()> {
        let ack = encoder::encode_tcp_ack(frame.map_or(0, |f| f.records.len() as u32));
        self.inner.write_all(&ack)?;
        self.inner.flush()
    }

    /// Writes a datagram ACK echoing the channel ids back to the device.
    /// If `datagram` is `None`, writes a zeroed acknowledgement.
    pub fn write_datagram_ack(&mut self, datagram: Option<&Datagram<'_>>) -> io::Result<()> {
        let ack = match datagram {
            Some(d) => {
                encoder::encode_udp_ack(d.packet_id, d.avl_packet_id, d.packet.records.len() as u8)
            }
            None => encoder::encode_udp_ack(0, 0, 0),
        };
        self.inner.write_all(&ack)?;
        self.inner.flush()
    }

    /// Encodes `packet` as a TCP frame and writes it out.
    pub fn write_packet(&mut self, packet: &Packet<'_>) -> Result<(), StreamError> {
        let frame = encoder::encode_packet_tcp(packet)?;
        self.inner.write_all(&frame)?;
        self.inner.flush()?;
        Ok(())
    }

    /// Sends `text` to the device as a codec 12 command frame.
    pub fn write_command(&mut self, text: &str) -> Result<(), StreamError> {
        self.write_packet(&Packet::command(text))
    }
}

#[cfg(feature = "tokio")]
impl<S: AsyncReadExt + Unpin> TeltonikaStream<S> {
    /// Async mirror of [`read_imei`](Self::read_imei).
    pub async fn read_imei_async(&mut self) -> Result<String, StreamError> {
        let mut prefix = [0u8; 2];
        self.inner.read_exact(&mut prefix).await?;
        let length = usize::from(u16::from_be_bytes(prefix));
        if length == 0 || length > MAX_IMEI_LEN {
            return Err(DecodeError::ShortImei.into());
        }
        let mut imei = vec![0u8; length];
        self.inner.read_exact(&mut imei).await.map_err(short_read)?;
        String::from_utf8(imei).map_err(|_| DecodeError::BadImei.into())
    }

    /// Async mirror of [`read_frame`](Self::read_frame).
    pub async fn read_frame_async(&mut self) -> Result<Packet<'static>, StreamError> {
        let mut header = [0u8; 8];
        self.inner.read_exact(&mut header).await?;
        let data_length = tcp_data_length(header)?;
        let mut frame = vec![0u8; 8 + data_length + 4];
        frame[..8].copy_from_slice(&header);
        self.inner
            .read_exact(&mut frame[8..])
            .await
            .map_err(short_read)?;
        let (_, packet) = parser::decode_tcp(&frame, self.config)?;
        Ok(packet.into_owned())
    }

    /// Async mirror of [`read_datagram`](Self::read_datagram).
    pub async fn read_datagram_async(&mut self) -> Result<Datagram<'static>, StreamError> {
        let mut prefix = [0u8; 2];
        self.inner.read_exact(&mut prefix).await?;
        let payload_length = usize::from(u16::from_be_bytes(prefix));
        if payload_length == 0 {
            return Err(DecodeError::SizeOutOfRange(0).into());
        }
        let mut datagram = vec![0u8; 2 + payload_length];
        datagram[..2].copy_from_slice(&prefix);
        self.inner
            .read_exact(&mut datagram[2..])
            .await
            .map_err(short_read)?;
        let (_, datagram) = parser::decode_udp(&datagram, self.config)?;
        Ok(datagram.into_owned())
    }
}

#[cfg(feature = "tokio")]
impl<S: AsyncWriteExt + Unpin> TeltonikaStream<S> {
    /// Writes an IMEI approval signal to the stream.
    pub async fn write_imei_approval_async(&mut self) -> io::Result<()> {
        self.inner.write_all(&[0x01]).await?;
        self.inner.flush().await
    }

    /// Writes an IMEI denial signal to the stream.
    pub async fn write_imei_denial_async(&mut self) -> io::Result<()> {
        self.inner.write_all(&[0x00]).await?;
        self.inner.flush().await
    }

    /// Writes a frame ACK (acknowledgment) to the stream.
    /// If `frame` is `None`, writes a zero value.
    pub async fn write_frame_ack_async(&mut self, frame: Option<&Packet<'_>>) -> io::Result<()> {
        let ack = encoder::encode_tcp_ack(frame.map_or(0, |f| f.records.len() as u32));
        self.inner.write_all(&ack).await?;
        self.inner.flush().await
    }

    /// Writes a datagram ACK echoing the channel ids back to the device.
    /// If `datagram` is `None`, writes a zeroed acknowledgement.
    pub async fn write_datagram_ack_async(
        &mut self,
        datagram: Option<&Datagram<'_>>,
    ) -> io::Result<()> {
        let ack = match datagram {
            Some(d) => {
                encoder::encode_udp_ack(d.packet_id, d.avl_packet_id, d.packet.records.len() as u8)
            }
            None => encoder::encode_udp_ack(0, 0, 0),
        };
        self.inner.write_all(&ack).await?;
        self.inner.flush().await
    }

    /// Encodes `packet` as a TCP frame and writes it out.
    pub async fn write_packet_async(&mut self, packet: &Packet<'_>) -> Result<(), StreamError> {
        let frame = encoder::encode_packet_tcp(packet)?;
        self.inner.write_all(&frame).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Sends `text` to the device as a codec 12 command frame.
    pub async fn write_command_async(&mut self, text: &str) -> Result<(), StreamError> {
        self.write_packet_async(&Packet::command(text)).await
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::protocol::Codec;

    #[test]
    fn read_imei_from_handshake() {
        let input = hex::decode("000F333536333037303432343431303133").unwrap();
        let mut stream = TeltonikaStream::new(Cursor::new(input));
        assert_eq!(stream.read_imei().unwrap(), "356307042441013");
    }

    #[test]
    fn read_imei_zero_length() {
        let mut stream = TeltonikaStream::new(Cursor::new(vec![0x00, 0x00]));
        assert!(matches!(
            stream.read_imei().unwrap_err(),
            StreamError::Decode(DecodeError::ShortImei)
        ));
    }

    #[test]
    fn read_frame_from_stream() {
        let input = hex::decode("000000000000000F0C010500000007676574696E666F0100004312").unwrap();
        let mut stream = TeltonikaStream::new(Cursor::new(input));
        let packet = stream.read_frame().unwrap();
        assert_eq!(packet.codec, Codec::C12);
        assert_eq!(packet.messages[0].text, "getinfo");
    }

    #[test]
    fn read_frame_buf_too_small() {
        let input = hex::decode("000000000000000F0C010500000007676574696E666F0100004312").unwrap();
        let mut stream = TeltonikaStream::new(Cursor::new(input));
        let mut buf = [0u8; 16];
        assert!(matches!(
            stream.read_frame_buf(&mut buf).unwrap_err(),
            StreamError::Decode(DecodeError::BufferTooSmall { needed: 27, .. })
        ));
    }

    #[test]
    fn write_command_golden_bytes() {
        let mut stream = TeltonikaStream::new(Cursor::new(Vec::new()));
        stream.write_command("getinfo").unwrap();
        let written = stream.into_inner().into_inner();
        assert_eq!(
            written,
            hex::decode("000000000000000F0C010500000007676574696E666F0100004312").unwrap()
        );
    }

    #[test]
    fn frame_ack_is_the_record_count() {
        let mut stream = TeltonikaStream::new(Cursor::new(Vec::new()));
        let input = hex::decode("000000000000002808010000016B40D9AD80010000000000000000000000000000000103021503010101425E100000010000F22A").unwrap();
        let (_, packet) = crate::parser::decode_tcp(&input, DecodeConfig::default()).unwrap();
        stream.write_frame_ack(Some(&packet)).unwrap();
        stream.write_frame_ack(None).unwrap();
        assert_eq!(
            stream.into_inner().into_inner(),
            [0, 0, 0, 1, 0, 0, 0, 0]
        );
    }

    #[test]
    fn datagram_ack_echoes_the_channel() {
        let input = hex::decode("003DCAFE0105000F33353230393330383634303336353508010000016B4F815B30010000000000000000000000000000000103021503010101425DBC000001").unwrap();
        let mut stream = TeltonikaStream::new(Cursor::new(input));
        let datagram = stream.read_datagram().unwrap();
        let mut reply = TeltonikaStream::new(Cursor::new(Vec::new()));
        reply.write_datagram_ack(Some(&datagram)).unwrap();
        assert_eq!(
            reply.into_inner().into_inner(),
            [0x00, 0x05, 0xCA, 0xFE, 0x01, 0x05, 0x01]
        );
    }

    #[test]
    fn leftover_bytes_stay_on_the_stream() {
        let mut input =
            hex::decode("000000000000000F0C010500000007676574696E666F0100004312").unwrap();
        input.extend_from_slice(&[0xAA, 0xBB]);
        let mut stream = TeltonikaStream::new(Cursor::new(input));
        stream.read_frame().unwrap();
        let mut rest = Vec::new();
        std::io::Read::read_to_end(stream.inner_mut(), &mut rest).unwrap();
        assert_eq!(rest, vec![0xAA, 0xBB]);
    }
}
