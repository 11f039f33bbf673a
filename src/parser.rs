//! nom parsers for the TCP frame, the UDP channel datagram and the IMEI
//! handshake frame.
//!
//! The raw parsers ([`tcp_frame`], [`udp_datagram`], [`imei`]) follow nom
//! conventions and return the unconsumed input; [`decode_tcp`] and
//! [`decode_udp`] wrap them with a plain `Result` and the consumed length,
//! which is what the stream and session layers use.

use std::borrow::Cow;

use chrono::{DateTime, TimeZone, Utc};
use nom::{
    bytes::complete::take,
    multi::length_data,
    number::complete::{be_i16, be_i32, be_u16, be_u32, be_u64, be_u8},
    IResult,
};

use crate::{
    crc16,
    error::DecodeError,
    protocol::{
        AVLEventIO, AVLEventIOValue, AVLRecord, Codec, Datagram, EventGenerationCause, GprsMessage,
        MessageType, Packet, Priority,
    },
    DecodeConfig, IoElementAlloc,
};

type PResult<'a, O> = IResult<&'a [u8], O, DecodeError>;

fn abort(error: DecodeError) -> nom::Err<DecodeError> {
    nom::Err::Failure(error)
}

/// Parse an imei
///
/// Takes a [`u16`] as `length` and `length` bytes as [`String`], the shape
/// used by both the handshake frame and the UDP channel header
pub fn imei(input: &[u8]) -> PResult<'_, String> {
    let (input, raw) = length_data(be_u16)(input)?;
    match std::str::from_utf8(raw) {
        Ok(imei) => Ok((input, imei.to_owned())),
        Err(_) => Err(abort(DecodeError::BadImei)),
    }
}

fn codec(input: &[u8]) -> PResult<'_, Codec> {
    let (input, raw) = be_u8(input)?;
    match Codec::try_from(raw) {
        Ok(codec) => Ok((input, codec)),
        Err(error) => Err(abort(error)),
    }
}

fn priority(input: &[u8]) -> PResult<'_, Priority> {
    let (input, raw) = be_u8(input)?;
    match Priority::try_from(raw) {
        Ok(priority) => Ok((input, priority)),
        Err(error) => Err(abort(error)),
    }
}

fn timestamp_ms(input: &[u8]) -> PResult<'_, DateTime<Utc>> {
    let (input, millis) = be_u64(input)?;
    let timestamp = i64::try_from(millis)
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
    match timestamp {
        Some(timestamp) => Ok((input, timestamp)),
        None => Err(abort(DecodeError::Malformed)),
    }
}

fn timestamp_s(input: &[u8]) -> PResult<'_, DateTime<Utc>> {
    let (input, seconds) = be_u32(input)?;
    match Utc.timestamp_opt(i64::from(seconds), 0).single() {
        Some(timestamp) => Ok((input, timestamp)),
        None => Err(abort(DecodeError::Malformed)),
    }
}

// Signed fixed-point, two's complement, degrees scaled by 1e7.
fn coordinate(input: &[u8]) -> PResult<'_, f64> {
    let (input, raw) = be_i32(input)?;
    Ok((input, f64::from(raw) / 1e7))
}

// Event and element ids share a width: one byte on codec 8, two elsewhere.
fn event_id(input: &[u8], codec: Codec) -> PResult<'_, u16> {
    if codec.wide_ids() {
        be_u16(input)
    } else {
        let (input, id) = be_u8(input)?;
        Ok((input, u16::from(id)))
    }
}

fn element_count(input: &[u8], codec: Codec) -> PResult<'_, u16> {
    if codec.wide_counts() {
        be_u16(input)
    } else {
        let (input, count) = be_u8(input)?;
        Ok((input, u16::from(count)))
    }
}

fn fixed_value(input: &[u8], width: usize) -> PResult<'_, AVLEventIOValue<'static>> {
    match width {
        1 => {
            let (input, value) = be_u8(input)?;
            Ok((input, AVLEventIOValue::U8(value)))
        }
        2 => {
            let (input, value) = be_u16(input)?;
            Ok((input, AVLEventIOValue::U16(value)))
        }
        4 => {
            let (input, value) = be_u32(input)?;
            Ok((input, AVLEventIOValue::U32(value)))
        }
        _ => {
            let (input, value) = be_u64(input)?;
            Ok((input, AVLEventIOValue::U64(value)))
        }
    }
}

// The four fixed-width groups, then the variable group on codec 8E.
fn io_events<'a>(
    mut input: &'a [u8],
    codec: Codec,
    config: DecodeConfig,
) -> PResult<'a, Vec<AVLEventIO<'a>>> {
    let mut events = Vec::new();
    for width in [1usize, 2, 4, 8] {
        let (rest, count) = element_count(input, codec)?;
        input = rest;
        for _ in 0..count {
            let (rest, id) = event_id(input, codec)?;
            let (rest, value) = fixed_value(rest, width)?;
            input = rest;
            events.push(AVLEventIO { id, value });
        }
    }
    if codec.has_variable_group() {
        let (rest, count) = element_count(input, codec)?;
        input = rest;
        for _ in 0..count {
            let (rest, id) = event_id(input, codec)?;
            let (rest, raw) = length_data(be_u16)(rest)?;
            input = rest;
            let value = match config.io_alloc {
                IoElementAlloc::OnHeap => Cow::Owned(raw.to_vec()),
                IoElementAlloc::OnReadBuffer => Cow::Borrowed(raw),
            };
            events.push(AVLEventIO {
                id,
                value: AVLEventIOValue::Variable(value),
            });
        }
    }
    Ok((input, events))
}

fn record<'a>(input: &'a [u8], codec: Codec, config: DecodeConfig) -> PResult<'a, AVLRecord<'a>> {
    let (input, timestamp) = timestamp_ms(input)?;
    let (input, priority) = priority(input)?;

    let (input, longitude) = coordinate(input)?;
    let (input, latitude) = coordinate(input)?;
    let (input, altitude) = be_i16(input)?;
    let (input, angle) = be_u16(input)?;
    let (input, satellites) = be_u8(input)?;
    let (input, speed) = be_u16(input)?;

    let (input, trigger_event_id) = event_id(input, codec)?;
    let (input, generation_type) = if codec == Codec::C16 {
        let (input, raw) = be_u8(input)?;
        (input, Some(EventGenerationCause::from(raw)))
    } else {
        (input, None)
    };

    let (input, declared) = element_count(input, codec)?;
    let (input, io_events) = io_events(input, codec, config)?;
    if io_events.len() != usize::from(declared) {
        return Err(abort(DecodeError::CountMismatch {
            leading: declared,
            trailing: io_events.len() as u16,
        }));
    }

    Ok((
        input,
        AVLRecord {
            timestamp,
            priority,
            longitude,
            latitude,
            altitude,
            angle,
            satellites,
            speed,
            trigger_event_id,
            generation_type,
            io_events,
        },
    ))
}

fn avl_records<'a>(
    input: &'a [u8],
    codec: Codec,
    config: DecodeConfig,
) -> PResult<'a, Vec<AVLRecord<'a>>> {
    let (mut input, leading) = be_u8(input)?;
    let mut records = Vec::with_capacity(usize::from(leading));
    for _ in 0..leading {
        let (rest, parsed) = record(input, codec, config)?;
        input = rest;
        records.push(parsed);
    }
    let (input, trailing) = be_u8(input)?;
    if trailing != leading {
        return Err(abort(DecodeError::CountMismatch {
            leading: leading.into(),
            trailing: trailing.into(),
        }));
    }
    Ok((input, records))
}

fn bcd_imei(input: &[u8]) -> PResult<'_, String> {
    let (input, raw) = take(8usize)(input)?;
    let mut digits = String::with_capacity(15);
    // nibble 0 is padding, the 15 digits occupy nibbles 1..=15
    for position in 1..16 {
        let byte = raw[position / 2];
        let nibble = if position % 2 == 0 {
            byte >> 4
        } else {
            byte & 0x0F
        };
        if nibble > 9 {
            return Err(abort(DecodeError::BadImei));
        }
        digits.push(char::from(b'0' + nibble));
    }
    Ok((input, digits))
}

fn message(input: &[u8], codec: Codec) -> PResult<'_, GprsMessage> {
    let (input, message_type) = be_u8(input)?;
    let (input, length) = be_u32(input)?;
    let overhead = codec.message_overhead();
    if length < overhead {
        return Err(abort(DecodeError::ShortMessage { codec, len: length }));
    }

    let (input, timestamp) = if matches!(codec, Codec::C13 | Codec::C15) {
        let (input, timestamp) = timestamp_s(input)?;
        (input, Some(timestamp))
    } else {
        (input, None)
    };
    let (input, imei) = if matches!(codec, Codec::C14 | Codec::C15) {
        let (input, imei) = bcd_imei(input)?;
        (input, Some(imei))
    } else {
        (input, None)
    };

    let (input, raw_text) = take(length - overhead)(input)?;
    let text = match std::str::from_utf8(raw_text) {
        Ok(text) => text.to_owned(),
        Err(_) => return Err(abort(DecodeError::BadText)),
    };

    Ok((
        input,
        GprsMessage {
            message_type: MessageType::from(message_type),
            text,
            imei,
            timestamp,
        },
    ))
}

fn gprs_messages(input: &[u8], codec: Codec) -> PResult<'_, Vec<GprsMessage>> {
    let (mut input, leading) = be_u8(input)?;
    let mut messages = Vec::with_capacity(usize::from(leading));
    for _ in 0..leading {
        let (rest, parsed) = message(input, codec)?;
        input = rest;
        messages.push(parsed);
    }
    let (input, trailing) = be_u8(input)?;
    if trailing != leading {
        return Err(abort(DecodeError::CountMismatch {
            leading: leading.into(),
            trailing: trailing.into(),
        }));
    }
    Ok((input, messages))
}

// The data field shared by TCP frames and UDP datagrams: a codec id, then
// telemetry records or GPRS messages.
fn body<'a>(input: &'a [u8], config: DecodeConfig) -> PResult<'a, Packet<'a>> {
    let (input, codec) = codec(input)?;
    if codec.is_avl() {
        let (input, records) = avl_records(input, codec, config)?;
        Ok((
            input,
            Packet {
                codec,
                records,
                messages: Vec::new(),
            },
        ))
    } else {
        let (input, messages) = gprs_messages(input, codec)?;
        Ok((
            input,
            Packet {
                codec,
                records: Vec::new(),
                messages,
            },
        ))
    }
}

/// Parse a tcp frame
///
/// It does 3 main error checks:
/// - Preamble is all zeroes
/// - The CRC trailer matches and its high 16 bits are zero
/// - Record/message counts coincide
///
/// The CRC is verified before the data field is parsed, so corruption
/// anywhere in the data region reports [`DecodeError::BadCrc`].
pub fn tcp_frame<'a>(input: &'a [u8], config: DecodeConfig) -> PResult<'a, Packet<'a>> {
    let (input, preamble) = be_u32(input)?;
    if preamble != 0 {
        return Err(abort(DecodeError::BadPreamble));
    }
    let (input, data_length) = be_u32(input)?;
    if data_length == 0 {
        return Err(abort(DecodeError::SizeOutOfRange(0)));
    }
    let (input, data) = take(data_length)(input)?;
    let (input, trailer) = be_u32(input)?;
    let computed = crc16(data);
    if trailer >> 16 != 0 || trailer as u16 != computed {
        return Err(abort(DecodeError::BadCrc {
            received: trailer,
            computed,
        }));
    }

    let (rest, packet) = body(data, config)?;
    if !rest.is_empty() {
        return Err(abort(DecodeError::Malformed));
    }
    Ok((input, packet))
}

/// Parse an udp datagram
///
/// The channel header replaces the preamble and the CRC: a total length,
/// the channel packet id, one unused byte, the AVL packet id and the
/// sender's IMEI, then the same data field a TCP frame carries.
pub fn udp_datagram<'a>(input: &'a [u8], config: DecodeConfig) -> PResult<'a, Datagram<'a>> {
    let (input, payload) = length_data(be_u16)(input)?;
    let (payload, packet_id) = be_u16(payload)?;
    // Non-usable byte
    let (payload, _) = be_u8(payload)?;
    let (payload, avl_packet_id) = be_u8(payload)?;
    let (payload, imei) = imei(payload)?;

    let (rest, packet) = body(payload, config)?;
    if !rest.is_empty() {
        return Err(abort(DecodeError::Malformed));
    }
    Ok((
        input,
        Datagram {
            packet_id,
            avl_packet_id,
            imei,
            packet,
        },
    ))
}

/// Decodes one TCP frame from the start of `input`, returning the number of
/// bytes consumed. Trailing bytes are left for the caller.
pub fn decode_tcp<'a>(
    input: &'a [u8],
    config: DecodeConfig,
) -> Result<(usize, Packet<'a>), DecodeError> {
    let (rest, packet) = tcp_frame(input, config)?;
    Ok((input.len() - rest.len(), packet))
}

/// Decodes one UDP datagram from the start of `input`, returning the number
/// of bytes consumed. Trailing bytes are left for the caller.
pub fn decode_udp<'a>(
    input: &'a [u8],
    config: DecodeConfig,
) -> Result<(usize, Datagram<'a>), DecodeError> {
    let (rest, datagram) = udp_datagram(input, config)?;
    Ok((input.len() - rest.len(), datagram))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DecodeConfig {
        DecodeConfig::default()
    }

    #[test]
    fn parse_imei() {
        let input = hex::decode("000F333536333037303432343431303133").unwrap();
        let (input, imei) = imei(&input).unwrap();
        assert_eq!(input, &[]);
        assert_eq!(imei, "356307042441013");
    }

    #[test]
    fn parse_codec() {
        let input = [0x08];
        let (input, codec) = codec(&input).unwrap();
        assert_eq!(input, &[]);
        assert_eq!(codec, Codec::C8);
    }

    #[test]
    fn parse_unknown_codec() {
        let input = [0x11];
        let error = codec(&input).unwrap_err();
        assert_eq!(DecodeError::from(error), DecodeError::UnknownCodec(0x11));
    }

    #[test]
    fn parse_priority() {
        let input = [0x00];
        let (input, priority) = priority(&input).unwrap();
        assert_eq!(input, &[]);
        assert_eq!(priority, Priority::Low);
    }

    #[test]
    fn parse_record() {
        let input = hex::decode("0000016B40D8EA30010000000000000000000000000000000105021503010101425E0F01F10000601A014E0000000000000000").unwrap();
        let (input, record) = record(&input, Codec::C8, config()).unwrap();
        assert_eq!(input, &[]);
        assert_eq!(
            record,
            AVLRecord {
                timestamp: "2019-06-10T10:04:46Z".parse().unwrap(),
                priority: Priority::High,
                longitude: 0.0,
                latitude: 0.0,
                altitude: 0,
                angle: 0,
                satellites: 0,
                speed: 0,
                trigger_event_id: 1,
                generation_type: None,
                io_events: vec![
                    AVLEventIO {
                        id: 21,
                        value: AVLEventIOValue::U8(3),
                    },
                    AVLEventIO {
                        id: 1,
                        value: AVLEventIOValue::U8(1),
                    },
                    AVLEventIO {
                        id: 66,
                        value: AVLEventIOValue::U16(24079),
                    },
                    AVLEventIO {
                        id: 241,
                        value: AVLEventIOValue::U32(24602),
                    },
                    AVLEventIO {
                        id: 78,
                        value: AVLEventIOValue::U64(0),
                    },
                ],
            }
        );
    }

    #[test]
    fn parse_frame_codec8() {
        let input = hex::decode("000000000000002808010000016B40D9AD80010000000000000000000000000000000103021503010101425E100000010000F22A").unwrap();
        let (consumed, packet) = decode_tcp(&input, config()).unwrap();
        assert_eq!(consumed, input.len());
        assert_eq!(
            packet,
            Packet {
                codec: Codec::C8,
                records: vec![AVLRecord {
                    timestamp: "2019-06-10T10:05:36Z".parse().unwrap(),
                    priority: Priority::High,
                    longitude: 0.0,
                    latitude: 0.0,
                    altitude: 0,
                    angle: 0,
                    satellites: 0,
                    speed: 0,
                    trigger_event_id: 1,
                    generation_type: None,
                    io_events: vec![
                        AVLEventIO {
                            id: 21,
                            value: AVLEventIOValue::U8(3),
                        },
                        AVLEventIO {
                            id: 1,
                            value: AVLEventIOValue::U8(1),
                        },
                        AVLEventIO {
                            id: 66,
                            value: AVLEventIOValue::U16(24080),
                        },
                    ],
                }],
                messages: vec![],
            }
        );
    }

    #[test]
    fn parse_frame_codec8_two_records() {
        let input = hex::decode("000000000000004308020000016B40D57B480100000000000000000000000000000001010101000000000000016B40D5C198010000000000000000000000000000000101010101000000020000252C").unwrap();
        let (consumed, packet) = decode_tcp(&input, config()).unwrap();
        assert_eq!(consumed, input.len());
        assert_eq!(packet.codec, Codec::C8);
        assert_eq!(packet.records.len(), 2);
        assert_eq!(
            packet.records[0].timestamp,
            "2019-06-10T10:01:01Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert_eq!(
            packet.records[1].io_events,
            vec![AVLEventIO {
                id: 1,
                value: AVLEventIOValue::U8(1),
            }]
        );
    }

    #[test]
    fn parse_frame_codec8ext() {
        let input = hex::decode("000000000000004A8E010000016B412CEE000100000000000000000000000000000000010005000100010100010011001D00010010015E2C880002000B000000003544C87A000E000000001DD7E06A00000100002994").unwrap();
        let (consumed, packet) = decode_tcp(&input, config()).unwrap();
        assert_eq!(consumed, input.len());
        assert_eq!(
            packet,
            Packet {
                codec: Codec::C8Ext,
                records: vec![AVLRecord {
                    timestamp: "2019-06-10T11:36:32Z".parse().unwrap(),
                    priority: Priority::High,
                    longitude: 0.0,
                    latitude: 0.0,
                    altitude: 0,
                    angle: 0,
                    satellites: 0,
                    speed: 0,
                    trigger_event_id: 1,
                    generation_type: None,
                    io_events: vec![
                        AVLEventIO {
                            id: 1,
                            value: AVLEventIOValue::U8(1),
                        },
                        AVLEventIO {
                            id: 17,
                            value: AVLEventIOValue::U16(29),
                        },
                        AVLEventIO {
                            id: 16,
                            value: AVLEventIOValue::U32(22949000),
                        },
                        AVLEventIO {
                            id: 11,
                            value: AVLEventIOValue::U64(893700218),
                        },
                        AVLEventIO {
                            id: 14,
                            value: AVLEventIOValue::U64(500686954),
                        },
                    ],
                }],
                messages: vec![],
            }
        );
    }

    #[test]
    fn parse_frame_codec16() {
        let input = hex::decode("000000000000005F10020000016BDBC7833000000000000000000000000000000000000B05040200010000030002000B00270042563A00000000016BDBC7871800000000000000000000000000000000000B05040200010000030002000B00260042563A00000200005FB3").unwrap();
        let (consumed, packet) = decode_tcp(&input, config()).unwrap();
        assert_eq!(consumed, input.len());
        assert_eq!(packet.codec, Codec::C16);
        assert_eq!(packet.records.len(), 2);
        for record in &packet.records {
            assert_eq!(record.trigger_event_id, 11);
            assert_eq!(record.generation_type, Some(EventGenerationCause::OnChange));
        }
        assert_eq!(
            packet.records[0].io_events,
            vec![
                AVLEventIO {
                    id: 1,
                    value: AVLEventIOValue::U8(0),
                },
                AVLEventIO {
                    id: 3,
                    value: AVLEventIOValue::U8(0),
                },
                AVLEventIO {
                    id: 11,
                    value: AVLEventIOValue::U16(39),
                },
                AVLEventIO {
                    id: 66,
                    value: AVLEventIOValue::U16(22074),
                },
            ]
        );
    }

    #[test]
    fn parse_frame_codec12_command() {
        let input =
            hex::decode("000000000000000F0C010500000007676574696E666F0100004312").unwrap();
        let (consumed, packet) = decode_tcp(&input, config()).unwrap();
        assert_eq!(consumed, input.len());
        assert_eq!(
            packet,
            Packet {
                codec: Codec::C12,
                records: vec![],
                messages: vec![GprsMessage {
                    message_type: MessageType::Command,
                    text: "getinfo".to_owned(),
                    imei: None,
                    timestamp: None,
                }],
            }
        );
    }

    #[test]
    fn parse_frame_codec13_response() {
        let input =
            hex::decode("00000000000000130D01060000000B0A81C320676574696E666F0100001D6B").unwrap();
        let (consumed, packet) = decode_tcp(&input, config()).unwrap();
        assert_eq!(consumed, input.len());
        assert_eq!(packet.codec, Codec::C13);
        assert_eq!(
            packet.messages,
            vec![GprsMessage {
                message_type: MessageType::Response,
                text: "getinfo".to_owned(),
                imei: None,
                timestamp: Some(Utc.timestamp_opt(176276256, 0).unwrap()),
            }]
        );
    }

    #[test]
    fn parse_frame_codec14_command() {
        let input = hex::decode(
            "00000000000000160E01050000000E0352093081452251676574766572010000D2C1",
        )
        .unwrap();
        let (consumed, packet) = decode_tcp(&input, config()).unwrap();
        assert_eq!(consumed, input.len());
        assert_eq!(packet.codec, Codec::C14);
        assert_eq!(
            packet.messages,
            vec![GprsMessage {
                message_type: MessageType::Command,
                text: "getver".to_owned(),
                imei: Some("352093081452251".to_owned()),
                timestamp: None,
            }]
        );
    }

    #[test]
    fn parse_frame_codec15() {
        let input = hex::decode(
            "000000000000001B0F010B00000013654B65A4012345678912345648656C6C6F210A01000093D6",
        )
        .unwrap();
        let (consumed, packet) = decode_tcp(&input, config()).unwrap();
        assert_eq!(consumed, input.len());
        assert_eq!(packet.codec, Codec::C15);
        assert_eq!(
            packet.messages,
            vec![GprsMessage {
                message_type: MessageType::Other(0x0B),
                text: "Hello!\n".to_owned(),
                imei: Some("123456789123456".to_owned()),
                timestamp: Some(Utc.timestamp_opt(1699440036, 0).unwrap()),
            }]
        );
    }

    #[test]
    fn parse_udp_datagram() {
        let input = hex::decode("003DCAFE0105000F33353230393330383634303336353508010000016B4F815B30010000000000000000000000000000000103021503010101425DBC000001").unwrap();
        let (consumed, datagram) = decode_udp(&input, config()).unwrap();
        assert_eq!(consumed, input.len());
        assert_eq!(datagram.packet_id, 0xCAFE);
        assert_eq!(datagram.avl_packet_id, 0x05);
        assert_eq!(datagram.imei, "352093086403655");
        assert_eq!(datagram.packet.codec, Codec::C8);
        assert_eq!(
            datagram.packet.records[0].io_events,
            vec![
                AVLEventIO {
                    id: 0x15,
                    value: AVLEventIOValue::U8(0x03),
                },
                AVLEventIO {
                    id: 0x01,
                    value: AVLEventIOValue::U8(0x01),
                },
                AVLEventIO {
                    id: 0x42,
                    value: AVLEventIOValue::U16(0x5DBC),
                },
            ]
        );
    }

    #[test]
    fn parse_frame_bad_preamble() {
        let input = hex::decode("000001000000002808010000016B40D9AD80010000000000000000000000000000000103021503010101425E100000010000F22A").unwrap();
        assert_eq!(
            decode_tcp(&input, config()).unwrap_err(),
            DecodeError::BadPreamble
        );
    }

    #[test]
    fn parse_frame_bad_crc() {
        let input = hex::decode("000000000000002808010000016B40D9AD80010000000000000000000000000000000103021503010101425E100000010000F23A").unwrap();
        assert!(matches!(
            decode_tcp(&input, config()).unwrap_err(),
            DecodeError::BadCrc { .. }
        ));
    }

    #[test]
    fn parse_frame_crc_high_bits() {
        let input = hex::decode("000000000000002808010000016B40D9AD80010000000000000000000000000000000103021503010101425E100000010001F22A").unwrap();
        assert!(matches!(
            decode_tcp(&input, config()).unwrap_err(),
            DecodeError::BadCrc { .. }
        ));
    }

    #[test]
    fn parse_frame_count_mismatch() {
        // trailing record count altered from 01 to 05, crc fixed up to match
        let mut input = hex::decode("000000000000002808010000016B40D9AD80010000000000000000000000000000000103021503010101425E10000001").unwrap();
        let last = input.len() - 1;
        input[last] = 0x05;
        let crc = crate::crc16(&input[8..]);
        input.extend_from_slice(&u32::from(crc).to_be_bytes());
        assert!(matches!(
            decode_tcp(&input, config()).unwrap_err(),
            DecodeError::CountMismatch { .. }
        ));
    }

    #[test]
    fn parse_frame_truncated() {
        let input = hex::decode("000000000000002808010000016B40D9AD80").unwrap();
        assert_eq!(
            decode_tcp(&input, config()).unwrap_err(),
            DecodeError::ShortRead
        );
    }

    #[test]
    fn variable_elements_borrow_from_buffer() {
        // codec 8E record with one 3-byte variable element
        let input = hex::decode("00000000000000308E010000016B412CEE0001000000000000000000000000000000000000010000000000000000000101810003010203010000ADBD").unwrap();
        let (_, packet) = decode_tcp(
            &input,
            DecodeConfig {
                io_alloc: IoElementAlloc::OnReadBuffer,
            },
        )
        .unwrap();
        match &packet.records[0].io_events[0].value {
            AVLEventIOValue::Variable(value) => {
                assert!(matches!(value, Cow::Borrowed(_)));
                assert_eq!(value.as_ref(), &[1, 2, 3]);
            }
            other => panic!("expected a variable element, got {other:?}"),
        }
    }
}
