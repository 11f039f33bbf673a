//! Frame encoders: the mirror image of [`parser`](crate::parser).
//!
//! Encoding buckets each record's IO elements into the 1/2/4/8-byte groups
//! by the width of their value; any other width goes to the variable group,
//! which only codec 8E carries.

use crate::{
    crc16,
    error::EncodeError,
    protocol::{AVLEventIO, AVLEventIOValue, AVLRecord, Codec, GprsMessage, Packet},
};

/// Encodes `packet` as a TCP frame: zero preamble, data length, data field
/// and the CRC-16 trailer.
pub fn encode_packet_tcp(packet: &Packet<'_>) -> Result<Vec<u8>, EncodeError> {
    let data = encode_body(packet)?;
    let length = u32::try_from(data.len()).map_err(|_| EncodeError::FrameTooLarge)?;
    let mut out = Vec::with_capacity(data.len() + 12);
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(&data);
    out.extend_from_slice(&u32::from(crc16(&data)).to_be_bytes());
    Ok(out)
}

/// Encodes `packet` as a UDP channel datagram from `imei`.
pub fn encode_packet_udp(
    imei: &str,
    packet_id: u16,
    avl_packet_id: u8,
    packet: &Packet<'_>,
) -> Result<Vec<u8>, EncodeError> {
    let data = encode_body(packet)?;
    let payload_length = u16::try_from(4 + 2 + imei.len() + data.len())
        .map_err(|_| EncodeError::FrameTooLarge)?;
    let mut out = Vec::with_capacity(2 + usize::from(payload_length));
    out.extend_from_slice(&payload_length.to_be_bytes());
    out.extend_from_slice(&packet_id.to_be_bytes());
    // Non-usable byte
    out.push(0x01);
    out.push(avl_packet_id);
    out.extend_from_slice(&(imei.len() as u16).to_be_bytes());
    out.extend_from_slice(imei.as_bytes());
    out.extend_from_slice(&data);
    Ok(out)
}

/// The 4-byte big-endian record count acknowledging a TCP frame.
pub fn encode_tcp_ack(records: u32) -> [u8; 4] {
    records.to_be_bytes()
}

/// The UDP acknowledgement, echoing the datagram's channel ids. The record
/// count is a single byte on this path.
pub fn encode_udp_ack(packet_id: u16, avl_packet_id: u8, records: u8) -> [u8; 7] {
    let mut out = [0u8; 7];
    out[..2].copy_from_slice(&5u16.to_be_bytes());
    out[2..4].copy_from_slice(&packet_id.to_be_bytes());
    out[4] = 0x01;
    out[5] = avl_packet_id;
    out[6] = records;
    out
}

/// Packs a 15-digit IMEI into the 8-byte BCD form carried by codec 14 and
/// codec 15 messages.
pub fn imei_to_bcd(imei: &str) -> Result<[u8; 8], EncodeError> {
    let digits = imei.as_bytes();
    if digits.len() != 15 || !digits.iter().all(u8::is_ascii_digit) {
        return Err(EncodeError::BadImei);
    }
    let mut out = [0u8; 8];
    // nibble 0 is padding, the digits occupy nibbles 1..=15
    for (index, digit) in digits.iter().enumerate() {
        let value = digit - b'0';
        let nibble = index + 1;
        out[nibble / 2] |= if nibble % 2 == 0 { value << 4 } else { value };
    }
    Ok(out)
}

fn encode_body(packet: &Packet<'_>) -> Result<Vec<u8>, EncodeError> {
    if packet.codec.is_avl() {
        if !packet.messages.is_empty() {
            return Err(EncodeError::Payload {
                codec: packet.codec,
                content: "gprs messages",
            });
        }
        encode_avl_body(packet.codec, &packet.records)
    } else {
        if !packet.records.is_empty() {
            return Err(EncodeError::Payload {
                codec: packet.codec,
                content: "telemetry records",
            });
        }
        encode_gprs_body(packet.codec, &packet.messages)
    }
}

fn encode_avl_body(codec: Codec, records: &[AVLRecord<'_>]) -> Result<Vec<u8>, EncodeError> {
    let count = u8::try_from(records.len()).map_err(|_| EncodeError::TooManyEntries)?;
    let mut out = vec![u8::from(codec), count];
    for record in records {
        encode_record(&mut out, codec, record)?;
    }
    out.push(count);
    Ok(out)
}

fn encode_record(
    out: &mut Vec<u8>,
    codec: Codec,
    record: &AVLRecord<'_>,
) -> Result<(), EncodeError> {
    let millis = u64::try_from(record.timestamp.timestamp_millis())
        .map_err(|_| EncodeError::TimestampRange)?;
    out.extend_from_slice(&millis.to_be_bytes());
    out.push(u8::from(record.priority));

    out.extend_from_slice(&scale_coordinate(record.longitude).to_be_bytes());
    out.extend_from_slice(&scale_coordinate(record.latitude).to_be_bytes());
    out.extend_from_slice(&record.altitude.to_be_bytes());
    out.extend_from_slice(&record.angle.to_be_bytes());
    out.push(record.satellites);
    out.extend_from_slice(&record.speed.to_be_bytes());

    put_id(out, codec, record.trigger_event_id)?;
    if codec == Codec::C16 {
        out.push(record.generation_type.map_or(0xFF, u8::from));
    }

    let mut fixed: [Vec<&AVLEventIO<'_>>; 4] = [vec![], vec![], vec![], vec![]];
    let mut variable = Vec::new();
    for element in &record.io_events {
        match element_width(&element.value) {
            1 => fixed[0].push(element),
            2 => fixed[1].push(element),
            4 => fixed[2].push(element),
            8 => fixed[3].push(element),
            len => {
                if !codec.has_variable_group() {
                    return Err(EncodeError::ElementLength { codec, len });
                }
                variable.push(element);
            }
        }
    }

    put_count(out, codec, record.io_events.len())?;
    for group in &fixed {
        put_count(out, codec, group.len())?;
        for element in group {
            put_id(out, codec, element.id)?;
            put_fixed_value(out, &element.value);
        }
    }
    if codec.has_variable_group() {
        put_count(out, codec, variable.len())?;
        for element in variable {
            put_id(out, codec, element.id)?;
            if let AVLEventIOValue::Variable(value) = &element.value {
                let length = u16::try_from(value.len()).map_err(|_| EncodeError::ElementLength {
                    codec,
                    len: value.len(),
                })?;
                out.extend_from_slice(&length.to_be_bytes());
                out.extend_from_slice(value);
            }
        }
    }
    Ok(())
}

// Round instead of truncating so 42.373737 encodes back to 423737370.
fn scale_coordinate(degrees: f64) -> i32 {
    (degrees * 1e7).round() as i32
}

fn element_width(value: &AVLEventIOValue<'_>) -> usize {
    match value {
        AVLEventIOValue::U8(_) => 1,
        AVLEventIOValue::U16(_) => 2,
        AVLEventIOValue::U32(_) => 4,
        AVLEventIOValue::U64(_) => 8,
        AVLEventIOValue::Variable(v) => v.len(),
    }
}

fn put_fixed_value(out: &mut Vec<u8>, value: &AVLEventIOValue<'_>) {
    match value {
        AVLEventIOValue::U8(v) => out.push(*v),
        AVLEventIOValue::U16(v) => out.extend_from_slice(&v.to_be_bytes()),
        AVLEventIOValue::U32(v) => out.extend_from_slice(&v.to_be_bytes()),
        AVLEventIOValue::U64(v) => out.extend_from_slice(&v.to_be_bytes()),
        // a 1/2/4/8-byte raw value bucketed into its fixed group
        AVLEventIOValue::Variable(v) => out.extend_from_slice(v),
    }
}

fn put_id(out: &mut Vec<u8>, codec: Codec, id: u16) -> Result<(), EncodeError> {
    if codec.wide_ids() {
        out.extend_from_slice(&id.to_be_bytes());
    } else {
        out.push(u8::try_from(id).map_err(|_| EncodeError::IdRange { codec, id })?);
    }
    Ok(())
}

fn put_count(out: &mut Vec<u8>, codec: Codec, count: usize) -> Result<(), EncodeError> {
    if codec.wide_counts() {
        let count = u16::try_from(count).map_err(|_| EncodeError::TooManyElements(codec))?;
        out.extend_from_slice(&count.to_be_bytes());
    } else {
        out.push(u8::try_from(count).map_err(|_| EncodeError::TooManyElements(codec))?);
    }
    Ok(())
}

fn encode_gprs_body(codec: Codec, messages: &[GprsMessage]) -> Result<Vec<u8>, EncodeError> {
    let quantity = u8::try_from(messages.len()).map_err(|_| EncodeError::TooManyEntries)?;
    let mut out = vec![u8::from(codec), quantity];
    for message in messages {
        encode_message(&mut out, codec, message)?;
    }
    out.push(quantity);
    Ok(out)
}

fn encode_message(
    out: &mut Vec<u8>,
    codec: Codec,
    message: &GprsMessage,
) -> Result<(), EncodeError> {
    out.push(u8::from(message.message_type));
    let length = u32::try_from(message.text.len())
        .ok()
        .and_then(|len| len.checked_add(codec.message_overhead()))
        .ok_or(EncodeError::FrameTooLarge)?;
    out.extend_from_slice(&length.to_be_bytes());

    if matches!(codec, Codec::C13 | Codec::C15) {
        let timestamp = message
            .timestamp
            .ok_or(EncodeError::MissingTimestamp(codec))?;
        let seconds =
            u32::try_from(timestamp.timestamp()).map_err(|_| EncodeError::TimestampRange)?;
        out.extend_from_slice(&seconds.to_be_bytes());
    }
    if matches!(codec, Codec::C14 | Codec::C15) {
        let imei = message
            .imei
            .as_deref()
            .ok_or(EncodeError::MissingImei(codec))?;
        out.extend_from_slice(&imei_to_bcd(imei)?);
    }
    out.extend_from_slice(message.text.as_bytes());
    Ok(())
}
