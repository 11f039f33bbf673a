use std::borrow::Cow;

use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Represent the device Codec
///
/// | TCP/UDP | GPRS |
/// |---------|------|
/// | C8      | C12  |
/// | C8Ext   | C13  |
/// | C16     | C14  |
/// |         | C15  |
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Codec {
    C8,
    C8Ext,
    C16,
    C12,
    C13,
    C14,
    C15,
}

impl Codec {
    /// Telemetry codecs carry [`AVLRecord`]s.
    pub fn is_avl(self) -> bool {
        matches!(self, Codec::C8 | Codec::C8Ext | Codec::C16)
    }

    /// GPRS codecs carry [`GprsMessage`]s.
    pub fn is_gprs(self) -> bool {
        !self.is_avl()
    }

    // Codec 8 packs event and element ids into one byte.
    pub(crate) fn wide_ids(self) -> bool {
        matches!(self, Codec::C8Ext | Codec::C16)
    }

    // Only codec 8E widens the element counts to two bytes.
    pub(crate) fn wide_counts(self) -> bool {
        self == Codec::C8Ext
    }

    // The fifth, variable-width element group.
    pub(crate) fn has_variable_group(self) -> bool {
        self == Codec::C8Ext
    }

    // Bytes of fixed fields counted inside a GPRS message length field.
    pub(crate) fn message_overhead(self) -> u32 {
        match self {
            Codec::C13 => 4,
            Codec::C14 => 8,
            Codec::C15 => 12,
            _ => 0,
        }
    }
}

impl TryFrom<u8> for Codec {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, DecodeError> {
        match value {
            0x08 => Ok(Self::C8),
            0x8E => Ok(Self::C8Ext),
            0x10 => Ok(Self::C16),
            0x0C => Ok(Self::C12),
            0x0D => Ok(Self::C13),
            0x0E => Ok(Self::C14),
            0x0F => Ok(Self::C15),
            other => Err(DecodeError::UnknownCodec(other)),
        }
    }
}

impl From<Codec> for u8 {
    fn from(value: Codec) -> u8 {
        match value {
            Codec::C8 => 0x08,
            Codec::C8Ext => 0x8E,
            Codec::C16 => 0x10,
            Codec::C12 => 0x0C,
            Codec::C13 => 0x0D,
            Codec::C14 => 0x0E,
            Codec::C15 => 0x0F,
        }
    }
}

/// Record priority
///
/// Indicates based on configuration how important the record is
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Priority {
    Low,
    High,
    Panic,
}

impl TryFrom<u8> for Priority {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, DecodeError> {
        match value {
            0x00 => Ok(Self::Low),
            0x01 => Ok(Self::High),
            0x02 => Ok(Self::Panic),
            other => Err(DecodeError::BadPriority(other)),
        }
    }
}

impl From<Priority> for u8 {
    fn from(value: Priority) -> u8 {
        match value {
            Priority::Low => 0x00,
            Priority::High => 0x01,
            Priority::Panic => 0x02,
        }
    }
}

/// Event generation
///
/// Indicates the cause for the event trigger, codec 16 only; see
/// [`AVLRecord`]
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EventGenerationCause {
    OnExit,
    OnEntrance,
    OnBoth,
    Reserved,
    Hysteresis,
    OnChange,
    Eventual,
    Periodical,
    /// Any wire value above 7.
    Unknown,
}

impl From<u8> for EventGenerationCause {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::OnExit,
            1 => Self::OnEntrance,
            2 => Self::OnBoth,
            3 => Self::Reserved,
            4 => Self::Hysteresis,
            5 => Self::OnChange,
            6 => Self::Eventual,
            7 => Self::Periodical,
            _ => Self::Unknown,
        }
    }
}

impl From<EventGenerationCause> for u8 {
    fn from(value: EventGenerationCause) -> u8 {
        match value {
            EventGenerationCause::OnExit => 0,
            EventGenerationCause::OnEntrance => 1,
            EventGenerationCause::OnBoth => 2,
            EventGenerationCause::Reserved => 3,
            EventGenerationCause::Hysteresis => 4,
            EventGenerationCause::OnChange => 5,
            EventGenerationCause::Eventual => 6,
            EventGenerationCause::Periodical => 7,
            EventGenerationCause::Unknown => 0xFF,
        }
    }
}

/// Role of a [`GprsMessage`].
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MessageType {
    Command,
    Response,
    Other(u8),
}

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        match value {
            0x05 => Self::Command,
            0x06 => Self::Response,
            other => Self::Other(other),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> u8 {
        match value {
            MessageType::Command => 0x05,
            MessageType::Response => 0x06,
            MessageType::Other(other) => other,
        }
    }
}

/// The unit of exchange with a device: a codec id plus either telemetry
/// records (codecs 8, 8E, 16) or GPRS messages (codecs 12 through 15).
///
/// The lifetime ties variable-width element values to the frame buffer they
/// were decoded from under
/// [`IoElementAlloc::OnReadBuffer`](crate::IoElementAlloc::OnReadBuffer);
/// packets decoded with the default configuration own all their data and a
/// constructed packet is `Packet<'static>`.
#[derive(Debug, PartialEq, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Packet<'a> {
    pub codec: Codec,
    /// Telemetry records; empty for the GPRS codecs.
    #[cfg_attr(feature = "serde", serde(borrow))]
    pub records: Vec<AVLRecord<'a>>,
    /// Command/response messages; empty for the telemetry codecs.
    pub messages: Vec<GprsMessage>,
}

impl Packet<'_> {
    /// A codec 12 command carrying `text`, ready for
    /// [`Hub::send`](crate::Hub::send).
    pub fn command(text: impl Into<String>) -> Packet<'static> {
        Packet {
            codec: Codec::C12,
            records: Vec::new(),
            messages: vec![GprsMessage {
                message_type: MessageType::Command,
                text: text.into(),
                imei: None,
                timestamp: None,
            }],
        }
    }

    /// Copies any element values still borrowed from a read buffer.
    pub fn into_owned(self) -> Packet<'static> {
        Packet {
            codec: self.codec,
            records: self.records.into_iter().map(AVLRecord::into_owned).collect(),
            messages: self.messages,
        }
    }
}

/// UDP channel datagram: the channel header plus one [`Packet`].
#[derive(Debug, PartialEq, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Datagram<'a> {
    /// The udp channel packet id, echoed in the acknowledgement.
    pub packet_id: u16,
    /// The actual id of the AVL packet.
    pub avl_packet_id: u8,
    pub imei: String,
    #[cfg_attr(feature = "serde", serde(borrow))]
    pub packet: Packet<'a>,
}

impl Datagram<'_> {
    /// Copies any element values still borrowed from a read buffer.
    pub fn into_owned(self) -> Datagram<'static> {
        Datagram {
            packet_id: self.packet_id,
            avl_packet_id: self.avl_packet_id,
            imei: self.imei,
            packet: self.packet.into_owned(),
        }
    }
}

/// Location and IO Status information at a certain point in time
#[derive(Debug, PartialEq, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AVLRecord<'a> {
    /// In Utc, millisecond precision on the wire
    pub timestamp: DateTime<Utc>,
    pub priority: Priority,
    pub longitude: f64,
    pub latitude: f64,
    /// Metres
    pub altitude: i16,
    /// Degrees
    pub angle: u16,
    /// How many satellites were connected
    pub satellites: u8,
    /// Km/h
    pub speed: u16,
    /// Which event triggered the recording
    pub trigger_event_id: u16,
    /// How the event was generated, codec 16 only; see
    /// [`EventGenerationCause`]
    pub generation_type: Option<EventGenerationCause>,
    /// Current IO Event statuses
    #[cfg_attr(feature = "serde", serde(borrow))]
    pub io_events: Vec<AVLEventIO<'a>>,
}

impl AVLRecord<'_> {
    fn into_owned(self) -> AVLRecord<'static> {
        AVLRecord {
            timestamp: self.timestamp,
            priority: self.priority,
            longitude: self.longitude,
            latitude: self.latitude,
            altitude: self.altitude,
            angle: self.angle,
            satellites: self.satellites,
            speed: self.speed,
            trigger_event_id: self.trigger_event_id,
            generation_type: self.generation_type,
            io_events: self
                .io_events
                .into_iter()
                .map(AVLEventIO::into_owned)
                .collect(),
        }
    }
}

/// IO event status
#[derive(Debug, PartialEq, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AVLEventIO<'a> {
    /// Event ID
    pub id: u16,
    /// Raw event value.
    ///
    /// Should be mapped to the real values using a AVL IO ID List
    #[cfg_attr(feature = "serde", serde(borrow))]
    pub value: AVLEventIOValue<'a>,
}

impl AVLEventIO<'_> {
    fn into_owned(self) -> AVLEventIO<'static> {
        AVLEventIO {
            id: self.id,
            value: self.value.into_owned(),
        }
    }
}

/// One element value; the wire groups elements by these widths.
#[derive(Debug, PartialEq, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AVLEventIOValue<'a> {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    /// Codec 8E only; borrows from the frame buffer when decoding with
    /// [`IoElementAlloc::OnReadBuffer`](crate::IoElementAlloc::OnReadBuffer).
    Variable(#[cfg_attr(feature = "serde", serde(with = "serde_bytes", borrow))] Cow<'a, [u8]>),
}

impl AVLEventIOValue<'_> {
    fn into_owned(self) -> AVLEventIOValue<'static> {
        match self {
            AVLEventIOValue::U8(v) => AVLEventIOValue::U8(v),
            AVLEventIOValue::U16(v) => AVLEventIOValue::U16(v),
            AVLEventIOValue::U32(v) => AVLEventIOValue::U32(v),
            AVLEventIOValue::U64(v) => AVLEventIOValue::U64(v),
            AVLEventIOValue::Variable(v) => AVLEventIOValue::Variable(Cow::Owned(v.into_owned())),
        }
    }
}

/// One command or response message from the GPRS codecs.
#[derive(Debug, PartialEq, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GprsMessage {
    pub message_type: MessageType,
    pub text: String,
    /// Addressed device; codecs 14 and 15 only
    pub imei: Option<String>,
    /// In Utc, second precision on the wire; codecs 13 and 15 only
    pub timestamp: Option<DateTime<Utc>>,
}
