use core::ops::Deref;
use bilge::prelude::*;
use packbytes::{FromBytes, ToBytes, ByteArray};
use thiserror::Error;

use crate::{
    pack_bits,
    payload::WireType,
    utils::checksum,
    };


/// maximum payload size, so that the length byte of a timestamped frame does not overflow
pub const MAX_PAYLOAD: usize = 245;
/// maximum size of an encoded frame
pub const MAX_FRAME: usize = 2 + u8::MAX as usize;
/// port value used by hosts and single-port devices
pub const DEFAULT_PORT: u8 = 255;

const HEADER: usize = <Header as FromBytes>::Bytes::SIZE;
const STAMP: usize = <Stamp as FromBytes>::Bytes::SIZE;
/// flag in payload type marking the presence of a timestamp
const TIMESTAMPED: u8 = 0x10;
/// duration of a tick of the timestamp fractional part, in microseconds
const TICK_US: f64 = 32.;
const TICKS_PER_SECOND: u32 = 31_250;


/// kind of harp message
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// read request, or reply to it
    Read,
    /// write request, or reply to it
    Write,
    /// spontaneous message emitted by the device
    Event,
}
impl core::fmt::Display for MessageType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Event => "event",
        })
    }
}

#[bitsize(2)]
#[derive(Copy, Clone, FromBits, Debug, PartialEq)]
enum Kind {
    Reserved = 0,
    Read = 1,
    Write = 2,
    Event = 3,
}

/// first byte of a frame
#[bitsize(8)]
#[derive(Copy, Clone, FromBits, DebugBits, PartialEq)]
struct MessageByte {
    kind: Kind,
    _reserved: u1,
    /// set by the device on a request it could not execute
    error: bool,
    _padding: u4,
}
pack_bits!(MessageByte);

impl MessageByte {
    fn encode(message_type: MessageType, error: bool) -> Self {
        let mut byte = Self::from(0u8);
        byte.set_kind(match message_type {
            MessageType::Read => Kind::Read,
            MessageType::Write => Kind::Write,
            MessageType::Event => Kind::Event,
        });
        byte.set_error(error);
        byte
    }
    fn message_type(self) -> Option<MessageType> {
        match self.kind() {
            Kind::Read => Some(MessageType::Read),
            Kind::Write => Some(MessageType::Write),
            Kind::Event => Some(MessageType::Event),
            Kind::Reserved => None,
        }
    }
    /// whether the byte can start a frame
    fn valid(raw: u8) -> bool {
        raw & 0b1111_0100 == 0 && Self::from(raw).message_type().is_some()
    }
}

/// fixed part of a frame
#[derive(Copy, Clone, FromBytes, ToBytes, Debug)]
struct Header {
    message: MessageByte,
    /// number of bytes following this field, checksum included
    length: u8,
    address: u8,
    port: u8,
    payload_type: u8,
}

/// optional timestamp following the header
#[derive(Copy, Clone, FromBytes, ToBytes, Debug)]
struct Stamp {
    seconds: u32,
    /// fractional part, in ticks of 32 microseconds
    ticks: u16,
}
impl Stamp {
    fn from_seconds(seconds: f64) -> Self {
        // float to int casts saturate, so negative times land on 0
        let whole = seconds as u32;
        let ticks = ((seconds - f64::from(whole)) * 1e6 / TICK_US + 0.5) as u32;
        if ticks >= TICKS_PER_SECOND {
            Self {seconds: whole.saturating_add(1), ticks: 0}
        }
        else {
            Self {seconds: whole, ticks: ticks as u16}
        }
    }
    fn seconds(&self) -> f64 {
        f64::from(self.seconds) + f64::from(self.ticks) * TICK_US / 1e6
    }
}


/// error while building or parsing a frame
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("payload of {0} bytes exceeds harp frame capacity")]
    PayloadTooLong(usize),
    #[error("frame is truncated")]
    Truncated,
    #[error("frame declares {declared} bytes but {actual} were given")]
    LengthMismatch {declared: usize, actual: usize},
    #[error("frame checksum mismatch")]
    Checksum,
    #[error("invalid message type byte {0:#04x}")]
    InvalidMessageType(u8),
    #[error("invalid payload type byte {0:#04x}")]
    InvalidPayloadType(u8),
}


/**
    one harp message

    frames are immutable once built, the reply to a request carries the same message type as the request
*/
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    message_type: MessageType,
    error: bool,
    address: u8,
    port: u8,
    wire: WireType,
    timestamp: Option<f64>,
    payload: heapless::Vec<u8, MAX_PAYLOAD>,
}
impl Frame {
    /// build an untimestamped frame on the default port
    pub fn new(message_type: MessageType, address: u8, wire: WireType, payload: &[u8]) -> Result<Self, FrameError> {
        Ok(Self {
            message_type,
            error: false,
            address,
            port: DEFAULT_PORT,
            wire,
            timestamp: None,
            payload: heapless::Vec::from_slice(payload)
                .map_err(|_| FrameError::PayloadTooLong(payload.len()))?,
        })
    }
    /// build a frame without payload
    pub fn empty(message_type: MessageType, address: u8, wire: WireType) -> Self {
        Self {
            message_type,
            error: false,
            address,
            port: DEFAULT_PORT,
            wire,
            timestamp: None,
            payload: heapless::Vec::new(),
        }
    }
    /// same frame stamped with the given time in seconds
    pub fn with_timestamp(self, seconds: f64) -> Self {
        Self {timestamp: Some(seconds), .. self}
    }
    /// same frame on an other port
    pub fn with_port(self, port: u8) -> Self {
        Self {port, .. self}
    }
    /// same frame with the error flag set or cleared
    pub fn with_error(self, error: bool) -> Self {
        Self {error, .. self}
    }

    pub fn message_type(&self) -> MessageType {self.message_type}
    /// true for replies to requests the device refused
    pub fn is_error(&self) -> bool {self.error}
    pub fn address(&self) -> u8 {self.address}
    pub fn port(&self) -> u8 {self.port}
    pub fn wire(&self) -> WireType {self.wire}
    pub fn timestamp(&self) -> Option<f64> {self.timestamp}
    pub fn payload(&self) -> &[u8] {&self.payload}

    /// number of bytes of the encoded frame
    pub fn encoded_len(&self) -> usize {
        HEADER + if self.timestamp.is_some() {STAMP} else {0} + self.payload.len() + 1
    }

    /// harp wire representation
    pub fn to_bytes(&self) -> FrameBytes {
        let mut dst = FrameBytes {buffer: [0; MAX_FRAME], len: self.encoded_len()};
        let mut payload_type = self.wire.code();
        if self.timestamp.is_some() {
            payload_type |= TIMESTAMPED;
        }
        let header = Header {
            message: MessageByte::encode(self.message_type, self.error),
            // cannot overflow since payload is bounded
            length: (dst.len - 2) as u8,
            address: self.address,
            port: self.port,
            payload_type,
        };
        dst.buffer[.. HEADER].copy_from_slice(header.to_le_bytes().as_ref());
        let mut offset = HEADER;
        if let Some(seconds) = self.timestamp {
            dst.buffer[offset ..][.. STAMP].copy_from_slice(Stamp::from_seconds(seconds).to_le_bytes().as_ref());
            offset += STAMP;
        }
        dst.buffer[offset ..][.. self.payload.len()].copy_from_slice(&self.payload);
        offset += self.payload.len();
        dst.buffer[offset] = checksum(&dst.buffer[.. offset]);
        dst
    }

    /// parse exactly one encoded frame
    pub fn from_bytes(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < HEADER + 1 {
            return Err(FrameError::Truncated);
        }
        let mut raw = <Header as FromBytes>::Bytes::zeroed();
        raw.as_mut().copy_from_slice(&data[.. HEADER]);
        let header = Header::from_le_bytes(raw);

        let message_type = header.message.message_type()
            .ok_or(FrameError::InvalidMessageType(data[0]))?;
        let declared = 2 + usize::from(header.length);
        if declared != data.len() {
            return Err(FrameError::LengthMismatch {declared, actual: data.len()});
        }
        let (body, sum) = data.split_at(data.len() - 1);
        if checksum(body) != sum[0] {
            return Err(FrameError::Checksum);
        }
        let wire = WireType::from_code(header.payload_type & !TIMESTAMPED)
            .ok_or(FrameError::InvalidPayloadType(header.payload_type))?;

        let mut offset = HEADER;
        let mut timestamp = None;
        if header.payload_type & TIMESTAMPED != 0 {
            if body.len() < HEADER + STAMP {
                return Err(FrameError::Truncated);
            }
            let mut raw = <Stamp as FromBytes>::Bytes::zeroed();
            raw.as_mut().copy_from_slice(&body[offset ..][.. STAMP]);
            timestamp = Some(Stamp::from_le_bytes(raw).seconds());
            offset += STAMP;
        }
        let payload = &body[offset ..];
        Ok(Self {
            message_type,
            error: header.message.error(),
            address: header.address,
            port: header.port,
            wire,
            timestamp,
            payload: heapless::Vec::from_slice(payload)
                .map_err(|_| FrameError::PayloadTooLong(payload.len()))?,
        })
    }
}

/// encoded frame, as returned by [Frame::to_bytes]
pub struct FrameBytes {
    buffer: [u8; MAX_FRAME],
    len: usize,
}
impl Deref for FrameBytes {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.buffer[.. self.len]
    }
}


/// outcome of [scan]
#[derive(Debug, PartialEq)]
pub enum Scan {
    /// more bytes are needed to complete the frame starting the buffer
    Incomplete,
    /// a frame was found spanning the given number of bytes at the start of the buffer
    Frame(Frame, usize),
    /// the given number of bytes at the start of the buffer cannot start a frame and must be dropped
    Garbage(usize),
}

/**
    look for a frame at the start of a received byte stream

    the stream is resynchronized by dropping bytes one by one until a frame with valid header and checksum is found.
    A header announcing more bytes than received is only waited for if no complete frame follows it in the buffer.
*/
pub fn scan(buffer: &[u8]) -> Scan {
    if buffer.len() < 2 {
        return Scan::Incomplete;
    }
    if !MessageByte::valid(buffer[0]) || usize::from(buffer[1]) < HEADER - 2 + 1 {
        return Scan::Garbage(1);
    }
    let total = 2 + usize::from(buffer[1]);
    if buffer.len() < total {
        return match (1 .. buffer.len()).find(|&start| complete(&buffer[start ..])) {
            Some(start) => Scan::Garbage(start),
            None => Scan::Incomplete,
        };
    }
    match Frame::from_bytes(&buffer[.. total]) {
        Ok(frame) => Scan::Frame(frame, total),
        Err(_) => Scan::Garbage(1),
    }
}
/// whether a valid frame starts the buffer
fn complete(buffer: &[u8]) -> bool {
    if buffer.len() < HEADER || !MessageByte::valid(buffer[0]) {
        return false;
    }
    let total = 2 + usize::from(buffer[1]);
    buffer.len() >= total && Frame::from_bytes(&buffer[.. total]).is_ok()
}
