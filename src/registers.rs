/*!
    typed harp registers, and the common registers every harp device implements

    each register is a constant of type [Register] giving its address, its payload type and its access. From it derive at compile time its [RegisterDescriptor] in catalogs and the codec turning frame payloads into values and back.
*/

use core::marker::PhantomData;
use packbytes::{FromBytes, ToBytes, ByteArray};
use bilge::prelude::*;
use thiserror::Error;

use crate::{
    pack_bits,
    payload::{Payload, WireType, Timestamped},
    frame::{Frame, FrameError, MessageType},
    };


/// access allowed by the device on a register
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AccessKind {
    /// can only be read, the device refuses writes
    Read,
    /// can be read and written
    ReadWrite,
}

/// type level marker of a register access, see [ReadOnly] and [ReadWrite]
pub trait Access {
    const KIND: AccessKind;
}
/// marker of accesses allowing writes
pub trait Writable: Access {}

/// marker of read only registers
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReadOnly;
/// marker of writable registers
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReadWrite;

impl Access for ReadOnly {const KIND: AccessKind = AccessKind::Read;}
impl Access for ReadWrite {const KIND: AccessKind = AccessKind::ReadWrite;}
impl Writable for ReadWrite {}


/// runtime description of a register, as stored in catalogs
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RegisterDescriptor {
    pub address: u8,
    pub name: &'static str,
    pub wire: WireType,
    /// number of elements of type `wire`
    pub length: usize,
    pub access: AccessKind,
}
impl RegisterDescriptor {
    /// number of bytes of the payload
    pub const fn size(&self) -> usize {
        self.length * self.wire.width()
    }
    pub const fn writable(&self) -> bool {
        matches!(self.access, AccessKind::ReadWrite)
    }
}


/// error decoding the payload of a register
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("register {address} expects {expected} payload bytes, got {actual}")]
    PayloadLengthMismatch {address: u8, expected: usize, actual: usize},
    #[error("frame for register {actual} given to register {expected}")]
    AddressMismatch {expected: u8, actual: u8},
    #[error("register {address} has payload type {expected}, frame carries {actual}")]
    TypeMismatch {address: u8, expected: WireType, actual: WireType},
    #[error("frame for register {0} has no timestamp")]
    MissingTimestamp(u8),
}


/**
    a register is a typed pointer in device memory

    it only holds the register address and name, hence can be created, copied or destroyed at no cost. Its payload type `T` gives the wire shape, its access marker `A` whether writing is possible.
*/
pub struct Register<T, A = ReadOnly> {
    address: u8,
    name: &'static str,
    ty: PhantomData<fn() -> (T, A)>,
}
impl<T, A> Register<T, A> {
    pub const fn new(address: u8, name: &'static str) -> Self {
        Self {address, name, ty: PhantomData}
    }
    pub const fn address(&self) -> u8 {self.address}
    pub const fn name(&self) -> &'static str {self.name}
}
impl<T, A> Clone for Register<T, A> {
    fn clone(&self) -> Self {*self}
}
impl<T, A> Copy for Register<T, A> {}
impl<T, A> PartialEq for Register<T, A> {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}
impl<T, A> core::fmt::Debug for Register<T, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.name, self.address)
    }
}

impl<T: Payload, A: Access> Register<T, A> {
    /// entry of this register in a catalog
    pub const fn descriptor(&self) -> RegisterDescriptor {
        RegisterDescriptor {
            address: self.address,
            name: self.name,
            wire: T::WIRE,
            length: T::LENGTH,
            access: A::KIND,
        }
    }
    /// number of bytes of the payload
    pub const fn size(&self) -> usize {
        <T as FromBytes>::Bytes::SIZE
    }

    /// decode a raw payload, its size must exactly match the register's
    pub fn decode(&self, payload: &[u8]) -> Result<T, CodecError> {
        if payload.len() != <T as FromBytes>::Bytes::SIZE {
            return Err(CodecError::PayloadLengthMismatch {
                address: self.address,
                expected: <T as FromBytes>::Bytes::SIZE,
                actual: payload.len(),
            });
        }
        let mut bytes = <T as FromBytes>::Bytes::zeroed();
        bytes.as_mut().copy_from_slice(payload);
        Ok(T::from_le_bytes(bytes))
    }
    /// decode a raw payload paired with the timestamp of its frame
    pub fn decode_timestamped(&self, payload: &[u8], seconds: f64) -> Result<Timestamped<T>, CodecError> {
        Ok(Timestamped::new(self.decode(payload)?, seconds))
    }
    /// raw payload of a value
    pub fn encode(&self, value: T) -> <T as ToBytes>::Bytes {
        value.to_le_bytes()
    }

    /// decode the payload of a frame, checking it is addressed to this register with the right payload type
    pub fn parse(&self, frame: &Frame) -> Result<T, CodecError> {
        if frame.address() != self.address {
            return Err(CodecError::AddressMismatch {expected: self.address, actual: frame.address()});
        }
        if frame.wire() != T::WIRE {
            return Err(CodecError::TypeMismatch {address: self.address, expected: T::WIRE, actual: frame.wire()});
        }
        self.decode(frame.payload())
    }
    /// same as [Self::parse] but also returning the frame timestamp, which must be present
    pub fn parse_timestamped(&self, frame: &Frame) -> Result<Timestamped<T>, CodecError> {
        let seconds = frame.timestamp().ok_or(CodecError::MissingTimestamp(self.address))?;
        Ok(Timestamped::new(self.parse(frame)?, seconds))
    }

    /// request reading this register
    pub fn read_request(&self) -> Frame {
        crate::command::read(self.address, T::WIRE)
    }
    /// message of the given type carrying a value for this register
    pub fn message(&self, message_type: MessageType, value: T) -> Result<Frame, FrameError> {
        crate::command::message(message_type, self.address, T::WIRE, self.encode(value).as_ref())
    }
    /// same as [Self::message], stamped with the given time in seconds
    pub fn timestamped_message(&self, seconds: f64, message_type: MessageType, value: T) -> Result<Frame, FrameError> {
        Ok(crate::command::timestamped(self.message(message_type, value)?, seconds))
    }
}
impl<T: Payload, A: Writable> Register<T, A> {
    /// request writing a value to this register
    pub fn write_request(&self, value: T) -> Result<Frame, FrameError> {
        self.message(MessageType::Write, value)
    }
}


/// device identity, tells which catalog applies
pub const WHO_AM_I: Register<u16> = Register::new(0, "WhoAmI");
pub const HW_VERSION_H: Register<u8> = Register::new(1, "HardwareVersionHigh");
pub const HW_VERSION_L: Register<u8> = Register::new(2, "HardwareVersionLow");
pub const ASSEMBLY_VERSION: Register<u8> = Register::new(3, "AssemblyVersion");
/// version of the harp core implementation
pub const CORE_VERSION_H: Register<u8> = Register::new(4, "CoreVersionHigh");
pub const CORE_VERSION_L: Register<u8> = Register::new(5, "CoreVersionLow");
pub const FIRMWARE_VERSION_H: Register<u8> = Register::new(6, "FirmwareVersionHigh");
pub const FIRMWARE_VERSION_L: Register<u8> = Register::new(7, "FirmwareVersionLow");
/// integral seconds of the device clock, write to synchronize
pub const TIMESTAMP_SECONDS: Register<u32, ReadWrite> = Register::new(8, "TimestampSeconds");
/// fractional part of the device clock, in ticks of 32 microseconds
pub const TIMESTAMP_MICROSECONDS: Register<u16> = Register::new(9, "TimestampMicroseconds");
/// operation mode and reporting options
pub const OPERATION_CONTROL: Register<OperationControl, ReadWrite> = Register::new(10, "OperationControl");
pub const RESET_DEVICE: Register<u8, ReadWrite> = Register::new(11, "ResetDevice");
/// user defined name, zero padded
pub const DEVICE_NAME: Register<[u8; 25], ReadWrite> = Register::new(12, "DeviceName");
pub const SERIAL_NUMBER: Register<u16, ReadWrite> = Register::new(13, "SerialNumber");
pub const CLOCK_CONFIGURATION: Register<u8, ReadWrite> = Register::new(14, "ClockConfiguration");

/// first address of device specific registers
pub const APPLICATION: u8 = 32;

/// registers shared by all harp devices
pub static COMMON: [RegisterDescriptor; 15] = [
    WHO_AM_I.descriptor(),
    HW_VERSION_H.descriptor(),
    HW_VERSION_L.descriptor(),
    ASSEMBLY_VERSION.descriptor(),
    CORE_VERSION_H.descriptor(),
    CORE_VERSION_L.descriptor(),
    FIRMWARE_VERSION_H.descriptor(),
    FIRMWARE_VERSION_L.descriptor(),
    TIMESTAMP_SECONDS.descriptor(),
    TIMESTAMP_MICROSECONDS.descriptor(),
    OPERATION_CONTROL.descriptor(),
    RESET_DEVICE.descriptor(),
    DEVICE_NAME.descriptor(),
    SERIAL_NUMBER.descriptor(),
    CLOCK_CONFIGURATION.descriptor(),
];


/// device operation mode
#[bitsize(2)]
#[derive(Copy, Clone, FromBits, Debug, PartialEq)]
pub enum OperationMode {
    /// no events are sent
    Standby = 0,
    /// events are sent
    Active = 1,
    Reserved = 2,
    /// device specific high throughput mode
    Speed = 3,
}

/// content of [OPERATION_CONTROL]
#[bitsize(8)]
#[derive(Copy, Clone, FromBits, DebugBits, PartialEq)]
pub struct OperationControl {
    pub mode: OperationMode,
    _reserved: u1,
    /// the device replies with the content of all registers when set
    pub dump_registers: bool,
    /// replies to requests are not sent
    pub mute_replies: bool,
    pub visual_indicators: bool,
    pub operation_led: bool,
    /// the device emits its clock every second
    pub heartbeat: bool,
}
pack_bits!(OperationControl);

impl Payload for OperationControl {
    const WIRE: WireType = WireType::U8;
    const LENGTH: usize = 1;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_addresses_are_unique() {
        for (i, a) in COMMON.iter().enumerate() {
            assert_eq!(usize::from(a.address), i);
            assert!(a.address < APPLICATION);
        }
    }

    #[test]
    fn descriptor_matches_codec() {
        for descriptor in [WHO_AM_I.descriptor(), DEVICE_NAME.descriptor(), OPERATION_CONTROL.descriptor()] {
            assert!(descriptor.size() > 0);
        }
        assert_eq!(DEVICE_NAME.descriptor().size(), DEVICE_NAME.size());
        assert_eq!(TIMESTAMP_SECONDS.descriptor().size(), TIMESTAMP_SECONDS.size());
        assert_eq!(OPERATION_CONTROL.descriptor().size(), OPERATION_CONTROL.size());
        assert!(TIMESTAMP_SECONDS.descriptor().writable());
        assert!(!WHO_AM_I.descriptor().writable());
    }

    #[test]
    fn decode_checks_length() {
        assert_eq!(WHO_AM_I.decode(&[0x7a, 0x05]), Ok(1402));
        assert_eq!(
            WHO_AM_I.decode(&[0x7a]),
            Err(CodecError::PayloadLengthMismatch {address: 0, expected: 2, actual: 1}),
        );
        assert_eq!(
            WHO_AM_I.decode(&[0x7a, 0x05, 0]),
            Err(CodecError::PayloadLengthMismatch {address: 0, expected: 2, actual: 3}),
        );
    }

    #[test]
    fn parse_checks_frame() {
        let reply = Frame::new(MessageType::Read, 0, WireType::U16, &[0x7a, 0x05]).unwrap();
        assert_eq!(WHO_AM_I.parse(&reply), Ok(1402));
        assert_eq!(WHO_AM_I.parse_timestamped(&reply), Err(CodecError::MissingTimestamp(0)));
        assert_eq!(
            WHO_AM_I.parse_timestamped(&reply.clone().with_timestamp(12.)),
            Ok(Timestamped::new(1402, 12.)),
        );
        assert_eq!(
            SERIAL_NUMBER.parse(&reply),
            Err(CodecError::AddressMismatch {expected: 13, actual: 0}),
        );
        let signed = Frame::new(MessageType::Read, 0, WireType::S16, &[0x7a, 0x05]).unwrap();
        assert_eq!(
            WHO_AM_I.parse(&signed),
            Err(CodecError::TypeMismatch {address: 0, expected: WireType::U16, actual: WireType::S16}),
        );
    }

    #[test]
    fn operation_control_bits() {
        let mut control = OperationControl::from(0u8);
        control.set_mode(OperationMode::Active);
        control.set_heartbeat(true);
        assert_eq!(u8::from(control), 0b1000_0001);
        // reserved bit is kept as is
        let raw = OPERATION_CONTROL.decode(&[0b0000_0110]).unwrap();
        assert_eq!(raw.mode(), OperationMode::Reserved);
        assert_eq!(OPERATION_CONTROL.encode(raw), [0b0000_0110]);
    }

    #[test]
    fn write_request_frame() {
        let frame = SERIAL_NUMBER.write_request(0x1234).unwrap();
        assert_eq!(frame.message_type(), MessageType::Write);
        assert_eq!(frame.payload(), &[0x34, 0x12]);
        assert_eq!(frame.wire(), WireType::U16);
        assert_eq!(frame.timestamp(), None);

        let frame = DEVICE_NAME.timestamped_message(5., MessageType::Event, *b"treadmill\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0").unwrap();
        assert_eq!(frame.payload().len(), 25);
        assert_eq!(frame.timestamp(), Some(5.));
    }
}
