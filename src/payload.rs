/*!
    primitive encodings of harp payloads

    every register content is a fixed number of elements of one [WireType], encoded little-endian. The [Payload] trait binds a rust type to its wire shape, so that a [Register](crate::registers::Register) knows at compile time what it must find in a frame.
*/

use packbytes::{FromBytes, ToBytes};


/// primitive element encoding, as carried in the harp payload type byte
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum WireType {
    U8,
    S8,
    U16,
    S16,
    U32,
    S32,
    U64,
    S64,
    /// 32 bit float, recognized on the wire but not used by any treadmill register
    Float,
}
impl WireType {
    /// payload type byte, without the timestamp flag
    pub const fn code(self) -> u8 {
        match self {
            Self::U8 => 0x01,
            Self::S8 => 0x81,
            Self::U16 => 0x02,
            Self::S16 => 0x82,
            Self::U32 => 0x04,
            Self::S32 => 0x84,
            Self::U64 => 0x08,
            Self::S64 => 0x88,
            Self::Float => 0x44,
        }
    }
    /// decode a payload type byte, the timestamp flag must already be removed
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x01 => Self::U8,
            0x81 => Self::S8,
            0x02 => Self::U16,
            0x82 => Self::S16,
            0x04 => Self::U32,
            0x84 => Self::S32,
            0x08 => Self::U64,
            0x88 => Self::S64,
            0x44 => Self::Float,
            _ => return None,
        })
    }
    /// size of one element in bytes
    pub const fn width(self) -> usize {
        (self.code() & 0x0f) as usize
    }
    pub const fn is_signed(self) -> bool {
        self.code() & 0x80 != 0
    }
}

impl core::fmt::Display for WireType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::U8 => "U8",
            Self::S8 => "S8",
            Self::U16 => "U16",
            Self::S16 => "S16",
            Self::U32 => "U32",
            Self::S32 => "S32",
            Self::U64 => "U64",
            Self::S64 => "S64",
            Self::Float => "Float",
        })
    }
}


/**
    a rust type that can be the content of a register

    `LENGTH * WIRE.width()` must equal the packed size of the type, this is checked by the test suite for every catalogued register
*/
pub trait Payload: FromBytes + ToBytes {
    /// element encoding
    const WIRE: WireType;
    /// number of elements
    const LENGTH: usize;
}

macro_rules! primitive {
    ($t:ty, $wire:ident) => {
        impl Payload for $t {
            const WIRE: WireType = WireType::$wire;
            const LENGTH: usize = 1;
        }
    };
}
primitive!(u8, U8);
primitive!(i8, S8);
primitive!(u16, U16);
primitive!(i16, S16);
primitive!(u32, U32);
primitive!(i32, S32);
primitive!(u64, U64);
primitive!(i64, S64);

impl<const N: usize> Payload for [u8; N] {
    const WIRE: WireType = WireType::U8;
    const LENGTH: usize = N;
}

/**
    declare a payload made of a fixed number of elements of one primitive type

    packbytes only packs byte arrays by themselves, so wider elements are held in a struct whose packed form is the elements in order. The calling crate must depend on `packbytes`.

    ```
    harp_treadmill::elements! {
        /// calibration of 4 channels
        pub struct Gains([i16; 4]);
    }
    assert_eq!(<Gains as harp_treadmill::payload::Payload>::LENGTH, 4);
    ```
*/
#[macro_export]
macro_rules! elements {
    ($(#[$meta:meta])* $vis:vis struct $name:ident([$t:ty; $n:expr]);) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, packbytes::FromBytes, packbytes::ToBytes)]
        $vis struct $name {
            pub values: [$t; $n],
        }
        impl $crate::payload::Payload for $name {
            const WIRE: $crate::payload::WireType = <$t as $crate::payload::Payload>::WIRE;
            const LENGTH: usize = <$t as $crate::payload::Payload>::LENGTH * $n;
        }
        impl From<[$t; $n]> for $name {
            fn from(values: [$t; $n]) -> Self {Self {values}}
        }
    };
}


/// value read from a frame, with the device time at which it was sent
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Timestamped<T> {
    pub value: T,
    /// device clock in seconds, taken verbatim from the frame header
    pub seconds: f64,
}
impl<T> Timestamped<T> {
    pub fn new(value: T, seconds: f64) -> Self {
        Self {value, seconds}
    }
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Timestamped<U> {
        Timestamped {value: f(self.value), seconds: self.seconds}
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for wire in [WireType::U8, WireType::S8, WireType::U16, WireType::S16,
                     WireType::U32, WireType::S32, WireType::U64, WireType::S64, WireType::Float] {
            assert_eq!(WireType::from_code(wire.code()), Some(wire));
        }
        assert_eq!(WireType::from_code(0x03), None);
        // the timestamp flag is not part of the element code
        assert_eq!(WireType::from_code(0x84 | 0x10), None);
    }

    #[test]
    fn widths() {
        assert_eq!(WireType::S16.width(), 2);
        assert_eq!(WireType::U64.width(), 8);
        assert_eq!(WireType::Float.width(), 4);
        assert!(WireType::S32.is_signed());
        assert!(!WireType::U32.is_signed());
    }

    crate::elements! {
        struct Gains([i16; 4]);
    }
    crate::elements! {
        struct Counters([u32; 2]);
    }

    #[test]
    fn array_shape() {
        assert_eq!(<[u8; 25] as Payload>::LENGTH, 25);
        assert_eq!(<Gains as Payload>::WIRE, WireType::S16);
        assert_eq!(<Gains as Payload>::LENGTH, 4);
        assert_eq!(<Counters as Payload>::WIRE, WireType::U32);
        assert_eq!(<Counters as Payload>::LENGTH, 2);
    }

    #[test]
    fn wide_elements_register() {
        use crate::registers::{Register, ReadWrite, CodecError};
        const GAINS: Register<Gains, ReadWrite> = Register::new(50, "Gains");

        assert_eq!(GAINS.descriptor().size(), 8);
        assert_eq!(GAINS.size(), 8);
        let bytes = GAINS.encode(Gains::from([1, -2, 300, -32768]));
        assert_eq!(bytes, [1, 0, 0xfe, 0xff, 0x2c, 0x01, 0x00, 0x80]);
        assert_eq!(GAINS.decode(&bytes), Ok(Gains::from([1, -2, 300, -32768])));
        assert_eq!(
            GAINS.decode(&bytes[.. 6]),
            Err(CodecError::PayloadLengthMismatch {address: 50, expected: 8, actual: 6}),
        );
        let frame = GAINS.write_request(Gains::from([0, 0, 0, 1])).unwrap();
        assert_eq!(frame.wire(), WireType::S16);
        assert_eq!(frame.payload(), &[0, 0, 0, 0, 0, 0, 1, 0]);
    }
}
