/*!
    asynchronous harp host in `std` environment

    The central resource is the [Master] struct which owns a serial connection to one device, matches replies to requests and broadcasts every received frame.

    access to the device

    - [Device] provides typed reads and writes of any register of a [Catalog](crate::catalog::Catalog), over any [Transport]
    - [Treadmill] provides one method per treadmill register
    - [Demultiplexer] routes received frames to per-register streams
    - [blocking::Device] provides the same operations for synchronous code
*/

/// implementation of the serial exchanges, this is the tricky part of the code
mod networking;
/// the seam between devices and exchanges
mod transport;
/// typed methods to read and write registers
mod accessing;
/// named methods for the treadmill registers
mod treadmill;
/// routing of received frames
mod demux;
pub mod blocking;


pub use networking::{Master, Topic};
pub use transport::Transport;
pub use accessing::{Device, Identity};
pub use treadmill::Treadmill;
pub use demux::{Demultiplexer, RegisterStream};


use std::time::Duration;
use thiserror::Error;
use crate::{
    frame::{FrameError, MessageType},
    registers::CodecError,
    catalog::UnknownRegister,
    };

/// error regarding harp communication
#[derive(Error, Debug)]
pub enum Error {
    #[error("problem with serial bus")]
    Bus(std::io::Error),
    #[error("unexpected register content")]
    Codec(#[from] CodecError),
    #[error("cannot build frame")]
    Frame(#[from] FrameError),
    #[error(transparent)]
    UnknownRegister(#[from] UnknownRegister),
    #[error("device identifies as {actual}, expected {expected}")]
    UnexpectedDeviceIdentity {expected: u16, actual: u16},
    #[error("device refused {message_type} of register {address}")]
    Device {address: u8, message_type: MessageType},
    #[error("no reply arrived in expected time")]
    Timeout,
    #[error("receive loop is not running anymore")]
    Closed,
}
impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Bus(error)
    }
}


/// parameters of a [Master]
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// serial baud rate, harp devices use 1Mbaud
    pub baud_rate: u32,
    /// delay after which a request without reply fails with [Error::Timeout]
    pub timeout: Duration,
    /// number of received frames buffered for each subscriber before it lags
    pub events: usize,
}
impl Default for Settings {
    fn default() -> Self {
        Self {
            baud_rate: 1_000_000,
            timeout: Duration::from_millis(500),
            events: 256,
        }
    }
}
impl Settings {
    pub fn with_baud_rate(self, baud_rate: u32) -> Self {
        Self {baud_rate, .. self}
    }
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {timeout, .. self}
    }
    pub fn with_events(self, events: usize) -> Self {
        Self {events, .. self}
    }
}
