/*!
    construction of outgoing frames

    all functions here are pure, sending is the business of a transport. Typed variants are available on [Register](crate::registers::Register).
*/

use crate::{
    payload::WireType,
    frame::{Frame, FrameError, MessageType},
    };


/// request reading a register, the device replies with its content
pub fn read(address: u8, wire: WireType) -> Frame {
    Frame::empty(MessageType::Read, address, wire)
}

/// request writing a register, the device replies with the written content
pub fn write(address: u8, wire: WireType, payload: &[u8]) -> Result<Frame, FrameError> {
    message(MessageType::Write, address, wire, payload)
}

/// message of any type addressed to a register
pub fn message(message_type: MessageType, address: u8, wire: WireType, payload: &[u8]) -> Result<Frame, FrameError> {
    Frame::new(message_type, address, wire, payload)
}

/// stamp a message with the given time in seconds
pub fn timestamped(frame: Frame, seconds: f64) -> Frame {
    frame.with_timestamp(seconds)
}

/// same message addressed to an other port of the device
pub fn on_port(frame: Frame, port: u8) -> Frame {
    frame.with_port(port)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::DEFAULT_PORT;

    #[test]
    fn requests() {
        let request = read(35, WireType::S32);
        assert_eq!(request.message_type(), MessageType::Read);
        assert_eq!(request.address(), 35);
        assert_eq!(request.wire(), WireType::S32);
        assert!(request.payload().is_empty());
        assert_eq!(request.port(), DEFAULT_PORT);

        let request = write(38, WireType::U8, &[0b001]).unwrap();
        assert_eq!(request.message_type(), MessageType::Write);
        assert_eq!(request.payload(), &[0b001]);

        let event = timestamped(message(MessageType::Event, 41, WireType::U8, &[1]).unwrap(), 3.25);
        assert_eq!(event.timestamp(), Some(3.25));
        assert_eq!(on_port(event.clone(), 2).port(), 2);
    }
}
