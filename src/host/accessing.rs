use std::string::String;
use tokio::sync::broadcast;
use log::*;

use crate::{
    payload::{Payload, Timestamped},
    frame::Frame,
    registers::{self, Register, Access, Writable, OperationMode},
    catalog::Catalog,
    };
use super::{Error, Transport, Demultiplexer};


/**
    typed access to the registers of one device

    it is a lightweight wrapper of a [Transport], the catalog gives the registers a frame can be routed to and the identity the device must report
*/
pub struct Device<T> {
    transport: T,
    catalog: &'static Catalog,
}

/// informations common to all harp devices
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub who_am_i: u16,
    /// major and minor version of the board
    pub hardware: (u8, u8),
    pub assembly: u8,
    /// major and minor version of the harp core
    pub core: (u8, u8),
    /// major and minor version of the device firmware
    pub firmware: (u8, u8),
    pub serial_number: u16,
    /// user defined name, without its padding
    pub name: String,
}

impl<T: Transport> Device<T> {
    /// check the device identity and return a handle to it only if it matches the catalog
    pub async fn connect(transport: T, catalog: &'static Catalog) -> Result<Self, Error> {
        let device = Self {transport, catalog};
        let actual = device.read(registers::WHO_AM_I).await?;
        if actual != catalog.who_am_i {
            return Err(Error::UnexpectedDeviceIdentity {expected: catalog.who_am_i, actual});
        }
        debug!("connected to {} revision {}", catalog.device, catalog.revision);
        Ok(device)
    }
    pub fn catalog(&self) -> &'static Catalog {self.catalog}
    pub fn transport(&self) -> &T {&self.transport}

    /// send a request, turning error replies into [Error::Device]
    async fn command(&self, request: Frame) -> Result<Frame, Error> {
        let reply = self.transport.command(request).await?;
        if reply.is_error() {
            return Err(Error::Device {address: reply.address(), message_type: reply.message_type()});
        }
        Ok(reply)
    }

    /// read the current value of a register
    pub async fn read<V: Payload, A: Access>(&self, register: Register<V, A>) -> Result<V, Error> {
        let reply = self.command(register.read_request()).await?;
        Ok(register.parse(&reply)?)
    }
    /// read the current value of a register with the device time at which it was read
    pub async fn read_timestamped<V: Payload, A: Access>(&self, register: Register<V, A>) -> Result<Timestamped<V>, Error> {
        let reply = self.command(register.read_request()).await?;
        Ok(register.parse_timestamped(&reply)?)
    }
    /// write a value to a register
    pub async fn write<V: Payload, A: Writable>(&self, register: Register<V, A>, value: V) -> Result<(), Error> {
        self.command(register.write_request(value)?).await?;
        Ok(())
    }
    /// read the register at the given address, whatever its type
    pub async fn read_raw(&self, address: u8) -> Result<Frame, Error> {
        self.command(self.catalog.read_request(address)?).await
    }

    /// read the common identification registers
    pub async fn read_identity(&self) -> Result<Identity, Error> {
        let name = self.read(registers::DEVICE_NAME).await?;
        let len = name.iter().position(|&c| c == 0).unwrap_or(name.len());
        Ok(Identity {
            who_am_i: self.read(registers::WHO_AM_I).await?,
            hardware: (
                self.read(registers::HW_VERSION_H).await?,
                self.read(registers::HW_VERSION_L).await?,
                ),
            assembly: self.read(registers::ASSEMBLY_VERSION).await?,
            core: (
                self.read(registers::CORE_VERSION_H).await?,
                self.read(registers::CORE_VERSION_L).await?,
                ),
            firmware: (
                self.read(registers::FIRMWARE_VERSION_H).await?,
                self.read(registers::FIRMWARE_VERSION_L).await?,
                ),
            serial_number: self.read(registers::SERIAL_NUMBER).await?,
            name: String::from_utf8_lossy(&name[.. len]).into_owned(),
        })
    }
    /// change the operation mode, keeping the other operation options
    pub async fn set_operation_mode(&self, mode: OperationMode) -> Result<(), Error> {
        let mut control = self.read(registers::OPERATION_CONTROL).await?;
        control.set_mode(mode);
        self.write(registers::OPERATION_CONTROL, control).await
    }

    /// stream of all frames received from now on
    pub fn events(&self) -> broadcast::Receiver<Frame> {
        self.transport.subscribe()
    }
    /// router of received frames to registers of this device's catalog
    pub fn demultiplexer(&self) -> Demultiplexer {
        Demultiplexer::new(self.catalog)
    }
}
