/*!
    device side of the harp protocol

    a [Responder] answers the requests received on a bus from the content of a [RegisterBank]. What happens on reads and writes of specific registers is decided by its [Rules].
*/

use core::ops::Range;
use embedded_io_async::{Read, Write};
use thiserror::Error;
use log::*;

use crate::{
    payload::Payload,
    frame::{self, Frame, MessageType, Scan, MAX_FRAME},
    registers::{self, Register, RegisterDescriptor, Access, CodecError, OperationControl},
    catalog::{Catalog, UnknownRegister},
    };


/// error accessing a register bank
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum BankError {
    #[error(transparent)]
    Unknown(#[from] UnknownRegister),
    #[error(transparent)]
    Codec(#[from] CodecError),
}


/**
    memory of a device, holding the content of every register of a catalog

    registers are laid out contiguously in catalog order, common registers first. `MEM` must be at least [Catalog::memory]
*/
pub struct RegisterBank<const MEM: usize> {
    catalog: &'static Catalog,
    memory: [u8; MEM],
}
impl<const MEM: usize> RegisterBank<MEM> {
    /// zero initialized bank, except for the device identity and name
    pub fn new(catalog: &'static Catalog) -> Result<Self, &'static str> {
        if catalog.memory() > MEM {
            return Err("register bank is too small for catalog");
        }
        let mut bank = Self {catalog, memory: [0; MEM]};
        bank.set(registers::WHO_AM_I, catalog.who_am_i)
            .map_err(|_| "catalog has no identity register")?;
        let mut name = [0; 25];
        let len = catalog.device.len().min(name.len());
        name[.. len].copy_from_slice(&catalog.device.as_bytes()[.. len]);
        bank.set(registers::DEVICE_NAME, name)
            .map_err(|_| "catalog has no name register")?;
        Ok(bank)
    }
    pub fn catalog(&self) -> &'static Catalog {self.catalog}

    fn locate(&self, address: u8) -> Result<(&'static RegisterDescriptor, Range<usize>), UnknownRegister> {
        let mut offset = 0;
        for register in self.catalog.iter() {
            if register.address == address {
                return Ok((register, offset .. offset + register.size()));
            }
            offset += register.size();
        }
        Err(UnknownRegister(address))
    }

    /// raw content of a register
    pub fn load(&self, address: u8) -> Result<&[u8], UnknownRegister> {
        let (_, range) = self.locate(address)?;
        Ok(&self.memory[range])
    }
    /// overwrite the raw content of a register, the payload must have the register size
    pub fn store(&mut self, address: u8, payload: &[u8]) -> Result<(), BankError> {
        let (register, range) = self.locate(address)?;
        if payload.len() != range.len() {
            return Err(CodecError::PayloadLengthMismatch {
                address,
                expected: register.size(),
                actual: payload.len(),
            }.into());
        }
        self.memory[range].copy_from_slice(payload);
        Ok(())
    }
    /// get the current register's value
    pub fn get<T: Payload, A: Access>(&self, register: Register<T, A>) -> Result<T, BankError> {
        Ok(register.decode(self.load(register.address())?)?)
    }
    /// set the given register's value, regardless of its access
    pub fn set<T: Payload, A: Access>(&mut self, register: Register<T, A>, value: T) -> Result<(), BankError> {
        self.store(register.address(), register.encode(value).as_ref())
    }

    /// device clock in seconds
    pub fn time(&self) -> f64 {
        let seconds = self.get(registers::TIMESTAMP_SECONDS).unwrap_or(0);
        let ticks = self.get(registers::TIMESTAMP_MICROSECONDS).unwrap_or(0);
        f64::from(seconds) + f64::from(ticks) * 32. / 1e6
    }
    /// set the device clock
    pub fn set_time(&mut self, seconds: f64) {
        let whole = seconds as u32;
        let ticks = ((seconds - f64::from(whole)) * 31_250.) as u16;
        self.set(registers::TIMESTAMP_SECONDS, whole).ok();
        self.set(registers::TIMESTAMP_MICROSECONDS, ticks).ok();
    }
}
impl<const MEM: usize> core::fmt::Debug for RegisterBank<MEM> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegisterBank")
            .field("device", &self.catalog.device)
            .field("revision", &self.catalog.revision)
            .field("memory", &&self.memory[.. self.catalog.memory()])
            .finish()
    }
}


/**
    behavior of a device on accesses to its registers

    the default implementation is a plain memory: reads return the stored content and writes are stored as is
*/
pub trait Rules {
    /// called before the content of a register is replied
    fn read<const MEM: usize>(&mut self, _bank: &mut RegisterBank<MEM>, _address: u8) {}
    /**
        execute a write request

        the payload already has the type and size of the register, and the register is writable. Returns false if the device refuses or adjusts the write, the reply then has its error flag set.
    */
    fn write<const MEM: usize>(&mut self, bank: &mut RegisterBank<MEM>, address: u8, payload: &[u8]) -> bool {
        bank.store(address, payload).is_ok()
    }
}
impl Rules for () {}


/// answers harp requests on a bus
pub struct Responder<B, H, const MEM: usize> {
    bus: B,
    rules: H,
    bank: RegisterBank<MEM>,
    receive: [u8; MAX_FRAME],
    filled: usize,
}
impl<B: Read + Write, H: Rules, const MEM: usize> Responder<B, H, MEM> {
    pub fn new(bus: B, bank: RegisterBank<MEM>, rules: H) -> Self {
        Self {
            bus,
            rules,
            bank,
            receive: [0; MAX_FRAME],
            filled: 0,
        }
    }
    pub fn bank(&self) -> &RegisterBank<MEM> {&self.bank}
    pub fn bank_mut(&mut self) -> &mut RegisterBank<MEM> {&mut self.bank}
    pub fn rules(&self) -> &H {&self.rules}
    /// the rules and the bank they act on
    pub fn parts_mut(&mut self) -> (&mut H, &mut RegisterBank<MEM>) {(&mut self.rules, &mut self.bank)}
    /// set the clock used to timestamp replies
    pub fn set_time(&mut self, seconds: f64) {
        self.bank.set_time(seconds)
    }

    /// serve requests until the bus is closed
    pub async fn run(&mut self) -> Result<(), B::Error> {
        while self.serve().await? {}
        debug!("bus closed");
        Ok(())
    }
    /// receive and answer one request, return false if the bus was closed instead
    pub async fn serve(&mut self) -> Result<bool, B::Error> {
        let Some(request) = self.receive().await?
            else {return Ok(false)};
        debug!("receive {:?}", request);
        let Some(reply) = self.process(&request)
            else {return Ok(true)};
        if self.muted() {
            return Ok(true);
        }
        self.send(&reply).await?;
        Ok(true)
    }
    /// send the current content of a register in an event, unless replies are muted
    pub async fn emit(&mut self, address: u8) -> Result<(), B::Error> {
        let Ok((register, _)) = self.bank.locate(address)
            else {
                warn!("cannot emit unknown register {}", address);
                return Ok(());
            };
        if self.muted() {
            return Ok(());
        }
        let event = self.reply(MessageType::Event, register, false);
        self.send(&event).await
    }
    fn muted(&self) -> bool {
        let control: Option<OperationControl> = self.bank.get(registers::OPERATION_CONTROL).ok();
        control.is_some_and(|control| control.mute_replies())
    }

    async fn send(&mut self, frame: &Frame) -> Result<(), B::Error> {
        debug!("send {:?}", frame);
        self.bus.write_all(&frame.to_bytes()).await?;
        self.bus.flush().await
    }
    /// next valid frame on the bus, skipping garbage
    async fn receive(&mut self) -> Result<Option<Frame>, B::Error> {
        loop {
            match frame::scan(&self.receive[.. self.filled]) {
                Scan::Frame(frame, size) => {
                    self.receive.copy_within(size .. self.filled, 0);
                    self.filled -= size;
                    return Ok(Some(frame));
                },
                Scan::Garbage(size) => {
                    debug!("catching up frame");
                    self.receive.copy_within(size .. self.filled, 0);
                    self.filled -= size;
                },
                Scan::Incomplete => {
                    // a frame never exceeds the buffer, so there is always room left here
                    let size = self.bus.read(&mut self.receive[self.filled ..]).await?;
                    if size == 0 {
                        return Ok(None);
                    }
                    self.filled += size;
                },
            }
        }
    }

    /// reply to a request, if any
    fn process(&mut self, request: &Frame) -> Option<Frame> {
        let address = request.address();
        let register = match self.bank.locate(address) {
            Ok((register, _)) => register,
            Err(_) => {
                debug!("request to unknown register {}", address);
                return Some(self.refusal(request));
            },
        };
        if register.wire != request.wire() {
            debug!("request to register {} with payload type {}", address, request.wire());
            return Some(self.refusal(request));
        }
        match request.message_type() {
            MessageType::Read => {
                self.rules.read(&mut self.bank, address);
                Some(self.reply(MessageType::Read, register, false))
            },
            MessageType::Write => {
                if !register.writable() || request.payload().len() != register.size() {
                    return Some(self.reply(MessageType::Write, register, true));
                }
                let done = self.rules.write(&mut self.bank, address, request.payload());
                if done && address == registers::TIMESTAMP_SECONDS.address() {
                    self.bank.set(registers::TIMESTAMP_MICROSECONDS, 0).ok();
                }
                Some(self.reply(MessageType::Write, register, !done))
            },
            MessageType::Event => {
                debug!("ignore event");
                None
            },
        }
    }
    /// frame with the current content of a register
    fn reply(&self, message_type: MessageType, register: &RegisterDescriptor, error: bool) -> Frame {
        let content = self.bank.load(register.address).unwrap_or(&[]);
        Frame::new(message_type, register.address, register.wire, content)
            .unwrap_or_else(|_| Frame::empty(message_type, register.address, register.wire))
            .with_error(error)
            .with_timestamp(self.bank.time())
    }
    /// empty error reply to a request that cannot be executed
    fn refusal(&self, request: &Frame) -> Frame {
        Frame::empty(request.message_type(), request.address(), request.wire())
            .with_error(true)
            .with_timestamp(self.bank.time())
    }
}
