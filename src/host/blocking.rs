/*!
    synchronous harp host

    [Device] owns a tokio runtime in which the receive loop of its [Master] runs, and blocks the calling thread on each operation. It must not be used from within an async context.
*/

use std::{path::Path, sync::Arc};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    runtime::{Runtime, Builder},
    };
use log::*;

use crate::{
    payload::{Payload, Timestamped},
    frame::Frame,
    registers::{Register, Access, Writable, OperationMode},
    catalog::Catalog,
    };
use super::{Error, Settings, Master, Transport, Identity};


/// blocking access to the registers of one device
pub struct Device<T> {
    device: super::Device<T>,
    runtime: Runtime,
}

impl Device<Arc<Master>> {
    /// open a serial port and connect to the device on it
    pub fn open(path: impl AsRef<Path>, settings: &Settings, catalog: &'static Catalog) -> Result<Self, Error> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;
        let master = {
            let _context = runtime.enter();
            Arc::new(Master::open(path, settings)?)
        };
        Self::with_master(runtime, master, catalog)
    }
}

impl<R, W> Device<Arc<Master<R, W>>>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// connect to a device through a master created in the given runtime, its receive loop is spawned there
    pub fn with_master(runtime: Runtime, master: Arc<Master<R, W>>, catalog: &'static Catalog) -> Result<Self, Error> {
        let receiver = master.clone();
        runtime.spawn(async move {
            if let Err(err) = receiver.run().await {
                error!("harp receive loop failed: {}", err);
            }
        });
        let device = runtime.block_on(super::Device::connect(master, catalog))?;
        Ok(Self {device, runtime})
    }
}

impl<T: Transport> Device<T> {
    pub fn catalog(&self) -> &'static Catalog {self.device.catalog()}
    /// asynchronous device, to use in [Self::runtime]
    pub fn inner(&self) -> &super::Device<T> {&self.device}
    pub fn runtime(&self) -> &Runtime {&self.runtime}

    pub fn read<V: Payload, A: Access>(&self, register: Register<V, A>) -> Result<V, Error> {
        self.runtime.block_on(self.device.read(register))
    }
    pub fn read_timestamped<V: Payload, A: Access>(&self, register: Register<V, A>) -> Result<Timestamped<V>, Error> {
        self.runtime.block_on(self.device.read_timestamped(register))
    }
    pub fn write<V: Payload, A: Writable>(&self, register: Register<V, A>, value: V) -> Result<(), Error> {
        self.runtime.block_on(self.device.write(register, value))
    }
    pub fn read_raw(&self, address: u8) -> Result<Frame, Error> {
        self.runtime.block_on(self.device.read_raw(address))
    }
    pub fn read_identity(&self) -> Result<Identity, Error> {
        self.runtime.block_on(self.device.read_identity())
    }
    pub fn set_operation_mode(&self, mode: OperationMode) -> Result<(), Error> {
        self.runtime.block_on(self.device.set_operation_mode(mode))
    }
}
