use std::{
    collections::HashMap,
    sync::{atomic::{AtomicUsize, Ordering}, Mutex, MutexGuard, PoisonError},
    vec::Vec,
    };
use tokio::sync::{broadcast, mpsc};
use log::*;

use crate::{
    payload::{Payload, Timestamped},
    frame::Frame,
    registers::{Register, Access, CodecError},
    catalog::{Catalog, UnknownRegister},
    };


/**
    routes received frames to subscribers of their register

    frames of a same register are delivered in arrival order. Frames for addresses missing from the catalog are counted and discarded, so a newer firmware with more registers does not break the host.
*/
pub struct Demultiplexer {
    catalog: &'static Catalog,
    routes: Mutex<HashMap<u8, Vec<mpsc::UnboundedSender<Frame>>>>,
    dropped: AtomicUsize,
}
impl Demultiplexer {
    pub fn new(catalog: &'static Catalog) -> Self {
        Self {
            catalog,
            routes: Mutex::new(HashMap::new()),
            dropped: AtomicUsize::new(0),
        }
    }
    fn routes(&self) -> MutexGuard<'_, HashMap<u8, Vec<mpsc::UnboundedSender<Frame>>>> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// stream of the decoded values of a register
    pub fn subscribe<T: Payload, A: Access>(&self, register: Register<T, A>) -> Result<RegisterStream<T, A>, UnknownRegister> {
        Ok(RegisterStream {
            register,
            frames: self.subscribe_raw(register.address())?,
        })
    }
    /// stream of the frames of a register
    pub fn subscribe_raw(&self, address: u8) -> Result<mpsc::UnboundedReceiver<Frame>, UnknownRegister> {
        self.catalog.lookup(address)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        self.routes().entry(address).or_default().push(sender);
        Ok(receiver)
    }

    /// route one frame, returning false if it was discarded
    pub fn dispatch(&self, frame: Frame) -> bool {
        if self.catalog.lookup(frame.address()).is_err() {
            warn!("dropping frame for unknown register {}", frame.address());
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if frame.is_error() {
            debug!("not routing error reply {:?}", frame);
            return false;
        }
        let mut routes = self.routes();
        if let Some(subscribers) = routes.get_mut(&frame.address()) {
            subscribers.retain(|subscriber| subscriber.send(frame.clone()).is_ok());
        }
        true
    }
    /// number of frames discarded because of their unknown address
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// route all frames of a live stream until it closes
    pub async fn run(&self, mut source: broadcast::Receiver<Frame>) {
        loop {
            match source.recv().await {
                Ok(frame) => {self.dispatch(frame);},
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!("demultiplexer lagging, {} frames lost", count);
                },
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}


/// decoded values of one register, see [Demultiplexer::subscribe]
pub struct RegisterStream<T, A> {
    register: Register<T, A>,
    frames: mpsc::UnboundedReceiver<Frame>,
}
impl<T: Payload, A: Access> RegisterStream<T, A> {
    pub fn register(&self) -> Register<T, A> {self.register}
    /// next value, `None` once the demultiplexer is dropped
    pub async fn recv(&mut self) -> Option<Result<T, CodecError>> {
        let frame = self.frames.recv().await?;
        Some(self.register.parse(&frame))
    }
    /// next value with its device time
    pub async fn recv_timestamped(&mut self) -> Option<Result<Timestamped<T>, CodecError>> {
        let frame = self.frames.recv().await?;
        Some(self.register.parse_timestamped(&frame))
    }
    /// next value if one already arrived
    pub fn try_recv(&mut self) -> Option<Result<T, CodecError>> {
        let frame = self.frames.try_recv().ok()?;
        Some(self.register.parse(&frame))
    }
}
