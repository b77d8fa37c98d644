use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncReadExt, AsyncWriteExt},
    sync::{broadcast, oneshot, Mutex},
    };
use serial2_tokio::{SerialPort, CharSize, StopBits, Parity};
use std::{
    path::Path,
    collections::{HashMap, VecDeque},
    sync::{self, atomic::{AtomicBool, Ordering}, PoisonError},
    vec::Vec,
    time::Duration,
    };
use log::*;

use crate::frame::{self, Frame, MessageType, Scan, MAX_FRAME};
use super::{Error, Settings, Transport};


/// replies waited for, in request order for each register and message type
type Pendings = HashMap<(u8, MessageType), VecDeque<oneshot::Sender<Frame>>>;

/**
    harp host async implementation over one serial connection

    harp frames carry no request identifier, so replies are matched to the oldest pending request of the same register and message type.
*/
pub struct Master<R = SerialPort, W = SerialPort> {
    /// serial RX/TX stream
    receive: Mutex<R>,
    transmit: Mutex<W>,
    /// command answers currently waited for
    pending: sync::Mutex<Pendings>,
    /// every received frame
    events: broadcast::Sender<Frame>,
    /// set once the receive loop exited
    closed: AtomicBool,
    timeout: Duration,
}

impl Master {
    /// initialize a master on the given serial port file
    pub fn open(path: impl AsRef<Path>, settings: &Settings) -> Result<Self, std::io::Error> {
        let rate = settings.baud_rate;
        let bus1 = SerialPort::open(path, |mut config: serial2_tokio::Settings| {
                config.set_raw();
                config.set_baud_rate(rate)?;
                config.set_char_size(CharSize::Bits8);
                config.set_stop_bits(StopBits::One);
                config.set_parity(Parity::None);
                Ok(config)
                })?;
        let bus2 = bus1.try_clone()?;
        Ok(Self::new(bus1, bus2, settings))
    }
}

impl<R, W> Master<R, W> {
    /// initialize a master on any byte stream
    pub fn new(receive: R, transmit: W, settings: &Settings) -> Self {
        Self {
            receive: Mutex::new(receive),
            transmit: Mutex::new(transmit),
            pending: sync::Mutex::new(HashMap::new()),
            events: broadcast::channel(settings.events.max(1)).0,
            closed: AtomicBool::new(false),
            timeout: settings.timeout,
        }
    }
    pub fn timeout(&self) -> Duration {self.timeout}

    fn pending(&self) -> sync::MutexGuard<'_, Pendings> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
    /// give a received frame to its waiting request if any, and to subscribers
    fn dispatch(&self, frame: Frame) {
        debug!("receive {:?}", frame);
        self.events.send(frame.clone()).ok();
        if frame.message_type() == MessageType::Event {
            return;
        }
        let key = (frame.address(), frame.message_type());
        let mut pending = self.pending();
        let Some(queue) = pending.get_mut(&key)
            else {
                debug!("no request waiting for {:?}", key);
                return;
            };
        let mut frame = frame;
        // skip requests abandoned by their caller
        while let Some(reply) = queue.pop_front() {
            match reply.send(frame) {
                Ok(()) => break,
                Err(back) => frame = back,
            }
        }
        if queue.is_empty() {
            pending.remove(&key);
        }
    }
}

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> Master<R, W> {
    /**
        coroutine responsible of receiving all frames from the bus

        it **must** be running in order to receive replies. It returns when the stream closes, failing all pending requests.
    */
    pub async fn run(&self) -> Result<(), std::io::Error> {
        let mut bus = self.receive.try_lock()
            .map_err(|_| std::io::Error::other("receive loop is already running"))?;
        let result = self.receive_frames(&mut *bus).await;
        self.closed.store(true, Ordering::Release);
        // dropping the senders wakes the waiting requests
        self.pending().clear();
        result
    }
    async fn receive_frames(&self, bus: &mut R) -> Result<(), std::io::Error> {
        let mut buffer = Vec::with_capacity(2 * MAX_FRAME);
        let mut chunk = [0u8; MAX_FRAME];
        loop {
            let mut skipped = 0;
            loop {
                match frame::scan(&buffer) {
                    Scan::Incomplete => break,
                    Scan::Garbage(size) => {
                        buffer.drain(.. size);
                        skipped += size;
                    },
                    Scan::Frame(frame, size) => {
                        buffer.drain(.. size);
                        self.dispatch(frame);
                    },
                }
            }
            if skipped != 0 {
                warn!("dropped {} bytes to resynchronize", skipped);
            }
            let size = bus.read(&mut chunk).await?;
            if size == 0 {
                debug!("serial stream closed");
                return Ok(());
            }
            buffer.extend_from_slice(&chunk[.. size]);
        }
    }

    /// send a frame without waiting for any reply
    pub async fn send(&self, frame: &Frame) -> Result<(), Error> {
        debug!("send {:?}", frame);
        let mut bus = self.transmit.lock().await;
        bus.write_all(&frame.to_bytes()).await?;
        bus.flush().await?;
        Ok(())
    }
    /// send a request and wait for its reply, error replies are returned as any reply
    pub async fn exchange(&self, request: Frame) -> Result<Frame, Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        let mut topic = Topic::new(self, &request);
        self.send(&request).await?;
        topic.receive().await
    }
    /// stream of all frames received from now on, replies and events
    pub fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.events.subscribe()
    }
}

impl<R, W> Transport for Master<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn command(&self, request: Frame) -> impl Future<Output = Result<Frame, Error>> + Send {
        self.exchange(request)
    }
    fn subscribe(&self) -> broadcast::Receiver<Frame> {
        Master::subscribe(self)
    }
}


/**
    slot waiting for the reply to one request

    the slot is reserved at creation, so it must be created before sending the request. Dropping it abandons the request.
*/
pub struct Topic<'m, R, W> {
    master: &'m Master<R, W>,
    key: (u8, MessageType),
    reply: oneshot::Receiver<Frame>,
}
impl<'m, R, W> Topic<'m, R, W> {
    pub fn new(master: &'m Master<R, W>, request: &Frame) -> Self {
        let key = (request.address(), request.message_type());
        let (sender, reply) = oneshot::channel();
        master.pending().entry(key).or_default().push_back(sender);
        Self {master, key, reply}
    }
    /// wait for the reply, at most the master timeout
    pub async fn receive(&mut self) -> Result<Frame, Error> {
        match tokio::time::timeout(self.master.timeout, &mut self.reply).await {
            Ok(Ok(frame)) => Ok(frame),
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => Err(Error::Timeout),
        }
    }
}
impl<R, W> Drop for Topic<'_, R, W> {
    fn drop(&mut self) {
        self.reply.close();
        let mut pending = self.master.pending();
        if let Some(queue) = pending.get_mut(&self.key) {
            queue.retain(|sender| !sender.is_closed());
            if queue.is_empty() {
                pending.remove(&self.key);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{payload::WireType, registers};

    fn master() -> Master<tokio::io::Empty, tokio::io::Sink> {
        Master::new(tokio::io::empty(), tokio::io::sink(), &Settings::default())
    }

    #[test]
    fn replies_are_matched_in_order() {
        let master = master();
        let request = registers::WHO_AM_I.read_request();
        let mut first = Topic::new(&master, &request);
        let mut second = Topic::new(&master, &request);
        // event and reply of an other register do not match
        master.dispatch(Frame::new(MessageType::Event, 0, WireType::U16, &[1, 0]).unwrap());
        master.dispatch(Frame::new(MessageType::Read, 13, WireType::U16, &[1, 0]).unwrap());
        master.dispatch(Frame::new(MessageType::Read, 0, WireType::U16, &[2, 0]).unwrap());
        master.dispatch(Frame::new(MessageType::Read, 0, WireType::U16, &[3, 0]).unwrap());
        assert_eq!(first.reply.try_recv().unwrap().payload(), &[2, 0]);
        assert_eq!(second.reply.try_recv().unwrap().payload(), &[3, 0]);
        drop((first, second));
        assert!(master.pending().is_empty());
    }

    #[test]
    fn abandoned_requests_are_skipped() {
        let master = master();
        let request = registers::WHO_AM_I.read_request();
        let abandoned = Topic::new(&master, &request);
        let mut waiting = Topic::new(&master, &request);
        drop(abandoned);
        assert_eq!(master.pending().get(&(0, MessageType::Read)).map(VecDeque::len), Some(1));
        master.dispatch(Frame::new(MessageType::Read, 0, WireType::U16, &[7, 0]).unwrap());
        assert_eq!(waiting.reply.try_recv().unwrap().payload(), &[7, 0]);
    }

    #[test]
    fn events_are_broadcast() {
        let master = master();
        let mut events = master.subscribe();
        let event = Frame::new(MessageType::Event, 35, WireType::S32, &[0; 12]).unwrap();
        master.dispatch(event.clone());
        assert_eq!(events.try_recv().unwrap(), event);
    }
}
