use std::sync::Arc;
use tokio::sync::broadcast;

use crate::frame::Frame;
use super::Error;


/**
    a connection over which requests are sent to a device

    the reply returned is the raw reply frame, error replies included. [Master](super::Master) is the serial implementation.
*/
pub trait Transport {
    /// send a request and wait for its reply
    fn command(&self, request: Frame) -> impl Future<Output = Result<Frame, Error>> + Send;
    /// stream of all frames received from now on, replies and events
    fn subscribe(&self) -> broadcast::Receiver<Frame>;
}

impl<T: Transport + Sync + Send + ?Sized> Transport for Arc<T> {
    fn command(&self, request: Frame) -> impl Future<Output = Result<Frame, Error>> + Send {
        (**self).command(request)
    }
    fn subscribe(&self) -> broadcast::Receiver<Frame> {
        (**self).subscribe()
    }
}
impl<T: Transport + Sync + ?Sized> Transport for &T {
    fn command(&self, request: Frame) -> impl Future<Output = Result<Frame, Error>> + Send {
        (**self).command(request)
    }
    fn subscribe(&self) -> broadcast::Receiver<Frame> {
        (**self).subscribe()
    }
}
