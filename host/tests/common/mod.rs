use std::{
    sync::Arc,
    time::Duration,
    };
use tokio::io::{AsyncRead, AsyncWrite, AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use embedded_io_async::{ErrorType, ErrorKind, Read, Write};
use futures_concurrency::future::Race;

use harp_treadmill::{
    responder::{RegisterBank, Responder},
    treadmill::{self, Firmware},
    host::{Master, Settings},
    };


/// master talking through an in-memory pipe
pub type PipeMaster = Master<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;
/// simulated treadmill on the other end of the pipe
pub type Simulated = Responder<Tokio<DuplexStream>, Firmware, 128>;

/// device clock of simulated treadmills when the test starts
pub const START: f64 = 100.;


/// tokio stream used as an embedded bus
pub struct Tokio<T>(pub T);

impl<T> ErrorType for Tokio<T> {
    type Error = ErrorKind;
}
impl<T: AsyncRead + Unpin> Read for Tokio<T> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        AsyncReadExt::read(&mut self.0, buf).await.map_err(|_| ErrorKind::Other)
    }
}
impl<T: AsyncWrite + Unpin> Write for Tokio<T> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, ErrorKind> {
        AsyncWriteExt::write(&mut self.0, buf).await.map_err(|_| ErrorKind::Other)
    }
    async fn flush(&mut self) -> Result<(), ErrorKind> {
        AsyncWriteExt::flush(&mut self.0).await.map_err(|_| ErrorKind::Other)
    }
}


pub fn init_log() {
    env_logger::builder().is_test(true).try_init().ok();
}

/// master connected to a pipe, and the device end of the pipe
pub fn pipe(settings: &Settings) -> (PipeMaster, DuplexStream) {
    let (host, device) = tokio::io::duplex(1024);
    let (receive, transmit) = tokio::io::split(host);
    (Master::new(receive, transmit, settings), device)
}

/// treadmill firmware answering on the given pipe end
pub fn simulated(bus: DuplexStream) -> Simulated {
    let mut bank = RegisterBank::new(&treadmill::CATALOG).expect("bank too small");
    let mut firmware = Firmware::new();
    firmware.reset(&mut bank).expect("cannot reset firmware");
    let mut responder = Responder::new(Tokio(bus), bank, firmware);
    responder.set_time(START);
    responder
}

/// run a test against a simulated treadmill, with the master receive loop running
pub fn with_treadmill<T, F>(test: T)
where
    T: FnOnce(Arc<PipeMaster>) -> F,
    F: Future,
{
    with_pipe(&Settings::default(), |master, bus| async move {
        let mut device = simulated(bus);
        (
            async {
                test(master).await;
            },
            async {
                device.run().await.expect("simulated device failed");
                std::future::pending::<()>().await
            },
        ).race().await;
    });
}

/// run a test given the device end of the pipe, with the master receive loop running
pub fn with_pipe<T, F>(settings: &Settings, test: T)
where
    T: FnOnce(Arc<PipeMaster>, DuplexStream) -> F,
    F: Future,
{
    init_log();
    tokio::runtime::Runtime::new()
    .expect("failed to create runtime")
    .block_on(async move {
        let (master, bus) = pipe(settings);
        let master = Arc::new(master);
        (
            async {
                tokio::time::timeout(Duration::from_secs(10), test(master.clone(), bus))
                .await.expect("aborted test because took too long");
            },
            async {
                master.run()
                .await.expect("master communication failed");
                std::future::pending::<()>().await
            },
        ).race().await;
    });
}
