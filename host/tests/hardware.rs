//! tests against an actual treadmill plugged on /dev/ttyUSB0, run them with `cargo test -- --ignored`

use std::time::Duration;
use futures_concurrency::future::Race;
use serial_test::serial;

use harp_treadmill::{
    registers::OperationMode,
    treadmill::{self, Revision},
    host::{blocking, Master, Settings, Treadmill},
    };

const PORT: &str = "/dev/ttyUSB0";


#[test]
#[ignore]
#[serial]
fn identity() {
    let device = blocking::Device::open(PORT, &Settings::default(), Revision::default().catalog())
        .expect("failed to connect treadmill");
    let identity = device.read_identity().unwrap();
    assert_eq!(identity.who_am_i, treadmill::WHO_AM_I);
    assert_eq!(device.read(treadmill::TORQUE_LIMIT_STATE).unwrap(), 0);
}

#[test]
#[ignore]
#[serial]
fn sensor_events() {
    tokio::runtime::Runtime::new()
    .expect("failed to create runtime")
    .block_on(async {
        let master = Master::open(PORT, &Settings::default()).expect("failed to open port");
        (
            async {
                let treadmill = Treadmill::connect(&master).await.unwrap();
                let demux = treadmill.demultiplexer();
                let mut sensors = demux.subscribe(treadmill::SENSOR_DATA).unwrap();
                let events = treadmill.events();
                treadmill.write_sensor_data_dispatch_rate(100).await.unwrap();
                treadmill.set_operation_mode(OperationMode::Active).await.unwrap();
                (
                    demux.run(events),
                    async {
                        let mut last = 0.;
                        for _ in 0 .. 50 {
                            let data = tokio::time::timeout(Duration::from_secs(1), sensors.recv_timestamped()).await
                                .expect("no sensor event").unwrap().unwrap();
                            assert!(data.seconds > last);
                            last = data.seconds;
                        }
                    },
                ).race().await;
                treadmill.write_sensor_data_dispatch_rate(0).await.unwrap();
            },
            async {
                master.run().await.expect("master communication failed");
            },
        ).race().await;
    });
}
