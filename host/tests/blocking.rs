mod common;

use std::sync::Arc;
use harp_treadmill::{
    registers,
    treadmill,
    host::{blocking, Error, Settings},
    };
use common::{pipe, simulated, init_log};


#[test]
fn blocking_device() {
    init_log();
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (master, bus) = pipe(&Settings::default());
    let mut device = simulated(bus);
    runtime.spawn(async move {
        device.run().await.unwrap();
    });

    let device = blocking::Device::with_master(runtime, Arc::new(master), &treadmill::CATALOG).unwrap();
    assert_eq!(device.read(registers::WHO_AM_I).unwrap(), treadmill::WHO_AM_I);
    device.write(treadmill::BRAKE_CURRENT_SET_POINT, 123).unwrap();
    assert_eq!(device.read(treadmill::BRAKE_CURRENT_SET_POINT).unwrap(), 123);
    assert_eq!(device.read_timestamped(treadmill::ENCODER).unwrap().value, 0);
    assert_eq!(device.read_identity().unwrap().name, "Treadmill");
    assert_eq!(device.read_raw(treadmill::TORQUE_LIMIT_STATE.address()).unwrap().payload(), &[0]);
    assert!(matches!(
        device.write(treadmill::SENSOR_DATA_DISPATCH_RATE, 2000),
        Err(Error::Device {address: 36, ..}),
    ));
}

#[test]
fn blocking_identity_gate() {
    init_log();
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (master, bus) = pipe(&Settings::default());
    let mut device = simulated(bus);
    device.bank_mut().set(registers::WHO_AM_I, 2000).unwrap();
    runtime.spawn(async move {
        device.run().await.unwrap();
    });
    assert!(matches!(
        blocking::Device::with_master(runtime, Arc::new(master), &treadmill::CATALOG),
        Err(Error::UnexpectedDeviceIdentity {expected: treadmill::WHO_AM_I, actual: 2000}),
    ));
}
