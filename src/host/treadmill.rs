use core::ops::Deref;

use crate::{
    payload::Timestamped,
    treadmill::{self, SensorData, Sensors, EnableFlag},
    };
use super::{Error, Transport, Device};


/// read methods of readable registers, plain and timestamped
macro_rules! readers {
    ($($register:ident: $t:ty => $read:ident, $read_timestamped:ident;)*) => {$(
        #[doc = concat!("read [", stringify!($register), "](treadmill::", stringify!($register), ")")]
        pub async fn $read(&self) -> Result<$t, Error> {
            self.device.read(treadmill::$register).await
        }
        #[doc = concat!("read [", stringify!($register), "](treadmill::", stringify!($register), ") with the device time")]
        pub async fn $read_timestamped(&self) -> Result<Timestamped<$t>, Error> {
            self.device.read_timestamped(treadmill::$register).await
        }
    )*};
}
/// write methods of writable registers
macro_rules! writers {
    ($($register:ident: $t:ty => $write:ident;)*) => {$(
        #[doc = concat!("write [", stringify!($register), "](treadmill::", stringify!($register), ")")]
        pub async fn $write(&self, value: $t) -> Result<(), Error> {
            self.device.write(treadmill::$register, value).await
        }
    )*};
}


/**
    treadmill running the current firmware

    it dereferences to the generic [Device] for common registers and demultiplexing
*/
pub struct Treadmill<T> {
    device: Device<T>,
}
impl<T: Transport> Treadmill<T> {
    /// check the device is a treadmill and return a handle to it
    pub async fn connect(transport: T) -> Result<Self, Error> {
        Ok(Self {device: Device::connect(transport, &treadmill::CATALOG).await?})
    }
    pub fn into_device(self) -> Device<T> {self.device}

    readers! {
        ENCODER: i32 => read_encoder, read_timestamped_encoder;
        TORQUE: i16 => read_torque, read_timestamped_torque;
        TORQUE_LOAD_CURRENT: i16 => read_torque_load_current, read_timestamped_torque_load_current;
        SENSOR_DATA: SensorData => read_sensor_data, read_timestamped_sensor_data;
        SENSOR_DATA_DISPATCH_RATE: u16 => read_sensor_data_dispatch_rate, read_timestamped_sensor_data_dispatch_rate;
        BRAKE_CURRENT_SET_POINT: u16 => read_brake_current_set_point, read_timestamped_brake_current_set_point;
        TARE_SENSORS: Sensors => read_tare_sensors, read_timestamped_tare_sensors;
        RESET_TARE_SENSORS: Sensors => read_reset_tare_sensors, read_timestamped_reset_tare_sensors;
        ENABLE_TORQUE_LIMIT: EnableFlag => read_enable_torque_limit, read_timestamped_enable_torque_limit;
        TORQUE_LIMIT_STATE: u8 => read_torque_limit_state, read_timestamped_torque_limit_state;
    }
    writers! {
        SENSOR_DATA_DISPATCH_RATE: u16 => write_sensor_data_dispatch_rate;
        BRAKE_CURRENT_SET_POINT: u16 => write_brake_current_set_point;
        TARE_SENSORS: Sensors => write_tare_sensors;
        RESET_TARE_SENSORS: Sensors => write_reset_tare_sensors;
        ENABLE_TORQUE_LIMIT: EnableFlag => write_enable_torque_limit;
        TORQUE_LIMIT_STATE: u8 => write_torque_limit_state;
    }
}
impl<T> Deref for Treadmill<T> {
    type Target = Device<T>;
    fn deref(&self) -> &Device<T> {&self.device}
}
