use harp_treadmill::{
    registers,
    treadmill::{self, Revision},
    host::{blocking, Settings},
    };

fn main() {
    pretty_env_logger::init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "/dev/ttyUSB0".into());
    let device = blocking::Device::open(&path, &Settings::default(), Revision::default().catalog()).unwrap();
    println!("{:#?}", device.read_identity().unwrap());
    println!("operation control: {:?}", device.read(registers::OPERATION_CONTROL).unwrap());
    println!("torque limit: {:?}", device.read(treadmill::ENABLE_TORQUE_LIMIT).unwrap());
    for register in device.catalog().iter() {
        let frame = device.read_raw(register.address).unwrap();
        println!("{:>3} {:<26} {:?}", register.address, register.name, frame.payload());
    }
}
