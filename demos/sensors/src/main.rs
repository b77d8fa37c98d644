use futures_concurrency::future::Race;
use harp_treadmill::{
    registers::OperationMode,
    treadmill::SENSOR_DATA,
    host::{Master, Settings, Treadmill},
    };

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "/dev/ttyUSB0".into());
    println!("opening {}", path);
    let master = Master::open(&path, &Settings::default()).unwrap();

    let task = async {
        let treadmill = Treadmill::connect(&master).await.unwrap();
        let identity = treadmill.read_identity().await.unwrap();
        println!("connected to {:?}", identity);

        let demux = treadmill.demultiplexer();
        let mut sensors = demux.subscribe(SENSOR_DATA).unwrap();
        let events = treadmill.events();

        treadmill.write_sensor_data_dispatch_rate(100).await.unwrap();
        treadmill.set_operation_mode(OperationMode::Active).await.unwrap();
        (
            demux.run(events),
            async {
                for _ in 0 .. 200 {
                    let Some(data) = sensors.recv_timestamped().await else {break};
                    let data = data.unwrap();
                    println!("{:.6}  encoder {:8}  torque {:6}  brake {:6}",
                        data.seconds,
                        data.value.encoder,
                        data.value.torque,
                        data.value.torque_load_current,
                        );
                }
            },
        ).race().await;
        treadmill.write_sensor_data_dispatch_rate(0).await.unwrap();
    };
    (
        task,
        async { master.run().await.unwrap() },
    ).race().await;
}
