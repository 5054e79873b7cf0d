//! A minimal sensor process: connects to the gateway's well-known
//! socket-id, writes one line, and reports whatever comes back.

use std::io::{Read, Write};
use std::net::Ipv4Addr;
use std::thread;
use std::time::Duration;

use loratcp::datalink::radio::loopback::LoopbackRadio;
use loratcp::{Config, NetStack, Peer, Role};

fn main() {
    env_logger::init();

    let (_gateway_radio, sensor_radio) = LoopbackRadio::pair();
    let local_address = [0xbb; 6];
    let stack = NetStack::new(
        Role::Sensor,
        local_address,
        Box::new(sensor_radio),
        Config::default(),
    );

    let broker = Peer {
        ip: Ipv4Addr::new(192, 168, 1, 1),
        port: 1883,
    };
    let mut stream = stack.connect(broker).expect("no free socket-ids");

    stream.write_all(b"hello gateway\n").expect("write failed");

    let mut buf = [0u8; 256];
    if let Ok(n) = stream.read(&mut buf) {
        log::info!("gateway replied: {:?}", &buf[..n]);
    }

    thread::sleep(Duration::from_secs(1));
    stream.close();

    if stack.is_sleep_ready() {
        stack.prepare_for_sleep();
    }
}
