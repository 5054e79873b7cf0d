//! A minimal gateway process: binds one listening socket-id and prints
//! every byte stream it accepts. Real deployments wire each accepted
//! stream into `demos/gateway_tcp_bridge.rs`'s bridge instead.

use std::io::Read;
use std::time::Duration;

use loratcp::datalink::radio::loopback::LoopbackRadio;
use loratcp::{Config, NetStack, Role};

fn main() {
    env_logger::init();

    // A real deployment hands in the SPI-backed radio driver; the
    // loopback stands in here so the binary runs without hardware.
    let (gateway_radio, _sensor_radio) = LoopbackRadio::pair();
    let local_address = [0xaa; 6];
    let stack = NetStack::new(
        Role::Gateway,
        local_address,
        Box::new(gateway_radio),
        Config::default(),
    );

    let listener = stack.listen().expect("no free socket-ids");
    log::info!("gateway listening");

    loop {
        let mut stream = match listener.accept(Some(Duration::from_secs(5))) {
            Ok(stream) => stream,
            Err(_) => continue,
        };
        let mut buf = [0u8; 256];
        match stream.read(&mut buf) {
            Ok(n) => log::info!("accepted connection, first read: {:?}", &buf[..n]),
            Err(e) => log::warn!("read failed: {e}"),
        }
    }
}
