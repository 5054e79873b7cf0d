//! Shuttles bytes between one accepted transport connection and an
//! outbound `std::net::TcpStream`, the seam the real gateway uses to
//! hand a sensor's stream to an MQTT broker. The broker connection and
//! MQTT framing themselves are out of scope here.

use std::io::{self, Read, Write};
use std::net::TcpStream as WireTcpStream;
use std::thread;
use std::time::Duration;

use loratcp::datalink::radio::loopback::LoopbackRadio;
use loratcp::{Config, NetStack, Role, TcpStream};

fn bridge(mut lora: TcpStream, mut wire: WireTcpStream) -> io::Result<()> {
    let mut lora_to_wire = lora.clone();
    let mut wire_to_lora = wire.try_clone()?;

    let uplink = thread::spawn(move || {
        let mut buf = [0u8; 256];
        loop {
            match lora_to_wire.read(&mut buf) {
                Ok(0) | Err(_) => return,
                Ok(n) => {
                    if wire.write_all(&buf[..n]).is_err() {
                        return;
                    }
                }
            }
        }
    });

    let mut buf = [0u8; 256];
    loop {
        match wire_to_lora.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if lora.write_all(&buf[..n]).is_err() {
                    break;
                }
            }
        }
    }

    let _ = uplink.join();
    Ok(())
}

fn main() {
    env_logger::init();

    let broker_addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:1883".to_string());

    let (gateway_radio, _sensor_radio) = LoopbackRadio::pair();
    let stack = NetStack::new(
        Role::Gateway,
        [0xaa; 6],
        Box::new(gateway_radio),
        Config::default(),
    );
    let listener = stack.listen().expect("no free socket-ids");

    loop {
        let lora = match listener.accept(Some(Duration::from_secs(30))) {
            Ok(stream) => stream,
            Err(_) => continue,
        };
        let broker_addr = broker_addr.clone();
        thread::spawn(move || match WireTcpStream::connect(&broker_addr) {
            Ok(wire) => {
                if let Err(e) = bridge(lora, wire) {
                    log::warn!("bridge to {broker_addr} ended: {e}");
                }
            }
            Err(e) => log::warn!("could not reach broker at {broker_addr}: {e}"),
        });
    }
}
