//! End-to-end scenario 1 from the spec's testable properties: a full
//! three-way handshake over a loopback radio pair, sensor initiating.

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use loratcp::datalink::radio::loopback::LoopbackRadio;
use loratcp::{Config, NetStack, Peer, Role, State};

fn wait_for(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    done()
}

#[test]
fn three_way_handshake_reaches_established_on_both_sides() {
    let (gateway_radio, sensor_radio) = LoopbackRadio::pair();
    let config = Config::default();

    let gateway = NetStack::new(Role::Gateway, [0xaa; 6], Box::new(gateway_radio), config);
    let sensor = NetStack::new(Role::Sensor, [0xbb; 6], Box::new(sensor_radio), config);

    let listener = gateway.listen().unwrap();
    let peer = Peer {
        ip: Ipv4Addr::new(192, 168, 1, 1),
        port: 1883,
    };
    let client = sensor.connect(peer).unwrap();

    assert!(wait_for(Duration::from_secs(2), || client.state() == State::Estab));

    let server = listener.accept(Some(Duration::from_secs(1))).unwrap();
    assert_eq!(server.state(), State::Estab);
    assert_eq!(server.get_peer().unwrap(), peer);
}
