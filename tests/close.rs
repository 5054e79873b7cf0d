//! End-to-end scenario 4: a graceful close initiated by the sensor
//! walks both endpoints through FIN_WAIT_1/CLOSE_WAIT, and once the
//! gateway closes its own half too, both sides reach TIME_WAIT and
//! `close()` returns once the TCB would be torn down.

use std::net::Ipv4Addr;
use std::thread;
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
fn four_way_close_reaches_time_wait_on_both_sides() {
    let (gateway_radio, sensor_radio) = LoopbackRadio::pair();
    let mut config = Config::default();
    config.time_wait_timeout_ms = 50;

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

    // The sensor closes first; the gateway only sees the FIN a tick
    // later, so wait for CLOSE_WAIT before closing its own half.
    let client_closer = client.clone();
    let closing_client = thread::spawn(move || client_closer.close());

    assert!(wait_for(Duration::from_secs(2), || server.state() == State::CloseWait));
    server.close();

    closing_client.join().unwrap();
    assert_eq!(client.state(), State::TimeWait);
    assert_eq!(server.state(), State::TimeWait);
}
