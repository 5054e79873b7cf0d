//! End-to-end scenario 5: a segment that never gets ACKed is resent up
//! to `max_retransmission_attempts` times, then the connection gives up
//! with an RST and further `send()` calls report `ConnectionReset`.

use std::net::Ipv4Addr;
use std::thread;
use std::time::Duration;

use loratcp::segment::RST;
use loratcp::tcp::{Endpoint, Peer};
use loratcp::{Config, Error};

#[test]
fn exhausting_retransmission_attempts_resets_the_connection() {
    let mut config = Config::default();
    config.retransmission_timeout_ms = 2;
    config.max_retransmission_attempts = 3;

    let peer = Peer {
        ip: Ipv4Addr::new(10, 0, 0, 2),
        port: 1883,
    };
    let (ep, _syn) = Endpoint::connect(5, peer, config);

    let mut gave_up = false;
    for _ in 0..200 {
        thread::sleep(Duration::from_millis(3));
        let outcome = ep.tick();
        if outcome.delete {
            assert_eq!(outcome.to_send.len(), 1);
            assert!(outcome.to_send[0].has(RST));
            gave_up = true;
            break;
        }
    }

    assert!(gave_up, "never gave up retransmitting the SYN");
    assert!(matches!(ep.send(b"x"), Err(Error::ConnectionReset)));
}
