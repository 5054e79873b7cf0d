//! The gateway-side listening socket: intercepts SYNs addressed to a
//! bound socket-id and promotes each into its own [`Endpoint`] once
//! the handshake's final ACK lands. Replaces the teacher's
//! `listen.rs`/`EstabEntry` pair with a single accept queue, since
//! here there is exactly one well-known listening socket-id rather
//! than one per TCP port.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::config::Config;
use crate::err::Error;
use crate::segment::{Segment, SYN};
use crate::tcp::endpoint::Endpoint;
use crate::tcp::tcb::Tcb;
use crate::tcp::stream::TcpStream;
use crate::tcp::Peer;

pub struct TcpListener {
    pub socket_id: u8,
    config: Config,
    queue: Mutex<VecDeque<Arc<Endpoint>>>,
    cvar: Condvar,
}

impl TcpListener {
    pub fn new(socket_id: u8, config: Config) -> Arc<Self> {
        Arc::new(TcpListener {
            socket_id,
            config,
            queue: Mutex::new(VecDeque::new()),
            cvar: Condvar::new(),
        })
    }

    /// A SYN arrived for this listener's socket-id. Builds the new
    /// connection's endpoint in SYN_RCVD and the SYN|ACK to send back.
    /// The caller still owns assigning the new connection its own
    /// socket-id and binding the sensor address with the data-link.
    pub fn handle_syn(&self, new_socket_id: u8, seg: &Segment) -> Option<(Arc<Endpoint>, Segment)> {
        if !seg.has(SYN) {
            return None;
        }
        let peer = Peer::decode(&seg.payload)?;
        let tcb = Tcb::new_syn_rcvd(new_socket_id, peer, seg.seq, seg.seq_len() as u16, self.config);
        let synack = Segment::new(new_socket_id, crate::segment::SYN | crate::segment::ACK, tcb.iss, tcb.rcv_nxt, Vec::new())
            .ok()?;
        let endpoint = Endpoint::from_syn_rcvd(tcb);
        Some((endpoint, synack))
    }

    pub fn push_accepted(&self, endpoint: Arc<Endpoint>) {
        self.queue.lock().unwrap().push_back(endpoint);
        self.cvar.notify_one();
    }

    /// Blocks until a connection has completed its handshake, honoring
    /// `timeout`; `None` means block indefinitely.
    pub fn accept(&self, timeout: Option<Duration>) -> Result<TcpStream, Error> {
        let mut queue = self.queue.lock().unwrap();
        loop {
            if let Some(endpoint) = queue.pop_front() {
                return Ok(TcpStream::new(endpoint));
            }
            queue = match timeout {
                Some(d) => {
                    let (guard, result) = self.cvar.wait_timeout(queue, d).unwrap();
                    if result.timed_out() && guard.is_empty() {
                        return Err(Error::Timeout);
                    }
                    guard
                }
                None => self.cvar.wait(queue).unwrap(),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seq::Seq;
    use std::net::Ipv4Addr;

    #[test]
    fn handle_syn_builds_syn_rcvd_endpoint_and_reply() {
        let listener = TcpListener::new(0, Config::default());
        let payload = Peer {
            ip: Ipv4Addr::new(192, 168, 1, 1),
            port: 1883,
        }
        .encode()
        .to_vec();
        let syn = Segment::new(0, SYN, Seq::new(42), Seq::new(0), payload).unwrap();

        let (endpoint, reply) = listener.handle_syn(3, &syn).unwrap();
        assert_eq!(endpoint.socket_id(), 3);
        assert!(reply.has(SYN) && reply.has(crate::segment::ACK));
        assert_eq!(reply.ack, Seq::new(43));
    }

    #[test]
    fn accept_blocks_until_an_endpoint_is_pushed() {
        let listener = TcpListener::new(0, Config::default());
        assert!(matches!(
            listener.accept(Some(Duration::from_millis(10))),
            Err(Error::Timeout)
        ));
    }
}
