//! A reliable, connection-oriented transport over a half-duplex LoRa
//! radio link. `NetStack` is the process-wide entry point: it owns the
//! data-link and spawns the networking worker thread, the way the
//! teacher's `NetStack` owns a TUN device and its `segment_loop`
//! thread — generalized here to a radio instead of a kernel device and
//! to many sensors sharing one gateway instead of one IP stack.

pub mod config;
pub mod datalink;
pub mod err;
pub mod frame;
pub mod queue;
pub mod registry;
pub mod segment;
pub mod seq;
pub mod tcp;
mod worker;

pub use config::Config;
pub use datalink::radio::{Radio, RadioFault};
pub use datalink::Role;
pub use err::Error;
pub use tcp::{Peer, State, TcpListener, TcpStream};

use std::sync::Arc;
use std::thread;

use frame::Address;
use worker::Manager;

/// The running stack: one radio, one worker thread, any number of
/// listeners and connections. Dropping this does not stop the worker;
/// call [`NetStack::stop`] for a graceful shutdown, or [`NetStack::join`]
/// to simply block until the worker stops on its own, the way the
/// teacher's `NetStack::join` waits out its background threads.
pub struct NetStack {
    manager: Arc<Manager>,
    worker: thread::JoinHandle<()>,
}

impl NetStack {
    pub fn new(role: Role, local_address: Address, radio: Box<dyn Radio>, config: Config) -> Self {
        let manager = Manager::new(role, local_address, radio, config);
        let worker = worker::spawn(manager.clone());
        NetStack { manager, worker }
    }

    /// Gateway-only: register a new listening socket-id, returning the
    /// listener to `accept()` incoming connections on.
    pub fn listen(&self) -> Result<Arc<TcpListener>, Error> {
        self.manager.listen()
    }

    /// Active open: send the initial SYN and return a stream to use
    /// immediately — the handshake completes in the background as the
    /// worker drives it.
    pub fn connect(&self, peer: Peer) -> Result<TcpStream, Error> {
        self.manager.connect(peer)
    }

    /// Sensor-only: announce return from deep sleep before resuming
    /// normal operation.
    pub fn woke_up(&self) {
        self.manager.woke_up();
    }

    pub fn is_sleep_ready(&self) -> bool {
        self.manager.is_sleep_ready()
    }

    pub fn prepare_for_sleep(&self) {
        self.manager.prepare_for_sleep();
    }

    pub fn should_reset_device(&self) -> bool {
        self.manager.should_reset_device()
    }

    /// Signals shutdown, requests every tracked connection close
    /// gracefully, briefly drains the worker, then joins it.
    pub fn stop(self) {
        self.manager.begin_shutdown();
        thread::sleep(std::time::Duration::from_millis(50));
        self.worker.join().unwrap();
    }

    pub fn join(self) {
        self.worker.join().unwrap();
    }
}
