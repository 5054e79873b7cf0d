//! The networking worker: a single background thread that round-robins
//! every live transport endpoint and the data-link once per iteration,
//! the only thread that mutates connection state. Generalizes the
//! teacher's `segment_loop` (which drove one TUN fd and a `Manager` map
//! keyed by IP/port quad) to a socket-id-keyed map driving a radio.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::datalink::radio::Radio;
use crate::datalink::{DataLink, LinkEvent, Role};
use crate::err::Error;
use crate::frame::Address;
use crate::segment::{Segment, SYN};
use crate::tcp::{Endpoint, Peer, State, TcpListener, TcpStream};

pub struct Manager {
    config: Config,
    role: Role,
    datalink: Mutex<DataLink>,
    endpoints: Mutex<HashMap<u8, Arc<Endpoint>>>,
    listeners: Mutex<HashMap<u8, Arc<TcpListener>>>,
    /// Remembers which listener accepted a connection still in
    /// SYN_RCVD, so the connection can be handed to that listener's
    /// queue the moment it reaches ESTABLISHED.
    accepting_listener: Mutex<HashMap<u8, Arc<TcpListener>>>,
    shutdown: AtomicBool,
}

impl Manager {
    pub fn new(role: Role, local_address: Address, radio: Box<dyn Radio>, config: Config) -> Arc<Self> {
        Arc::new(Manager {
            config,
            role,
            datalink: Mutex::new(DataLink::new(role, local_address, radio, config)),
            endpoints: Mutex::new(HashMap::new()),
            listeners: Mutex::new(HashMap::new()),
            accepting_listener: Mutex::new(HashMap::new()),
            shutdown: AtomicBool::new(false),
        })
    }

    fn allocate_socket_id(&self) -> Result<u8, Error> {
        let endpoints = self.endpoints.lock().unwrap();
        let listeners = self.listeners.lock().unwrap();
        (0..self.config.max_sockets)
            .find(|id| !endpoints.contains_key(id) && !listeners.contains_key(id))
            .ok_or(Error::NoFreeSocketId(self.config.max_sockets))
    }

    /// Gateway-only: registers a new listening socket-id. Call
    /// `TcpListener::accept` on the result to actually wait for
    /// connections.
    pub fn listen(&self) -> Result<Arc<TcpListener>, Error> {
        let socket_id = self.allocate_socket_id()?;
        let listener = TcpListener::new(socket_id, self.config);
        self.listeners.lock().unwrap().insert(socket_id, listener.clone());
        Ok(listener)
    }

    /// Active open: sends the initial SYN and returns a stream the
    /// caller polls via `recv`/`send` while the worker drives the
    /// handshake to completion.
    pub fn connect(&self, peer: Peer) -> Result<TcpStream, Error> {
        let already_connected = self.endpoints.lock().unwrap().values().any(|endpoint| {
            matches!(endpoint.get_peer(), Ok(p) if p == peer) && endpoint.state() != State::TimeWait
        });
        if already_connected {
            return Err(Error::AlreadyConnected);
        }

        let socket_id = self.allocate_socket_id()?;
        let (endpoint, syn) = Endpoint::connect(socket_id, peer, self.config);
        self.endpoints.lock().unwrap().insert(socket_id, endpoint.clone());

        let mut datalink = self.datalink.lock().unwrap();
        if self.role == Role::Gateway {
            // An active open from the gateway still needs a sensor
            // address to route through; callers on the gateway side
            // are expected to use listen()/accept() instead.
            log::warn!("connect() called on the gateway role; outbound routing needs a bound sensor");
        }
        datalink.enqueue_for_send(socket_id, syn.encode());
        drop(datalink);

        Ok(TcpStream::new(endpoint))
    }

    /// One iteration: tick every endpoint, drain the data-link, and
    /// dispatch whatever arrived.
    pub fn step(&self) {
        let mut outgoing: Vec<(u8, Vec<u8>)> = Vec::new();
        let mut to_remove = Vec::new();

        {
            let endpoints = self.endpoints.lock().unwrap();
            for (socket_id, endpoint) in endpoints.iter() {
                for seg in endpoint.drain_pending() {
                    outgoing.push((*socket_id, seg.encode()));
                }
                let outcome = endpoint.tick();
                for seg in outcome.to_send {
                    outgoing.push((*socket_id, seg.encode()));
                }
                if outcome.delete {
                    to_remove.push(*socket_id);
                }
            }
        }

        let events = {
            let mut datalink = self.datalink.lock().unwrap();
            for (socket_id, bytes) in outgoing {
                datalink.enqueue_for_send(socket_id, bytes);
            }
            datalink.run()
        };

        for event in events {
            self.dispatch(event);
        }

        if !to_remove.is_empty() {
            let mut endpoints = self.endpoints.lock().unwrap();
            let mut accepting = self.accepting_listener.lock().unwrap();
            let mut datalink = self.datalink.lock().unwrap();
            for socket_id in to_remove {
                endpoints.remove(&socket_id);
                accepting.remove(&socket_id);
                datalink.unbind_socket(socket_id);
            }
        }
    }

    fn dispatch(&self, event: LinkEvent) {
        match event {
            LinkEvent::WokeUp { .. } => {}
            LinkEvent::Segment { source, segment } => self.dispatch_segment(source, segment),
        }
    }

    fn dispatch_segment(&self, source: Address, segment: Segment) {
        let socket_id = segment.socket_id;

        let endpoint = self.endpoints.lock().unwrap().get(&socket_id).cloned();
        if let Some(endpoint) = endpoint {
            let outcome = endpoint.on_segment(&segment);
            if outcome.promoted {
                if let Some(listener) = self.accepting_listener.lock().unwrap().remove(&socket_id) {
                    listener.push_accepted(endpoint.clone());
                }
            }
            let mut datalink = self.datalink.lock().unwrap();
            for seg in outcome.to_send {
                datalink.enqueue_for_send(socket_id, seg.encode());
            }
            return;
        }

        if let Some(listener) = self.first_listener() {
            if segment.has(SYN) {
                if let Ok(new_socket_id) = self.allocate_socket_id() {
                    if let Some((endpoint, synack)) = listener.handle_syn(new_socket_id, &segment) {
                        let mut datalink = self.datalink.lock().unwrap();
                        datalink.bind_socket(source, new_socket_id);
                        datalink.enqueue_for_send(new_socket_id, synack.encode());
                        drop(datalink);
                        self.endpoints.lock().unwrap().insert(new_socket_id, endpoint);
                        self.accepting_listener
                            .lock()
                            .unwrap()
                            .insert(new_socket_id, listener);
                        return;
                    }
                } else {
                    log::warn!("no free socket-ids, dropping incoming SYN");
                }
            }
        }

        log::warn!("socket {socket_id} matched no endpoint or listener, dropping segment");
    }

    fn first_listener(&self) -> Option<Arc<TcpListener>> {
        self.listeners.lock().unwrap().values().next().cloned()
    }

    pub fn woke_up(&self) {
        self.datalink.lock().unwrap().woke_up();
    }

    pub fn is_sleep_ready(&self) -> bool {
        self.datalink.lock().unwrap().is_sleep_ready()
    }

    pub fn prepare_for_sleep(&self) {
        self.datalink.lock().unwrap().prepare_for_sleep();
    }

    pub fn should_reset_device(&self) -> bool {
        self.datalink.lock().unwrap().should_reset_device()
    }

    /// Requests every tracked endpoint close gracefully and stops
    /// routing to listeners, without blocking for the close handshakes
    /// to actually finish on the wire.
    pub fn begin_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        for endpoint in self.endpoints.lock().unwrap().values() {
            endpoint.request_close();
        }
        self.listeners.lock().unwrap().clear();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

/// Spawns the background thread driving `Manager::step` until
/// `Manager::begin_shutdown` is called.
pub fn spawn(manager: Arc<Manager>) -> thread::JoinHandle<()> {
    thread::spawn(move || loop {
        manager.step();
        if manager.is_shutting_down() {
            break;
        }
        thread::sleep(Duration::from_millis(20));
    })
}
