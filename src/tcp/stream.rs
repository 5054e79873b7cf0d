//! The application-facing handle to one connection. A thin wrapper
//! over an [`Endpoint`], plus `std::io::Read`/`Write` impls layered on
//! top of `recv`/`send` for callers that want to use the stream with
//! ordinary Rust I/O plumbing (the gateway's TCP-bridge demo does).

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use crate::err::Error;
use crate::tcp::{Endpoint, Peer, State};

#[derive(Debug, Clone)]
pub struct TcpStream {
    pub(crate) endpoint: Arc<Endpoint>,
}

impl TcpStream {
    pub(crate) fn new(endpoint: Arc<Endpoint>) -> Self {
        TcpStream { endpoint }
    }

    pub fn send(&self, bytes: &[u8]) -> Result<usize, Error> {
        self.endpoint.send(bytes)
    }

    pub fn recv(&self, buf: &mut [u8]) -> Result<usize, Error> {
        self.endpoint.recv(buf)
    }

    pub fn close(&self) {
        self.endpoint.close();
    }

    pub fn set_timeout(&self, timeout: Option<Duration>) {
        self.endpoint.set_timeout(timeout);
    }

    pub fn set_blocking(&self, blocking: bool) {
        self.endpoint.set_blocking(blocking);
    }

    pub fn get_peer(&self) -> Result<Peer, Error> {
        self.endpoint.get_peer()
    }

    pub fn state(&self) -> State {
        self.endpoint.state()
    }
}

impl Read for TcpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.endpoint
            .recv(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

impl Write for TcpStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.endpoint
            .send(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for TcpStream {
    fn drop(&mut self) {
        if Arc::strong_count(&self.endpoint) == 1 {
            self.endpoint.close();
        }
    }
}
