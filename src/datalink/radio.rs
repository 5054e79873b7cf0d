//! The radio driver boundary. The real driver (SPI to a SX127x-class
//! modem, interrupt-driven RX) is out of scope here — it is an
//! external collaborator this crate only talks to through this trait,
//! the same way the original `LoRaDataLink` talks to a `LoRa` object
//! it is handed rather than one it constructs.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioFault {
    /// The modem did not leave its busy state within the driver's own
    /// deadline. Recovered locally by the data-link; never surfaced
    /// to the transport layer.
    BusyTimeout,
}

pub trait Radio: Send {
    /// Send `bytes` over the air, blocking until transmission
    /// completes. Returns the time actually spent transmitting, which
    /// the data-link charges against the duty-cycle budget.
    fn send(&mut self, bytes: &[u8]) -> Result<Duration, RadioFault>;

    /// Put the modem in continuous-receive mode.
    fn start_recv(&mut self) -> Result<(), RadioFault>;

    /// Non-blocking poll for a received frame. `Ok(None)` means
    /// nothing arrived within the driver's own short internal wait.
    fn poll_recv(&mut self) -> Result<Option<Vec<u8>>, RadioFault>;

    /// Put the modem in its lowest-power standby state.
    fn standby(&mut self) -> Result<(), RadioFault>;

    /// Re-initialize the modem after a fault.
    fn reinit(&mut self) -> Result<(), RadioFault>;

    fn is_idle(&self) -> bool;
}

/// An in-memory radio used by tests and the demo binaries: two
/// instances sharing a queue stand in for a sensor/gateway pair on one
/// channel, the way `KINGFIOX-tapip-rs`'s examples drive its stack
/// against an in-memory medium instead of a NIC.
pub mod loopback {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct Channel {
        to_gateway: VecDeque<Vec<u8>>,
        to_sensor: VecDeque<Vec<u8>>,
    }

    #[derive(Debug, Clone)]
    pub struct LoopbackRadio {
        channel: Arc<Mutex<Channel>>,
        is_gateway_side: bool,
    }

    impl LoopbackRadio {
        pub fn pair() -> (LoopbackRadio, LoopbackRadio) {
            let channel = Arc::new(Mutex::new(Channel::default()));
            (
                LoopbackRadio {
                    channel: channel.clone(),
                    is_gateway_side: true,
                },
                LoopbackRadio {
                    channel,
                    is_gateway_side: false,
                },
            )
        }
    }

    impl Radio for LoopbackRadio {
        fn send(&mut self, bytes: &[u8]) -> Result<Duration, RadioFault> {
            let mut chan = self.channel.lock().unwrap();
            if self.is_gateway_side {
                chan.to_sensor.push_back(bytes.to_vec());
            } else {
                chan.to_gateway.push_back(bytes.to_vec());
            }
            Ok(Duration::from_millis(bytes.len() as u64))
        }

        fn start_recv(&mut self) -> Result<(), RadioFault> {
            Ok(())
        }

        fn poll_recv(&mut self) -> Result<Option<Vec<u8>>, RadioFault> {
            let mut chan = self.channel.lock().unwrap();
            let inbox = if self.is_gateway_side {
                &mut chan.to_gateway
            } else {
                &mut chan.to_sensor
            };
            Ok(inbox.pop_front())
        }

        fn standby(&mut self) -> Result<(), RadioFault> {
            Ok(())
        }

        fn reinit(&mut self) -> Result<(), RadioFault> {
            Ok(())
        }

        fn is_idle(&self) -> bool {
            let chan = self.channel.lock().unwrap();
            if self.is_gateway_side {
                chan.to_gateway.is_empty()
            } else {
                chan.to_sensor.is_empty()
            }
        }
    }
}
