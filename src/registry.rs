//! Gateway-side bookkeeping: which radio address owns which socket-ids,
//! and whether that sensor has been heard from recently enough to be
//! worth transmitting to. Grounded in `LoRaDataLink.py`'s `SensorState`
//! table.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::frame::Address;

#[derive(Debug, Clone)]
pub struct SensorRecord {
    pub socket_ids: HashSet<u8>,
    pub last_communication: Instant,
}

#[derive(Debug, Default)]
pub struct SensorRegistry {
    sensors: HashMap<Address, SensorRecord>,
    by_socket_id: HashMap<u8, Address>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        SensorRegistry::default()
    }

    /// Record that `address` was just heard from, creating the record
    /// if this is the first time.
    pub fn touch(&mut self, address: Address) {
        self.sensors
            .entry(address)
            .or_insert_with(|| SensorRecord {
                socket_ids: HashSet::new(),
                last_communication: Instant::now(),
            })
            .last_communication = Instant::now();
    }

    pub fn bind_socket(&mut self, address: Address, socket_id: u8) {
        self.touch(address);
        self.sensors
            .get_mut(&address)
            .unwrap()
            .socket_ids
            .insert(socket_id);
        self.by_socket_id.insert(socket_id, address);
    }

    pub fn unbind_socket(&mut self, socket_id: u8) {
        if let Some(address) = self.by_socket_id.remove(&socket_id) {
            if let Some(rec) = self.sensors.get_mut(&address) {
                rec.socket_ids.remove(&socket_id);
            }
        }
    }

    pub fn address_for_socket(&self, socket_id: u8) -> Option<Address> {
        self.by_socket_id.get(&socket_id).copied()
    }

    pub fn is_active(&self, address: &Address, active_timeout: Duration) -> bool {
        match self.sensors.get(address) {
            Some(rec) => rec.last_communication.elapsed() <= active_timeout,
            None => false,
        }
    }

    pub fn is_socket_active(&self, socket_id: u8, active_timeout: Duration) -> bool {
        match self.address_for_socket(socket_id) {
            Some(address) => self.is_active(&address, active_timeout),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshly_touched_sensor_is_active() {
        let mut reg = SensorRegistry::new();
        reg.touch([1; 6]);
        assert!(reg.is_active(&[1; 6], Duration::from_secs(10)));
    }

    #[test]
    fn unknown_sensor_is_not_active() {
        let reg = SensorRegistry::new();
        assert!(!reg.is_active(&[9; 6], Duration::from_secs(10)));
    }

    #[test]
    fn socket_binding_round_trips_to_address() {
        let mut reg = SensorRegistry::new();
        reg.bind_socket([2; 6], 5);
        assert_eq!(reg.address_for_socket(5), Some([2; 6]));
        assert!(reg.is_socket_active(5, Duration::from_secs(10)));
        reg.unbind_socket(5);
        assert_eq!(reg.address_for_socket(5), None);
    }
}
