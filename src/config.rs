/// Protocol-wide tunables, gathered in one place the way the original
/// LoRa stack keeps its constants in `lora_config.py`. Everything here
/// has a spec-mandated default; callers only override what they need
/// to for testing (e.g. shrinking the duty-cycle window).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Airtime budget per `duty_cycle_window_ms`, in milliseconds.
    pub duty_cycle_budget_ms: u64,
    /// Sliding window over which `duty_cycle_budget_ms` is enforced.
    pub duty_cycle_window_ms: u64,
    /// A sensor is considered active if heard from within this long.
    pub sensor_active_timeout_ms: u64,
    /// Base retransmission timeout; fixed, not RTT-adaptive.
    pub retransmission_timeout_ms: u64,
    /// TIME_WAIT quiescence period before a TCB is deleted.
    pub time_wait_timeout_ms: u64,
    /// Attempts for the same sequence number before giving up with RST.
    pub max_retransmission_attempts: u32,
    /// Upper bound on concurrently live socket-ids (0..=15 on the wire).
    pub max_sockets: u8,
    /// Initial/maximum advertised send and receive window, in bytes.
    pub initial_window: u16,
    /// Data-link transmit queue capacity.
    pub tx_queue_capacity: usize,
    /// Per-connection retransmission queue capacity.
    pub rtx_queue_capacity: usize,
    /// Consecutive sensor-side modem faults before a device reset is recommended.
    pub max_consecutive_busy_faults: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            duty_cycle_budget_ms: 36_000,
            duty_cycle_window_ms: 3_600_000,
            sensor_active_timeout_ms: 10_000,
            retransmission_timeout_ms: 1_500,
            time_wait_timeout_ms: 1_000,
            max_retransmission_attempts: 25,
            max_sockets: 16,
            initial_window: 242,
            tx_queue_capacity: 10,
            rtx_queue_capacity: 20,
            max_consecutive_busy_faults: 10,
        }
    }
}
