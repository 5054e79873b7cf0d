//! A bound transport connection: owns one [`Tcb`] plus the
//! synchronization the application thread needs to block on `send`,
//! `recv` and `close`. Generalizes the teacher's `TCB::on_segment` and
//! `StreamEntry`'s condvar trio into a single self-contained object,
//! since here each connection is its own entity rather than one of
//! many keyed off a shared `Manager` map by IP/port quad.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::err::Error;
use crate::segment::{Segment, ACK, FIN, RST, SYN};
use crate::seq::Seq;
use crate::tcp::tcb::{RtxSegment, Tcb};
use crate::tcp::{Peer, State};

/// What the worker should do after feeding a segment or a tick to an
/// endpoint: segments to put on the wire, and whether the connection
/// is now done and should be dropped from the worker's tables.
#[derive(Debug, Default)]
pub struct Outcome {
    pub to_send: Vec<Segment>,
    pub delete: bool,
    /// Set exactly once, when a passively-opened connection reaches
    /// ESTABLISHED — the worker uses this to hand the endpoint to the
    /// listener's accept queue.
    pub promoted: bool,
}

impl Outcome {
    fn none() -> Self {
        Outcome::default()
    }

    fn send(to_send: Vec<Segment>) -> Self {
        Outcome {
            to_send,
            ..Default::default()
        }
    }

    fn delete() -> Self {
        Outcome {
            delete: true,
            ..Default::default()
        }
    }
}

pub struct Endpoint {
    tcb: Mutex<Tcb>,
    rvar: Condvar,
    wvar: Condvar,
    svar: Condvar,
    reset: AtomicBool,
    /// Set only when a RST arrives in SYN_SENT, so `send`/`recv` can
    /// report `ConnectionRefused` instead of the generic post-ESTAB
    /// `ConnectionReset`.
    refused: AtomicBool,
    done: AtomicBool,
    timeout: Mutex<Option<Duration>>,
    blocking: AtomicBool,
    /// Segments produced by `close()`, which runs on the application
    /// thread rather than the worker's own `on_segment`/`tick` calls;
    /// the worker drains this once per loop alongside its own output.
    pending: Mutex<Vec<Segment>>,
}

impl Endpoint {
    fn from_tcb(tcb: Tcb) -> Self {
        Endpoint {
            tcb: Mutex::new(tcb),
            rvar: Condvar::new(),
            wvar: Condvar::new(),
            svar: Condvar::new(),
            reset: AtomicBool::new(false),
            refused: AtomicBool::new(false),
            done: AtomicBool::new(false),
            timeout: Mutex::new(None),
            blocking: AtomicBool::new(true),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Segments queued outside of `on_segment`/`tick` (currently only
    /// by `close()`), for the worker to send this iteration.
    pub fn drain_pending(&self) -> Vec<Segment> {
        std::mem::take(&mut *self.pending.lock().unwrap())
    }

    pub fn from_syn_rcvd(tcb: Tcb) -> Arc<Self> {
        Arc::new(Endpoint::from_tcb(tcb))
    }

    /// Active open: builds the SYN_SENT endpoint and the initial SYN
    /// segment to hand the data-link. The remote address/port is
    /// tunneled in the SYN's payload per the wire contract.
    pub fn connect(socket_id: u8, peer: Peer, config: Config) -> (Arc<Self>, Segment) {
        let tcb = Tcb::new_syn_sent(socket_id, peer, config);
        let iss = tcb.iss;
        let seg = Segment::new(socket_id, SYN, iss, Seq::new(0), peer.encode().to_vec()).unwrap();
        (Arc::new(Endpoint::from_tcb(tcb)), seg)
    }

    pub fn socket_id(&self) -> u8 {
        self.tcb.lock().unwrap().socket_id
    }

    pub fn state(&self) -> State {
        self.tcb.lock().unwrap().state
    }

    pub fn get_peer(&self) -> Result<Peer, Error> {
        self.tcb.lock().unwrap().peer.ok_or(Error::NotConnected)
    }

    pub fn set_timeout(&self, timeout: Option<Duration>) {
        *self.timeout.lock().unwrap() = timeout;
    }

    pub fn set_blocking(&self, blocking: bool) {
        self.blocking.store(blocking, Ordering::Release);
    }

    fn notify_all(&self) {
        self.rvar.notify_all();
        self.wvar.notify_all();
        self.svar.notify_all();
    }

    pub fn send(&self, bytes: &[u8]) -> Result<usize, Error> {
        if self.refused.load(Ordering::Acquire) {
            return Err(Error::ConnectionRefused);
        }
        if self.reset.load(Ordering::Acquire) {
            return Err(Error::ConnectionReset);
        }

        let mut tcb = self.tcb.lock().unwrap();
        if matches!(
            tcb.state,
            State::FinWait1 | State::FinWait2 | State::Closing | State::LastAck | State::TimeWait
        ) {
            return Err(Error::ConnectionClosing);
        }

        if tcb.is_send_buffer_full() {
            if !self.blocking.load(Ordering::Acquire) {
                return Err(Error::WouldBlock);
            }
            let timeout = *self.timeout.lock().unwrap();
            tcb = self.wait_while_full(tcb, timeout)?;
        }

        let room = (tcb.config.initial_window as usize).saturating_sub(tcb.send_buffer.len());
        let take = room.min(bytes.len());
        tcb.send_buffer.extend(bytes[..take].iter());
        Ok(take)
    }

    fn wait_while_full<'a>(
        &self,
        mut tcb: MutexGuard<'a, Tcb>,
        timeout: Option<Duration>,
    ) -> Result<MutexGuard<'a, Tcb>, Error> {
        while tcb.is_send_buffer_full() {
            if self.refused.load(Ordering::Acquire) {
                return Err(Error::ConnectionRefused);
            }
            if self.reset.load(Ordering::Acquire) {
                return Err(Error::ConnectionReset);
            }
            tcb = match timeout {
                Some(d) => {
                    let (guard, result) = self.wvar.wait_timeout(tcb, d).unwrap();
                    if result.timed_out() {
                        return Err(Error::Timeout);
                    }
                    guard
                }
                None => self.wvar.wait(tcb).unwrap(),
            };
        }
        Ok(tcb)
    }

    pub fn recv(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let mut tcb = self.tcb.lock().unwrap();
        loop {
            if !tcb.reassembled.is_empty() {
                return Ok(tcb.recv(buf));
            }
            if self.refused.load(Ordering::Acquire) {
                return Err(Error::ConnectionRefused);
            }
            if self.reset.load(Ordering::Acquire) {
                return Err(Error::ConnectionReset);
            }
            if matches!(
                tcb.state,
                State::CloseWait | State::Closing | State::LastAck | State::TimeWait
            ) {
                return Err(Error::SocketClosed);
            }
            if !self.blocking.load(Ordering::Acquire) {
                return Err(Error::WouldBlock);
            }
            let timeout = *self.timeout.lock().unwrap();
            tcb = match timeout {
                Some(d) => {
                    let (guard, result) = self.rvar.wait_timeout(tcb, d).unwrap();
                    if result.timed_out() {
                        return Err(Error::Timeout);
                    }
                    guard
                }
                None => self.rvar.wait(tcb).unwrap(),
            };
        }
    }

    /// Request a graceful close and block until the worker reports the
    /// connection has actually reached its terminal state.
    pub fn close(&self) {
        self.request_close();
        let guard = self.tcb.lock().unwrap();
        let _ = self
            .svar
            .wait_while(guard, |_| !self.done.load(Ordering::Acquire));
    }

    /// The state-transition half of `close()`, split out so tests can
    /// observe it without blocking on a worker thread that isn't
    /// running, and so the worker can request a shutdown-time close
    /// without blocking itself.
    pub(crate) fn request_close(&self) {
        let mut tcb = self.tcb.lock().unwrap();
        let to_send = match tcb.state {
            State::SynSent => {
                self.reset.store(true, Ordering::Release);
                self.done.store(true, Ordering::Release);
                self.notify_all();
                Vec::new()
            }
            State::SynRcvd | State::Estab => {
                let seg = self.queue_fin(&mut tcb, FIN | ACK);
                tcb.state = State::FinWait1;
                vec![seg]
            }
            // Deliberately deviates from RFC 793 / LAST_ACK here: this
            // stack lands CLOSE_WAIT's close() in CLOSING rather than
            // LAST_ACK, mirroring the original implementation.
            State::CloseWait => {
                let seg = self.queue_fin(&mut tcb, FIN | ACK);
                tcb.state = State::Closing;
                vec![seg]
            }
            _ => {
                log::debug!("close() called on a connection already closing");
                Vec::new()
            }
        };
        drop(tcb);
        if !to_send.is_empty() {
            self.pending.lock().unwrap().extend(to_send);
        }
    }

    fn queue_fin(&self, tcb: &mut Tcb, flags: u8) -> Segment {
        let seq = tcb.snd_nxt;
        let seg = Segment::new(tcb.socket_id, flags, seq, tcb.rcv_nxt, Vec::new()).unwrap();
        tcb.fin_seq = Some(seq);
        tcb.rtx_queue.put(RtxSegment {
            seq,
            flags,
            payload: Vec::new(),
            attempts: 0,
            sent_at: Some(Instant::now()),
        });
        tcb.snd_nxt = tcb.snd_nxt.add(1);
        tcb.retransmission_timer =
            Some(Instant::now() + Duration::from_millis(tcb.config.retransmission_timeout_ms));
        seg
    }

    /// Peel ready bytes off `send_buffer` and re-check timers. Called
    /// once per networking-worker iteration for every live endpoint.
    pub fn tick(&self) -> Outcome {
        let mut tcb = self.tcb.lock().unwrap();
        let mut to_send = Vec::new();

        if matches!(tcb.state, State::Estab | State::CloseWait | State::FinWait1) {
            to_send.extend(self.segmentize(&mut tcb));
        }

        if let Some(deadline) = tcb.retransmission_timer {
            if Instant::now() >= deadline {
                if let Some(outcome) = self.on_retransmission_timeout(&mut tcb) {
                    if outcome.delete {
                        self.done.store(true, Ordering::Release);
                        self.notify_all();
                    }
                    return outcome;
                }
            }
        }

        if tcb.state == State::TimeWait {
            if let Some(deadline) = tcb.time_wait_timer {
                if Instant::now() >= deadline {
                    drop(tcb);
                    self.done.store(true, Ordering::Release);
                    self.notify_all();
                    return Outcome {
                        to_send,
                        delete: true,
                        promoted: false,
                    };
                }
            }
        }

        Outcome {
            to_send,
            delete: false,
            promoted: false,
        }
    }

    fn on_retransmission_timeout(&self, tcb: &mut Tcb) -> Option<Outcome> {
        let socket_id = tcb.socket_id;
        let rcv_nxt = tcb.rcv_nxt;
        let snd_nxt = tcb.snd_nxt;
        let max_attempts = tcb.config.max_retransmission_attempts;
        let rto = tcb.config.retransmission_timeout_ms;

        let resend = {
            let item = tcb.rtx_queue.front_mut()?;
            item.attempts += 1;
            if item.attempts > max_attempts {
                None
            } else {
                let ack = if item.flags & ACK != 0 {
                    rcv_nxt
                } else {
                    Seq::new(0)
                };
                Some(Segment::new(socket_id, item.flags, item.seq, ack, item.payload.clone()).unwrap())
            }
        };

        match resend {
            Some(seg) => {
                tcb.retransmission_timer = Some(Instant::now() + Duration::from_millis(rto));
                Some(Outcome {
                    to_send: vec![seg],
                    delete: false,
                    promoted: false,
                })
            }
            None => {
                log::warn!(
                    "socket {socket_id} exceeded {max_attempts} retransmission attempts, resetting"
                );
                let rst = Segment::new(socket_id, RST, snd_nxt, Seq::new(0), Vec::new()).unwrap();
                self.reset.store(true, Ordering::Release);
                self.notify_all();
                Some(Outcome {
                    to_send: vec![rst],
                    delete: true,
                    promoted: false,
                })
            }
        }
    }

    fn segmentize(&self, tcb: &mut Tcb) -> Vec<Segment> {
        if tcb.send_buffer.is_empty() {
            return Vec::new();
        }
        let in_flight = tcb.snd_nxt.sub(tcb.snd_una).max(0) as u16;
        let window = (tcb.snd_wnd.saturating_sub(in_flight) as usize)
            .min(crate::segment::MAX_SEGMENT_PAYLOAD);
        if window == 0 {
            return Vec::new();
        }
        let take = window.min(tcb.send_buffer.len());
        let payload: Vec<u8> = tcb.send_buffer.drain(..take).collect();
        let seq = tcb.snd_nxt;
        let seg = Segment::new(tcb.socket_id, ACK, seq, tcb.rcv_nxt, payload.clone()).unwrap();
        tcb.snd_nxt = tcb.snd_nxt.add(take as u16);
        tcb.rtx_queue.put(RtxSegment {
            seq,
            flags: ACK,
            payload,
            attempts: 0,
            sent_at: Some(Instant::now()),
        });
        tcb.retransmission_timer =
            Some(Instant::now() + Duration::from_millis(tcb.config.retransmission_timeout_ms));
        self.wvar.notify_all();
        vec![seg]
    }

    /// Feed one arrived segment through the state machine. Assumes the
    /// endpoint is past LISTEN (the listener owns SYN acceptance).
    pub fn on_segment(&self, seg: &Segment) -> Outcome {
        let mut tcb = self.tcb.lock().unwrap();
        let outcome = match tcb.state {
            State::SynSent => self.on_segment_syn_sent(&mut tcb, seg),
            State::Listen => Outcome::none(),
            _ => self.on_segment_synchronized(&mut tcb, seg),
        };
        drop(tcb);
        if outcome.delete {
            self.done.store(true, Ordering::Release);
        }
        if outcome.delete || outcome.promoted || !outcome.to_send.is_empty() {
            self.notify_all();
        }
        outcome
    }

    fn on_segment_syn_sent(&self, tcb: &mut Tcb, seg: &Segment) -> Outcome {
        let ack_acceptable = seg.has(ACK) && tcb.iss.lt(seg.ack) && seg.ack.le(tcb.snd_nxt);

        if seg.has(ACK) && !ack_acceptable {
            if seg.has(RST) {
                return Outcome::none();
            }
            return Outcome::send(vec![crate::segment::build_rst(tcb.socket_id, seg)]);
        }

        if seg.has(RST) {
            if ack_acceptable {
                self.refused.store(true, Ordering::Release);
                return Outcome::delete();
            }
            return Outcome::none();
        }

        if !seg.has(SYN) {
            return Outcome::none();
        }

        tcb.irs = seg.seq;
        tcb.rcv_nxt = seg.seq.add(1);
        if ack_acceptable {
            tcb.remove_acked_from_rtx_queue(seg.ack);
        }

        if tcb.iss.lt(tcb.snd_una) {
            tcb.state = State::Estab;
            let ack = Segment::new(tcb.socket_id, ACK, tcb.snd_nxt, tcb.rcv_nxt, Vec::new()).unwrap();
            let mut to_send = vec![ack];
            to_send.extend(self.segmentize(tcb));
            Outcome::send(to_send)
        } else {
            tcb.state = State::SynRcvd;
            let synack =
                Segment::new(tcb.socket_id, SYN | ACK, tcb.iss, tcb.rcv_nxt, Vec::new()).unwrap();
            tcb.rtx_queue.put(RtxSegment {
                seq: tcb.iss,
                flags: SYN | ACK,
                payload: Vec::new(),
                attempts: 0,
                sent_at: Some(Instant::now()),
            });
            tcb.retransmission_timer =
                Some(Instant::now() + Duration::from_millis(tcb.config.retransmission_timeout_ms));
            Outcome::send(vec![synack])
        }
    }

    fn on_segment_synchronized(&self, tcb: &mut Tcb, seg: &Segment) -> Outcome {
        if !tcb.is_segment_acceptable(seg) {
            if seg.has(RST) {
                return Outcome::none();
            }
            let ack = Segment::new(tcb.socket_id, ACK, tcb.snd_nxt, tcb.rcv_nxt, Vec::new()).unwrap();
            return Outcome::send(vec![ack]);
        }

        if seg.has(RST) {
            self.reset.store(true, Ordering::Release);
            return Outcome::delete();
        }

        if seg.has(SYN) {
            log::warn!("socket {} saw an in-window SYN, resetting", tcb.socket_id);
            let rst = Segment::new(tcb.socket_id, RST, tcb.snd_nxt, Seq::new(0), Vec::new()).unwrap();
            self.reset.store(true, Ordering::Release);
            return Outcome {
                to_send: vec![rst],
                delete: true,
                promoted: false,
            };
        }

        if !seg.has(ACK) {
            return Outcome::none();
        }

        let mut promoted = false;
        if tcb.is_ack_acceptable(seg.ack) {
            tcb.remove_acked_from_rtx_queue(seg.ack);
        } else if seg.ack.gt(tcb.snd_nxt) {
            let ack = Segment::new(tcb.socket_id, ACK, tcb.snd_nxt, tcb.rcv_nxt, Vec::new()).unwrap();
            return Outcome::send(vec![ack]);
        }

        match tcb.state {
            State::SynRcvd => {
                tcb.state = State::Estab;
                promoted = true;
            }
            State::FinWait1 if tcb.is_fin_acked() => tcb.state = State::FinWait2,
            State::Closing if tcb.is_fin_acked() => {
                tcb.state = State::TimeWait;
                tcb.time_wait_timer =
                    Some(Instant::now() + Duration::from_millis(tcb.config.time_wait_timeout_ms));
            }
            State::LastAck if tcb.is_fin_acked() => {
                return Outcome {
                    to_send: Vec::new(),
                    delete: true,
                    promoted: false,
                };
            }
            _ => {}
        }

        if matches!(tcb.state, State::Estab | State::FinWait1 | State::FinWait2) && !seg.payload.is_empty()
        {
            tcb.receive_buffer.insert(seg.seq.0, seg.payload.clone());
            tcb.reassemble();
        }

        let mut to_send = Vec::new();
        if seg.has(FIN) {
            let fin_point = seg.seq.add(seg.payload.len() as u16);
            if fin_point == tcb.rcv_nxt {
                tcb.rcv_nxt = tcb.rcv_nxt.add(1);
                let ack = Segment::new(tcb.socket_id, ACK, tcb.snd_nxt, tcb.rcv_nxt, Vec::new()).unwrap();
                to_send.push(ack);
                match tcb.state {
                    State::Estab => tcb.state = State::CloseWait,
                    State::FinWait1 => {
                        tcb.state = if tcb.is_fin_acked() {
                            tcb.time_wait_timer = Some(
                                Instant::now() + Duration::from_millis(tcb.config.time_wait_timeout_ms),
                            );
                            State::TimeWait
                        } else {
                            State::Closing
                        };
                    }
                    State::FinWait2 => {
                        tcb.state = State::TimeWait;
                        tcb.time_wait_timer = Some(
                            Instant::now() + Duration::from_millis(tcb.config.time_wait_timeout_ms),
                        );
                    }
                    _ => {}
                }
            }
        }

        Outcome {
            to_send,
            delete: false,
            promoted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcp::tcb::Tcb;
    use std::net::Ipv4Addr;

    fn peer() -> Peer {
        Peer {
            ip: Ipv4Addr::new(192, 168, 1, 1),
            port: 1883,
        }
    }

    #[test]
    fn connect_then_synack_then_ack_reaches_established() {
        let config = Config::default();
        let (ep, syn) = Endpoint::connect(1, peer(), config);
        assert_eq!(ep.state(), State::SynSent);

        let synack = Segment::new(1, SYN | ACK, Seq::new(500), syn.seq.add(1), Vec::new()).unwrap();
        let outcome = ep.on_segment(&synack);
        assert_eq!(ep.state(), State::Estab);
        assert_eq!(outcome.to_send.len(), 1);
        assert!(outcome.to_send[0].has(ACK));
    }

    #[test]
    fn data_segment_is_reassembled_and_acked() {
        let config = Config::default();
        let tcb = Tcb::new_syn_rcvd(2, peer(), Seq::new(10), 1, config);
        let rcv_nxt = tcb.rcv_nxt;
        let snd_una = tcb.snd_una;
        let ep = Endpoint::from_syn_rcvd(tcb);

        let ack = Segment::new(2, ACK, snd_una.add(1), rcv_nxt, Vec::new()).unwrap();
        let outcome = ep.on_segment(&ack);
        assert!(outcome.promoted);
        assert_eq!(ep.state(), State::Estab);

        let data = Segment::new(2, ACK, rcv_nxt, snd_una.add(1), b"hi".to_vec()).unwrap();
        ep.on_segment(&data);
        let mut buf = [0u8; 2];
        assert_eq!(ep.recv(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"hi");
    }

    #[test]
    fn close_from_close_wait_lands_on_closing_not_last_ack() {
        let config = Config::default();
        let tcb = Tcb::new_syn_rcvd(3, peer(), Seq::new(0), 1, config);
        let ep = Endpoint::from_syn_rcvd(tcb);
        {
            let mut tcb = ep.tcb.lock().unwrap();
            tcb.state = State::CloseWait;
        }
        ep.request_close();
        assert_eq!(ep.state(), State::Closing);
    }
}
