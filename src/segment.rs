//! Transport-layer segment: socket-id, flags, sequence/ack numbers and
//! a small payload. Wire format is `BHH` in the original's `struct`
//! terms — one flags byte, two big-endian `u16`s — packed here with
//! `byteorder` rather than hand-rolled shifts.

use byteorder::{BigEndian, ByteOrder};

use crate::err::CodecError;
use crate::seq::Seq;

pub const MAX_SOCKET_ID: u8 = 15;
pub const HEADER_LEN: usize = 5; // 1 flags byte + 2 seq + 2 ack
pub const MAX_SEGMENT_PAYLOAD: usize = 242;

pub const SYN: u8 = 0b0001;
pub const ACK: u8 = 0b0010;
pub const FIN: u8 = 0b0100;
pub const RST: u8 = 0b1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub socket_id: u8,
    pub flags: u8,
    pub seq: Seq,
    pub ack: Seq,
    pub payload: Vec<u8>,
}

impl Segment {
    pub fn new(
        socket_id: u8,
        flags: u8,
        seq: Seq,
        ack: Seq,
        payload: Vec<u8>,
    ) -> Result<Self, CodecError> {
        if socket_id > MAX_SOCKET_ID {
            return Err(CodecError::SocketIdOutOfRange);
        }
        if payload.len() > MAX_SEGMENT_PAYLOAD {
            return Err(CodecError::PayloadTooLarge);
        }
        Ok(Segment {
            socket_id,
            flags,
            seq,
            ack,
            payload,
        })
    }

    pub fn has(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    /// Number of sequence numbers this segment consumes: payload bytes
    /// plus one each for SYN and FIN (each occupies one sequence point).
    pub fn seq_len(&self) -> u32 {
        self.payload.len() as u32 + self.has(SYN) as u32 + self.has(FIN) as u32
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        let head = ((self.socket_id & 0x0f) << 4) | (self.flags & 0x0f);
        out.push(head);
        let mut buf2 = [0u8; 4];
        BigEndian::write_u16(&mut buf2[0..2], self.seq.0);
        BigEndian::write_u16(&mut buf2[2..4], self.ack.0);
        out.extend_from_slice(&buf2);
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < HEADER_LEN {
            return Err(CodecError::TooShort);
        }
        let head = data[0];
        let socket_id = (head & 0xf0) >> 4;
        let flags = head & 0x0f;
        let seq = Seq::new(BigEndian::read_u16(&data[1..3]));
        let ack = Seq::new(BigEndian::read_u16(&data[3..5]));
        let payload = data[HEADER_LEN..].to_vec();
        if payload.len() > MAX_SEGMENT_PAYLOAD {
            return Err(CodecError::PayloadTooLarge);
        }
        Ok(Segment {
            socket_id,
            flags,
            seq,
            ack,
            payload,
        })
    }
}

/// The RFC 793 CLOSED-state reset: if the arriving segment carried an
/// ACK, the reset's seq is that ack; otherwise seq is zero and the
/// reset's own ack covers the arriving segment's sequence span.
pub fn build_rst(socket_id: u8, seg: &Segment) -> Segment {
    if seg.has(ACK) {
        Segment::new(socket_id, RST, seg.ack, Seq::new(0), Vec::new()).unwrap()
    } else {
        let ack = seg.seq.add(seg.seq_len() as u16);
        Segment::new(socket_id, RST | ACK, Seq::new(0), ack, Vec::new()).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_data_segment() {
        let seg = Segment::new(3, ACK, Seq(100), Seq(200), b"hi".to_vec()).unwrap();
        let encoded = seg.encode();
        assert_eq!(Segment::decode(&encoded).unwrap(), seg);
    }

    #[test]
    fn packs_socket_id_and_flags_into_one_byte() {
        let seg = Segment::new(15, SYN | ACK, Seq(0), Seq(0), vec![]).unwrap();
        let encoded = seg.encode();
        assert_eq!(encoded[0], 0xf3);
    }

    #[test]
    fn rejects_socket_id_above_15() {
        assert_eq!(
            Segment::new(16, ACK, Seq(0), Seq(0), vec![]),
            Err(CodecError::SocketIdOutOfRange)
        );
    }

    #[test]
    fn rejects_oversized_payload() {
        assert_eq!(
            Segment::new(0, ACK, Seq(0), Seq(0), vec![0u8; MAX_SEGMENT_PAYLOAD + 1]),
            Err(CodecError::PayloadTooLarge)
        );
    }

    #[test]
    fn seq_len_counts_syn_and_fin_as_one_each() {
        let syn = Segment::new(0, SYN, Seq(0), Seq(0), vec![]).unwrap();
        assert_eq!(syn.seq_len(), 1);
        let data = Segment::new(0, ACK, Seq(0), Seq(0), vec![1, 2, 3]).unwrap();
        assert_eq!(data.seq_len(), 3);
    }
}
