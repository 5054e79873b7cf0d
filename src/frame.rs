//! Link-layer frame: the envelope a radio transmits, carrying either a
//! transport [`crate::segment::Segment`] or a `WOKE_UP` wake notification.

use crate::err::CodecError;

pub const MAX_FRAME_LEN: usize = 256;
pub const ADDRESS_LEN: usize = 6;
pub const HEADER_LEN: usize = ADDRESS_LEN + 1;
pub const MAX_FRAME_PAYLOAD: usize = MAX_FRAME_LEN - HEADER_LEN;

pub type Address = [u8; ADDRESS_LEN];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    WokeUp,
    Segment,
}

impl FrameType {
    fn to_byte(self) -> u8 {
        match self {
            FrameType::WokeUp => 0x00,
            FrameType::Segment => 0x01,
        }
    }

    fn from_byte(b: u8) -> Result<Self, CodecError> {
        match b {
            0x00 => Ok(FrameType::WokeUp),
            0x01 => Ok(FrameType::Segment),
            other => Err(CodecError::UnknownType(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub address: Address,
    pub kind: FrameType,
    pub payload: Vec<u8>,
}

impl DataFrame {
    pub fn new(address: Address, kind: FrameType, payload: Vec<u8>) -> Result<Self, CodecError> {
        if payload.len() > MAX_FRAME_PAYLOAD {
            return Err(CodecError::PayloadTooLarge);
        }
        Ok(DataFrame {
            address,
            kind,
            payload,
        })
    }

    pub fn woke_up(address: Address) -> Self {
        DataFrame {
            address,
            kind: FrameType::WokeUp,
            payload: Vec::new(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(&self.address);
        out.push(self.kind.to_byte());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < HEADER_LEN {
            return Err(CodecError::TooShort);
        }
        let mut address = [0u8; ADDRESS_LEN];
        address.copy_from_slice(&data[..ADDRESS_LEN]);
        let kind = FrameType::from_byte(data[ADDRESS_LEN])?;
        let payload = data[HEADER_LEN..].to_vec();
        if payload.len() > MAX_FRAME_PAYLOAD {
            return Err(CodecError::PayloadTooLarge);
        }
        Ok(DataFrame {
            address,
            kind,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_segment_frame() {
        let frame = DataFrame::new([1, 2, 3, 4, 5, 6], FrameType::Segment, vec![9, 9, 9]).unwrap();
        let encoded = frame.encode();
        assert_eq!(DataFrame::decode(&encoded).unwrap(), frame);
    }

    #[test]
    fn round_trips_woke_up() {
        let frame = DataFrame::woke_up([0xaa; 6]);
        let encoded = frame.encode();
        assert_eq!(encoded.len(), HEADER_LEN);
        assert_eq!(DataFrame::decode(&encoded).unwrap(), frame);
    }

    #[test]
    fn rejects_short_input() {
        assert_eq!(DataFrame::decode(&[1, 2, 3]), Err(CodecError::TooShort));
    }

    #[test]
    fn rejects_unknown_type() {
        let mut bytes = vec![0u8; ADDRESS_LEN];
        bytes.push(0x42);
        assert_eq!(
            DataFrame::decode(&bytes),
            Err(CodecError::UnknownType(0x42))
        );
    }

    #[test]
    fn rejects_oversized_payload() {
        let err = DataFrame::new([0; 6], FrameType::Segment, vec![0u8; MAX_FRAME_PAYLOAD + 1]);
        assert_eq!(err, Err(CodecError::PayloadTooLarge));
    }
}
