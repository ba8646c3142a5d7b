//! Wire segment codec: fixed 18-byte big-endian header plus payload.

use bytes::Bytes;
use md5::{Digest, Md5};
use prtp_binary::{BinaryReader, BinaryWriter};

use crate::consts::{ADVERTISED_WINDOW, HEADER_LEN, MAX_PAYLOAD};
use crate::error::SegmentError;

/// Control bits carried in the `flags` field.
pub struct Flag;

impl Flag {
    pub const SYN: u16 = 0x01;
    pub const ACK: u16 = 0x02;
    pub const FIN: u16 = 0x04;
    /// Recognized on receive, never generated.
    pub const RST: u16 = 0x08;
}

/// A protocol segment. Sequence numbers are packet-indexed: one per data
/// segment, starting at 0 for the SYN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub seq_num: u32,
    /// Cumulative: acknowledges every data segment with seq below this value.
    pub ack_num: u32,
    pub flags: u16,
    /// Receive window advertised to the peer, in bytes.
    pub window_size: u16,
    pub payload: Bytes,
}

impl Segment {
    fn control(seq_num: u32, ack_num: u32, flags: u16) -> Self {
        Self {
            seq_num,
            ack_num,
            flags,
            window_size: ADVERTISED_WINDOW,
            payload: Bytes::new(),
        }
    }

    pub fn syn() -> Self {
        Self::control(0, 0, Flag::SYN)
    }

    pub fn syn_ack() -> Self {
        Self::control(0, 1, Flag::SYN | Flag::ACK)
    }

    pub fn ack(ack_num: u32) -> Self {
        Self::control(0, ack_num, Flag::ACK)
    }

    /// The handshake-completing ACK carries the first data sequence number.
    pub fn handshake_ack() -> Self {
        Self::control(1, 1, Flag::ACK)
    }

    pub fn fin(seq_num: u32) -> Self {
        Self::control(seq_num, 0, Flag::FIN)
    }

    pub fn data(seq_num: u32, payload: Bytes) -> Self {
        Self {
            seq_num,
            ack_num: 0,
            flags: 0,
            window_size: ADVERTISED_WINDOW,
            payload,
        }
    }

    pub fn is_syn(&self) -> bool {
        self.flags & Flag::SYN != 0
    }

    pub fn is_ack(&self) -> bool {
        self.flags & Flag::ACK != 0
    }

    pub fn is_fin(&self) -> bool {
        self.flags & Flag::FIN != 0
    }

    pub fn is_rst(&self) -> bool {
        self.flags & Flag::RST != 0
    }

    /// A data segment carries payload and no control bits.
    pub fn is_data(&self) -> bool {
        self.flags & (Flag::SYN | Flag::FIN | Flag::RST) == 0 && !self.payload.is_empty()
    }

    /// Integrity tag: the first four bytes of MD5 over the header fields
    /// (excluding the tag itself and `payload_len`) and the payload, all
    /// big-endian, interpreted as a big-endian u32.
    pub fn checksum(&self) -> u32 {
        let mut hasher = Md5::new();
        hasher.update(self.seq_num.to_be_bytes());
        hasher.update(self.ack_num.to_be_bytes());
        hasher.update(self.flags.to_be_bytes());
        hasher.update(self.window_size.to_be_bytes());
        hasher.update(&self.payload);
        let digest = hasher.finalize();
        u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
    }

    pub fn encode(&self) -> Bytes {
        let mut writer = BinaryWriter::with_capacity(HEADER_LEN + self.payload.len());
        writer.write_u32_be(self.seq_num);
        writer.write_u32_be(self.ack_num);
        writer.write_u16_be(self.flags);
        writer.write_u16_be(self.window_size);
        writer.write_u32_be(self.checksum());
        writer.write_u16_be(self.payload.len() as u16);
        writer.write_bytes(&self.payload);
        writer.freeze()
    }

    pub fn decode(frame: Bytes) -> Result<Self, SegmentError> {
        let mut reader = BinaryReader::new(frame);
        let seq_num = reader.read_u32_be()?;
        let ack_num = reader.read_u32_be()?;
        let flags = reader.read_u16_be()?;
        let window_size = reader.read_u16_be()?;
        let stored = reader.read_u32_be()?;
        let payload_len = reader.read_u16_be()? as usize;
        if payload_len > MAX_PAYLOAD {
            return Err(SegmentError::PayloadTooLong(payload_len));
        }
        let payload = reader.read_bytes(payload_len)?;

        let segment = Self {
            seq_num,
            ack_num,
            flags,
            window_size,
            payload,
        };
        let computed = segment.checksum();
        if computed != stored {
            return Err(SegmentError::ChecksumMismatch { stored, computed });
        }
        Ok(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_segment_wire_layout() {
        let segment = Segment::data(1, Bytes::from_static(b"hello"));
        assert_eq!(
            hex::encode(segment.encode()),
            "000000010000000000002000e149b2cf000568656c6c6f"
        );
    }

    #[test]
    fn control_segment_wire_layout() {
        assert_eq!(
            hex::encode(Segment::syn().encode()),
            "000000000000000000012000492144040000"
        );
        assert_eq!(
            hex::encode(Segment::ack(5).encode()),
            "000000000000000500022000ebc05b4f0000"
        );
    }

    #[test]
    fn round_trip_identity() {
        let cases = [
            Segment::syn(),
            Segment::syn_ack(),
            Segment::handshake_ack(),
            Segment::fin(42),
            Segment::data(7, Bytes::from(vec![0xab; MAX_PAYLOAD])),
            Segment::data(1, Bytes::new()),
        ];
        for segment in cases {
            let decoded = Segment::decode(segment.encode()).unwrap();
            assert_eq!(decoded, segment);
        }
    }

    #[test]
    fn any_single_bit_flip_is_rejected() {
        let frame = Segment::data(3, Bytes::from_static(b"integrity")).encode();
        for byte in 0..frame.len() {
            for bit in 0..8 {
                let mut flipped = frame.to_vec();
                flipped[byte] ^= 1 << bit;
                assert!(
                    Segment::decode(Bytes::from(flipped)).is_err(),
                    "flip at byte {byte} bit {bit} was accepted"
                );
            }
        }
    }

    #[test]
    fn truncated_header_is_rejected() {
        let frame = Segment::syn().encode();
        for len in 0..HEADER_LEN {
            let short = frame.slice(0..len);
            assert!(matches!(
                Segment::decode(short),
                Err(SegmentError::Truncated(_))
            ));
        }
    }

    #[test]
    fn payload_len_past_buffer_is_rejected() {
        let segment = Segment::data(1, Bytes::from_static(b"abcdef"));
        let frame = segment.encode();
        // Keep the header but drop the payload tail.
        let short = frame.slice(0..HEADER_LEN + 2);
        assert!(matches!(
            Segment::decode(short),
            Err(SegmentError::Truncated(_))
        ));
    }

    #[test]
    fn oversized_payload_len_is_rejected() {
        let mut frame = Segment::syn().encode().to_vec();
        // payload_len field lives at bytes 16..18
        frame[16] = 0xff;
        frame[17] = 0xff;
        assert!(matches!(
            Segment::decode(Bytes::from(frame)),
            Err(SegmentError::PayloadTooLong(_))
        ));
    }

    #[test]
    fn flag_queries() {
        let syn_ack = Segment::syn_ack();
        assert!(syn_ack.is_syn());
        assert!(syn_ack.is_ack());
        assert!(!syn_ack.is_fin());
        assert!(!syn_ack.is_data());

        let data = Segment::data(9, Bytes::from_static(b"x"));
        assert!(data.is_data());
        assert!(!data.is_ack());

        let fin = Segment::fin(10);
        assert!(fin.is_fin());
        assert!(!fin.is_data());
    }
}
