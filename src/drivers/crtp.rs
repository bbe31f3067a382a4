//! CRTP command/telemetry packets.
//!
//! A packet is one header byte plus up to `CRTP_MAX_DATA` payload bytes. It
//! travels inside a syslink radio-raw frame whose data is `[header, payload..]`,
//! so the frame length is always `size + 1`.

use heapless::Vec;

use crate::drivers::syslink::{FrameType, SyslinkPacket, SYSLINK_MTU};
use crate::error::CodecError;

/// Largest payload that still fits a syslink frame next to the header.
pub const CRTP_MAX_DATA: usize = SYSLINK_MTU - 1;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrtpPacket {
    header: u8,
    data: Vec<u8, CRTP_MAX_DATA>,
}

impl CrtpPacket {
    pub fn new(header: u8, data: &[u8]) -> Result<Self, CodecError> {
        let data = Vec::from_slice(data).map_err(|_| CodecError::Oversize(data.len()))?;
        Ok(Self { header, data })
    }

    /// Header from port (4 bits) and channel (2 bits); the two link bits
    /// in between stay zero.
    pub fn with_port(port: u8, channel: u8, data: &[u8]) -> Result<Self, CodecError> {
        Self::new(((port & 0x0F) << 4) | (channel & 0x03), data)
    }

    pub fn header(&self) -> u8 {
        self.header
    }

    pub fn port(&self) -> u8 {
        self.header >> 4
    }

    pub fn channel(&self) -> u8 {
        self.header & 0x03
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload byte count, header excluded.
    pub fn size(&self) -> u8 {
        self.data.len() as u8
    }

    pub fn to_syslink(&self) -> SyslinkPacket {
        let mut data: Vec<u8, SYSLINK_MTU> = Vec::new();
        // capacities line up: 1 + CRTP_MAX_DATA == SYSLINK_MTU
        let _ = data.push(self.header);
        let _ = data.extend_from_slice(&self.data);
        SyslinkPacket::from_parts(FrameType::RadioRaw, data)
    }

    /// Reinterpret a radio-raw frame's data as a packet.
    pub fn from_syslink(frame: &SyslinkPacket) -> Result<Self, CodecError> {
        match frame.data().split_first() {
            Some((&header, payload)) => Self::new(header, payload),
            None => Err(CodecError::MissingHeader),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_size() {
        let bytes: [u8; CRTP_MAX_DATA] = core::array::from_fn(|i| (i as u8).wrapping_mul(37));
        for size in 0..=CRTP_MAX_DATA {
            let packet = CrtpPacket::new(0x3C, &bytes[..size]).unwrap();
            let frame = packet.to_syslink();

            assert_eq!(frame.length() as usize, size + 1);
            assert_eq!(frame.data()[0], 0x3C);
            assert_eq!(&frame.data()[1..], &bytes[..size]);
            assert_eq!(CrtpPacket::from_syslink(&frame).unwrap(), packet);
        }
    }

    #[test]
    fn rejects_payload_past_capacity() {
        let bytes = [0u8; CRTP_MAX_DATA + 1];
        assert_eq!(
            CrtpPacket::new(0, &bytes),
            Err(CodecError::Oversize(CRTP_MAX_DATA + 1))
        );
    }

    #[test]
    fn empty_frame_has_no_header() {
        let frame = SyslinkPacket::new(FrameType::RadioRaw, &[]).unwrap();
        assert_eq!(CrtpPacket::from_syslink(&frame), Err(CodecError::MissingHeader));
    }

    #[test]
    fn header_fields() {
        let packet = CrtpPacket::with_port(0x5, 2, &[1, 2]).unwrap();
        assert_eq!(packet.header(), 0x52);
        assert_eq!(packet.port(), 5);
        assert_eq!(packet.channel(), 2);
        assert_eq!(packet.size(), 2);
    }
}
