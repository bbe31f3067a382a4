use heapless::Vec;

use crate::error::CodecError;

// ── Framing constants ─────────────────────────────────────────────────────────

pub const SYSLINK_START: [u8; 2] = [0xBC, 0xCF];
/// Largest frame payload
pub const SYSLINK_MTU: usize = 32;
/// Start(2) + Len(1) + Type(1) + Data(MTU) + Checksum(2)
pub const SYSLINK_MAX_WIRE: usize = 2 + 2 + SYSLINK_MTU + 2;

pub const SYSLINK_RADIO_RAW: u8 = 0x00;
pub const SYSLINK_RADIO_RSSI: u8 = 0x04;

/// Frame type tag. Unknown tags are carried through untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameType {
    /// Data is a CRTP packet: `[header, payload..]`
    RadioRaw,
    /// Data[0] is the latest received signal strength
    RadioRssi,
    Other(u8),
}

impl FrameType {
    pub fn from_u8(tag: u8) -> Self {
        match tag {
            SYSLINK_RADIO_RAW => Self::RadioRaw,
            SYSLINK_RADIO_RSSI => Self::RadioRssi,
            other => Self::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::RadioRaw => SYSLINK_RADIO_RAW,
            Self::RadioRssi => SYSLINK_RADIO_RSSI,
            Self::Other(tag) => tag,
        }
    }
}

/// Transport frame: `{length, type, data[length]}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyslinkPacket {
    kind: FrameType,
    data: Vec<u8, SYSLINK_MTU>,
}

impl SyslinkPacket {
    pub fn new(kind: FrameType, data: &[u8]) -> Result<Self, CodecError> {
        let data = Vec::from_slice(data).map_err(|_| CodecError::Oversize(data.len()))?;
        Ok(Self { kind, data })
    }

    pub(crate) fn from_parts(kind: FrameType, data: Vec<u8, SYSLINK_MTU>) -> Self {
        Self { kind, data }
    }

    pub fn kind(&self) -> FrameType {
        self.kind
    }

    pub fn length(&self) -> u8 {
        self.data.len() as u8
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// `[length, type, data..]`, the frame as handed across the transport
    /// boundary. Returns the number of bytes written, 0 if `buf` is too small.
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        let len = 2 + self.data.len();
        if buf.len() < len {
            return 0;
        }
        buf[0] = self.length();
        buf[1] = self.kind.as_u8();
        buf[2..len].copy_from_slice(&self.data);
        len
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < 2 {
            return Err(CodecError::MissingHeader);
        }
        let length = bytes[0] as usize;
        if length > SYSLINK_MTU {
            return Err(CodecError::Oversize(length));
        }
        let available = bytes.len() - 2;
        if available < length {
            return Err(CodecError::Truncated { declared: length, available });
        }
        Self::new(FrameType::from_u8(bytes[1]), &bytes[2..2 + length])
    }
}

// ── UART stream framing ───────────────────────────────────────────────────────
//
// [0xBC] [0xCF] [Len] [Type] [Data...] [CkA] [CkB]
// Checksum is an 8-bit Fletcher sum over Len, Type and Data.

fn fletcher8(bytes: &[u8]) -> (u8, u8) {
    let mut ck_a: u8 = 0;
    let mut ck_b: u8 = 0;
    for &b in bytes {
        ck_a = ck_a.wrapping_add(b);
        ck_b = ck_b.wrapping_add(ck_a);
    }
    (ck_a, ck_b)
}

/// Serialise a frame for the UART. Returns bytes written, 0 if `buf` is too small.
pub fn write_frame(buf: &mut [u8], frame: &SyslinkPacket) -> usize {
    let body_len = 2 + frame.data.len();
    let total = 2 + body_len + 2;
    if buf.len() < total {
        return 0;
    }

    buf[..2].copy_from_slice(&SYSLINK_START);
    frame.encode(&mut buf[2..2 + body_len]);
    let (ck_a, ck_b) = fletcher8(&buf[2..2 + body_len]);
    buf[2 + body_len] = ck_a;
    buf[3 + body_len] = ck_b;

    total
}

/// Byte-at-a-time syslink frame reassembly.
pub struct SyslinkParser {
    buffer: Vec<u8, SYSLINK_MAX_WIRE>,
    checksum_errors: u32,
}

impl SyslinkParser {
    pub fn new() -> Self {
        Self { buffer: Vec::new(), checksum_errors: 0 }
    }

    pub fn push_byte(&mut self, b: u8) -> Option<SyslinkPacket> {
        match self.buffer.len() {
            0 => {
                if b == SYSLINK_START[0] {
                    let _ = self.buffer.push(b);
                }
                return None;
            }
            1 => {
                self.buffer.clear();
                if b == SYSLINK_START[1] {
                    let _ = self.buffer.extend_from_slice(&SYSLINK_START);
                } else if b == SYSLINK_START[0] {
                    let _ = self.buffer.push(b);
                }
                return None;
            }
            2 => {
                if b as usize > SYSLINK_MTU {
                    // Invalid length, hunt for the next start
                    self.buffer.clear();
                    if b == SYSLINK_START[0] {
                        let _ = self.buffer.push(b);
                    }
                    return None;
                }
                let _ = self.buffer.push(b);
                return None;
            }
            _ => {}
        }

        let total = 2 + 2 + self.buffer[2] as usize + 2;
        if self.buffer.len() < total {
            let _ = self.buffer.push(b);
        }
        if self.buffer.len() < total {
            return None;
        }

        let frame = self.buffer.as_slice();
        let body = &frame[2..total - 2];
        let received = (frame[total - 2], frame[total - 1]);

        let parsed = if fletcher8(body) == received {
            SyslinkPacket::new(FrameType::from_u8(body[1]), &body[2..]).ok()
        } else {
            self.checksum_errors = self.checksum_errors.wrapping_add(1);
            None
        };

        self.buffer.clear();
        parsed
    }

    /// Feed a chunk; `on_frame` runs for every complete frame, in order.
    pub fn push_bytes<F: FnMut(SyslinkPacket)>(&mut self, data: &[u8], mut on_frame: F) {
        for &b in data {
            if let Some(frame) = self.push_byte(b) {
                on_frame(frame);
            }
        }
    }

    pub fn checksum_errors(&self) -> u32 {
        self.checksum_errors
    }
}

impl Default for SyslinkParser {
    fn default() -> Self {
        Self::new()
    }
}
