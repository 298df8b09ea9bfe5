use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::kind::MessageType;

/// Number of 16-bit words in a status report.
pub const STATUS_WORDS: usize = 17;

/// Number of DAC channels on a board.
pub const CHANNELS: usize = 32;

/// The 17 status words a board reports in an `S` frame.
///
/// Word meanings are fixed by position; see the board crate's readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusWords(pub [u16; STATUS_WORDS]);

impl StatusWords {
    pub const PAYLOAD_LEN: usize = 2 * STATUS_WORDS;

    /// Parse the big-endian words at the start of a payload.
    ///
    /// Extra trailing bytes are ignored.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let mut buf = check_len(MessageType::Status, payload, Self::PAYLOAD_LEN)?;
        let mut words = [0u16; STATUS_WORDS];
        for word in &mut words {
            *word = buf.get_u16();
        }
        Ok(Self(words))
    }

    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::PAYLOAD_LEN);
        for word in self.0 {
            buf.put_u16(word);
        }
        buf.freeze()
    }

    pub fn word(&self, index: usize) -> u16 {
        self.0[index]
    }
}

/// The 32 channel codes a board echoes in a `D` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoltageCodes(pub [u16; CHANNELS]);

impl VoltageCodes {
    pub const PAYLOAD_LEN: usize = 2 * CHANNELS;

    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let mut buf = check_len(MessageType::Data, payload, Self::PAYLOAD_LEN)?;
        let mut codes = [0u16; CHANNELS];
        for code in &mut codes {
            *code = buf.get_u16();
        }
        Ok(Self(codes))
    }

    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::PAYLOAD_LEN);
        for code in self.0 {
            buf.put_u16(code);
        }
        buf.freeze()
    }

    pub fn code(&self, channel: usize) -> u16 {
        self.0[channel]
    }
}

/// A masked write of channel codes, carried by a `P` frame.
///
/// Codes for channels whose mask bit is clear are still transmitted but the
/// board ignores them. An empty mask turns the request into a pure read-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgramRequest {
    pub mask: u32,
    pub codes: [u16; CHANNELS],
}

impl ProgramRequest {
    /// Write mask (4 bytes, least significant first) plus 32 codes.
    pub const PAYLOAD_LEN: usize = 4 + 2 * CHANNELS;

    pub fn new(mask: u32, codes: [u16; CHANNELS]) -> Self {
        Self { mask, codes }
    }

    /// A request that writes nothing and asks for the current codes.
    pub fn read_back() -> Self {
        Self::default()
    }

    pub fn is_masked(&self, channel: usize) -> bool {
        channel < CHANNELS && self.mask & (1 << channel) != 0
    }

    /// Channels selected by the write mask, in ascending order.
    pub fn masked_channels(&self) -> impl Iterator<Item = usize> + '_ {
        (0..CHANNELS).filter(move |&chan| self.is_masked(chan))
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let mut buf = check_len(MessageType::Program, payload, Self::PAYLOAD_LEN)?;
        let mask = buf.get_u32_le();
        let mut codes = [0u16; CHANNELS];
        for code in &mut codes {
            *code = buf.get_u16();
        }
        Ok(Self { mask, codes })
    }

    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::PAYLOAD_LEN);
        buf.put_u32_le(self.mask);
        for code in self.codes {
            buf.put_u16(code);
        }
        buf.freeze()
    }
}

fn check_len(kind: MessageType, payload: &[u8], need: usize) -> Result<&[u8]> {
    if payload.len() < need {
        return Err(FrameError::PayloadTooShort {
            kind,
            size: payload.len(),
            need,
        });
    }
    Ok(&payload[..need])
}
