use bytes::{BufMut, Bytes, BytesMut};
use vbiasctl_transport::MacAddr;

use crate::error::{FrameError, Result};
use crate::kind::MessageType;
use crate::payload::{ProgramRequest, StatusWords, VoltageCodes};

/// Ethernet header: destination (6) + source (6) + length (2) = 14 bytes.
pub const HEADER_SIZE: usize = 14;

/// Largest length field value accepted (board address + type + payload).
pub const MAX_LENGTH: usize = 256;

/// Length field of `Q` and `R` requests, zero-padded to a 64-byte frame.
pub const REQUEST_LENGTH: u16 = 50;

/// Length field of `P` requests: address, type, mask and 32 codes.
pub const PROGRAM_LENGTH: u16 = 70;

/// Frames this short may carry link-layer padding past their declared length.
pub const ETHERNET_MIN_FRAME: usize = 60;

/// Board address that every board answers to.
pub const BROADCAST_GEOADDR: u8 = 0xff;

/// Address and type bytes counted by the length field ahead of the payload.
const ADDRESSING_SIZE: usize = 2;

/// A board message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub dest: MacAddr,
    pub src: MacAddr,
    /// Backplane address of the board, [`BROADCAST_GEOADDR`] for all.
    pub geoaddr: u8,
    pub kind: MessageType,
    /// Everything after the type byte, padding included.
    pub payload: Bytes,
}

impl Frame {
    pub fn new(
        dest: MacAddr,
        src: MacAddr,
        geoaddr: u8,
        kind: MessageType,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            dest,
            src,
            geoaddr,
            kind,
            payload: payload.into(),
        }
    }

    /// A status query, padded the way the boards expect.
    pub fn query(dest: MacAddr, src: MacAddr, geoaddr: u8) -> Self {
        Self::padded_request(dest, src, geoaddr, MessageType::Query)
    }

    /// A hard-reset request, padded the way the boards expect.
    pub fn reset(dest: MacAddr, src: MacAddr, geoaddr: u8) -> Self {
        Self::padded_request(dest, src, geoaddr, MessageType::Reset)
    }

    pub fn program(dest: MacAddr, src: MacAddr, geoaddr: u8, request: &ProgramRequest) -> Self {
        Self::new(dest, src, geoaddr, MessageType::Program, request.to_payload())
    }

    pub fn status(dest: MacAddr, src: MacAddr, geoaddr: u8, words: &StatusWords) -> Self {
        Self::new(dest, src, geoaddr, MessageType::Status, words.to_payload())
    }

    pub fn data(dest: MacAddr, src: MacAddr, geoaddr: u8, codes: &VoltageCodes) -> Self {
        Self::new(dest, src, geoaddr, MessageType::Data, codes.to_payload())
    }

    fn padded_request(dest: MacAddr, src: MacAddr, geoaddr: u8, kind: MessageType) -> Self {
        let padding = usize::from(REQUEST_LENGTH) - ADDRESSING_SIZE;
        Self::new(dest, src, geoaddr, kind, vec![0u8; padding])
    }

    /// Value of the length field for this frame.
    pub fn length_field(&self) -> usize {
        ADDRESSING_SIZE + self.payload.len()
    }

    /// The total wire size of this frame (header + length field bytes).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.length_field()
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        encode(self, &mut buf)?;
        Ok(buf.freeze())
    }

    pub fn status_words(&self) -> Result<StatusWords> {
        self.expect_kind(MessageType::Status)?;
        StatusWords::from_payload(&self.payload)
    }

    pub fn voltage_codes(&self) -> Result<VoltageCodes> {
        self.expect_kind(MessageType::Data)?;
        VoltageCodes::from_payload(&self.payload)
    }

    pub fn program_request(&self) -> Result<ProgramRequest> {
        self.expect_kind(MessageType::Program)?;
        ProgramRequest::from_payload(&self.payload)
    }

    fn expect_kind(&self, expected: MessageType) -> Result<()> {
        if self.kind != expected {
            return Err(FrameError::UnexpectedType {
                expected,
                got: self.kind,
            });
        }
        Ok(())
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌───────────┬───────────┬───────────┬─────────┬──────┬─────────────┐
/// │ Dest (6B) │ Src (6B)  │ Length    │ Geoaddr │ Type │ Payload     │
/// │           │           │ (2B BE)   │ (1B)    │ (1B) │             │
/// └───────────┴───────────┴───────────┴─────────┴──────┴─────────────┘
///                          Length = 2 + payload bytes
/// ```
pub fn encode(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    let length = frame.length_field();
    if length > MAX_LENGTH {
        return Err(FrameError::PayloadTooLarge {
            size: frame.payload.len(),
            max: MAX_LENGTH - ADDRESSING_SIZE,
        });
    }
    dst.reserve(HEADER_SIZE + length);
    dst.put_slice(&frame.dest.octets());
    dst.put_slice(&frame.src.octets());
    dst.put_u16(length as u16);
    dst.put_u8(frame.geoaddr);
    dst.put_u8(frame.kind.as_byte());
    dst.put_slice(&frame.payload);
    Ok(())
}

/// Decode one complete frame.
///
/// The buffer must hold exactly the bytes the length field announces.
pub fn decode(src: &[u8]) -> Result<Frame> {
    if src.len() < HEADER_SIZE + ADDRESSING_SIZE {
        return Err(FrameError::Truncated { len: src.len() });
    }

    let declared = usize::from(u16::from_be_bytes([src[12], src[13]]));
    let actual = src.len() - HEADER_SIZE;
    if declared != actual {
        return Err(FrameError::LengthMismatch { declared, actual });
    }
    if declared > MAX_LENGTH {
        return Err(FrameError::PayloadTooLarge {
            size: declared - ADDRESSING_SIZE,
            max: MAX_LENGTH - ADDRESSING_SIZE,
        });
    }

    let kind = MessageType::try_from(src[15])?;
    // Both slices are exactly six bytes long.
    let dest = MacAddr::from_slice(&src[0..6]).unwrap_or_default();
    let source = MacAddr::from_slice(&src[6..12]).unwrap_or_default();

    Ok(Frame {
        dest,
        src: source,
        geoaddr: src[14],
        kind,
        payload: Bytes::copy_from_slice(&src[HEADER_SIZE + ADDRESSING_SIZE..]),
    })
}

/// Decode a frame and require it to be of type `expected`.
pub fn decode_expecting(src: &[u8], expected: MessageType) -> Result<Frame> {
    let frame = decode(src)?;
    frame.expect_kind(expected)?;
    Ok(frame)
}

/// Drop link-layer padding from a minimum-size Ethernet frame.
///
/// Boards send short status frames that the network pads to 60 bytes.
/// Only frames at or below that size are trimmed, and only when the length
/// field announces fewer bytes than are present. Anything else is returned
/// unchanged for [`decode`] to judge.
pub fn strip_ethernet_padding(src: &[u8]) -> &[u8] {
    if src.len() < HEADER_SIZE || src.len() > ETHERNET_MIN_FRAME {
        return src;
    }
    let declared = usize::from(u16::from_be_bytes([src[12], src[13]]));
    let end = HEADER_SIZE + declared;
    if end >= HEADER_SIZE + ADDRESSING_SIZE && end < src.len() {
        &src[..end]
    } else {
        src
    }
}
