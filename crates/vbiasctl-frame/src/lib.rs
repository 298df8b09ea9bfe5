//! Frame layer for Vbias control boards.
//!
//! Every board message is a raw Ethernet frame with:
//! - destination and source hardware addresses (6 bytes each)
//! - a 2-byte big-endian length counting everything after the header
//! - a 1-byte backplane (geographic) address, `0xff` for broadcast
//! - a 1-byte message type (`Q`, `S`, `P`, `D`, `R`) and its payload
//!
//! [`FrameLink`] sends and receives typed frames over any
//! [`PacketLink`](vbiasctl_transport::PacketLink), discarding malformed
//! ones. [`TextReader`] and [`TextWriter`] frame the relay text protocol.

pub mod codec;
pub mod error;
pub mod kind;
pub mod link;
pub mod payload;
pub mod reader;
pub mod writer;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use codec::{
    decode, decode_expecting, encode, strip_ethernet_padding, Frame, BROADCAST_GEOADDR,
    ETHERNET_MIN_FRAME, HEADER_SIZE, MAX_LENGTH, PROGRAM_LENGTH, REQUEST_LENGTH,
};
pub use error::{FrameError, Result};
pub use kind::MessageType;
pub use link::{FrameConfig, FrameLink, DEFAULT_MAX_BAD_FRAMES};
pub use payload::{ProgramRequest, StatusWords, VoltageCodes, CHANNELS, STATUS_WORDS};
pub use reader::{TextConfig, TextReader, REQUEST_TERMINATOR, RESPONSE_TERMINATOR};
pub use writer::TextWriter;
