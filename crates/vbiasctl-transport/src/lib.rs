//! Link-layer plumbing for Vbias control boards.
//!
//! Two kinds of link live here:
//! - packet links, which carry whole Ethernet frames ([`PacketLink`]); on
//!   Linux the real one is a raw `AF_PACKET` socket bound to an interface
//! - byte streams over TCP, used by the relay daemon and its clients
//!
//! This is the lowest layer of vbiasctl. Frame encoding lives one layer up.

pub mod address;
pub mod error;
pub mod link;
pub mod stream;
pub mod tcp;

#[cfg(target_os = "linux")]
pub mod raw;

pub use address::{MacAddr, MacAddrParseError};
pub use error::{Result, TransportError};
pub use link::{PacketLink, SharedLink};
pub use stream::RelayStream;
pub use tcp::{RelayListener, DEFAULT_RELAY_PORT};

#[cfg(target_os = "linux")]
pub use raw::{host_mac_address, RawSocket};
