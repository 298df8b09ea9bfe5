//! Control of the SiPM bias (Vbias) boards of a tagger readout crate.
//!
//! Each board sits on a raw Ethernet segment and answers a small set of
//! frames: status queries, voltage programming with read-back, and resets.
//! This crate gathers the layers that talk to them:
//!
//! - [`transport`]: raw packet links, hardware addresses, TCP streams
//! - [`frame`]: frame codec, typed payloads and relay text framing
//! - [`board`]: board sessions, readings, ramping and discovery
//! - [`relay`]: the text relay daemon and its client (behind `relay`)
//!
//! The `vbiasctl` binary (feature `cli`) drives all of them.

/// Re-export transport types.
pub mod transport {
    pub use vbiasctl_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use vbiasctl_frame::*;
}

/// Re-export board session types.
pub mod board {
    pub use vbiasctl_board::*;
}

/// Re-export relay types (requires `relay` feature).
#[cfg(feature = "relay")]
pub mod relay {
    pub use vbiasctl_relay::*;
}
