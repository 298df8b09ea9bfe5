//! Board sessions for Vbias control boards.
//!
//! A [`BoardSession`] selects one board on a packet link and drives the
//! request/response exchanges: status queries, voltage read-back, verified
//! writes, hard resets and bounded-step ramps. [`probe`] lists every board
//! answering on a segment. [`BoardAccess`] is the operation set shared with
//! boards reached through a relay daemon.
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(target_os = "linux")]
//! # fn main() -> vbiasctl_board::Result<()> {
//! use vbiasctl_board::{BoardAddress, BoardSession, Reading, SessionConfig};
//! use vbiasctl_transport::RawSocket;
//!
//! let link = RawSocket::open("eth0")?;
//! let mut board = BoardSession::select(link, BoardAddress::Geo(0x9f), SessionConfig::default())?;
//! println!("chip at {} C", board.reading(Reading::Tchip)?);
//!
//! board.set_voltage(0, 70.0)?;
//! board.ramp()?;
//! # Ok(())
//! # }
//! # #[cfg(not(target_os = "linux"))]
//! # fn main() {}
//! ```

mod access;
mod config;
mod discovery;
mod error;
mod identity;
mod ramp;
mod readings;
mod session;

pub use access::BoardAccess;
pub use config::{
    ProbeConfig, RampConfig, SessionConfig, DEFAULT_MAX_BAD_FRAMES, DEFAULT_RAMP_MAX_ITERATIONS,
    DEFAULT_RAMP_MAX_STEP, DEFAULT_RESPONSE_TIMEOUT, DEFAULT_RETRIES,
};
pub use discovery::probe;
pub use error::{BoardError, Result};
pub use identity::{AddressParseError, BoardAddress, BoardIdentity};
pub use ramp::{plan_step, step_bound, targets};
pub use readings::{Calibration, GainMode, Reading, MAX_CODE};
pub use session::{BoardSession, SessionState};
