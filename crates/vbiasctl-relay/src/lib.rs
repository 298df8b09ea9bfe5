//! TCP text relay for Vbias control boards.
//!
//! The daemon ([`RelayServer`]) owns the raw interfaces and answers
//! newline-terminated requests such as `select 0x9f eth0` or `get_Tchip`,
//! each with a NUL-terminated response. [`RelayClient`] speaks the other
//! end, and [`RelayBoard`] wraps it so a remote board offers the same
//! [`BoardAccess`](vbiasctl_board::BoardAccess) operations as a local one.
//! [`Destination`] parses the `[host[:port]::]interface` form that picks
//! between the two.

pub mod client;
pub mod command;
pub mod config;
pub mod dest;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod response;
pub mod server;

pub use client::{RelayBoard, RelayClient, SharedClient};
pub use command::Request;
pub use config::{RelayConfig, DEFAULT_INTERFACE};
pub use dest::Destination;
pub use dispatch::Dispatcher;
pub use error::{RelayError, RequestError, Result};
#[cfg(target_os = "linux")]
pub use registry::RawOpener;
pub use registry::{AdapterPool, LinkOpener, SessionKey, SessionRegistry};
pub use server::RelayServer;
