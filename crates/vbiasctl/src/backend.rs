use std::collections::BTreeMap;
use std::sync::MutexGuard;
use std::time::Duration;

use tracing::debug;
use vbiasctl_board::{BoardAccess, BoardAddress, ProbeConfig, SessionConfig};
use vbiasctl_relay::{Destination, RelayBoard, RelayClient, SharedClient};
use vbiasctl_transport::MacAddr;

use crate::exit::{relay_error, select_error, CliError, CliResult, CONNECTION_FAILED};

/// Timing policy taken from the global flags.
#[derive(Debug, Clone)]
pub struct Settings {
    pub session: SessionConfig,
    pub probe: ProbeConfig,
}

impl Settings {
    pub fn new(timeout: Duration, retries: u32) -> Self {
        Self {
            session: SessionConfig {
                retries,
                response_timeout: timeout,
                ..SessionConfig::default()
            },
            probe: ProbeConfig {
                window: timeout,
                ..ProbeConfig::default()
            },
        }
    }
}

/// How boards on one destination are reached: the raw interface on this
/// host, or a relay daemon on another one.
pub enum Backend {
    #[cfg(target_os = "linux")]
    Local {
        link: vbiasctl_transport::SharedLink<vbiasctl_transport::RawSocket>,
    },
    Remote {
        client: SharedClient,
        interface: String,
    },
}

impl Backend {
    pub fn open(dest: &Destination) -> CliResult<Self> {
        match dest.server() {
            Some(server) => {
                let client = RelayClient::connect(&server)
                    .map_err(|err| relay_error(&format!("cannot reach relay at {server}"), err))?;
                debug!(%server, interface = %dest.interface, "using relay daemon");
                Ok(Backend::Remote {
                    client: client.into_shared(),
                    interface: dest.interface.clone(),
                })
            }
            None => Self::open_local(&dest.interface),
        }
    }

    #[cfg(target_os = "linux")]
    fn open_local(interface: &str) -> CliResult<Self> {
        let socket = vbiasctl_transport::RawSocket::open(interface).map_err(|err| {
            CliError::new(CONNECTION_FAILED, format!("cannot open {interface}: {err}"))
        })?;
        debug!(interface, "using raw interface");
        Ok(Backend::Local {
            link: vbiasctl_transport::SharedLink::new(socket),
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn open_local(interface: &str) -> CliResult<Self> {
        Err(CliError::new(
            CONNECTION_FAILED,
            format!("cannot open {interface}: raw interface access needs Linux; use host::{interface}"),
        ))
    }

    /// Every board answering on this destination.
    #[cfg_attr(not(target_os = "linux"), allow(unused_variables))]
    pub fn probe(&mut self, settings: &Settings) -> CliResult<BTreeMap<u8, MacAddr>> {
        match self {
            #[cfg(target_os = "linux")]
            Backend::Local { link } => {
                let mut link = link.clone();
                vbiasctl_board::probe(&mut link, &settings.probe).map_err(|err| {
                    CliError::new(CONNECTION_FAILED, format!("probe failed: {err}"))
                })
            }
            Backend::Remote { client, interface } => {
                lock(client)?
                    .probe(Some(interface))
                    .map_err(|err| CliError::new(CONNECTION_FAILED, format!("probe failed: {err}")))
            }
        }
    }

    /// Select one board for the caller to operate.
    #[cfg_attr(not(target_os = "linux"), allow(unused_variables))]
    pub fn board(
        &self,
        address: BoardAddress,
        settings: &Settings,
    ) -> CliResult<Box<dyn BoardAccess>> {
        let context = format!("cannot select board {address}");
        match self {
            #[cfg(target_os = "linux")]
            Backend::Local { link } => {
                let session = vbiasctl_board::BoardSession::select(
                    link.clone(),
                    address,
                    settings.session.clone(),
                )
                .map_err(|err| select_error(&context, err))?;
                Ok(Box::new(session))
            }
            Backend::Remote { client, interface } => {
                let board = RelayBoard::select(client.clone(), address, interface)
                    .map_err(|err| select_error(&context, err))?;
                Ok(Box::new(board))
            }
        }
    }
}

fn lock(client: &SharedClient) -> CliResult<MutexGuard<'_, RelayClient>> {
    client
        .lock()
        .map_err(|_| CliError::new(CONNECTION_FAILED, "relay connection is unusable"))
}

/// Resolve an optional `[host[:port]::]interface` argument, filling in
/// `interface` when none is named.
pub fn destination(arg: Option<&str>, interface: &str) -> CliResult<Destination> {
    let arg = arg.map(str::trim).unwrap_or("");
    if arg.is_empty() {
        return Ok(Destination::local(interface));
    }
    let mut dest: Destination = arg
        .parse()
        .map_err(|err| relay_error("invalid destination", err))?;
    if arg.ends_with("::") {
        dest.interface = interface.to_string();
    }
    Ok(dest)
}

/// Split `<address>[@dest]`.
pub fn target(arg: &str, interface: &str) -> CliResult<(BoardAddress, Destination)> {
    let (address, dest) = match arg.split_once('@') {
        Some((address, dest)) => (address, Some(dest)),
        None => (arg, None),
    };
    let address = address
        .parse::<BoardAddress>()
        .map_err(|err| CliError::new(crate::exit::USAGE, err.to_string()))?;
    Ok((address, destination(dest, interface)?))
}
