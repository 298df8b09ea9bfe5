use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;
use vbiasctl_board::{BoardAccess, BoardAddress, BoardError, Reading};
use vbiasctl_frame::{TextConfig, TextReader, TextWriter};
use vbiasctl_transport::{MacAddr, RelayListener, RelayStream};

use crate::command::Request;
use crate::error::{RelayError, Result};
use crate::registry::SessionKey;
use crate::response;

/// A connection to a relay daemon.
///
/// Several boards can share one connection; the client remembers which
/// board the daemon has current and only re-selects on a change.
pub struct RelayClient {
    server: String,
    reader: TextReader<RelayStream>,
    writer: TextWriter<RelayStream>,
    selected: Option<SessionKey>,
}

/// A relay connection shared by the boards that use it.
pub type SharedClient = Arc<Mutex<RelayClient>>;

impl RelayClient {
    /// Connect to the daemon at `server` (`host:port`).
    pub fn connect(server: &str) -> Result<Self> {
        let stream = RelayListener::connect(server)?;
        let reader = TextReader::new(stream.try_clone()?, TextConfig::responses());
        debug!(server, "relay client connected");
        Ok(Self {
            server: server.to_string(),
            reader,
            writer: TextWriter::requests(stream),
            selected: None,
        })
    }

    /// Bound how long a response may take.
    pub fn set_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.reader.get_ref().set_read_timeout(timeout)?;
        Ok(())
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn into_shared(self) -> SharedClient {
        Arc::new(Mutex::new(self))
    }

    /// Send one request and return its data lines.
    pub fn request(&mut self, request: &Request) -> Result<Vec<String>> {
        let text = request.to_string();
        self.writer.send(&text)?;
        let reply = self.reader.read_message()?;
        debug!(request = %text, reply = reply.trim_end(), "relay exchange");
        response::parse(&reply)
    }

    /// Send a request answered by exactly one value line.
    fn single(&mut self, request: &Request) -> Result<String> {
        let mut lines = self.request(request)?;
        if lines.len() != 1 {
            return Err(RelayError::UnexpectedResponse {
                request: request.to_string(),
                response: lines.join("\n"),
            });
        }
        Ok(lines.remove(0))
    }

    /// Send a request answered by `ok`.
    fn command(&mut self, request: &Request) -> Result<()> {
        let line = self.single(request)?;
        if line.starts_with("ok") {
            Ok(())
        } else {
            Err(RelayError::UnexpectedResponse {
                request: request.to_string(),
                response: line,
            })
        }
    }

    fn number(&mut self, request: &Request) -> Result<f64> {
        let line = self.single(request)?;
        line.parse().map_err(|_| RelayError::UnexpectedResponse {
            request: request.to_string(),
            response: line,
        })
    }

    /// Boards answering on the daemon's `interface`.
    pub fn probe(&mut self, interface: Option<&str>) -> Result<BTreeMap<u8, MacAddr>> {
        let request = Request::Probe {
            interface: interface.map(str::to_string),
        };
        let mut boards = BTreeMap::new();
        for line in self.request(&request)? {
            let parsed = line.split_once(' ').and_then(|(geo, mac)| {
                let geo = u8::from_str_radix(geo, 16).ok()?;
                let mac = mac.trim().parse::<MacAddr>().ok()?;
                Some((geo, mac))
            });
            let (geo, mac) = parsed.ok_or_else(|| RelayError::UnexpectedResponse {
                request: request.to_string(),
                response: line.clone(),
            })?;
            boards.insert(geo, mac);
        }
        Ok(boards)
    }

    /// Hardware address of the daemon host on `interface`.
    pub fn host_mac_address(&mut self, interface: Option<&str>) -> Result<MacAddr> {
        let request = Request::HostMacAddr {
            interface: interface.map(str::to_string),
        };
        let line = self.single(&request)?;
        line.parse().map_err(|_| RelayError::UnexpectedResponse {
            request: request.to_string(),
            response: line,
        })
    }

    /// Make `key` the daemon's current board, unless it already is.
    pub fn select(&mut self, key: &SessionKey) -> Result<()> {
        if self.selected.as_ref() == Some(key) {
            return Ok(());
        }
        self.selected = None;
        self.command(&Request::Select {
            address: key.address,
            interface: Some(key.interface.clone()),
        })?;
        self.selected = Some(key.clone());
        Ok(())
    }
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("server", &self.server)
            .field("selected", &self.selected)
            .finish_non_exhaustive()
    }
}

/// A board driven through a relay daemon.
#[derive(Debug)]
pub struct RelayBoard {
    client: SharedClient,
    key: SessionKey,
    geoaddr: u8,
    mac: MacAddr,
}

impl RelayBoard {
    /// Select a board on the daemon and learn both of its addresses.
    pub fn select(client: SharedClient, address: BoardAddress, interface: &str) -> Result<Self> {
        let key = SessionKey {
            address,
            interface: interface.to_string(),
        };
        let (geoaddr, mac) = {
            let mut conn = lock(&client);
            conn.select(&key)?;
            let geo_line = conn.single(&Request::Geoaddr)?;
            let mac_line = conn.single(&Request::MacAddr)?;
            let geoaddr = geo_line
                .parse::<BoardAddress>()
                .ok()
                .and_then(|a| match a {
                    BoardAddress::Geo(geo) => Some(geo),
                    BoardAddress::Mac(_) => None,
                })
                .ok_or_else(|| RelayError::UnexpectedResponse {
                    request: Request::Geoaddr.to_string(),
                    response: geo_line.clone(),
                })?;
            let mac = mac_line
                .parse::<MacAddr>()
                .map_err(|_| RelayError::UnexpectedResponse {
                    request: Request::MacAddr.to_string(),
                    response: mac_line.clone(),
                })?;
            (geoaddr, mac)
        };
        Ok(Self {
            client,
            key,
            geoaddr,
            mac,
        })
    }

    /// Run `f` on the connection with this board current.
    fn with_board<T>(&self, f: impl FnOnce(&mut RelayClient) -> Result<T>) -> Result<T> {
        let mut conn = lock(&self.client);
        conn.select(&self.key)?;
        f(&mut conn)
    }

    pub fn interface(&self) -> &str {
        &self.key.interface
    }
}

fn lock(client: &SharedClient) -> MutexGuard<'_, RelayClient> {
    client.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl BoardAccess for RelayBoard {
    fn geoaddr(&self) -> u8 {
        self.geoaddr
    }

    fn mac_addr(&self) -> MacAddr {
        self.mac
    }

    fn reading(&mut self, reading: Reading) -> vbiasctl_board::Result<f64> {
        Ok(self.with_board(|c| c.number(&Request::Reading(reading)))?)
    }

    fn latch_status(&mut self) -> vbiasctl_board::Result<()> {
        Ok(self.with_board(|c| c.command(&Request::LatchStatus))?)
    }

    fn passthru_status(&mut self) -> vbiasctl_board::Result<()> {
        Ok(self.with_board(|c| c.command(&Request::PassthruStatus))?)
    }

    fn latch_voltages(&mut self) -> vbiasctl_board::Result<()> {
        Ok(self.with_board(|c| c.command(&Request::LatchVoltages))?)
    }

    fn passthru_voltages(&mut self) -> vbiasctl_board::Result<()> {
        Ok(self.with_board(|c| c.command(&Request::PassthruVoltages))?)
    }

    fn voltage(&mut self, channel: usize) -> vbiasctl_board::Result<f64> {
        Ok(self.with_board(|c| c.number(&Request::GetV(channel)))?)
    }

    fn pending_voltage(&mut self, channel: usize) -> vbiasctl_board::Result<f64> {
        Ok(self.with_board(|c| c.number(&Request::GetVnew(channel)))?)
    }

    fn set_voltage(&mut self, channel: usize, volts: f64) -> vbiasctl_board::Result<()> {
        Ok(self.with_board(|c| c.command(&Request::SetV(channel, volts)))?)
    }

    fn last_packet(&mut self) -> vbiasctl_board::Result<Option<Bytes>> {
        let line = self.with_board(|c| c.single(&Request::LastPacket))?;
        let bytes = response::parse_hex_bytes(&line).ok_or_else(|| {
            BoardError::Remote(format!("malformed packet dump {line:?}"))
        })?;
        Ok(Some(Bytes::from(bytes)))
    }

    fn ramp(&mut self) -> vbiasctl_board::Result<()> {
        Ok(self.with_board(|c| c.command(&Request::Ramp))?)
    }

    fn reset(&mut self) -> vbiasctl_board::Result<()> {
        Ok(self.with_board(|c| c.command(&Request::Reset))?)
    }
}
