use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::{debug, info};
use vbiasctl_board::{BoardAddress, BoardSession, SessionConfig};
use vbiasctl_transport::{PacketLink, SharedLink};

use crate::error::Result;

/// Opens the packet link for an interface name.
///
/// The daemon opens raw sockets; tests hand in simulated segments.
pub trait LinkOpener {
    type Link: PacketLink;

    fn open(&mut self, interface: &str) -> vbiasctl_transport::Result<Self::Link>;
}

impl<F, L> LinkOpener for F
where
    F: FnMut(&str) -> vbiasctl_transport::Result<L>,
    L: PacketLink,
{
    type Link = L;

    fn open(&mut self, interface: &str) -> vbiasctl_transport::Result<L> {
        self(interface)
    }
}

/// Opens raw `AF_PACKET` sockets.
#[cfg(target_os = "linux")]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawOpener;

#[cfg(target_os = "linux")]
impl LinkOpener for RawOpener {
    type Link = vbiasctl_transport::RawSocket;

    fn open(&mut self, interface: &str) -> vbiasctl_transport::Result<Self::Link> {
        vbiasctl_transport::RawSocket::open(interface)
    }
}

/// One shared link per interface, opened on first use and kept for the
/// life of the daemon.
pub struct AdapterPool<O: LinkOpener> {
    opener: O,
    links: HashMap<String, SharedLink<O::Link>>,
}

impl<O: LinkOpener> AdapterPool<O> {
    pub fn new(opener: O) -> Self {
        Self {
            opener,
            links: HashMap::new(),
        }
    }

    /// A handle to the link for `interface`, opening it if needed.
    pub fn link(&mut self, interface: &str) -> Result<SharedLink<O::Link>> {
        if let Some(link) = self.links.get(interface) {
            return Ok(link.clone());
        }
        let link = SharedLink::new(self.opener.open(interface)?);
        info!(interface, mac = %link.local_mac(), "opened board interface");
        self.links.insert(interface.to_string(), link.clone());
        Ok(link)
    }

    /// Number of interfaces opened so far.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

impl<O: LinkOpener> std::fmt::Debug for AdapterPool<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterPool")
            .field("interfaces", &self.links.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Identifies a board session within one connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub address: BoardAddress,
    pub interface: String,
}

/// Board sessions opened by one client connection, plus which is current.
pub struct SessionRegistry<L> {
    sessions: HashMap<SessionKey, BoardSession<SharedLink<L>>>,
    current: Option<SessionKey>,
}

impl<L: PacketLink> SessionRegistry<L> {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            current: None,
        }
    }

    /// Make the board at `key` current, selecting it on `link` if this
    /// connection has not used it before.
    ///
    /// On failure no board is current.
    pub fn select(
        &mut self,
        key: SessionKey,
        link: impl FnOnce() -> Result<SharedLink<L>>,
        config: &SessionConfig,
    ) -> Result<&mut BoardSession<SharedLink<L>>> {
        self.current = None;
        let session = match self.sessions.entry(key.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let session = BoardSession::select(link()?, key.address, config.clone())?;
                debug!(address = %key.address, interface = %key.interface, "session opened");
                entry.insert(session)
            }
        };
        self.current = Some(key);
        Ok(session)
    }

    /// The current board, if one is selected.
    pub fn current(&mut self) -> Option<&mut BoardSession<SharedLink<L>>> {
        let key = self.current.as_ref()?;
        self.sessions.get_mut(key)
    }

    pub fn current_key(&self) -> Option<&SessionKey> {
        self.current.as_ref()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<L: PacketLink> Default for SessionRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use vbiasctl_frame::sim::SimulatedSegment;
    use vbiasctl_transport::{MacAddr, TransportError};

    use super::*;

    fn segment() -> SimulatedSegment {
        SimulatedSegment::new("sim0").with_board(0x9f, MacAddr::new([0, 0x1a, 0, 0, 0, 0x9f]))
    }

    fn config() -> SessionConfig {
        SessionConfig {
            response_timeout: Duration::from_millis(10),
            ..SessionConfig::default()
        }
    }

    #[test]
    fn pool_opens_each_interface_once() {
        let seg = segment();
        let mut opened = 0;
        let mut pool = AdapterPool::new(|_: &str| {
            opened += 1;
            Ok::<_, TransportError>(seg.clone())
        });
        let a = pool.link("eth0").unwrap();
        let _b = pool.link("eth0").unwrap();
        let _c = pool.link("eth1").unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(a.handle_count(), 3);
        drop(pool);
        assert_eq!(opened, 2);
    }

    #[test]
    fn pool_reports_open_failure() {
        let mut pool = AdapterPool::new(|name: &str| {
            Err::<SimulatedSegment, _>(TransportError::NotEthernet {
                interface: name.to_string(),
            })
        });
        assert!(pool.link("lo").is_err());
        assert!(pool.is_empty());
    }

    #[test]
    fn registry_reuses_sessions() {
        let seg = segment();
        let mut registry = SessionRegistry::new();
        let key = SessionKey {
            address: BoardAddress::Geo(0x9f),
            interface: "sim0".into(),
        };
        let link = SharedLink::new(seg.clone());

        registry.select(key.clone(), || Ok(link.clone()), &config()).unwrap();
        registry.select(key.clone(), || Ok(link.clone()), &config()).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(seg.sent_count(vbiasctl_frame::MessageType::Query), 1);
        assert_eq!(registry.current().map(|s| s.geoaddr()), Some(0x9f));
    }

    #[test]
    fn failed_select_clears_current() {
        let seg = segment();
        let link = SharedLink::new(seg);
        let mut registry = SessionRegistry::new();
        let good = SessionKey {
            address: BoardAddress::Geo(0x9f),
            interface: "sim0".into(),
        };
        let missing = SessionKey {
            address: BoardAddress::Geo(0x10),
            interface: "sim0".into(),
        };
        registry.select(good, || Ok(link.clone()), &config()).unwrap();
        assert!(registry.select(missing, || Ok(link.clone()), &config()).is_err());
        assert!(registry.current().is_none());
        assert!(registry.current_key().is_none());
    }
}
