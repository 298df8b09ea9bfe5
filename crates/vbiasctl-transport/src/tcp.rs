use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::RelayStream;

/// TCP port the relay daemon listens on unless told otherwise.
pub const DEFAULT_RELAY_PORT: u16 = 5692;

/// Listening side of the relay protocol.
pub struct RelayListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl RelayListener {
    /// Bind and listen on `addr` (for example `0.0.0.0:5692`).
    ///
    /// Port 0 picks an ephemeral port; see [`local_addr`](Self::local_addr).
    pub fn bind(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<Self> {
        let listener = TcpListener::bind(&addr).map_err(|e| TransportError::Bind {
            addr: format!("{addr:?}"),
            source: e,
        })?;
        let local_addr = listener.local_addr().map_err(|e| TransportError::Bind {
            addr: format!("{addr:?}"),
            source: e,
        })?;
        info!(%local_addr, "relay listening");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<RelayStream> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        stream.set_nonblocking(false)?;
        debug!(%peer, "accepted relay connection");
        Ok(RelayStream::from_tcp(stream))
    }

    /// Accept a connection if one is pending.
    ///
    /// Only meaningful after [`set_nonblocking(true)`](Self::set_nonblocking);
    /// returns `Ok(None)` when nobody is waiting.
    pub fn try_accept(&self) -> Result<Option<RelayStream>> {
        match self.accept() {
            Ok(stream) => Ok(Some(stream)),
            Err(TransportError::Accept(e)) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.listener
            .set_nonblocking(nonblocking)
            .map_err(Into::into)
    }

    /// Connect to a relay daemon (blocking).
    pub fn connect(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<RelayStream> {
        let stream = TcpStream::connect(&addr).map_err(|e| TransportError::Connect {
            addr: format!("{addr:?}"),
            source: e,
        })?;
        // Requests are single short lines; do not let Nagle hold them back.
        stream.set_nodelay(true)?;
        debug!(?addr, "connected to relay");
        Ok(RelayStream::from_tcp(stream))
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl std::fmt::Debug for RelayListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayListener")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}
