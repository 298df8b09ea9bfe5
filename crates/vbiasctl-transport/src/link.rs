use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;

use crate::address::MacAddr;
use crate::error::Result;

/// A link that carries whole Ethernet frames.
///
/// `recv_packet` returns `Ok(None)` when `timeout` elapses without a
/// deliverable frame. Timeouts are a normal outcome, not an error.
pub trait PacketLink {
    /// Transmit one complete frame.
    fn send_packet(&mut self, packet: &[u8]) -> Result<()>;

    /// Wait up to `timeout` for the next frame that passes the source filter.
    fn recv_packet(&mut self, timeout: Duration) -> Result<Option<Bytes>>;

    /// Discard every frame already queued without blocking.
    ///
    /// Returns the number of frames discarded.
    fn drain(&mut self) -> Result<usize>;

    /// Only deliver frames whose source address equals `source`.
    ///
    /// `None` removes the filter.
    fn set_source_filter(&mut self, source: Option<MacAddr>);

    /// Hardware address of the local end of the link.
    fn local_mac(&self) -> MacAddr;

    /// Name of the underlying interface, for diagnostics.
    fn interface(&self) -> &str;
}

impl<L: PacketLink + ?Sized> PacketLink for &mut L {
    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        (**self).send_packet(packet)
    }

    fn recv_packet(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        (**self).recv_packet(timeout)
    }

    fn drain(&mut self) -> Result<usize> {
        (**self).drain()
    }

    fn set_source_filter(&mut self, source: Option<MacAddr>) {
        (**self).set_source_filter(source)
    }

    fn local_mac(&self) -> MacAddr {
        (**self).local_mac()
    }

    fn interface(&self) -> &str {
        (**self).interface()
    }
}

impl<L: PacketLink + ?Sized> PacketLink for Box<L> {
    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        (**self).send_packet(packet)
    }

    fn recv_packet(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        (**self).recv_packet(timeout)
    }

    fn drain(&mut self) -> Result<usize> {
        (**self).drain()
    }

    fn set_source_filter(&mut self, source: Option<MacAddr>) {
        (**self).set_source_filter(source)
    }

    fn local_mac(&self) -> MacAddr {
        (**self).local_mac()
    }

    fn interface(&self) -> &str {
        (**self).interface()
    }
}

/// A packet link shared by several board sessions on one interface.
///
/// Opening a raw link is expensive, so one handle per interface is reused.
/// Every call locks the inner link; callers that need a whole
/// request/response exchange to be atomic must serialize at a higher level.
pub struct SharedLink<L> {
    inner: Arc<Mutex<L>>,
    interface: String,
    local_mac: MacAddr,
}

impl<L: PacketLink> SharedLink<L> {
    pub fn new(link: L) -> Self {
        let interface = link.interface().to_string();
        let local_mac = link.local_mac();
        Self {
            inner: Arc::new(Mutex::new(link)),
            interface,
            local_mac,
        }
    }

    /// Number of handles currently sharing the link.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    fn lock(&self) -> MutexGuard<'_, L> {
        // A panic while holding the lock leaves the socket itself intact.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<L> Clone for SharedLink<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            interface: self.interface.clone(),
            local_mac: self.local_mac,
        }
    }
}

impl<L: PacketLink> PacketLink for SharedLink<L> {
    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.lock().send_packet(packet)
    }

    fn recv_packet(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        self.lock().recv_packet(timeout)
    }

    fn drain(&mut self) -> Result<usize> {
        self.lock().drain()
    }

    fn set_source_filter(&mut self, source: Option<MacAddr>) {
        self.lock().set_source_filter(source)
    }

    fn local_mac(&self) -> MacAddr {
        self.local_mac
    }

    fn interface(&self) -> &str {
        &self.interface
    }
}

impl<L> std::fmt::Debug for SharedLink<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedLink")
            .field("interface", &self.interface)
            .field("local_mac", &self.local_mac)
            .finish()
    }
}
