use std::time::{Duration, Instant};

use bytes::BytesMut;
use tracing::{debug, warn};
use vbiasctl_transport::{MacAddr, PacketLink};

use crate::codec::{decode, encode, strip_ethernet_padding, Frame};
use crate::error::Result;

/// Malformed frames tolerated in one receive window before giving up.
pub const DEFAULT_MAX_BAD_FRAMES: usize = 999;

/// Configuration for a [`FrameLink`].
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Malformed frames tolerated per [`FrameLink::receive`] call.
    /// Once exceeded the call reports a timeout. Default: 999.
    pub max_bad_frames: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_bad_frames: DEFAULT_MAX_BAD_FRAMES,
        }
    }
}

/// Sends and receives typed frames over a packet link.
///
/// Malformed frames never reach the caller: they are logged, counted and
/// skipped. A burst of more than `max_bad_frames` of them ends the receive
/// window early, exactly as if nothing had arrived.
pub struct FrameLink<L> {
    inner: L,
    config: FrameConfig,
    buf: BytesMut,
}

impl<L: PacketLink> FrameLink<L> {
    /// Create a new frame link with default configuration.
    pub fn new(inner: L) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame link with explicit configuration.
    pub fn with_config(inner: L, config: FrameConfig) -> Self {
        Self {
            inner,
            config,
            buf: BytesMut::with_capacity(128),
        }
    }

    /// Encode and transmit one frame.
    pub fn send(&mut self, frame: &Frame) -> Result<()> {
        self.buf.clear();
        encode(frame, &mut self.buf)?;
        self.inner.send_packet(&self.buf)?;
        debug!(
            interface = self.inner.interface(),
            kind = %frame.kind,
            geoaddr = frame.geoaddr,
            dest = %frame.dest,
            "frame sent"
        );
        Ok(())
    }

    /// Wait up to `timeout` for the next well-formed frame.
    ///
    /// Returns `Ok(None)` when the window closes without one.
    pub fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        let deadline = Instant::now() + timeout;
        let mut bad_frames = 0usize;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(packet) = self.inner.recv_packet(remaining)? else {
                return Ok(None);
            };
            match decode(strip_ethernet_padding(&packet)) {
                Ok(frame) => return Ok(Some(frame)),
                Err(err) => {
                    bad_frames += 1;
                    debug!(
                        interface = self.inner.interface(),
                        len = packet.len(),
                        error = %err,
                        "discarding malformed frame"
                    );
                    if bad_frames > self.config.max_bad_frames {
                        warn!(
                            interface = self.inner.interface(),
                            bad_frames, "too many malformed frames, giving up on receive"
                        );
                        return Ok(None);
                    }
                }
            }
            if remaining.is_zero() {
                return Ok(None);
            }
        }
    }

    /// Discard every frame already queued on the link.
    pub fn drain(&mut self) -> Result<usize> {
        Ok(self.inner.drain()?)
    }

    /// Only deliver frames sent from `source` (`None` accepts all).
    pub fn set_source_filter(&mut self, source: Option<MacAddr>) {
        self.inner.set_source_filter(source);
    }

    pub fn local_mac(&self) -> MacAddr {
        self.inner.local_mac()
    }

    pub fn interface(&self) -> &str {
        self.inner.interface()
    }

    /// Current frame link configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Borrow the underlying link.
    pub fn get_ref(&self) -> &L {
        &self.inner
    }

    /// Mutably borrow the underlying link.
    pub fn get_mut(&mut self) -> &mut L {
        &mut self.inner
    }

    /// Consume the frame link and return the inner link.
    pub fn into_inner(self) -> L {
        self.inner
    }
}

impl<L> std::fmt::Debug for FrameLink<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameLink")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use bytes::Bytes;

    use super::*;
    use crate::kind::MessageType;
    use crate::payload::StatusWords;

    const HOST: MacAddr = MacAddr::new([2, 0, 0, 0, 0, 1]);
    const BOARD: MacAddr = MacAddr::new([0, 0x1a, 0, 0, 0, 0x9f]);

    #[derive(Default)]
    struct ScriptedLink {
        incoming: VecDeque<Bytes>,
        sent: Vec<Bytes>,
    }

    impl PacketLink for ScriptedLink {
        fn send_packet(&mut self, packet: &[u8]) -> vbiasctl_transport::Result<()> {
            self.sent.push(Bytes::copy_from_slice(packet));
            Ok(())
        }

        fn recv_packet(&mut self, _timeout: Duration) -> vbiasctl_transport::Result<Option<Bytes>> {
            Ok(self.incoming.pop_front())
        }

        fn drain(&mut self) -> vbiasctl_transport::Result<usize> {
            let n = self.incoming.len();
            self.incoming.clear();
            Ok(n)
        }

        fn set_source_filter(&mut self, _source: Option<MacAddr>) {}

        fn local_mac(&self) -> MacAddr {
            HOST
        }

        fn interface(&self) -> &str {
            "sim0"
        }
    }

    fn status_bytes() -> Bytes {
        Frame::status(HOST, BOARD, 0x9f, &StatusWords([1; 17]))
            .to_bytes()
            .unwrap()
    }

    #[test]
    fn send_encodes_frame() {
        let mut link = FrameLink::new(ScriptedLink::default());
        link.send(&Frame::query(BOARD, HOST, 0x9f)).unwrap();
        let sent = &link.get_ref().sent;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].len(), 64);
    }

    #[test]
    fn receive_skips_garbage() {
        let mut scripted = ScriptedLink::default();
        scripted.incoming.push_back(Bytes::from_static(b"noise"));
        scripted.incoming.push_back(status_bytes());
        let mut link = FrameLink::new(scripted);

        let frame = link
            .receive(Duration::from_millis(10))
            .unwrap()
            .expect("status frame should survive the garbage");
        assert_eq!(frame.kind, MessageType::Status);
        assert_eq!(frame.src, BOARD);
    }

    #[test]
    fn receive_trims_ethernet_padding() {
        let mut padded = status_bytes().to_vec();
        padded.resize(60, 0);
        let mut scripted = ScriptedLink::default();
        scripted.incoming.push_back(Bytes::from(padded));
        let mut link = FrameLink::new(scripted);

        let frame = link.receive(Duration::from_millis(10)).unwrap().unwrap();
        assert_eq!(frame.payload.len(), StatusWords::PAYLOAD_LEN);
    }

    #[test]
    fn bad_frame_threshold_ends_window() {
        let mut scripted = ScriptedLink::default();
        for _ in 0..3 {
            scripted.incoming.push_back(Bytes::from_static(b"junk"));
        }
        scripted.incoming.push_back(status_bytes());
        let mut link = FrameLink::with_config(scripted, FrameConfig { max_bad_frames: 2 });

        assert!(link.receive(Duration::from_secs(1)).unwrap().is_none());
        // The good frame is still queued for the next window.
        assert!(link.receive(Duration::from_secs(1)).unwrap().is_some());
    }

    #[test]
    fn empty_link_times_out() {
        let mut link = FrameLink::new(ScriptedLink::default());
        assert!(link.receive(Duration::ZERO).unwrap().is_none());
        assert_eq!(link.drain().unwrap(), 0);
    }
}
