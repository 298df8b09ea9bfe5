use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{debug, info, warn};
use vbiasctl_frame::{
    Frame, FrameConfig, FrameLink, MessageType, ProgramRequest, StatusWords, VoltageCodes,
    BROADCAST_GEOADDR, CHANNELS,
};
use vbiasctl_transport::{MacAddr, PacketLink};

use crate::config::SessionConfig;
use crate::error::{BoardError, Result};
use crate::identity::{BoardAddress, BoardIdentity};
use crate::readings::{Calibration, GainMode, Reading};

/// Where a board session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unselected,
    /// Waiting for the first status report.
    Selecting,
    Ready,
    Resetting,
    /// An integrity check failed and the recovery reset did not succeed.
    Faulted,
}

/// One selected Vbias board, driven over a packet link.
///
/// Requests are strictly request-then-response: each drains stale frames,
/// sends, and listens for a matching answer, up to `retries` times.
/// Status and voltage reads go to the board unless latched.
pub struct BoardSession<L> {
    link: FrameLink<L>,
    config: SessionConfig,
    calibration: Calibration,
    state: SessionState,
    geoaddr: u8,
    /// Board hardware address; broadcast until the board has answered.
    dest: MacAddr,
    status: StatusWords,
    voltages: VoltageCodes,
    pending: BTreeMap<usize, u16>,
    status_latched: bool,
    voltages_latched: bool,
    last_packet: Option<Frame>,
}

impl<L: PacketLink> BoardSession<L> {
    /// Select a board and fetch its first status report.
    pub fn select(link: L, address: BoardAddress, config: SessionConfig) -> Result<Self> {
        Self::select_with_calibration(link, address, config, Calibration::default())
    }

    pub fn select_with_calibration(
        link: L,
        address: BoardAddress,
        config: SessionConfig,
        calibration: Calibration,
    ) -> Result<Self> {
        let (geoaddr, dest) = match address {
            BoardAddress::Geo(geo) => (geo, MacAddr::BROADCAST),
            BoardAddress::Mac(mac) => (BROADCAST_GEOADDR, mac),
        };
        let frame_config = FrameConfig {
            max_bad_frames: config.max_bad_frames,
        };
        let mut session = Self {
            link: FrameLink::with_config(link, frame_config),
            config,
            calibration,
            state: SessionState::Unselected,
            geoaddr,
            dest,
            status: StatusWords::default(),
            voltages: VoltageCodes::default(),
            pending: BTreeMap::new(),
            status_latched: false,
            voltages_latched: false,
            last_packet: None,
        };
        session.handshake(address)?;
        Ok(session)
    }

    fn handshake(&mut self, address: BoardAddress) -> Result<()> {
        self.state = SessionState::Selecting;
        let result = self.fetch_status();
        if let Err(err) = result {
            self.state = SessionState::Unselected;
            return Err(err);
        }
        let (reported_geo, reported_mac) = match &self.last_packet {
            Some(frame) => (frame.geoaddr, frame.src),
            None => (self.geoaddr, self.dest),
        };

        match address {
            BoardAddress::Geo(requested) => {
                if requested != BROADCAST_GEOADDR && reported_geo != requested {
                    self.state = SessionState::Unselected;
                    return Err(BoardError::AddressMismatch {
                        requested,
                        reported: reported_geo,
                    });
                }
                self.dest = reported_mac;
            }
            BoardAddress::Mac(_) => {
                self.geoaddr = reported_geo;
            }
        }

        self.state = SessionState::Ready;
        info!(
            interface = self.link.interface(),
            geoaddr = self.geoaddr,
            mac = %self.dest,
            "selected Vbias board"
        );
        Ok(())
    }

    /// Query the board and store its status words.
    pub fn fetch_status(&mut self) -> Result<()> {
        let request = Frame::query(self.dest, self.link.local_mac(), self.geoaddr);
        let reply = self.exchange(&request, MessageType::Status, "status query")?;
        self.status = reply.status_words()?;
        Ok(())
    }

    /// Read back all 32 channel codes without writing any.
    pub fn fetch_voltages(&mut self) -> Result<()> {
        self.program(ProgramRequest::read_back(), true)
    }

    /// Write the channels selected by `mask` and verify the echo.
    ///
    /// A channel that reads back differently triggers one automatic reset,
    /// after which [`BoardError::Mismatch`] is returned regardless.
    pub fn set_voltages(&mut self, mask: u32, codes: &[u16; CHANNELS]) -> Result<()> {
        self.check_writable()?;
        self.program(ProgramRequest::new(mask, *codes), true)
    }

    fn check_writable(&self) -> Result<()> {
        if self.state == SessionState::Faulted {
            return Err(BoardError::Faulted {
                geoaddr: self.geoaddr,
            });
        }
        Ok(())
    }

    fn program(&mut self, request: ProgramRequest, reset_on_mismatch: bool) -> Result<()> {
        let frame = Frame::program(self.dest, self.link.local_mac(), self.geoaddr, &request);
        let reply = self.exchange(&frame, MessageType::Data, "program")?;
        let echoed = reply.voltage_codes()?;
        self.voltages = echoed;

        let Some(channel) = request
            .masked_channels()
            .find(|&chan| echoed.code(chan) != request.codes[chan])
        else {
            return Ok(());
        };

        let mismatch = BoardError::Mismatch {
            channel,
            sent: request.codes[channel],
            echoed: echoed.code(channel),
        };
        warn!(geoaddr = self.geoaddr, error = %mismatch, "read-back integrity check failed");
        if reset_on_mismatch {
            match self.run_reset() {
                Ok(()) => {
                    self.state = SessionState::Ready;
                    info!(geoaddr = self.geoaddr, "board reset after integrity failure");
                }
                Err(err) => {
                    self.state = SessionState::Faulted;
                    warn!(geoaddr = self.geoaddr, error = %err, "recovery reset failed");
                }
            }
        }
        Err(mismatch)
    }

    /// Hard-reset the board and zero every channel.
    ///
    /// The board's own confirmation is best effort; the reset counts as done
    /// once a direct status query and the zeroing write both succeed.
    pub fn reset(&mut self) -> Result<()> {
        match self.run_reset() {
            Ok(()) => {
                self.state = SessionState::Ready;
                info!(geoaddr = self.geoaddr, "board reset");
                Ok(())
            }
            Err(err) => {
                self.state = SessionState::Faulted;
                Err(BoardError::ResetFailed {
                    geoaddr: self.geoaddr,
                    source: Box::new(err),
                })
            }
        }
    }

    fn run_reset(&mut self) -> Result<()> {
        self.state = SessionState::Resetting;
        warn!(geoaddr = self.geoaddr, "sending hard reset");
        self.prepare("reset")?;
        let request = Frame::reset(self.dest, self.link.local_mac(), self.geoaddr);
        self.link.send(&request)?;
        match self.await_response(MessageType::Status, true)? {
            Some(reply) => self.status = reply.status_words()?,
            None => debug!(
                geoaddr = self.geoaddr,
                "no reset confirmation, querying board directly"
            ),
        }

        self.fetch_status()?;
        // A hard reset clears the DAC but not the code registers.
        self.program(ProgramRequest::new(u32::MAX, [0; CHANNELS]), false)
    }

    /// Send `request` and wait for a valid `expect` answer, with retries.
    fn exchange(
        &mut self,
        request: &Frame,
        expect: MessageType,
        operation: &'static str,
    ) -> Result<Frame> {
        self.prepare(operation)?;
        let attempts = self.config.retries.max(1);
        for attempt in 1..=attempts {
            self.link.send(request)?;
            if let Some(reply) = self.await_response(expect, false)? {
                return Ok(reply);
            }
            debug!(geoaddr = self.geoaddr, operation, attempt, "no response");
        }
        Err(BoardError::NoResponse {
            operation,
            attempts,
        })
    }

    /// Point the source filter at this board and drop stale frames.
    fn prepare(&mut self, operation: &'static str) -> Result<()> {
        let filter = (!self.dest.is_broadcast()).then_some(self.dest);
        self.link.set_source_filter(filter);
        let drained = self.link.drain()?;
        if drained > 0 && self.state != SessionState::Selecting {
            debug!(geoaddr = self.geoaddr, operation, drained, "discarded unrequested packets");
        }
        Ok(())
    }

    /// Listen for one window. Unrelated frames are skipped and counted.
    fn await_response(
        &mut self,
        expect: MessageType,
        accept_broadcast: bool,
    ) -> Result<Option<Frame>> {
        let deadline = Instant::now() + self.config.response_timeout;
        let mut unexpected = 0usize;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(frame) = self.link.receive(remaining)? else {
                return Ok(None);
            };
            if self.accepts(&frame, expect, accept_broadcast) {
                self.last_packet = Some(frame.clone());
                return Ok(Some(frame));
            }
            unexpected += 1;
            debug!(
                geoaddr = self.geoaddr,
                kind = %frame.kind,
                from = %frame.src,
                unexpected,
                "unexpected response frame"
            );
            if unexpected > self.config.max_bad_frames || remaining.is_zero() {
                return Ok(None);
            }
        }
    }

    fn accepts(&self, frame: &Frame, expect: MessageType, accept_broadcast: bool) -> bool {
        if frame.kind != expect {
            return false;
        }
        let payload_ok = match expect {
            MessageType::Status => frame.status_words().is_ok(),
            MessageType::Data => frame.voltage_codes().is_ok(),
            _ => true,
        };
        // The link may be promiscuous; replies to other hosts are not ours.
        let local = self.link.local_mac();
        if frame.dest != local && !frame.dest.is_broadcast() {
            return false;
        }
        // While selecting by geoaddr any board's answer to this host is
        // taken, so that a wrong one can be reported.
        let geo_ok = self.geoaddr == BROADCAST_GEOADDR
            || frame.geoaddr == self.geoaddr
            || self.state == SessionState::Selecting;
        let src_ok = self.dest.is_broadcast()
            || frame.src == self.dest
            || (accept_broadcast && frame.dest.is_broadcast());
        payload_ok && geo_ok && src_ok
    }

    /// Status words, fetched unless latched.
    fn status_snapshot(&mut self) -> Result<StatusWords> {
        if !self.status_latched {
            self.fetch_status()?;
        }
        Ok(self.status)
    }

    /// A derived reading. Each call fetches at most once.
    pub fn reading(&mut self, reading: Reading) -> Result<f64> {
        let words = self.status_snapshot()?;
        Ok(self.calibration.convert(reading, &words))
    }

    pub fn gain_mode(&mut self) -> Result<GainMode> {
        let volts = self.reading(Reading::Vgainmode)?;
        Ok(GainMode::from_volts(volts))
    }

    /// Fetch once and serve later readings from that snapshot.
    pub fn latch_status(&mut self) -> Result<()> {
        self.fetch_status()?;
        self.status_latched = true;
        Ok(())
    }

    pub fn passthru_status(&mut self) {
        self.status_latched = false;
    }

    pub fn latch_voltages(&mut self) -> Result<()> {
        self.fetch_voltages()?;
        self.voltages_latched = true;
        Ok(())
    }

    pub fn passthru_voltages(&mut self) {
        self.voltages_latched = false;
    }

    /// Voltage on `channel` as reported by the board.
    pub fn voltage(&mut self, channel: usize) -> Result<f64> {
        check_channel(channel)?;
        if !self.voltages_latched {
            self.fetch_voltages()?;
        }
        Ok(self.calibration.code_to_volts(self.voltages.code(channel)))
    }

    /// Voltage the next ramp will drive `channel` to.
    ///
    /// Channels without a pending value report the code from the last
    /// voltage read-back rather than 0, since a ramp leaves them there.
    /// Relay clients see the same value through `getVnew`.
    pub fn pending_voltage(&self, channel: usize) -> Result<f64> {
        check_channel(channel)?;
        let code = self
            .pending
            .get(&channel)
            .copied()
            .unwrap_or_else(|| self.voltages.code(channel));
        Ok(self.calibration.code_to_volts(code))
    }

    /// Record a target for the next ramp. Does not touch the board.
    pub fn set_voltage(&mut self, channel: usize, volts: f64) -> Result<()> {
        check_channel(channel)?;
        let code = self
            .calibration
            .volts_to_code(volts)
            .ok_or(BoardError::VoltageOutOfRange { channel, volts })?;
        self.pending.insert(channel, code);
        Ok(())
    }

    /// Pending targets by channel, as DAC codes.
    pub fn pending(&self) -> &BTreeMap<usize, u16> {
        &self.pending
    }

    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    /// The most recent frame accepted from the board.
    pub fn last_packet(&self) -> Option<&Frame> {
        self.last_packet.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn geoaddr(&self) -> u8 {
        self.geoaddr
    }

    pub fn mac_addr(&self) -> MacAddr {
        self.dest
    }

    pub fn identity(&self) -> BoardIdentity {
        BoardIdentity {
            geoaddr: self.geoaddr,
            mac: self.dest,
        }
    }

    /// Last status words received, without touching the board.
    pub fn status(&self) -> &StatusWords {
        &self.status
    }

    /// Last channel codes received, without touching the board.
    pub fn voltages(&self) -> &VoltageCodes {
        &self.voltages
    }

    pub fn is_status_latched(&self) -> bool {
        self.status_latched
    }

    pub fn is_voltages_latched(&self) -> bool {
        self.voltages_latched
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn interface(&self) -> &str {
        self.link.interface()
    }

    /// Release the board and hand back the link.
    pub fn into_link(self) -> L {
        self.link.into_inner()
    }
}

impl<L> std::fmt::Debug for BoardSession<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoardSession")
            .field("geoaddr", &self.geoaddr)
            .field("mac", &self.dest)
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

fn check_channel(channel: usize) -> Result<()> {
    if channel >= CHANNELS {
        return Err(BoardError::InvalidChannel(channel));
    }
    Ok(())
}
