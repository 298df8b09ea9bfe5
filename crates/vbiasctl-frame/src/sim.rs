//! An in-memory Ethernet segment populated with simulated Vbias boards.
//!
//! [`SimulatedSegment`] implements [`PacketLink`], so sessions, discovery
//! and the relay daemon can run against it unchanged. Boards answer the way
//! the firmware does: `Q` with `S`, `P` with `D` after applying the write
//! mask, `R` with a broadcast `S`. Clones share one segment, so a test can
//! keep a clone to inspect traffic after handing the other to a session.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use vbiasctl_transport::{MacAddr, PacketLink, Result};

use crate::codec::{decode, Frame, BROADCAST_GEOADDR, ETHERNET_MIN_FRAME};
use crate::kind::MessageType;
use crate::payload::{StatusWords, VoltageCodes, CHANNELS};

/// Hardware address the simulated host transmits from.
pub const SIM_HOST_MAC: MacAddr = MacAddr::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);

/// Status words of a healthy board at room temperature in low gain mode.
pub const NOMINAL_STATUS: [u16; 17] = [
    100,  // chip temperature, 25 C
    2052, // -5 V divider tap
    2690, // +3.3 V
    4076, // +5 V
    978,  // +1.2 V
    0, 0, 0, 0, 0,
    1010, // preamp 2 sumref
    2030, // gain mode, 5 V
    2038, // preamp 2 thermistor
    1012, // preamp 1 sumref
    530,  // DAC diode
    263,  // DAC health
    2040, // preamp 1 thermistor
];

/// One simulated board on the segment.
#[derive(Debug, Clone)]
pub struct SimBoard {
    pub geoaddr: u8,
    pub mac: MacAddr,
    pub status: StatusWords,
    pub codes: VoltageCodes,
    /// A silent board ignores everything sent to it.
    pub silent: bool,
    /// Number of upcoming writes whose `D` reply echoes a wrong code.
    pub corrupt_echoes: usize,
    /// Geoaddr written into replies, when it differs from the real slot.
    pub reported_geoaddr: Option<u8>,
}

impl SimBoard {
    pub fn new(geoaddr: u8, mac: MacAddr) -> Self {
        Self {
            geoaddr,
            mac,
            status: StatusWords(NOMINAL_STATUS),
            codes: VoltageCodes::default(),
            silent: false,
            corrupt_echoes: 0,
            reported_geoaddr: None,
        }
    }

    fn addressed_by(&self, frame: &Frame) -> bool {
        let mac_ok = frame.dest == self.mac || frame.dest.is_broadcast();
        let geo_ok = frame.geoaddr == BROADCAST_GEOADDR || frame.geoaddr == self.geoaddr;
        !self.silent && mac_ok && geo_ok
    }

    fn respond(&mut self, frame: &Frame) -> Option<Frame> {
        let geoaddr = self.reported_geoaddr.unwrap_or(self.geoaddr);
        match frame.kind {
            MessageType::Query => Some(Frame::status(
                frame.src,
                self.mac,
                geoaddr,
                &self.status,
            )),
            MessageType::Reset => Some(Frame::status(
                MacAddr::BROADCAST,
                self.mac,
                geoaddr,
                &self.status,
            )),
            MessageType::Program => {
                let request = frame.program_request().ok()?;
                for chan in request.masked_channels() {
                    self.codes.0[chan] = request.codes[chan];
                }
                let mut echo = self.codes;
                if let Some(chan) = request.masked_channels().next() {
                    if self.corrupt_echoes > 0 {
                        self.corrupt_echoes -= 1;
                        echo.0[chan] ^= 0x0001;
                    }
                }
                Some(Frame::data(frame.src, self.mac, geoaddr, &echo))
            }
            MessageType::Status | MessageType::Data => None,
        }
    }
}

#[derive(Debug, Default)]
struct SegmentState {
    boards: Vec<SimBoard>,
    queue: VecDeque<Bytes>,
    overheard: Vec<Bytes>,
    filter: Option<MacAddr>,
    sent: HashMap<MessageType, usize>,
    receive_calls: usize,
}

/// A simulated Ethernet segment seen from the host.
#[derive(Debug, Clone)]
pub struct SimulatedSegment {
    state: Arc<Mutex<SegmentState>>,
    interface: String,
    host: MacAddr,
}

impl SimulatedSegment {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            state: Arc::default(),
            interface: interface.into(),
            host: SIM_HOST_MAC,
        }
    }

    /// Add a board with nominal status and all channels at code 0.
    pub fn with_board(self, geoaddr: u8, mac: MacAddr) -> Self {
        self.add_board(SimBoard::new(geoaddr, mac));
        self
    }

    pub fn add_board(&self, board: SimBoard) {
        self.lock().boards.push(board);
    }

    /// Run `f` against the board at `geoaddr`, if present.
    pub fn with_board_mut<R>(&self, geoaddr: u8, f: impl FnOnce(&mut SimBoard) -> R) -> Option<R> {
        self.lock()
            .boards
            .iter_mut()
            .find(|board| board.geoaddr == geoaddr)
            .map(f)
    }

    /// A copy of the board at `geoaddr`, if present.
    pub fn board(&self, geoaddr: u8) -> Option<SimBoard> {
        self.with_board_mut(geoaddr, |board| board.clone())
    }

    /// Queue raw bytes as if they had arrived from the wire.
    pub fn inject(&self, packet: impl Into<Bytes>) {
        self.lock().queue.push_back(packet.into());
    }

    /// Queue a frame to arrive right after the host's next transmission,
    /// ahead of any board reply. Models traffic between other stations.
    pub fn overhear(&self, frame: &Frame) {
        if let Ok(bytes) = frame.to_bytes() {
            self.lock().overheard.push(bytes);
        }
    }

    /// Number of frames of `kind` the host has transmitted.
    pub fn sent_count(&self, kind: MessageType) -> usize {
        self.lock().sent.get(&kind).copied().unwrap_or(0)
    }

    /// Total frames the host has transmitted.
    pub fn total_sent(&self) -> usize {
        self.lock().sent.values().sum()
    }

    /// Number of receive calls made on the segment.
    pub fn receive_calls(&self) -> usize {
        self.lock().receive_calls
    }

    /// Frames waiting to be received.
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    fn lock(&self) -> MutexGuard<'_, SegmentState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PacketLink for SimulatedSegment {
    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        let mut state = self.lock();
        let Ok(frame) = decode(packet) else {
            return Ok(());
        };
        *state.sent.entry(frame.kind).or_default() += 1;
        let overheard = std::mem::take(&mut state.overheard);
        state.queue.extend(overheard);

        let mut replies = Vec::new();
        for board in state.boards.iter_mut().filter(|b| b.addressed_by(&frame)) {
            if let Some(reply) = board.respond(&frame) {
                replies.push(reply);
            }
        }
        for reply in replies {
            if let Ok(bytes) = reply.to_bytes() {
                let mut wire = bytes.to_vec();
                if wire.len() < ETHERNET_MIN_FRAME {
                    wire.resize(ETHERNET_MIN_FRAME, 0);
                }
                state.queue.push_back(Bytes::from(wire));
            }
        }
        Ok(())
    }

    fn recv_packet(&mut self, _timeout: Duration) -> Result<Option<Bytes>> {
        let mut state = self.lock();
        state.receive_calls += 1;
        while let Some(packet) = state.queue.pop_front() {
            let passes = match state.filter {
                None => true,
                Some(source) => packet.get(6..12) == Some(&source.octets()[..]),
            };
            if passes {
                return Ok(Some(packet));
            }
        }
        Ok(None)
    }

    fn drain(&mut self) -> Result<usize> {
        let mut state = self.lock();
        let n = state.queue.len();
        state.queue.clear();
        Ok(n)
    }

    fn set_source_filter(&mut self, source: Option<MacAddr>) {
        self.lock().filter = source;
    }

    fn local_mac(&self) -> MacAddr {
        self.host
    }

    fn interface(&self) -> &str {
        &self.interface
    }
}

/// Channel codes where every channel holds `code`.
pub fn uniform_codes(code: u16) -> VoltageCodes {
    VoltageCodes([code; CHANNELS])
}
