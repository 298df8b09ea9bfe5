use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{debug, info, warn};
use vbiasctl_frame::{Frame, FrameConfig, FrameLink, MessageType, BROADCAST_GEOADDR};
use vbiasctl_transport::{MacAddr, PacketLink};

use crate::config::ProbeConfig;
use crate::error::Result;

/// Broadcast a status query and collect every board that answers.
///
/// Keys are geoaddrs; a board answering twice keeps its latest MAC.
/// Discovery never selects a board and leaves no filter on the link.
/// Listening ends early after `max_bad_frames` unrelated frames in a row.
pub fn probe<L: PacketLink>(link: &mut L, config: &ProbeConfig) -> Result<BTreeMap<u8, MacAddr>> {
    let mut link = FrameLink::with_config(
        link,
        FrameConfig {
            max_bad_frames: config.max_bad_frames,
        },
    );
    link.set_source_filter(None);
    link.drain()?;

    let local = link.local_mac();
    link.send(&Frame::query(MacAddr::BROADCAST, local, BROADCAST_GEOADDR))?;

    let deadline = Instant::now() + config.window;
    let mut boards = BTreeMap::new();
    let mut unexpected = 0usize;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let Some(frame) = link.receive(remaining)? else {
            break;
        };
        let from_board = frame.kind == MessageType::Status
            && (frame.dest == local || frame.dest.is_broadcast())
            && !frame.src.is_broadcast()
            && frame.src != local
            && frame.status_words().is_ok();
        if from_board {
            debug!(geoaddr = frame.geoaddr, mac = %frame.src, "board answered probe");
            boards.insert(frame.geoaddr, frame.src);
            unexpected = 0;
        } else {
            unexpected += 1;
            if unexpected > config.max_bad_frames {
                warn!(
                    interface = link.interface(),
                    unexpected, "too many unexpected frames, ending probe"
                );
                break;
            }
        }
        if remaining.is_zero() {
            break;
        }
    }

    info!(interface = link.interface(), boards = boards.len(), "probe complete");
    Ok(boards)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use vbiasctl_frame::sim::{SimulatedSegment, SIM_HOST_MAC};
    use vbiasctl_frame::StatusWords;

    use super::*;

    const OTHER_HOST: MacAddr = MacAddr::new([0x02, 0, 0, 0, 0, 0x02]);

    fn mac(last: u8) -> MacAddr {
        MacAddr::new([0, 0x1a, 0x2b, 0x3c, 0x4d, last])
    }

    fn quick() -> ProbeConfig {
        ProbeConfig {
            window: Duration::from_millis(20),
            ..ProbeConfig::default()
        }
    }

    #[test]
    fn finds_every_board() {
        let mut seg = SimulatedSegment::new("sim0")
            .with_board(0x9f, mac(0x9f))
            .with_board(0x10, mac(0x10))
            .with_board(0xa0, mac(0xa0));
        let boards = probe(&mut seg, &quick()).unwrap();
        assert_eq!(boards.len(), 3);
        assert_eq!(boards[&0x10], mac(0x10));
        assert_eq!(boards.keys().copied().collect::<Vec<_>>(), vec![0x10, 0x9f, 0xa0]);
        assert_eq!(seg.sent_count(MessageType::Query), 1);
    }

    #[test]
    fn empty_segment_finds_nothing() {
        let mut seg = SimulatedSegment::new("sim0");
        assert!(probe(&mut seg, &quick()).unwrap().is_empty());
    }

    #[test]
    fn silent_boards_are_missing() {
        let mut seg = SimulatedSegment::new("sim0")
            .with_board(0x9f, mac(0x9f))
            .with_board(0xa0, mac(0xa0));
        seg.with_board_mut(0xa0, |b| b.silent = true);
        let boards = probe(&mut seg, &quick()).unwrap();
        assert_eq!(boards.keys().copied().collect::<Vec<_>>(), vec![0x9f]);
    }

    #[test]
    fn scattered_noise_does_not_end_listening() {
        let seg = SimulatedSegment::new("sim0");
        let noise = Frame::query(MacAddr::BROADCAST, OTHER_HOST, BROADCAST_GEOADDR);
        for geo in [0x10, 0x20, 0x30] {
            seg.overhear(&noise);
            seg.overhear(&Frame::status(SIM_HOST_MAC, mac(geo), geo, &StatusWords::default()));
        }
        let config = ProbeConfig {
            max_bad_frames: 2,
            ..quick()
        };
        let mut seg = seg;
        let boards = probe(&mut seg, &config).unwrap();
        assert_eq!(boards.keys().copied().collect::<Vec<_>>(), vec![0x10, 0x20, 0x30]);
    }

    #[test]
    fn consecutive_noise_ends_listening_early() {
        let seg = SimulatedSegment::new("sim0");
        let noise = Frame::query(MacAddr::BROADCAST, OTHER_HOST, BROADCAST_GEOADDR);
        for _ in 0..3 {
            seg.overhear(&noise);
        }
        seg.overhear(&Frame::status(SIM_HOST_MAC, mac(0x10), 0x10, &StatusWords::default()));
        let config = ProbeConfig {
            max_bad_frames: 2,
            ..quick()
        };
        let mut seg = seg;
        assert!(probe(&mut seg, &config).unwrap().is_empty());
        assert_eq!(seg.pending(), 1);
    }

    #[test]
    fn answers_to_other_hosts_are_not_boards() {
        let seg = SimulatedSegment::new("sim0").with_board(0x9f, mac(0x9f));
        seg.overhear(&Frame::status(OTHER_HOST, mac(0xa0), 0xa0, &StatusWords::default()));
        let mut seg = seg;
        let boards = probe(&mut seg, &quick()).unwrap();
        assert_eq!(boards.keys().copied().collect::<Vec<_>>(), vec![0x9f]);
    }

    #[test]
    fn stale_traffic_is_drained() {
        let seg = SimulatedSegment::new("sim0").with_board(0x9f, mac(0x9f));
        seg.inject(
            Frame::status(SIM_HOST_MAC, MacAddr::BROADCAST, 0x01, &StatusWords::default())
                .to_bytes()
                .unwrap(),
        );
        seg.inject(Bytes::from_static(b"garbage"));
        let mut seg = seg;
        let boards = probe(&mut seg, &quick()).unwrap();
        assert_eq!(boards.len(), 1);
        assert!(boards.contains_key(&0x9f));
    }
}
