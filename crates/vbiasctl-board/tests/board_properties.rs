use std::time::Duration;

use vbiasctl_board::{
    probe, step_bound, BoardAddress, BoardError, BoardSession, ProbeConfig, Reading,
    SessionConfig, SessionState,
};
use vbiasctl_frame::sim::{uniform_codes, SimulatedSegment};
use vbiasctl_frame::MessageType;
use vbiasctl_transport::MacAddr;

fn mac(last: u8) -> MacAddr {
    MacAddr::new([0x00, 0x1a, 0x2b, 0x3c, 0x4d, last])
}

fn config() -> SessionConfig {
    SessionConfig {
        response_timeout: Duration::from_millis(25),
        ..SessionConfig::default()
    }
}

fn select(seg: &SimulatedSegment, geo: u8) -> BoardSession<SimulatedSegment> {
    BoardSession::select(seg.clone(), BoardAddress::Geo(geo), config())
        .expect("simulated board should be selectable")
}

#[test]
fn ramp_converges_within_step_bound() {
    let seg = SimulatedSegment::new("sim0").with_board(0x9f, mac(0x9f));
    seg.with_board_mut(0x9f, |b| {
        b.codes = uniform_codes(500);
        b.codes.0[3] = 9000;
    });
    let mut board = select(&seg, 0x9f);
    let cal = board.calibration().clone();

    let targets = [(0usize, 80.0), (3, 10.0), (17, 5.5), (31, 13.0)];
    for (chan, volts) in targets {
        board.set_voltage(chan, volts).expect("target should be in range");
    }
    let mut target_codes = uniform_codes(500).0;
    target_codes[3] = 9000;
    for (chan, volts) in targets {
        target_codes[chan] = cal.volts_to_code(volts).expect("in range");
    }
    let mut start = uniform_codes(500).0;
    start[3] = 9000;
    let bound = step_bound(&start, &target_codes, board.config().ramp.max_step);

    let steps = board.ramp().expect("ramp should converge");
    assert!(steps <= bound + 1, "{steps} steps exceeds bound {bound}");
    assert_eq!(seg.board(0x9f).unwrap().codes.0, target_codes);
    assert!(board.pending().is_empty());
}

#[test]
fn ramp_without_pending_targets_touches_nothing() {
    let seg = SimulatedSegment::new("sim0").with_board(0x9f, mac(0x9f));
    let mut board = select(&seg, 0x9f);
    let sent = seg.total_sent();
    let received = seg.receive_calls();

    assert_eq!(board.ramp().expect("empty ramp succeeds"), 0);
    assert_eq!(seg.total_sent(), sent);
    assert_eq!(seg.receive_calls(), received);
}

#[test]
fn ramp_never_exceeds_slew_limit() {
    let seg = SimulatedSegment::new("sim0").with_board(0x9f, mac(0x9f));
    let mut single = config();
    single.ramp.max_iterations = 1;
    let limit = single.ramp.max_step;
    let mut stepper = BoardSession::select(seg.clone(), BoardAddress::Geo(0x9f), single).unwrap();
    stepper.set_voltage(0, 20.0).unwrap();

    // With a cap of one step, each call makes exactly one write.
    let mut previous = 0u16;
    loop {
        match stepper.ramp() {
            Ok(_) => break,
            Err(BoardError::RampIncomplete { iterations: 1 }) => {
                let now = seg.board(0x9f).unwrap().codes.code(0);
                assert!(now - previous <= limit, "moved {} codes", now - previous);
                previous = now;
            }
            Err(other) => panic!("unexpected ramp error: {other}"),
        }
    }
    assert_eq!(
        seg.board(0x9f).unwrap().codes.code(0),
        stepper.calibration().volts_to_code(20.0).unwrap()
    );
}

#[test]
fn integrity_failure_resets_exactly_once() {
    let seg = SimulatedSegment::new("sim0").with_board(0x9f, mac(0x9f));
    let mut board = select(&seg, 0x9f);
    board.set_voltage(5, 1.0).unwrap();
    seg.with_board_mut(0x9f, |b| b.corrupt_echoes = 1);

    // The first write of the ramp carries the corrupted echo.
    let err = board.ramp().expect_err("ramp should stop on mismatch");
    assert!(matches!(err, BoardError::Mismatch { channel: 5, .. }), "{err}");
    assert_eq!(seg.sent_count(MessageType::Reset), 1);
    assert_eq!(board.state(), SessionState::Ready);
    assert!(!board.pending().is_empty(), "targets survive a failed ramp");
}

#[test]
fn latched_reads_issue_no_requests() {
    let seg = SimulatedSegment::new("sim0").with_board(0x9f, mac(0x9f));
    let mut board = select(&seg, 0x9f);
    board.latch_status().unwrap();
    let sent = seg.total_sent();

    for _ in 0..10 {
        board.reading(Reading::Tchip).unwrap();
    }
    assert_eq!(seg.total_sent(), sent);

    board.passthru_status();
    board.reading(Reading::Tchip).unwrap();
    assert_eq!(seg.total_sent(), sent + 1);
    assert_eq!(seg.sent_count(MessageType::Query), sent + 1);
}

#[test]
fn probe_reports_three_boards() {
    let mut seg = SimulatedSegment::new("sim0")
        .with_board(0x01, mac(0x01))
        .with_board(0x9f, mac(0x9f))
        .with_board(0xc4, mac(0xc4));
    let config = ProbeConfig {
        window: Duration::from_millis(25),
        ..ProbeConfig::default()
    };
    let boards = probe(&mut seg, &config).expect("probe should succeed");
    assert_eq!(
        boards.into_iter().collect::<Vec<_>>(),
        vec![(0x01, mac(0x01)), (0x9f, mac(0x9f)), (0xc4, mac(0xc4))]
    );
}

#[test]
fn boards_share_a_segment_independently() {
    let seg = SimulatedSegment::new("sim0")
        .with_board(0x10, mac(0x10))
        .with_board(0x11, mac(0x11));
    let mut a = select(&seg, 0x10);
    let mut b = BoardSession::select(seg.clone(), BoardAddress::Mac(mac(0x11)), config()).unwrap();
    assert_eq!(b.geoaddr(), 0x11);

    a.set_voltage(0, 2.0).unwrap();
    b.set_voltage(0, 4.0).unwrap();
    a.ramp().unwrap();
    b.ramp().unwrap();

    let code_a = seg.board(0x10).unwrap().codes.code(0);
    let code_b = seg.board(0x11).unwrap().codes.code(0);
    assert_eq!(code_a, a.calibration().volts_to_code(2.0).unwrap());
    assert_eq!(code_b, b.calibration().volts_to_code(4.0).unwrap());
}
