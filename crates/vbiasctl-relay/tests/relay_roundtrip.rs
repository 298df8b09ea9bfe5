use std::net::{Ipv4Addr, SocketAddr};
use std::thread;
use std::time::Duration;

use vbiasctl_board::{BoardAccess, BoardAddress, BoardError, BoardSession, Reading, SessionConfig};
use vbiasctl_frame::sim::SimulatedSegment;
use vbiasctl_frame::MessageType;
use vbiasctl_relay::{RelayBoard, RelayClient, RelayConfig, RelayError, RelayServer, Request};
use vbiasctl_transport::{MacAddr, TransportError};

fn mac(last: u8) -> MacAddr {
    MacAddr::new([0x00, 0x1a, 0x2b, 0x3c, 0x4d, last])
}

fn session_config() -> SessionConfig {
    SessionConfig {
        response_timeout: Duration::from_millis(20),
        ..SessionConfig::default()
    }
}

/// Start a daemon on loopback that serves `connections` clients and exits.
fn spawn_daemon(seg: &SimulatedSegment, connections: usize) -> (SocketAddr, thread::JoinHandle<()>) {
    let seg = seg.clone();
    let config = RelayConfig {
        session: session_config(),
        ..RelayConfig::default()
    };
    let mut server = RelayServer::bind_to(
        SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        move |_: &str| Ok::<_, TransportError>(seg.clone()),
        config,
    )
    .expect("daemon should bind to loopback");
    let addr = server.local_addr();
    let handle = thread::spawn(move || {
        for _ in 0..connections {
            server.serve_one().expect("connection should be served");
        }
    });
    (addr, handle)
}

#[test]
fn relayed_reading_matches_direct_reading() {
    let seg = SimulatedSegment::new("eth0").with_board(0x9f, mac(0x9f));
    let mut direct = BoardSession::select(seg.clone(), BoardAddress::Geo(0x9f), session_config())
        .expect("board should answer directly");
    let expected = direct.reading(Reading::Tchip).unwrap();

    let (addr, daemon) = spawn_daemon(&seg, 1);
    let mut client = RelayClient::connect(&addr.to_string()).expect("client should connect");
    let select: Request = "select 0x9f eth0".parse().unwrap();
    assert_eq!(client.request(&select).unwrap(), vec!["ok".to_string()]);
    let lines = client.request(&Request::Reading(Reading::Tchip)).unwrap();
    assert_eq!(lines, vec![format!("{expected}")]);

    drop(client);
    daemon.join().unwrap();
}

#[test]
fn remote_board_ramps_like_local_one() {
    let seg = SimulatedSegment::new("eth0")
        .with_board(0x9f, mac(0x9f))
        .with_board(0xa0, mac(0xa0));
    let (addr, daemon) = spawn_daemon(&seg, 1);

    let client = RelayClient::connect(&addr.to_string()).unwrap().into_shared();
    let mut first = RelayBoard::select(client.clone(), BoardAddress::Geo(0x9f), "eth0")
        .expect("first board should be selectable");
    let mut second = RelayBoard::select(client.clone(), BoardAddress::Mac(mac(0xa0)), "eth0")
        .expect("second board should be selectable");
    assert_eq!(first.geoaddr(), 0x9f);
    assert_eq!(second.geoaddr(), 0xa0);
    assert_eq!(second.mac_addr(), mac(0xa0));

    first.set_voltage(4, 2.0).unwrap();
    let pending = first.pending_voltage(4).unwrap();
    assert!((pending - 2.0).abs() < 0.01);
    first.ramp().expect("ramp should complete through the daemon");
    assert_eq!(first.voltage(4).unwrap(), pending);
    assert_eq!(second.voltage(4).unwrap(), 0.0);

    let packet = first.last_packet().unwrap().expect("daemon should keep a packet");
    assert_eq!(&packet[6..12], &mac(0x9f).octets()[..]);
    assert_eq!(packet[15], b'D');

    let code = seg.board(0x9f).unwrap().codes.code(4);
    assert!(code > 0);

    drop((first, second, client));
    daemon.join().unwrap();
}

#[test]
fn probe_and_host_address_through_daemon() {
    let seg = SimulatedSegment::new("eth0")
        .with_board(0x9f, mac(0x9f))
        .with_board(0x10, mac(0x10));
    let (addr, daemon) = spawn_daemon(&seg, 1);

    let mut client = RelayClient::connect(&addr.to_string()).unwrap();
    let boards = client.probe(Some("eth0")).unwrap();
    assert_eq!(boards.len(), 2);
    assert_eq!(boards[&0x10], mac(0x10));
    assert_eq!(boards[&0x9f], mac(0x9f));
    assert_eq!(client.host_mac_address(None).unwrap(), seg_local_mac(&seg));
    assert_eq!(seg.sent_count(MessageType::Query), 1);

    drop(client);
    daemon.join().unwrap();
}

#[test]
fn daemon_errors_reach_the_caller() {
    let seg = SimulatedSegment::new("eth0").with_board(0x9f, mac(0x9f));
    let (addr, daemon) = spawn_daemon(&seg, 1);

    let mut client = RelayClient::connect(&addr.to_string()).unwrap();
    let err = client.request(&Request::Reading(Reading::Tchip)).unwrap_err();
    assert!(matches!(err, RelayError::Remote(ref msg) if msg == "no board selected"));

    let shared = client.into_shared();
    let missing = RelayBoard::select(shared.clone(), BoardAddress::Geo(0x33), "eth0");
    assert!(matches!(missing, Err(RelayError::Remote(_))));

    let mut board = RelayBoard::select(shared.clone(), BoardAddress::Geo(0x9f), "eth0").unwrap();
    let err = board.set_voltage(0, 500.0).unwrap_err();
    assert!(matches!(err, BoardError::Remote(_)));

    drop((board, shared));
    daemon.join().unwrap();
}

fn seg_local_mac(seg: &SimulatedSegment) -> MacAddr {
    use vbiasctl_transport::PacketLink;
    seg.local_mac()
}
