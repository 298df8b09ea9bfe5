use tracing::{debug, warn};
use vbiasctl_board::{probe, BoardSession};
use vbiasctl_transport::{PacketLink, SharedLink};

use crate::command::Request;
use crate::config::RelayConfig;
use crate::error::{RelayError, RequestError, Result};
use crate::registry::{AdapterPool, LinkOpener, SessionKey, SessionRegistry};
use crate::response;

/// Answers the requests of one client connection.
///
/// Board sessions live as long as the connection; interface handles belong
/// to the daemon and outlive it.
pub struct Dispatcher<'a, O: LinkOpener> {
    pool: &'a mut AdapterPool<O>,
    config: &'a RelayConfig,
    registry: SessionRegistry<O::Link>,
}

impl<'a, O: LinkOpener> Dispatcher<'a, O> {
    pub fn new(pool: &'a mut AdapterPool<O>, config: &'a RelayConfig) -> Self {
        Self {
            pool,
            config,
            registry: SessionRegistry::new(),
        }
    }

    /// Answer one request line.
    ///
    /// Failures become error lines; this never ends the connection.
    pub fn handle(&mut self, line: &str) -> String {
        let request = match line.parse::<Request>() {
            Ok(request) => request,
            Err(err) => {
                debug!(request = line, error = %err, "rejected request");
                return response::error(err);
            }
        };
        match self.execute(&request) {
            Ok(body) => body,
            Err(err) => {
                warn!(request = %request, error = %err, "request failed");
                response::error(err)
            }
        }
    }

    fn execute(&mut self, request: &Request) -> Result<String> {
        match request {
            Request::Probe { interface } => {
                let interface = self.config.interface_or_default(interface.as_deref());
                let mut link = self.pool.link(interface)?;
                let boards = probe(&mut link, &self.config.probe)?;
                Ok(response::lines(
                    boards.iter().map(|(geo, mac)| format!("{geo:x} {mac}")),
                ))
            }
            Request::HostMacAddr { interface } => {
                let interface = self.config.interface_or_default(interface.as_deref());
                let link = self.pool.link(interface)?;
                Ok(response::lines([link.local_mac()]))
            }
            Request::Select { address, interface } => {
                let interface = self.config.interface_or_default(interface.as_deref());
                let key = SessionKey {
                    address: *address,
                    interface: interface.to_string(),
                };
                let pool = &mut *self.pool;
                self.registry
                    .select(key, || pool.link(interface), &self.config.session)?;
                Ok(response::OK.to_string())
            }
            other => {
                let board = self.registry.current().ok_or(RelayError::NotSelected)?;
                board_request(board, other)
            }
        }
    }

    /// Sessions opened by this connection so far.
    pub fn sessions(&self) -> usize {
        self.registry.len()
    }
}

fn board_request<L: PacketLink>(
    board: &mut BoardSession<SharedLink<L>>,
    request: &Request,
) -> Result<String> {
    let body = match *request {
        Request::MacAddr => response::lines([board.mac_addr().to_dotted()]),
        Request::Geoaddr => response::lines([format!("{:#04x}", board.geoaddr())]),
        Request::Reading(reading) => response::number(board.reading(reading)?),
        Request::LatchStatus => {
            board.passthru_status();
            board.latch_status()?;
            response::OK.to_string()
        }
        Request::PassthruStatus => {
            board.passthru_status();
            response::OK.to_string()
        }
        Request::LatchVoltages => {
            board.passthru_voltages();
            board.latch_voltages()?;
            response::OK.to_string()
        }
        Request::PassthruVoltages => {
            board.passthru_voltages();
            response::OK.to_string()
        }
        Request::GetV(channel) => response::number(board.voltage(channel)?),
        Request::GetVnew(channel) => response::number(board.pending_voltage(channel)?),
        Request::SetV(channel, volts) => {
            board.set_voltage(channel, volts)?;
            response::OK.to_string()
        }
        Request::LastPacket => {
            let frame = board.last_packet().ok_or(RelayError::NoPacket)?;
            let bytes = frame.to_bytes()?;
            response::hex_bytes(&bytes)
        }
        Request::Ramp => {
            board.ramp()?;
            response::OK.to_string()
        }
        Request::Reset => {
            board.reset()?;
            response::OK.to_string()
        }
        Request::Probe { .. } | Request::Select { .. } | Request::HostMacAddr { .. } => {
            return Err(RequestError::Unrecognized(request.verb().to_string()).into())
        }
    };
    Ok(body)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use vbiasctl_board::{ProbeConfig, SessionConfig};
    use vbiasctl_frame::sim::SimulatedSegment;
    use vbiasctl_frame::MessageType;
    use vbiasctl_transport::{MacAddr, TransportError};

    use super::*;

    fn mac(last: u8) -> MacAddr {
        MacAddr::new([0, 0x1a, 0x2b, 0x3c, 0x4d, last])
    }

    fn config() -> RelayConfig {
        RelayConfig {
            session: SessionConfig {
                response_timeout: Duration::from_millis(10),
                ..SessionConfig::default()
            },
            probe: ProbeConfig {
                window: Duration::from_millis(10),
                ..ProbeConfig::default()
            },
            ..RelayConfig::default()
        }
    }

    fn opener(
        seg: &SimulatedSegment,
    ) -> impl FnMut(&str) -> vbiasctl_transport::Result<SimulatedSegment> {
        let seg = seg.clone();
        move |interface: &str| {
            if interface == "eth0" {
                Ok(seg.clone())
            } else {
                Err(TransportError::NotEthernet {
                    interface: interface.to_string(),
                })
            }
        }
    }

    fn segment() -> SimulatedSegment {
        SimulatedSegment::new("eth0")
            .with_board(0x9f, mac(0x9f))
            .with_board(0xa0, mac(0xa0))
    }

    #[test]
    fn board_requests_need_selection() {
        let seg = segment();
        let mut pool = AdapterPool::new(opener(&seg));
        let config = config();
        let mut dispatcher = Dispatcher::new(&mut pool, &config);
        assert_eq!(dispatcher.handle("get_Tchip"), "error - no board selected\n");
        assert_eq!(dispatcher.handle("reset"), "error - no board selected\n");
        assert_eq!(seg.total_sent(), 0);
    }

    #[test]
    fn probe_lists_boards() {
        let seg = segment();
        let mut pool = AdapterPool::new(opener(&seg));
        let config = config();
        let mut dispatcher = Dispatcher::new(&mut pool, &config);
        assert_eq!(
            dispatcher.handle("probe"),
            "9f 00:1a:2b:3c:4d:9f\na0 00:1a:2b:3c:4d:a0\n"
        );
        assert!(dispatcher.handle("probe eth7").starts_with("error - "));
    }

    #[test]
    fn select_then_query() {
        let seg = segment();
        let mut pool = AdapterPool::new(opener(&seg));
        let config = config();
        let mut dispatcher = Dispatcher::new(&mut pool, &config);

        assert_eq!(dispatcher.handle("select 0x9f eth0"), "ok\n");
        assert_eq!(dispatcher.handle("get_Geoaddr"), "0x9f\n");
        assert_eq!(dispatcher.handle("get_MACaddr"), "00.1a.2b.3c.4d.9f\n");
        assert_eq!(dispatcher.handle("get_Tchip"), "25\n");
        assert_eq!(dispatcher.handle("get_gainmode"), "0\n");
        assert_eq!(dispatcher.handle("get_hostMACaddr"), "02:00:00:00:00:01\n");
    }

    #[test]
    fn select_by_hardware_address() {
        let seg = segment();
        let mut pool = AdapterPool::new(opener(&seg));
        let config = config();
        let mut dispatcher = Dispatcher::new(&mut pool, &config);
        assert_eq!(dispatcher.handle("select 00.1a.2b.3c.4d.a0"), "ok\n");
        assert_eq!(dispatcher.handle("get_Geoaddr"), "0xa0\n");
    }

    #[test]
    fn failed_select_leaves_nothing_selected() {
        let seg = segment();
        let mut pool = AdapterPool::new(opener(&seg));
        let config = config();
        let mut dispatcher = Dispatcher::new(&mut pool, &config);
        assert_eq!(dispatcher.handle("select 0x9f"), "ok\n");
        assert!(dispatcher.handle("select 0x10").starts_with("error - no response"));
        assert_eq!(dispatcher.handle("get_Geoaddr"), "error - no board selected\n");
    }

    #[test]
    fn set_and_ramp() {
        let seg = segment();
        let mut pool = AdapterPool::new(opener(&seg));
        let config = config();
        let mut dispatcher = Dispatcher::new(&mut pool, &config);
        dispatcher.handle("select 0x9f");

        assert_eq!(dispatcher.handle("setV 2 1.5"), "ok\n");
        let pending: f64 = dispatcher.handle("getVnew 2").trim().parse().unwrap();
        assert!((pending - 1.5).abs() < 0.01);
        assert_eq!(dispatcher.handle("ramp"), "ok\n");
        let applied: f64 = dispatcher.handle("getV 2").trim().parse().unwrap();
        assert_eq!(applied, pending);
        assert!(dispatcher.handle("setV 2 -3").starts_with("error - "));
        assert!(dispatcher.handle("getV 32").starts_with("error - "));
    }

    #[test]
    fn latch_and_last_packet() {
        let seg = segment();
        let mut pool = AdapterPool::new(opener(&seg));
        let config = config();
        let mut dispatcher = Dispatcher::new(&mut pool, &config);
        dispatcher.handle("select 0x9f");

        assert_eq!(dispatcher.handle("latch_status"), "ok\n");
        let queries = seg.sent_count(MessageType::Query);
        dispatcher.handle("get_Tchip");
        dispatcher.handle("get_TDAC");
        assert_eq!(seg.sent_count(MessageType::Query), queries);
        assert_eq!(dispatcher.handle("passthru_status"), "ok\n");

        let dump = dispatcher.handle("get_last_packet");
        let bytes = response::parse_hex_bytes(dump.trim()).expect("dump should be hex");
        assert_eq!(&bytes[6..12], &mac(0x9f).octets()[..]);
        assert_eq!(bytes[15], b'S');
    }

    #[test]
    fn reset_through_relay() {
        let seg = segment();
        seg.with_board_mut(0x9f, |b| b.codes.0[0] = 500);
        let mut pool = AdapterPool::new(opener(&seg));
        let config = config();
        let mut dispatcher = Dispatcher::new(&mut pool, &config);
        dispatcher.handle("select 0x9f");
        assert_eq!(dispatcher.handle("reset"), "ok\n");
        assert_eq!(seg.board(0x9f).unwrap().codes.code(0), 0);
    }

    #[test]
    fn unknown_verbs_get_placeholder() {
        let seg = segment();
        let mut pool = AdapterPool::new(opener(&seg));
        let config = config();
        let mut dispatcher = Dispatcher::new(&mut pool, &config);
        assert_eq!(dispatcher.handle("hello"), "error - unrecognized request\n");
        assert_eq!(dispatcher.handle(""), "error - empty request\n");
    }
}
