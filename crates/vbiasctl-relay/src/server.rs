use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tracing::{debug, info, warn};
use vbiasctl_frame::{FrameError, TextConfig, TextReader, TextWriter};
use vbiasctl_transport::{RelayListener, RelayStream};

use crate::config::RelayConfig;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::registry::{AdapterPool, LinkOpener};
use crate::response;

/// The relay daemon: accepts one client at a time and answers its
/// requests against the boards on the daemon's interfaces.
pub struct RelayServer<O: LinkOpener> {
    listener: RelayListener,
    pool: AdapterPool<O>,
    config: RelayConfig,
}

impl<O: LinkOpener> RelayServer<O> {
    /// Listen on all addresses at the configured port.
    pub fn bind(opener: O, config: RelayConfig) -> Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        Self::bind_to(addr, opener, config)
    }

    /// Listen on an explicit address; port 0 picks a free one.
    pub fn bind_to(addr: SocketAddr, opener: O, config: RelayConfig) -> Result<Self> {
        let listener = RelayListener::bind(addr)?;
        Ok(Self {
            listener,
            pool: AdapterPool::new(opener),
            config,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Accept one client and serve it until it disconnects.
    pub fn serve_one(&mut self) -> Result<usize> {
        let stream = self.listener.accept()?;
        self.serve_connection(stream)
    }

    /// Serve clients one after another until `shutdown` is set.
    ///
    /// A failed connection is logged and the daemon keeps accepting.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        self.listener.set_nonblocking(true)?;
        info!(addr = %self.local_addr(), "relay daemon running");
        while !shutdown.load(Ordering::SeqCst) {
            let Some(stream) = self.listener.try_accept()? else {
                thread::sleep(self.config.poll_interval);
                continue;
            };
            if let Err(err) = self.serve_connection(stream) {
                warn!(error = %err, "relay connection ended with error");
            }
        }
        info!("relay daemon stopped");
        Ok(())
    }

    /// Answer requests on `stream` until the client hangs up.
    ///
    /// Returns the number of requests answered.
    pub fn serve_connection(&mut self, stream: RelayStream) -> Result<usize> {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        info!(%peer, "relay client connected");

        let mut reader = TextReader::new(stream.try_clone()?, TextConfig::requests());
        let mut writer = TextWriter::responses(stream);
        let mut dispatcher = Dispatcher::new(&mut self.pool, &self.config);
        let mut answered = 0usize;

        loop {
            let line = match reader.read_message() {
                Ok(line) => line,
                Err(FrameError::ConnectionClosed) => break,
                Err(err @ FrameError::MessageTooLarge { .. }) => {
                    // The rest of the oversized line cannot be resynchronised.
                    writer.send(&response::error(&err))?;
                    return Err(err.into());
                }
                Err(err) => return Err(err.into()),
            };
            let line = line.trim_end_matches('\r');
            debug!(%peer, request = line, "relay request");
            let reply = dispatcher.handle(line);
            writer.send(&reply)?;
            answered += 1;
        }

        info!(%peer, answered, sessions = dispatcher.sessions(), "relay client disconnected");
        Ok(answered)
    }
}

impl<O: LinkOpener> std::fmt::Debug for RelayServer<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayServer")
            .field("local_addr", &self.local_addr())
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use vbiasctl_frame::sim::SimulatedSegment;
    use vbiasctl_transport::{MacAddr, TransportError};

    use super::*;

    fn server(seg: &SimulatedSegment) -> RelayServer<impl LinkOpener<Link = SimulatedSegment>> {
        let seg = seg.clone();
        let mut config = RelayConfig::default();
        config.session.response_timeout = Duration::from_millis(10);
        config.poll_interval = Duration::from_millis(5);
        RelayServer::bind_to(
            SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            move |_: &str| Ok::<_, TransportError>(seg.clone()),
            config,
        )
        .expect("server should bind")
    }

    fn read_response(stream: &mut RelayStream) -> String {
        let mut out = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            stream.read_exact(&mut byte).expect("response should arrive");
            if byte[0] == 0 {
                return String::from_utf8(out).expect("response should be text");
            }
            out.push(byte[0]);
        }
    }

    #[test]
    fn answers_raw_protocol() {
        let seg = SimulatedSegment::new("eth0").with_board(0x9f, MacAddr::new([0, 1, 2, 3, 4, 0x9f]));
        let mut server = server(&seg);
        let addr = server.local_addr();

        let client = thread::spawn(move || {
            let mut stream = RelayListener::connect(addr).expect("client should connect");
            stream.write_all(b"select 0x9f\nget_Geoaddr\n").unwrap();
            let first = read_response(&mut stream);
            let second = read_response(&mut stream);
            stream.write_all(b"bogus\r\n").unwrap();
            let third = read_response(&mut stream);
            (first, second, third)
        });

        let answered = server.serve_one().expect("connection should be served");
        let (first, second, third) = client.join().unwrap();
        assert_eq!(first, "ok\n");
        assert_eq!(second, "0x9f\n");
        assert_eq!(third, "error - unrecognized request\n");
        assert_eq!(answered, 3);
    }

    #[test]
    fn oversized_request_is_rejected() {
        let seg = SimulatedSegment::new("eth0");
        let mut server = server(&seg);
        let addr = server.local_addr();

        let client = thread::spawn(move || {
            let mut stream = RelayListener::connect(addr).expect("client should connect");
            stream.write_all(&[b'x'; 1000]).unwrap();
            read_response(&mut stream)
        });

        assert!(server.serve_one().is_err());
        assert!(client.join().unwrap().starts_with("error - "));
    }

    #[test]
    fn run_stops_on_shutdown() {
        let seg = SimulatedSegment::new("eth0");
        let mut server = server(&seg);
        let shutdown = AtomicBool::new(true);
        server.run(&shutdown).expect("run should return once shut down");
    }

    #[test]
    fn sessions_do_not_outlive_connection() {
        let seg = SimulatedSegment::new("eth0").with_board(0x9f, MacAddr::new([0, 1, 2, 3, 4, 0x9f]));
        let mut server = server(&seg);
        let addr = server.local_addr();

        let client = thread::spawn(move || {
            let mut first = RelayListener::connect(addr).unwrap();
            first.write_all(b"select 0x9f\n").unwrap();
            assert_eq!(read_response(&mut first), "ok\n");
            drop(first);

            let mut second = RelayListener::connect(addr).unwrap();
            second.write_all(b"get_Tchip\n").unwrap();
            read_response(&mut second)
        });

        server.serve_one().unwrap();
        server.serve_one().unwrap();
        assert_eq!(client.join().unwrap(), "error - no board selected\n");
    }
}
