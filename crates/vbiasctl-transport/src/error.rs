/// Errors that can occur on a packet link or relay stream.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The interface name cannot be used for a link-layer lookup.
    #[error("invalid interface name {name:?} ({len} bytes, max {max})")]
    InvalidInterface { name: String, len: usize, max: usize },

    /// Failed to open or configure the raw link on an interface.
    #[error("unable to open ethernet interface {interface}: {source}")]
    Open {
        interface: String,
        source: std::io::Error,
    },

    /// The interface exists but does not carry Ethernet frames.
    #[error("{interface} is not an ethernet interface")]
    NotEthernet { interface: String },

    /// Failed to bind the relay listener.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to a relay daemon.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming relay connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// Transmitting a frame failed.
    #[error("frame transmit failed on {interface}: {source}")]
    Send {
        interface: String,
        source: std::io::Error,
    },

    /// Receiving a frame failed for a reason other than a timeout.
    #[error("failure receiving from {interface}: {source}")]
    Receive {
        interface: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
