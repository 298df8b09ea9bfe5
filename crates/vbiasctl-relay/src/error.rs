use vbiasctl_board::{AddressParseError, BoardError};
use vbiasctl_frame::FrameError;
use vbiasctl_transport::TransportError;

/// Errors that can occur on either end of the relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Socket-level failure. Ends the connection.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Message framing failed or the peer hung up.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// A board operation failed on the daemon side.
    #[error(transparent)]
    Board(#[from] BoardError),

    /// The request line could not be parsed.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// A board request arrived before any successful `select`.
    #[error("no board selected")]
    NotSelected,

    #[error("no packet received from the board yet")]
    NoPacket,

    /// The daemon answered with an error line.
    #[error("relay daemon reported: {0}")]
    Remote(String),

    /// The daemon answered with something the client cannot interpret.
    #[error("unexpected response to {request:?}: {response:?}")]
    UnexpectedResponse { request: String, response: String },

    #[error("invalid destination {0:?}: expected [host[:port]::]interface")]
    InvalidDestination(String),
}

/// Why a request line was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestError {
    #[error("empty request")]
    Empty,

    #[error("unrecognized request")]
    Unrecognized(String),

    #[error("{verb} requires {argument}")]
    MissingArgument {
        verb: &'static str,
        argument: &'static str,
    },

    #[error("{verb} got invalid {argument} {value:?}")]
    InvalidArgument {
        verb: &'static str,
        argument: &'static str,
        value: String,
    },

    #[error("too many arguments to {0}")]
    TooManyArguments(&'static str),

    #[error(transparent)]
    Address(#[from] AddressParseError),
}

impl From<RelayError> for BoardError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Transport(e) => BoardError::Transport(e),
            RelayError::Frame(e) => BoardError::Frame(e),
            RelayError::Board(e) => e,
            RelayError::Remote(message) => BoardError::Remote(message),
            other => BoardError::Remote(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
