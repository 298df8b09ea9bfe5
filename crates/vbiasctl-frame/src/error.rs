use crate::kind::MessageType;

/// Errors that can occur during frame encoding/decoding and text framing.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The buffer is shorter than the fixed header plus address and type bytes.
    #[error("frame truncated ({len} bytes)")]
    Truncated { len: usize },

    /// The length field disagrees with the bytes actually present.
    #[error("frame length field says {declared} bytes but {actual} follow the header")]
    LengthMismatch { declared: usize, actual: usize },

    /// The message type byte is not one the boards speak.
    #[error("unknown message type 0x{0:02x}")]
    UnknownType(u8),

    /// A valid frame arrived, but not of the type the caller asked for.
    #[error("expected {expected} frame, got {got}")]
    UnexpectedType {
        expected: MessageType,
        got: MessageType,
    },

    /// The payload does not fit in a frame.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The payload is too short for the typed view requested.
    #[error("{kind} payload too short ({size} bytes, need {need})")]
    PayloadTooShort {
        kind: MessageType,
        size: usize,
        need: usize,
    },

    /// A text message exceeded the configured maximum size.
    #[error("text message too large (more than {max} bytes)")]
    MessageTooLarge { max: usize },

    /// The stream ended in the middle of a text message.
    #[error("stream closed before message terminator ({pending} bytes pending)")]
    Unterminated { pending: usize },

    /// The connection was closed between messages.
    #[error("connection closed")]
    ConnectionClosed,

    /// The packet link underneath failed.
    #[error(transparent)]
    Transport(#[from] vbiasctl_transport::TransportError),

    /// An I/O error occurred while reading or writing text messages.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
