use vbiasctl_frame::FrameError;
use vbiasctl_transport::TransportError;

/// Errors that can occur in board operations.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    /// The packet link failed. Not retried.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A frame could not be built or a response payload was unusable.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// No valid response arrived within the configured attempts.
    #[error("no response from Vbias board to {operation} after {attempts} attempt(s)")]
    NoResponse {
        operation: &'static str,
        attempts: u32,
    },

    /// The board that answered reports a different backplane address.
    #[error(
        "query was addressed to geoaddr {requested:#04x}, \
         but the response comes from geoaddr {reported:#04x}"
    )]
    AddressMismatch { requested: u8, reported: u8 },

    /// A written channel code did not read back as sent.
    #[error("channel {channel} read back code {echoed:#06x} after writing {sent:#06x}")]
    Mismatch { channel: usize, sent: u16, echoed: u16 },

    /// The reset sequence did not complete.
    #[error("reset failed for board at geoaddr {geoaddr:#04x}: {source}")]
    ResetFailed {
        geoaddr: u8,
        #[source]
        source: Box<BoardError>,
    },

    /// The board failed an integrity check and has not been reset since.
    #[error("board at geoaddr {geoaddr:#04x} is faulted; reset it before writing")]
    Faulted { geoaddr: u8 },

    /// The ramp did not converge within its iteration cap.
    #[error("ramp did not converge within {iterations} steps")]
    RampIncomplete { iterations: u32 },

    /// Channel index outside 0..32.
    #[error("invalid channel {0}")]
    InvalidChannel(usize),

    /// The voltage cannot be represented as a DAC code.
    #[error("voltage {volts} V out of range for channel {channel}")]
    VoltageOutOfRange { channel: usize, volts: f64 },

    /// An error line returned by a relay daemon.
    #[error("{0}")]
    Remote(String),
}

impl BoardError {
    /// Whether the failure is in the link itself rather than in the board.
    pub fn is_transport(&self) -> bool {
        matches!(self, BoardError::Transport(_))
            || matches!(
                self,
                BoardError::Frame(FrameError::Transport(_) | FrameError::Io(_))
            )
    }
}

pub type Result<T> = std::result::Result<T, BoardError>;
