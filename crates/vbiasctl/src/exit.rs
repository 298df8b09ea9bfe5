use std::fmt;

use vbiasctl_board::BoardError;
use vbiasctl_relay::RelayError;

// Exit codes shared by every subcommand.
pub const SUCCESS: i32 = 0;
pub const USAGE: i32 = 1;
pub const BAD_SEQUENCE: i32 = 2;
pub const INPUT_UNREADABLE: i32 = 3;
pub const OPERATION_FAILED: i32 = 4;
pub const CONNECTION_FAILED: i32 = 5;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Board could not be reached at all, or failed while being operated.
pub fn board_error(context: &str, err: BoardError) -> CliError {
    let code = match err {
        BoardError::Transport(_)
        | BoardError::Frame(_)
        | BoardError::NoResponse { .. }
        | BoardError::AddressMismatch { .. } => CONNECTION_FAILED,
        _ => OPERATION_FAILED,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn relay_error(context: &str, err: RelayError) -> CliError {
    match err {
        RelayError::Board(err) => board_error(context, err),
        RelayError::Transport(_) | RelayError::Frame(_) => {
            CliError::new(CONNECTION_FAILED, format!("{context}: {err}"))
        }
        RelayError::InvalidDestination(_) | RelayError::Request(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(OPERATION_FAILED, format!("{context}: {other}")),
    }
}

/// Selecting a board is part of connecting to it.
pub fn select_error(context: &str, err: impl fmt::Display) -> CliError {
    CliError::new(CONNECTION_FAILED, format!("{context}: {err}"))
}

#[cfg(test)]
mod tests {
    use vbiasctl_transport::TransportError;

    use super::*;

    #[test]
    fn unreachable_boards_are_connection_failures() {
        let err = board_error(
            "select failed",
            BoardError::NoResponse {
                operation: "status query",
                attempts: 2,
            },
        );
        assert_eq!(err.code, CONNECTION_FAILED);
        assert!(err.message.starts_with("select failed: no response"));
    }

    #[test]
    fn operation_failures_map_to_four() {
        let err = board_error("ramp failed", BoardError::RampIncomplete { iterations: 9999 });
        assert_eq!(err.code, OPERATION_FAILED);
    }

    #[test]
    fn relay_errors_are_classified() {
        let err = relay_error(
            "connect failed",
            RelayError::Transport(TransportError::Io(std::io::Error::other("refused"))),
        );
        assert_eq!(err.code, CONNECTION_FAILED);

        let err = relay_error("bad dest", RelayError::InvalidDestination("a:b".into()));
        assert_eq!(err.code, USAGE);

        let err = relay_error("ramp failed", RelayError::Remote("ramp stalled".into()));
        assert_eq!(err.code, OPERATION_FAILED);
    }
}
