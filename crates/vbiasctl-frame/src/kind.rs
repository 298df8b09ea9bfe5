use std::fmt;

use crate::error::FrameError;

/// Board message types, carried as a single ASCII byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageType {
    /// Host asks for a status report.
    Query,
    /// Board reports its 17 status words.
    Status,
    /// Host writes masked channel codes.
    Program,
    /// Board echoes its 32 channel codes.
    Data,
    /// Host requests a hard reset.
    Reset,
}

impl MessageType {
    pub const ALL: [MessageType; 5] = [
        MessageType::Query,
        MessageType::Status,
        MessageType::Program,
        MessageType::Data,
        MessageType::Reset,
    ];

    pub const fn as_byte(self) -> u8 {
        match self {
            MessageType::Query => b'Q',
            MessageType::Status => b'S',
            MessageType::Program => b'P',
            MessageType::Data => b'D',
            MessageType::Reset => b'R',
        }
    }

    /// Whether the host sends this type (as opposed to a board).
    pub const fn is_request(self) -> bool {
        matches!(
            self,
            MessageType::Query | MessageType::Program | MessageType::Reset
        )
    }

    /// The type a board answers this request with.
    pub const fn response(self) -> Option<MessageType> {
        match self {
            MessageType::Query | MessageType::Reset => Some(MessageType::Status),
            MessageType::Program => Some(MessageType::Data),
            MessageType::Status | MessageType::Data => None,
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = FrameError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'Q' => Ok(MessageType::Query),
            b'S' => Ok(MessageType::Status),
            b'P' => Ok(MessageType::Program),
            b'D' => Ok(MessageType::Data),
            b'R' => Ok(MessageType::Reset),
            other => Err(FrameError::UnknownType(other)),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_byte() as char)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_round_trip() {
        for kind in MessageType::ALL {
            assert_eq!(MessageType::try_from(kind.as_byte()).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_byte_rejected() {
        assert!(matches!(
            MessageType::try_from(b'X'),
            Err(FrameError::UnknownType(b'X'))
        ));
    }

    #[test]
    fn request_response_pairs() {
        assert_eq!(MessageType::Query.response(), Some(MessageType::Status));
        assert_eq!(MessageType::Reset.response(), Some(MessageType::Status));
        assert_eq!(MessageType::Program.response(), Some(MessageType::Data));
        assert_eq!(MessageType::Data.response(), None);
        assert!(!MessageType::Status.is_request());
    }
}
