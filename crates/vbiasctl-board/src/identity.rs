use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use vbiasctl_frame::BROADCAST_GEOADDR;
use vbiasctl_transport::MacAddr;

/// How a caller names a board: by backplane slot or by hardware address.
///
/// Whichever is given, the other is learned from the board's first answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BoardAddress {
    /// Geographic (backplane) address; `0xff` addresses every board.
    Geo(u8),
    /// Hardware address of the board's network interface.
    Mac(MacAddr),
}

impl BoardAddress {
    /// The broadcast address, answered by every board.
    pub const ALL: BoardAddress = BoardAddress::Geo(BROADCAST_GEOADDR);

    pub fn is_broadcast(&self) -> bool {
        match self {
            BoardAddress::Geo(geo) => *geo == BROADCAST_GEOADDR,
            BoardAddress::Mac(mac) => mac.is_broadcast(),
        }
    }
}

/// Relay wire form: `0x9f` or `00.1a.2b.3c.4d.5e`.
impl fmt::Display for BoardAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoardAddress::Geo(geo) => write!(f, "{geo:#04x}"),
            BoardAddress::Mac(mac) => f.write_str(&mac.to_dotted()),
        }
    }
}

impl Serialize for BoardAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Error returned when a board address string is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid board address {0:?}")]
pub struct AddressParseError(pub String);

impl FromStr for BoardAddress {
    type Err = AddressParseError;

    /// Accepts a hex geoaddr with or without `0x`, or a hardware address
    /// with `.`, `:` or `-` separators.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.contains(['.', ':', '-']) {
            return s
                .parse::<MacAddr>()
                .map(BoardAddress::Mac)
                .map_err(|_| AddressParseError(s.to_string()));
        }
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.is_empty() || digits.len() > 2 {
            return Err(AddressParseError(s.to_string()));
        }
        u8::from_str_radix(digits, 16)
            .map(BoardAddress::Geo)
            .map_err(|_| AddressParseError(s.to_string()))
    }
}

/// A board whose geographic and hardware addresses are both known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BoardIdentity {
    pub geoaddr: u8,
    #[serde(serialize_with = "serialize_mac")]
    pub mac: MacAddr,
}

fn serialize_mac<S: Serializer>(mac: &MacAddr, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_geoaddr_forms() {
        assert_eq!("0x9f".parse::<BoardAddress>().unwrap(), BoardAddress::Geo(0x9f));
        assert_eq!("9F".parse::<BoardAddress>().unwrap(), BoardAddress::Geo(0x9f));
        assert_eq!("0xff".parse::<BoardAddress>().unwrap(), BoardAddress::ALL);
        assert!("0x100".parse::<BoardAddress>().is_err());
        assert!("".parse::<BoardAddress>().is_err());
        assert!("0xzz".parse::<BoardAddress>().is_err());
    }

    #[test]
    fn parses_hardware_address() {
        let expected = BoardAddress::Mac(MacAddr::new([0, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e]));
        assert_eq!("00.1a.2b.3c.4d.5e".parse::<BoardAddress>().unwrap(), expected);
        assert_eq!("00:1a:2b:3c:4d:5e".parse::<BoardAddress>().unwrap(), expected);
        assert!("00.1a.2b".parse::<BoardAddress>().is_err());
    }

    #[test]
    fn displays_wire_form() {
        assert_eq!(BoardAddress::Geo(0x0a).to_string(), "0x0a");
        let mac = BoardAddress::Mac(MacAddr::new([0, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e]));
        assert_eq!(mac.to_string(), "00.1a.2b.3c.4d.5e");
        assert_eq!(mac.to_string().parse::<BoardAddress>().unwrap(), mac);
    }

    #[test]
    fn identity_serializes_colon_mac() {
        let identity = BoardIdentity {
            geoaddr: 0x9f,
            mac: MacAddr::new([0, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e]),
        };
        let json = serde_json::to_value(identity).expect("identity should serialize");
        assert_eq!(json["geoaddr"], 0x9f);
        assert_eq!(json["mac"], "00:1a:2b:3c:4d:5e");
    }
}
