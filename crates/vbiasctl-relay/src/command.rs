//! Relay request grammar.
//!
//! One request per line, words separated by spaces, verbs case-sensitive.
//! The same type parses requests on the daemon and renders them on the
//! client, so both ends always agree on the wire form.

use std::fmt;
use std::str::FromStr;

use vbiasctl_board::{BoardAddress, Reading};

use crate::error::RequestError;

/// A parsed relay request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// List the boards answering on an interface.
    Probe { interface: Option<String> },
    /// Make a board current for the connection.
    Select {
        address: BoardAddress,
        interface: Option<String>,
    },
    /// Hardware address of the daemon's interface.
    HostMacAddr { interface: Option<String> },
    MacAddr,
    Geoaddr,
    /// Any status-derived reading, including `get_gainmode`.
    Reading(Reading),
    LatchStatus,
    PassthruStatus,
    LatchVoltages,
    PassthruVoltages,
    GetV(usize),
    GetVnew(usize),
    SetV(usize, f64),
    LastPacket,
    Ramp,
    Reset,
}

impl Request {
    /// Whether the request acts on the currently selected board.
    pub fn needs_board(&self) -> bool {
        !matches!(
            self,
            Request::Probe { .. } | Request::Select { .. } | Request::HostMacAddr { .. }
        )
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Request::Probe { .. } => "probe",
            Request::Select { .. } => "select",
            Request::HostMacAddr { .. } => "get_hostMACaddr",
            Request::MacAddr => "get_MACaddr",
            Request::Geoaddr => "get_Geoaddr",
            Request::Reading(reading) => reading.verb(),
            Request::LatchStatus => "latch_status",
            Request::PassthruStatus => "passthru_status",
            Request::LatchVoltages => "latch_voltages",
            Request::PassthruVoltages => "passthru_voltages",
            Request::GetV(_) => "getV",
            Request::GetVnew(_) => "getVnew",
            Request::SetV(..) => "setV",
            Request::LastPacket => "get_last_packet",
            Request::Ramp => "ramp",
            Request::Reset => "reset",
        }
    }
}

struct Args<'a> {
    verb: &'static str,
    words: std::str::SplitWhitespace<'a>,
}

impl<'a> Args<'a> {
    fn optional(&mut self) -> Option<String> {
        self.words.next().map(str::to_string)
    }

    fn required(&mut self, argument: &'static str) -> Result<&'a str, RequestError> {
        self.words.next().ok_or(RequestError::MissingArgument {
            verb: self.verb,
            argument,
        })
    }

    fn parsed<T: FromStr>(&mut self, argument: &'static str) -> Result<T, RequestError> {
        let value = self.required(argument)?;
        value.parse().map_err(|_| RequestError::InvalidArgument {
            verb: self.verb,
            argument,
            value: value.to_string(),
        })
    }

    fn finish<T>(mut self, request: T) -> Result<T, RequestError> {
        match self.words.next() {
            Some(_) => Err(RequestError::TooManyArguments(self.verb)),
            None => Ok(request),
        }
    }
}

impl FromStr for Request {
    type Err = RequestError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or(RequestError::Empty)?;

        let simple = match verb {
            "get_MACaddr" => Some(Request::MacAddr),
            "get_Geoaddr" => Some(Request::Geoaddr),
            "latch_status" => Some(Request::LatchStatus),
            "passthru_status" => Some(Request::PassthruStatus),
            "latch_voltages" => Some(Request::LatchVoltages),
            "passthru_voltages" => Some(Request::PassthruVoltages),
            "get_last_packet" => Some(Request::LastPacket),
            "ramp" => Some(Request::Ramp),
            "reset" => Some(Request::Reset),
            other => Reading::from_verb(other).map(Request::Reading),
        };
        if let Some(request) = simple {
            let args = Args {
                verb: request.verb(),
                words,
            };
            return args.finish(request);
        }

        let verb: &'static str = match verb {
            "probe" => "probe",
            "select" => "select",
            "get_hostMACaddr" => "get_hostMACaddr",
            "getV" => "getV",
            "getVnew" => "getVnew",
            "setV" => "setV",
            other => return Err(RequestError::Unrecognized(other.to_string())),
        };
        let mut args = Args { verb, words };

        let request = match verb {
            "probe" => Request::Probe {
                interface: args.optional(),
            },
            "select" => {
                let address = args.required("an address")?.parse::<BoardAddress>()?;
                Request::Select {
                    address,
                    interface: args.optional(),
                }
            }
            "get_hostMACaddr" => Request::HostMacAddr {
                interface: args.optional(),
            },
            "getV" => Request::GetV(args.parsed("a channel")?),
            "getVnew" => Request::GetVnew(args.parsed("a channel")?),
            _ => {
                let channel = args.parsed("a channel")?;
                let volts = args.parsed::<f64>("a voltage")?;
                Request::SetV(channel, volts)
            }
        };
        args.finish(request)
    }
}

/// The wire form, without the terminating newline.
impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())?;
        match self {
            Request::Probe { interface } | Request::HostMacAddr { interface } => {
                if let Some(interface) = interface {
                    write!(f, " {interface}")?;
                }
                Ok(())
            }
            Request::Select { address, interface } => {
                write!(f, " {address}")?;
                if let Some(interface) = interface {
                    write!(f, " {interface}")?;
                }
                Ok(())
            }
            Request::GetV(channel) | Request::GetVnew(channel) => write!(f, " {channel}"),
            Request::SetV(channel, volts) => write!(f, " {channel} {volts}"),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use vbiasctl_transport::MacAddr;

    use super::*;

    fn parse(line: &str) -> Result<Request, RequestError> {
        line.parse()
    }

    #[test]
    fn parses_select_forms() {
        assert_eq!(
            parse("select 0x9f eth0").unwrap(),
            Request::Select {
                address: BoardAddress::Geo(0x9f),
                interface: Some("eth0".into()),
            }
        );
        assert_eq!(
            parse("select 00.1a.2b.3c.4d.5e").unwrap(),
            Request::Select {
                address: BoardAddress::Mac(MacAddr::new([0, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e])),
                interface: None,
            }
        );
        assert!(matches!(
            parse("select"),
            Err(RequestError::MissingArgument { verb: "select", .. })
        ));
        assert!(matches!(parse("select zz"), Err(RequestError::Address(_))));
    }

    #[test]
    fn parses_readings_by_verb() {
        assert_eq!(parse("get_Tchip").unwrap(), Request::Reading(Reading::Tchip));
        assert_eq!(parse("get_gainmode").unwrap(), Request::Reading(Reading::Gainmode));
        assert_eq!(parse("get_TDAC").unwrap(), Request::Reading(Reading::Tdac));
        assert!(parse("get_tchip").is_err(), "verbs are case-sensitive");
    }

    #[test]
    fn parses_channel_requests() {
        assert_eq!(parse("getV 7").unwrap(), Request::GetV(7));
        assert_eq!(parse("getVnew 31").unwrap(), Request::GetVnew(31));
        assert_eq!(parse("setV 3 71.25").unwrap(), Request::SetV(3, 71.25));
        assert!(matches!(
            parse("setV 3"),
            Err(RequestError::MissingArgument { argument: "a voltage", .. })
        ));
        assert!(matches!(
            parse("getV x"),
            Err(RequestError::InvalidArgument { verb: "getV", .. })
        ));
    }

    #[test]
    fn rejects_unknown_and_extra_words() {
        assert_eq!(
            parse("frobnicate").unwrap_err(),
            RequestError::Unrecognized("frobnicate".into())
        );
        assert_eq!(parse("   ").unwrap_err(), RequestError::Empty);
        assert_eq!(
            parse("ramp now").unwrap_err(),
            RequestError::TooManyArguments("ramp")
        );
        assert_eq!(parse("probe eth1 eth2").unwrap_err(), RequestError::TooManyArguments("probe"));
    }

    #[test]
    fn renders_wire_form() {
        let select = Request::Select {
            address: BoardAddress::Geo(0x0a),
            interface: Some("eth1".into()),
        };
        assert_eq!(select.to_string(), "select 0x0a eth1");
        assert_eq!(Request::SetV(4, 70.5).to_string(), "setV 4 70.5");
        assert_eq!(Request::Probe { interface: None }.to_string(), "probe");
        assert_eq!(Request::Reading(Reading::Neg5V).to_string(), "get_neg5Vpower");
        assert_eq!(parse(&select.to_string()).unwrap(), select);
    }

    #[test]
    fn board_requirement() {
        assert!(!parse("probe").unwrap().needs_board());
        assert!(!parse("get_hostMACaddr eth0").unwrap().needs_board());
        assert!(parse("reset").unwrap().needs_board());
        assert!(parse("get_Geoaddr").unwrap().needs_board());
    }
}
