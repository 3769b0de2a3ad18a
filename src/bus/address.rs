
use std::fmt;
use std::str::FromStr;

use regex::Regex;

use crate::error::Error;
use crate::vxi11::DEFAULT_DEVICE_NAME;

lazy_static! {
	static ref INSTR_RE: Regex  = Regex::new("(?i)^TCPIP\\d*::([^:]+)(?:::([^:]+))?::INSTR$").unwrap();
	static ref SOCKET_RE: Regex = Regex::new("(?i)^TCPIP\\d*::([^:]+)::(\\d+)::SOCKET$").unwrap();
	static ref HOST_RE: Regex   = Regex::new("^[A-Za-z0-9][A-Za-z0-9.\\-]*$").unwrap();
	static ref VISA_RE: Regex   = Regex::new("(?i)^(?:GPIB|USB)\\d*::\\S+::INSTR$").unwrap();
}

// A VISA resource string reduced to what the native LAN transports need.  A VXI-11 device name
// such as `gpib0,5` reaches a GPIB instrument behind a LAN/GPIB gateway; GPIB and USB resources
// are kept whole for the vendor VISA library.
#[derive(Debug, Clone, PartialEq)]
pub enum Address {
	Vxi11 { host: String, device: String },
	Socket { host: String, port: u16 },
	Visa(String),
}

impl FromStr for Address {
	type Err = Error;

	fn from_str(s:&str) -> Result<Self, Error> {
		let s = s.trim();

		if let Some(caps) = INSTR_RE.captures(s) {
			let host = caps[1].to_owned();
			let device = caps.get(2).map(|m| m.as_str().to_owned()).unwrap_or_else(|| DEFAULT_DEVICE_NAME.to_owned());
			return Ok(Address::Vxi11{ host, device });
		}

		if let Some(caps) = SOCKET_RE.captures(s) {
			let port = caps[2].parse::<u16>().map_err(|_| Error::UnsupportedAddress(s.to_owned()))?;
			return Ok(Address::Socket{ host: caps[1].to_owned(), port });
		}

		if VISA_RE.is_match(s) {
			return Ok(Address::Visa(s.to_owned()));
		}

		// A bare host name or IP address means the first VXI-11 instrument on it
		if HOST_RE.is_match(s) {
			return Ok(Address::Vxi11{ host: s.to_owned(), device: DEFAULT_DEVICE_NAME.to_owned() });
		}

		Err(Error::UnsupportedAddress(s.to_owned()))
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f:&mut fmt::Formatter) -> fmt::Result {
		match self {
			Address::Vxi11{ host, device } => write!(f, "TCPIP0::{}::{}::INSTR", host, device),
			Address::Socket{ host, port }  => write!(f, "TCPIP0::{}::{}::SOCKET", host, port),
			Address::Visa(resource)        => f.write_str(resource),
		}
	}
}
