
// The request/response channel both instrument controllers talk through.  Implementations move ASCII
// command strings out and raw reply bytes back; framing of binary blocks is handled in `scpi`.

use log::info;

use crate::config::BusConfig;
use crate::error::{Error, Result};
use crate::scpi;

pub mod address;
pub mod mock;
pub mod socket;
pub mod vxi;

pub use self::address::Address;
pub use self::mock::MockBus;
pub use self::socket::SocketBus;
pub use self::vxi::Vxi11Bus;

#[cfg(feature = "visa")]
pub mod visa;

#[cfg(feature = "visa")]
pub use self::visa::VisaBus;

pub trait Bus {

	// Sends one command; implementations add the newline terminator
	fn write(&mut self, cmd:&str) -> Result<()>;

	// Reads one complete reply, including a trailing newline if the instrument sent one
	fn read_raw(&mut self) -> Result<Vec<u8>>;

	fn query(&mut self, cmd:&str) -> Result<String> {
		self.write(cmd)?;
		let raw = self.read_raw()?;
		String::from_utf8(raw).map_err(|e| Error::parse("UTF-8 text", &String::from_utf8_lossy(e.as_bytes())))
	}

	// Sends a query whose reply is an IEEE 488.2 block of big-endian 16-bit samples
	fn query_binary(&mut self, cmd:&str) -> Result<Vec<i16>> {
		self.write(cmd)?;
		let raw = self.read_raw()?;
		scpi::decode_i16_be(scpi::parse_block(&raw)?)
	}

	// Flushes the instrument's I/O buffers; a no-op where the transport has no such operation
	fn clear(&mut self) -> Result<()> { Ok(()) }

	fn close(&mut self) -> Result<()> { Ok(()) }

}

impl<B: Bus + ?Sized> Bus for Box<B> {
	fn write(&mut self, cmd:&str) -> Result<()> { (**self).write(cmd) }
	fn read_raw(&mut self) -> Result<Vec<u8>> { (**self).read_raw() }
	fn query(&mut self, cmd:&str) -> Result<String> { (**self).query(cmd) }
	fn query_binary(&mut self, cmd:&str) -> Result<Vec<i16>> { (**self).query_binary(cmd) }
	fn clear(&mut self) -> Result<()> { (**self).clear() }
	fn close(&mut self) -> Result<()> { (**self).close() }
}

// Opens whichever transport the VISA-style resource string names
pub fn open(resource:&str, cfg:&BusConfig) -> Result<Box<dyn Bus>> {
	let address:Address = resource.parse()?;
	info!("Opening {}", resource);

	match address {
		Address::Vxi11{ host, device } => Ok(Box::new(Vxi11Bus::open(&host, &device, cfg)?)),
		Address::Socket{ host, port }  => Ok(Box::new(SocketBus::open(&host, port, cfg)?)),
		Address::Visa(resource)        => open_visa(&resource, cfg),
	}
}

#[cfg(feature = "visa")]
fn open_visa(resource:&str, cfg:&BusConfig) -> Result<Box<dyn Bus>> {
	Ok(Box::new(VisaBus::open(resource, cfg)?))
}

#[cfg(not(feature = "visa"))]
fn open_visa(resource:&str, _cfg:&BusConfig) -> Result<Box<dyn Bus>> {
	Err(Error::UnsupportedAddress(format!("{} (built without the `visa` feature)", resource)))
}

pub(crate) fn terminated(cmd:&str) -> Vec<u8> {
	let mut bytes:Vec<u8> = cmd.as_bytes().to_vec();
	if !cmd.ends_with('\n') { bytes.push(b'\n'); }
	bytes
}
