
// Device core
pub const DEVICE_CORE_PROG:u32  = 0x0607af;
pub const DEVICE_CORE_VERS:u32  = 1;
pub const CREATE_LINK:u32       = 10;
pub const DEVICE_WRITE:u32      = 11;
pub const DEVICE_READ:u32       = 12;
pub const DEVICE_CLEAR:u32      = 15;
pub const DESTROY_LINK:u32      = 23;

pub const CLIENT_ID:i32 = 3333;
pub const DEFAULT_DEVICE_NAME:&str = "inst0";

// Operation flags
pub const FLAG_END:i32      = 8;

// Reason bits of a device_read reply
pub const REASON_REQCNT:i32 = 1;
pub const REASON_CHR:i32    = 2;
pub const REASON_END:i32    = 4;

// Requested per device_read call; the loop in `read` stitches larger responses together
const READ_CHUNK:u32 = 1024 * 1024;

use std::io::{self, Error, ErrorKind};
use std::time::Duration;

use log::{debug, warn};

use crate::rpc::port_mapping::{TcpPortMapperClient, Mapping, Protocol};
use crate::rpc::tcp_clients::TcpClient;

pub mod xdr_pack;

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::Other, msg) }

fn device_error(code:i32) -> io::Error {
	match code {
		1  => err("Syntax error"),
		3  => err("Device not accessible"),
		4  => err("Invalid link identifier"),
		5  => err("Parameter error"),
		6  => err("Channel not established"),
		8  => err("Operation not supported"),
		9  => err("Out of resources"),
		11 => err("Device locked by another link"),
		12 => err("No lock held by this link"),
		15 => Error::new(ErrorKind::TimedOut, "I/O timeout"),
		17 => err("I/O error"),
		21 => err("Invalid address"),
		23 => err("Abort"),
		29 => err("Channel already established"),
		_  => Error::new(ErrorKind::Other, format!("Unknown VXI-11 device error {}", code)),
	}
}

fn check(code:i32) -> io::Result<()> {
	if code == 0 { Ok(()) } else { Err(device_error(code)) }
}

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
	pub io_timeout_ms: u32,
	pub lock_timeout_ms: u32,
}

pub struct CoreClient {
	client: TcpClient,
	timeouts: Timeouts,
	opt_link: Option<Link>,
}

#[derive(Debug, Clone, Copy)]
pub struct Link {
	pub link_id: i32,
	pub abort_port: u16,
	pub max_recv_size: u32,
}

impl CoreClient {

	fn get_link(&self) -> io::Result<Link> {
		self.opt_link.ok_or_else(|| Error::new(ErrorKind::NotConnected, "No link"))
	}

	pub fn new(host:&str, timeouts:Timeouts) -> io::Result<Self> {
		// The socket timeout has to outlast the instrument-side timeout or we'd give up on replies still in flight
		let socket_timeout = Duration::from_millis(u64::from(timeouts.io_timeout_ms.max(timeouts.lock_timeout_ms)) + 2000);

		// Find the port to use for the core program
		let mut pmap_client = TcpPortMapperClient::new(host, Some(socket_timeout))?;

		let mapping = Mapping {
			program: DEVICE_CORE_PROG,
			version: DEVICE_CORE_VERS,
			protocol: Protocol::TCP,
			port: 0,
		};

		let port:u16 = pmap_client.get_port(&mapping)?;
		debug!("VXI-11 core channel for {} on port {}", host, port);

		let client = TcpClient::connect((host, port), DEVICE_CORE_PROG, DEVICE_CORE_VERS, Some(socket_timeout))?;

		Ok(Self::from_client(client, timeouts))
	}

	// Wraps an RPC client already connected to the core program
	pub fn from_client(client:TcpClient, timeouts:Timeouts) -> Self {
		CoreClient{ client, timeouts, opt_link: None }
	}

	pub fn link(&self) -> Option<Link> { self.opt_link }

	pub fn create_link(&mut self, device:&str) -> io::Result<()> {
		if self.opt_link.is_some() {
			return Err(err("Already connected to a link"));
		}

		self.client.start_call(CREATE_LINK)?;
		xdr_pack::pack_create_link_parms(&mut self.client.packer, CLIENT_ID, false, self.timeouts.lock_timeout_ms, device)?;
		self.client.do_call()?;

		let error:i32         = self.client.unpacker.unpack_i32()?;
		let link_id:i32       = self.client.unpacker.unpack_i32()?;
		let abort_port:u32    = self.client.unpacker.unpack_u32()?;
		let max_recv_size:u32 = self.client.unpacker.unpack_u32()?;
		check(error)?;

		debug!("created link {} to {} (max_recv_size={})", link_id, device, max_recv_size);
		self.opt_link = Some(Link{ link_id, abort_port: abort_port as u16, max_recv_size });
		Ok(())
	}

	// Messages longer than the device's max_recv_size go out in several calls, END on the last one only
	pub fn write(&mut self, data:&[u8]) -> io::Result<()> {
		let link = self.get_link()?;
		let chunk_len = (link.max_recv_size as usize).max(1);

		let mut chunks = data.chunks(chunk_len).peekable();
		if data.is_empty() {
			return self.write_chunk(link.link_id, &[], true);
		}
		while let Some(chunk) = chunks.next() {
			self.write_chunk(link.link_id, chunk, chunks.peek().is_none())?;
		}
		Ok(())
	}

	fn write_chunk(&mut self, link_id:i32, chunk:&[u8], last:bool) -> io::Result<()> {
		let flags = if last { FLAG_END } else { 0 };

		self.client.start_call(DEVICE_WRITE)?;
		xdr_pack::pack_device_write_parms(&mut self.client.packer, link_id, self.timeouts.io_timeout_ms, self.timeouts.lock_timeout_ms, flags, chunk)?;
		self.client.do_call()?;

		let error:i32 = self.client.unpacker.unpack_i32()?;
		let size:u32  = self.client.unpacker.unpack_u32()?;
		check(error)?;

		if size as usize != chunk.len() {
			return Err(err("Number of bytes in confirmation doesn't match number of bytes sent"));
		}
		Ok(())
	}

	// Keeps issuing device_read until the instrument flags END
	pub fn read(&mut self) -> io::Result<Vec<u8>> {
		let link = self.get_link()?;
		let mut ans:Vec<u8> = vec![];

		loop {
			self.client.start_call(DEVICE_READ)?;
			xdr_pack::pack_device_read_parms(&mut self.client.packer, link.link_id, READ_CHUNK, self.timeouts.io_timeout_ms, self.timeouts.lock_timeout_ms, 0, 0)?;
			self.client.do_call()?;

			let error:i32  = self.client.unpacker.unpack_i32()?;
			let reason:i32 = self.client.unpacker.unpack_i32()?;
			let data:Vec<u8> = self.client.unpacker.unpack_variable_len_opaque()?;
			check(error)?;

			ans.extend_from_slice(&data);

			if reason & (REASON_END | REASON_CHR) != 0 {
				return Ok(ans);
			}
			if reason & REASON_REQCNT == 0 {
				return Err(err("Expected one of three reason bits to be set"));
			}
		}
	}

	fn generic(&mut self, prc:u32) -> io::Result<()> {
		let link = self.get_link()?;

		self.client.start_call(prc)?;
		xdr_pack::pack_device_generic_parms(&mut self.client.packer, link.link_id, 0, self.timeouts.lock_timeout_ms, self.timeouts.io_timeout_ms)?;
		self.client.do_call()?;

		check(self.client.unpacker.unpack_i32()?)
	}

	// Equivalent of a VISA viClear: flushes the instrument's input and output buffers
	pub fn clear(&mut self) -> io::Result<()> { self.generic(DEVICE_CLEAR) }

	pub fn destroy_link(&mut self) -> io::Result<()> {
		let link = match self.opt_link.take() {
			Some(link) => link,
			None       => return Err(Error::new(ErrorKind::NotConnected, "No link to destroy")),
		};

		self.client.start_call(DESTROY_LINK)?;
		xdr_pack::pack_device_link(&mut self.client.packer, link.link_id)?;
		self.client.do_call()?;

		check(self.client.unpacker.unpack_i32()?)
	}

}

impl Drop for CoreClient {

	fn drop(&mut self) {
		if self.opt_link.is_some() {
			if let Err(e) = self.destroy_link() {
				warn!("Unable to destroy VXI-11 link: {}", e);
			}
		}
	}

}
