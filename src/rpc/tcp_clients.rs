
use std::io::{self, Read, Write, Error, ErrorKind};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use byteorder::{BigEndian, WriteBytesExt, ReadBytesExt};
use log::trace;

use crate::scpi;
use crate::xdr;
use super::{xdr_pack, xdr_unpack};

const LAST_FRAGMENT:u32 = 0x8000_0000;

// A full-size binary block plus room for the RPC and VXI-11 framing around it
pub const MAX_RECORD_LEN:usize = scpi::MAX_BLOCK_LEN + 64 * 1024;

pub struct TcpClient {
	stream: TcpStream,
	pub prog: u32,
	pub vers: u32,
	pub lastxid: u32,
	pub packer: xdr::Packer,
	pub unpacker: xdr::Unpacker,
}

impl TcpClient {

	pub fn connect<A: ToSocketAddrs>(addr:A, prog:u32, vers:u32, timeout:Option<Duration>) -> io::Result<Self> {
		let stream = TcpStream::connect(addr)?;
		stream.set_read_timeout(timeout)?;
		stream.set_write_timeout(timeout)?;
		stream.set_nodelay(true)?;

		// Random starting xid so a reconnect is never confused by replies meant for an earlier session
		let lastxid:u32 = rand::random::<u32>();

		Ok(Self{ stream, prog, vers, lastxid, packer: xdr::Packer::new(), unpacker: xdr::Unpacker::new() })
	}

	// Clears the packer and writes a call header for procedure `prc`; arguments are packed after this
	pub fn start_call(&mut self, prc:u32) -> io::Result<()> {
		self.lastxid = self.lastxid.wrapping_add(1);
		self.packer.reset();
		xdr_pack::pack_callheader_no_auth(&mut self.packer, self.lastxid, self.prog, self.vers, prc)
	}

	// Sends the packed call and leaves the reply body (after the reply header) in the unpacker
	pub fn do_call(&mut self) -> io::Result<()> {
		let call:&[u8] = self.packer.as_bytes();
		let mut send_bytes:Vec<u8> = Vec::with_capacity(call.len() + 4);
		send_bytes.write_u32::<BigEndian>(call.len() as u32 | LAST_FRAGMENT)?;
		send_bytes.extend_from_slice(call);
		self.stream.write_all(&send_bytes)?;
		trace!("rpc call xid={} prog={:#x} ({} bytes)", self.lastxid, self.prog, call.len());

		loop {
			let reply:Vec<u8> = self.read_record()?;
			self.unpacker.reset(&reply);

			let (xid, _) = xdr_unpack::unpack_replyheader(&mut self.unpacker)?;
			if xid == self.lastxid {
				return Ok(());
			}
			// A stale reply to a call that timed out earlier; keep reading
			trace!("discarding reply with xid={} while waiting for xid={}", xid, self.lastxid);
		}
	}

	fn read_record(&mut self) -> io::Result<Vec<u8>> {
		let mut reply:Vec<u8> = vec![];

		let mut last:bool = false;
		while !last {
			let x:u32 = self.stream.read_u32::<BigEndian>()?;
			last = (x & LAST_FRAGMENT) != 0;
			let n = (x & !LAST_FRAGMENT) as usize;

			if reply.len() + n > MAX_RECORD_LEN {
				return Err(Error::new(ErrorKind::InvalidData, "RPC record exceeds the maximum accepted length"));
			}

			let start = reply.len();
			reply.resize(start + n, 0);
			self.stream.read_exact(&mut reply[start..])?;
		}

		Ok(reply)
	}

}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::rpc::test_server::{self, read_call, reply, send_record};
	use crate::xdr::Packer;

	const PROG:u32 = 0x2000_0001;

	fn client(addr:std::net::SocketAddr) -> TcpClient {
		TcpClient::connect(addr, PROG, 1, Some(Duration::from_secs(5))).unwrap()
	}

	fn words(values:&[u32]) -> Packer {
		let mut p = Packer::new();
		for v in values { p.pack_u32(*v).unwrap(); }
		p
	}

	#[test]
	fn stale_reply_is_skipped() {
		let (addr, server) = test_server::serve(|mut s| {
			let call = read_call(&mut s);
			send_record(&mut s, &reply(call.xid.wrapping_sub(1), &words(&[111])), 1024);
			send_record(&mut s, &reply(call.xid, &words(&[222])), 1024);
			call.prc
		});

		let mut c = client(addr);
		c.start_call(7).unwrap();
		c.do_call().unwrap();
		assert_eq!(c.unpacker.unpack_u32().unwrap(), 222);
		assert!(c.unpacker.all_data_consumed());
		assert_eq!(server.join().unwrap(), 7);
	}

	#[test]
	fn fragments_are_joined_into_one_record() {
		let (addr, server) = test_server::serve(|mut s| {
			let call = read_call(&mut s);
			send_record(&mut s, &reply(call.xid, &words(&[1, 2, 3])), 5);
		});

		let mut c = client(addr);
		c.start_call(1).unwrap();
		c.do_call().unwrap();
		for expected in 1..=3 {
			assert_eq!(c.unpacker.unpack_u32().unwrap(), expected);
		}
		server.join().unwrap();
	}

	#[test]
	fn consecutive_calls_use_fresh_xids() {
		let (addr, server) = test_server::serve(|mut s| {
			let mut xids = vec![];
			for _ in 0..2 {
				let call = read_call(&mut s);
				send_record(&mut s, &reply(call.xid, &words(&[])), 1024);
				xids.push(call.xid);
			}
			xids
		});

		let mut c = client(addr);
		for _ in 0..2 {
			c.start_call(1).unwrap();
			c.do_call().unwrap();
		}
		let xids = server.join().unwrap();
		assert_eq!(xids[1], xids[0].wrapping_add(1));
		assert_eq!(c.lastxid, xids[1]);
	}

	#[test]
	fn oversized_record_is_rejected() {
		let (addr, server) = test_server::serve(|mut s| {
			read_call(&mut s);
			s.write_u32::<BigEndian>(test_server::LAST_FRAGMENT | (MAX_RECORD_LEN as u32 + 1)).unwrap();
			s.write_all(&[0; 64]).unwrap();
		});

		let mut c = client(addr);
		c.start_call(1).unwrap();
		let e = c.do_call().unwrap_err();
		assert_eq!(e.kind(), ErrorKind::InvalidData);
		server.join().unwrap();
	}
}
