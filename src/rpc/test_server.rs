
// Scripted single-connection RPC server for exercising the clients in-process

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::xdr::{Packer, Unpacker};
use super::{CALL, MSG_ACCEPTED, REPLY, SUCCESS};

pub const LAST_FRAGMENT:u32 = 0x8000_0000;

pub struct Call {
	pub xid: u32,
	pub prc: u32,
	pub args: Unpacker,
}

// Accepts one connection and hands it to `script`; whatever the script returns comes back through join()
pub fn serve<F, T>(script:F) -> (SocketAddr, JoinHandle<T>)
	where F: FnOnce(TcpStream) -> T + Send + 'static, T: Send + 'static {

	let listener = TcpListener::bind("127.0.0.1:0").unwrap();
	let addr = listener.local_addr().unwrap();
	let handle = thread::spawn(move || {
		let (stream, _) = listener.accept().unwrap();
		script(stream)
	});
	(addr, handle)
}

pub fn read_call(s:&mut TcpStream) -> Call {
	let mut record:Vec<u8> = vec![];
	loop {
		let x = s.read_u32::<BigEndian>().unwrap();
		let start = record.len();
		record.resize(start + (x & !LAST_FRAGMENT) as usize, 0);
		s.read_exact(&mut record[start..]).unwrap();
		if x & LAST_FRAGMENT != 0 { break; }
	}

	let mut args = Unpacker::new();
	args.reset(&record);
	let xid = args.unpack_u32().unwrap();
	assert_eq!(args.unpack_enum().unwrap(), CALL);
	let _rpcvers = args.unpack_u32().unwrap();
	let _prog = args.unpack_u32().unwrap();
	let _vers = args.unpack_u32().unwrap();
	let prc = args.unpack_u32().unwrap();
	// Credentials and verifier
	for _ in 0..2 {
		args.unpack_enum().unwrap();
		args.unpack_variable_len_opaque().unwrap();
	}
	Call{ xid, prc, args }
}

// Accepted, successful reply header followed by `body`
pub fn reply(xid:u32, body:&Packer) -> Vec<u8> {
	let mut p = Packer::new();
	p.pack_u32(xid).unwrap();
	p.pack_enum(REPLY).unwrap();
	p.pack_enum(MSG_ACCEPTED).unwrap();
	p.pack_enum(0).unwrap();
	p.pack_variable_len_opaque(&[]).unwrap();
	p.pack_enum(SUCCESS).unwrap();

	let mut ans:Vec<u8> = p.as_bytes().to_vec();
	ans.extend_from_slice(body.as_bytes());
	ans
}

// Sends `record` split into fragments of at most `fragment` bytes
pub fn send_record(s:&mut TcpStream, record:&[u8], fragment:usize) {
	let chunks:Vec<&[u8]> = record.chunks(fragment.max(1)).collect();
	if chunks.is_empty() {
		s.write_u32::<BigEndian>(LAST_FRAGMENT).unwrap();
		return;
	}
	for (i, chunk) in chunks.iter().enumerate() {
		let last = if i + 1 == chunks.len() { LAST_FRAGMENT } else { 0 };
		s.write_u32::<BigEndian>(chunk.len() as u32 | last).unwrap();
		s.write_all(chunk).unwrap();
	}
	s.flush().unwrap();
}
