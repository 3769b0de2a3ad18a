
// Raw SCPI over a TCP socket (conventionally port 5025): newline-terminated text both ways, except
// for IEEE blocks which are length-prefixed and may contain newlines.

use std::io::{self, BufRead, BufReader, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use log::debug;

use crate::config::BusConfig;
use crate::error::{Error, Result};
use crate::scpi;

use super::{Bus, terminated};

pub struct SocketBus<S: Read + Write = TcpStream> {
	stream: BufReader<S>,
	tx_throttle: Duration,
}

impl SocketBus<TcpStream> {

	pub fn open(host:&str, port:u16, cfg:&BusConfig) -> Result<Self> {
		let stream = TcpStream::connect((host, port))?;
		stream.set_read_timeout(Some(cfg.io_timeout()))?;
		stream.set_write_timeout(Some(cfg.io_timeout()))?;
		stream.set_nodelay(true)?;
		Ok(Self::from_stream(stream, cfg.tx_throttle()))
	}

}

impl<S: Read + Write> SocketBus<S> {

	pub fn from_stream(stream:S, tx_throttle:Duration) -> Self {
		Self{ stream: BufReader::new(stream), tx_throttle }
	}

	fn read_block(&mut self) -> Result<Vec<u8>> {
		let mut ans:Vec<u8> = vec![0; 2];
		self.stream.read_exact(&mut ans)?;

		let n_digits = (ans[1] as char).to_digit(10)
			.ok_or_else(|| Error::InvalidBlock("missing length digit count".to_owned()))? as usize;

		if n_digits == 0 {
			self.stream.read_until(b'\n', &mut ans)?;
			return Ok(ans);
		}

		let mut len_digits:Vec<u8> = vec![0; n_digits];
		self.stream.read_exact(&mut len_digits)?;
		let len:usize = std::str::from_utf8(&len_digits).ok()
			.and_then(|s| s.parse::<usize>().ok())
			.ok_or_else(|| Error::InvalidBlock(format!("bad length {:?}", String::from_utf8_lossy(&len_digits))))?;
		scpi::check_block_len(len)?;
		ans.extend_from_slice(&len_digits);

		// Grows only as bytes arrive, whatever the header claims
		let start = ans.len();
		(&mut self.stream).take(len as u64).read_to_end(&mut ans)?;
		if ans.len() - start != len {
			return Err(Error::Io(io::Error::new(ErrorKind::UnexpectedEof, format!("block announced {} bytes but the connection closed after {}", len, ans.len() - start))));
		}

		// Swallow the message terminator after the block
		let mut rest:Vec<u8> = vec![];
		self.stream.read_until(b'\n', &mut rest)?;
		Ok(ans)
	}

}

impl<S: Read + Write> Bus for SocketBus<S> {

	fn write(&mut self, cmd:&str) -> Result<()> {
		if self.tx_throttle > Duration::from_secs(0) {
			thread::sleep(self.tx_throttle);
		}
		debug!(">> {}", cmd.trim_end());
		let stream = self.stream.get_mut();
		stream.write_all(&terminated(cmd))?;
		stream.flush()?;
		Ok(())
	}

	fn read_raw(&mut self) -> Result<Vec<u8>> {
		let first:Option<u8> = self.stream.fill_buf()?.first().copied();
		let data = match first {
			None       => return Err(Error::Io(io::Error::new(ErrorKind::UnexpectedEof, "Connection closed by instrument"))),
			Some(b'#') => self.read_block()?,
			Some(_)    => {
				let mut line:Vec<u8> = vec![];
				self.stream.read_until(b'\n', &mut line)?;
				line
			},
		};
		debug!("<< {} bytes", data.len());
		Ok(data)
	}

}
