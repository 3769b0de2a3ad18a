// Sessions opened through a vendor VISA library, for instruments on GPIB or USB.  VISA delivers one
// complete message per read once the instrument asserts END.

use std::ffi::CString;
use std::io::{Read, Write};
use std::thread;
use std::time::Duration;

use log::debug;
use visa_rs::prelude::*;
use visa_rs::{DefaultRM, Instrument};

use crate::config::BusConfig;
use crate::error::{Error, Result};
use crate::scpi;

use super::{Bus, terminated};

const READ_CHUNK:usize = 64 * 1024;

fn visa_err(e:visa_rs::Error) -> Error { Error::Visa(format!("{:?}", e)) }

pub struct VisaBus {
	// Declared first so the session closes before its resource manager
	instr: Instrument,
	_rm: DefaultRM,
	tx_throttle: Duration,
}

impl VisaBus {

	pub fn open(resource:&str, cfg:&BusConfig) -> Result<Self> {
		let rm = DefaultRM::new().map_err(visa_err)?;
		let name = CString::new(resource).map_err(|_| Error::UnsupportedAddress(resource.to_owned()))?;
		let instr = rm.open(&visa_rs::VisaString::from(name), AccessMode::NO_LOCK, cfg.io_timeout()).map_err(visa_err)?;
		debug!("opened VISA session to {}", resource);

		Ok(Self{ instr, _rm: rm, tx_throttle: cfg.tx_throttle() })
	}

}

impl Bus for VisaBus {

	fn write(&mut self, cmd:&str) -> Result<()> {
		if self.tx_throttle > Duration::from_secs(0) {
			thread::sleep(self.tx_throttle);
		}
		debug!(">> {}", cmd.trim_end());
		self.instr.write_all(&terminated(cmd))?;
		Ok(())
	}

	// A read shorter than the buffer ended on END; a full one means more of the message is waiting
	fn read_raw(&mut self) -> Result<Vec<u8>> {
		let mut ans:Vec<u8> = vec![];
		let mut chunk = vec![0u8; READ_CHUNK];

		loop {
			let n = self.instr.read(&mut chunk)?;
			ans.extend_from_slice(&chunk[..n]);
			if n < chunk.len() {
				break;
			}
			scpi::check_block_len(ans.len())?;
		}
		debug!("<< {} bytes", ans.len());
		Ok(ans)
	}

	fn clear(&mut self) -> Result<()> {
		debug!(">> device clear");
		self.instr.clear().map_err(visa_err)
	}

}
