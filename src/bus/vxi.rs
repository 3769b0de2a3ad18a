
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::config::BusConfig;
use crate::error::Result;
use crate::vxi11::CoreClient;

use super::{Bus, terminated};

pub struct Vxi11Bus {
	core: CoreClient,
	tx_throttle: Duration,
}

impl Vxi11Bus {

	pub fn open(host:&str, device:&str, cfg:&BusConfig) -> Result<Self> {
		let mut core = CoreClient::new(host, cfg.timeouts())?;
		core.create_link(device)?;
		Ok(Self{ core, tx_throttle: cfg.tx_throttle() })
	}

}

impl Bus for Vxi11Bus {

	fn write(&mut self, cmd:&str) -> Result<()> {
		if self.tx_throttle > Duration::from_secs(0) {
			thread::sleep(self.tx_throttle);
		}
		debug!(">> {}", cmd.trim_end());
		Ok(self.core.write(&terminated(cmd))?)
	}

	fn read_raw(&mut self) -> Result<Vec<u8>> {
		let data = self.core.read()?;
		debug!("<< {} bytes", data.len());
		Ok(data)
	}

	fn clear(&mut self) -> Result<()> {
		debug!(">> device clear");
		Ok(self.core.clear()?)
	}

	fn close(&mut self) -> Result<()> {
		match self.core.link() {
			Some(_) => Ok(self.core.destroy_link()?),
			None    => {
				warn!("VXI-11 link already closed");
				Ok(())
			},
		}
	}

}
