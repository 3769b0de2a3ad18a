
// Settings for opening the instruments, loadable from a JSON file

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Serialize, Deserialize};

use crate::devices::keithley2230g::ConnectMode;
use crate::error::Result;
use crate::vxi11::Timeouts;

pub const DEFAULT_IO_TIMEOUT_MS:u32 = 10000;
pub const DEFAULT_LOCK_TIMEOUT_MS:u32 = 10000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
	pub io_timeout_ms: u32,
	pub lock_timeout_ms: u32,
	// Slept before every write, for instruments that drop commands sent back to back
	pub tx_throttle_ms: u64,
}

impl Default for BusConfig {
	fn default() -> Self {
		Self{ io_timeout_ms: DEFAULT_IO_TIMEOUT_MS, lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS, tx_throttle_ms: 0 }
	}
}

impl BusConfig {
	pub fn io_timeout(&self) -> Duration { Duration::from_millis(u64::from(self.io_timeout_ms)) }
	pub fn tx_throttle(&self) -> Duration { Duration::from_millis(self.tx_throttle_ms) }
	pub fn timeouts(&self) -> Timeouts { Timeouts{ io_timeout_ms: self.io_timeout_ms, lock_timeout_ms: self.lock_timeout_ms } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerSupplyConfig {
	pub address: String,
	#[serde(default)]
	pub mode: ConnectMode,
	#[serde(default)]
	pub bus: BusConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeConfig {
	pub address: String,
	#[serde(default)]
	pub bus: BusConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
	pub power_supply: Option<PowerSupplyConfig>,
	pub scope: Option<ScopeConfig>,
}

impl LabConfig {

	pub fn from_json(s:&str) -> Result<Self> { Ok(serde_json::from_str(s)?) }

	pub fn from_file<P: AsRef<Path>>(path:P) -> Result<Self> {
		let text = fs::read_to_string(path)?;
		Self::from_json(&text)
	}

}
