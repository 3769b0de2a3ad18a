
// Keithley 2230G triple-channel programmable DC power supply.  The front panel locks while the
// instrument is in remote mode; closing (or dropping) the controller hands it back.

use std::convert::TryFrom;
use std::fmt;
use std::ops::Drop;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Serialize, Deserialize};

use crate::bus::{self, Bus};
use crate::config::PowerSupplyConfig;
use crate::error::{Error, Result};
use crate::scpi::{self, Identity};

pub const MODEL:&str = "2230";

// Channel 3 is the low-voltage output; anything above this can damage what's connected to it
pub const CH3_MAX_VOLTAGE:f64 = 6.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel { Ch1, Ch2, Ch3 }

impl Channel {

	pub const ALL:[Channel; 3] = [Channel::Ch1, Channel::Ch2, Channel::Ch3];

	pub fn as_str(self) -> &'static str {
		match self {
			Channel::Ch1 => "CH1",
			Channel::Ch2 => "CH2",
			Channel::Ch3 => "CH3",
		}
	}

}

impl fmt::Display for Channel {
	fn fmt(&self, f:&mut fmt::Formatter) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Channel {
	type Err = Error;

	fn from_str(s:&str) -> Result<Self> {
		match s.trim().to_ascii_uppercase().as_str() {
			"CH1" => Ok(Channel::Ch1),
			"CH2" => Ok(Channel::Ch2),
			"CH3" => Ok(Channel::Ch3),
			_     => Err(Error::InvalidChannel(format!("{:?} (the 2230G has CH1, CH2 and CH3)", s.trim()))),
		}
	}
}

impl TryFrom<u8> for Channel {
	type Error = Error;

	fn try_from(n:u8) -> Result<Self> {
		match n {
			1 => Ok(Channel::Ch1),
			2 => Ok(Channel::Ch2),
			3 => Ok(Channel::Ch3),
			_ => Err(Error::InvalidChannel(format!("{} (the 2230G only has three channels)", n))),
		}
	}
}

// Which channels a read applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
	One(Channel),
	All,
}

impl Selection {

	fn count(self) -> usize { self.channels().len() }

	pub fn channels(self) -> Vec<Channel> {
		match self {
			Selection::One(ch) => vec![ch],
			Selection::All     => Channel::ALL.to_vec(),
		}
	}

}

impl From<Channel> for Selection {
	fn from(ch:Channel) -> Self { Selection::One(ch) }
}

impl fmt::Display for Selection {
	fn fmt(&self, f:&mut fmt::Formatter) -> fmt::Result {
		match self {
			Selection::One(ch) => f.write_str(ch.as_str()),
			Selection::All     => f.write_str("ALL"),
		}
	}
}

impl FromStr for Selection {
	type Err = Error;

	fn from_str(s:&str) -> Result<Self> {
		if s.trim().eq_ignore_ascii_case("ALL") { Ok(Selection::All) }
		else { s.parse::<Channel>().map(Selection::One) }
	}
}

// The two ways the driver has been used on the bench, kept apart rather than merged:
// put everything back to 0 V / 0 A on connect and check it took, or leave the settings alone and
// wait for the outputs to settle before every measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ConnectMode {
	Plain,
	ResetAndVerify,
	DelayAndMeasure { settle_ms: u64 },
}

impl Default for ConnectMode {
	fn default() -> Self { ConnectMode::Plain }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelState {
	pub set_voltage: f64,
	pub set_current: f64,
	pub measured_voltage: f64,
	pub measured_current: f64,
	pub output_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
	pub identity: Identity,
	pub ch1: ChannelState,
	pub ch2: ChannelState,
	pub ch3: ChannelState,
}

fn check_setpoint(parameter:&'static str, value:f64) -> Result<()> {
	if !value.is_finite() || value < 0.0 {
		return Err(Error::OutOfRange{ parameter, value, limit: "must be a finite, non-negative number" });
	}
	Ok(())
}

fn check_identity(idn:&str) -> Result<Identity> {
	if !idn.contains(MODEL) {
		return Err(Error::UnexpectedModel{ expected: "Keithley 2230G", idn: idn.trim().to_owned() });
	}
	scpi::parse_idn(idn)
}

fn single(values:Vec<f64>, response_of:&'static str) -> Result<f64> {
	match values.as_slice() {
		[x] => Ok(*x),
		_   => Err(Error::Parse{ what: response_of, response: format!("{:?}", values) }),
	}
}

pub struct Keithley2230G<B: Bus = Box<dyn Bus>> {
	bus: B,
	mode: ConnectMode,
	identity: Identity,
	closed: bool,
}

impl Keithley2230G<Box<dyn Bus>> {

	pub fn open(cfg:&PowerSupplyConfig) -> Result<Self> {
		let bus = bus::open(&cfg.address, &cfg.bus)?;
		Self::with_bus(bus, cfg.mode)
	}

}

impl<B: Bus> Keithley2230G<B> {

	pub fn with_bus(mut bus:B, mode:ConnectMode) -> Result<Self> {
		bus.write("SYST:REM")?;

		let idn:String = bus.query("*IDN?")?;
		let identity = match check_identity(&idn) {
			Ok(identity) => identity,
			Err(e) => {
				// Hand the panel back before bailing out
				if let Err(e) = bus.write("SYST:LOC") { warn!("Unable to return to local mode: {}", e); }
				return Err(e);
			},
		};
		info!("Connected device: {}", idn.trim());

		let mut dev = Self{ bus, mode, identity, closed: false };

		if mode == ConnectMode::ResetAndVerify {
			dev.reset_and_verify()?;
		}

		Ok(dev)
	}

	pub fn mode(&self) -> ConnectMode { self.mode }

	// Identity read when the connection was opened
	pub fn identity(&self) -> &Identity { &self.identity }

	pub fn identify(&mut self) -> Result<Identity> {
		let idn:String = self.bus.query("*IDN?")?;
		scpi::parse_idn(&idn)
	}

	fn reset_and_verify(&mut self) -> Result<()> {
		info!("Resetting power supply and zeroing all channels");
		self.bus.write("*RST")?;
		for ch in Channel::ALL.iter() {
			self.set_channel_voltage(*ch, 0.0)?;
			self.set_channel_current(*ch, 0.0)?;
		}

		for ch in Channel::ALL.iter() {
			let volts = single(self.get_channel_voltage_set(*ch)?, "voltage set point")?;
			let amps  = single(self.get_channel_current_set(*ch)?, "current set point")?;
			if volts != 0.0 || amps != 0.0 {
				return Err(Error::VerificationFailed{
					channel: ch.to_string(),
					detail: format!("set points read back as {} V / {} A after reset", volts, amps),
				});
			}
		}
		Ok(())
	}

	fn settle(&self) {
		if let ConnectMode::DelayAndMeasure{ settle_ms } = self.mode {
			thread::sleep(Duration::from_millis(settle_ms));
		}
	}

	fn select(&mut self, sel:Selection) -> Result<()> {
		self.bus.write(&format!("INST:SEL {}", sel))
	}

	// Currently selected channel
	pub fn get_channel(&mut self) -> Result<Channel> {
		let res:String = self.bus.query("INST?")?;
		res.parse::<Channel>().map_err(|_| Error::parse("selected channel", &res))
	}

	fn fetch(&mut self, what:&'static str, cmd:String, sel:Selection) -> Result<Vec<f64>> {
		self.settle();
		let res:String = self.bus.query(&cmd)?;
		let values:Vec<f64> = scpi::parse_numbers(&res)?;
		if values.len() != sel.count() {
			return Err(Error::parse(what, &res));
		}
		Ok(values)
	}

	// Measured output current, one value per selected channel
	pub fn get_channel_current<S: Into<Selection>>(&mut self, sel:S) -> Result<Vec<f64>> {
		let sel = sel.into();
		self.fetch("current measurement", format!("FETC:CURR? {}", sel), sel)
	}

	// Measured output voltage, one value per selected channel
	pub fn get_channel_voltage<S: Into<Selection>>(&mut self, sel:S) -> Result<Vec<f64>> {
		let sel = sel.into();
		self.fetch("voltage measurement", format!("FETC:VOLT? {}", sel), sel)
	}

	// INST:SEL takes a single channel, so ALL is read back one channel at a time
	fn set_points(&mut self, what:&'static str, query:&str, sel:Selection) -> Result<Vec<f64>> {
		let mut ans:Vec<f64> = Vec::with_capacity(sel.count());
		for ch in sel.channels() {
			self.select(Selection::One(ch))?;
			let res:String = self.bus.query(query)?;
			ans.push(single(scpi::parse_numbers(&res)?, what)?);
		}
		Ok(ans)
	}

	// Current limit set points, one value per selected channel
	pub fn get_channel_current_set<S: Into<Selection>>(&mut self, sel:S) -> Result<Vec<f64>> {
		self.set_points("current set point", "SOUR:CURR?", sel.into())
	}

	// Voltage set points, one value per selected channel
	pub fn get_channel_voltage_set<S: Into<Selection>>(&mut self, sel:S) -> Result<Vec<f64>> {
		self.set_points("voltage set point", "SOUR:VOLT?", sel.into())
	}

	pub fn set_channel_current(&mut self, ch:Channel, amps:f64) -> Result<()> {
		check_setpoint("current", amps)?;

		self.select(Selection::One(ch))?;
		debug!("{} current limit -> {} A", ch, amps);
		self.bus.write(&format!("SOUR:CURR {} A", amps))
	}

	pub fn set_channel_voltage(&mut self, ch:Channel, volts:f64) -> Result<()> {
		check_setpoint("voltage", volts)?;
		if ch == Channel::Ch3 && volts > CH3_MAX_VOLTAGE {
			return Err(Error::OutOfRange{ parameter: "CH3 voltage", value: volts, limit: "at most 6.1 V" });
		}

		self.select(Selection::One(ch))?;
		debug!("{} voltage -> {} V", ch, volts);
		self.bus.write(&format!("SOUR:VOLT {} V", volts))
	}

	pub fn set_channel_output(&mut self, ch:Channel, enabled:bool) -> Result<()> {
		self.select(Selection::One(ch))?;
		self.bus.write(&format!("SOUR:CHAN:OUTP {}", if enabled { 1 } else { 0 }))
	}

	pub fn get_channel_output(&mut self, ch:Channel) -> Result<bool> {
		self.select(Selection::One(ch))?;
		let res:String = self.bus.query("SOUR:CHAN:OUTP?")?;
		scpi::parse_bool(&res)
	}

	pub fn get_channel_state(&mut self, ch:Channel) -> Result<ChannelState> {
		let set_voltage:f64      = single(self.get_channel_voltage_set(ch)?, "voltage set point")?;
		let set_current:f64      = single(self.get_channel_current_set(ch)?, "current set point")?;
		let measured_voltage:f64 = single(self.get_channel_voltage(ch)?, "voltage measurement")?;
		let measured_current:f64 = single(self.get_channel_current(ch)?, "current measurement")?;
		let output_enabled:bool  = self.get_channel_output(ch)?;

		Ok(ChannelState{ set_voltage, set_current, measured_voltage, measured_current, output_enabled })
	}

	pub fn get_full_state(&mut self) -> Result<State> {
		let identity = self.identify()?;

		let ch1 = self.get_channel_state(Channel::Ch1)?;
		let ch2 = self.get_channel_state(Channel::Ch2)?;
		let ch3 = self.get_channel_state(Channel::Ch3)?;

		Ok(State{ identity, ch1, ch2, ch3 })
	}

	fn shutdown(&mut self) -> Result<()> {
		self.closed = true;
		self.bus.write("SYST:LOC")?;
		self.bus.close()
	}

	// Returns the front panel to local control and releases the connection
	pub fn close(mut self) -> Result<()> {
		info!("Closing power supply connection");
		self.shutdown()
	}

}

impl<B: Bus> Drop for Keithley2230G<B> {

	fn drop(&mut self) {
		if !self.closed {
			if let Err(e) = self.shutdown() {
				warn!("Unable to release Keithley 2230G: {}", e);
			}
		}
	}

}
