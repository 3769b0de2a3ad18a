
// Keysight Infiniium S-Series DSOS204A, four-channel oscilloscope.  Every command is followed by a
// read of the instrument error queue so a rejected command surfaces at the call that sent it.

use std::convert::TryFrom;
use std::fmt;
use std::ops::Drop;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info, warn};
use regex::Regex;
use serde::{Serialize, Deserialize};

use crate::bus::{self, Bus};
use crate::config::ScopeConfig;
use crate::error::{Error, Result};
use crate::scpi::{self, Identity};
use crate::waveform::{Scaling, Waveform};

pub const MODEL:&str = "204A";

pub const ERROR_QUERY:&str = ":SYSTem:ERRor? STRing";

// Bounds the error queue drain after a failure; the queue on these scopes is 30 entries deep
const MAX_QUEUED_ERRORS:usize = 32;

pub const TIME_SCALE_MIN:f64 = 5e-12;
pub const TIME_SCALE_MAX:f64 = 20.0;
pub const ATTENUATION_MIN:f64 = 1e-4;
pub const ATTENUATION_MAX:f64 = 1e3;

lazy_static! {
	static ref SOURCE_RE: Regex = Regex::new("(?i)CHAN(?:NEL)?\\s*(\\d)").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeChannel { Ch1, Ch2, Ch3, Ch4 }

impl ScopeChannel {

	pub const ALL:[ScopeChannel; 4] = [ScopeChannel::Ch1, ScopeChannel::Ch2, ScopeChannel::Ch3, ScopeChannel::Ch4];

	pub fn number(self) -> u8 {
		match self {
			ScopeChannel::Ch1 => 1,
			ScopeChannel::Ch2 => 2,
			ScopeChannel::Ch3 => 3,
			ScopeChannel::Ch4 => 4,
		}
	}

}

impl TryFrom<u8> for ScopeChannel {
	type Error = Error;

	fn try_from(n:u8) -> Result<Self> {
		match n {
			1 => Ok(ScopeChannel::Ch1),
			2 => Ok(ScopeChannel::Ch2),
			3 => Ok(ScopeChannel::Ch3),
			4 => Ok(ScopeChannel::Ch4),
			_ => Err(Error::InvalidChannel(format!("{} (the DSOS204A has four channels)", n))),
		}
	}
}

impl fmt::Display for ScopeChannel {
	fn fmt(&self, f:&mut fmt::Formatter) -> fmt::Result { write!(f, "CHANnel{}", self.number()) }
}

fn parse_source(resp:&str) -> Result<ScopeChannel> {
	let n:u8 = SOURCE_RE.captures(resp)
		.and_then(|c| c[1].parse::<u8>().ok())
		.ok_or_else(|| Error::parse("trigger source", resp))?;
	ScopeChannel::try_from(n)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerSweep { Triggered, Auto, Single }

impl TriggerSweep {
	pub fn as_str(self) -> &'static str {
		match self {
			TriggerSweep::Triggered => "TRIGGERED",
			TriggerSweep::Auto      => "AUTO",
			TriggerSweep::Single    => "SINGLE",
		}
	}
}

impl FromStr for TriggerSweep {
	type Err = Error;

	// The scope answers with the short form (TRIG, AUTO, SING)
	fn from_str(s:&str) -> Result<Self> {
		let s = s.trim().to_ascii_uppercase();
		if s.starts_with("TRIG")      { Ok(TriggerSweep::Triggered) }
		else if s.starts_with("AUTO") { Ok(TriggerSweep::Auto) }
		else if s.starts_with("SING") { Ok(TriggerSweep::Single) }
		else { Err(Error::parse("trigger sweep", &s)) }
	}
}

// DC and AC are 1 MOhm inputs, DC50 is 50 Ohm; LFR1/LFR2 (low-frequency reject) need an 1153A front end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Coupling { Dc, Dc50, Ac, Lfr1, Lfr2 }

impl Coupling {
	pub fn as_str(self) -> &'static str {
		match self {
			Coupling::Dc   => "DC",
			Coupling::Dc50 => "DC50",
			Coupling::Ac   => "AC",
			Coupling::Lfr1 => "LFR1",
			Coupling::Lfr2 => "LFR2",
		}
	}
}

impl FromStr for Coupling {
	type Err = Error;

	fn from_str(s:&str) -> Result<Self> {
		match s.trim().to_ascii_uppercase().as_str() {
			"DC"                => Ok(Coupling::Dc),
			"DC50" | "DCFIFTY" => Ok(Coupling::Dc50),
			"AC"                => Ok(Coupling::Ac),
			"LFR1"              => Ok(Coupling::Lfr1),
			"LFR2"              => Ok(Coupling::Lfr2),
			_                   => Err(Error::parse("input coupling", s)),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerSettings {
	pub channel: ScopeChannel,
	// None leaves the current setting alone
	pub sweep: Option<TriggerSweep>,
	pub level: Option<f64>,
}

impl Default for TriggerSettings {
	fn default() -> Self { Self{ channel: ScopeChannel::Ch1, sweep: None, level: None } }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeBase {
	pub scale: f64,
	pub position: f64,
	pub reference_percent: f64,
}

// What `set_channels` changes on one channel; None fields are not sent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelSetup {
	pub channel: ScopeChannel,
	pub attenuation: Option<f64>,
	pub display: Option<bool>,
	pub scale: Option<f64>,
	pub offset: Option<f64>,
	pub coupling: Option<Coupling>,
}

impl ChannelSetup {

	// Displayed, 1 V/div, no offset, DC coupled, attenuation as detected by the scope
	pub fn new(channel:ScopeChannel) -> Self {
		Self{ channel, attenuation: None, display: Some(true), scale: Some(1.0), offset: Some(0.0), coupling: Some(Coupling::Dc) }
	}

	pub fn unchanged(channel:ScopeChannel) -> Self {
		Self{ channel, attenuation: None, display: None, scale: None, offset: None, coupling: None }
	}

	fn validate(&self) -> Result<()> {
		if let Some(p) = self.attenuation {
			if !(ATTENUATION_MIN..=ATTENUATION_MAX).contains(&p) {
				return Err(Error::OutOfRange{ parameter: "attenuation ratio", value: p, limit: "1e-4 to 1e3" });
			}
		}
		if let Some(s) = self.scale {
			if !s.is_finite() || s <= 0.0 {
				return Err(Error::OutOfRange{ parameter: "vertical scale", value: s, limit: "must be positive" });
			}
		}
		if let Some(o) = self.offset {
			if !o.is_finite() {
				return Err(Error::OutOfRange{ parameter: "offset", value: o, limit: "must be finite" });
			}
		}
		Ok(())
	}

}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
	pub attenuation: f64,
	pub display: bool,
	pub scale: f64,
	pub offset: f64,
	pub coupling: Coupling,
}

pub struct Keysight204A<B: Bus = Box<dyn Bus>> {
	bus: B,
	identity: Identity,
	closed: bool,
}

impl Keysight204A<Box<dyn Bus>> {

	pub fn open(cfg:&ScopeConfig) -> Result<Self> {
		let bus = bus::open(&cfg.address, &cfg.bus)?;
		Self::with_bus(bus)
	}

}

impl<B: Bus> Keysight204A<B> {

	pub fn with_bus(mut bus:B) -> Result<Self> {
		bus.clear()?;

		let idn:String = bus.query("*IDN?")?;
		if !idn.contains(MODEL) {
			return Err(Error::UnexpectedModel{ expected: "Keysight DSOS204A", idn: idn.trim().to_owned() });
		}
		let identity = scpi::parse_idn(&idn)?;
		info!("Connected device: {}", idn.trim());

		let mut dev = Self{ bus, identity, closed: false };
		dev.check_instrument_errors("*IDN?")?;
		Ok(dev)
	}

	pub fn identity(&self) -> &Identity { &self.identity }

	pub fn do_command(&mut self, command:&str) -> Result<()> {
		self.bus.write(command)?;
		self.check_instrument_errors(command)
	}

	pub fn do_query_string(&mut self, query:&str) -> Result<String> {
		let res:String = self.bus.query(query)?;
		self.check_instrument_errors(query)?;
		Ok(res.trim_end().to_owned())
	}

	pub fn do_query_number(&mut self, query:&str) -> Result<f64> {
		let res:String = self.do_query_string(query)?;
		scpi::parse_number(&res)
	}

	pub fn do_query_ieee_block_i16(&mut self, query:&str) -> Result<Vec<i16>> {
		let samples:Vec<i16> = self.bus.query_binary(query)?;
		self.check_instrument_errors(query)?;
		Ok(samples)
	}

	// The first queued error is returned; anything queued behind it is drained and logged
	pub fn check_instrument_errors(&mut self, command:&str) -> Result<()> {
		let mut first:Option<scpi::ErrorQueueEntry> = None;

		for _ in 0..MAX_QUEUED_ERRORS {
			let res:String = self.bus.query(ERROR_QUERY)?;
			if res.trim().is_empty() {
				return Err(Error::EmptyErrorQueueResponse{ command: command.to_owned() });
			}

			let entry = scpi::parse_error_entry(&res)?;
			if entry.is_no_error() {
				break;
			}
			match first {
				None    => first = Some(entry),
				Some(_) => warn!("Further instrument error {}, \"{}\" after '{}'", entry.code, entry.message, command),
			}
		}

		match first {
			None    => Ok(()),
			Some(e) => Err(Error::Instrument{ code: e.code, message: e.message, command: command.to_owned() }),
		}
	}

	pub fn set_trigger(&mut self, trigger:&TriggerSettings) -> Result<()> {
		if let Some(level) = trigger.level {
			if !level.is_finite() {
				return Err(Error::OutOfRange{ parameter: "trigger level", value: level, limit: "must be finite" });
			}
		}

		if let Some(sweep) = trigger.sweep {
			self.do_command(&format!(":TRIGger:SWEep {}", sweep.as_str()))?;
		}
		self.do_command(&format!(":TRIGger:EDGE:SOURce {}", trigger.channel))?;
		if let Some(level) = trigger.level {
			self.do_command(&format!(":TRIGger:LEVel {},{}", trigger.channel, level))?;
		}
		Ok(())
	}

	pub fn get_trigger(&mut self) -> Result<TriggerSettings> {
		let sweep:TriggerSweep = self.do_query_string(":TRIGger:SWEep?")?.parse()?;
		let channel:ScopeChannel = parse_source(&self.do_query_string(":TRIGger:EDGE:SOURce?")?)?;
		let level:f64 = self.do_query_number(&format!(":TRIGger:LEVel? {}", channel))?;

		Ok(TriggerSettings{ channel, sweep: Some(sweep), level: Some(level) })
	}

	// `scale` is seconds per division; `reference_percent` puts the time reference 0 (left edge) to 100 (right edge) across the screen
	pub fn time_base(&mut self, scale:f64, reference_percent:u8) -> Result<()> {
		if !(TIME_SCALE_MIN..=TIME_SCALE_MAX).contains(&scale) {
			return Err(Error::OutOfRange{ parameter: "time scale", value: scale, limit: "5e-12 to 20 s/div" });
		}
		if reference_percent > 100 {
			return Err(Error::OutOfRange{ parameter: "reference percent", value: f64::from(reference_percent), limit: "0 to 100" });
		}

		self.do_command(&format!(":TIMebase:SCALe {}", scale))?;
		self.do_command(":TIMebase:POSition 0.0")?;
		self.do_command(&format!(":TIMebase:REFerence:PERCent {}", reference_percent))
	}

	pub fn get_time_base(&mut self) -> Result<TimeBase> {
		let scale:f64             = self.do_query_number(":TIMebase:SCALe?")?;
		let position:f64          = self.do_query_number(":TIMebase:POSition?")?;
		let reference_percent:f64 = self.do_query_number(":TIMebase:REFerence:PERCent?")?;

		Ok(TimeBase{ scale, position, reference_percent })
	}

	// Nothing is sent unless every setup is valid
	pub fn set_channels(&mut self, setups:&[ChannelSetup]) -> Result<()> {
		for setup in setups {
			setup.validate()?;
		}

		for setup in setups {
			let ch = setup.channel;
			if let Some(attenuation) = setup.attenuation {
				self.do_command(&format!(":{}:PROBe {}", ch, attenuation))?;
			}
			if let Some(display) = setup.display {
				self.do_command(&format!(":{}:DISPlay {}", ch, if display { 1 } else { 0 }))?;
			}
			if let Some(scale) = setup.scale {
				self.do_command(&format!(":{}:SCALe {}", ch, scale))?;
			}
			if let Some(offset) = setup.offset {
				self.do_command(&format!(":{}:OFFSet {}", ch, offset))?;
			}
			if let Some(coupling) = setup.coupling {
				self.do_command(&format!(":{}:INPut {}", ch, coupling.as_str()))?;
			}
			debug!("configured {:?}", setup);
		}
		Ok(())
	}

	pub fn get_channel_settings(&mut self, ch:ScopeChannel) -> Result<ChannelSettings> {
		// The attenuation reply carries a unit after the ratio, e.g. "10.000,RAT"
		let atten_res:String = self.do_query_string(&format!(":{}:PROBe?", ch))?;
		let attenuation:f64 = scpi::parse_number(atten_res.split(',').next().unwrap_or(""))?;

		let display:bool       = scpi::parse_bool(&self.do_query_string(&format!(":{}:DISPlay?", ch))?)?;
		let scale:f64          = self.do_query_number(&format!(":{}:SCALe?", ch))?;
		let offset:f64         = self.do_query_number(&format!(":{}:OFFSet?", ch))?;
		let coupling:Coupling  = self.do_query_string(&format!(":{}:INPut?", ch))?.parse()?;

		Ok(ChannelSettings{ attenuation, display, scale, offset, coupling })
	}

	pub fn get_scaling(&mut self) -> Result<Scaling> {
		let y_increment:f64 = self.do_query_number(":WAVeform:YINCrement?")?;
		let y_origin:f64    = self.do_query_number(":WAVeform:YORigin?")?;
		let x_increment:f64 = self.do_query_number(":WAVeform:XINCrement?")?;
		let x_origin:f64    = self.do_query_number(":WAVeform:XORigin?")?;

		Ok(Scaling{ y_increment, y_origin, x_increment, x_origin })
	}

	// Acquires `points` samples of a channel and scales them to seconds and volts.  Any other number of
	// samples in the transfer is an error.  The channel has to be displayed, otherwise the scope rejects
	// the source selection.
	pub fn retrieve_waveform(&mut self, ch:ScopeChannel, points:usize) -> Result<Waveform> {
		self.do_command(&format!(":ACQuire:POINts {}", points))?;
		self.do_command(":RUN")?;
		self.do_command(&format!(":WAVeform:SOURce channel{}", ch.number()))?;
		self.do_command(":WAVeform:FORMat word")?;
		self.do_command(":SYSTem:HEADer OFF")?;
		self.do_command(":WAVeform:STReaming OFF")?;

		let points_res:String = self.do_query_string(":WAVeform:POINts?")?;
		let reported:usize = points_res.trim().parse::<usize>().map_err(|_| Error::parse("point count", &points_res))?;
		let scaling:Scaling = self.get_scaling()?;
		let raw:Vec<i16> = self.do_query_ieee_block_i16(":WAVeform:DATA?")?;

		self.do_command(":RUN")?;

		if raw.len() != points {
			return Err(Error::PointCount{ requested: points, reported, received: raw.len() });
		}
		if reported != points {
			warn!("Scope reported {} points but sent the {} requested", reported, points);
		}
		debug!("retrieved {} samples from {} with {:?}", raw.len(), ch, scaling);

		Ok(scaling.apply(&raw))
	}

	// Retrieves a waveform and stores it as a two-column .npy array; returns the written path
	pub fn save_waveform<P: AsRef<Path>>(&mut self, ch:ScopeChannel, points:usize, path:P) -> Result<PathBuf> {
		let wf:Waveform = self.retrieve_waveform(ch, points)?;
		let written:PathBuf = wf.save(path)?;
		info!("Saved {} points from {} to {}", wf.len(), ch, written.display());
		Ok(written)
	}

	pub fn close(mut self) -> Result<()> {
		info!("Closing oscilloscope connection");
		self.closed = true;
		self.bus.close()
	}

}

impl<B: Bus> Drop for Keysight204A<B> {

	fn drop(&mut self) {
		if !self.closed {
			self.closed = true;
			if let Err(e) = self.bus.close() {
				warn!("Unable to release DSOS204A: {}", e);
			}
		}
	}

}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn channel_numbers() {
		assert_eq!(ScopeChannel::try_from(4).unwrap(), ScopeChannel::Ch4);
		assert!(ScopeChannel::try_from(0).unwrap_err().is_invalid_parameter());
		assert!(ScopeChannel::try_from(5).is_err());
		assert_eq!(ScopeChannel::Ch2.to_string(), "CHANnel2");
	}

	#[test]
	fn trigger_sources() {
		assert_eq!(parse_source("CHAN3").unwrap(), ScopeChannel::Ch3);
		assert_eq!(parse_source("CHANnel1\n").unwrap(), ScopeChannel::Ch1);
		assert!(parse_source("AUX").is_err());
	}

	#[test]
	fn sweep_short_forms() {
		assert_eq!("TRIG".parse::<TriggerSweep>().unwrap(), TriggerSweep::Triggered);
		assert_eq!("AUTO\n".parse::<TriggerSweep>().unwrap(), TriggerSweep::Auto);
		assert_eq!("SING".parse::<TriggerSweep>().unwrap(), TriggerSweep::Single);
	}

	#[test]
	fn couplings() {
		assert_eq!("DCFifty".parse::<Coupling>().unwrap(), Coupling::Dc50);
		assert_eq!("LFR2".parse::<Coupling>().unwrap(), Coupling::Lfr2);
		assert!("GND".parse::<Coupling>().is_err());
	}

	#[test]
	fn setup_validation() {
		let mut s = ChannelSetup::new(ScopeChannel::Ch1);
		assert!(s.validate().is_ok());
		s.attenuation = Some(1e4);
		assert!(s.validate().is_err());
		s.attenuation = Some(10.0);
		s.scale = Some(0.0);
		assert!(s.validate().is_err());
		assert!(ChannelSetup::unchanged(ScopeChannel::Ch4).validate().is_ok());
	}
}
