
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};

use crate::error::Result;
use crate::npy;

/// The four coefficients an oscilloscope reports alongside raw samples. Together they map sample
/// index `i` and raw value `r` to physical units:
///
/// ```text
/// voltage = y_increment * r + y_origin
/// time    = x_increment * i + x_origin
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scaling {
	pub y_increment: f64,
	pub y_origin: f64,
	pub x_increment: f64,
	pub x_origin: f64,
}

impl Scaling {

	pub fn voltage(&self, raw:i16) -> f64 { self.y_increment * f64::from(raw) + self.y_origin }

	pub fn time(&self, index:usize) -> f64 { self.x_increment * index as f64 + self.x_origin }

	/// Converts raw samples into a waveform with one time value per sample.
	pub fn apply(&self, raw:&[i16]) -> Waveform {
		Waveform {
			time: (0..raw.len()).map(|i| self.time(i)).collect(),
			voltage: raw.iter().map(|r| self.voltage(*r)).collect(),
		}
	}

}

/// A scaled acquisition: parallel time (s) and voltage (V) columns of equal length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Waveform {
	time: Vec<f64>,
	voltage: Vec<f64>,
}

impl Waveform {

	/// Builds a waveform from `(time, voltage)` rows.
	pub fn from_rows(rows:&[[f64; 2]]) -> Self {
		Self {
			time: rows.iter().map(|r| r[0]).collect(),
			voltage: rows.iter().map(|r| r[1]).collect(),
		}
	}

	pub fn time(&self) -> &[f64] { &self.time }
	pub fn voltage(&self) -> &[f64] { &self.voltage }

	pub fn len(&self) -> usize { self.time.len() }
	pub fn is_empty(&self) -> bool { self.time.is_empty() }

	pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
		self.time.iter().copied().zip(self.voltage.iter().copied())
	}

	pub fn rows(&self) -> Vec<[f64; 2]> { self.points().map(|(t, v)| [t, v]).collect() }

	/// Writes the waveform as an `(n, 2)` float64 `.npy` array, column 0 time and column 1 voltage.
	/// `.npy` is appended to the file name when missing; the path actually written is returned.
	pub fn save<P: AsRef<Path>>(&self, path:P) -> Result<PathBuf> {
		let path = npy_path(path.as_ref());
		let mut w = BufWriter::new(File::create(&path)?);
		npy::write_columns(&mut w, &self.rows())?;
		Ok(path)
	}

	/// Reads a waveform written by [`Waveform::save`] (or by `numpy.save` with the same layout).
	pub fn load<P: AsRef<Path>>(path:P) -> Result<Self> {
		let mut r = BufReader::new(File::open(path)?);
		let rows = npy::read_columns(&mut r)?;
		Ok(Self::from_rows(&rows))
	}

}

pub fn npy_path(path:&Path) -> PathBuf {
	if path.extension().map_or(false, |e| e == "npy") {
		return path.to_path_buf();
	}
	let mut name:OsString = path.as_os_str().to_owned();
	name.push(".npy");
	PathBuf::from(name)
}
