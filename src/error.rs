
use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
	#[error("Invalid channel: {0}")]
	InvalidChannel(String),

	#[error("{parameter} = {value} is out of range ({limit})")]
	OutOfRange { parameter: &'static str, value: f64, limit: &'static str },

	#[error("Instrument error {code}, \"{message}\" after command '{command}'")]
	Instrument { code: i32, message: String, command: String },

	#[error("Error queue query returned nothing after command '{command}'")]
	EmptyErrorQueueResponse { command: String },

	#[error("Connected to a device but it doesn't appear to be a {expected}: {idn}")]
	UnexpectedModel { expected: &'static str, idn: String },

	#[error("Verification of {channel} failed: {detail}")]
	VerificationFailed { channel: String, detail: String },

	#[error("Unable to parse {what} from response {response:?}")]
	Parse { what: &'static str, response: String },

	#[error("Requested {requested} waveform points, scope reported {reported} and sent {received}")]
	PointCount { requested: usize, reported: usize, received: usize },

	#[error("Invalid IEEE 488.2 block: {0}")]
	InvalidBlock(String),

	#[error("Invalid waveform file: {0}")]
	InvalidFile(String),

	#[error("Unsupported resource address: {0}")]
	UnsupportedAddress(String),

	#[error("VISA Error: {0}")]
	Visa(String),

	#[error("IO Error: {0}")]
	Io(#[from] io::Error),

	#[error("JSON Error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {

	pub(crate) fn parse(what:&'static str, response:&str) -> Self {
		Error::Parse{ what, response: response.to_owned() }
	}

	// Invalid-parameter errors are raised before anything reaches the bus
	pub fn is_invalid_parameter(&self) -> bool {
		matches!(self, Error::InvalidChannel(_) | Error::OutOfRange{ .. })
	}

}
