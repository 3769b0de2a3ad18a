
// Parsing of the text and binary replies that SCPI instruments send back

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};
use regex::Regex;
use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};

lazy_static! {
	static ref IDN_RE: Regex = Regex::new("([^,]+),([^,]+),([^,]+),\\s*([^,\\s]+)").unwrap();
	static ref ERR_RE: Regex = Regex::new("^\\s*([+-]?\\d+)\\s*(?:,\\s*\"?([^\"]*)\"?)?\\s*$").unwrap();
}

// Where the '#' of a block may start at the latest; some instruments prefix the block with a header echo
const MAX_BLOCK_PREFIX:usize = 25;

// Largest binary block any transport accepts; a DSOS204A memory depth of 100 Mpts in WORD format is 200 MB
pub const MAX_BLOCK_LEN:usize = 256 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
	pub manufacturer: String,
	pub model: String,
	pub serial_num: String,
	pub fw_version: String,
}

pub fn parse_idn(resp:&str) -> Result<Identity> {
	let caps = IDN_RE.captures(resp).ok_or_else(|| Error::parse("*IDN? reply", resp))?;
	let field = |i:usize| caps.get(i).map(|m| m.as_str().trim().to_owned()).unwrap_or_default();

	Ok(Identity{ manufacturer: field(1), model: field(2), serial_num: field(3), fw_version: field(4) })
}

pub fn parse_number(resp:&str) -> Result<f64> {
	resp.trim().parse::<f64>().map_err(|_| Error::parse("number", resp))
}

pub fn parse_numbers(resp:&str) -> Result<Vec<f64>> {
	resp.trim().split(',').map(parse_number).collect()
}

pub fn parse_bool(resp:&str) -> Result<bool> {
	match resp.trim().to_ascii_uppercase().as_str() {
		"1" | "ON"  => Ok(true),
		"0" | "OFF" => Ok(false),
		_           => Err(Error::parse("boolean", resp)),
	}
}

// One entry of the instrument error queue; code 0 means the queue is empty
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorQueueEntry {
	pub code: i32,
	pub message: String,
}

impl ErrorQueueEntry {
	pub fn is_no_error(&self) -> bool { self.code == 0 }
}

pub fn parse_error_entry(resp:&str) -> Result<ErrorQueueEntry> {
	let caps = ERR_RE.captures(resp).ok_or_else(|| Error::parse("error queue entry", resp))?;
	let code:i32 = caps.get(1)
		.and_then(|m| m.as_str().trim_start_matches('+').parse::<i32>().ok())
		.ok_or_else(|| Error::parse("error code", resp))?;
	let message = caps.get(2).map(|m| m.as_str().to_owned()).unwrap_or_default();
	Ok(ErrorQueueEntry{ code, message })
}

// Returns the payload of an IEEE 488.2 block: `#<n><n length digits><payload>`, or `#0<payload>\n`
pub fn parse_block(rx:&[u8]) -> Result<&[u8]> {
	let begin = rx.iter().position(|x| *x == b'#')
		.ok_or_else(|| Error::InvalidBlock("no '#' in reply".to_owned()))?;
	if begin > MAX_BLOCK_PREFIX {
		return Err(Error::InvalidBlock(format!("'#' found at offset {}", begin)));
	}

	let n_digits = rx.get(begin + 1)
		.and_then(|d| (*d as char).to_digit(10))
		.ok_or_else(|| Error::InvalidBlock("missing length digit count".to_owned()))? as usize;

	let offset = begin + 2 + n_digits;
	if offset > rx.len() {
		return Err(Error::InvalidBlock("truncated length header".to_owned()));
	}

	if n_digits == 0 {
		// Indefinite length, runs to the terminating newline
		let body = &rx[offset..];
		return Ok(body.strip_suffix(b"\n").unwrap_or(body));
	}

	let len_str = std::str::from_utf8(&rx[begin + 2..offset])
		.map_err(|_| Error::InvalidBlock("length header is not ASCII".to_owned()))?;
	let data_length:usize = len_str.parse::<usize>()
		.map_err(|_| Error::InvalidBlock(format!("bad length {:?}", len_str)))?;
	check_block_len(data_length)?;

	if offset + data_length > rx.len() {
		return Err(Error::InvalidBlock(format!("header announces {} bytes but only {} arrived", data_length, rx.len() - offset)));
	}
	Ok(&rx[offset..offset + data_length])
}

pub fn check_block_len(len:usize) -> Result<()> {
	if len > MAX_BLOCK_LEN {
		return Err(Error::InvalidBlock(format!("announced length {} exceeds the {} byte limit", len, MAX_BLOCK_LEN)));
	}
	Ok(())
}

// WORD format samples arrive most significant byte first
pub fn decode_i16_be(payload:&[u8]) -> Result<Vec<i16>> {
	if payload.len() % 2 != 0 {
		return Err(Error::InvalidBlock(format!("odd payload length {} for 16-bit samples", payload.len())));
	}
	let mut rdr = Cursor::new(payload);
	let mut ans:Vec<i16> = Vec::with_capacity(payload.len() / 2);
	for _ in 0..payload.len() / 2 {
		ans.push(rdr.read_i16::<BigEndian>()?);
	}
	Ok(ans)
}
