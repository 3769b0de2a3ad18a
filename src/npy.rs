
// Dense two-column f64 arrays in NumPy's .npy format (version 1.0, little-endian `<f8`, shape (n, 2)),
// so saved waveforms load directly with `numpy.load`.

use std::io::{ErrorKind, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use regex::Regex;

use crate::error::{Error, Result};

pub const MAGIC:&[u8] = b"\x93NUMPY";

// Header plus preamble is padded to a multiple of this
const HEADER_ALIGN:usize = 64;

// Upper bound on what is reserved up front; the rest grows as data actually arrives
const MAX_PREALLOC:usize = 1 << 20;

lazy_static! {
	static ref DESCR_RE: Regex   = Regex::new("'descr'\\s*:\\s*'([<>|=]?)(f8|d)'").unwrap();
	static ref FORTRAN_RE: Regex = Regex::new("'fortran_order'\\s*:\\s*(True|False)").unwrap();
	static ref SHAPE_RE: Regex   = Regex::new("'shape'\\s*:\\s*\\(\\s*(\\d+)\\s*,\\s*2\\s*\\)").unwrap();
}

fn invalid(msg:&str) -> Error { Error::InvalidFile(msg.to_owned()) }

pub fn write_columns<W: Write>(w:&mut W, rows:&[[f64; 2]]) -> Result<()> {
	let mut header = format!("{{'descr': '<f8', 'fortran_order': False, 'shape': ({}, 2), }}", rows.len());
	let preamble = MAGIC.len() + 2 + 2;
	let pad = (HEADER_ALIGN - (preamble + header.len() + 1) % HEADER_ALIGN) % HEADER_ALIGN;
	header.extend(std::iter::repeat(' ').take(pad));
	header.push('\n');

	w.write_all(MAGIC)?;
	w.write_all(&[1, 0])?;
	w.write_u16::<LittleEndian>(header.len() as u16)?;
	w.write_all(header.as_bytes())?;
	for row in rows {
		w.write_f64::<LittleEndian>(row[0])?;
		w.write_f64::<LittleEndian>(row[1])?;
	}
	w.flush()?;
	Ok(())
}

pub fn read_columns<R: Read>(r:&mut R) -> Result<Vec<[f64; 2]>> {
	let mut magic = [0u8; 6];
	r.read_exact(&mut magic)?;
	if &magic[..] != MAGIC { return Err(invalid("not a .npy file")); }

	let major = r.read_u8()?;
	let _minor = r.read_u8()?;
	let header_len:usize = match major {
		1     => r.read_u16::<LittleEndian>()? as usize,
		2 | 3 => r.read_u32::<LittleEndian>()? as usize,
		_     => return Err(Error::InvalidFile(format!("unsupported .npy version {}", major))),
	};

	let mut header = vec![0u8; header_len];
	r.read_exact(&mut header)?;
	let header = String::from_utf8_lossy(&header);

	let descr = DESCR_RE.captures(&header).ok_or_else(|| invalid("array is not float64"))?;
	let big_endian = &descr[1] == ">";
	let fortran_order = FORTRAN_RE.captures(&header).map(|c| &c[1] == "True")
		.ok_or_else(|| invalid("missing fortran_order"))?;
	let n:usize = SHAPE_RE.captures(&header)
		.and_then(|c| c[1].parse::<usize>().ok())
		.ok_or_else(|| invalid("array is not two columns wide"))?;

	let count:usize = n.checked_mul(2).ok_or_else(|| invalid("row count overflows"))?;

	let mut values:Vec<f64> = Vec::with_capacity(count.min(MAX_PREALLOC));
	for _ in 0..count {
		let v = if big_endian { r.read_f64::<byteorder::BigEndian>() } else { r.read_f64::<LittleEndian>() };
		match v {
			Ok(x) => values.push(x),
			Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
				return Err(Error::InvalidFile(format!("header announces {} rows but the data ends after {} values", n, values.len())));
			},
			Err(e) => return Err(e.into()),
		}
	}

	let rows:Vec<[f64; 2]> = if fortran_order {
		(0..n).map(|i| [values[i], values[n + i]]).collect()
	} else {
		values.chunks(2).map(|c| [c[0], c[1]]).collect()
	};
	Ok(rows)
}
