
use std::fs;

use labctl::waveform::{Scaling, Waveform};

#[test]
fn saved_waveform_loads_back_exactly() {
	let dir = tempfile::tempdir().unwrap();
	let scaling = Scaling{ y_increment: 1.0 / 3.0, y_origin: -0.1, x_increment: 1e-9 / 7.0, x_origin: -2.5e-7 };
	let raw:Vec<i16> = (-500..500).map(|i| (i * 37) as i16).collect();
	let wf = scaling.apply(&raw);

	let path = wf.save(dir.path().join("trace")).unwrap();
	assert_eq!(path.extension().unwrap(), "npy");

	let loaded = Waveform::load(&path).unwrap();
	assert_eq!(loaded.len(), raw.len());
	for (a, b) in loaded.points().zip(wf.points()) {
		assert_eq!(a.0.to_bits(), b.0.to_bits());
		assert_eq!(a.1.to_bits(), b.1.to_bits());
	}
}

#[test]
fn explicit_npy_extension_is_kept() {
	let dir = tempfile::tempdir().unwrap();
	let wf = Waveform::from_rows(&[[0.0, 1.5], [1e-6, -1.5]]);

	let path = wf.save(dir.path().join("pulse.npy")).unwrap();
	assert_eq!(path, dir.path().join("pulse.npy"));
	assert!(!dir.path().join("pulse.npy.npy").exists());
}

#[test]
fn empty_waveform() {
	let dir = tempfile::tempdir().unwrap();
	let path = Waveform::default().save(dir.path().join("empty")).unwrap();

	let loaded = Waveform::load(&path).unwrap();
	assert!(loaded.is_empty());
	assert_eq!(loaded.time().len(), loaded.voltage().len());
}

#[test]
fn file_is_a_float64_array_with_two_columns() {
	let dir = tempfile::tempdir().unwrap();
	let wf = Waveform::from_rows(&[[0.0, 0.25], [1.0, 0.5], [2.0, 0.75]]);
	let path = wf.save(dir.path().join("three")).unwrap();

	let bytes = fs::read(&path).unwrap();
	assert_eq!(&bytes[..6], b"\x93NUMPY");
	assert_eq!(&bytes[6..8], &[1, 0]);

	let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
	let header = std::str::from_utf8(&bytes[10..10 + header_len]).unwrap();
	assert!(header.contains("'descr': '<f8'"));
	assert!(header.contains("'fortran_order': False"));
	assert!(header.contains("'shape': (3, 2)"));

	// Row-major: time and voltage interleaved
	let data = &bytes[10 + header_len..];
	assert_eq!(data.len(), 3 * 2 * 8);
	let second_voltage = f64::from_le_bytes([data[24], data[25], data[26], data[27], data[28], data[29], data[30], data[31]]);
	assert_eq!(second_voltage, 0.5);
}

#[test]
fn garbage_is_not_a_waveform() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("junk.npy");
	fs::write(&path, b"this is not numpy data at all").unwrap();
	assert!(Waveform::load(&path).is_err());
	assert!(Waveform::load(dir.path().join("missing.npy")).is_err());
}

#[test]
fn absurd_row_count_is_an_invalid_file() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("huge.npy");

	let header = "{'descr': '<f8', 'fortran_order': False, 'shape': (1099511627776, 2), }\n";
	let mut bytes:Vec<u8> = b"\x93NUMPY\x01\x00".to_vec();
	bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
	bytes.extend_from_slice(header.as_bytes());
	bytes.extend_from_slice(&1.0f64.to_le_bytes());
	fs::write(&path, &bytes).unwrap();

	match Waveform::load(&path) {
		Err(labctl::Error::InvalidFile(_)) => { },
		other => panic!("expected an invalid file, got {:?}", other),
	}
}
