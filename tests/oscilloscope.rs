
use std::convert::TryFrom;

use labctl::bus::MockBus;
use labctl::devices::keysight204a::{ChannelSetup, Coupling, Keysight204A, ScopeChannel, TriggerSettings, TriggerSweep, ERROR_QUERY};
use labctl::waveform::Waveform;
use labctl::Error;

const IDN:&str = "KEYSIGHT TECHNOLOGIES,DSOS204A,MY56270133,06.10.00801\n";
const NO_ERROR:&str = "0,\"No error\"\n";

fn bus() -> MockBus {
	let mock = MockBus::new();
	mock.respond_to("*IDN?", IDN);
	mock.respond_to(ERROR_QUERY, NO_ERROR);
	mock
}

fn connect(mock:&MockBus) -> Keysight204A<MockBus> {
	let scope = Keysight204A::with_bus(mock.clone()).unwrap();
	mock.forget_writes();
	scope
}

// Commands sent, without the error queue polls in between
fn commands(mock:&MockBus) -> Vec<String> {
	mock.writes().into_iter().filter(|w| w != ERROR_QUERY).collect()
}

fn script_waveform(mock:&MockBus, samples:&[i16], y_inc:&str, y_org:&str, x_inc:&str, x_org:&str) {
	let mut block:Vec<u8> = format!("#{}{}", (samples.len() * 2).to_string().len(), samples.len() * 2).into_bytes();
	for s in samples { block.extend_from_slice(&s.to_be_bytes()); }
	block.push(b'\n');

	mock.respond_to(":WAVeform:POINts?", format!("{}\n", samples.len()));
	mock.respond_to(":WAVeform:YINCrement?", format!("{}\n", y_inc));
	mock.respond_to(":WAVeform:YORigin?", format!("{}\n", y_org));
	mock.respond_to(":WAVeform:XINCrement?", format!("{}\n", x_inc));
	mock.respond_to(":WAVeform:XORigin?", format!("{}\n", x_org));
	mock.respond_to(":WAVeform:DATA?", block);
}

#[test]
fn connect_clears_and_identifies() {
	let mock = bus();
	let scope = Keysight204A::with_bus(mock.clone()).unwrap();

	assert_eq!(mock.clears(), 1);
	assert_eq!(mock.writes(), vec!["*IDN?", ERROR_QUERY]);
	assert_eq!(scope.identity().model, "DSOS204A");
}

#[test]
fn wrong_model_is_rejected() {
	let mock = MockBus::new();
	mock.respond_to("*IDN?", "Keithley instruments, 2230G-30-1, 9203514, 1.16-1.04\n");

	match Keysight204A::with_bus(mock) {
		Err(Error::UnexpectedModel{ .. }) => { },
		Err(e) => panic!("unexpected error {}", e),
		Ok(_)  => panic!("connected to the wrong instrument"),
	}
}

#[test]
fn every_command_polls_the_error_queue() {
	let mock = bus();
	let mut scope = connect(&mock);

	scope.do_command(":RUN").unwrap();
	assert_eq!(mock.writes(), vec![":RUN", ERROR_QUERY]);
}

#[test]
fn retrieve_waveform_command_sequence_and_scaling() {
	let mock = bus();
	let mut scope = connect(&mock);
	script_waveform(&mock, &[0, 1, 2], "0.01", "-1.0", "1e-6", "0");

	let wf = scope.retrieve_waveform(ScopeChannel::Ch2, 3).unwrap();

	assert_eq!(commands(&mock), vec![
		":ACQuire:POINts 3",
		":RUN",
		":WAVeform:SOURce channel2",
		":WAVeform:FORMat word",
		":SYSTem:HEADer OFF",
		":WAVeform:STReaming OFF",
		":WAVeform:POINts?",
		":WAVeform:YINCrement?",
		":WAVeform:YORigin?",
		":WAVeform:XINCrement?",
		":WAVeform:XORigin?",
		":WAVeform:DATA?",
		":RUN",
	]);

	assert_eq!(wf.len(), 3);
	assert_eq!(wf.time(), &[0.0, 1e-6, 2e-6]);
	for (v, expected) in wf.voltage().iter().zip(&[-1.0, -0.99, -0.98]) {
		assert!((v - expected).abs() < 1e-12, "{} != {}", v, expected);
	}
}

#[test]
fn waveform_length_matches_requested_points() {
	for n in &[0usize, 1, 250, 4096] {
		let mock = bus();
		let mut scope = connect(&mock);
		let samples:Vec<i16> = (0..*n).map(|i| (i % 512) as i16 - 256).collect();
		script_waveform(&mock, &samples, "7.8e-5", "0.0", "2.5e-11", "-5e-8");

		let wf = scope.retrieve_waveform(ScopeChannel::Ch1, *n).unwrap();
		assert_eq!(wf.time().len(), *n);
		assert_eq!(wf.voltage().len(), *n);
	}
}

#[test]
fn short_transfer_is_an_error() {
	let mock = bus();
	let mut scope = connect(&mock);
	script_waveform(&mock, &[5, 6, 7], "1", "0", "1", "0");

	match scope.retrieve_waveform(ScopeChannel::Ch1, 4) {
		Err(Error::PointCount{ requested, reported, received }) => {
			assert_eq!(requested, 4);
			assert_eq!(reported, 3);
			assert_eq!(received, 3);
		},
		other => panic!("expected a point count error, got {:?}", other),
	}
	// Acquisition is restarted before the error is returned
	assert_eq!(commands(&mock).last().map(String::as_str), Some(":RUN"));
}

#[test]
fn instrument_errors_are_recoverable() {
	let mock = bus();
	let mut scope = connect(&mock);
	mock.queue_response(ERROR_QUERY, "-221,\"Settings conflict\"\n");

	match scope.do_command(":WAVeform:SOURce channel3") {
		Err(Error::Instrument{ code, message, command }) => {
			assert_eq!(code, -221);
			assert_eq!(message, "Settings conflict");
			assert_eq!(command, ":WAVeform:SOURce channel3");
		},
		other => panic!("expected an instrument error, got {:?}", other),
	}

	// The controller is still usable afterwards
	scope.do_command(":RUN").unwrap();
}

#[test]
fn queued_errors_are_drained() {
	let mock = bus();
	let mut scope = connect(&mock);
	mock.queue_response(ERROR_QUERY, "-113,\"Undefined header\"\n");
	mock.queue_response(ERROR_QUERY, "-222,\"Data out of range\"\n");

	match scope.do_command(":BOGus") {
		Err(Error::Instrument{ code, .. }) => assert_eq!(code, -113),
		other => panic!("expected an instrument error, got {:?}", other),
	}
	assert_eq!(mock.count(ERROR_QUERY), 3);

	mock.forget_writes();
	scope.do_command(":RUN").unwrap();
	assert_eq!(mock.count(ERROR_QUERY), 1);
}

#[test]
fn undisplayed_channel_aborts_the_acquisition() {
	let mock = bus();
	let mut scope = connect(&mock);
	script_waveform(&mock, &[1, 2, 3], "1", "0", "1", "0");

	// Errors only show up after the source selection
	mock.queue_response(ERROR_QUERY, NO_ERROR);
	mock.queue_response(ERROR_QUERY, NO_ERROR);
	mock.queue_response(ERROR_QUERY, "-221,\"Settings conflict;Channel is not displayed\"\n");

	match scope.retrieve_waveform(ScopeChannel::Ch4, 3) {
		Err(Error::Instrument{ command, .. }) => assert_eq!(command, ":WAVeform:SOURce channel4"),
		other => panic!("expected an instrument error, got {:?}", other),
	}
	assert!(!commands(&mock).contains(&":WAVeform:DATA?".to_owned()));
}

#[test]
fn empty_error_queue_reply_is_an_error() {
	let mock = bus();
	let mut scope = connect(&mock);
	mock.queue_response(ERROR_QUERY, "\n");

	match scope.do_command(":RUN") {
		Err(Error::EmptyErrorQueueResponse{ command }) => assert_eq!(command, ":RUN"),
		other => panic!("expected an empty error queue response, got {:?}", other),
	}
}

#[test]
fn trigger_setup() {
	let mock = bus();
	let mut scope = connect(&mock);

	scope.set_trigger(&TriggerSettings{ channel: ScopeChannel::Ch2, sweep: Some(TriggerSweep::Auto), level: Some(0.5) }).unwrap();
	assert_eq!(commands(&mock), vec![":TRIGger:SWEep AUTO", ":TRIGger:EDGE:SOURce CHANnel2", ":TRIGger:LEVel CHANnel2,0.5"]);

	mock.forget_writes();
	scope.set_trigger(&TriggerSettings::default()).unwrap();
	assert_eq!(commands(&mock), vec![":TRIGger:EDGE:SOURce CHANnel1"]);
}

#[test]
fn trigger_readback() {
	let mock = bus();
	let mut scope = connect(&mock);
	mock.respond_to(":TRIGger:SWEep?", "TRIG\n");
	mock.respond_to(":TRIGger:EDGE:SOURce?", "CHAN3\n");
	mock.respond_to(":TRIGger:LEVel? CHANnel3", "1.2E-01\n");

	let trig = scope.get_trigger().unwrap();
	assert_eq!(trig.channel, ScopeChannel::Ch3);
	assert_eq!(trig.sweep, Some(TriggerSweep::Triggered));
	assert_eq!(trig.level, Some(0.12));
}

#[test]
fn time_base_validation_and_commands() {
	let mock = bus();
	let mut scope = connect(&mock);

	assert!(scope.time_base(30.0, 50).unwrap_err().is_invalid_parameter());
	assert!(scope.time_base(1e-13, 50).unwrap_err().is_invalid_parameter());
	assert!(scope.time_base(1e-3, 101).unwrap_err().is_invalid_parameter());
	assert!(mock.writes().is_empty());

	scope.time_base(0.001, 10).unwrap();
	assert_eq!(commands(&mock), vec![":TIMebase:SCALe 0.001", ":TIMebase:POSition 0.0", ":TIMebase:REFerence:PERCent 10"]);
}

#[test]
fn channel_setup_defaults() {
	let mock = bus();
	let mut scope = connect(&mock);

	scope.set_channels(&[ChannelSetup::new(ScopeChannel::Ch1)]).unwrap();
	assert_eq!(commands(&mock), vec![":CHANnel1:DISPlay 1", ":CHANnel1:SCALe 1", ":CHANnel1:OFFSet 0", ":CHANnel1:INPut DC"]);
}

#[test]
fn channel_setup_is_validated_before_sending_anything() {
	let mock = bus();
	let mut scope = connect(&mock);

	let good = ChannelSetup::new(ScopeChannel::Ch1);
	let mut bad = ChannelSetup::new(ScopeChannel::Ch2);
	bad.attenuation = Some(5e3);

	assert!(scope.set_channels(&[good, bad]).unwrap_err().is_invalid_parameter());
	assert!(mock.writes().is_empty());
}

#[test]
fn channel_setup_sends_only_given_fields() {
	let mock = bus();
	let mut scope = connect(&mock);

	let mut setup = ChannelSetup::unchanged(ScopeChannel::Ch4);
	setup.attenuation = Some(10.0);
	setup.coupling = Some(Coupling::Dc50);
	scope.set_channels(&[setup]).unwrap();
	assert_eq!(commands(&mock), vec![":CHANnel4:PROBe 10", ":CHANnel4:INPut DC50"]);
}

#[test]
fn channel_settings_readback() {
	let mock = bus();
	let mut scope = connect(&mock);
	mock.respond_to(":CHANnel1:PROBe?", "10.000,RAT\n");
	mock.respond_to(":CHANnel1:DISPlay?", "1\n");
	mock.respond_to(":CHANnel1:SCALe?", "5.00E-01\n");
	mock.respond_to(":CHANnel1:OFFSet?", "0.0E+00\n");
	mock.respond_to(":CHANnel1:INPut?", "DC50\n");

	let s = scope.get_channel_settings(ScopeChannel::try_from(1).unwrap()).unwrap();
	assert_eq!(s.attenuation, 10.0);
	assert!(s.display);
	assert_eq!(s.scale, 0.5);
	assert_eq!(s.offset, 0.0);
	assert_eq!(s.coupling, Coupling::Dc50);
}

#[test]
fn save_waveform_round_trips_through_the_file() {
	let dir = tempfile::tempdir().unwrap();
	let mock = bus();
	let mut scope = connect(&mock);
	script_waveform(&mock, &[-300, 0, 17, 32767, -32768], "3.1e-5", "0.25", "1.25e-10", "-2.5e-9");

	let written = scope.save_waveform(ScopeChannel::Ch1, 5, dir.path().join("capture")).unwrap();
	assert_eq!(written, dir.path().join("capture.npy"));

	// A second retrieval is scaled the same way, so the file has to reproduce it bit for bit
	let expected = scope.retrieve_waveform(ScopeChannel::Ch1, 5).unwrap();
	let loaded = Waveform::load(&written).unwrap();
	assert_eq!(loaded, expected);
}

#[test]
fn close_releases_the_bus() {
	let mock = bus();
	let scope = connect(&mock);
	scope.close().unwrap();
	assert!(mock.is_closed());
}
