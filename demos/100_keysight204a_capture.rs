use labctl::config::{LabConfig, ScopeConfig};
use labctl::devices::keysight204a::{ChannelSetup, Keysight204A, ScopeChannel, TriggerSettings, TriggerSweep};

const POINTS: usize = 10_000;
const TDIV_SEC: f64 = 1e-3;

fn main() -> Result<(), labctl::Error> {

    env_logger::init();

    let cfg:ScopeConfig = match std::env::var("LAB_CONFIG") {
        Ok(path) => LabConfig::from_file(path)?.scope.expect("no scope section in LAB_CONFIG"),
        Err(_) => ScopeConfig{ address: "TCPIP0::25.0.0.2::inst0::INSTR".to_owned(), bus: Default::default() },
    };

    let mut dev = Keysight204A::open(&cfg)?;
    println!("{:#?}", dev.identity());

    dev.set_channels(&[ChannelSetup::new(ScopeChannel::Ch1), ChannelSetup::new(ScopeChannel::Ch2)])?;
    dev.set_trigger(&TriggerSettings{ channel: ScopeChannel::Ch1, sweep: Some(TriggerSweep::Auto), level: Some(0.0) })?;
    dev.time_base(TDIV_SEC, 50)?;

    println!("{:#?}", dev.get_channel_settings(ScopeChannel::Ch1)?);
    println!("{:#?}", dev.get_time_base()?);

    for ch in &[ScopeChannel::Ch1, ScopeChannel::Ch2] {
        let path = dev.save_waveform(*ch, POINTS, format!("./ex100_ch{}", ch.number()))?;
        println!("{} -> {}", ch, path.display());
    }

    dev.close()
}
