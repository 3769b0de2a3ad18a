use std::time::Duration;

use labctl::config::{LabConfig, PowerSupplyConfig};
use labctl::devices::keithley2230g::{Channel, ConnectMode, Keithley2230G, Selection};

fn main() -> Result<(), labctl::Error> {

    env_logger::init();

    // LAB_CONFIG points at a JSON file like {"power_supply": {"address": "TCPIP0::25.0.0.1::gpib0,5::INSTR"}}
    let cfg:PowerSupplyConfig = match std::env::var("LAB_CONFIG") {
        Ok(path) => LabConfig::from_file(path)?.power_supply.expect("no power_supply section in LAB_CONFIG"),
        Err(_) => PowerSupplyConfig{ address: "TCPIP0::25.0.0.1::gpib0,5::INSTR".to_owned(), mode: ConnectMode::ResetAndVerify, bus: Default::default() },
    };

    let mut dev = Keithley2230G::open(&cfg)?;

    println!("{}", serde_json::to_string_pretty(&dev.get_full_state()?)?);

    dev.set_channel_current(Channel::Ch1, 0.1)?;
    dev.set_channel_voltage(Channel::Ch1, 5.0)?;
    dev.set_channel_output(Channel::Ch1, true)?;

    std::thread::sleep(Duration::from_secs(5));

    println!("CH1 {:?} V, {:?} A", dev.get_channel_voltage(Channel::Ch1)?, dev.get_channel_current(Channel::Ch1)?);
    println!("All channels {:?} V", dev.get_channel_voltage(Selection::All)?);

    dev.set_channel_output(Channel::Ch1, false)?;
    dev.close()
}
