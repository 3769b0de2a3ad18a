
// One module per instrument model.  Each controller owns its bus and releases it on close or drop.

pub mod keithley2230g;
pub mod keysight204a;

pub use self::keithley2230g::Keithley2230G;
pub use self::keysight204a::Keysight204A;
