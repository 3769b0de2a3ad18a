
#[macro_use]
extern crate lazy_static;

// External data representation, a protocol for serializing data to be sent over the network
pub mod xdr;

// Remote procedure call, a protocol built on top of XDR to provide something like C-style function calls over the network
pub mod rpc;

// A protocol using RPC that's meant to communicate with instruments like oscilloscopes, power supplies, waveform generators, etc
pub mod vxi11;

// Command/response transports the instrument controllers are written against
pub mod bus;

pub mod scpi;

pub mod waveform;
pub mod npy;

pub mod config;
pub mod error;

// Controllers for the supported instruments
pub mod devices;

pub use crate::error::{Error, Result};
