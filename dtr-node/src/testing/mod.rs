//! Test support: a simulated broadcast channel and the radios attached
//! to it.

pub mod hub;

pub use hub::{SimulatedRadio, VirtualRadioHub, WireRecord};
