//! Network device drivers and abstractions

pub mod ethernet;
pub mod netdev;

pub use netdev::*;
