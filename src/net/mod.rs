//! Network stack glue
//!
//! Packet buffers, Ethernet addressing and the bridge that lets a smoltcp
//! interface run on top of the driver.

pub mod ethernet;
pub mod phy;
pub mod queue;
pub mod skbuff;

pub use ethernet::{EthernetFrame, MacAddress};
pub use queue::SkBuffQueue;
pub use skbuff::{RxChecksum, SkBuff, SkBuffError, TxChecksum, TxOffload};
