//! Device drivers subsystem
//!
//! Organized by device class, Linux style:
//! - `mmio`: register access and barriers
//! - `dma`: coherent allocation and streaming mappings
//! - `net`: network device drivers
//! - `platform`: delays and deferred-work scheduling supplied by the host

pub mod dma;
pub mod mmio;
pub mod net;
pub mod platform;
