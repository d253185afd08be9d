//! Realtek SoC gigabit Ethernet MAC driver core
//!
//! This crate holds the part of the RTD1xxx on-chip Ethernet driver that has
//! real algorithmic and concurrency content:
//!
//! - the TX/RX DMA descriptor rings and their ownership protocol
//!   ([`drivers::net::ethernet::realtek::r8169soc::tx`],
//!   [`drivers::net::ethernet::realtek::r8169soc::rx`])
//! - the interrupt, NAPI-style poll and deferred-work engine
//!   ([`drivers::net::ethernet::realtek::r8169soc::irq`],
//!   [`drivers::net::ethernet::realtek::r8169soc::work`])
//! - the wake-on-LAN rule compiler
//!   ([`drivers::net::ethernet::realtek::r8169soc::wol`])
//!
//! Around that core sit the administrative surface (vendor tool requests,
//! loopback self-test, diagnostic dumps, suspend/resume) and a smoltcp
//! device adapter in [`net::phy`].
//!
//! Per-chip clock/PLL/pinmux bring-up and the MDIO transport live behind the
//! [`ChipOps`](drivers::net::ethernet::realtek::r8169soc::chip::ChipOps)
//! strategy trait. MMIO, DMA mapping and the surrounding network stack are
//! reached through the traits in [`drivers::mmio`], [`drivers::dma`] and
//! [`drivers::net::netdev`].
//!
//! The crate is `no_std` + `alloc`. Unit tests run on the host.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod drivers;
pub mod net;
pub mod sync;

pub use drivers::net::ethernet::realtek::r8169soc::{Rtl8169Soc, chip::ChipOps, config::DeviceConfig};
pub use drivers::net::netdev::{NetStack, NetdevTx, NetworkError};

/// Log target prefix shared by every message the driver emits
pub(crate) const LOG_TAG: &str = "r8169soc";
