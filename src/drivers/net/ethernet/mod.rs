//! Ethernet MAC drivers, grouped by vendor

pub mod realtek;
