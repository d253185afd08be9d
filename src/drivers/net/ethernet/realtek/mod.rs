//! Realtek Ethernet controllers

pub mod r8169soc;
