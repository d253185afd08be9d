//! Storm control
//!
//! The MAC can rate-limit three classes of received traffic independently.
//! Each class has one control word at `STORM_CTRL_BASE + class * 4`:
//!
//! ```text
//!   31          16 15           0
//!  ┌──────────────┬──────────────┐
//!  │ mode         │ limit        │
//!  └──────────────┴──────────────┘
//! ```
//!
//! The settings live in the device's work state and are written again after
//! every MAC reset.

use core::fmt;

use super::error::ConfigError;
use super::regs::STORM_CTRL_BASE;
use crate::drivers::mmio::RegisterBus;

/// How a class is limited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum StormMode {
    NoLimit = 0,
    /// `limit` packets per interval
    PktLimit = 1,
    /// `limit` bytes per interval
    RateLimit = 2,
}

impl StormMode {
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(Self::NoLimit),
            1 => Some(Self::PktLimit),
            2 => Some(Self::RateLimit),
            _ => None,
        }
    }
}

/// Traffic class a storm limit applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketClass {
    Broadcast = 0,
    Multicast = 1,
    UnknownUnicast = 2,
}

impl PacketClass {
    pub const ALL: [Self; 3] = [Self::Broadcast, Self::Multicast, Self::UnknownUnicast];

    pub fn from_raw(raw: u8) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    fn reg(self) -> usize {
        STORM_CTRL_BASE + self as usize * 4
    }
}

impl fmt::Display for PacketClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broadcast => write!(f, "broadcast"),
            Self::Multicast => write!(f, "multicast"),
            Self::UnknownUnicast => write!(f, "unknown unicast"),
        }
    }
}

/// Limit for one packet class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StormControl {
    pub mode: StormMode,
    pub limit: u16,
}

impl StormControl {
    pub const fn disabled() -> Self {
        Self {
            mode: StormMode::NoLimit,
            limit: 0,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.mode == StormMode::NoLimit
    }

    /// A limiting mode needs a non-zero limit
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.is_disabled() && self.limit == 0 {
            return Err(ConfigError::InvalidStormLimit);
        }
        Ok(())
    }

    fn register_value(&self) -> u32 {
        if self.is_disabled() {
            return 0;
        }
        (self.mode as u32) << 16 | self.limit as u32
    }
}

impl Default for StormControl {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Program one class
pub(crate) fn apply_one(regs: &dyn RegisterBus, class: PacketClass, storm: &StormControl) {
    regs.write32(class.reg(), storm.register_value());
}

/// Program all three classes
pub(crate) fn apply(regs: &dyn RegisterBus, storm: &[StormControl; 3]) {
    for class in PacketClass::ALL {
        apply_one(regs, class, &storm[class as usize]);
    }
}
