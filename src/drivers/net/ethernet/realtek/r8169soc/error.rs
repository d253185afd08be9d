//! Driver error types
//!
//! Only configuration errors and bring-up failures ever leave the driver as
//! `Err`. Ring-full is a [`NetdevTx::Busy`](crate::drivers::net::NetdevTx)
//! result, frame errors are statistics, and buffer exhaustion or a wedged
//! MAC are handled through the deferred-work flags.

use core::fmt;

use crate::drivers::dma::DmaError;

/// Rejected configuration or administrative request
///
/// Returned before any device state is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Ring size is zero, not a power of two, or too large for the hardware
    InvalidRingSize,
    /// RX buffer size outside what a descriptor length field can express
    InvalidBufferSize,
    /// Wake rule index beyond the table the chip supports
    RuleIndexOutOfRange { index: usize, limit: usize },
    /// Mask has bits set in the `offset % 8` prefix the hardware skips
    MaskPrefixNotZero { index: usize },
    /// Pattern has bytes set in the `offset % 8` prefix
    PatternPrefixNotZero { index: usize },
    /// Mask longer than the wake mode allows
    MaskTooLong { len: usize, limit: usize },
    /// Pattern longer than the pattern buffer
    PatternTooLong { len: usize, limit: usize },
    /// Offset past the end of a maximum-size frame
    OffsetOutOfRange { offset: u16 },
    /// Storm-control limit out of range for the chosen mode
    InvalidStormLimit,
    /// Loopback frame length outside 60..=1514
    InvalidFrameLength { len: usize },
    /// The chip does not implement the requested feature
    Unsupported,
    /// Administrative payload could not be decoded
    MalformedPayload,
    /// The device must be up for this request
    NotRunning,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRingSize => write!(f, "ring size must be a power of two"),
            Self::InvalidBufferSize => write!(f, "invalid RX buffer size"),
            Self::RuleIndexOutOfRange { index, limit } => {
                write!(f, "wake rule index {} out of range (limit {})", index, limit)
            }
            Self::MaskPrefixNotZero { index } => {
                write!(f, "wake rule {}: mask bits set before offset", index)
            }
            Self::PatternPrefixNotZero { index } => {
                write!(f, "wake rule {}: pattern bytes set before offset", index)
            }
            Self::MaskTooLong { len, limit } => {
                write!(f, "wake mask of {} bytes exceeds {}", len, limit)
            }
            Self::PatternTooLong { len, limit } => {
                write!(f, "wake pattern of {} bytes exceeds {}", len, limit)
            }
            Self::OffsetOutOfRange { offset } => write!(f, "wake offset {} out of range", offset),
            Self::InvalidStormLimit => write!(f, "invalid storm control limit"),
            Self::InvalidFrameLength { len } => write!(f, "invalid frame length {}", len),
            Self::Unsupported => write!(f, "not supported by this chip"),
            Self::MalformedPayload => write!(f, "malformed request payload"),
            Self::NotRunning => write!(f, "interface is down"),
        }
    }
}

/// Step of the chip bring-up sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BringUpStage {
    ResetPhyMac,
    ClockAndPll,
    MdioAndPhy,
    MacMcuPatch,
}

impl fmt::Display for BringUpStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ResetPhyMac => "PHY/MAC reset",
            Self::ClockAndPll => "clock/PLL init",
            Self::MdioAndPhy => "MDIO/PHY bring-up",
            Self::MacMcuPatch => "MAC MCU patch",
        };
        f.write_str(name)
    }
}

/// Device creation or open failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeError {
    /// The chip reported a hardware failure during bring-up
    HwFail { stage: BringUpStage },
    /// Device configuration rejected
    Config(ConfigError),
    /// Descriptor ring or buffer allocation failed
    Dma(DmaError),
    /// The MAC did not come out of reset
    ResetTimeout,
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HwFail { stage } => write!(f, "hardware failure during {}", stage),
            Self::Config(e) => write!(f, "configuration: {}", e),
            Self::Dma(e) => write!(f, "{}", e),
            Self::ResetTimeout => write!(f, "MAC reset timed out"),
        }
    }
}

impl From<ConfigError> for ProbeError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<DmaError> for ProbeError {
    fn from(e: DmaError) -> Self {
        Self::Dma(e)
    }
}
