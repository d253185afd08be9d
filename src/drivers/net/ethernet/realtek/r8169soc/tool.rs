//! Vendor tool requests
//!
//! Userspace configuration tools talk to the driver through one private
//! request carrying a command number and a small payload:
//!
//! ```text
//!  cmd     u32   command number, see [`ToolCmd`]
//!  offset  i16   rule index / register offset / iteration count
//!  len     u16   payload length
//!  data    u32   scalar payload, or packed storm control:
//!                  byte 0 packet class, byte 1 mode, bytes 2..4 limit
//!  buf     [u8]  byte payload (masks, patterns, MAC address)
//! ```
//!
//! Requests are decoded into a [`ToolCommand`] first; a payload that does
//! not fit its command is rejected before anything is touched.

use alloc::vec::Vec;
use core::fmt;

use super::error::ConfigError;
use super::loopback::{LoopbackError, LoopbackMode, LoopbackReport};
use super::storm::{PacketClass, StormControl, StormMode};
use super::wol::{WakeRule, WolFlags};
use super::{Rtl8169Soc, TaskFlags};
use crate::LOG_TAG;
use crate::net::ethernet::MacAddress;

/// Raw command numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ToolCmd {
    ReadWol = 0,
    WriteWol,
    ReadPwrSaving,
    WritePwrSaving,
    ReadMac,
    WriteMac,
    ReadOcp,
    WriteOcp,
    ReadEri,
    WriteEri,
    ReadPhy,
    WritePhy,
    ReadEee,
    WriteEee,
    ReadWakeMask,
    WriteWakeMask,
    ReadWakeCrc,
    WriteWakeCrc,
    ReadWakeOffset,
    WriteWakeOffset,
    ReadWakePattern,
    WriteWakePattern,
    ReadWakeIdxEn,
    WriteWakeIdxEn,
    ReadStormCtrl,
    WriteStormCtrl,
    ReinitMac,
    ReinitPhy,
    WriteEthLed,
    DumpWakeRule,
    TestLoopback,
    Invalid,
}

impl ToolCmd {
    const ALL: [Self; 32] = [
        Self::ReadWol,
        Self::WriteWol,
        Self::ReadPwrSaving,
        Self::WritePwrSaving,
        Self::ReadMac,
        Self::WriteMac,
        Self::ReadOcp,
        Self::WriteOcp,
        Self::ReadEri,
        Self::WriteEri,
        Self::ReadPhy,
        Self::WritePhy,
        Self::ReadEee,
        Self::WriteEee,
        Self::ReadWakeMask,
        Self::WriteWakeMask,
        Self::ReadWakeCrc,
        Self::WriteWakeCrc,
        Self::ReadWakeOffset,
        Self::WriteWakeOffset,
        Self::ReadWakePattern,
        Self::WriteWakePattern,
        Self::ReadWakeIdxEn,
        Self::WriteWakeIdxEn,
        Self::ReadStormCtrl,
        Self::WriteStormCtrl,
        Self::ReinitMac,
        Self::ReinitPhy,
        Self::WriteEthLed,
        Self::DumpWakeRule,
        Self::TestLoopback,
        Self::Invalid,
    ];

    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }
}

/// One raw request as it arrives from userspace
#[derive(Debug, Clone, Copy)]
pub struct ToolRequest<'a> {
    pub cmd: u32,
    pub offset: i16,
    pub len: u16,
    pub data: u32,
    pub buf: &'a [u8],
}

impl<'a> ToolRequest<'a> {
    pub fn new(cmd: ToolCmd) -> Self {
        Self {
            cmd: cmd as u32,
            offset: 0,
            len: 0,
            data: 0,
            buf: &[],
        }
    }

    pub fn data(self, data: u32) -> Self {
        Self { data, ..self }
    }

    pub fn offset(self, offset: i16) -> Self {
        Self { offset, ..self }
    }

    pub fn payload(self, buf: &'a [u8]) -> Self {
        Self {
            len: buf.len() as u16,
            buf,
            ..self
        }
    }

    fn flag(&self) -> Result<bool, ConfigError> {
        match self.data {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(ConfigError::MalformedPayload),
        }
    }

    fn index(&self) -> Result<usize, ConfigError> {
        usize::try_from(self.offset).map_err(|_| ConfigError::MalformedPayload)
    }

    fn bytes(&self) -> Result<&'a [u8], ConfigError> {
        self.buf.get(..self.len as usize).ok_or(ConfigError::MalformedPayload)
    }

    fn half(&self) -> Result<u16, ConfigError> {
        u16::try_from(self.data).map_err(|_| ConfigError::MalformedPayload)
    }

    fn class(&self) -> Result<PacketClass, ConfigError> {
        PacketClass::from_raw(self.data as u8).ok_or(ConfigError::MalformedPayload)
    }
}

/// A decoded, well-formed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCommand {
    ReadWol,
    WriteWol(WolFlags),
    ReadPwrSaving,
    WritePwrSaving(bool),
    ReadMac,
    WriteMac(MacAddress),
    ReadEee,
    WriteEee(bool),
    /// Raw OCP, ERI and PHY register access
    RawRegister(ToolCmd),
    ReadWakeMask,
    WriteWakeMask(Vec<u8>),
    ReadWakeCrc,
    WriteWakeCrc(u16),
    ReadWakeOffset,
    WriteWakeOffset(u16),
    ReadWakePattern,
    WriteWakePattern(Vec<u8>),
    /// Load rule `index` into the staging buffer and report whether it is enabled
    ReadWakeIdxEn(usize),
    /// Commit the staging buffer to rule `index`
    WriteWakeIdxEn { index: usize, enable: bool },
    ReadStormCtrl(PacketClass),
    WriteStormCtrl(PacketClass, StormControl),
    /// Rebuild the rings behind a MAC reset
    ReinitMac,
    /// Full MAC and PHY re-initialization
    ReinitPhy,
    WriteEthLed(bool),
    DumpWakeRule,
    TestLoopback { mode: LoopbackMode, len: usize, count: u32 },
}

impl ToolCommand {
    pub fn decode(req: &ToolRequest<'_>) -> Result<Self, ConfigError> {
        let cmd = ToolCmd::from_raw(req.cmd).ok_or(ConfigError::MalformedPayload)?;
        Ok(match cmd {
            ToolCmd::ReadWol => Self::ReadWol,
            ToolCmd::WriteWol => {
                Self::WriteWol(WolFlags::from_bits(req.data).ok_or(ConfigError::MalformedPayload)?)
            }
            ToolCmd::ReadPwrSaving => Self::ReadPwrSaving,
            ToolCmd::WritePwrSaving => Self::WritePwrSaving(req.flag()?),
            ToolCmd::ReadMac => Self::ReadMac,
            ToolCmd::WriteMac => {
                let bytes: [u8; 6] = req.bytes()?.try_into().map_err(|_| ConfigError::MalformedPayload)?;
                Self::WriteMac(MacAddress::new(bytes))
            }
            ToolCmd::ReadOcp
            | ToolCmd::WriteOcp
            | ToolCmd::ReadEri
            | ToolCmd::WriteEri
            | ToolCmd::ReadPhy
            | ToolCmd::WritePhy => Self::RawRegister(cmd),
            ToolCmd::ReadEee => Self::ReadEee,
            ToolCmd::WriteEee => Self::WriteEee(req.flag()?),
            ToolCmd::ReadWakeMask => Self::ReadWakeMask,
            ToolCmd::WriteWakeMask => Self::WriteWakeMask(req.bytes()?.to_vec()),
            ToolCmd::ReadWakeCrc => Self::ReadWakeCrc,
            ToolCmd::WriteWakeCrc => Self::WriteWakeCrc(req.half()?),
            ToolCmd::ReadWakeOffset => Self::ReadWakeOffset,
            ToolCmd::WriteWakeOffset => Self::WriteWakeOffset(req.half()?),
            ToolCmd::ReadWakePattern => Self::ReadWakePattern,
            ToolCmd::WriteWakePattern => Self::WriteWakePattern(req.bytes()?.to_vec()),
            ToolCmd::ReadWakeIdxEn => Self::ReadWakeIdxEn(req.index()?),
            ToolCmd::WriteWakeIdxEn => Self::WriteWakeIdxEn {
                index: req.index()?,
                enable: req.flag()?,
            },
            ToolCmd::ReadStormCtrl => Self::ReadStormCtrl(req.class()?),
            ToolCmd::WriteStormCtrl => {
                let mode = StormMode::from_raw((req.data >> 8) as u8 as u16).ok_or(ConfigError::MalformedPayload)?;
                Self::WriteStormCtrl(
                    req.class()?,
                    StormControl {
                        mode,
                        limit: (req.data >> 16) as u16,
                    },
                )
            }
            ToolCmd::ReinitMac => Self::ReinitMac,
            ToolCmd::ReinitPhy => Self::ReinitPhy,
            ToolCmd::WriteEthLed => Self::WriteEthLed(req.flag()?),
            ToolCmd::DumpWakeRule => Self::DumpWakeRule,
            ToolCmd::TestLoopback => Self::TestLoopback {
                mode: LoopbackMode::from_raw(req.data).ok_or(ConfigError::MalformedPayload)?,
                len: req.len as usize,
                count: u32::try_from(req.offset)
                    .ok()
                    .filter(|&n| n > 0)
                    .ok_or(ConfigError::MalformedPayload)?,
            },
            ToolCmd::Invalid => return Err(ConfigError::MalformedPayload),
        })
    }
}

/// Reply to a successful request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolReply {
    Done,
    Value(u32),
    Bytes(Vec<u8>),
    Mac(MacAddress),
    Storm(StormControl),
    Rules(Vec<WakeRule>),
    Loopback(LoopbackReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolError {
    Config(ConfigError),
    Loopback(LoopbackError),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "{}", e),
            Self::Loopback(e) => write!(f, "loopback: {}", e),
        }
    }
}

impl From<ConfigError> for ToolError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<LoopbackError> for ToolError {
    fn from(e: LoopbackError) -> Self {
        Self::Loopback(e)
    }
}

impl Rtl8169Soc {
    /// Decode and run one tool request
    pub fn tool(&self, req: &ToolRequest<'_>) -> Result<ToolReply, ToolError> {
        let cmd = ToolCommand::decode(req)?;
        self.tool_command(cmd)
    }

    pub fn tool_command(&self, cmd: ToolCommand) -> Result<ToolReply, ToolError> {
        let reply = match cmd {
            ToolCommand::ReadWol => ToolReply::Value(self.wol().bits()),
            ToolCommand::WriteWol(wol) => {
                self.set_wol(wol)?;
                ToolReply::Done
            }
            ToolCommand::ReadPwrSaving => ToolReply::Value(self.pwr_saving() as u32),
            ToolCommand::WritePwrSaving(on) => {
                self.set_pwr_saving(on);
                ToolReply::Done
            }
            ToolCommand::ReadMac => ToolReply::Mac(self.mac_address()),
            ToolCommand::WriteMac(mac) => {
                self.set_mac_address(mac)?;
                ToolReply::Done
            }
            ToolCommand::ReadEee => ToolReply::Value(self.eee() as u32),
            ToolCommand::WriteEee(on) => {
                self.set_eee(on)?;
                ToolReply::Done
            }
            ToolCommand::RawRegister(_) => return Err(ConfigError::Unsupported.into()),
            ToolCommand::ReadWakeMask => ToolReply::Bytes(self.with_wake_table(|t| t.staged().mask.clone())),
            ToolCommand::WriteWakeMask(mask) => {
                self.with_wake_table(|t| t.stage_mask(&mask))?;
                ToolReply::Done
            }
            ToolCommand::ReadWakeCrc => ToolReply::Value(self.with_wake_table(|t| t.staged().crc) as u32),
            ToolCommand::WriteWakeCrc(crc) => {
                self.with_wake_table(|t| t.stage_crc(crc));
                ToolReply::Done
            }
            ToolCommand::ReadWakeOffset => ToolReply::Value(self.with_wake_table(|t| t.staged().offset) as u32),
            ToolCommand::WriteWakeOffset(offset) => {
                self.with_wake_table(|t| t.stage_offset(offset))?;
                ToolReply::Done
            }
            ToolCommand::ReadWakePattern => {
                ToolReply::Bytes(self.with_wake_table(|t| t.staged().pattern.clone()))
            }
            ToolCommand::WriteWakePattern(pattern) => {
                self.with_wake_table(|t| t.stage_pattern(&pattern))?;
                ToolReply::Done
            }
            ToolCommand::ReadWakeIdxEn(index) => {
                let enabled = self.with_wake_table(|t| t.load(index).map(|_| t.staged().enabled))?;
                ToolReply::Value(enabled as u32)
            }
            ToolCommand::WriteWakeIdxEn { index, enable } => {
                self.with_wake_table(|t| t.commit(index, enable))?;
                ToolReply::Done
            }
            ToolCommand::ReadStormCtrl(class) => ToolReply::Storm(self.storm(class)),
            ToolCommand::WriteStormCtrl(class, storm) => {
                self.set_storm(class, storm)?;
                ToolReply::Done
            }
            ToolCommand::ReinitMac => {
                self.request_reset();
                ToolReply::Done
            }
            ToolCommand::ReinitPhy => {
                if self.schedule_task(TaskFlags::TX_TIMEOUT) {
                    log::info!("[{}] {}: PHY reinit requested", LOG_TAG, self.chip.name());
                }
                ToolReply::Done
            }
            ToolCommand::WriteEthLed(on) => {
                self.set_led(on);
                ToolReply::Done
            }
            ToolCommand::DumpWakeRule => ToolReply::Rules(self.wake_rules()),
            ToolCommand::TestLoopback { mode, len, count } => {
                ToolReply::Loopback(self.loopback_test(mode, len, count)?)
            }
        };
        Ok(reply)
    }
}
