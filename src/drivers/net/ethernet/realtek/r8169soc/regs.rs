//! Register map
//!
//! Offsets of the MAC window as seen through the RTD1xxx SoC bus, plus the
//! wake-filter, storm-control and close-index extensions that only exist on
//! the SoC variants of the 8169 MAC. Widths follow the hardware: a register
//! listed as `u8` must be accessed with `read8`/`write8` and so on.

#![allow(dead_code)]

use bitflags::bitflags;

// ============================================================================
// MAC Window
// ============================================================================

/// Station address, 6 bytes (u32 + u16)
pub const MAC0: usize = 0x00;
/// Station address bytes 4..6
pub const MAC4: usize = 0x04;
/// Multicast hash filter, 8 bytes
pub const MAR0: usize = 0x08;
/// Tally counter dump address
pub const COUNTER_ADDR_LOW: usize = 0x10;
pub const COUNTER_ADDR_HIGH: usize = 0x14;
/// TX ring base (u32 each)
pub const TX_DESC_START_ADDR_LOW: usize = 0x20;
pub const TX_DESC_START_ADDR_HIGH: usize = 0x24;
/// Chip command (u8)
pub const CHIP_CMD: usize = 0x37;
/// TX doorbell (u8)
pub const TX_POLL: usize = 0x38;
/// Interrupt mask (u16)
pub const INTR_MASK: usize = 0x3c;
/// Interrupt status, write 1 to clear (u16)
pub const INTR_STATUS: usize = 0x3e;
/// TX configuration (u32)
pub const TX_CONFIG: usize = 0x40;
/// RX configuration (u32)
pub const RX_CONFIG: usize = 0x44;
/// Missed packet counter (u32, 24 valid bits)
pub const RX_MISSED: usize = 0x4c;
/// Config register write unlock (u8)
pub const CFG9346: usize = 0x50;
pub const CONFIG0: usize = 0x51;
pub const CONFIG1: usize = 0x52;
pub const CONFIG2: usize = 0x53;
pub const CONFIG3: usize = 0x54;
pub const CONFIG4: usize = 0x55;
pub const CONFIG5: usize = 0x56;
/// PHY status mirror (u8)
pub const PHY_STATUS: usize = 0x6c;
/// Embedded MCU control/status (u8)
pub const MCU: usize = 0xd3;
/// Largest frame the receiver accepts (u16)
pub const RX_MAX_SIZE: usize = 0xda;
/// C+ command (u16)
pub const C_PLUS_CMD: usize = 0xe0;
/// Interrupt mitigation (u16)
pub const INTR_MITIGATE: usize = 0xe2;
/// RX ring base (u32 each)
pub const RX_DESC_ADDR_LOW: usize = 0xe4;
pub const RX_DESC_ADDR_HIGH: usize = 0xe8;
/// Largest frame the transmitter sends, in 128-byte units (u8)
pub const MAX_TX_PACKET_SIZE: usize = 0xec;

/// Size of the MAC register window dumped for diagnostics
pub const R8169_REGS_SIZE: usize = 256;

// ============================================================================
// Close-Index Extension
// ============================================================================

/// Last descriptor index the driver has produced (u16, close-index chips)
///
/// Aliases the low half of `TX_DESC_START_ADDR_LOW`; the ring base is latched
/// when TX is enabled, after which the register reads back as an index.
pub const TX_DESC_TAIL_IDX: usize = 0x20;
/// Index up to which the device has closed descriptors (u16)
pub const TX_DESC_CLOSE_IDX: usize = 0x22;
/// Both indices are 14-bit counters
pub const TX_DESC_CNT_MASK: u32 = 0x3fff;
pub const TX_DESC_CNT_SIZE: u32 = 0x4000;

// ============================================================================
// Wake Filter Window
// ============================================================================

/// Wake engine control (u16)
pub const WAKE_CTRL: usize = 0x100;
/// Wake event status, write 1 to clear (u16)
pub const WAKE_STATUS: usize = 0x102;

/// CRC mode, rules 0..8: low bytes of each CRC, four per word (u32 x2)
pub const WAKE_CRC_LSB: usize = 0x110;
/// CRC mode, rules 0..8: high bytes of each CRC, four per word (u32 x2)
pub const WAKE_CRC_MSB: usize = 0x118;
/// CRC mode, rules 8..16: full CRCs, two per word (u32 x4)
pub const WAKE_CRC_HI: usize = 0x120;
/// CRC mode mask table base (u32 words)
pub const WAKE_MASK_BASE: usize = 0x200;
/// Stride between per-rule entries of the CRC mask table
pub const WAKE_MASK_STRIDE: usize = 16;

/// Pattern mode, per-rule window selector (u16 per rule)
pub const PAT_MASK_SEL_BASE: usize = 0x300;
/// Pattern mode mask nibble array (u16 per nibble, 64 nibbles per rule)
pub const PAT_MASK_BASE: usize = 0x1000;
/// Nibbles per rule in the pattern mask array
pub const PAT_MASK_NIBBLES: usize = 64;
/// Pattern mode data bank (u16 words)
pub const PAT_DATA_BASE: usize = 0x2000;
/// Per-rule size of the pattern data bank: 2-byte offset + 136 bytes
pub const PAT_DATA_STRIDE: usize = 138;

// ============================================================================
// Storm Control
// ============================================================================

/// Storm control, one u32 per packet class: `mode << 16 | limit`
pub const STORM_CTRL_BASE: usize = 0x180;

// ============================================================================
// Bit Definitions
// ============================================================================

bitflags! {
    /// `INTR_STATUS` / `INTR_MASK`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IntrStatus: u16 {
        const SYS_ERR = 0x8000;
        const PCS_TIMEOUT = 0x4000;
        const SW_INT = 0x0100;
        const TX_DESC_UNAVAIL = 0x0080;
        const RX_FIFO_OVER = 0x0040;
        const LINK_CHG = 0x0020;
        const RX_OVERFLOW = 0x0010;
        const TX_ERR = 0x0008;
        const TX_OK = 0x0004;
        const RX_ERR = 0x0002;
        const RX_OK = 0x0001;
    }
}

impl IntrStatus {
    /// Events the driver unmasks while up
    pub const DEFAULT_MASK: Self = Self::SYS_ERR
        .union(Self::LINK_CHG)
        .union(Self::RX_OVERFLOW)
        .union(Self::RX_FIFO_OVER)
        .union(Self::TX_ERR)
        .union(Self::TX_OK)
        .union(Self::RX_ERR)
        .union(Self::RX_OK);
}

bitflags! {
    /// `CHIP_CMD`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ChipCmd: u8 {
        const STOP_REQ = 0x80;
        const RESET = 0x10;
        const RX_ENB = 0x08;
        const TX_ENB = 0x04;
        const RX_BUF_EMPTY = 0x01;
    }
}

bitflags! {
    /// `TX_POLL`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TxPoll: u8 {
        /// High priority queue
        const HPQ = 0x80;
        /// Normal priority queue
        const NPQ = 0x40;
        /// Forced software interrupt
        const FSW_INT = 0x01;
    }
}

bitflags! {
    /// `MCU`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Mcu: u8 {
        const NOW_IS_OOB = 1 << 7;
        const TX_EMPTY = 1 << 5;
        const RX_EMPTY = 1 << 4;
        const EN_NDP = 1 << 3;
        const EN_OOB_RESET = 1 << 2;
        const LINK_LIST_RDY = 1 << 1;
        const DIS_MCU_CLROOB = 1 << 0;
    }
}

impl Mcu {
    pub const RXTX_EMPTY: Self = Self::TX_EMPTY.union(Self::RX_EMPTY);
}

bitflags! {
    /// Accept bits of `RX_CONFIG`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RxAccept: u32 {
        const ERR = 0x20;
        const RUNT = 0x10;
        const BROADCAST = 0x08;
        const MULTICAST = 0x04;
        const MY_PHYS = 0x02;
        const ALL_PHYS = 0x01;
    }
}

/// All accept bits of `RX_CONFIG`
pub const RX_CONFIG_ACCEPT_MASK: u32 = 0x3f;
/// RX DMA burst: unlimited
pub const RX_CFG_DMA_UNLIMITED: u32 = 7 << 8;
/// RX interrupt every 128 bytes of early data off
pub const RX128_INT_EN: u32 = 1 << 15;

/// TX DMA burst size (2^(4+4) = 256 bytes)
pub const TX_DMA_BURST: u32 = 4;
pub const TX_DMA_SHIFT: u32 = 8;
/// Shortest inter-frame gap
pub const INTER_FRAME_GAP: u32 = 0x03;
pub const TX_IFG_SHIFT: u32 = 24;
/// MAC loopback select in `TX_CONFIG` (bits 18:17 = 01)
pub const TX_LOOPBACK_MAC: u32 = 1 << 17;
pub const TX_LOOPBACK_MASK: u32 = 3 << 17;
pub const TXCFG_AUTO_FIFO: u32 = 1 << 7;

/// `CFG9346` values
pub const CFG9346_LOCK: u8 = 0x00;
pub const CFG9346_UNLOCK: u8 = 0xc0;

/// `CONFIG3`: wake on magic packet
pub const MAGIC_PKT: u8 = 1 << 5;
/// `CONFIG3`: wake on link up
pub const LINK_UP: u8 = 1 << 4;
/// `CONFIG5`: LAN wake enable
pub const LAN_WAKE: u8 = 1 << 1;
/// `CONFIG5`: accept broadcast/multicast/unicast wakeup frames
pub const BWF: u8 = 1 << 6;
pub const MWF: u8 = 1 << 5;
pub const UWF: u8 = 1 << 4;

bitflags! {
    /// `C_PLUS_CMD`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CPlusCmd: u16 {
        const RX_VLAN = 1 << 6;
        const RX_CHK_SUM = 1 << 5;
        const PCI_MUL_RW = 1 << 3;
    }
}

bitflags! {
    /// `PHY_STATUS`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PhyStatus: u8 {
        const PWR_SAVE_STATUS = 0x80;
        const TX_FLOW_CTRL = 0x40;
        const RX_FLOW_CTRL = 0x20;
        const SPEED_1000 = 0x10;
        const SPEED_100 = 0x08;
        const SPEED_10 = 0x04;
        const LINK_STATUS = 0x02;
        const FULL_DUP = 0x01;
    }
}

bitflags! {
    /// `WAKE_CTRL`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WakeCtrl: u16 {
        /// Match CRC-16 rules
        const CRC_MATCH_EN = 1 << 0;
        /// Match exact-pattern rules
        const PATTERN_MATCH_EN = 1 << 1;
        /// Lend RX FIFO SRAM to the wake engine
        const BORROW_SRAM = 1 << 15;
    }
}
