//! Per-chip strategy
//!
//! Every RTD1xxx variant wires the same MAC to different clocks, PLLs, pad
//! controls and PHYs. All of that lives behind [`ChipOps`], which the
//! platform constructs once per device and the core consults through two
//! things only: the [`ChipFeatures`] bitset and the lifecycle calls. The
//! core never asks which chip it is driving.

use core::fmt;

use bitflags::bitflags;

use super::error::{BringUpStage, ConfigError, ProbeError};
use super::loopback::LoopbackMode;
use super::regs::{PHY_STATUS, PhyStatus};
use crate::drivers::mmio::RegisterBus;
use crate::drivers::platform::Platform;
use crate::sync::AtomicFlags;

bitflags! {
    /// Capabilities that change how the core drives the MAC
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ChipFeatures: u32 {
        /// Wake-on-LAN capable
        const WOL = 1 << 0;
        /// Gigabit PHY
        const GMII = 1 << 2;
        /// TX completion is read from the close-index register
        const TX_NO_CLOSE = 1 << 3;
        /// RX buffers are handed to the stack instead of copied
        const RX_NO_COPY = 1 << 4;
        const ADJUST_FIFO = 1 << 5;
        /// Cache-coherent DMA port
        const ACP = 1 << 6;
        /// Energy Efficient Ethernet
        const EEE = 1 << 7;
        const OCP_MDIO = 1 << 8;
        /// Exact-pattern wake engine (otherwise CRC-16 wake engine)
        const PAT_WAKE = 1 << 9;
        /// Per-class broadcast/multicast/unknown storm limiting
        const STORM_CTRL = 1 << 10;
        const MDNS_OFFLOAD = 1 << 11;
    }
}

bitflags! {
    /// Driver status bits shared with the chip strategy
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DrvStatus: u32 {
        /// Interface is down
        const DOWN = 1 << 0;
        /// Full MAC/PHY re-initialization in progress
        const REINIT = 1 << 1;
        /// Loopback self-test owns the rings
        const LOOPBACK = 1 << 2;
        /// Bring-up reported an unusable device
        const HW_FAIL = 1 << 3;
    }
}

/// What a strategy call gets to work with
pub struct ChipContext<'a> {
    pub regs: &'a dyn RegisterBus,
    pub status: &'a AtomicFlags<DrvStatus>,
    pub platform: &'a dyn Platform,
}

impl ChipContext<'_> {
    /// Mark the device unusable; checked after every bring-up step
    pub fn mark_hw_fail(&self) {
        self.status.insert(DrvStatus::HW_FAIL);
    }

    pub fn hw_failed(&self) -> bool {
        self.status.contains(DrvStatus::HW_FAIL)
    }
}

/// Chip family strategy
///
/// The four bring-up calls run in order at probe and again for every full
/// MAC/PHY re-initialization. A step that fails calls
/// [`ChipContext::mark_hw_fail`] instead of returning an error.
pub trait ChipOps: Send + Sync {
    fn name(&self) -> &'static str;

    fn features(&self) -> ChipFeatures;

    /// Assert and release the PHY and MAC resets
    fn reset_phy_mac(&self, ctx: &ChipContext<'_>);

    /// Enable clocks and lock the PLLs
    fn clock_and_pll_init(&self, ctx: &ChipContext<'_>);

    /// Bring up the MDIO transport and configure the PHY
    fn mdio_and_phy_bringup(&self, ctx: &ChipContext<'_>);

    /// Load the MAC MCU patch
    fn mac_mcu_patch(&self, ctx: &ChipContext<'_>);

    /// Current link state
    fn link_ok(&self, ctx: &ChipContext<'_>) -> bool {
        PhyStatus::from_bits_retain(ctx.regs.read8(PHY_STATUS)).contains(PhyStatus::LINK_STATUS)
    }

    /// Route the wake engine's output to the SoC wake logic
    fn wakeup_arm(&self, ctx: &ChipContext<'_>, enable: bool);

    fn led_set(&self, _ctx: &ChipContext<'_>, _enable: bool) {}

    fn eee_set(&self, _ctx: &ChipContext<'_>, _enable: bool) {}

    /// Put the PHY into (or out of) one of the PHY loopback modes
    fn phy_loopback(
        &self,
        _ctx: &ChipContext<'_>,
        _mode: LoopbackMode,
        _enable: bool,
    ) -> Result<(), ConfigError> {
        Err(ConfigError::Unsupported)
    }

    /// Chip-specific register dump (SoC glue, PHY pages)
    fn dump_regs(&self, _ctx: &ChipContext<'_>, _out: &mut dyn fmt::Write) -> fmt::Result {
        Ok(())
    }

    /// Chip-specific calibration and tuning variables
    fn dump_var(&self, _out: &mut dyn fmt::Write) -> fmt::Result {
        Ok(())
    }
}

/// Run the four bring-up steps, stopping at the first that marks HW_FAIL
pub(crate) fn bring_up(chip: &dyn ChipOps, ctx: &ChipContext<'_>) -> Result<(), ProbeError> {
    let steps: [(BringUpStage, fn(&dyn ChipOps, &ChipContext<'_>)); 4] = [
        (BringUpStage::ResetPhyMac, |c, x| c.reset_phy_mac(x)),
        (BringUpStage::ClockAndPll, |c, x| c.clock_and_pll_init(x)),
        (BringUpStage::MdioAndPhy, |c, x| c.mdio_and_phy_bringup(x)),
        (BringUpStage::MacMcuPatch, |c, x| c.mac_mcu_patch(x)),
    ];

    for (stage, step) in steps {
        step(chip, ctx);
        if ctx.hw_failed() {
            log::error!("[{}] {}: {} failed", crate::LOG_TAG, chip.name(), stage);
            return Err(ProbeError::HwFail { stage });
        }
    }
    Ok(())
}
