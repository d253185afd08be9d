//! Realtek RTD1xxx SoC Ethernet MAC driver
//!
//! The MAC is an r8169-family core attached directly to the SoC
//! interconnect. This module holds the device object and its lifecycle;
//! the pieces it coordinates live in the submodules:
//!
//! ```text
//!            ┌──────────── Rtl8169Soc ─────────────┐
//!   xmit ───▶│ tx::TxRing ◀── reclaim ──┐          │
//!            │                          │ irq::poll│◀── napi
//!   stack ◀──│ rx::RxRing ─── drain ────┘          │
//!            │                                     │
//!   work ───▶│ work::run_deferred ── quiesce/reset │
//!            │ power / wol / storm / loopback      │
//!            └──────────────── ChipOps ────────────┘
//! ```
//!
//! # Concurrency
//!
//! Three contexts touch the device at once:
//!
//! - **transmit** holds the TX producer lock for one post
//! - **poll** owns both rings' consumer side through NAPI
//! - **deferred work** holds the work lock, and takes both ring roles away
//!   from the other two (quiesce) before touching the hardware
//!
//! Interrupt context only reads and acks status, sets task flags and
//! schedules poll or work.

pub mod chip;
pub mod config;
pub mod desc;
pub mod dump;
pub mod error;
pub mod irq;
pub mod loopback;
pub mod power;
pub mod regs;
pub mod rx;
pub mod stats;
pub mod storm;
pub mod tool;
pub mod tx;
pub mod wol;
pub mod work;

#[cfg(test)]
pub(crate) mod testing;

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use bitflags::bitflags;

use self::chip::{ChipContext, ChipFeatures, ChipOps, DrvStatus};
use self::config::DeviceConfig;
use self::dump::DiagHandle;
use self::error::{ConfigError, ProbeError};
use self::power::PowerState;
use self::regs::*;
use self::rx::{RxMode, RxRing};
use self::stats::{Stats, StatsSnapshot};
use self::storm::{PacketClass, StormControl};
use self::tx::{TxCompletion, TxDrop, TxPost, TxProducer, TxRing};
use self::wol::{WakeRule, WakeTable, WolFlags};
use crate::drivers::dma::DmaOps;
use crate::drivers::mmio::{RegisterBus, poll_until};
use crate::drivers::net::netdev::{NetStack, NetdevTx};
use crate::drivers::platform::Platform;
use crate::net::ethernet::MacAddress;
use crate::net::skbuff::SkBuff;
use crate::sync::{AtomicFlags, Napi, NapiDisabled};
use crate::LOG_TAG;

/// Attempts while waiting for `CHIP_CMD.RESET` to clear
const RESET_TRIES: u32 = 100;
const RESET_DELAY_US: u32 = 100;
/// Attempts while waiting for the MAC FIFOs to drain
const FIFO_EMPTY_TRIES: u32 = 1000;
const FIFO_EMPTY_DELAY_US: u32 = 10;
/// `RX_MISSED` is a 24-bit counter
const RX_MISSED_MASK: u32 = 0x00ff_ffff;

bitflags! {
    /// Requests for the deferred worker
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TaskFlags: u32 {
        /// The worker may run; cleared while down or suspended
        const ENABLED = 1 << 0;
        /// Rebuild both rings behind a MAC reset
        const RESET_PENDING = 1 << 1;
        /// Full MAC and PHY re-initialization
        const TX_TIMEOUT = 1 << 2;
    }
}

/// Everything the platform hands over at probe
pub struct Resources {
    pub regs: Box<dyn RegisterBus>,
    pub chip: Box<dyn ChipOps>,
    pub dma: Arc<dyn DmaOps>,
    pub platform: Arc<dyn Platform>,
    pub stack: Arc<dyn NetStack>,
}

pub(crate) struct Rings {
    pub(crate) tx: TxRing,
    pub(crate) rx: RxRing,
}

/// Settings and state changed only under the work lock
pub(crate) struct WorkState {
    pub(crate) mac: MacAddress,
    pub(crate) wol: WolFlags,
    pub(crate) rules: WakeTable,
    pub(crate) storm: [StormControl; 3],
    pub(crate) eee: bool,
    pub(crate) pwr_saving: bool,
    pub(crate) power: PowerState,
}

/// Both ring roles, taken away from poll and transmit
pub(crate) struct Quiesced<'a> {
    pub(crate) napi: NapiDisabled<'a>,
    pub(crate) producer: TxProducer<'a>,
}

/// One RTD1xxx Ethernet MAC
pub struct Rtl8169Soc {
    regs: Box<dyn RegisterBus>,
    chip: Box<dyn ChipOps>,
    dma: Arc<dyn DmaOps>,
    platform: Arc<dyn Platform>,
    stack: Arc<dyn NetStack>,
    config: DeviceConfig,
    features: ChipFeatures,

    status: AtomicFlags<DrvStatus>,
    tasks: AtomicFlags<TaskFlags>,
    napi: Napi,
    irq_mask: IntrStatus,
    rings: Option<Rings>,
    work: spin::Mutex<WorkState>,
    link_up: AtomicBool,
    stats: Stats,
    diag: Option<DiagHandle>,
}

impl Rtl8169Soc {
    /// Validate `config`, bring the chip up and leave the interface down
    pub fn probe(res: Resources, config: DeviceConfig) -> Result<Self, ProbeError> {
        let features = res.chip.features();
        config.validate(features)?;

        let mut rules = WakeTable::new(wol::WakeMode::for_features(features));
        for (index, rule) in &config.wake_rules {
            rules.set_rule(*index, rule.clone())?;
        }

        let dev = Self {
            regs: res.regs,
            chip: res.chip,
            dma: res.dma,
            platform: res.platform,
            stack: res.stack,
            features,
            status: AtomicFlags::new(),
            tasks: AtomicFlags::new(),
            napi: Napi::new(config.napi_weight),
            irq_mask: IntrStatus::DEFAULT_MASK,
            rings: None,
            work: spin::Mutex::new(WorkState {
                mac: config.mac_address,
                wol: config.wol,
                rules,
                storm: config.storm,
                eee: config.eee,
                pwr_saving: config.pwr_saving,
                power: PowerState::Active,
            }),
            link_up: AtomicBool::new(false),
            stats: Stats::default(),
            diag: None,
            config,
        };
        dev.status.insert(DrvStatus::DOWN);

        chip::bring_up(&*dev.chip, &dev.ctx())?;
        log::info!(
            "[{}] {}: {} features {:?}",
            LOG_TAG,
            dev.chip.name(),
            dev.config.mac_address,
            features
        );
        Ok(dev)
    }

    /// Allocate the rings, start the MAC and let traffic flow
    pub fn open(&mut self) -> Result<(), ProbeError> {
        if !self.status.contains(DrvStatus::DOWN) {
            return Ok(());
        }
        if self.status.contains(DrvStatus::HW_FAIL) {
            self.status.remove(DrvStatus::HW_FAIL);
            chip::bring_up(&*self.chip, &self.ctx())?;
        }

        let tx = TxRing::new(
            self.dma.clone(),
            self.config.tx_ring_size,
            TxCompletion::for_features(self.features),
        )?;
        let rx = RxRing::new(
            self.dma.clone(),
            self.config.rx_ring_size(self.features),
            self.config.rx_buf_size,
            RxMode::for_features(self.features),
        )?;
        self.rings = Some(Rings { tx, rx });

        let rebuilt = {
            let this = &*self;
            let Some(rings) = this.rings.as_ref() else {
                return Ok(());
            };
            let q = Quiesced {
                napi: this.napi.disable(core::hint::spin_loop),
                producer: rings.tx.lock_producer(),
            };
            if let Err(e) = rings.rx.rebuild(q.napi.owner()) {
                q.napi.keep_disabled();
                drop(q.producer);
                Err(e)
            } else {
                let work = this.work.lock();
                this.hw_start(rings, &work);
                this.tasks.insert(TaskFlags::ENABLED);
                this.status.remove(DrvStatus::DOWN);
                this.finish(rings, q);
                Ok(())
            }
        };
        if let Err(e) = rebuilt {
            self.rings = None;
            return Err(e.into());
        }

        self.diag = Some(DiagHandle::acquire(self.chip.name()));
        log::info!("[{}] {}: up", LOG_TAG, self.chip.name());
        Ok(())
    }

    /// Stop traffic and free the rings
    pub fn close(&mut self) {
        if self.status.contains(DrvStatus::DOWN) {
            return;
        }
        self.tasks.remove(TaskFlags::ENABLED);

        if let Some(rings) = self.rings.as_ref() {
            // waits out a running deferred task
            let _work = self.work.lock();
            let q = self.quiesce(rings, false);
            let dropped = rings.tx.reset(q.napi.owner(), &q.producer);
            stats::add(&self.stats.tx_dropped, dropped as u64);
            q.napi.keep_disabled();
        }
        self.rings = None;
        self.status.insert(DrvStatus::DOWN);
        if self.link_up.swap(false, Ordering::AcqRel) {
            self.stack.link_changed(false);
        }
        self.diag = None;
        log::info!("[{}] {}: down", LOG_TAG, self.chip.name());
    }

    /// Offer one packet for transmission
    pub fn start_xmit(&self, skb: SkBuff) -> NetdevTx {
        let Some(rings) = self.rings.as_ref() else {
            return NetdevTx::Busy(skb);
        };
        match rings.tx.xmit(&*self.regs, skb) {
            TxPost::Queued { .. } => NetdevTx::Ok,
            TxPost::Busy(skb) => NetdevTx::Busy(skb),
            TxPost::Dropped(reason) => {
                stats::bump(&self.stats.tx_dropped);
                log::debug!("[{}] TX drop: {}", LOG_TAG, reason);
                if reason == TxDrop::MapFailed && self.schedule_task(TaskFlags::TX_TIMEOUT) {
                    log::warn!("[{}] TX DMA mapping failed, reinitializing", LOG_TAG);
                }
                NetdevTx::Ok
            }
        }
    }

    /// The stack's TX watchdog fired
    pub fn tx_timeout(&self) {
        if self.schedule_task(TaskFlags::TX_TIMEOUT) {
            log::warn!("[{}] {}: transmit timed out", LOG_TAG, self.chip.name());
        }
    }

    /// Ask the worker to rebuild the rings behind a MAC reset
    pub fn request_reset(&self) {
        self.schedule_task(TaskFlags::RESET_PENDING);
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    pub fn features(&self) -> ChipFeatures {
        self.features
    }

    pub fn mac_address(&self) -> MacAddress {
        self.work.lock().mac
    }

    /// Change the station address; programmed now if running
    pub fn set_mac_address(&self, mac: MacAddress) -> Result<(), ConfigError> {
        if mac.is_multicast() || mac.is_zero() {
            return Err(ConfigError::MalformedPayload);
        }
        let mut work = self.work.lock();
        work.mac = mac;
        if self.is_running() {
            self.write_mac(mac);
        }
        Ok(())
    }

    pub fn wol(&self) -> WolFlags {
        self.work.lock().wol
    }

    /// Wake sources armed at the next suspend
    pub fn set_wol(&self, wol: WolFlags) -> Result<(), ConfigError> {
        if !wol.is_empty() && !self.features.contains(ChipFeatures::WOL) {
            return Err(ConfigError::Unsupported);
        }
        self.work.lock().wol = wol;
        Ok(())
    }

    pub fn wake_rule(&self, index: usize) -> Result<WakeRule, ConfigError> {
        self.work.lock().rules.get_rule(index).cloned()
    }

    pub fn set_wake_rule(&self, index: usize, rule: WakeRule) -> Result<(), ConfigError> {
        self.work.lock().rules.set_rule(index, rule)
    }

    /// Every rule slot, in index order
    pub fn wake_rules(&self) -> Vec<WakeRule> {
        self.work.lock().rules.rules().to_vec()
    }

    /// Run `f` on the wake table under the work lock
    pub fn with_wake_table<R>(&self, f: impl FnOnce(&mut WakeTable) -> R) -> R {
        f(&mut self.work.lock().rules)
    }

    pub fn storm(&self, class: PacketClass) -> StormControl {
        self.work.lock().storm[class as usize]
    }

    pub fn set_storm(&self, class: PacketClass, storm: StormControl) -> Result<(), ConfigError> {
        if !self.features.contains(ChipFeatures::STORM_CTRL) {
            return Err(ConfigError::Unsupported);
        }
        storm.validate()?;
        let mut work = self.work.lock();
        work.storm[class as usize] = storm;
        if self.is_running() {
            storm::apply_one(&*self.regs, class, &storm);
        }
        Ok(())
    }

    pub fn eee(&self) -> bool {
        self.work.lock().eee
    }

    pub fn set_eee(&self, enable: bool) -> Result<(), ConfigError> {
        if !self.features.contains(ChipFeatures::EEE) {
            return Err(ConfigError::Unsupported);
        }
        let mut work = self.work.lock();
        work.eee = enable;
        if self.is_running() {
            self.chip.eee_set(&self.ctx(), enable);
        }
        Ok(())
    }

    pub fn pwr_saving(&self) -> bool {
        self.work.lock().pwr_saving
    }

    /// Turn the LED off while suspended without wake sources
    pub fn set_pwr_saving(&self, enable: bool) {
        self.work.lock().pwr_saving = enable;
    }

    pub fn set_led(&self, enable: bool) {
        let _work = self.work.lock();
        self.chip.led_set(&self.ctx(), enable);
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// Up, not failed, not in the middle of a suspend
    pub fn is_running(&self) -> bool {
        !self.status.contains(DrvStatus::DOWN)
            && !self.status.contains(DrvStatus::HW_FAIL)
            && self.tasks.contains(TaskFlags::ENABLED)
    }

    pub fn link_up(&self) -> bool {
        self.link_up.load(Ordering::Acquire)
    }

    pub fn status(&self) -> DrvStatus {
        self.status.load()
    }

    pub fn tx_queue_stopped(&self) -> bool {
        self.rings.as_ref().is_none_or(|r| r.tx.is_stopped())
    }

    /// Frames handled per poll round
    pub fn napi_weight(&self) -> u32 {
        self.napi.weight()
    }

    /// Counters, with the hardware missed-packet count folded in
    pub fn stats_snapshot(&self) -> StatsSnapshot {
        if self.is_running() {
            let missed = self.regs.read32(RX_MISSED) & RX_MISSED_MASK;
            if missed != 0 {
                self.regs.write32(RX_MISSED, 0);
                stats::add(&self.stats.rx_missed, missed as u64);
            }
        }
        self.stats.snapshot()
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    fn ctx(&self) -> ChipContext<'_> {
        ChipContext {
            regs: &*self.regs,
            status: &self.status,
            platform: &*self.platform,
        }
    }

    /// Set `flag` and schedule the worker if this call set it
    fn schedule_task(&self, flag: TaskFlags) -> bool {
        let first = self.tasks.test_and_set(flag);
        if first {
            self.platform.schedule_work();
        }
        first
    }

    /// Take both ring roles and stop the MAC
    ///
    /// Halts the transmit queue, waits out a running poll, masks and acks
    /// all interrupts, stops accepting frames and waits for the FIFOs to
    /// drain. Unless `skip_reset`, the MAC is then reset.
    fn quiesce<'a>(&'a self, rings: &'a Rings, skip_reset: bool) -> Quiesced<'a> {
        rings.tx.halt();
        let napi = self.napi.disable(core::hint::spin_loop);
        let producer = rings.tx.lock_producer();

        self.regs.write16(INTR_MASK, 0);
        self.regs.write16(INTR_STATUS, 0xffff);
        self.regs.modify32(RX_CONFIG, RX_CONFIG_ACCEPT_MASK, 0);

        let drained = poll_until(
            FIFO_EMPTY_TRIES,
            || self.platform.delay_us(FIFO_EMPTY_DELAY_US),
            || Mcu::from_bits_retain(self.regs.read8(MCU)).contains(Mcu::RXTX_EMPTY),
        );
        if !drained {
            log::warn!("[{}] MAC FIFOs did not drain", LOG_TAG);
        }
        if !skip_reset {
            self.hw_reset();
        }
        Quiesced { napi, producer }
    }

    fn hw_reset(&self) -> bool {
        self.regs.write8(CHIP_CMD, ChipCmd::RESET.bits());
        let done = poll_until(
            RESET_TRIES,
            || self.platform.delay_us(RESET_DELAY_US),
            || self.regs.read8(CHIP_CMD) & ChipCmd::RESET.bits() == 0,
        );
        if !done {
            log::error!("[{}] {}", LOG_TAG, ProbeError::ResetTimeout);
        }
        done
    }

    fn write_mac(&self, mac: MacAddress) {
        let (lo, hi) = mac.to_registers();
        self.regs.write8(CFG9346, CFG9346_UNLOCK);
        self.regs.write32(MAC4, hi as u32);
        self.regs.write32(MAC0, lo);
        self.regs.write8(CFG9346, CFG9346_LOCK);
    }

    /// Program the MAC from scratch and enable TX/RX
    ///
    /// Leaves the interrupt mask alone.
    fn hw_start(&self, rings: &Rings, work: &WorkState) {
        let regs = &*self.regs;
        self.write_mac(work.mac);

        regs.write8(CFG9346, CFG9346_UNLOCK);
        regs.write16(RX_MAX_SIZE, self.config.rx_buf_size as u16);

        let mut cplus = CPlusCmd::empty();
        cplus.set(CPlusCmd::RX_VLAN, self.config.rx_vlan);
        cplus.set(CPlusCmd::RX_CHK_SUM, self.config.rx_checksum);
        regs.write16(C_PLUS_CMD, cplus.bits());
        regs.write16(INTR_MITIGATE, 0);

        let tx = rings.tx.phys();
        let rx = rings.rx.phys();
        regs.write32(TX_DESC_START_ADDR_HIGH, (tx >> 32) as u32);
        regs.write32(TX_DESC_START_ADDR_LOW, tx as u32);
        regs.write32(RX_DESC_ADDR_HIGH, (rx >> 32) as u32);
        regs.write32(RX_DESC_ADDR_LOW, rx as u32);

        regs.write32(TX_CONFIG, TX_DMA_BURST << TX_DMA_SHIFT | INTER_FRAME_GAP << TX_IFG_SHIFT);
        let accept = RxAccept::MY_PHYS | RxAccept::BROADCAST | RxAccept::MULTICAST;
        regs.write32(RX_CONFIG, RX128_INT_EN | RX_CFG_DMA_UNLIMITED | accept.bits());
        regs.write32(MAR0, u32::MAX);
        regs.write32(MAR0 + 4, u32::MAX);

        regs.write8(CHIP_CMD, (ChipCmd::TX_ENB | ChipCmd::RX_ENB).bits());
        regs.write8(CFG9346, CFG9346_LOCK);

        if self.features.contains(ChipFeatures::STORM_CTRL) {
            storm::apply(regs, &work.storm);
        }
        if self.features.contains(ChipFeatures::EEE) {
            self.chip.eee_set(&self.ctx(), work.eee);
        }
    }

    /// Give the rings back to poll and transmit and unmask interrupts
    fn finish(&self, rings: &Rings, q: Quiesced<'_>) {
        drop(q.producer);
        drop(q.napi);
        rings.tx.start();
        self.regs.write16(INTR_MASK, self.irq_mask.bits());
        self.stack.tx_queue_wake();
        self.check_link_status();
    }

    /// Report a carrier transition to the stack
    fn check_link_status(&self) {
        let up = self.chip.link_ok(&self.ctx());
        if self.link_up.swap(up, Ordering::AcqRel) != up {
            log::info!("[{}] link {}", LOG_TAG, if up { "up" } else { "down" });
            self.stack.link_changed(up);
        }
    }
}

// SAFETY: the rings are only reached through the NAPI and producer roles,
// which serialize every access to their interior state.
unsafe impl Sync for Rtl8169Soc {}
unsafe impl Send for Rtl8169Soc {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::net::ethernet::realtek::r8169soc::testing::{Harness, MockChip, test_config};
    use crate::net::skbuff::SkBuff;

    #[test]
    fn probe_leaves_the_interface_down() {
        let h = Harness::new(ChipFeatures::empty());
        assert!(!h.dev.is_running());
        assert!(h.dev.status().contains(DrvStatus::DOWN));
        assert_eq!(h.chip.count("mac_mcu_patch"), 1);
        assert!(h.bus.writes().is_empty());
    }

    #[test]
    fn probe_rejects_bad_configuration() {
        let config = DeviceConfig {
            wol: WolFlags::MAGIC,
            ..test_config()
        };
        let err = Harness::try_with_config(MockChip::new(ChipFeatures::empty()), config).err();
        assert_eq!(err, Some(ProbeError::Config(ConfigError::Unsupported)));
    }

    #[test]
    fn probe_reports_the_failing_bring_up_step() {
        let chip = MockChip::new(ChipFeatures::empty()).fail_at("mdio_and_phy_bringup");
        let err = Harness::try_with_config(chip, test_config()).err();
        assert_eq!(
            err,
            Some(ProbeError::HwFail {
                stage: error::BringUpStage::MdioAndPhy
            })
        );
    }

    #[test]
    fn open_programs_the_mac() {
        let mut h = Harness::new(ChipFeatures::empty());
        h.bus.set8(PHY_STATUS, PhyStatus::LINK_STATUS.bits());
        h.open();

        assert!(h.dev.is_running());
        let (lo, hi) = test_config().mac_address.to_registers();
        assert_eq!(h.bus.get32(MAC0), lo);
        assert_eq!(h.bus.get32(MAC4), hi as u32);
        assert_eq!(h.bus.get8(CHIP_CMD), (ChipCmd::TX_ENB | ChipCmd::RX_ENB).bits());
        assert_eq!(h.bus.get8(CFG9346), CFG9346_LOCK);
        assert_eq!(h.bus.get16(INTR_MASK), IntrStatus::DEFAULT_MASK.bits());
        assert_eq!(h.bus.get32(RX_CONFIG) & RX_CONFIG_ACCEPT_MASK, 0x0e);
        assert_eq!(h.stack.link_events(), [true]);
        assert!(!h.dev.tx_queue_stopped());
    }

    #[test]
    fn close_drops_queued_packets_and_masks_interrupts() {
        let mut h = Harness::new(ChipFeatures::empty());
        h.open();
        for _ in 0..3 {
            assert!(h.dev.start_xmit(SkBuff::copy_from(&[0u8; 60]).unwrap()).is_ok());
        }
        h.dev.close();

        assert!(h.dev.status().contains(DrvStatus::DOWN));
        assert_eq!(h.bus.get16(INTR_MASK), 0);
        assert_eq!(h.dev.stats_snapshot().tx_dropped, 3);
        assert_eq!(h.dma.live_tx_maps(), 0);
        assert!(h.dev.tx_queue_stopped());
        assert!(matches!(
            h.dev.start_xmit(SkBuff::copy_from(&[0u8; 60]).unwrap()),
            NetdevTx::Busy(_)
        ));

        // and up again
        h.open();
        assert!(h.dev.is_running());
    }

    #[test]
    fn map_failure_drops_and_escalates_once() {
        let mut h = Harness::new(ChipFeatures::empty());
        h.open();
        h.dma.fail_tx_maps_after(0);

        for _ in 0..2 {
            assert!(h.dev.start_xmit(SkBuff::copy_from(&[0u8; 60]).unwrap()).is_ok());
        }
        assert_eq!(h.dev.stats_snapshot().tx_dropped, 2);
        assert!(h.dev.tasks.contains(TaskFlags::TX_TIMEOUT));
        assert_eq!(h.platform.work_scheduled(), 1);
    }

    #[test]
    fn storm_settings_are_programmed_live() {
        let mut h = Harness::new(ChipFeatures::STORM_CTRL);
        let limit = StormControl {
            mode: storm::StormMode::PktLimit,
            limit: 500,
        };
        h.dev.set_storm(PacketClass::Multicast, limit).unwrap();
        // down: stored only
        assert_eq!(h.bus.get32(STORM_CTRL_BASE + 4), 0);

        h.open();
        assert_eq!(h.bus.get32(STORM_CTRL_BASE + 4), 0x0001_01f4);
        h.dev.set_storm(PacketClass::Broadcast, limit).unwrap();
        assert_eq!(h.bus.get32(STORM_CTRL_BASE), 0x0001_01f4);
        assert_eq!(h.dev.storm(PacketClass::Broadcast), limit);

        let bad = StormControl { limit: 0, ..limit };
        assert_eq!(
            h.dev.set_storm(PacketClass::Broadcast, bad),
            Err(ConfigError::InvalidStormLimit)
        );
    }

    #[test]
    fn optional_features_are_refused_when_absent() {
        let h = Harness::new(ChipFeatures::empty());
        let limit = StormControl {
            mode: storm::StormMode::RateLimit,
            limit: 1,
        };
        assert_eq!(h.dev.set_storm(PacketClass::Broadcast, limit), Err(ConfigError::Unsupported));
        assert_eq!(h.dev.set_eee(true), Err(ConfigError::Unsupported));
        assert_eq!(h.dev.set_wol(WolFlags::MAGIC), Err(ConfigError::Unsupported));
        assert!(h.dev.set_wol(WolFlags::empty()).is_ok());
    }

    #[test]
    fn rejected_rule_changes_nothing() {
        let h = Harness::new(ChipFeatures::WOL);
        let good = WakeRule {
            enabled: true,
            mask: alloc::vec![0xc0],
            crc: 0x1234,
            offset: 14,
            pattern: Vec::new(),
        };
        h.dev.set_wake_rule(4, good.clone()).unwrap();
        h.bus.clear_log();

        let bad = WakeRule {
            mask: alloc::vec![0x01],
            ..good.clone()
        };
        assert_eq!(
            h.dev.set_wake_rule(4, bad),
            Err(ConfigError::MaskPrefixNotZero { index: 4 })
        );
        assert_eq!(h.dev.wake_rule(4), Ok(good));
        assert!(h.bus.writes().is_empty());
    }

    #[test]
    fn missed_counter_is_folded_in_and_cleared() {
        let mut h = Harness::new(ChipFeatures::empty());
        h.open();
        h.bus.set32(RX_MISSED, 0xff00_0007);
        assert_eq!(h.dev.stats_snapshot().rx_missed, 7);
        assert_eq!(h.bus.get32(RX_MISSED), 0);
        assert_eq!(h.dev.stats_snapshot().rx_missed, 7);
    }

    #[test]
    fn station_address_can_change_while_up() {
        let mut h = Harness::new(ChipFeatures::empty());
        h.open();
        let mac = MacAddress::new([0x02, 0, 0, 0, 0, 0x42]);
        h.dev.set_mac_address(mac).unwrap();
        assert_eq!(h.bus.get32(MAC4), 0x4200);
        assert_eq!(
            h.dev.set_mac_address(MacAddress::broadcast()),
            Err(ConfigError::MalformedPayload)
        );
        assert_eq!(h.dev.mac_address(), mac);
    }
}
