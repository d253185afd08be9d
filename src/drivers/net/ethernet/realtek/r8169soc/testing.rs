//! Host-side test doubles
//!
//! - [`MockBus`]: byte-addressed register file with a write log, W1C status
//!   registers, a self-clearing reset bit that can be held, and per-offset
//!   write hooks
//! - [`MockChip`]: records strategy calls and injects bring-up failures
//! - [`MockPlatform`]: counts scheduling requests, never sleeps
//! - [`FlakyDma`]: identity DMA with injectable mapping failures
//! - [`RecordingStack`]: collects everything the driver hands upward
//! - [`FakeMac`]: plays the device side of the descriptor rings
//! - [`Harness`]: a probed device wired to all of the above

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use super::chip::{ChipContext, ChipFeatures, ChipOps};
use super::config::DeviceConfig;
use super::desc::{DESC_OWN, FIRST_FRAG, LAST_FRAG, RING_END, RX_LEN_MASK, TX_LEN_MASK};
use super::error::ConfigError;
use super::loopback::LoopbackMode;
use super::regs::*;
use super::{Resources, Rtl8169Soc};
use crate::drivers::dma::{CoherentRegion, DmaAddr, DmaDirection, DmaError, DmaOps, IdentityDma};
use crate::drivers::mmio::RegisterBus;
use crate::drivers::net::netdev::NetStack;
use crate::drivers::platform::Platform;
use crate::net::ethernet::MacAddress;
use crate::net::skbuff::SkBuff;

// ============================================================================
// Register Bus
// ============================================================================

/// One logged register write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BusWrite {
    pub offset: usize,
    pub width: u8,
    pub value: u32,
}

pub(crate) type Hook = Arc<dyn Fn(&MockBus, u32) + Send + Sync>;

struct BusState {
    mem: BTreeMap<usize, u8>,
    log: Vec<BusWrite>,
}

struct BusInner {
    state: Mutex<BusState>,
    hooks: Mutex<Vec<(usize, Hook)>>,
    hold_reset: AtomicBool,
    reset_issued: AtomicBool,
}

#[derive(Clone)]
pub(crate) struct MockBus {
    inner: Arc<BusInner>,
}

impl MockBus {
    pub fn new() -> Self {
        let bus = Self {
            inner: Arc::new(BusInner {
                state: Mutex::new(BusState {
                    mem: BTreeMap::new(),
                    log: Vec::new(),
                }),
                hooks: Mutex::new(Vec::new()),
                hold_reset: AtomicBool::new(false),
                reset_issued: AtomicBool::new(false),
            }),
        };
        bus.set8(MCU, (Mcu::RXTX_EMPTY | Mcu::LINK_LIST_RDY).bits());
        bus
    }

    fn poke(&self, offset: usize, bytes: &[u8]) {
        let mut state = self.inner.state.lock().unwrap();
        for (i, b) in bytes.iter().enumerate() {
            state.mem.insert(offset + i, *b);
        }
    }

    fn peek<const N: usize>(&self, offset: usize) -> [u8; N] {
        let state = self.inner.state.lock().unwrap();
        core::array::from_fn(|i| state.mem.get(&(offset + i)).copied().unwrap_or(0))
    }

    /// Set register contents without logging a write
    pub fn set8(&self, offset: usize, value: u8) {
        self.poke(offset, &[value]);
    }

    pub fn set16(&self, offset: usize, value: u16) {
        self.poke(offset, &value.to_le_bytes());
    }

    pub fn set32(&self, offset: usize, value: u32) {
        self.poke(offset, &value.to_le_bytes());
    }

    pub fn get8(&self, offset: usize) -> u8 {
        self.peek::<1>(offset)[0]
    }

    pub fn get16(&self, offset: usize) -> u16 {
        u16::from_le_bytes(self.peek(offset))
    }

    pub fn get32(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.peek(offset))
    }

    pub fn writes(&self) -> Vec<BusWrite> {
        self.inner.state.lock().unwrap().log.clone()
    }

    /// Values written to `offset`, oldest first
    pub fn writes_to(&self, offset: usize) -> Vec<u32> {
        self.writes()
            .into_iter()
            .filter(|w| w.offset == offset)
            .map(|w| w.value)
            .collect()
    }

    pub fn last_write(&self, offset: usize) -> Option<u32> {
        self.writes_to(offset).last().copied()
    }

    pub fn clear_log(&self) {
        self.inner.state.lock().unwrap().log.clear();
    }

    /// Run `hook` after every write to `offset`
    pub fn on_write(&self, offset: usize, hook: Hook) {
        self.inner.hooks.lock().unwrap().push((offset, hook));
    }

    /// Keep the next MAC reset asserted until [`MockBus::release_reset`];
    /// reads of `CHIP_CMD` block meanwhile
    pub fn hold_next_reset(&self) {
        self.inner.hold_reset.store(true, Ordering::SeqCst);
    }

    pub fn reset_issued(&self) -> bool {
        self.inner.reset_issued.load(Ordering::SeqCst)
    }

    pub fn release_reset(&self) {
        let cmd = self.get8(CHIP_CMD) & !ChipCmd::RESET.bits();
        self.set8(CHIP_CMD, cmd);
        self.inner.hold_reset.store(false, Ordering::SeqCst);
    }

    fn store(&self, offset: usize, width: u8, value: u32) {
        {
            let mut state = self.inner.state.lock().unwrap();
            let n = width as usize / 8;
            let mut value_bytes = value.to_le_bytes();

            if offset == INTR_STATUS || offset == WAKE_STATUS {
                // write 1 to clear
                for (i, b) in value_bytes.iter_mut().enumerate().take(n) {
                    let cur = state.mem.get(&(offset + i)).copied().unwrap_or(0);
                    *b = cur & !*b;
                }
            }
            if offset == CHIP_CMD && value as u8 & ChipCmd::RESET.bits() != 0 {
                if self.inner.hold_reset.load(Ordering::SeqCst) {
                    self.inner.reset_issued.store(true, Ordering::SeqCst);
                } else {
                    value_bytes[0] &= !ChipCmd::RESET.bits();
                }
            }

            for (i, b) in value_bytes.iter().enumerate().take(n) {
                state.mem.insert(offset + i, *b);
            }
            state.log.push(BusWrite { offset, width, value });
        }

        let hooks: Vec<Hook> = self
            .inner
            .hooks
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, _)| *o == offset)
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for hook in hooks {
            hook(self, value);
        }
    }
}

impl RegisterBus for MockBus {
    fn read8(&self, offset: usize) -> u8 {
        if offset == CHIP_CMD {
            while self.inner.hold_reset.load(Ordering::SeqCst) && self.inner.reset_issued.load(Ordering::SeqCst) {
                std::thread::yield_now();
            }
        }
        self.get8(offset)
    }

    fn read16(&self, offset: usize) -> u16 {
        self.get16(offset)
    }

    fn read32(&self, offset: usize) -> u32 {
        self.get32(offset)
    }

    fn write8(&self, offset: usize, value: u8) {
        self.store(offset, 8, value as u32);
    }

    fn write16(&self, offset: usize, value: u16) {
        self.store(offset, 16, value as u32);
    }

    fn write32(&self, offset: usize, value: u32) {
        self.store(offset, 32, value);
    }
}

// ============================================================================
// Chip Strategy
// ============================================================================

struct ChipInner {
    features: ChipFeatures,
    calls: Mutex<Vec<&'static str>>,
    fail_at: Mutex<Option<&'static str>>,
    phy_loopback: AtomicBool,
}

#[derive(Clone)]
pub(crate) struct MockChip {
    inner: Arc<ChipInner>,
}

impl MockChip {
    pub fn new(features: ChipFeatures) -> Self {
        Self {
            inner: Arc::new(ChipInner {
                features,
                calls: Mutex::new(Vec::new()),
                fail_at: Mutex::new(None),
                phy_loopback: AtomicBool::new(false),
            }),
        }
    }

    /// Mark HW_FAIL whenever `step` runs
    pub fn fail_at(self, step: &'static str) -> Self {
        self.set_fail_at(Some(step));
        self
    }

    pub fn set_fail_at(&self, step: Option<&'static str>) {
        *self.inner.fail_at.lock().unwrap() = step;
    }

    pub fn with_phy_loopback(self) -> Self {
        self.inner.phy_loopback.store(true, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.inner.calls.lock().unwrap().clear();
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| **c == name).count()
    }

    fn record(&self, ctx: &ChipContext<'_>, name: &'static str) {
        self.inner.calls.lock().unwrap().push(name);
        if *self.inner.fail_at.lock().unwrap() == Some(name) {
            ctx.mark_hw_fail();
        }
    }
}

impl ChipOps for MockChip {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn features(&self) -> ChipFeatures {
        self.inner.features
    }

    fn reset_phy_mac(&self, ctx: &ChipContext<'_>) {
        self.record(ctx, "reset_phy_mac");
    }

    fn clock_and_pll_init(&self, ctx: &ChipContext<'_>) {
        self.record(ctx, "clock_and_pll_init");
    }

    fn mdio_and_phy_bringup(&self, ctx: &ChipContext<'_>) {
        self.record(ctx, "mdio_and_phy_bringup");
    }

    fn mac_mcu_patch(&self, ctx: &ChipContext<'_>) {
        self.record(ctx, "mac_mcu_patch");
    }

    fn wakeup_arm(&self, ctx: &ChipContext<'_>, enable: bool) {
        self.record(ctx, if enable { "wakeup_arm_on" } else { "wakeup_arm_off" });
    }

    fn led_set(&self, ctx: &ChipContext<'_>, enable: bool) {
        self.record(ctx, if enable { "led_on" } else { "led_off" });
    }

    fn eee_set(&self, ctx: &ChipContext<'_>, enable: bool) {
        self.record(ctx, if enable { "eee_on" } else { "eee_off" });
    }

    fn phy_loopback(&self, ctx: &ChipContext<'_>, _mode: LoopbackMode, enable: bool) -> Result<(), ConfigError> {
        if !self.inner.phy_loopback.load(Ordering::SeqCst) {
            return Err(ConfigError::Unsupported);
        }
        self.record(ctx, if enable { "phy_loopback_on" } else { "phy_loopback_off" });
        Ok(())
    }

    fn dump_regs(&self, _ctx: &ChipContext<'_>, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "mock regs")
    }

    fn dump_var(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "mock var")
    }
}

// ============================================================================
// Platform
// ============================================================================

#[derive(Default)]
struct PlatformInner {
    work: AtomicU32,
    polls: AtomicU32,
    delay_us: AtomicU64,
    clock_us: AtomicU64,
}

#[derive(Clone, Default)]
pub(crate) struct MockPlatform {
    inner: Arc<PlatformInner>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn work_scheduled(&self) -> u32 {
        self.inner.work.load(Ordering::SeqCst)
    }

    pub fn polls_scheduled(&self) -> u32 {
        self.inner.polls.load(Ordering::SeqCst)
    }

    pub fn total_delay_us(&self) -> u64 {
        self.inner.delay_us.load(Ordering::SeqCst)
    }
}

impl Platform for MockPlatform {
    fn delay_us(&self, us: u32) {
        self.inner.delay_us.fetch_add(us as u64, Ordering::SeqCst);
    }

    fn timestamp_us(&self) -> u64 {
        self.inner.clock_us.fetch_add(1, Ordering::SeqCst)
    }

    fn schedule_poll(&self) {
        self.inner.polls.fetch_add(1, Ordering::SeqCst);
    }

    fn schedule_work(&self) {
        self.inner.work.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// DMA
// ============================================================================

/// Identity DMA whose streaming mappings can be made to fail
pub(crate) struct FlakyDma {
    inner: IdentityDma,
    fail_rx: AtomicBool,
    /// Successful TX maps left before failing; negative means unlimited
    tx_budget: AtomicI64,
    live_tx: AtomicI64,
}

impl FlakyDma {
    pub fn new() -> Self {
        Self {
            inner: IdentityDma::coherent(),
            fail_rx: AtomicBool::new(false),
            tx_budget: AtomicI64::new(-1),
            live_tx: AtomicI64::new(0),
        }
    }

    pub fn fail_rx_maps(&self, fail: bool) {
        self.fail_rx.store(fail, Ordering::SeqCst);
    }

    pub fn fail_tx_maps_after(&self, n: i64) {
        self.tx_budget.store(n, Ordering::SeqCst);
    }

    pub fn live_tx_maps(&self) -> i64 {
        self.live_tx.load(Ordering::SeqCst)
    }
}

impl DmaOps for FlakyDma {
    fn alloc_coherent(&self, layout: core::alloc::Layout) -> Result<CoherentRegion, DmaError> {
        self.inner.alloc_coherent(layout)
    }

    unsafe fn free_coherent(&self, region: CoherentRegion) {
        // SAFETY: forwarded contract
        unsafe { self.inner.free_coherent(region) }
    }

    fn map(&self, buf: &[u8], dir: DmaDirection) -> Result<DmaAddr, DmaError> {
        match dir {
            DmaDirection::FromDevice if self.fail_rx.load(Ordering::SeqCst) => {
                return Err(DmaError::MappingFailed);
            }
            DmaDirection::ToDevice => {
                let budget = self.tx_budget.load(Ordering::SeqCst);
                if budget == 0 {
                    return Err(DmaError::MappingFailed);
                }
                if budget > 0 {
                    self.tx_budget.fetch_sub(1, Ordering::SeqCst);
                }
                self.live_tx.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
        self.inner.map(buf, dir)
    }

    fn unmap(&self, addr: DmaAddr, len: usize, dir: DmaDirection) {
        if dir == DmaDirection::ToDevice {
            self.live_tx.fetch_sub(1, Ordering::SeqCst);
        }
        self.inner.unmap(addr, len, dir)
    }
}

// ============================================================================
// Network Stack
// ============================================================================

#[derive(Default)]
pub(crate) struct RecordingStack {
    frames: Mutex<Vec<SkBuff>>,
    links: Mutex<Vec<bool>>,
    wakes: AtomicU32,
}

impl RecordingStack {
    pub fn take_frames(&self) -> Vec<SkBuff> {
        core::mem::take(&mut *self.frames.lock().unwrap())
    }

    pub fn link_events(&self) -> Vec<bool> {
        self.links.lock().unwrap().clone()
    }

    pub fn wakes(&self) -> u32 {
        self.wakes.load(Ordering::SeqCst)
    }
}

impl NetStack for RecordingStack {
    fn receive_indicate(&self, skb: SkBuff) {
        self.frames.lock().unwrap().push(skb);
    }

    fn link_changed(&self, up: bool) {
        self.links.lock().unwrap().push(up);
    }

    fn tx_queue_wake(&self) {
        self.wakes.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Device Side of the Rings
// ============================================================================

/// Walks the descriptor rings the way the MAC would
///
/// Relies on identity-mapped DMA: bus addresses are CPU pointers.
pub(crate) struct FakeMac {
    bus: MockBus,
    tx_base: u64,
    tx_size: u32,
    rx_base: u64,
    rx_size: u32,
    close_index: bool,
    cursors: Mutex<(u32, u32)>,
}

impl FakeMac {
    /// Pick up the ring bases the driver programmed last
    pub fn attach(bus: &MockBus, tx_size: u32, rx_size: u32, close_index: bool) -> Self {
        let base = |lo: usize, hi: usize| {
            (bus.last_write(hi).unwrap_or(0) as u64) << 32 | bus.last_write(lo).unwrap_or(0) as u64
        };
        Self {
            bus: bus.clone(),
            tx_base: base(TX_DESC_START_ADDR_LOW, TX_DESC_START_ADDR_HIGH),
            tx_size,
            rx_base: base(RX_DESC_ADDR_LOW, RX_DESC_ADDR_HIGH),
            rx_size,
            close_index,
            cursors: Mutex::new((0, 0)),
        }
    }

    /// Both rings were rebuilt: start over at slot 0
    pub fn reset_cursors(&self) {
        *self.cursors.lock().unwrap() = (0, 0);
    }

    fn word(base: u64, size: u32, idx: u32, word: usize) -> *mut u32 {
        (base as usize + (idx % size) as usize * 16 + word * 4) as *mut u32
    }

    fn read(base: u64, size: u32, idx: u32, word: usize) -> u32 {
        // SAFETY: identity-mapped descriptor memory owned by the live device
        u32::from_le(unsafe { core::ptr::read_volatile(Self::word(base, size, idx, word)) })
    }

    fn write(base: u64, size: u32, idx: u32, word: usize, value: u32) {
        // SAFETY: see read
        unsafe { core::ptr::write_volatile(Self::word(base, size, idx, word), value.to_le()) }
    }

    fn buffer_addr(base: u64, size: u32, idx: u32) -> usize {
        (Self::read(base, size, idx, 2) as u64 | (Self::read(base, size, idx, 3) as u64) << 32) as usize
    }

    /// Transmit everything the driver handed over; returns the frames
    pub fn complete_tx(&self) -> Vec<Vec<u8>> {
        let mut cursors = self.cursors.lock().unwrap();
        let mut frames = Vec::new();
        let mut current = Vec::new();

        loop {
            let idx = cursors.0;
            let opts1 = Self::read(self.tx_base, self.tx_size, idx, 0);
            if opts1 & DESC_OWN == 0 {
                break;
            }
            if opts1 & FIRST_FRAG != 0 {
                current.clear();
            }
            let len = (opts1 & TX_LEN_MASK) as usize;
            let addr = Self::buffer_addr(self.tx_base, self.tx_size, idx);
            // SAFETY: the driver mapped `len` bytes at `addr`
            current.extend_from_slice(unsafe { core::slice::from_raw_parts(addr as *const u8, len) });
            Self::write(self.tx_base, self.tx_size, idx, 0, opts1 & !DESC_OWN);
            if opts1 & LAST_FRAG != 0 {
                frames.push(core::mem::take(&mut current));
            }
            cursors.0 = idx.wrapping_add(1);
        }

        if self.close_index {
            self.bus.set16(TX_DESC_CLOSE_IDX, (cursors.0 & TX_DESC_CNT_MASK) as u16);
        }
        frames
    }

    /// Receive `frame` (FCS appended) into the next posted buffer
    pub fn receive(&self, frame: &[u8]) -> bool {
        self.deliver(frame, FIRST_FRAG | LAST_FRAG, 0)
    }

    /// Complete the next RX descriptor with `frame` and explicit status bits
    pub fn deliver(&self, frame: &[u8], status: u32, opts2: u32) -> bool {
        let mut cursors = self.cursors.lock().unwrap();
        let idx = cursors.1;
        let opts1 = Self::read(self.rx_base, self.rx_size, idx, 0);
        if opts1 & DESC_OWN == 0 {
            return false;
        }
        let room = (opts1 & RX_LEN_MASK) as usize;
        let len = frame.len().min(room.saturating_sub(4));
        let addr = Self::buffer_addr(self.rx_base, self.rx_size, idx);
        // SAFETY: the driver posted a buffer of `room` bytes at `addr`
        unsafe {
            let buf = core::slice::from_raw_parts_mut(addr as *mut u8, room);
            buf[..len].copy_from_slice(&frame[..len]);
            buf[len..len + 4].fill(0);
        }
        Self::write(self.rx_base, self.rx_size, idx, 1, opts2);
        Self::write(
            self.rx_base,
            self.rx_size,
            idx,
            0,
            (opts1 & RING_END) | status | (len as u32 + 4),
        );
        cursors.1 = idx.wrapping_add(1);
        true
    }
}

// ============================================================================
// Harness
// ============================================================================

pub(crate) const TEST_MAC: MacAddress = MacAddress::new([0x00, 0xe0, 0x4c, 0x68, 0x00, 0x01]);

pub(crate) fn test_config() -> DeviceConfig {
    DeviceConfig {
        mac_address: TEST_MAC,
        tx_ring_size: 64,
        rx_ring_size: Some(32),
        ..DeviceConfig::default()
    }
}

pub(crate) struct Harness {
    pub bus: MockBus,
    pub chip: MockChip,
    pub platform: MockPlatform,
    pub dma: Arc<FlakyDma>,
    pub stack: Arc<RecordingStack>,
    pub dev: Rtl8169Soc,
}

impl Harness {
    pub fn new(features: ChipFeatures) -> Self {
        Self::with_config(MockChip::new(features), test_config())
    }

    pub fn with_config(chip: MockChip, config: DeviceConfig) -> Self {
        Self::try_with_config(chip, config).unwrap_or_else(|e| panic!("probe failed: {}", e))
    }

    pub fn try_with_config(chip: MockChip, config: DeviceConfig) -> Result<Self, super::error::ProbeError> {
        let bus = MockBus::new();
        let platform = MockPlatform::new();
        let dma = Arc::new(FlakyDma::new());
        let stack = Arc::new(RecordingStack::default());

        if chip.features().contains(ChipFeatures::TX_NO_CLOSE) {
            // latching a new ring base restarts the close index at 0
            bus.on_write(
                TX_DESC_START_ADDR_LOW,
                Arc::new(|bus: &MockBus, _| bus.set16(TX_DESC_CLOSE_IDX, 0)),
            );
        }

        let dev = Rtl8169Soc::probe(
            Resources {
                regs: Box::new(bus.clone()),
                chip: Box::new(chip.clone()),
                dma: dma.clone(),
                platform: Arc::new(platform.clone()),
                stack: stack.clone(),
            },
            config,
        )?;
        Ok(Self {
            bus,
            chip,
            platform,
            dma,
            stack,
            dev,
        })
    }

    pub fn open(&mut self) {
        self.dev.open().unwrap_or_else(|e| panic!("open failed: {}", e));
    }

    pub fn fake_mac(&self) -> FakeMac {
        let features = self.chip.features();
        FakeMac::attach(
            &self.bus,
            self.dev.config.tx_ring_size,
            self.dev.config.rx_ring_size(features),
            features.contains(ChipFeatures::TX_NO_CLOSE),
        )
    }

    /// Raise interrupt status bits the way the MAC would
    pub fn raise(&self, bits: IntrStatus) {
        let cur = self.bus.get16(INTR_STATUS);
        self.bus.set16(INTR_STATUS, cur | bits.bits());
    }
}
