//! Loopback self-test
//!
//! Takes the rings away from the stack, loops frames back at the MAC or at
//! one of the PHY loopback points, and compares what comes back with what
//! went out. The device is restored to normal operation whatever the
//! outcome.

use alloc::vec::Vec;
use core::fmt;

use super::chip::DrvStatus;
use super::error::ConfigError;
use super::regs::{RX_CONFIG, RxAccept, TX_CONFIG, TX_LOOPBACK_MAC, TX_LOOPBACK_MASK};
use super::rx::RxOptions;
use super::stats::Stats;
use super::tx::TxPost;
use super::{Quiesced, Rings, Rtl8169Soc, WorkState};
use crate::drivers::mmio::poll_until;
use crate::net::ethernet::EthernetFrame;
use crate::net::skbuff::SkBuff;

/// Poll attempts per frame before giving up
const LOOPBACK_TRIES: u32 = 1000;
/// Delay between poll attempts
const LOOPBACK_DELAY_US: u32 = 10;
/// IEEE 802 local experimental EtherType
const LOOPBACK_ETHERTYPE: u16 = 0x88b5;

/// Where the frame turns around
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopbackMode {
    /// Inside the MAC, before the PHY interface
    Mac,
    /// Internal PHY, PCS side
    IntPhyPcs,
    /// Internal PHY, line side
    IntPhyRemote,
    /// External PHY, PCS side
    ExtPhyPcs,
    /// External PHY, line side
    ExtPhyRemote,
}

impl LoopbackMode {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Mac),
            1 => Some(Self::IntPhyPcs),
            2 => Some(Self::IntPhyRemote),
            3 => Some(Self::ExtPhyPcs),
            4 => Some(Self::ExtPhyRemote),
            _ => None,
        }
    }
}

/// Successful run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopbackReport {
    pub mode: LoopbackMode,
    pub iterations: u32,
    pub frame_len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopbackError {
    Config(ConfigError),
    /// The chip cannot loop back at this point
    Unsupported,
    /// The interface is not up
    NotRunning,
    /// No RX buffers could be posted
    NoBuffers,
    /// Frame `iteration` never came back
    HardwareFailure { iteration: u32 },
    /// Frame `iteration` came back altered
    DataMismatch { iteration: u32 },
}

impl fmt::Display for LoopbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "{}", e),
            Self::Unsupported => write!(f, "loopback mode not supported"),
            Self::NotRunning => write!(f, "interface is down"),
            Self::NoBuffers => write!(f, "no RX buffers"),
            Self::HardwareFailure { iteration } => write!(f, "frame {} timed out", iteration),
            Self::DataMismatch { iteration } => write!(f, "frame {} corrupted", iteration),
        }
    }
}

impl From<ConfigError> for LoopbackError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Test frame `iteration`: addressed to ourselves, payload counts up
fn test_frame(mac: crate::net::ethernet::MacAddress, len: usize, iteration: u32) -> Vec<u8> {
    let payload: Vec<u8> = (0..len - EthernetFrame::HEADER_SIZE)
        .map(|i| (i as u32).wrapping_add(iteration) as u8)
        .collect();
    let frame = EthernetFrame::new(mac, mac, LOOPBACK_ETHERTYPE, &payload);
    let mut buf = alloc::vec![0u8; frame.size()];
    frame.write_to(&mut buf);
    buf
}

impl Rtl8169Soc {
    /// Send `count` frames of `len` bytes through loopback `mode`
    pub fn loopback_test(&self, mode: LoopbackMode, len: usize, count: u32) -> Result<LoopbackReport, LoopbackError> {
        if !(EthernetFrame::MIN_FRAME_SIZE..=EthernetFrame::MAX_FRAME_SIZE).contains(&len) {
            return Err(ConfigError::InvalidFrameLength { len }.into());
        }

        let work = self.work.lock();
        if !self.is_running() {
            return Err(LoopbackError::NotRunning);
        }
        let Some(rings) = self.rings.as_ref() else {
            return Err(LoopbackError::NotRunning);
        };

        log::info!("[{}] loopback test: {:?}, {} x {} bytes", crate::LOG_TAG, mode, count, len);
        self.status.insert(DrvStatus::LOOPBACK);
        let mut q = self.quiesce(rings, false);

        let result = self.run_loopback(rings, &mut q, &work, mode, len, count);

        if mode != LoopbackMode::Mac {
            // a mode the chip refused was never entered
            if !matches!(result, Err(LoopbackError::Unsupported)) {
                let _ = self.chip.phy_loopback(&self.ctx(), mode, false);
            }
        }
        self.regs.modify32(TX_CONFIG, TX_LOOPBACK_MASK, 0);

        let dropped = rings.tx.reset(q.napi.owner(), &q.producer);
        super::stats::add(&self.stats.tx_dropped, dropped as u64);
        if let Err(e) = rings.rx.rebuild(q.napi.owner()) {
            log::warn!("[{}] RX refill after loopback: {}", crate::LOG_TAG, e);
            self.schedule_task(super::TaskFlags::RESET_PENDING);
        }
        self.hw_start(rings, &work);
        self.status.remove(DrvStatus::LOOPBACK);
        self.finish(rings, q);

        match &result {
            Ok(_) => log::info!("[{}] loopback test passed", crate::LOG_TAG),
            Err(e) => log::warn!("[{}] loopback test failed: {}", crate::LOG_TAG, e),
        }
        result
    }

    fn run_loopback(
        &self,
        rings: &Rings,
        q: &mut Quiesced<'_>,
        work: &WorkState,
        mode: LoopbackMode,
        len: usize,
        count: u32,
    ) -> Result<LoopbackReport, LoopbackError> {
        let dropped = rings.tx.reset(q.napi.owner(), &q.producer);
        super::stats::add(&self.stats.tx_dropped, dropped as u64);
        rings.rx.rebuild(q.napi.owner()).map_err(|_| LoopbackError::NoBuffers)?;

        // interrupts stay masked from the quiesce
        self.hw_start(rings, work);
        match mode {
            LoopbackMode::Mac => self.regs.modify32(TX_CONFIG, TX_LOOPBACK_MASK, TX_LOOPBACK_MAC),
            _ => self
                .chip
                .phy_loopback(&self.ctx(), mode, true)
                .map_err(|_| LoopbackError::Unsupported)?,
        }
        self.regs.modify32(RX_CONFIG, 0, RxAccept::ALL_PHYS.bits());

        // loopback traffic is not interface traffic
        let scratch = Stats::default();
        let opts = RxOptions {
            keep_crc: false,
            checksum: false,
            vlan: false,
            timestamp_us: 0,
        };
        let mac = work.mac;

        for iteration in 0..count {
            let sent = test_frame(mac, len, iteration);
            let skb = SkBuff::copy_from(&sent).map_err(|_| LoopbackError::NoBuffers)?;
            if !matches!(q.producer.post(&*self.regs, skb), TxPost::Queued { .. }) {
                return Err(LoopbackError::HardwareFailure { iteration });
            }

            let owner = q.napi.owner();
            let mut got: Option<SkBuff> = None;
            let came_back = poll_until(
                LOOPBACK_TRIES,
                || self.platform.delay_us(LOOPBACK_DELAY_US),
                || {
                    rings.tx.reclaim(owner, &*self.regs, u32::MAX);
                    rings.rx.drain(owner, 1, &opts, &scratch, &mut |skb| got = Some(skb));
                    rings.rx.refill(owner);
                    got.is_some()
                },
            );
            if !came_back {
                return Err(LoopbackError::HardwareFailure { iteration });
            }
            if got.as_ref().map(|skb| skb.data()) != Some(&sent[..]) {
                return Err(LoopbackError::DataMismatch { iteration });
            }
        }

        Ok(LoopbackReport {
            mode,
            iterations: count,
            frame_len: len,
        })
    }
}
