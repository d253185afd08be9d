//! Receive ring
//!
//! Only the holder of a [`RingOwner`] touches the receive ring, so it needs
//! no producer/consumer protocol on the host side. `cur` is the next slot to
//! inspect; `dirty` is the next slot to refill. In copy mode buffers never
//! leave their slot and the two move together. In zero-copy mode a delivered
//! buffer leaves an `Empty` slot behind until [`RxRing::refill`] posts a new
//! one.
//!
//! ```text
//!   dirty            cur
//!     │               │
//!   ┌─▼───┬─────┬─────▼─────┬──────┬──────┐
//!   │Empty│Empty│ Posted    │Posted│Posted│
//!   └─────┴─────┴───────────┴──────┴──────┘
//!     waiting refill   device may fill ──▶
//! ```

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, Ordering};

use super::chip::ChipFeatures;
use super::desc::*;
use super::stats::{Stats, add, bump};
use crate::drivers::dma::{DmaAddr, DmaDirection, DmaError, DmaOps};
use crate::drivers::mmio::{dma_rmb, dma_wmb};
use crate::net::ethernet::{EthernetFrame, MacAddress};
use crate::net::skbuff::{RxChecksum, SkBuff, alloc_buffer};
use crate::sync::RingOwner;

/// What happens to a completed buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxMode {
    /// Copy the frame out and re-arm the buffer in place
    Copy,
    /// Hand the buffer to the stack and post a fresh one
    ZeroCopy,
}

impl RxMode {
    pub fn for_features(features: ChipFeatures) -> Self {
        if features.contains(ChipFeatures::RX_NO_COPY) {
            Self::ZeroCopy
        } else {
            Self::Copy
        }
    }
}

enum RxSlot {
    Empty,
    Posted { buf: Box<[u8]>, addr: DmaAddr },
}

/// Per-drain receive options
#[derive(Debug, Clone, Copy)]
pub struct RxOptions {
    pub keep_crc: bool,
    pub checksum: bool,
    pub vlan: bool,
    pub timestamp_us: u64,
}

/// Result of one drain pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RxDrained {
    /// Descriptors consumed, errors included
    pub processed: u32,
    /// Frames handed to the stack
    pub delivered: u32,
    /// A FIFO overflow was reported; the ring must be rebuilt
    pub reset_needed: bool,
}

/// Receive descriptor ring with its buffers
pub struct RxRing {
    desc: DescRing,
    slots: Box<[UnsafeCell<RxSlot>]>,
    cur: AtomicU32,
    dirty: AtomicU32,
    buf_size: u32,
    mode: RxMode,
    dma: Arc<dyn DmaOps>,
}

// SAFETY: slots are only accessed by the RingOwner holder
unsafe impl Sync for RxRing {}

impl RxRing {
    pub fn new(dma: Arc<dyn DmaOps>, size: u32, buf_size: u32, mode: RxMode) -> Result<Self, DmaError> {
        let desc = DescRing::new(Arc::clone(&dma), size)?;
        let slots = (0..size).map(|_| UnsafeCell::new(RxSlot::Empty)).collect();
        Ok(Self {
            desc,
            slots,
            cur: AtomicU32::new(0),
            dirty: AtomicU32::new(0),
            buf_size,
            mode,
            dma,
        })
    }

    pub fn size(&self) -> u32 {
        self.desc.size()
    }

    pub fn phys(&self) -> DmaAddr {
        self.desc.phys()
    }

    pub fn mode(&self) -> RxMode {
        self.mode
    }

    pub fn buf_size(&self) -> u32 {
        self.buf_size
    }

    pub(crate) fn desc(&self) -> &DescRing {
        &self.desc
    }

    /// `(cur, dirty)`
    pub fn cursors(&self) -> (u32, u32) {
        (self.cur.load(Ordering::Acquire), self.dirty.load(Ordering::Acquire))
    }

    fn slot(&self, idx: u32) -> *mut RxSlot {
        self.slots[self.desc.entry(idx) as usize].get()
    }

    /// Give descriptor `idx` (with its buffer address already set) to the
    /// device
    fn mark_to_asic(&self, idx: u32) {
        self.desc.set_opts2(idx, 0);
        dma_wmb();
        self.desc
            .set_opts1(idx, DESC_OWN | self.desc.ring_end(idx) | self.buf_size);
    }

    fn make_unusable(&self, idx: u32) {
        self.desc.set_addr(idx, 0);
        self.desc.set_opts1(idx, self.desc.ring_end(idx));
    }

    /// Post buffers into every empty slot in `[from, to)`
    ///
    /// Stops at the first allocation or mapping failure. Returns how many
    /// slots were walked, which is how far `dirty` may advance.
    pub fn fill(&self, _owner: RingOwner<'_>, from: u32, to: u32) -> u32 {
        let mut idx = from;
        while idx != to {
            // SAFETY: owner-only access
            let slot = unsafe { &mut *self.slot(idx) };
            if matches!(slot, RxSlot::Empty) {
                let Ok(buf) = alloc_buffer(self.buf_size as usize) else {
                    self.make_unusable(idx);
                    break;
                };
                let Ok(addr) = self.dma.map(&buf, DmaDirection::FromDevice) else {
                    self.make_unusable(idx);
                    break;
                };
                self.desc.set_addr(idx, addr);
                *slot = RxSlot::Posted { buf, addr };
                self.mark_to_asic(idx);
            }
            idx = idx.wrapping_add(1);
        }
        idx.wrapping_sub(from)
    }

    /// Refill after a drain
    ///
    /// Returns `true` when the ring is starved: every slot is empty and
    /// the device has nowhere to put a frame.
    pub fn refill(&self, owner: RingOwner<'_>) -> bool {
        let (cur, dirty) = self.cursors();
        let delta = self.fill(owner, dirty, cur);
        let dirty = dirty.wrapping_add(delta);
        self.dirty.store(dirty, Ordering::Release);
        cur.wrapping_sub(dirty) == self.size()
    }

    /// Drop every buffer, zero the ring and post a full set of buffers
    pub fn rebuild(&self, owner: RingOwner<'_>) -> Result<(), DmaError> {
        self.release_all();
        self.desc.clear();
        self.cur.store(0, Ordering::Release);
        self.dirty.store(0, Ordering::Release);

        let size = self.size();
        if self.fill(owner, 0, size) != size {
            return Err(DmaError::AllocationFailed);
        }
        Ok(())
    }

    fn release_all(&self) {
        for slot in self.slots.iter() {
            // SAFETY: owner-only access, or exclusive from Drop
            if let RxSlot::Posted { buf, addr } = unsafe { core::mem::replace(&mut *slot.get(), RxSlot::Empty) } {
                self.dma.unmap(addr, buf.len(), DmaDirection::FromDevice);
            }
        }
    }

    /// Process up to `budget` completed descriptors
    ///
    /// Good frames go to `sink`. Bad frames are counted in `stats` and
    /// their buffers re-armed.
    pub fn drain(
        &self,
        _owner: RingOwner<'_>,
        budget: u32,
        opts: &RxOptions,
        stats: &Stats,
        sink: &mut dyn FnMut(SkBuff),
    ) -> RxDrained {
        let (start, dirty) = self.cursors();
        let limit = (self.size() - start.wrapping_sub(dirty)).min(budget);
        let mut done = RxDrained::default();
        let mut cur = start;

        while done.processed < limit {
            // SAFETY: owner-only access
            let slot = unsafe { &mut *self.slot(cur) };
            if matches!(slot, RxSlot::Empty) {
                break;
            }
            let status = self.desc.opts1(cur);
            if status & DESC_OWN != 0 {
                break;
            }
            dma_rmb();

            done.processed += 1;
            if let Some(skb) = self.complete(cur, slot, status, opts, stats, &mut done) {
                done.delivered += 1;
                sink(skb);
            }
            cur = cur.wrapping_add(1);
        }

        self.cur.store(cur, Ordering::Release);
        if self.mode == RxMode::Copy {
            self.dirty.store(cur, Ordering::Release);
        }
        done
    }

    /// Turn one completed descriptor into a frame, or count why not
    fn complete(
        &self,
        idx: u32,
        slot: &mut RxSlot,
        status: u32,
        opts: &RxOptions,
        stats: &Stats,
        done: &mut RxDrained,
    ) -> Option<SkBuff> {
        if status & RX_RES != 0 {
            bump(&stats.rx_errors);
            if status & (RX_RWT | RX_RUNT) != 0 {
                bump(&stats.rx_length_errors);
            }
            if status & RX_CRC != 0 {
                bump(&stats.rx_crc_errors);
            }
            if status & RX_FOVF != 0 {
                bump(&stats.rx_fifo_errors);
                done.reset_needed = true;
            }
            self.mark_to_asic(idx);
            return None;
        }

        // Multi-descriptor frames are not reassembled
        if status & (FIRST_FRAG | LAST_FRAG) != FIRST_FRAG | LAST_FRAG {
            bump(&stats.rx_dropped);
            bump(&stats.rx_length_errors);
            self.mark_to_asic(idx);
            return None;
        }

        let mut len = status & RX_LEN_MASK;
        if !opts.keep_crc {
            len = len.saturating_sub(EthernetFrame::FCS_SIZE as u32);
        }
        if len > self.buf_size {
            bump(&stats.rx_length_errors);
            self.mark_to_asic(idx);
            return None;
        }
        let len = len as usize;

        let mut skb = match self.mode {
            RxMode::Copy => {
                let RxSlot::Posted { buf, addr } = slot else {
                    return None;
                };
                self.dma.sync_for_cpu(*addr, len, DmaDirection::FromDevice);
                let copied = SkBuff::copy_from(&buf[..len]);
                self.dma.sync_for_device(*addr, len, DmaDirection::FromDevice);
                self.mark_to_asic(idx);
                match copied {
                    Ok(skb) => skb,
                    Err(_) => {
                        bump(&stats.rx_dropped);
                        return None;
                    }
                }
            }
            RxMode::ZeroCopy => {
                let RxSlot::Posted { buf, addr } = core::mem::replace(slot, RxSlot::Empty) else {
                    return None;
                };
                self.dma.unmap(addr, buf.len(), DmaDirection::FromDevice);
                SkBuff::from_buffer(buf, len)
            }
        };

        let opts2 = self.desc.opts2(idx);
        let meta = skb.rx_mut();
        if opts.checksum {
            meta.checksum = checksum_status(status);
        }
        if opts.vlan && opts2 & RX_VLAN_TAG != 0 {
            meta.vlan_tci = Some((opts2 as u16).swap_bytes());
        }
        meta.timestamp_us = opts.timestamp_us;

        if MacAddress::destination_of(skb.data()).is_some_and(|mac| mac.is_multicast()) {
            bump(&stats.multicast);
        }
        bump(&stats.rx_packets);
        add(&stats.rx_bytes, len as u64);
        Some(skb)
    }
}

impl Drop for RxRing {
    fn drop(&mut self) {
        self.release_all();
    }
}

/// Checksum hint from the protocol id and fail bits
fn checksum_status(opts1: u32) -> RxChecksum {
    let status = opts1 & (RX_PROTO_MASK | RX_CS_FAIL_MASK);
    if status == RX_PROTO_TCP || status == RX_PROTO_UDP {
        RxChecksum::Unnecessary
    } else {
        RxChecksum::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::dma::IdentityDma;
    use crate::drivers::net::ethernet::realtek::r8169soc::testing::FlakyDma;
    use alloc::vec::Vec;

    const BUF: u32 = 0x5f3;

    fn opts() -> RxOptions {
        RxOptions {
            keep_crc: false,
            checksum: true,
            vlan: true,
            timestamp_us: 7,
        }
    }

    fn ring(size: u32, mode: RxMode) -> RxRing {
        let ring = RxRing::new(Arc::new(IdentityDma::coherent()), size, BUF, mode).unwrap();
        ring.rebuild(RingOwner::for_test()).unwrap();
        ring
    }

    /// Play the device: write `frame` plus FCS into slot `idx` and complete it
    fn deliver(ring: &RxRing, idx: u32, frame: &[u8], extra: u32, opts2: u32) {
        // SAFETY: test plays the device for a descriptor it owns
        let slot = unsafe { &mut *ring.slot(idx) };
        if let RxSlot::Posted { buf, .. } = slot {
            buf[..frame.len()].copy_from_slice(frame);
        }
        let keep = ring.desc.opts1(idx) & RING_END;
        ring.desc.set_opts2(idx, opts2);
        ring.desc
            .set_opts1(idx, keep | extra | (frame.len() as u32 + 4));
    }

    fn drain(ring: &RxRing, stats: &Stats) -> (RxDrained, Vec<SkBuff>) {
        let mut frames = Vec::new();
        let done = ring.drain(RingOwner::for_test(), 64, &opts(), stats, &mut |skb| frames.push(skb));
        (done, frames)
    }

    #[test]
    fn rebuild_posts_every_slot_with_ring_end_on_last() {
        let ring = ring(16, RxMode::Copy);
        for idx in 0..16 {
            let opts1 = ring.desc.opts1(idx);
            assert_ne!(opts1 & DESC_OWN, 0);
            assert_eq!(opts1 & RX_LEN_MASK, BUF);
            assert_ne!(ring.desc.addr(idx), 0);
        }
        assert_eq!(ring.desc.opts1(15) & RING_END, RING_END);
        assert_eq!(ring.desc.opts1(14) & RING_END, 0);
    }

    #[test]
    fn copy_mode_delivers_and_rearms() {
        let ring = ring(16, RxMode::Copy);
        let stats = Stats::default();
        let mut frame = [0u8; 64];
        frame[0] = 0x01;
        deliver(&ring, 0, &frame, FIRST_FRAG | LAST_FRAG | RX_PROTO_TCP, RX_VLAN_TAG | 0x3412);

        let (done, frames) = drain(&ring, &stats);
        assert_eq!(done.delivered, 1);
        assert_eq!(frames[0].len(), 64);
        assert_eq!(frames[0].rx().checksum, RxChecksum::Unnecessary);
        assert_eq!(frames[0].rx().vlan_tci, Some(0x1234));
        assert_eq!(frames[0].rx().timestamp_us, 7);

        let snap = stats.snapshot();
        assert_eq!((snap.rx_packets, snap.rx_bytes, snap.multicast), (1, 64, 1));
        assert_ne!(ring.desc.opts1(0) & DESC_OWN, 0);
        assert_eq!(ring.cursors(), (1, 1));
    }

    #[test]
    fn mid_fragment_is_dropped_and_counted() {
        let ring = ring(16, RxMode::Copy);
        let stats = Stats::default();
        deliver(&ring, 0, &[0; 64], 0, 0);
        deliver(&ring, 1, &[0; 64], FIRST_FRAG, 0);

        let (done, frames) = drain(&ring, &stats);
        assert!(frames.is_empty());
        assert_eq!(done.processed, 2);
        let snap = stats.snapshot();
        assert_eq!(snap.rx_length_errors, 2);
        assert_eq!(snap.rx_dropped, 2);
        assert_eq!(snap.rx_packets, 0);
    }

    #[test]
    fn error_summary_bits_are_counted() {
        let ring = ring(16, RxMode::Copy);
        let stats = Stats::default();
        deliver(&ring, 0, &[0; 64], FIRST_FRAG | LAST_FRAG | RX_RES | RX_CRC, 0);
        deliver(&ring, 1, &[0; 64], FIRST_FRAG | LAST_FRAG | RX_RES | RX_RUNT, 0);
        deliver(&ring, 2, &[0; 64], FIRST_FRAG | LAST_FRAG | RX_RES | RX_FOVF, 0);

        let (done, frames) = drain(&ring, &stats);
        assert!(frames.is_empty());
        assert!(done.reset_needed);
        let snap = stats.snapshot();
        assert_eq!(snap.rx_errors, 3);
        assert_eq!(snap.rx_crc_errors, 1);
        assert_eq!(snap.rx_length_errors, 1);
        assert_eq!(snap.rx_fifo_errors, 1);
    }

    #[test]
    fn checksum_hint_requires_clean_status() {
        assert_eq!(checksum_status(RX_PROTO_UDP), RxChecksum::Unnecessary);
        assert_eq!(checksum_status(RX_PROTO_TCP | TCP_FAIL), RxChecksum::None);
        assert_eq!(checksum_status(RX_PROTO_TCP | IP_FAIL), RxChecksum::None);
        assert_eq!(checksum_status(0), RxChecksum::None);
    }

    #[test]
    fn drain_stops_at_device_owned_slot_and_budget() {
        let ring = ring(16, RxMode::Copy);
        let stats = Stats::default();
        for idx in 0..3 {
            deliver(&ring, idx, &[0; 60], FIRST_FRAG | LAST_FRAG, 0);
        }
        let mut n = 0;
        let done = ring.drain(RingOwner::for_test(), 2, &opts(), &stats, &mut |_| n += 1);
        assert_eq!((done.processed, n), (2, 2));

        let (done, _) = drain(&ring, &stats);
        assert_eq!(done.processed, 1);
        assert_eq!(ring.cursors().0, 3);
    }

    #[test]
    fn zero_copy_hands_buffer_over_and_refills() {
        let ring = ring(16, RxMode::ZeroCopy);
        let stats = Stats::default();
        deliver(&ring, 0, &[0xaa; 100], FIRST_FRAG | LAST_FRAG, 0);

        let (_, frames) = drain(&ring, &stats);
        assert_eq!(frames[0].data(), &[0xaa; 100][..]);
        assert_eq!(ring.cursors(), (1, 0));

        assert!(!ring.refill(RingOwner::for_test()));
        assert_eq!(ring.cursors(), (1, 1));
        assert_ne!(ring.desc.opts1(0) & DESC_OWN, 0);
    }

    #[test]
    fn zero_copy_starvation_is_detected() {
        let dma = Arc::new(FlakyDma::new());
        let ring = RxRing::new(dma.clone(), 16, BUF, RxMode::ZeroCopy).unwrap();
        ring.rebuild(RingOwner::for_test()).unwrap();
        let stats = Stats::default();
        dma.fail_rx_maps(true);

        for round in 0..16u32 {
            deliver(&ring, round, &[0; 60], FIRST_FRAG | LAST_FRAG, 0);
            let (done, _) = drain(&ring, &stats);
            assert_eq!(done.delivered, 1);
            assert_eq!(ring.refill(RingOwner::for_test()), round == 15);
        }

        // nothing posted: drain finds no work
        let (done, _) = drain(&ring, &stats);
        assert_eq!(done.processed, 0);

        dma.fail_rx_maps(false);
        assert!(!ring.refill(RingOwner::for_test()));
        assert_eq!(ring.cursors(), (16, 16));
    }
}
