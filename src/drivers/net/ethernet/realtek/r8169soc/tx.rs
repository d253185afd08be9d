//! Transmit ring
//!
//! One producer (the transmit path, serialized by `xmit_lock`) and one
//! reclaimer (the poll routine, or whoever holds a [`RingOwner`]) share the
//! ring without a lock:
//!
//! ```text
//!            consumed                      produced
//!               │                              │
//!   ┌───────┬───▼───┬───────┬───────┬───────┬──▼────┬───────┐
//!   │ Empty │Posted │Posted │Posted │Posted │ Empty │ Empty │
//!   └───────┴───────┴───────┴───────┴───────┴───────┴───────┘
//!              reclaimer owns ──────▶         producer owns ──▶
//! ```
//!
//! Both cursors run freely and wrap only through `entry()`. The producer
//! publishes `produced` with Release after the descriptors are handed to the
//! device; the reclaimer publishes `consumed` with Release after the slot
//! buffers are released.
//!
//! Flow control uses a `stopped` flag plus a SeqCst fence on each side:
//!
//! ```text
//!   producer                         reclaimer
//!   stopped = true                   consumed = new
//!   fence(SeqCst)                    fence(SeqCst)
//!   reread consumed                  read stopped
//!   room? CAS stopped true→false     stopped && room? CAS stopped true→false
//! ```
//!
//! At least one side observes the other's store, and the CAS makes the
//! reopening happen exactly once.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::cell::UnsafeCell;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering, fence};

use super::chip::ChipFeatures;
use super::desc::*;
use super::regs::{TX_DESC_CLOSE_IDX, TX_DESC_CNT_MASK, TX_DESC_TAIL_IDX, TX_POLL, TxPoll};
use crate::drivers::dma::{DmaAddr, DmaDirection, DmaError, DmaOps};
use crate::drivers::mmio::{RegisterBus, dma_rmb, dma_wmb, wmb};
use crate::net::skbuff::{MAX_SKB_FRAGS, SkBuff, TxChecksum, TxOffload};
use crate::sync::RingOwner;

/// Descriptors one packet may need: linear head plus every fragment
///
/// The ring refuses a packet unless this many slots are free, so a packet
/// is never split across a ring-full boundary.
pub const MAX_TX_DESCS_PER_PACKET: u32 = MAX_SKB_FRAGS as u32 + 1;

/// How the reclaimer learns a descriptor is done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxCompletion {
    /// The device clears `DESC_OWN` in each finished descriptor
    OwnBit,
    /// The device advances `TX_DESC_CLOSE_IDX`; `DESC_OWN` is not trusted
    CloseIndex,
}

impl TxCompletion {
    pub fn for_features(features: ChipFeatures) -> Self {
        if features.contains(ChipFeatures::TX_NO_CLOSE) {
            Self::CloseIndex
        } else {
            Self::OwnBit
        }
    }
}

/// Host-side view of one descriptor
enum TxSlot {
    Empty,
    /// Handed to the device. The packet is held by the slot of its last
    /// descriptor so it outlives every mapping that points into it.
    Posted {
        addr: DmaAddr,
        len: usize,
        skb: Option<SkBuff>,
    },
    /// The device is done; mapping and packet still to be released
    CompletedAwaitingRelease {
        addr: DmaAddr,
        len: usize,
        skb: Option<SkBuff>,
    },
}

impl TxSlot {
    fn complete(self) -> Self {
        match self {
            Self::Posted { addr, len, skb } => Self::CompletedAwaitingRelease { addr, len, skb },
            other => other,
        }
    }

    /// Unmap and hand back the packet if this slot carried it
    fn release(self, dma: &dyn DmaOps) -> Option<SkBuff> {
        match self {
            Self::Empty => None,
            Self::Posted { addr, len, skb } | Self::CompletedAwaitingRelease { addr, len, skb } => {
                dma.unmap(addr, len, DmaDirection::ToDevice);
                skb
            }
        }
    }
}

/// Why a packet was accepted but not sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxDrop {
    /// Offload request the MAC cannot perform (MSS above `TD_MSS_MAX`)
    Unsupported,
    /// A buffer could not be mapped for DMA
    MapFailed,
    /// A buffer is longer than a descriptor's length field
    TooLong,
}

impl fmt::Display for TxDrop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported => write!(f, "unsupported offload"),
            Self::MapFailed => write!(f, "DMA mapping failed"),
            Self::TooLong => write!(f, "buffer too long for descriptor"),
        }
    }
}

/// Outcome of [`TxProducer::post`]
#[derive(Debug)]
pub enum TxPost {
    /// Handed to the device. `stopped` is set when the ring ran out of
    /// headroom and the queue is now stopped.
    Queued { descs: u32, stopped: bool },
    /// Not enough free slots; the packet is returned untouched
    Busy(SkBuff),
    /// Taken and dropped
    Dropped(TxDrop),
}

/// Result of one reclaim pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Reclaimed {
    pub packets: u32,
    pub bytes: u64,
    pub descs: u32,
    /// This pass reopened a stopped queue
    pub woke: bool,
    /// Stopped at the packet budget with completions possibly left over
    pub exhausted: bool,
}

/// Transmit descriptor ring with its slot arena
pub struct TxRing {
    desc: DescRing,
    slots: Box<[UnsafeCell<TxSlot>]>,
    produced: AtomicU32,
    consumed: AtomicU32,
    /// Flow control: set by the producer when headroom runs out
    stopped: AtomicBool,
    /// Administrative stop: set while the ring is quiesced
    halted: AtomicBool,
    xmit_lock: spin::Mutex<()>,
    completion: TxCompletion,
    dma: Arc<dyn DmaOps>,
}

// SAFETY: slots in [consumed, produced) belong to the reclaimer, which is
// unique by RingOwner; all other slots belong to the producer, which is
// unique by xmit_lock. The cursors hand slots across with Release/Acquire.
unsafe impl Sync for TxRing {}

impl TxRing {
    pub fn new(dma: Arc<dyn DmaOps>, size: u32, completion: TxCompletion) -> Result<Self, DmaError> {
        let desc = DescRing::new(Arc::clone(&dma), size)?;
        let slots = (0..size).map(|_| UnsafeCell::new(TxSlot::Empty)).collect();
        Ok(Self {
            desc,
            slots,
            produced: AtomicU32::new(0),
            consumed: AtomicU32::new(0),
            stopped: AtomicBool::new(false),
            halted: AtomicBool::new(true),
            xmit_lock: spin::Mutex::new(()),
            completion,
            dma,
        })
    }

    pub fn size(&self) -> u32 {
        self.desc.size()
    }

    pub fn phys(&self) -> DmaAddr {
        self.desc.phys()
    }

    pub(crate) fn desc(&self) -> &DescRing {
        &self.desc
    }

    /// `(produced, consumed)`
    pub fn cursors(&self) -> (u32, u32) {
        (
            self.produced.load(Ordering::Acquire),
            self.consumed.load(Ordering::Acquire),
        )
    }

    /// Descriptors posted and not yet reclaimed
    pub fn outstanding(&self) -> u32 {
        let (produced, consumed) = self.cursors();
        produced.wrapping_sub(consumed)
    }

    pub fn free(&self) -> u32 {
        self.size() - self.outstanding()
    }

    /// Whether the queue refuses packets right now
    pub fn is_stopped(&self) -> bool {
        self.halted.load(Ordering::Acquire) || self.stopped.load(Ordering::Acquire)
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Refuse packets from [`TxRing::xmit`] until [`TxRing::start`]
    pub fn halt(&self) {
        self.halted.store(true, Ordering::Release);
    }

    /// Accept packets again
    pub fn start(&self) {
        self.stopped.store(false, Ordering::Release);
        self.halted.store(false, Ordering::Release);
    }

    /// Become the producer
    pub fn lock_producer(&self) -> TxProducer<'_> {
        TxProducer {
            ring: self,
            _guard: self.xmit_lock.lock(),
        }
    }

    /// Transmit path entry: post unless the ring is halted
    ///
    /// The halt check happens under the producer lock, so a caller that
    /// raced a quiesce sees the halt once the quiescer lets go.
    pub fn xmit(&self, regs: &dyn RegisterBus, skb: SkBuff) -> TxPost {
        let mut producer = self.lock_producer();
        if self.is_halted() {
            return TxPost::Busy(skb);
        }
        producer.post(regs, skb)
    }

    fn slot(&self, idx: u32) -> *mut TxSlot {
        self.slots[self.desc.entry(idx) as usize].get()
    }

    /// Stop the queue if a worst-case packet no longer fits
    ///
    /// Returns whether the queue is left stopped.
    fn stop_if_full(&self) -> bool {
        if self.free() >= MAX_TX_DESCS_PER_PACKET {
            return false;
        }
        self.stopped.store(true, Ordering::Release);
        fence(Ordering::SeqCst);
        if self.free() >= MAX_TX_DESCS_PER_PACKET {
            // The reclaimer freed room before it could see `stopped`
            let _ = self
                .stopped
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire);
            return false;
        }
        true
    }

    /// Reopen a stopped queue if room appeared; reclaimer side
    fn wake_if_room(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
            && self.free() >= MAX_TX_DESCS_PER_PACKET
            && self
                .stopped
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            && !self.halted.load(Ordering::Acquire)
    }

    /// Release every descriptor the device has finished with
    ///
    /// Stops early, at a packet boundary, once `budget` packets are done.
    pub fn reclaim(&self, _owner: RingOwner<'_>, regs: &dyn RegisterBus, budget: u32) -> Reclaimed {
        let mut dirty = self.consumed.load(Ordering::Relaxed);
        let outstanding = self.produced.load(Ordering::Acquire).wrapping_sub(dirty);

        let limit = match self.completion {
            TxCompletion::OwnBit => outstanding,
            TxCompletion::CloseIndex => {
                let close = regs.read16(TX_DESC_CLOSE_IDX) as u32 & TX_DESC_CNT_MASK;
                let done = close.wrapping_sub(dirty) & TX_DESC_CNT_MASK;
                done.min(outstanding)
            }
        };

        let mut done = Reclaimed::default();
        while done.descs < limit {
            if self.completion == TxCompletion::OwnBit {
                if self.desc.opts1(dirty) & DESC_OWN != 0 {
                    break;
                }
                dma_rmb();
            }

            // SAFETY: dirty is in [consumed, produced), owned by the reclaimer
            let slot = unsafe { core::mem::replace(&mut *self.slot(dirty), TxSlot::Empty) };
            let packet = slot.complete().release(&*self.dma);
            done.descs += 1;
            dirty = dirty.wrapping_add(1);

            if let Some(skb) = packet {
                done.packets += 1;
                done.bytes += skb.len() as u64;
                if done.packets >= budget {
                    done.exhausted = true;
                    break;
                }
            }
        }

        if done.descs == 0 {
            return done;
        }

        self.consumed.store(dirty, Ordering::Release);
        fence(Ordering::SeqCst);
        done.woke = self.wake_if_room();

        // Doorbells can be lost when packets are posted back to back
        if self.completion == TxCompletion::OwnBit && dirty != self.produced.load(Ordering::Acquire) {
            regs.write8(TX_POLL, TxPoll::NPQ.bits());
        }
        done
    }

    /// Drop every outstanding packet and zero the ring
    ///
    /// Requires both ring roles, so neither the poll routine nor the
    /// transmit path can be inside the ring. Returns the packets dropped.
    pub fn reset(&self, _owner: RingOwner<'_>, _producer: &TxProducer<'_>) -> u32 {
        let (produced, mut idx) = self.cursors();
        let mut dropped = 0;
        while idx != produced {
            // SAFETY: both roles are held
            let slot = unsafe { core::mem::replace(&mut *self.slot(idx), TxSlot::Empty) };
            if slot.release(&*self.dma).is_some() {
                dropped += 1;
            }
            idx = idx.wrapping_add(1);
        }

        self.desc.clear();
        self.produced.store(0, Ordering::Release);
        self.consumed.store(0, Ordering::Release);
        self.stopped.store(false, Ordering::Release);
        dropped
    }
}

impl Drop for TxRing {
    fn drop(&mut self) {
        for slot in self.slots.iter_mut() {
            let slot = core::mem::replace(slot.get_mut(), TxSlot::Empty);
            let _ = slot.release(&*self.dma);
        }
    }
}

/// Exclusive producer access to a [`TxRing`]
pub struct TxProducer<'a> {
    ring: &'a TxRing,
    _guard: spin::MutexGuard<'a, ()>,
}

impl TxProducer<'_> {
    /// Post one packet
    ///
    /// Writes every descriptor of the packet, then flips `DESC_OWN` on the
    /// first descriptor after a DMA write barrier, then rings the doorbell.
    /// Only flow control is checked here; an administratively halted ring
    /// still accepts packets from whoever holds the producer role.
    pub fn post(&mut self, regs: &dyn RegisterBus, skb: SkBuff) -> TxPost {
        let ring = self.ring;
        if ring.stopped.load(Ordering::Acquire) {
            return TxPost::Busy(skb);
        }
        if ring.free() < MAX_TX_DESCS_PER_PACKET {
            ring.stop_if_full();
            return TxPost::Busy(skb);
        }

        let (extra, opts2) = match offload_bits(skb.tx_offload()) {
            Ok(bits) => bits,
            Err(drop) => return TxPost::Dropped(drop),
        };
        if skb.linear_len() > TX_LEN_MASK as usize
            || skb.frags().iter().any(|f| f.len() > TX_LEN_MASK as usize)
        {
            return TxPost::Dropped(TxDrop::TooLong);
        }

        let first = ring.produced.load(Ordering::Relaxed);
        let nfrags = skb.frags().len() as u32;
        let dma = &*ring.dma;

        let head_len = skb.linear_len();
        let Ok(head_addr) = dma.map(skb.data(), DmaDirection::ToDevice) else {
            return TxPost::Dropped(TxDrop::MapFailed);
        };

        for (i, frag) in skb.frags().iter().enumerate() {
            let idx = first.wrapping_add(1 + i as u32);
            let Ok(addr) = dma.map(frag, DmaDirection::ToDevice) else {
                self.unwind(first, i as u32, head_addr, head_len);
                return TxPost::Dropped(TxDrop::MapFailed);
            };
            let last = if i as u32 + 1 == nfrags { LAST_FRAG } else { 0 };

            ring.desc.set_addr(idx, addr);
            ring.desc.set_opts2(idx, opts2);
            ring.desc
                .set_opts1(idx, DESC_OWN | extra | frag.len() as u32 | ring.desc.ring_end(idx) | last);
            // SAFETY: idx is beyond `produced`, owned by the producer
            unsafe {
                *ring.slot(idx) = TxSlot::Posted {
                    addr,
                    len: frag.len(),
                    skb: None,
                };
            }
        }

        let last = first.wrapping_add(nfrags);
        // SAFETY: first and last are beyond `produced`, owned by the producer
        unsafe {
            *ring.slot(first) = TxSlot::Posted {
                addr: head_addr,
                len: head_len,
                skb: None,
            };
            if let TxSlot::Posted { skb: holder, .. } = &mut *ring.slot(last) {
                *holder = Some(skb);
            }
        }

        ring.desc.set_addr(first, head_addr);
        ring.desc.set_opts2(first, opts2);
        dma_wmb();
        let single = if nfrags == 0 { LAST_FRAG } else { 0 };
        ring.desc.set_opts1(
            first,
            DESC_OWN | FIRST_FRAG | extra | head_len as u32 | ring.desc.ring_end(first) | single,
        );

        wmb();
        let produced = last.wrapping_add(1);
        ring.produced.store(produced, Ordering::Release);

        match ring.completion {
            TxCompletion::OwnBit => regs.write8(TX_POLL, TxPoll::NPQ.bits()),
            TxCompletion::CloseIndex => regs.write16(TX_DESC_TAIL_IDX, (produced & TX_DESC_CNT_MASK) as u16),
        }

        TxPost::Queued {
            descs: nfrags + 1,
            stopped: ring.stop_if_full(),
        }
    }

    /// Undo a partially written packet: the head mapping and `mapped`
    /// fragment slots after `first`
    fn unwind(&mut self, first: u32, mapped: u32, head_addr: DmaAddr, head_len: usize) {
        let ring = self.ring;
        ring.dma.unmap(head_addr, head_len, DmaDirection::ToDevice);
        for i in 0..mapped {
            let idx = first.wrapping_add(1 + i);
            // SAFETY: still beyond `produced`, owned by the producer
            let slot = unsafe { core::mem::replace(&mut *ring.slot(idx), TxSlot::Empty) };
            let _ = slot.release(&*ring.dma);
            ring.desc.set_opts1(idx, 0);
        }
    }

    pub fn ring(&self) -> &TxRing {
        self.ring
    }
}

/// Encode offload requests as `(opts1 extra bits, opts2)`
fn offload_bits(offload: &TxOffload) -> Result<(u32, u32), TxDrop> {
    let mut opts1 = 0;
    let mut opts2 = 0;

    match offload.mss {
        Some(mss) if mss > 0 => {
            if mss as u32 > TD_MSS_MAX {
                return Err(TxDrop::Unsupported);
            }
            opts1 |= TD_LSO;
            opts2 |= (mss as u32) << TD1_MSS_SHIFT;
        }
        _ => match offload.checksum {
            TxChecksum::Tcp => opts2 |= TD1_IP_CS | TD1_TCP_CS,
            TxChecksum::Udp => opts2 |= TD1_IP_CS | TD1_UDP_CS,
            TxChecksum::None => {}
        },
    }

    if let Some(tci) = offload.vlan_tci {
        opts2 |= TX_VLAN_TAG | tci.swap_bytes() as u32;
    }
    Ok((opts1, opts2))
}
