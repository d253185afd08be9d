//! DMA descriptor layout
//!
//! TX and RX descriptors share one 16-byte format:
//!
//! ```text
//!  31  30  29  28  27 ........................................ 0
//! ┌───┬───┬───┬───┬────────────────────────────────────────────┐
//! │OWN│EOR│FS │LS │ direction-specific status / length         │ opts1
//! ├───┴───┴───┴───┴────────────────────────────────────────────┤
//! │ checksum / MSS / VLAN                                       │ opts2
//! ├─────────────────────────────────────────────────────────────┤
//! │ buffer bus address (64-bit)                                 │ addr
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! `OWN` set means the device may touch the descriptor and its buffer.
//! Every field is little-endian in memory.

use alloc::alloc::Layout;
use alloc::sync::Arc;
use core::mem::ManuallyDrop;

use volatile::Volatile;

use crate::drivers::dma::{CoherentRegion, DmaAddr, DmaError, DmaOps};

/// Bytes per descriptor
pub const DESC_SIZE: usize = 16;
/// Descriptor arrays are 256-byte aligned
pub const DESC_ALIGN: usize = 256;

// opts1, both directions
pub const DESC_OWN: u32 = 1 << 31;
pub const RING_END: u32 = 1 << 30;
pub const FIRST_FRAG: u32 = 1 << 29;
pub const LAST_FRAG: u32 = 1 << 28;

// TX opts1
/// Large send offload
pub const TD_LSO: u32 = 1 << 27;
/// TX buffer length field
pub const TX_LEN_MASK: u32 = 0xffff;

// TX opts2
pub const TD_MSS_MAX: u32 = 0x07ff;
pub const TD1_MSS_SHIFT: u32 = 18;
pub const TD1_IP_CS: u32 = 1 << 29;
pub const TD1_TCP_CS: u32 = 1 << 30;
pub const TD1_UDP_CS: u32 = 1 << 31;
pub const TX_VLAN_TAG: u32 = 1 << 17;

// RX opts1
pub const RX_FOVF: u32 = 1 << 23;
pub const RX_RWT: u32 = 1 << 22;
pub const RX_RES: u32 = 1 << 21;
pub const RX_RUNT: u32 = 1 << 20;
pub const RX_CRC: u32 = 1 << 19;
pub const PID1: u32 = 1 << 18;
pub const PID0: u32 = 1 << 17;
pub const IP_FAIL: u32 = 1 << 16;
pub const UDP_FAIL: u32 = 1 << 15;
pub const TCP_FAIL: u32 = 1 << 14;
pub const RX_PROTO_UDP: u32 = PID1;
pub const RX_PROTO_TCP: u32 = PID0;
pub const RX_PROTO_MASK: u32 = PID1 | PID0;
pub const RX_CS_FAIL_MASK: u32 = IP_FAIL | UDP_FAIL | TCP_FAIL;
/// RX frame length, FCS included
pub const RX_LEN_MASK: u32 = 0x3fff;
/// Everything a posted RX descriptor must not carry
pub const RSVD_MASK: u32 = 0x3fff_c000;

// RX opts2
pub const RX_VLAN_TAG: u32 = 1 << 16;

/// One hardware descriptor
#[repr(C)]
struct Desc {
    opts1: Volatile<u32>,
    opts2: Volatile<u32>,
    addr: Volatile<u64>,
}

/// Coherent array of descriptors
///
/// Indices passed to the accessors are free-running cursor values; they
/// are reduced modulo the ring size here.
pub struct DescRing {
    region: ManuallyDrop<CoherentRegion>,
    size: u32,
    dma: Arc<dyn DmaOps>,
}

impl DescRing {
    /// Allocate `size` zeroed descriptors
    pub fn new(dma: Arc<dyn DmaOps>, size: u32) -> Result<Self, DmaError> {
        let layout = Layout::from_size_align(size as usize * DESC_SIZE, DESC_ALIGN)
            .map_err(|_| DmaError::AllocationFailed)?;
        let region = dma.alloc_coherent(layout)?;
        Ok(Self {
            region: ManuallyDrop::new(region),
            size,
            dma,
        })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Bus address programmed into the ring base registers
    pub fn phys(&self) -> DmaAddr {
        self.region.phys()
    }

    /// Physical slot number of cursor value `idx`
    pub fn entry(&self, idx: u32) -> u32 {
        idx & (self.size - 1)
    }

    /// `RING_END` if `idx` maps to the last physical slot
    pub fn ring_end(&self, idx: u32) -> u32 {
        if self.entry(idx) == self.size - 1 {
            RING_END
        } else {
            0
        }
    }

    fn desc(&self, idx: u32) -> *mut Desc {
        let base = self.region.virt().as_ptr() as *mut Desc;
        // SAFETY: entry() < size and the region holds `size` descriptors
        unsafe { base.add(self.entry(idx) as usize) }
    }

    pub fn opts1(&self, idx: u32) -> u32 {
        // SAFETY: in-bounds descriptor; volatile because the device writes it
        u32::from_le(unsafe { (*self.desc(idx)).opts1.read() })
    }

    pub fn opts2(&self, idx: u32) -> u32 {
        // SAFETY: see opts1
        u32::from_le(unsafe { (*self.desc(idx)).opts2.read() })
    }

    pub fn addr(&self, idx: u32) -> DmaAddr {
        // SAFETY: see opts1
        u64::from_le(unsafe { (*self.desc(idx)).addr.read() })
    }

    pub fn set_opts1(&self, idx: u32, value: u32) {
        #[cfg(test)]
        trace::record(self.phys(), self.entry(idx), trace::Field::Opts1, value as u64);
        // SAFETY: the caller owns descriptor `idx` under the ring protocol
        unsafe { (*self.desc(idx)).opts1.write(value.to_le()) }
    }

    pub fn set_opts2(&self, idx: u32, value: u32) {
        #[cfg(test)]
        trace::record(self.phys(), self.entry(idx), trace::Field::Opts2, value as u64);
        // SAFETY: see set_opts1
        unsafe { (*self.desc(idx)).opts2.write(value.to_le()) }
    }

    pub fn set_addr(&self, idx: u32, value: DmaAddr) {
        #[cfg(test)]
        trace::record(self.phys(), self.entry(idx), trace::Field::Addr, value);
        // SAFETY: see set_opts1
        unsafe { (*self.desc(idx)).addr.write(value.to_le()) }
    }

    /// Zero every descriptor
    ///
    /// Only valid while the device is stopped.
    pub fn clear(&self) {
        for idx in 0..self.size {
            // SAFETY: in-bounds; the device is not running
            unsafe {
                let desc = &mut *self.desc(idx);
                desc.opts1.write(0);
                desc.opts2.write(0);
                desc.addr.write(0);
            }
        }
    }
}

impl Drop for DescRing {
    fn drop(&mut self) {
        // SAFETY: the owner resets the MAC before dropping its rings, and no
        // descriptor pointer outlives `self`
        unsafe {
            let region = ManuallyDrop::take(&mut self.region);
            self.dma.free_coherent(region);
        }
    }
}

// SAFETY: access to individual descriptors is arbitrated by the ring
// protocol in tx.rs and rx.rs
unsafe impl Send for DescRing {}
unsafe impl Sync for DescRing {}
