//! DMA memory management
//!
//! Two kinds of memory cross the CPU/device boundary:
//!
//! - **Coherent regions** hold the descriptor rings. They are allocated once
//!   per ring, 256-byte aligned, and both sides access them concurrently,
//!   with ordering enforced by the barriers in [`crate::drivers::mmio`].
//! - **Streaming mappings** cover packet buffers. A buffer is mapped before
//!   its descriptor is handed to the device and unmapped after the device
//!   hands it back.
//!
//! [`IdentityDma`] is the implementation for SoCs where the MAC sees
//! physical memory at the same addresses the CPU uses (the RTD1xxx
//! family under an identity-mapped kernel, like U-Boot runs it).

use alloc::alloc::{Layout, alloc_zeroed, dealloc};
use core::fmt;
use core::ptr::NonNull;

/// Bus address as programmed into a descriptor
pub type DmaAddr = u64;

/// Direction of a streaming mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaDirection {
    /// CPU fills, device reads (TX)
    ToDevice,
    /// Device fills, CPU reads (RX)
    FromDevice,
}

/// DMA allocation or mapping failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaError {
    /// Coherent allocation failed
    AllocationFailed,
    /// Streaming mapping failed (IOMMU full, address not reachable)
    MappingFailed,
}

impl fmt::Display for DmaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailed => write!(f, "coherent DMA allocation failed"),
            Self::MappingFailed => write!(f, "DMA mapping failed"),
        }
    }
}

/// Coherent DMA region
///
/// Owns the memory until handed back through [`DmaOps::free_coherent`].
pub struct CoherentRegion {
    virt: NonNull<u8>,
    phys: DmaAddr,
    layout: Layout,
}

// SAFETY: the region is plain memory; synchronization of its contents is
// the ring protocol's job, not the handle's.
unsafe impl Send for CoherentRegion {}
unsafe impl Sync for CoherentRegion {}

impl CoherentRegion {
    /// Build a region from an allocator's raw parts
    ///
    /// # Safety
    ///
    /// `virt` must point to `layout.size()` bytes that stay valid until the
    /// region is freed, and `phys` must be the device's view of `virt`.
    pub unsafe fn from_raw_parts(virt: NonNull<u8>, phys: DmaAddr, layout: Layout) -> Self {
        Self { virt, phys, layout }
    }

    pub fn virt(&self) -> NonNull<u8> {
        self.virt
    }

    pub fn phys(&self) -> DmaAddr {
        self.phys
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }
}

impl fmt::Debug for CoherentRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoherentRegion")
            .field("virt", &self.virt)
            .field("phys", &format_args!("{:#x}", self.phys))
            .field("len", &self.layout.size())
            .finish()
    }
}

/// Platform DMA services
pub trait DmaOps: Send + Sync {
    /// Allocate zeroed, device-coherent memory
    fn alloc_coherent(&self, layout: Layout) -> Result<CoherentRegion, DmaError>;

    /// Release memory obtained from [`DmaOps::alloc_coherent`]
    ///
    /// # Safety
    ///
    /// The device must no longer access the region and no references into
    /// it may remain.
    unsafe fn free_coherent(&self, region: CoherentRegion);

    /// Map a packet buffer for the device
    fn map(&self, buf: &[u8], dir: DmaDirection) -> Result<DmaAddr, DmaError>;

    /// Undo [`DmaOps::map`]
    fn unmap(&self, addr: DmaAddr, len: usize, dir: DmaDirection);

    /// Make device writes to a mapped buffer visible to the CPU
    fn sync_for_cpu(&self, _addr: DmaAddr, _len: usize, _dir: DmaDirection) {}

    /// Hand a mapped buffer back to the device after CPU access
    fn sync_for_device(&self, _addr: DmaAddr, _len: usize, _dir: DmaDirection) {}
}

// ============================================================================
// Identity-Mapped Implementation
// ============================================================================

/// ARM Cortex-A cache line size
const CACHE_LINE_SIZE: usize = 64;

/// DMA for identity-mapped memory
///
/// Bus addresses equal CPU addresses. With `cache_maintenance` set, streaming
/// mappings clean/invalidate the data cache by VA (for non-coherent
/// interconnects); coherent regions are assumed to be mapped uncached or
/// snooped by the platform.
pub struct IdentityDma {
    cache_maintenance: bool,
}

impl IdentityDma {
    /// DMA on a cache-coherent interconnect (ACP enabled)
    pub const fn coherent() -> Self {
        Self {
            cache_maintenance: false,
        }
    }

    /// DMA that needs explicit cache maintenance
    pub const fn non_coherent() -> Self {
        Self {
            cache_maintenance: true,
        }
    }

    fn clean(&self, addr: DmaAddr, len: usize) {
        if self.cache_maintenance {
            cache_clean(addr as usize, len);
        }
    }

    fn invalidate(&self, addr: DmaAddr, len: usize) {
        if self.cache_maintenance {
            cache_invalidate(addr as usize, len);
        }
    }
}

impl DmaOps for IdentityDma {
    fn alloc_coherent(&self, layout: Layout) -> Result<CoherentRegion, DmaError> {
        if layout.size() == 0 {
            return Err(DmaError::AllocationFailed);
        }
        // SAFETY: non-zero size checked above
        let ptr = unsafe { alloc_zeroed(layout) };
        let virt = NonNull::new(ptr).ok_or(DmaError::AllocationFailed)?;
        // SAFETY: fresh allocation of `layout`, identity mapped
        Ok(unsafe { CoherentRegion::from_raw_parts(virt, ptr as DmaAddr, layout) })
    }

    unsafe fn free_coherent(&self, region: CoherentRegion) {
        // SAFETY: region came from alloc_coherent with this layout
        unsafe { dealloc(region.virt.as_ptr(), region.layout) }
    }

    fn map(&self, buf: &[u8], dir: DmaDirection) -> Result<DmaAddr, DmaError> {
        let addr = buf.as_ptr() as DmaAddr;
        match dir {
            DmaDirection::ToDevice => self.clean(addr, buf.len()),
            DmaDirection::FromDevice => self.invalidate(addr, buf.len()),
        }
        Ok(addr)
    }

    fn unmap(&self, addr: DmaAddr, len: usize, dir: DmaDirection) {
        if dir == DmaDirection::FromDevice {
            self.invalidate(addr, len);
        }
    }

    fn sync_for_cpu(&self, addr: DmaAddr, len: usize, dir: DmaDirection) {
        if dir == DmaDirection::FromDevice {
            self.invalidate(addr, len);
        }
    }

    fn sync_for_device(&self, addr: DmaAddr, len: usize, dir: DmaDirection) {
        match dir {
            DmaDirection::ToDevice => self.clean(addr, len),
            DmaDirection::FromDevice => self.invalidate(addr, len),
        }
    }
}

/// Clean (write back) a VA range to the point of coherency (DC CVAC)
fn cache_clean(start_addr: usize, length: usize) {
    #[cfg(target_arch = "aarch64")]
    {
        let end_addr = start_addr + length;
        let mut addr = start_addr & !(CACHE_LINE_SIZE - 1);
        // SAFETY: cleaning lines of memory the caller owns has no
        // architectural side effects beyond write-back
        unsafe {
            while addr < end_addr {
                core::arch::asm!("dc cvac, {addr}", addr = in(reg) addr, options(nostack));
                addr += CACHE_LINE_SIZE;
            }
            core::arch::asm!("dsb sy", options(nostack));
        }
    }
    #[cfg(not(target_arch = "aarch64"))]
    let _ = (start_addr, length, CACHE_LINE_SIZE);
}

/// Invalidate a VA range so the CPU re-reads what the device wrote (DC IVAC)
fn cache_invalidate(start_addr: usize, length: usize) {
    #[cfg(target_arch = "aarch64")]
    {
        let end_addr = start_addr + length;
        let mut addr = start_addr & !(CACHE_LINE_SIZE - 1);
        // SAFETY: the buffer is owned by the device at this point; dropping
        // any dirty CPU lines for it is the intended effect
        unsafe {
            core::arch::asm!("dsb sy", options(nostack));
            while addr < end_addr {
                core::arch::asm!("dc ivac, {addr}", addr = in(reg) addr, options(nostack));
                addr += CACHE_LINE_SIZE;
            }
            core::arch::asm!("dsb sy", options(nostack));
        }
    }
    #[cfg(not(target_arch = "aarch64"))]
    let _ = (start_addr, length, CACHE_LINE_SIZE);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coherent_region_is_zeroed_and_aligned() {
        let dma = IdentityDma::coherent();
        let layout = Layout::from_size_align(1024, 256).unwrap();
        let region = dma.alloc_coherent(layout).unwrap();

        assert_eq!(region.phys() % 256, 0);
        assert_eq!(region.len(), 1024);
        // SAFETY: region is 1024 readable bytes
        let bytes = unsafe { core::slice::from_raw_parts(region.virt().as_ptr(), 1024) };
        assert!(bytes.iter().all(|&b| b == 0));

        // SAFETY: nothing references the region anymore
        unsafe { dma.free_coherent(region) };
    }

    #[test]
    fn identity_map_returns_cpu_address() {
        let dma = IdentityDma::non_coherent();
        let buf = [0u8; 128];
        let addr = dma.map(&buf, DmaDirection::ToDevice).unwrap();
        assert_eq!(addr, buf.as_ptr() as DmaAddr);
        dma.unmap(addr, buf.len(), DmaDirection::ToDevice);
    }

    #[test]
    fn zero_sized_coherent_request_fails() {
        let dma = IdentityDma::coherent();
        let layout = Layout::from_size_align(0, 256).unwrap();
        assert_eq!(dma.alloc_coherent(layout).unwrap_err(), DmaError::AllocationFailed);
    }
}
