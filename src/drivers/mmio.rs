//! Memory-mapped register access
//!
//! The MAC is driven entirely through byte, halfword and word registers at
//! fixed offsets from one base address. Everything above this module talks
//! to a [`RegisterBus`], so the same driver code runs against real MMIO
//! ([`MmioBus`]) and against the recording mock used by the unit tests.
//!
//! # Barriers
//!
//! The ring protocol needs four kinds of ordering, named after their Linux
//! counterparts:
//!
//! | function    | orders                                         | aarch64      |
//! |-------------|------------------------------------------------|--------------|
//! | [`dma_wmb`] | CPU stores to coherent DMA memory              | `dmb oshst`  |
//! | [`dma_rmb`] | CPU loads from coherent DMA memory             | `dmb oshld`  |
//! | [`wmb`]     | DMA memory stores before an MMIO doorbell      | `dsb st`     |
//! | [`mb`]      | everything, both directions                    | `dsb sy`     |
//!
//! On other architectures they fall back to `core::sync::atomic` fences,
//! which is what the host tests exercise.

use core::sync::atomic::{Ordering, compiler_fence, fence};

// ============================================================================
// Barriers
// ============================================================================

/// Order prior stores to DMA memory before later stores to DMA memory
#[inline(always)]
pub fn dma_wmb() {
    #[cfg(target_arch = "aarch64")]
    // SAFETY: barrier instruction, no memory operands
    unsafe {
        core::arch::asm!("dmb oshst", options(nostack, preserves_flags));
    }
    #[cfg(not(target_arch = "aarch64"))]
    fence(Ordering::Release);
    compiler_fence(Ordering::SeqCst);
}

/// Order a load of a DMA ownership word before loads of the other fields
#[inline(always)]
pub fn dma_rmb() {
    #[cfg(target_arch = "aarch64")]
    // SAFETY: barrier instruction, no memory operands
    unsafe {
        core::arch::asm!("dmb oshld", options(nostack, preserves_flags));
    }
    #[cfg(not(target_arch = "aarch64"))]
    fence(Ordering::Acquire);
    compiler_fence(Ordering::SeqCst);
}

/// Order all prior stores before a following MMIO write
#[inline(always)]
pub fn wmb() {
    #[cfg(target_arch = "aarch64")]
    // SAFETY: barrier instruction, no memory operands
    unsafe {
        core::arch::asm!("dsb st", options(nostack, preserves_flags));
    }
    #[cfg(not(target_arch = "aarch64"))]
    fence(Ordering::Release);
    compiler_fence(Ordering::SeqCst);
}

/// Full barrier
#[inline(always)]
pub fn mb() {
    #[cfg(target_arch = "aarch64")]
    // SAFETY: barrier instruction, no memory operands
    unsafe {
        core::arch::asm!("dsb sy", options(nostack, preserves_flags));
    }
    #[cfg(not(target_arch = "aarch64"))]
    fence(Ordering::SeqCst);
    compiler_fence(Ordering::SeqCst);
}

// ============================================================================
// Register Bus
// ============================================================================

/// Byte-addressed register window of one device
///
/// Offsets are relative to the device base. Implementations must perform
/// each access exactly once and in program order.
pub trait RegisterBus: Send + Sync {
    fn read8(&self, offset: usize) -> u8;
    fn read16(&self, offset: usize) -> u16;
    fn read32(&self, offset: usize) -> u32;
    fn write8(&self, offset: usize, value: u8);
    fn write16(&self, offset: usize, value: u16);
    fn write32(&self, offset: usize, value: u32);

    /// Read-modify-write of a byte register
    fn modify8(&self, offset: usize, clear: u8, set: u8) {
        let value = self.read8(offset);
        self.write8(offset, (value & !clear) | set);
    }

    /// Read-modify-write of a halfword register
    fn modify16(&self, offset: usize, clear: u16, set: u16) {
        let value = self.read16(offset);
        self.write16(offset, (value & !clear) | set);
    }

    /// Read-modify-write of a word register
    fn modify32(&self, offset: usize, clear: u32, set: u32) {
        let value = self.read32(offset);
        self.write32(offset, (value & !clear) | set);
    }
}

/// Real MMIO window
///
/// Writes are preceded by [`wmb`] so descriptors and buffers written before
/// a doorbell are visible to the device when it reacts to the doorbell
/// (U-Boot's `__iowmb()` pattern).
pub struct MmioBus {
    base_addr: usize,
}

impl MmioBus {
    /// Wrap the register window at `base_addr`
    ///
    /// # Safety
    ///
    /// `base_addr` must be the virtual address of the device's register
    /// block, mapped as device memory for the lifetime of the bus, and no
    /// other code may drive the same registers.
    pub const unsafe fn new(base_addr: usize) -> Self {
        Self { base_addr }
    }

    pub fn base_addr(&self) -> usize {
        self.base_addr
    }
}

impl RegisterBus for MmioBus {
    #[inline]
    fn read8(&self, offset: usize) -> u8 {
        // SAFETY: window validity is the constructor's contract
        unsafe { core::ptr::read_volatile((self.base_addr + offset) as *const u8) }
    }

    #[inline]
    fn read16(&self, offset: usize) -> u16 {
        // SAFETY: window validity is the constructor's contract
        unsafe { core::ptr::read_volatile((self.base_addr + offset) as *const u16) }
    }

    #[inline]
    fn read32(&self, offset: usize) -> u32 {
        // SAFETY: window validity is the constructor's contract
        unsafe { core::ptr::read_volatile((self.base_addr + offset) as *const u32) }
    }

    #[inline]
    fn write8(&self, offset: usize, value: u8) {
        wmb();
        // SAFETY: window validity is the constructor's contract
        unsafe { core::ptr::write_volatile((self.base_addr + offset) as *mut u8, value) }
    }

    #[inline]
    fn write16(&self, offset: usize, value: u16) {
        wmb();
        // SAFETY: window validity is the constructor's contract
        unsafe { core::ptr::write_volatile((self.base_addr + offset) as *mut u16, value) }
    }

    #[inline]
    fn write32(&self, offset: usize, value: u32) {
        wmb();
        // SAFETY: window validity is the constructor's contract
        unsafe { core::ptr::write_volatile((self.base_addr + offset) as *mut u32, value) }
    }
}

/// Poll `cond` up to `tries` times, calling `delay` between attempts
///
/// Returns `true` as soon as `cond` holds. Used for every hardware-ready
/// wait so none of them can spin forever.
pub fn poll_until(tries: u32, mut delay: impl FnMut(), mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..tries {
        if cond() {
            return true;
        }
        delay();
    }
    cond()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mmio_bus_round_trips_through_memory() {
        let mut window = [0u32; 4];
        // SAFETY: the array stands in for a register block for this test
        let bus = unsafe { MmioBus::new(window.as_mut_ptr() as usize) };

        bus.write32(4, 0xdead_beef);
        bus.write16(8, 0x1234);
        bus.write8(12, 0x5a);

        assert_eq!(bus.read32(4), 0xdead_beef);
        assert_eq!(bus.read16(8), 0x1234);
        assert_eq!(bus.read8(12), 0x5a);
        assert_eq!(bus.read8(4), 0xef);
    }

    #[test]
    fn modify_only_touches_requested_bits() {
        let mut window = [0u32; 1];
        // SAFETY: see above
        let bus = unsafe { MmioBus::new(window.as_mut_ptr() as usize) };

        bus.write32(0, 0xff00_00ff);
        bus.modify32(0, 0x0000_000f, 0x0000_f000);
        assert_eq!(bus.read32(0), 0xff00_f0f0);
    }

    #[test]
    fn poll_until_is_bounded() {
        let mut calls = 0;
        assert!(!poll_until(5, || calls += 1, || false));
        assert_eq!(calls, 5);

        let mut n = 0;
        assert!(poll_until(5, || {}, || {
            n += 1;
            n == 3
        }));
    }
}
