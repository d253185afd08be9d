//! Lock-free flag set
//!
//! A thin atomic wrapper around a `bitflags` type. Every mutation is a single
//! read-modify-write on the backing word, so a bit cleared by
//! [`AtomicFlags::test_and_clear`] is exactly the bit that was observed set:
//! a concurrent `insert` of a different bit can never be lost, and a
//! concurrent `insert` of the same bit either lands before the clear (and is
//! consumed by it) or after it (and stays pending).

use core::fmt;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicU32, Ordering};

use bitflags::Flags;

/// Atomic set of `F` flags backed by one `AtomicU32`
pub struct AtomicFlags<F> {
    bits: AtomicU32,
    _flags: PhantomData<F>,
}

impl<F: Flags<Bits = u32>> AtomicFlags<F> {
    /// Create an empty flag set
    pub const fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
            _flags: PhantomData,
        }
    }

    /// Snapshot of all currently set flags
    pub fn load(&self) -> F {
        F::from_bits_retain(self.bits.load(Ordering::Acquire))
    }

    /// Check whether every flag in `flags` is set
    pub fn contains(&self, flags: F) -> bool {
        let want = flags.bits();
        self.bits.load(Ordering::Acquire) & want == want
    }

    /// Set `flags`, returning the previous contents
    pub fn insert(&self, flags: F) -> F {
        F::from_bits_retain(self.bits.fetch_or(flags.bits(), Ordering::AcqRel))
    }

    /// Clear `flags`, returning the previous contents
    pub fn remove(&self, flags: F) -> F {
        F::from_bits_retain(self.bits.fetch_and(!flags.bits(), Ordering::AcqRel))
    }

    /// Set `flag` and report whether this call was the one that set it
    ///
    /// Returns `false` if the flag was already pending.
    pub fn test_and_set(&self, flag: F) -> bool {
        let bit = flag.bits();
        self.bits.fetch_or(bit, Ordering::AcqRel) & bit == 0
    }

    /// Clear `flag` and report whether it was set
    pub fn test_and_clear(&self, flag: F) -> bool {
        let bit = flag.bits();
        self.bits.fetch_and(!bit, Ordering::AcqRel) & bit != 0
    }

    /// Clear everything
    pub fn clear(&self) {
        self.bits.store(0, Ordering::Release);
    }
}

impl<F: Flags<Bits = u32>> Default for AtomicFlags<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Flags<Bits = u32> + fmt::Debug> fmt::Debug for AtomicFlags<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicFlags").field(&self.load()).finish()
    }
}
