//! NAPI-style poll ownership
//!
//! The poll routine must never run concurrently with itself, and code that
//! rebuilds the rings must first make sure it is not running at all. Both
//! facts are tracked here with one atomic state word:
//!
//! ```text
//!   idle ──schedule()──> SCHED ──begin_poll()──> SCHED|POLLING
//!     ▲                    ▲                          │
//!     │                    └───── budget exhausted ───┤
//!     └──────────────────────── complete() ───────────┘
//!
//!   idle ──disable()──> SCHED|POLLING|DISABLE ──drop──> idle
//!                                 │
//!                          keep_disabled()
//!                                 ▼
//!                  SCHED|POLLING|DISABLE|PARKED ──disable()──> (guard again)
//! ```
//!
//! A new instance starts parked: the device is down and nothing may poll.
//!
//! Owning SCHED is what grants access to the consumer side of the rings.
//! Both [`NapiPoll`] and [`NapiDisabled`] are proofs of that ownership and
//! can hand out a [`RingOwner`] token that the ring consumer methods require.

use core::marker::PhantomData;
use core::sync::atomic::{AtomicU8, Ordering};

const SCHED: u8 = 1 << 0;
const DISABLE: u8 = 1 << 1;
const POLLING: u8 = 1 << 2;
/// Disabled with no guard alive; the next `disable()` takes it over
const PARKED: u8 = 1 << 3;

/// Default poll weight (packets per poll round)
pub const NAPI_WEIGHT: u32 = 64;

/// Poll scheduling state for one device
pub struct Napi {
    state: AtomicU8,
    weight: u32,
}

impl Napi {
    /// Create a parked instance (the device starts down)
    pub const fn new(weight: u32) -> Self {
        Self {
            state: AtomicU8::new(SCHED | POLLING | DISABLE | PARKED),
            weight,
        }
    }

    /// Budget handed to each poll round
    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Try to claim the poll routine on behalf of an interrupt
    ///
    /// Returns `true` if the caller must arrange for `poll` to run. Returns
    /// `false` if a poll is already pending or the instance is disabled.
    pub fn schedule(&self) -> bool {
        let mut cur = self.state.load(Ordering::Relaxed);
        loop {
            if cur & (SCHED | DISABLE) != 0 {
                return false;
            }
            match self.state.compare_exchange_weak(
                cur,
                cur | SCHED,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => cur = actual,
            }
        }
    }

    /// Enter the poll routine
    ///
    /// Only succeeds while scheduled and not already inside a poll round,
    /// which is what keeps the routine from re-entering itself.
    pub fn begin_poll(&self) -> Option<NapiPoll<'_>> {
        let mut cur = self.state.load(Ordering::Relaxed);
        loop {
            if cur & SCHED == 0 || cur & POLLING != 0 {
                return None;
            }
            match self.state.compare_exchange_weak(
                cur,
                cur | POLLING,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(NapiPoll { napi: self }),
                Err(actual) => cur = actual,
            }
        }
    }

    /// Take ownership away from the poll routine
    ///
    /// Marks the instance disabled so no new poll can be scheduled, then
    /// waits for any scheduled or running poll to complete and claims SCHED
    /// for the caller. `relax` is called between attempts. A parked
    /// instance is handed over immediately.
    pub fn disable(&self, mut relax: impl FnMut()) -> NapiDisabled<'_> {
        self.state.fetch_or(DISABLE, Ordering::AcqRel);
        loop {
            let cur = self.state.load(Ordering::Relaxed);
            if cur & PARKED != 0
                && self
                    .state
                    .compare_exchange(cur, cur & !PARKED, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                return NapiDisabled { napi: self };
            }
            if cur & SCHED == 0
                && self
                    .state
                    .compare_exchange(
                        cur,
                        cur | SCHED | POLLING,
                        Ordering::Acquire,
                        Ordering::Relaxed,
                    )
                    .is_ok()
            {
                return NapiDisabled { napi: self };
            }
            relax();
        }
    }

    /// Whether a disable request is waiting for the current poll to finish
    pub fn disable_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) & DISABLE != 0
    }

    /// Whether a poll round is scheduled or running
    pub fn is_scheduled(&self) -> bool {
        self.state.load(Ordering::Acquire) & SCHED != 0
    }

    /// Whether the instance is parked with no guard alive
    pub fn is_parked(&self) -> bool {
        self.state.load(Ordering::Acquire) & PARKED != 0
    }

    /// Release a disabled instance back to the idle state
    pub fn enable(&self) {
        self.state
            .fetch_and(!(SCHED | POLLING | DISABLE | PARKED), Ordering::Release);
    }
}

/// Proof that the caller is the running poll routine
pub struct NapiPoll<'a> {
    napi: &'a Napi,
}

impl<'a> NapiPoll<'a> {
    /// Token granting consumer access to the rings for this round
    pub fn owner(&self) -> RingOwner<'_> {
        RingOwner(PhantomData)
    }

    /// Finish polling and give up SCHED
    ///
    /// Returns `true` when the caller may re-enable the interrupt line.
    /// Returns `false` if a disable request claimed the instance meanwhile.
    pub fn complete(self) -> bool {
        let prev = self.napi.state.fetch_and(!(SCHED | POLLING), Ordering::AcqRel);
        core::mem::forget(self);
        prev & DISABLE == 0
    }
}

impl Drop for NapiPoll<'_> {
    /// Leaving without `complete()` keeps SCHED so the round is re-run.
    fn drop(&mut self) {
        self.napi.state.fetch_and(!POLLING, Ordering::Release);
    }
}

/// Proof that the poll routine is parked and cannot be scheduled
///
/// Dropping the guard re-enables scheduling.
pub struct NapiDisabled<'a> {
    napi: &'a Napi,
}

impl NapiDisabled<'_> {
    /// Token granting consumer access to the rings while parked
    pub fn owner(&self) -> RingOwner<'_> {
        RingOwner(PhantomData)
    }

    /// Leave the instance disabled after the guard goes away
    ///
    /// Used on the way down and into suspend. The next [`Napi::disable`]
    /// takes the parked instance over; [`Napi::enable`] releases it.
    pub fn keep_disabled(self) {
        self.napi.state.fetch_or(PARKED, Ordering::Release);
        core::mem::forget(self);
    }
}

impl Drop for NapiDisabled<'_> {
    fn drop(&mut self) {
        self.napi.enable();
    }
}

/// Zero-sized capability for the consumer side of a descriptor ring
#[derive(Clone, Copy)]
pub struct RingOwner<'a>(PhantomData<&'a ()>);

#[cfg(test)]
impl RingOwner<'static> {
    /// Test-only token for exercising a ring outside a device
    pub(crate) fn for_test() -> Self {
        RingOwner(PhantomData)
    }
}
