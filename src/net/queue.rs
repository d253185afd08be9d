//! Lock-free sk_buff backlog
//!
//! Single-producer single-consumer ring of owned [`SkBuff`]s. The driver's
//! poll routine produces received frames; whoever runs the protocol stack
//! consumes them.
//!
//! - Power-of-2 capacity for modulo via masking
//! - One slot always stays empty to tell full from empty
//! - Producer: write slot, then publish `head` with Release
//! - Consumer: observe `head` with Acquire, take slot, publish `tail` with Release

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::net::skbuff::SkBuff;

/// Lock-free SPSC ring buffer holding up to `N - 1` sk_buffs
pub struct SkBuffQueue<const N: usize> {
    slots: [UnsafeCell<Option<SkBuff>>; N],

    /// Write index (producer only)
    head: AtomicUsize,

    /// Read index (consumer only)
    tail: AtomicUsize,
}

impl<const N: usize> SkBuffQueue<N> {
    const MASK: usize = {
        assert!(N.is_power_of_two(), "capacity must be a power of two");
        N - 1
    };

    pub const fn new() -> Self {
        Self {
            slots: [const { UnsafeCell::new(None) }; N],
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Enqueue an sk_buff (producer)
    ///
    /// Hands the buffer back if the queue is full.
    pub fn enqueue(&self, skb: SkBuff) -> Result<(), SkBuff> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);

        let next_head = (head + 1) & Self::MASK;
        if next_head == tail {
            return Err(skb);
        }

        // SAFETY: slot `head` is outside [tail, head) so the consumer does
        // not touch it, and there is only one producer
        unsafe { *self.slots[head].get() = Some(skb) };

        self.head.store(next_head, Ordering::Release);
        Ok(())
    }

    /// Dequeue an sk_buff (consumer)
    pub fn dequeue(&self) -> Option<SkBuff> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        if head == tail {
            return None;
        }

        // SAFETY: slot `tail` was published by the Release store of `head`
        // and the producer will not reuse it until `tail` moves past it
        let skb = unsafe { (*self.slots[tail].get()).take() };

        self.tail.store((tail + 1) & Self::MASK, Ordering::Release);
        skb
    }

    /// Current depth (approximate, may be stale)
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        head.wrapping_sub(tail) & Self::MASK
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == Self::MASK
    }

    /// Usable capacity
    pub const fn capacity(&self) -> usize {
        N - 1
    }
}

impl<const N: usize> Default for SkBuffQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: one producer writes `head` and the slot it publishes, one consumer
// writes `tail` and the slot it takes; SkBuff is Send
unsafe impl<const N: usize> Sync for SkBuffQueue<N> {}
